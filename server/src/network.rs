//! HTTP surface: serves the client page and upgrades `/ws` (or `/play`)
//! connections into experiment sessions, one task per connection.

use crate::channel::WsChannel;
use crate::config::ServerConfig;
use crate::error::ConfigError;
use crate::session::{run_session, SessionSettings, SessionSummary};
use crate::sink::{Identity, JsonFileSink, ResultSink};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Per-connection labels taken from the upgrade URL.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub subject: Option<String>,
    pub condition: Option<String>,
}

/// Picks the identity for one connection: URL labels win over the
/// process-wide fallback.
pub fn resolve_identity(
    params: ConnectParams,
    fallback: Option<&Identity>,
) -> Result<Option<Identity>, ConfigError> {
    match (params.subject, params.condition) {
        (Some(subject), Some(condition)) => Ok(Some(Identity::new(subject, condition)?)),
        (None, None) => Ok(fallback.cloned()),
        _ => Err(ConfigError::IncompleteIdentity),
    }
}

/// Immutable state shared by the request handlers.
#[derive(Clone)]
pub struct AppState {
    settings: Arc<SessionSettings>,
    identity: Option<Identity>,
    sink: Option<Arc<dyn ResultSink>>,
    page: Arc<str>,
    seeds: Arc<Mutex<StdRng>>,
}

impl AppState {
    /// Derives an independent generator for a new session.
    fn session_rng(&self) -> StdRng {
        let mut seeds = self.seeds.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        StdRng::from_seed(seeds.gen())
    }
}

/// Bound listener plus the state handed to every connection.
pub struct Server {
    listener: TcpListener,
    state: AppState,
}

impl Server {
    /// Binds the configured address and stores results under `results_dir`.
    pub async fn bind(config: ServerConfig) -> Result<Self, BoxError> {
        let sink: Arc<dyn ResultSink> = Arc::new(JsonFileSink::new(&config.results_dir));
        Self::with_sink(config, Some(sink)).await
    }

    pub async fn with_sink(
        config: ServerConfig,
        sink: Option<Arc<dyn ResultSink>>,
    ) -> Result<Self, BoxError> {
        let page: Arc<str> = match &config.page {
            Some(path) => tokio::fs::read_to_string(path).await?.into(),
            None => INDEX_HTML.into(),
        };

        let seeds = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let listener = TcpListener::bind(&config.address).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            state: AppState {
                settings: Arc::new(config.session),
                identity: config.identity,
                sink,
                page,
                seeds: Arc::new(Mutex::new(seeds)),
            },
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves connections until the process exits.
    pub async fn run(self) -> Result<(), BoxError> {
        self.run_until(std::future::pending()).await
    }

    /// Serves connections until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), BoxError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Server shutting down");
        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(play))
        .route("/play", get(play))
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(state.page.to_string())
}

async fn play(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let identity = match resolve_identity(params, state.identity.as_ref()) {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Rejecting connection from {}: {}", addr, e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    info!("Client connected from {}", addr);
    ws.on_upgrade(move |socket| async move {
        let rng = state.session_rng();
        let summary = run_session(
            WsChannel::new(socket),
            (*state.settings).clone(),
            identity,
            rng,
            state.sink.clone(),
        )
        .await;
        log_summary(addr, &summary);
    })
}

fn log_summary(addr: SocketAddr, summary: &SessionSummary) {
    let trials = summary.observations.len();
    match &summary.outcome {
        Ok(Some(path)) => info!(
            "Session from {} complete: {} trials, saved to {}",
            addr,
            trials,
            path.display()
        ),
        Ok(None) => info!("Session from {} complete: {} trials, not saved", addr, trials),
        Err(e) => warn!("Session from {} failed after {} trials: {}", addr, trials, e),
    }

    let means = (summary.mean_time_taken(), summary.mean_error_distance());
    if let (Some(time), Some(distance)) = means {
        info!(
            "Session from {}: mean time {:.1}ms, mean error {:.1}px",
            addr, time, distance
        );
    }
}
