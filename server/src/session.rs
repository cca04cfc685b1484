//! Per-connection experiment session.
//!
//! A session reads the client's viewport, then runs a fixed number of trials.
//! Each trial sends one freshly generated target and waits for the matching
//! click report; there is never more than one target outstanding. When the
//! last report arrives the observations go to the result sink and the channel
//! is closed.
//!
//! ```text
//! Handshake --viewport--> Emitting --target--> AwaitingAck --report--+
//!                            ^                                       |
//!                            +------------- trial < limit -----------+
//!                                                                    |
//!                                              Finished <-- limit ---+
//! ```
//!
//! Every error ends only the session it happened in. The client receives an
//! [`ErrorNotice`] (best effort) and the channel is closed.

use crate::channel::{recv_json, send_json, Channel};
use crate::error::{ChannelError, SessionError, SinkError};
use crate::sink::{Identity, ResultSink};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use shared::{generate, ClickReport, ErrorNotice, SizeRange, Target, Viewport, TRIAL_LIMIT};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio::time::timeout;

/// Knobs shared by every session a server runs.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Targets sent, and click reports expected, per session.
    pub trial_limit: u32,
    pub size_range: SizeRange,
    /// Deadline for each incoming message; `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    /// Reject reports whose echoed target differs from the one sent.
    pub strict_echo: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            trial_limit: TRIAL_LIMIT,
            size_range: SizeRange::default(),
            read_timeout: None,
            write_timeout: None,
            strict_echo: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshake,
    Emitting,
    AwaitingAck,
    Finished,
}

/// What a session leaves behind once its channel is closed.
#[derive(Debug)]
pub struct SessionSummary {
    /// `None` when the handshake failed.
    pub viewport: Option<Viewport>,
    /// Phase the session was in when it ended: where it failed, or
    /// `Finished` once every trial completed.
    pub state: SessionState,
    /// Reports received before the session ended, in trial order.
    pub observations: Vec<ClickReport>,
    /// Path of the stored record on success, if it was stored.
    pub outcome: Result<Option<PathBuf>, SessionError>,
}

impl SessionSummary {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Mean reported reaction time over the trials that carried one.
    pub fn mean_time_taken(&self) -> Option<f64> {
        let times: Vec<f64> = self
            .observations
            .iter()
            .filter_map(|o| o.time_taken)
            .collect();
        mean(&times)
    }

    pub fn mean_error_distance(&self) -> Option<f64> {
        let distances: Vec<f64> = self
            .observations
            .iter()
            .map(ClickReport::error_distance)
            .collect();
        mean(&distances)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Session state after a successful handshake.
pub struct Session<C: Channel> {
    channel: C,
    viewport: Viewport,
    settings: SessionSettings,
    identity: Option<Identity>,
    rng: StdRng,
    observations: Vec<ClickReport>,
    trial_index: u32,
    last_target: Option<Target>,
    state: SessionState,
}

/// Runs one session from handshake to close.
///
/// `rng` should be derived from a long-lived generator; the session owns it
/// for its whole lifetime.
pub async fn run_session<C: Channel>(
    mut channel: C,
    settings: SessionSettings,
    identity: Option<Identity>,
    rng: StdRng,
    sink: Option<Arc<dyn ResultSink>>,
) -> SessionSummary {
    match Session::handshake(&mut channel, &settings).await {
        Ok(viewport) => {
            info!(
                "Received dimensions: width {}, height {}",
                viewport.width, viewport.height
            );
            Session::new(channel, viewport, settings, identity, rng)
                .run(sink)
                .await
        }
        Err(e) => {
            warn!("Handshake failed: {}", e);
            notify_error(&mut channel, &e, settings.write_timeout).await;
            channel.close().await;
            SessionSummary {
                viewport: None,
                state: SessionState::Handshake,
                observations: Vec::new(),
                outcome: Err(e),
            }
        }
    }
}

impl<C: Channel> Session<C> {
    /// Reads and validates the viewport message.
    pub async fn handshake(
        channel: &mut C,
        settings: &SessionSettings,
    ) -> Result<Viewport, SessionError> {
        let viewport = within(settings.read_timeout, 0, recv_json::<_, Viewport>(channel))
            .await
            .map_err(|_| SessionError::HandshakeDecode("timed out waiting for viewport".into()))?
            .map_err(|e| SessionError::HandshakeDecode(e.to_string()))?;

        if viewport.is_degenerate() {
            return Err(SessionError::HandshakeDecode(format!(
                "degenerate viewport {}x{}",
                viewport.width, viewport.height
            )));
        }
        if !viewport.fits_coordinates() {
            return Err(SessionError::HandshakeDecode(format!(
                "viewport {}x{} exceeds {} pixels per side",
                viewport.width,
                viewport.height,
                Viewport::MAX_EDGE
            )));
        }
        Ok(viewport)
    }

    pub fn new(
        channel: C,
        viewport: Viewport,
        settings: SessionSettings,
        identity: Option<Identity>,
        rng: StdRng,
    ) -> Self {
        let observations = Vec::with_capacity(settings.trial_limit as usize);
        Self {
            channel,
            viewport,
            settings,
            identity,
            rng,
            observations,
            trial_index: 0,
            last_target: None,
            state: SessionState::Emitting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn trial_index(&self) -> u32 {
        self.trial_index
    }

    pub fn observations(&self) -> &[ClickReport] {
        &self.observations
    }

    /// Runs every trial, stores the results and closes the channel.
    pub async fn run(mut self, sink: Option<Arc<dyn ResultSink>>) -> SessionSummary {
        let outcome = match self.exchange().await {
            Ok(()) => {
                self.state = SessionState::Finished;
                self.persist(sink).await
            }
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(_) => info!("Session finished after {} trials", self.trial_index),
            Err(e) => {
                warn!("Session ended after {} trials: {}", self.trial_index, e);
                notify_error(&mut self.channel, e, self.settings.write_timeout).await;
            }
        }

        self.channel.close().await;

        SessionSummary {
            viewport: Some(self.viewport),
            state: self.state,
            observations: self.observations,
            outcome,
        }
    }

    async fn exchange(&mut self) -> Result<(), SessionError> {
        while self.trial_index < self.settings.trial_limit {
            self.emit_target().await?;
            self.await_report().await?;
        }
        Ok(())
    }

    async fn emit_target(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Emitting;
        let trial = self.trial_index + 1;

        let target = generate(self.viewport, self.settings.size_range, &mut self.rng)?;
        within(self.settings.write_timeout, trial, send_json(&mut self.channel, &target))
            .await?
            .map_err(|source| SessionError::ChannelWrite { trial, source })?;

        debug!(
            "Trial {}: sent target at ({}, {}) size {}",
            trial,
            target.x,
            target.y,
            target.size()
        );
        self.last_target = Some(target);
        Ok(())
    }

    async fn await_report(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::AwaitingAck;
        let trial = self.trial_index + 1;

        let report = within(
            self.settings.read_timeout,
            trial,
            recv_json::<_, ClickReport>(&mut self.channel),
        )
        .await?
        .map_err(|source| SessionError::ChannelRead { trial, source })?;

        if self.settings.strict_echo {
            if let Some(expected) = self.last_target {
                if !report.echoes(&expected) {
                    return Err(SessionError::Integrity {
                        trial,
                        expected,
                        reported: Box::new(report),
                    });
                }
            }
        }

        debug!(
            "Trial {}: click at ({}, {}), {:.1}px off, {:?}ms",
            trial,
            report.click_x,
            report.click_y,
            report.error_distance(),
            report.time_taken
        );
        self.observations.push(report);
        self.trial_index += 1;
        Ok(())
    }

    /// Hands the observations to `sink` on the blocking pool.
    async fn persist(
        &mut self,
        sink: Option<Arc<dyn ResultSink>>,
    ) -> Result<Option<PathBuf>, SessionError> {
        let (sink, identity) = match (sink, &self.identity) {
            (Some(sink), Some(identity)) => (sink, identity.clone()),
            (Some(_), None) => {
                info!("No subject/condition for this session, results not saved");
                return Ok(None);
            }
            (None, _) => return Ok(None),
        };

        let observations = self.observations.clone();
        let path = task::spawn_blocking(move || sink.persist(&identity, &observations))
            .await
            .map_err(|e| SinkError::Io(std::io::Error::other(e)))??;
        Ok(Some(path))
    }
}

/// Awaits `fut`, giving up after `limit` if one is set.
async fn within<F, T>(limit: Option<Duration>, trial: u32, fut: F) -> Result<T, SessionError>
where
    F: Future<Output = T>,
{
    match limit {
        Some(after) => timeout(after, fut)
            .await
            .map_err(|_| SessionError::Timeout { trial, after }),
        None => Ok(fut.await),
    }
}

async fn notify_error<C: Channel>(channel: &mut C, error: &SessionError, limit: Option<Duration>) {
    let notice = ErrorNotice {
        error: error.to_string(),
    };
    match within(limit, 0, send_json(channel, &notice)).await {
        Ok(Ok(())) => {}
        Ok(Err(ChannelError::Closed)) => {}
        Ok(Err(e)) => debug!("Could not deliver error notice: {}", e),
        Err(_) => debug!("Timed out delivering error notice"),
    }
}
