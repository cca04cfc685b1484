use clap::Parser;
use log::info;
use server::config::{Args, ServerConfig};
use server::network::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::try_from(Args::parse())?;

    match &config.identity {
        Some(identity) => info!(
            "Recording results for subject {} / condition {} in {}",
            identity.subject(),
            identity.condition(),
            config.results_dir.display()
        ),
        None => info!(
            "No subject/condition given; only sessions that pass them in the URL are saved"
        ),
    }
    info!(
        "{} trials per session, target size {}..={}",
        config.session.trial_limit,
        config.session.size_range.min(),
        config.session.size_range.max()
    );

    let server = Server::bind(config).await?;
    server
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down gracefully...");
            }
        })
        .await
}
