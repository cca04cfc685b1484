//! Headless client that plays one full session against a running server.
//!
//! Clicks land somewhere inside each target after a random reaction delay,
//! so the stored results look like a (very consistent) human subject.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use shared::{ClickReport, ErrorNotice, Target, Viewport};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(author, version, about = "Plays one experiment session", long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Reported window width
    #[arg(short = 'W', long, default_value = "1280")]
    width: u32,

    /// Reported window height
    #[arg(long, default_value = "720")]
    height: u32,

    /// Subject label sent in the URL
    #[arg(long, requires = "condition")]
    subject: Option<String>,

    /// Condition label sent in the URL
    #[arg(long, requires = "subject")]
    condition: Option<String>,

    /// Longest simulated reaction time in milliseconds
    #[arg(long, default_value = "400")]
    max_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut url = format!("ws://{}/ws", args.server);
    if let (Some(subject), Some(condition)) = (&args.subject, &args.condition) {
        url.push_str(&format!("?subject={}&condition={}", subject, condition));
    }

    println!("Connecting to {}", url);
    let (mut ws, _response) = connect_async(url.as_str()).await?;

    let viewport = Viewport::new(args.width, args.height);
    ws.send(Message::Text(serde_json::to_string(&viewport)?)).await?;
    println!("Sent viewport {}x{}", viewport.width, viewport.height);

    let mut rng = rand::thread_rng();
    let mut reports = Vec::new();

    while let Some(message) = ws.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        if let Ok(notice) = serde_json::from_str::<ErrorNotice>(&text) {
            println!("Server reported an error: {}", notice.error);
            break;
        }

        let target: Target = serde_json::from_str(&text)?;
        let shown = Instant::now();
        let delay = rng.gen_range(args.max_delay_ms / 4..=args.max_delay_ms.max(1));
        sleep(Duration::from_millis(delay)).await;

        let half = (target.size() / 2) as i32;
        let click_x = target.x + rng.gen_range(-half..=half);
        let click_y = target.y + rng.gen_range(-half..=half);
        let elapsed = shown.elapsed().as_secs_f64() * 1000.0;

        let report = ClickReport::for_target(&target, click_x, click_y, Some(elapsed));
        ws.send(Message::Text(serde_json::to_string(&report)?)).await?;
        println!(
            "Trial {}: target ({}, {}) size {}, clicked ({}, {}) after {:.0}ms",
            reports.len() + 1,
            target.x,
            target.y,
            target.size(),
            click_x,
            click_y,
            elapsed
        );
        reports.push(report);
    }

    let mean_time =
        reports.iter().filter_map(|r| r.time_taken).sum::<f64>() / reports.len().max(1) as f64;
    let mean_error =
        reports.iter().map(ClickReport::error_distance).sum::<f64>() / reports.len().max(1) as f64;
    println!(
        "Session over: {} trials, mean time {:.0}ms, mean error {:.1}px",
        reports.len(),
        mean_time,
        mean_error
    );

    Ok(())
}
