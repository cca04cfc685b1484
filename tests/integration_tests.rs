//! Integration tests for the experiment server
//!
//! These tests drive whole sessions, either through the in-memory channel or
//! through a real server over WebSocket.

use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use server::channel::{memory_pair, recv_json, send_json, Channel, MemoryChannel};
use server::config::ServerConfig;
use server::error::SessionError;
use server::network::Server;
use server::session::{run_session, SessionSettings};
use server::sink::{Identity, JsonFileSink, ResultSink};
use shared::{ClickReport, ErrorNotice, Target, Viewport};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

fn settings(trial_limit: u32) -> SessionSettings {
    SessionSettings {
        trial_limit,
        ..SessionSettings::default()
    }
}

/// Plays `reports` trials, echoing each target and clicking its centre.
async fn echo_client(
    mut client: MemoryChannel,
    viewport: Viewport,
    reports: usize,
) -> Vec<ClickReport> {
    send_json(&mut client, &viewport).await.unwrap();
    let mut sent = Vec::new();
    for _ in 0..reports {
        let target: Target = recv_json(&mut client).await.unwrap();
        let report = ClickReport::for_target(&target, target.x, target.y, Some(250.0));
        send_json(&mut client, &report).await.unwrap();
        sent.push(report);
    }
    sent
}

/// SESSION PROTOCOL TESTS
mod session_tests {
    use super::*;

    /// Viewport 800x600, three trials, results stored and read back in order
    #[tokio::test]
    async fn three_trial_scenario_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path());
        let identity = Identity::new("s01", "mouse").unwrap();

        let (server, client) = memory_pair();
        let player = tokio::spawn(echo_client(client, Viewport::new(800, 600), 3));
        let shared: Arc<dyn ResultSink> = Arc::new(sink.clone());
        let summary = run_session(
            server,
            settings(3),
            Some(identity.clone()),
            StdRng::seed_from_u64(3),
            Some(shared),
        )
        .await;
        let sent = player.await.unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.observations, sent);
        for report in &summary.observations {
            assert_eq!(report.click_x, report.circle_x);
            assert_eq!(report.click_y, report.circle_y);
        }

        let path = summary.outcome.unwrap().unwrap();
        assert_eq!(path, dir.path().join("s01-mouse.json"));
        assert_eq!(sink.load(&identity).unwrap(), sent);
    }

    /// A default session runs exactly twenty trials
    #[tokio::test]
    async fn default_trial_limit() {
        let (server, client) = memory_pair();
        let player = tokio::spawn(echo_client(client, Viewport::new(1920, 1080), 20));
        let summary = run_session(
            server,
            SessionSettings::default(),
            None,
            StdRng::seed_from_u64(20),
            None,
        )
        .await;
        player.await.unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.observations.len(), 20);
    }

    /// Failure on trial k keeps the k-1 earlier observations
    #[tokio::test]
    async fn malformed_report_mid_session() {
        for k in 1..=4u32 {
            let (server, mut client) = memory_pair();
            let session = tokio::spawn(run_session(
                server,
                settings(5),
                None,
                StdRng::seed_from_u64(u64::from(k)),
                None,
            ));

            send_json(&mut client, &Viewport::new(800, 600)).await.unwrap();
            for _ in 1..k {
                let target: Target = recv_json(&mut client).await.unwrap();
                let report = ClickReport::for_target(&target, target.x, target.y, None);
                send_json(&mut client, &report).await.unwrap();
            }
            let _: Target = recv_json(&mut client).await.unwrap();
            client
                .send(r#"{"circleX": "left"}"#.to_string())
                .await
                .unwrap();

            let summary = session.await.unwrap();
            assert_eq!(summary.observations.len() as u32, k - 1);
            match summary.outcome {
                Err(SessionError::ChannelRead { trial, .. }) => assert_eq!(trial, k),
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    /// A second session with the same identity replaces the first record
    #[tokio::test]
    async fn rerun_overwrites_result_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path());
        let shared: Arc<dyn ResultSink> = Arc::new(sink.clone());
        let identity = Identity::new("s03", "touch").unwrap();

        for (seed, trials) in [(1u64, 4u32), (2, 2)] {
            let (server, client) = memory_pair();
            let viewport = Viewport::new(800, 600);
            let player = tokio::spawn(echo_client(client, viewport, trials as usize));
            let summary = run_session(
                server,
                settings(trials),
                Some(identity.clone()),
                StdRng::seed_from_u64(seed),
                Some(Arc::clone(&shared)),
            )
            .await;
            player.await.unwrap();
            assert!(summary.is_success());
        }

        assert_eq!(sink.load(&identity).unwrap().len(), 2);
    }

    /// Sessions running side by side do not see each other's data
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sessions_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let sink: Arc<dyn ResultSink> = Arc::new(JsonFileSink::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..8u32 {
            let sink = Arc::clone(&sink);
            handles.push(tokio::spawn(async move {
                let (server, client) = memory_pair();
                let viewport = Viewport::new(600 + i * 100, 500 + i * 50);
                let player = tokio::spawn(echo_client(client, viewport, 5 + i as usize));
                let identity = Identity::new(format!("s{:02}", i), "mouse").unwrap();
                let summary = run_session(
                    server,
                    settings(5 + i),
                    Some(identity),
                    StdRng::seed_from_u64(u64::from(i)),
                    Some(sink),
                )
                .await;
                let sent = player.await.unwrap();
                (summary, sent)
            }));
        }

        let reader = JsonFileSink::new(dir.path());
        for (i, handle) in handles.into_iter().enumerate() {
            let (summary, sent) = handle.await.unwrap();
            assert!(summary.is_success());
            assert_eq!(summary.observations, sent);

            let identity = Identity::new(format!("s{:02}", i), "mouse").unwrap();
            assert_eq!(reader.load(&identity).unwrap(), sent);
        }
    }

    /// A failing session leaves a concurrent one untouched
    #[tokio::test]
    async fn failure_is_local_to_its_session() {
        let (bad_server, mut bad_client) = memory_pair();
        let (good_server, good_client) = memory_pair();

        let bad = tokio::spawn(run_session(
            bad_server,
            settings(3),
            None,
            StdRng::seed_from_u64(1),
            None,
        ));
        let good = tokio::spawn(run_session(
            good_server,
            settings(3),
            None,
            StdRng::seed_from_u64(2),
            None,
        ));

        bad_client.send("garbage".to_string()).await.unwrap();
        let notice: ErrorNotice = recv_json(&mut bad_client).await.unwrap();
        assert!(notice.error.contains("handshake"));

        echo_client(good_client, Viewport::new(800, 600), 3).await;

        assert!(!bad.await.unwrap().is_success());
        assert!(good.await.unwrap().is_success());
    }
}

/// END-TO-END TESTS OVER WEBSOCKET
mod websocket_tests {
    use super::*;

    async fn start_server(
        trial_limit: u32,
        results: &std::path::Path,
    ) -> (SocketAddr, oneshot::Sender<()>) {
        let mut config = ServerConfig::new("127.0.0.1:0");
        config.session.trial_limit = trial_limit;
        config.seed = Some(11);
        config.results_dir = results.to_path_buf();

        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));
        (addr, stop_tx)
    }

    #[tokio::test]
    async fn browser_session_over_websocket() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, stop) = start_server(3, dir.path()).await;

        let url = format!("ws://{}/ws?subject=s09&condition=mouse", addr);
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        ws.send(Message::Text(r#"{"width":800,"height":600}"#.to_string()))
            .await
            .unwrap();

        let mut sent = Vec::new();
        while let Some(message) = ws.next().await {
            let text = match message.unwrap() {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let target: Target = serde_json::from_str(&text).unwrap();
            assert!(target.is_within(&Viewport::new(800, 600)));

            let report = ClickReport::for_target(&target, target.x + 1, target.y - 1, Some(321.0));
            ws.send(Message::Text(serde_json::to_string(&report).unwrap()))
                .await
                .unwrap();
            sent.push(report);
        }
        assert_eq!(sent.len(), 3);

        let identity = Identity::new("s09", "mouse").unwrap();
        let sink = JsonFileSink::new(dir.path());
        // the file is written before the server closes the socket
        assert_eq!(sink.load(&identity).unwrap(), sent);

        let _ = stop.send(());
    }

    #[tokio::test]
    async fn malformed_viewport_gets_error_notice() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, stop) = start_server(3, dir.path()).await;

        let (mut ws, _) = connect_async(format!("ws://{}/play", addr).as_str())
            .await
            .unwrap();
        ws.send(Message::Text("{\"width\": 800}".to_string()))
            .await
            .unwrap();

        let mut notice = None;
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => {
                    notice = Some(serde_json::from_str::<ErrorNotice>(&text).unwrap())
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        assert!(notice.unwrap().error.starts_with("handshake failed"));

        let _ = stop.send(());
    }

    #[tokio::test]
    async fn unsafe_labels_are_rejected_before_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, stop) = start_server(3, dir.path()).await;

        let url = format!("ws://{}/ws?subject=..&condition=mouse", addr);
        assert!(connect_async(url.as_str()).await.is_err());

        let _ = stop.send(());
    }

    #[tokio::test]
    async fn index_serves_client_page() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, stop) = start_server(3, dir.path()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("new WebSocket"));

        let _ = stop.send(());
    }
}
