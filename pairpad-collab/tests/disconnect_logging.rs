//! A peer that vanishes without a close frame is a normal disconnect.
//!
//! Runs in its own test binary because it installs the global logger.

use std::sync::Mutex;

use futures_util::StreamExt;
use log::{Level, LevelFilter, Log, Metadata, Record};
use pairpad_collab::identity::RoomId;
use pairpad_collab::server::{RelayServer, ServerConfig};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};

struct CaptureLogger {
    records: Mutex<Vec<(Level, String)>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with("pairpad_collab")
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.records.lock().unwrap().push((record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    records: Mutex::new(Vec::new()),
};

#[tokio::test]
async fn test_dropped_peer_is_not_an_error() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Trace);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = RelayServer::new(ServerConfig::default());
    let gateway = server.gateway();
    tokio::spawn(server.serve(listener));

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/?userId=tab"))
        .await
        .unwrap();
    ws.next().await.unwrap().unwrap();
    assert_eq!(gateway.roster(RoomId::default()).await.unwrap().len(), 1);

    drop(ws);

    let mut left = false;
    for _ in 0..50 {
        if gateway.roster(RoomId::default()).await.unwrap().is_empty() {
            left = true;
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(left, "participant still in the roster");
    // The connection task logs its close after leaving the roster.
    sleep(Duration::from_millis(100)).await;

    let records = LOGGER.records.lock().unwrap();
    let errors: Vec<_> = records.iter().filter(|(level, _)| *level == Level::Error).collect();
    assert!(errors.is_empty(), "unexpected error logs: {errors:?}");
    assert!(records
        .iter()
        .any(|(level, msg)| *level == Level::Info && msg.contains("closed")));
}
