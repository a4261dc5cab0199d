//! Sources of raw message text. Each runs as its own task and pushes into a
//! bounded channel; a task ends once the receiving side is gone.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::json;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as Frame;
use url::Url;

use crate::message::TRACKING;
use crate::types::ObjectType;

#[derive(Debug, Clone)]
pub enum Source {
    /// A tracker's live feed, reconnecting after `reconnect_delay` whenever
    /// the connection drops. `ws://` and `wss://` URLs are read as websocket
    /// text frames, anything else as server-sent events.
    Stream { url: Url, reconnect_delay: Duration },
    /// Newline-delimited JSON, one message per line.
    Replay { path: PathBuf, interval: Duration },
    /// Synthetic frames for running without a tracker.
    Demo { interval: Duration },
}

impl Source {
    pub fn spawn(self, tx: mpsc::Sender<String>) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            match self {
                Source::Stream {
                    url,
                    reconnect_delay,
                } => run_stream(url, reconnect_delay, tx).await,
                Source::Replay { path, interval } => run_replay(path, interval, tx).await,
                Source::Demo { interval } => run_demo(interval, tx).await,
            }
        })
    }
}

enum StreamEnd {
    ServerClosed,
    ReceiverClosed,
}

async fn run_stream(url: Url, reconnect_delay: Duration, tx: mpsc::Sender<String>) -> Result<()> {
    let client = Client::new();
    loop {
        let end = match url.scheme() {
            "ws" | "wss" => websocket_once(&url, &tx).await,
            _ => event_stream_once(&client, &url, &tx).await,
        };
        match end {
            Ok(StreamEnd::ReceiverClosed) => return Ok(()),
            Ok(StreamEnd::ServerClosed) => warn!("{url} closed the stream"),
            Err(err) => warn!("{url}: {err:#}"),
        }
        if tx.is_closed() {
            return Ok(());
        }
        info!("reconnecting in {reconnect_delay:?}");
        sleep(reconnect_delay).await;
    }
}

async fn websocket_once(url: &Url, tx: &mpsc::Sender<String>) -> Result<StreamEnd> {
    let (mut socket, _) = connect_async(url.as_str())
        .await
        .context("cannot connect")?;
    info!("connected to {url}");

    while let Some(frame) = socket.next().await {
        match frame.context("websocket broke")? {
            Frame::Text(text) => {
                if tx.send(text.as_str().to_owned()).await.is_err() {
                    return Ok(StreamEnd::ReceiverClosed);
                }
            }
            Frame::Close(_) => break,
            other => debug!("ignoring {} byte non-text frame", other.len()),
        }
    }
    Ok(StreamEnd::ServerClosed)
}

async fn event_stream_once(
    client: &Client,
    url: &Url,
    tx: &mpsc::Sender<String>,
) -> Result<StreamEnd> {
    let response = client
        .get(url.clone())
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
        .context("cannot connect")?
        .error_for_status()?;
    info!("connected to {url}");

    let mut events = response.bytes_stream().eventsource();
    while let Some(event) = events.next().await {
        let event = event.context("event stream broke")?;
        if event.data.is_empty() {
            continue;
        }
        if tx.send(event.data).await.is_err() {
            return Ok(StreamEnd::ReceiverClosed);
        }
    }
    Ok(StreamEnd::ServerClosed)
}

async fn run_replay(path: PathBuf, interval: Duration, tx: mpsc::Sender<String>) -> Result<()> {
    let file = File::open(&path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut sent = 0usize;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if tx.send(line.to_owned()).await.is_err() {
            break;
        }
        sent += 1;
        sleep(interval).await;
    }
    info!("replayed {sent} messages from {}", path.display());
    Ok(())
}

async fn run_demo(interval: Duration, tx: mpsc::Sender<String>) -> Result<()> {
    let mut demo = DemoTracker::default();
    let mut rng = StdRng::from_os_rng();
    loop {
        let frame = demo.frame(&mut rng, interval.as_secs_f64());
        debug!("demo frame {frame}");
        if tx.send(frame).await.is_err() {
            return Ok(());
        }
        sleep(interval).await;
    }
}

/// A parked car and a pedestrian wandering around it.
#[derive(Debug, Default)]
pub struct DemoTracker {
    next_location: Option<(f64, f64)>,
}

impl DemoTracker {
    const CAR_LOCATION: (f64, f64) = (450.0, 300.0);
    const PEDESTRIAN_HOME: (f64, f64) = (200.0, 300.0);
    const WANDER: i32 = 100;

    pub fn frame(&mut self, rng: &mut impl Rng, elapsed_secs: f64) -> String {
        let mut wander = || {
            (
                Self::PEDESTRIAN_HOME.0 + f64::from(rng.random_range(-Self::WANDER..=Self::WANDER)),
                Self::PEDESTRIAN_HOME.1 + f64::from(rng.random_range(-Self::WANDER..=Self::WANDER)),
            )
        };
        let location = self.next_location.unwrap_or_else(&mut wander);
        let next = wander();
        self.next_location = Some(next);

        let elapsed = elapsed_secs.max(f64::EPSILON);
        let velocity = [(next.0 - location.0) / elapsed, (next.1 - location.1) / elapsed];

        json!({
            "type": TRACKING,
            "tickTime": elapsed_secs,
            "data": {
                "1": {
                    "objType": ObjectType::Car.code(),
                    "location": [Self::CAR_LOCATION.0, Self::CAR_LOCATION.1],
                    "rotation": 0.0,
                    "vel": [0.0, 0.0],
                },
                "2": {
                    "objType": ObjectType::Person.code(),
                    "location": [location.0, location.1],
                    "rotation": 0.0,
                    "vel": velocity,
                },
            },
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::SinkExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;
    use crate::message::{self, Message};
    use crate::types::{ObjectId, Vec2};

    #[test]
    fn demo_frames_decode() {
        let mut demo = DemoTracker::default();
        let mut rng = StdRng::seed_from_u64(7);

        let Ok(Message::Tracking(frame)) = message::decode(&demo.frame(&mut rng, 0.2)) else {
            panic!("demo frame did not decode");
        };

        assert!(frame.rejected.is_empty());
        assert_eq!(frame.tick_time, Some(0.2));
        let car = &frame.batch[&ObjectId::new("1")];
        assert_eq!(car.object_type, ObjectType::Car);
        assert_eq!(car.position, Vec2::new(450.0, 300.0));
        let person = &frame.batch[&ObjectId::new("2")];
        assert_eq!(person.object_type, ObjectType::Person);
        assert!((100.0..=300.0).contains(&person.position.x));
        assert!((200.0..=400.0).contains(&person.position.y));
    }

    #[test]
    fn demo_pedestrian_heads_for_next_location() {
        let mut demo = DemoTracker::default();
        let mut rng = StdRng::seed_from_u64(11);
        let person = |text: String| match message::decode(&text) {
            Ok(Message::Tracking(mut frame)) => frame.batch.remove(&ObjectId::new("2")),
            _ => None,
        };

        let first = person(demo.frame(&mut rng, 0.5)).unwrap();
        let second = person(demo.frame(&mut rng, 0.5)).unwrap();

        assert_eq!(second.position, first.position + first.velocity * 0.5);
    }

    async fn local_listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn websocket_stream_reconnects_after_server_closes() {
        let (listener, port) = local_listener().await;
        let server = tokio::spawn(async move {
            for text in ["first", "second"] {
                let (tcp, _) = listener.accept().await.unwrap();
                let mut socket = accept_async(tcp).await.unwrap();
                socket.send(Frame::text(text)).await.unwrap();
                socket.close(None).await.unwrap();
            }
        });
        let (tx, mut rx) = mpsc::channel(4);

        let task = Source::Stream {
            url: Url::parse(&format!("ws://127.0.0.1:{port}/stream")).unwrap(),
            reconnect_delay: Duration::from_millis(10),
        }
        .spawn(tx);

        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        assert_eq!(rx.recv().await.as_deref(), Some("second"));
        server.await.unwrap();
        task.abort();
    }

    #[tokio::test]
    async fn event_stream_forwards_event_data() {
        let (listener, port) = local_listener().await;
        let server = tokio::spawn(async move {
            let (mut tcp, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = tcp.read(&mut buf).await.unwrap();
                assert!(n > 0);
                request.extend_from_slice(&buf[..n]);
            }
            tcp.write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n\
                  data: {\"type\": \"A\"}\n\n: keep-alive\n\n",
            )
            .await
            .unwrap();
            String::from_utf8(request).unwrap()
        });
        let (tx, mut rx) = mpsc::channel(4);

        let task = Source::Stream {
            url: Url::parse(&format!("http://127.0.0.1:{port}/stream")).unwrap(),
            reconnect_delay: Duration::from_secs(60),
        }
        .spawn(tx);

        assert_eq!(rx.recv().await.as_deref(), Some("{\"type\": \"A\"}"));
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /stream"));
        assert!(request.to_ascii_lowercase().contains("accept: text/event-stream"));
        task.abort();
    }

    #[tokio::test]
    async fn replay_sends_non_empty_lines_in_order() {
        let path = std::env::temp_dir().join(format!("replay-{}.jsonl", std::process::id()));
        tokio::fs::write(&path, "{\"type\": \"A\"}\n\n  \n{\"type\": \"B\"}\n")
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let task = Source::Replay {
            path: path.clone(),
            interval: Duration::from_millis(1),
        }
        .spawn(tx);
        let mut received = Vec::new();
        while let Some(text) = rx.recv().await {
            received.push(text);
        }
        task.await.unwrap().unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(received, vec!["{\"type\": \"A\"}", "{\"type\": \"B\"}"]);
    }

    #[tokio::test]
    async fn replay_of_missing_file_fails() {
        let (tx, _rx) = mpsc::channel(1);

        let result = Source::Replay {
            path: PathBuf::from("/nonexistent/replay.jsonl"),
            interval: Duration::from_millis(1),
        }
        .spawn(tx)
        .await
        .unwrap();

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn demo_stops_when_receiver_is_dropped() {
        let (tx, mut rx) = mpsc::channel(1);
        let task = Source::Demo {
            interval: Duration::from_millis(1),
        }
        .spawn(tx);

        assert!(rx.recv().await.is_some());
        drop(rx);

        task.await.unwrap().unwrap();
    }
}
