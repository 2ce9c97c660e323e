//! Periodic fetch → decode → publish cycle
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    decoder::Decoder,
    error::Error,
    publisher::{PublishReport, Publisher, Topic},
    settings,
};

/// Source of raw feed snapshots
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Bytes, Error>;
}

/// Feed served over HTTP, authenticated with an API key query parameter
pub struct HttpFeed {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpFeed {
    pub fn new(cfg: &settings::Feed) -> Result<HttpFeed, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_seconds))
            .build()?;
        Ok(HttpFeed {
            client,
            url: cfg.url.clone(),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch(&self) -> Result<Bytes, Error> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("key", &self.api_key)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            // reqwest errors carry the URL, which carries the key
            .map_err(|e| Error::Fetch(e.without_url().to_string()))?;
        response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(e.without_url().to_string()))
    }
}

/// What a single cycle achieved
#[derive(Debug, PartialEq, Eq)]
pub enum Cycle {
    FetchFailed,
    NoData,
    Published(PublishReport),
}

pub struct Poller<F: FeedSource, T: Topic> {
    feed: F,
    decoder: Arc<dyn Decoder + Send + Sync>,
    publisher: Publisher<T>,
    poll_interval: Duration,
}

impl<F: FeedSource, T: Topic> Poller<F, T> {
    pub fn new(
        feed: F,
        decoder: Arc<dyn Decoder + Send + Sync>,
        publisher: Publisher<T>,
        poll_interval: Duration,
    ) -> Poller<F, T> {
        Poller {
            feed,
            decoder,
            publisher,
            poll_interval,
        }
    }

    pub fn publisher(&self) -> &Publisher<T> {
        &self.publisher
    }

    /// Runs one cycle per tick until `shutdown` fires. Cancellation is only
    /// observed between cycles.
    pub async fn start(&self, shutdown: CancellationToken) {
        let mut ticks = interval(self.poll_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            decoder = %self.decoder.get_name(),
            interval = ?self.poll_interval,
            "poller started"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticks.tick() => {}
            }
            self.cycle().await;
        }
        info!("poller stopped");
    }

    pub async fn cycle(&self) -> Cycle {
        let payload = match self.feed.fetch().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "skipping cycle");
                return Cycle::FetchFailed;
            }
        };
        let observations = match self.decoder.decode(&payload) {
            Ok(o) => o,
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "feed payload rejected");
                Vec::new()
            }
        };
        if observations.is_empty() {
            info!("no data fetched");
            return Cycle::NoData;
        }
        let report = self.publisher.publish(&observations).await;
        info!(
            observations = observations.len(),
            delivered = report.delivered,
            failed = report.failed,
            "published feed snapshot"
        );
        Cycle::Published(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use futures::FutureExt;

    use super::*;
    use crate::{
        observation::{tests::observation, VehicleObservation},
        publisher::DeliveryAck,
    };

    struct ScriptedFeed {
        responses: Mutex<Vec<Result<Bytes, Error>>>,
        calls: AtomicUsize,
    }

    impl ScriptedFeed {
        fn new(responses: Vec<Result<Bytes, Error>>) -> ScriptedFeed {
            ScriptedFeed {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedFeed {
        async fn fetch(&self) -> Result<Bytes, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(Bytes::new())
            } else {
                responses.remove(0)
            }
        }
    }

    /// payload `n` decodes to `n` observations, `0xff` is malformed
    struct CountingDecoder;

    impl Decoder for CountingDecoder {
        fn get_name(&self) -> String {
            String::from("counting")
        }
        fn decode(&self, payload: &[u8]) -> Result<Vec<VehicleObservation>, Error> {
            match payload.first() {
                None => Ok(Vec::new()),
                Some(0xff) => Err(Error::Decode(String::from("garbage"))),
                Some(n) => Ok((0..*n)
                    .map(|i| observation(&format!("V{i}"), 1_700_000_000))
                    .collect()),
            }
        }
    }

    #[derive(Default)]
    struct CountingTopic {
        sent: AtomicUsize,
    }

    impl Topic for CountingTopic {
        fn enqueue(&self, _key: &str, _payload: &[u8]) -> Result<DeliveryAck, Error> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(async { Ok(()) }.boxed())
        }
    }

    fn poller(responses: Vec<Result<Bytes, Error>>) -> Poller<ScriptedFeed, CountingTopic> {
        Poller::new(
            ScriptedFeed::new(responses),
            Arc::new(CountingDecoder),
            Publisher::new(CountingTopic::default()),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn fetch_error_skips_cycle() {
        let p = poller(vec![
            Err(Error::Fetch(String::from("503 Service Unavailable"))),
            Ok(Bytes::from_static(&[2])),
        ]);
        assert_eq!(p.cycle().await, Cycle::FetchFailed);
        assert_eq!(
            p.cycle().await,
            Cycle::Published(PublishReport {
                delivered: 2,
                failed: 0
            })
        );
        assert_eq!(p.publisher().topic().sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn decode_error_is_no_data() {
        let p = poller(vec![Ok(Bytes::from_static(&[0xff]))]);
        assert_eq!(p.cycle().await, Cycle::NoData);
        assert_eq!(p.cycle().await, Cycle::NoData);
        assert_eq!(p.publisher().topic().sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn runs_until_cancelled() {
        let p = Arc::new(poller(vec![Ok(Bytes::from_static(&[3]))]));
        let shutdown = CancellationToken::new();
        let task = {
            let p = p.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { p.start(shutdown).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        task.await.unwrap();

        assert!(p.feed.calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(p.publisher().topic().sent.load(Ordering::SeqCst), 3);
    }

    /// Answers one connection with `response` after `delay` and hands back
    /// the request head
    async fn serve_once(
        response: &'static [u8],
        delay: Duration,
    ) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!(
            "http://{}/VehiclePositions.pb",
            listener.local_addr().unwrap()
        );
        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = conn.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            tokio::time::sleep(delay).await;
            // the client may already have given up
            let _ = conn.write_all(response).await;
            let _ = conn.shutdown().await;
            String::from_utf8_lossy(&head).into_owned()
        });
        (url, server)
    }

    fn http_feed(url: String, request_timeout_seconds: u64) -> HttpFeed {
        HttpFeed::new(&settings::Feed {
            decoder: String::from("gtfs-rt"),
            url,
            api_key: String::from("s3cr3t-key"),
            poll_interval_seconds: 10,
            request_timeout_seconds,
            discard_route_id: String::from("9999"),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn http_fetch_sends_key_and_returns_body() {
        let (url, server) = serve_once(
            b"HTTP/1.1 200 OK\r\ncontent-length: 3\r\nconnection: close\r\n\r\n\x0a\x01\x32",
            Duration::ZERO,
        )
        .await;
        let body = http_feed(url, 5).fetch().await.unwrap();
        assert_eq!(body, Bytes::from_static(&[0x0a, 0x01, 0x32]));

        let head = server.await.unwrap();
        assert!(
            head.starts_with("GET /VehiclePositions.pb?key=s3cr3t-key HTTP/1.1\r\n"),
            "{head}"
        );
    }

    #[tokio::test]
    async fn http_error_status_is_fetch_error_without_key() {
        let (url, server) = serve_once(
            b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            Duration::ZERO,
        )
        .await;
        match http_feed(url, 5).fetch().await {
            Err(Error::Fetch(msg)) => {
                assert!(msg.contains("503"), "{msg}");
                assert!(!msg.contains("s3cr3t-key"), "{msg}");
            }
            other => panic!("expected fetch error, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn http_slow_response_times_out() {
        let (url, server) = serve_once(
            b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            Duration::from_secs(3),
        )
        .await;
        match http_feed(url, 1).fetch().await {
            Err(Error::Fetch(msg)) => assert!(!msg.contains("s3cr3t-key"), "{msg}"),
            other => panic!("expected fetch error, got {other:?}"),
        }
        server.abort();
    }
}
