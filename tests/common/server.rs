//! In-memory news server implementing the crate's `Connector` seam

use nntp_rs::NntpError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use usenet_fetch::{ArticleConnection, Connector};

use super::fixtures::PostedFile;

#[derive(Default)]
pub struct FakeServer {
    articles: Mutex<HashMap<String, Vec<u8>>>,
    resets: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
    connects: AtomicUsize,
    requests: Mutex<Vec<String>>,
    latency: Mutex<Duration>,
    /// Cancelled once this many requests have been served
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve every part of `file`
    pub fn publish(&self, file: &PostedFile) {
        for part in 1..=file.parts {
            self.publish_part(file, part);
        }
    }

    pub fn publish_part(&self, file: &PostedFile, part: usize) {
        self.articles
            .lock()
            .unwrap()
            .insert(file.message_id(part), file.article(part));
    }

    pub fn put_raw(&self, message_id: &str, body: Vec<u8>) {
        self.articles.lock().unwrap().insert(message_id.to_string(), body);
    }

    /// Reset the connection on the next `count` requests for `message_id`
    pub fn reset_next(&self, message_id: &str, count: usize) {
        *self
            .resets
            .lock()
            .unwrap()
            .entry(message_id.to_string())
            .or_default() += count;
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn cancel_after(&self, requests: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((requests, token));
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn requests_for(&self, message_id: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == message_id)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn connector(self: &Arc<Self>) -> Arc<dyn Connector> {
        Arc::new(FakeConnector(self.clone()))
    }
}

struct FakeConnector(Arc<FakeServer>);

#[async_trait::async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> nntp_rs::Result<Box<dyn ArticleConnection>> {
        if self.0.offline.load(Ordering::SeqCst) {
            return Err(NntpError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection(self.0.clone())))
    }
}

struct FakeConnection(Arc<FakeServer>);

#[async_trait::async_trait]
impl ArticleConnection for FakeConnection {
    async fn fetch_body(&mut self, message_id: &str) -> nntp_rs::Result<Vec<u8>> {
        let server = &self.0;
        let served = {
            let mut requests = server.requests.lock().unwrap();
            requests.push(message_id.to_string());
            requests.len()
        };
        if let Some((limit, token)) = server.cancel_after.lock().unwrap().as_ref()
            && served >= *limit
        {
            token.cancel();
        }

        let latency = *server.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(remaining) = server.resets.lock().unwrap().get_mut(message_id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(NntpError::ConnectionClosed);
        }

        server
            .articles
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .ok_or_else(|| NntpError::NoSuchArticle(message_id.to_string()))
    }
}
