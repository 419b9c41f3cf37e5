//! Scripted in-memory NNTP server for unit tests.

use super::{ArticleConnection, Connector};
use nntp_rs::NntpError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted failure for the next request of a message-ID
#[derive(Debug, Clone, Copy)]
pub(crate) enum Failure {
    /// Connection reset by peer
    Reset,
    /// Read timed out
    Timeout,
    /// 430 no such article
    Missing,
}

impl Failure {
    fn into_error(self, message_id: &str) -> NntpError {
        match self {
            Failure::Reset => NntpError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
            Failure::Timeout => NntpError::Timeout,
            Failure::Missing => NntpError::NoSuchArticle(message_id.to_string()),
        }
    }
}

#[derive(Default)]
pub(crate) struct MockServer {
    articles: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, VecDeque<Failure>>>,
    refuse_connections: AtomicBool,
    connects: AtomicUsize,
    requests: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    latency: Mutex<Duration>,
}

impl MockServer {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add_article(&self, message_id: &str, body: Vec<u8>) {
        self.articles
            .lock()
            .unwrap()
            .insert(message_id.to_string(), body);
    }

    /// Queue failures served before the article itself
    pub(crate) fn fail_next(&self, message_id: &str, failures: &[Failure]) {
        self.failures
            .lock()
            .unwrap()
            .entry(message_id.to_string())
            .or_default()
            .extend(failures.iter().copied());
    }

    pub(crate) fn refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn requests_for(&self, message_id: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == message_id)
            .count()
    }

    /// Highest number of requests that were in progress at the same time
    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn connector(self: &Arc<Self>) -> Arc<dyn Connector> {
        Arc::new(MockConnector(self.clone()))
    }
}

struct MockConnector(Arc<MockServer>);

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> nntp_rs::Result<Box<dyn ArticleConnection>> {
        if self.0.refuse_connections.load(Ordering::SeqCst) {
            return Err(NntpError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection(self.0.clone())))
    }
}

struct MockConnection(Arc<MockServer>);

#[async_trait::async_trait]
impl ArticleConnection for MockConnection {
    async fn fetch_body(&mut self, message_id: &str) -> nntp_rs::Result<Vec<u8>> {
        let server = &self.0;
        server.requests.lock().unwrap().push(message_id.to_string());

        let now = server.active.fetch_add(1, Ordering::SeqCst) + 1;
        server.peak.fetch_max(now, Ordering::SeqCst);
        let latency = *server.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        server.active.fetch_sub(1, Ordering::SeqCst);

        let failure = server
            .failures
            .lock()
            .unwrap()
            .get_mut(message_id)
            .and_then(|queue| queue.pop_front());
        if let Some(failure) = failure {
            return Err(failure.into_error(message_id));
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

/// Article body for part `part` of `total`, covering `whole[begin-1..end]`
///
/// Encoded with nntp-rs so the decoder is always checked against an
/// independent encoder.
pub(crate) fn yenc_part_body(name: &str, whole: &[u8], part: u32, total: u32, begin: usize, end: usize) -> Vec<u8> {
    let part_info = (total > 1).then(|| (part, total, begin as u64, end as u64, whole.len() as u64));
    nntp_rs::yenc_encode(&whole[begin - 1..end], name, 128, part_info).expect("valid line length")
}
