#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fluent_log_forwarder::{Record, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct Post {
    pub tag: String,
    pub time: DateTime<Utc>,
    pub record: Record,
}

/// In-memory transport that records every post and close.
#[derive(Default)]
pub struct RecordingTransport {
    posts: Mutex<Vec<Post>>,
    closes: AtomicUsize,
    fail_posts: AtomicBool,
    fail_close: AtomicBool,
    hang_close: AtomicBool,
    close_delay: Mutex<Option<Duration>>,
    close_finished: AtomicBool,
    post_delay: Mutex<Option<Duration>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every post fails with `TransportError::Closed`.
    pub fn failing() -> Arc<Self> {
        let transport = Self::default();
        transport.fail_posts.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    /// `close` never completes.
    pub fn hanging() -> Arc<Self> {
        let transport = Self::default();
        transport.hang_close.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn set_close_delay(&self, delay: Duration) {
        *self.close_delay.lock().unwrap() = Some(delay);
    }

    /// Every post takes `delay` before it is recorded.
    pub fn set_post_delay(&self, delay: Duration) {
        *self.post_delay.lock().unwrap() = Some(delay);
    }

    /// True once a `close` call has run to its end.
    pub fn close_finished(&self) -> bool {
        self.close_finished.load(Ordering::SeqCst)
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.posts()
            .iter()
            .map(|p| p.record["message"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post_with_time(
        &self,
        tag: &str,
        time: DateTime<Utc>,
        record: Record,
    ) -> Result<(), TransportError> {
        let delay = *self.post_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.posts.lock().unwrap().push(Post {
            tag: tag.to_string(),
            time,
            record,
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);

        if self.hang_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = *self.close_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.close_finished.store(true, Ordering::SeqCst);

        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "collector went away",
            )));
        }
        Ok(())
    }
}
