use crate::record::Record;
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A transport that simply drops all records.
///
/// Useful for measuring the overhead of the logger itself without any
/// network I/O, and for tests that don't care about delivery.
#[derive(Clone, Debug, Default)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    async fn post_with_time(
        &self,
        _tag: &str,
        _time: DateTime<Utc>,
        _record: Record,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
