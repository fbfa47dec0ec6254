// A persister that records transmit totals in the log instead of a database.

use async_trait::async_trait;
use tracing::info;

use nodelink::{LinkRecord, Persister, Result};

/// Logs every upsert at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingPersister;

#[async_trait]
impl Persister for LoggingPersister {
    async fn upsert(&self, record: LinkRecord) -> Result<()> {
        info!(
            node = record.node,
            total_tx_seconds = record.total_tx_seconds,
            last_tx_start = ?record.last_tx_start,
            last_tx_end = ?record.last_tx_end,
            connected_since = %record.connected_since,
            "link record"
        );
        Ok(())
    }
}
