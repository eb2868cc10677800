mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{PeerUsage, UsageMap};

/// Durable home of the usage series.
///
/// Writing the same snapshot twice for the same instant must not corrupt the
/// series; the engine only promises at-least-once delivery.
#[async_trait]
pub trait Store: Send + Sync {
    /// The most recent cumulative usage of every peer ever written.
    async fn load_baseline(&self) -> Result<UsageMap>;

    async fn write_usage(&self, usage: &[PeerUsage], as_of: DateTime<Utc>) -> Result<()>;
}
