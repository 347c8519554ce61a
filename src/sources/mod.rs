pub mod memory;
pub mod snapshot_file;

pub use memory::MemorySource;
pub use snapshot_file::SnapshotFileSource;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::InstrumentSnapshot;

/// Supplies already-computed group opinions, price and risk for one instrument.
/// Freshness and correctness are the source's responsibility.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<InstrumentSnapshot>;
}
