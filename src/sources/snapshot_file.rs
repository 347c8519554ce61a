use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::models::InstrumentSnapshot;
use crate::sources::SignalSource;

/// Reads `<dir>/<SYMBOL>.json` on every fetch. Upstream analysis jobs overwrite
/// these files; a missing or malformed file fails only that instrument.
pub struct SnapshotFileSource {
    dir: PathBuf,
}

impl SnapshotFileSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.json", symbol))
    }
}

#[async_trait]
impl SignalSource for SnapshotFileSource {
    async fn fetch(&self, symbol: &str) -> Result<InstrumentSnapshot> {
        let path = self.path_for(symbol);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let snapshot: InstrumentSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        if snapshot.symbol != symbol {
            bail!(
                "{} holds a snapshot for {}, expected {}",
                path.display(),
                snapshot.symbol,
                symbol
            );
        }
        Ok(snapshot)
    }
}
