use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::InstrumentSnapshot;
use crate::sources::SignalSource;

/// In-memory snapshots, replaced wholesale by the owner (replay, tests).
#[derive(Default)]
pub struct MemorySource {
    snapshots: RwLock<HashMap<String, InstrumentSnapshot>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, snapshot: InstrumentSnapshot) {
        if let Ok(mut map) = self.snapshots.write() {
            map.insert(snapshot.symbol.clone(), snapshot);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.snapshots.write() {
            map.clear();
        }
    }
}

#[async_trait]
impl SignalSource for MemorySource {
    async fn fetch(&self, symbol: &str) -> Result<InstrumentSnapshot> {
        let map = self
            .snapshots
            .read()
            .map_err(|_| anyhow!("snapshot store poisoned"))?;
        map.get(symbol)
            .cloned()
            .ok_or_else(|| anyhow!("no snapshot for {}", symbol))
    }
}
