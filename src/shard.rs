//! Partitioning of the filtered index stream into bounded units of work.
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::commoncrawl::CdxEntry;
use crate::layout::StorageLayout;

/// Default record count per shard, sized so a single worker finishes well
/// inside its wall-clock budget.
pub const DEFAULT_SHARD_SIZE: usize = 1000;

/// One unit of distributed work: an ordered slice of index records with a
/// stable identity. A shard is never split or merged after creation and is
/// the unit of controller-level retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shard {
    pub id: String,
    pub snapshot: String,
    pub records: Vec<CdxEntry>,
}

/// Deterministic shard identity: snapshot id plus the shard's position in
/// scan order. Lowercased so the id is also usable as an orchestration job
/// name.
pub fn shard_id(snapshot: &str, index: u32) -> String {
    format!("{}-{:05}", snapshot.to_ascii_lowercase(), index)
}

/// Groups the filtered record stream into fixed-size shards.
///
/// Shards come out disjoint, covering every pushed record, and with
/// boundaries that depend only on scan order, so re-planning an unchanged
/// snapshot reproduces identical shards.
pub struct ShardPlanner {
    snapshot: String,
    size: usize,
    next_index: u32,
    pending: Vec<CdxEntry>,
}

impl ShardPlanner {
    pub fn new(snapshot: &str, size: usize) -> Self {
        Self {
            snapshot: snapshot.to_string(),
            size: size.max(1),
            next_index: 0,
            pending: Vec::new(),
        }
    }

    /// Adds one record, returning a full shard once the size bound is hit.
    pub fn push(&mut self, entry: CdxEntry) -> Option<Shard> {
        self.pending.push(entry);
        if self.pending.len() >= self.size {
            Some(self.cut())
        } else {
            None
        }
    }

    /// Flushes the final, possibly short, shard.
    pub fn finish(mut self) -> Option<Shard> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.cut())
        }
    }

    fn cut(&mut self) -> Shard {
        let id = shard_id(&self.snapshot, self.next_index);
        self.next_index += 1;
        Shard {
            id,
            snapshot: self.snapshot.clone(),
            records: std::mem::take(&mut self.pending),
        }
    }
}

/// Persists a shard spec into the plan directory on the shared volume.
pub fn write_shard_spec(layout: &StorageLayout, shard: &Shard) -> anyhow::Result<()> {
    let path = layout.shard_spec(&shard.id);
    let json = serde_json::to_vec(shard)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write shard spec to {}", path.display()))?;
    Ok(())
}

/// Loads a shard spec by id; this is how a worker obtains its assignment.
pub fn load_shard_spec(layout: &StorageLayout, shard_id: &str) -> anyhow::Result<Shard> {
    let path = layout.shard_spec(shard_id);
    let json = std::fs::read(&path)
        .with_context(|| format!("Failed to read shard spec from {}", path.display()))?;
    serde_json::from_slice(&json)
        .with_context(|| format!("Shard spec {} is not valid JSON", path.display()))
}
