use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind, Result};

/// Ingestor-wide counters, refreshed on demand from live shard/slice state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestorStats {
    pub start_time: DateTime<Utc>,
    pub shard_count: usize,
    pub total_documents: u64,
    pub shards: Vec<ShardStats>,
    pub recycler: RecyclerStats,
}

impl IngestorStats {
    /// Renders these stats as JSON, for the diagnostic/status endpoints a
    /// deployment exposes around this core (e.g. the excluded REPL or an
    /// HTTP status handler).
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::new(ErrorKind::Internal, e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardStats {
    pub shard_id: u16,
    pub slice_count: usize,
    pub documents: u64,
    pub max_rank_used: u8,
}

/// Reported by the Recycler (component F): how much retired bit-matrix
/// storage is waiting on outstanding readers versus already reclaimed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecyclerStats {
    pub pending_reclamation: usize,
    pub reclaimed_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_serialize_to_json() {
        let stats = IngestorStats {
            start_time: Utc::now(),
            shard_count: 1,
            total_documents: 3,
            shards: vec![ShardStats { shard_id: 0, slice_count: 1, documents: 3, max_rank_used: 0 }],
            recycler: RecyclerStats::default(),
        };
        let json = stats.to_json().unwrap();
        assert!(json.contains("\"total_documents\":3"));
    }
}
