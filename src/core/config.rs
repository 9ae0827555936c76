use crate::core::types::StreamId;

/// Default slice capacity: must be a power of two large enough to hold
/// `64 << MAX_RANK` documents so every rank's row-word boundaries line up
/// with rank-0 word boundaries (see `storage::slice::RankBuffer`).
pub const DEFAULT_SLICE_CAPACITY: u32 = 1 << 16;

/// No environment variables are consulted by this crate; every tunable
/// comes through this struct, matching the excluded CLI's "no env vars" rule
/// and the teacher crate's own plain-struct-with-Default configuration style.
#[derive(Debug, Clone)]
pub struct Config {
    /// Documents per slice. Power of two, `>= 64 << MAX_RANK`.
    pub slice_capacity: u32,
    /// Stream used when a query term has no explicit `stream:` prefix.
    pub default_stream: StreamId,
    /// Largest n-gram a phrase query compiles into (spec's `MaxGramSize`).
    pub max_gram_size: u8,
    /// Worker threads in the background pool (component G).
    pub worker_count: usize,
    /// Bound on the blocking queue feeding the worker pool.
    pub worker_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            slice_capacity: DEFAULT_SLICE_CAPACITY,
            default_stream: 0,
            max_gram_size: 3,
            worker_count: num_cpus::get().max(1),
            worker_queue_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_slice_capacity_is_power_of_two_and_large_enough() {
        let cfg = Config::default();
        assert!(cfg.slice_capacity.is_power_of_two());
        assert!(cfg.slice_capacity >= (64u32 << crate::core::types::MAX_RANK));
    }
}
