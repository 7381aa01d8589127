use crate::shuffle::{ShardMetrics, ShardOutcome};
use serde::Serialize;

/// Counters reported by a single map task (one partition).
#[derive(Clone, Debug, Default)]
pub struct MapTaskStats {
    pub partition: usize,
    pub records_in: u64,
    /// Pairs produced by the mapper.
    pub mapped: u64,
    /// Pairs handed to the shuffle after the optional combine step.
    pub shuffled: u64,
    pub batches: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct MapStats {
    pub tasks: usize,
    pub combiner: bool,
    pub total_records: u64,
    pub total_mapped: u64,
    pub total_shuffled: u64,
    pub total_batches: u64,
    pub min_task_ms: u64,
    pub max_task_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct ShuffleStats {
    pub shards: usize,
    pub total_batches: u64,
    pub total_pairs: u64,
    pub max_queue_len: usize,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct ReduceStats {
    pub shards: usize,
    pub total_values: u64,
    pub total_keys: u64,
    pub total_outputs: u64,
    pub min_shard_ms: u64,
    pub max_shard_ms: u64,
    pub wall_ms: u64,
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct StatsCollector {
    pub map: Option<MapStats>,
    pub shuffle: Option<ShuffleStats>,
    pub reduce: Option<ReduceStats>,
    pub collate_ms: Option<u64>,
}

impl StatsCollector {
    pub fn new() -> Self { Self::default() }

    pub fn record_map(&mut self, per_task: &[MapTaskStats], combiner: bool, wall_ms: u64) {
        self.map = Some(MapStats {
            tasks: per_task.len(),
            combiner,
            total_records: per_task.iter().map(|t| t.records_in).sum(),
            total_mapped: per_task.iter().map(|t| t.mapped).sum(),
            total_shuffled: per_task.iter().map(|t| t.shuffled).sum(),
            total_batches: per_task.iter().map(|t| t.batches).sum(),
            min_task_ms: per_task.iter().map(|t| t.wall_ms).min().unwrap_or(0),
            max_task_ms: per_task.iter().map(|t| t.wall_ms).max().unwrap_or(0),
            wall_ms,
        });
    }

    pub fn record_shuffle(&mut self, shards: &[ShardMetrics]) {
        self.shuffle = Some(ShuffleStats {
            shards: shards.len(),
            total_batches: shards.iter().map(|s| s.recv_batches).sum(),
            total_pairs: shards.iter().map(|s| s.enq_pairs).sum(),
            max_queue_len: shards.iter().map(|s| s.max_queue_len).max().unwrap_or(0),
        });
    }

    pub fn record_reduce<O>(&mut self, outcomes: &[ShardOutcome<O>], wall_ms: u64) {
        self.reduce = Some(ReduceStats {
            shards: outcomes.len(),
            total_values: outcomes.iter().map(|o| o.values_in).sum(),
            total_keys: outcomes.iter().map(|o| o.keys).sum(),
            total_outputs: outcomes.iter().map(|o| o.outputs.len() as u64).sum(),
            min_shard_ms: outcomes.iter().map(|o| o.wall_ms).min().unwrap_or(0),
            max_shard_ms: outcomes.iter().map(|o| o.wall_ms).max().unwrap_or(0),
            wall_ms,
        });
    }

    pub fn record_collate(&mut self, wall_ms: u64) {
        self.collate_ms = Some(wall_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_stats_aggregate_tasks() {
        let tasks = vec![
            MapTaskStats { partition: 0, records_in: 10, mapped: 8, shuffled: 2, batches: 1, wall_ms: 3 },
            MapTaskStats { partition: 1, records_in: 5, mapped: 5, shuffled: 1, batches: 1, wall_ms: 7 },
        ];
        let mut stats = StatsCollector::new();
        stats.record_map(&tasks, true, 9);
        let map = stats.map.unwrap();
        assert_eq!(map.tasks, 2);
        assert_eq!(map.total_records, 15);
        assert_eq!(map.total_mapped, 13);
        assert_eq!(map.total_shuffled, 3);
        assert_eq!(map.min_task_ms, 3);
        assert_eq!(map.max_task_ms, 7);
    }

    #[test]
    fn empty_map_phase_records_zeroes() {
        let mut stats = StatsCollector::new();
        stats.record_map(&[], false, 0);
        let map = stats.map.unwrap();
        assert_eq!(map.tasks, 0);
        assert_eq!(map.min_task_ms, 0);
    }
}
