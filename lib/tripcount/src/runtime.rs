use crate::api::{Collator, Combiner, ExecutablePipeline, Mapper, Reducer};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::shuffle::ShufflePool;
use crate::stats::{MapTaskStats, StatsCollector};
use crate::utils::elapsed_ms;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Lifecycle of one job. A job is a single pass with no retryable states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobPhase {
    NotStarted,
    MappingReducing,
    Collating,
    Done,
    Failed,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobPhase::NotStarted => "not_started",
            JobPhase::MappingReducing => "mapping_reducing",
            JobPhase::Collating => "collating",
            JobPhase::Done => "done",
            JobPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Collated output of a finished job plus per-phase statistics.
#[derive(Debug)]
pub struct JobReport<T> {
    pub output: T,
    pub stats: StatsCollector,
}

pub struct RuntimePipeline {
    config: PipelineConfig,
    phase: JobPhase,
}

impl RuntimePipeline {
    pub fn new(config: PipelineConfig) -> Self { Self { config, phase: JobPhase::NotStarted } }

    pub fn config(&self) -> &PipelineConfig { &self.config }

    /// Phase reached by the most recent job.
    pub fn phase(&self) -> JobPhase { self.phase }

    fn advance(&mut self, next: JobPhase) {
        debug!(from = %self.phase, to = %next, "job phase transition");
        self.phase = next;
    }

    fn run_job<M, C, R, K>(
        &mut self,
        partitions: &[&[M::Input]],
        mapper: M,
        combiner: Option<C>,
        reducer: R,
        collator: K,
    ) -> Result<JobReport<K::Out>>
    where
        M: Mapper + Send + Sync + 'static,
        C: Combiner<Key = M::Key, Value = M::Value> + Send + Sync + 'static,
        R: Reducer<Key = M::Key, ValueIn = M::Value> + Send + Sync + 'static,
        K: Collator<In = R::Out>,
    {
        // partitions come from the caller, so only the shuffle side is checked here
        self.config.validate_shuffle()?;
        let job_start = Instant::now();
        let num_reducers = self.config.reducers;
        let batch_records = self.config.batch_records;
        let mut stats = StatsCollector::new();

        let (pool, mut joiner) = ShufflePool::new(num_reducers, self.config.queue_cap, Arc::new(reducer));

        info!(
            partitions = partitions.len(), num_reducers, combiner = combiner.is_some(),
            rayon_threads = self.config.rayon_threads.unwrap_or(0),
            "Starting map phase"
        );
        self.advance(JobPhase::MappingReducing);

        // Map phase
        let map_phase_start = Instant::now();
        let combiner = combiner.as_ref();
        let run_all = || -> Result<Vec<MapTaskStats>> {
            partitions
                .par_iter()
                .enumerate()
                .map(|(partition_id, partition)| run_map_task(partition_id, partition, &mapper, combiner, &pool, batch_records))
                .collect()
        };
        let map_result = match self.config.rayon_threads {
            Some(n) => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .context("build map thread pool")
                .and_then(|tp| tp.install(run_all)),
            None => run_all(),
        };
        let map_stats_vec = match map_result {
            Ok(s) => s,
            Err(e) => {
                // no partial results: shards drop their groups unreduced
                pool.abort_all();
                joiner.join_discard();
                let msg = format!("{e:#}");
                error!(error = %msg, "Map phase failed, aborting job");
                return Err(e);
            }
        };
        let map_phase_ms = elapsed_ms(map_phase_start);
        stats.record_map(&map_stats_vec, combiner.is_some(), map_phase_ms);
        if let Some(m) = &stats.map {
            info!(phase = "map",
                  tasks = m.tasks, total_records = m.total_records,
                  total_mapped = m.total_mapped, total_shuffled = m.total_shuffled,
                  min_task_ms = m.min_task_ms, max_task_ms = m.max_task_ms,
                  wall_ms = m.wall_ms,
                  "Map phase complete");
        }

        // Reduce phase: every map task is done, so each shard holds all values of its keys
        let reduce_phase_start = Instant::now();
        pool.close_all();
        let outcomes = match joiner.join_all() {
            Ok(o) => o,
            Err(e) => {
                error!(error = %e, "Reduce phase failed, aborting job");
                return Err(e.into());
            }
        };
        let reduce_phase_ms = elapsed_ms(reduce_phase_start);
        stats.record_shuffle(&pool.metrics_snapshot());
        stats.record_reduce(&outcomes, reduce_phase_ms);
        drop(pool);
        if let (Some(s), Some(r)) = (&stats.shuffle, &stats.reduce) {
            info!(phase = "reduce",
                  shards = r.shards, total_batches = s.total_batches, max_queue_len = s.max_queue_len,
                  total_values = r.total_values, total_keys = r.total_keys,
                  min_shard_ms = r.min_shard_ms, max_shard_ms = r.max_shard_ms,
                  wall_ms = r.wall_ms,
                  "Reduce phase complete");
        }

        // Collate
        self.advance(JobPhase::Collating);
        let collate_start = Instant::now();
        let output = collator.collate(outcomes.into_iter().flat_map(|o| o.outputs));
        let collate_ms = elapsed_ms(collate_start);
        stats.record_collate(collate_ms);
        self.advance(JobPhase::Done);
        info!(collate_ms, wall_ms = elapsed_ms(job_start), "Job complete");

        Ok(JobReport { output, stats })
    }
}

impl Default for RuntimePipeline { fn default() -> Self { Self::new(PipelineConfig::default()) } }

impl ExecutablePipeline for RuntimePipeline {
    fn map_reduce<M, C, R, K>(
        &mut self,
        partitions: &[&[M::Input]],
        mapper: M,
        combiner: Option<C>,
        reducer: R,
        collator: K,
    ) -> Result<JobReport<K::Out>>
    where
        M: Mapper + Send + Sync + 'static,
        C: Combiner<Key = M::Key, Value = M::Value> + Send + Sync + 'static,
        R: Reducer<Key = M::Key, ValueIn = M::Value> + Send + Sync + 'static,
        K: Collator<In = R::Out>,
    {
        self.phase = JobPhase::NotStarted;
        let result = self.run_job(partitions, mapper, combiner, reducer, collator);
        if result.is_err() {
            self.advance(JobPhase::Failed);
        }
        result
    }
}

/// Pipeline configured from `TRIPCOUNT_*` environment variables.
pub fn default_pipeline() -> RuntimePipeline { RuntimePipeline::new(PipelineConfig::from_env()) }

fn run_map_task<M, C>(
    partition_id: usize,
    partition: &[M::Input],
    mapper: &M,
    combiner: Option<&C>,
    pool: &ShufflePool<M::Key, M::Value>,
    batch_records: usize,
) -> Result<MapTaskStats>
where
    M: Mapper,
    C: Combiner<Key = M::Key, Value = M::Value>,
{
    let task_start = Instant::now();
    let mut emitter = pool.make_thread_emitter(batch_records);
    let mut mapped: u64 = 0;

    let map_result = match combiner {
        Some(combiner) => {
            let mut local: HashMap<M::Key, M::Value> = HashMap::new();
            let res = mapper.do_map(partition, &mut |k: M::Key, v: M::Value| {
                mapped += 1;
                if let Some(acc) = local.get_mut(&k) {
                    combiner.do_combine(&k, acc, v);
                } else {
                    local.insert(k, v);
                }
            });
            if res.is_ok() {
                for (k, v) in local {
                    emitter.emit(k, v);
                }
            }
            res
        }
        None => mapper.do_map(partition, &mut |k: M::Key, v: M::Value| {
            mapped += 1;
            emitter.emit(k, v);
        }),
    };
    if let Err(source) = map_result {
        return Err(PipelineError::PartitionFailure { partition: partition_id, source }.into());
    }

    let (shuffled, batches) = emitter.finish()?;
    let task = MapTaskStats {
        partition: partition_id,
        records_in: partition.len() as u64,
        mapped,
        shuffled,
        batches,
        wall_ms: elapsed_ms(task_start),
    };
    debug!(partition = partition_id, records = task.records_in, mapped, shuffled, "map task done");
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    struct LenMapper;

    impl Mapper for LenMapper {
        type Input = String;
        type Key = usize;
        type Value = u64;

        fn do_map<F>(&self, partition: &[Self::Input], emit: &mut F) -> Result<()>
        where
            F: FnMut(Self::Key, Self::Value),
        {
            for word in partition {
                if word == "boom" {
                    bail!("malformed record {word:?}");
                }
                emit(word.len(), 1);
            }
            Ok(())
        }
    }

    struct Add;

    impl Combiner for Add {
        type Key = usize;
        type Value = u64;

        fn do_combine(&self, _key: &usize, acc: &mut u64, value: u64) {
            *acc += value;
        }
    }

    impl Reducer for Add {
        type Key = usize;
        type ValueIn = u64;
        type Out = (usize, u64);

        fn do_reduce<I, F>(&self, key: &usize, values: I, emit: &mut F)
        where
            I: IntoIterator<Item = u64>,
            F: FnMut((usize, u64)),
        {
            emit((*key, values.into_iter().sum()));
        }
    }

    struct Sorted;

    impl Collator for Sorted {
        type In = (usize, u64);
        type Out = Vec<(usize, u64)>;

        fn collate<I: IntoIterator<Item = (usize, u64)>>(&self, values: I) -> Self::Out {
            let mut v: Vec<_> = values.into_iter().collect();
            v.sort();
            v
        }
    }

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn config(partitions: usize, reducers: usize) -> PipelineConfig {
        PipelineConfig::default().with_partitions(partitions).with_reducers(reducers)
    }

    #[test]
    fn job_reaches_done_and_reports_stats() {
        let store = words(&["a", "bb", "cc", "ddd", "e"]);
        let parts = crate::io::partition_slices(&store, 2);
        let mut pipeline = RuntimePipeline::new(config(2, 3));
        let report = pipeline.map_reduce(&parts, LenMapper, Some(Add), Add, Sorted).unwrap();
        assert_eq!(report.output, vec![(1, 2), (2, 2), (3, 1)]);
        assert_eq!(pipeline.phase(), JobPhase::Done);
        let map = report.stats.map.unwrap();
        assert_eq!(map.tasks, 2);
        assert_eq!(map.total_records, 5);
        assert_eq!(map.total_mapped, 5);
        assert!(map.total_shuffled <= 5);
        let reduce = report.stats.reduce.unwrap();
        assert_eq!(reduce.total_keys, 3);
        assert_eq!(reduce.shards, 3);
    }

    #[test]
    fn failing_partition_fails_whole_job() {
        let store = words(&["a", "bb", "boom", "ddd"]);
        let parts = crate::io::partition_slices(&store, 4);
        let mut pipeline = RuntimePipeline::new(config(4, 2));
        let err = pipeline.map_reduce(&parts, LenMapper, None::<Add>, Add, Sorted).unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::PartitionFailure { partition, source }) => {
                assert_eq!(*partition, 2);
                assert!(source.to_string().contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(pipeline.phase(), JobPhase::Failed);
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let store = words(&["a"]);
        let parts = crate::io::partition_slices(&store, 1);
        let mut pipeline = RuntimePipeline::new(config(1, 0));
        let err = pipeline.map_reduce(&parts, LenMapper, None::<Add>, Add, Sorted).unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::InvalidConfig(_))));
        assert_eq!(pipeline.phase(), JobPhase::Failed);
    }

    #[test]
    fn dedicated_thread_pool_gives_same_result() {
        let store = words(&["x", "yy", "zz", "x"]);
        let parts = crate::io::partition_slices(&store, 3);
        let mut cfg = config(3, 2);
        cfg.rayon_threads = Some(2);
        let mut pipeline = RuntimePipeline::new(cfg);
        let report = pipeline.map_reduce(&parts, LenMapper, None::<Add>, Add, Sorted).unwrap();
        assert_eq!(report.output, vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn phase_display_names() {
        assert_eq!(JobPhase::MappingReducing.to_string(), "mapping_reducing");
        assert_eq!(JobPhase::Done.to_string(), "done");
    }
}
