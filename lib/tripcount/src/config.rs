use crate::constants::{
    DEFAULT_BATCH_RECORDS, DEFAULT_QUEUE_CAP, ENV_BATCH_RECORDS, ENV_COMBINER, ENV_PARTITIONS,
    ENV_QUEUE_CAP, ENV_RAYON_NUM_THREADS, ENV_RAYON_THREADS, ENV_REDUCERS,
};
use crate::error::PipelineError;
use crate::utils::{env_parse, env_var_truthy, local_cpus};
use serde::Serialize;

/// Topology and tuning for one job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    /// Number of map partitions the record store is split into.
    pub partitions: usize,
    /// Number of reduce shards (one thread each).
    pub reducers: usize,
    /// Worker threads for a dedicated map pool; `None` uses the global rayon pool.
    pub rayon_threads: Option<usize>,
    pub batch_records: usize,
    pub queue_cap: usize,
    pub combiner: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let cpus = local_cpus();
        Self {
            partitions: cpus,
            reducers: cpus,
            rayon_threads: None,
            batch_records: DEFAULT_BATCH_RECORDS,
            queue_cap: DEFAULT_QUEUE_CAP,
            combiner: false,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `TRIPCOUNT_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let partitions = env_parse::<usize>(ENV_PARTITIONS).unwrap_or(defaults.partitions);
        Self {
            partitions,
            // reducers follow the partition count unless set explicitly
            reducers: env_parse::<usize>(ENV_REDUCERS).unwrap_or(partitions),
            rayon_threads: map_pool_threads(
                env_parse::<usize>(ENV_RAYON_THREADS),
                std::env::var_os(ENV_RAYON_NUM_THREADS).is_some(),
            ),
            batch_records: env_parse::<usize>(ENV_BATCH_RECORDS).unwrap_or(defaults.batch_records),
            queue_cap: env_parse::<usize>(ENV_QUEUE_CAP).unwrap_or(defaults.queue_cap),
            combiner: env_var_truthy(ENV_COMBINER),
        }
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_reducers(mut self, reducers: usize) -> Self {
        self.reducers = reducers;
        self
    }

    pub fn with_combiner(mut self, enabled: bool) -> Self {
        self.combiner = enabled;
        self
    }

    /// Full check, for jobs that split the store into `partitions` slices themselves.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.partitions == 0 {
            return Err(PipelineError::InvalidConfig("partitions must be at least 1".into()));
        }
        self.validate_shuffle()
    }

    /// Checks everything except `partitions`, which is moot when the caller
    /// hands over its own slices.
    pub fn validate_shuffle(&self) -> Result<(), PipelineError> {
        if self.reducers == 0 {
            return Err(PipelineError::InvalidConfig("reducers must be at least 1".into()));
        }
        if self.batch_records == 0 {
            return Err(PipelineError::InvalidConfig("batch_records must be at least 1".into()));
        }
        if self.queue_cap == 0 {
            return Err(PipelineError::InvalidConfig("queue_cap must be at least 1".into()));
        }
        Ok(())
    }
}

/// Size of the dedicated map pool. An explicit `RAYON_NUM_THREADS` already
/// sizes the global pool, so it takes precedence and no dedicated pool is built.
fn map_pool_threads(requested: Option<usize>, rayon_env_set: bool) -> Option<usize> {
    if rayon_env_set {
        return None;
    }
    requested.filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_reducers_rejected() {
        let cfg = PipelineConfig::default().with_reducers(0);
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
        assert!(err.to_string().contains("reducers"));
    }

    #[test]
    fn zero_partitions_rejected() {
        let cfg = PipelineConfig::default().with_partitions(0);
        assert!(cfg.validate().is_err());
        assert!(cfg.validate_shuffle().is_ok());
    }

    #[test]
    fn rayon_num_threads_takes_precedence() {
        assert_eq!(map_pool_threads(Some(3), true), None);
        assert_eq!(map_pool_threads(None, true), None);
    }

    #[test]
    fn tripcount_threads_size_the_map_pool() {
        assert_eq!(map_pool_threads(Some(3), false), Some(3));
        assert_eq!(map_pool_threads(Some(0), false), None);
        assert_eq!(map_pool_threads(None, false), None);
    }
}
