use thiserror::Error;

/// Failures that abort a whole job. Nothing is collated once one of these occurs.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("map task for partition {partition} failed")]
    PartitionFailure {
        partition: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("reduce shard {shard} disconnected before the map phase finished")]
    ShuffleDisconnected { shard: usize },
    #[error("reduce shard {shard} panicked")]
    ShardPanicked { shard: usize },
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}
