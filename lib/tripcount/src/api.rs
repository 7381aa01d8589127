use anyhow::Result;
use std::fmt::Debug;
use std::hash::Hash;

// ========== Core pipeline stage traits ==========

/// Bounds every shuffle key must satisfy: hashable for shard routing and
/// totally ordered so each shard reduces its keys in a fixed order.
pub trait PipelineKey: Send + Hash + Eq + Ord + Clone + Debug + 'static {}
impl<T> PipelineKey for T where T: Send + Hash + Eq + Ord + Clone + Debug + 'static {}

pub trait Mapper {
    type Input: Sync + 'static;
    type Key: PipelineKey;
    type Value: Send + Clone + 'static;

    /// Maps one partition. Must not touch state shared with other partitions
    /// other than read-only reference data. An `Err` fails the whole job.
    fn do_map<F>(&self, partition: &[Self::Input], emit: &mut F) -> Result<()>
    where
        F: FnMut(Self::Key, Self::Value);
}

/// Partition-local pre-aggregation. Applying it or skipping it must produce
/// the same reducer output, so the fold has to be associative and commutative.
pub trait Combiner {
    type Key: PipelineKey;
    type Value: Send + Clone + 'static;

    /// Folds `value` into the partition's accumulator for `key`.
    fn do_combine(&self, key: &Self::Key, acc: &mut Self::Value, value: Self::Value);
}

/// Reducer produces output records for one grouped key. Values arrive from any
/// number of partitions in unspecified order.
pub trait Reducer {
    type Key: PipelineKey;
    type ValueIn: Send + Clone + 'static;
    type Out: Send + 'static;

    fn do_reduce<I, F>(&self, key: &Self::Key, values: I, emit: &mut F)
    where
        I: IntoIterator<Item = Self::ValueIn>,
        F: FnMut(Self::Out);
}

/// Final single-step aggregation over every reducer output.
pub trait Collator {
    type In;
    type Out;

    fn collate<I>(&self, values: I) -> Self::Out
    where
        I: IntoIterator<Item = Self::In>;
}

// ========== Executable pipeline interface ==========

pub trait ExecutablePipeline {
    /// Runs map, optional combine, reduce and collate over pre-split partitions,
    /// blocking until the collated output is ready.
    fn map_reduce<M, C, R, K>(
        &mut self,
        partitions: &[&[M::Input]],
        mapper: M,
        combiner: Option<C>,
        reducer: R,
        collator: K,
    ) -> Result<crate::runtime::JobReport<K::Out>>
    where
        M: Mapper + Send + Sync + 'static,
        C: Combiner<Key = M::Key, Value = M::Value> + Send + Sync + 'static,
        R: Reducer<Key = M::Key, ValueIn = M::Value> + Send + Sync + 'static,
        K: Collator<In = R::Out>;
}
