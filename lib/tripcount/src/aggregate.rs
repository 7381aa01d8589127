//! Key-generic counting stages: a summing combiner and a summing reducer.

use crate::api::{Combiner, PipelineKey, Reducer};
use std::marker::PhantomData;

/// Partition-local sum of counts per key.
#[derive(Clone, Copy, Debug)]
pub struct SumCombiner<K> {
    _key: PhantomData<fn() -> K>,
}

impl<K> SumCombiner<K> {
    pub fn new() -> Self { Self { _key: PhantomData } }
}

impl<K> Default for SumCombiner<K> {
    fn default() -> Self { Self::new() }
}

impl<K: PipelineKey> Combiner for SumCombiner<K> {
    type Key = K;
    type Value = u64;

    fn do_combine(&self, _key: &K, acc: &mut u64, value: u64) {
        *acc += value;
    }
}

/// Sums every partial count of a key into one `(key, total)`.
#[derive(Clone, Copy, Debug)]
pub struct SumReducer<K> {
    _key: PhantomData<fn() -> K>,
}

impl<K> SumReducer<K> {
    pub fn new() -> Self { Self { _key: PhantomData } }
}

impl<K> Default for SumReducer<K> {
    fn default() -> Self { Self::new() }
}

impl<K: PipelineKey> Reducer for SumReducer<K> {
    type Key = K;
    type ValueIn = u64;
    type Out = (K, u64);

    fn do_reduce<I, F>(&self, key: &K, values: I, emit: &mut F)
    where
        I: IntoIterator<Item = u64>,
        F: FnMut((K, u64)),
    {
        let total: u64 = values.into_iter().sum();
        emit((key.clone(), total));
    }
}
