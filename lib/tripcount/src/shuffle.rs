use crate::api::Reducer;
use crate::error::PipelineError;
use crate::io::hash_to_partition;
use crate::utils::elapsed_ms;
use crossbeam_channel as channel;
use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::debug;

// Strategy: one dedicated reduce thread per shard. Senders are bounded for backpressure.
// A shard groups every pair it receives by key and only reduces once it is told
// that all map tasks are done, so each key sees all of its values.
pub struct ShufflePool<K, V> {
    senders: Vec<channel::Sender<ShuffleMsg<K, V>>>,
    metrics: Arc<Vec<ShardCounters>>,
}

enum ShuffleMsg<K, V> {
    Data(Vec<(K, V)>),
    Close,
    Abort,
}

/// Output of one reduce shard, with keys in ascending order.
#[derive(Debug)]
pub struct ShardOutcome<O> {
    pub shard: usize,
    pub keys: u64,
    pub values_in: u64,
    pub outputs: Vec<O>,
    pub reduce_ms: u64,
    pub wall_ms: u64,
}

pub struct ShardJoiner<O> {
    handles: Vec<thread::JoinHandle<Option<ShardOutcome<O>>>>,
}

impl<O> ShardJoiner<O> {
    /// Waits for every shard. Fails if any shard panicked or exited without reducing.
    pub fn join_all(&mut self) -> Result<Vec<ShardOutcome<O>>, PipelineError> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        let mut first_err = None;
        for (shard, h) in self.handles.drain(..).enumerate() {
            match h.join() {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => { first_err.get_or_insert(PipelineError::ShuffleDisconnected { shard }); }
                Err(_) => { first_err.get_or_insert(PipelineError::ShardPanicked { shard }); }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    /// Waits for every shard and drops whatever they produced.
    pub fn join_discard(&mut self) {
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

impl<K, V> ShufflePool<K, V>
where
    K: Send + Ord + Hash + 'static,
    V: Send + 'static,
{
    pub fn new<R>(num_shards: usize, queue_cap: usize, reducer: Arc<R>) -> (Self, ShardJoiner<R::Out>)
    where
        R: Reducer<Key = K, ValueIn = V> + Send + Sync + 'static,
    {
        let mut senders = Vec::with_capacity(num_shards);
        let mut handles = Vec::with_capacity(num_shards);
        let metrics: Arc<Vec<ShardCounters>> = Arc::new((0..num_shards).map(|_| ShardCounters::new()).collect());
        for shard in 0..num_shards {
            let (tx, rx) = channel::bounded::<ShuffleMsg<K, V>>(queue_cap);
            let metrics = Arc::clone(&metrics);
            let reducer = Arc::clone(&reducer);
            let handle = thread::spawn(move || {
                let start = Instant::now();
                let counters = &metrics[shard];
                let mut groups: BTreeMap<K, Vec<V>> = BTreeMap::new();
                let mut values_in: u64 = 0;
                loop {
                    match rx.recv() {
                        Ok(ShuffleMsg::Data(batch)) => {
                            counters.recv_batches.fetch_add(1, Ordering::Relaxed);
                            counters.queue_len.fetch_sub(1, Ordering::Relaxed);
                            values_in += batch.len() as u64;
                            for (k, v) in batch {
                                groups.entry(k).or_default().push(v);
                            }
                        }
                        Ok(ShuffleMsg::Close) => break,
                        // aborted, or every sender dropped without closing
                        Ok(ShuffleMsg::Abort) | Err(_) => {
                            debug!(shard, "reduce shard aborted");
                            return None;
                        }
                    }
                }

                let reduce_start = Instant::now();
                let keys = groups.len() as u64;
                let mut outputs = Vec::with_capacity(groups.len());
                for (key, values) in groups {
                    reducer.do_reduce(&key, values, &mut |out| outputs.push(out));
                }
                Some(ShardOutcome {
                    shard,
                    keys,
                    values_in,
                    outputs,
                    reduce_ms: elapsed_ms(reduce_start),
                    wall_ms: elapsed_ms(start),
                })
            });
            senders.push(tx);
            handles.push(handle);
        }
        (Self { senders, metrics }, ShardJoiner { handles })
    }

    pub fn num_shards(&self) -> usize {
        self.senders.len()
    }

    pub fn send_batch(&self, shard: usize, batch: Vec<(K, V)>) -> Result<(), PipelineError> {
        let counters = &self.metrics[shard];
        counters.enq_batches.fetch_add(1, Ordering::Relaxed);
        counters.enq_pairs.fetch_add(batch.len() as u64, Ordering::Relaxed);
        let q = counters.queue_len.fetch_add(1, Ordering::Relaxed) + 1;
        counters.max_queue_len.fetch_max(q, Ordering::Relaxed);
        self.senders[shard]
            .send(ShuffleMsg::Data(batch))
            .map_err(|_| PipelineError::ShuffleDisconnected { shard })
    }

    /// Signals that every map task has finished; shards start reducing.
    pub fn close_all(&self) {
        for tx in &self.senders {
            let _ = tx.send(ShuffleMsg::Close);
        }
    }

    /// Signals shards to drop their groups without reducing.
    pub fn abort_all(&self) {
        for tx in &self.senders {
            let _ = tx.send(ShuffleMsg::Abort);
        }
    }

    pub fn make_thread_emitter(&self, batch_records: usize) -> ThreadEmitter<'_, K, V> {
        ThreadEmitter::new(self, batch_records)
    }
}

/// Per-map-task buffers, one per shard, flushed to the pool in batches.
pub struct ThreadEmitter<'a, K, V> {
    pool: &'a ShufflePool<K, V>,
    local_buffers: Vec<Vec<(K, V)>>,
    batch_records: usize,
    emits: u64,
    batches: u64,
    failed: Option<PipelineError>,
}

impl<'a, K, V> ThreadEmitter<'a, K, V>
where
    K: Send + Ord + Hash + 'static,
    V: Send + 'static,
{
    fn new(pool: &'a ShufflePool<K, V>, batch_records: usize) -> Self {
        let local_buffers = (0..pool.num_shards()).map(|_| Vec::new()).collect();
        Self { pool, local_buffers, batch_records: batch_records.max(1), emits: 0, batches: 0, failed: None }
    }

    pub fn emit(&mut self, key: K, value: V) {
        if self.failed.is_some() {
            return;
        }
        let shard = hash_to_partition(&key, self.local_buffers.len());
        self.local_buffers[shard].push((key, value));
        self.emits += 1;
        if self.local_buffers[shard].len() >= self.batch_records {
            self.flush_shard(shard);
        }
    }

    fn flush_shard(&mut self, shard: usize) {
        let batch = std::mem::take(&mut self.local_buffers[shard]);
        self.batches += 1;
        if let Err(e) = self.pool.send_batch(shard, batch) {
            self.failed.get_or_insert(e);
        }
    }

    /// Flushes remaining buffers; returns `(emits, batches)` or the first send failure.
    pub fn finish(mut self) -> Result<(u64, u64), PipelineError> {
        for shard in 0..self.local_buffers.len() {
            if self.failed.is_some() {
                break;
            }
            if !self.local_buffers[shard].is_empty() {
                self.flush_shard(shard);
            }
        }
        match self.failed.take() {
            Some(e) => Err(e),
            None => Ok((self.emits, self.batches)),
        }
    }
}

struct ShardCounters {
    queue_len: AtomicUsize,
    max_queue_len: AtomicUsize,
    enq_batches: AtomicU64,
    enq_pairs: AtomicU64,
    recv_batches: AtomicU64,
}

impl ShardCounters {
    fn new() -> Self {
        Self {
            queue_len: AtomicUsize::new(0),
            max_queue_len: AtomicUsize::new(0),
            enq_batches: AtomicU64::new(0),
            enq_pairs: AtomicU64::new(0),
            recv_batches: AtomicU64::new(0),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShardMetrics {
    pub max_queue_len: usize,
    pub enq_batches: u64,
    pub enq_pairs: u64,
    pub recv_batches: u64,
}

impl<K, V> ShufflePool<K, V> {
    pub fn metrics_snapshot(&self) -> Vec<ShardMetrics> {
        self.metrics
            .iter()
            .map(|c| ShardMetrics {
                max_queue_len: c.max_queue_len.load(Ordering::Relaxed),
                enq_batches: c.enq_batches.load(Ordering::Relaxed),
                enq_pairs: c.enq_pairs.load(Ordering::Relaxed),
                recv_batches: c.recv_batches.load(Ordering::Relaxed),
            })
            .collect()
    }
}
