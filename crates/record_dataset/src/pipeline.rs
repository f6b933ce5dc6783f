//! Shuffle, repeat, and batch stages over decoded record streams.
//!
//! Every stage is a plain `Iterator` over `DatasetResult<_>` items and pulls from its
//! upstream on demand. An error ends the stream after it has been yielded once.

use crate::reader::decode_files;
use crate::types::{Batch, DatasetResult, RecordDatasetError, Sample};
use crossbeam_channel::{bounded, Receiver};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::thread;

pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const DEFAULT_SHUFFLE_BUFFER_SIZE: usize = 1000;

/// Mixes the epoch into the base seed so every epoch is reshuffled.
const EPOCH_SEED_STRIDE: u64 = 0x9e37_79b9_7f4a_7c15;

pub type SampleStream = Box<dyn Iterator<Item = DatasetResult<Sample>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Shuffled and repeated indefinitely.
    Train,
    /// One ordered pass.
    Eval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Forever,
    Times(usize),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: Mode,
    /// Samples per batch (default 64).
    pub batch_size: usize,
    /// Shuffle buffer capacity in train mode (default 1000).
    pub shuffle_buffer_size: usize,
    /// Seed for reproducible shuffling; drawn from the OS when `None`.
    pub seed: Option<u64>,
    /// Overrides the mode's repeat policy (train: forever, eval: once).
    pub repeat: Option<Repeat>,
    /// Drop a trailing batch shorter than `batch_size`.
    pub drop_remainder: bool,
    /// Decode on a background thread with this many samples queued.
    pub prefetch: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Train,
            batch_size: DEFAULT_BATCH_SIZE,
            shuffle_buffer_size: DEFAULT_SHUFFLE_BUFFER_SIZE,
            seed: None,
            repeat: None,
            drop_remainder: false,
            prefetch: None,
        }
    }
}

impl PipelineConfig {
    pub fn train() -> Self {
        Self::default()
    }

    pub fn eval() -> Self {
        Self {
            mode: Mode::Eval,
            ..Self::default()
        }
    }

    pub fn repeat_policy(&self) -> Repeat {
        self.repeat.unwrap_or(match self.mode {
            Mode::Train => Repeat::Forever,
            Mode::Eval => Repeat::Times(1),
        })
    }

    pub fn describe(&self) -> String {
        format!(
            "mode={:?} batch_size={} shuffle_buffer={} repeat={:?} drop_remainder={} prefetch={} seed={}",
            self.mode,
            self.batch_size,
            self.shuffle_buffer_size,
            self.repeat_policy(),
            self.drop_remainder,
            self.prefetch
                .map(|p| p.to_string())
                .unwrap_or_else(|| "off".to_string()),
            self.seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }

    fn validate(&self) -> DatasetResult<()> {
        if self.batch_size == 0 {
            return Err(RecordDatasetError::InvalidConfig {
                msg: "batch_size must be at least 1".to_string(),
            });
        }
        if self.prefetch == Some(0) {
            return Err(RecordDatasetError::InvalidConfig {
                msg: "prefetch depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Bounded-buffer shuffle: each output is drawn uniformly from up to `capacity` buffered items.
pub struct ShuffleBuffer<I, T> {
    upstream: I,
    buffer: Vec<T>,
    capacity: usize,
    rng: StdRng,
    upstream_done: bool,
    failed: bool,
}

impl<I, T> ShuffleBuffer<I, T>
where
    I: Iterator<Item = DatasetResult<T>>,
{
    pub fn new(upstream: I, capacity: usize, seed: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            upstream,
            buffer: Vec::with_capacity(capacity.min(4096)),
            capacity,
            rng: StdRng::seed_from_u64(seed),
            upstream_done: false,
            failed: false,
        }
    }
}

impl<I, T> Iterator for ShuffleBuffer<I, T>
where
    I: Iterator<Item = DatasetResult<T>>,
{
    type Item = DatasetResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while !self.upstream_done && self.buffer.len() < self.capacity {
            match self.upstream.next() {
                Some(Ok(item)) => self.buffer.push(item),
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                None => self.upstream_done = true,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let idx = self.rng.random_range(0..self.buffer.len());
        Some(Ok(self.buffer.swap_remove(idx)))
    }
}

/// Re-creates its upstream from `factory(epoch)` until the repeat policy is exhausted.
pub struct RepeatSource<F, I> {
    factory: F,
    current: Option<I>,
    policy: Repeat,
    epoch: usize,
    yielded_this_epoch: usize,
    failed: bool,
}

impl<F, I, T> RepeatSource<F, I>
where
    F: FnMut(usize) -> I,
    I: Iterator<Item = DatasetResult<T>>,
{
    pub fn new(factory: F, policy: Repeat) -> Self {
        Self {
            factory,
            current: None,
            policy,
            epoch: 0,
            yielded_this_epoch: 0,
            failed: false,
        }
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

impl<F, I, T> Iterator for RepeatSource<F, I>
where
    F: FnMut(usize) -> I,
    I: Iterator<Item = DatasetResult<T>>,
{
    type Item = DatasetResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if self.current.is_none() {
                if let Repeat::Times(n) = self.policy {
                    if self.epoch >= n {
                        return None;
                    }
                }
                self.current = Some((self.factory)(self.epoch));
                self.yielded_this_epoch = 0;
            }
            let upstream = self.current.as_mut()?;
            match upstream.next() {
                Some(Ok(item)) => {
                    self.yielded_this_epoch += 1;
                    return Some(Ok(item));
                }
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                None => {
                    self.current = None;
                    let empty = self.yielded_this_epoch == 0;
                    self.epoch += 1;
                    if empty && self.policy == Repeat::Forever {
                        self.failed = true;
                        return Some(Err(RecordDatasetError::NothingToRepeat));
                    }
                    tracing::debug!(epoch = self.epoch, "record stream epoch complete");
                }
            }
        }
    }
}

/// Groups samples into batches of `batch_size`; the trailing batch may be shorter.
pub struct Batcher<I> {
    upstream: I,
    batch_size: usize,
    drop_remainder: bool,
    finished: bool,
}

impl<I> Batcher<I>
where
    I: Iterator<Item = DatasetResult<Sample>>,
{
    pub fn new(upstream: I, batch_size: usize, drop_remainder: bool) -> Self {
        Self {
            upstream,
            batch_size: batch_size.max(1),
            drop_remainder,
            finished: false,
        }
    }
}

impl<I> Iterator for Batcher<I>
where
    I: Iterator<Item = DatasetResult<Sample>>,
{
    type Item = DatasetResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let mut batch = Batch::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.upstream.next() {
                Some(Ok(sample)) => batch.push(sample),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    break;
                }
            }
        }
        if batch.is_empty() || (self.drop_remainder && batch.len() < self.batch_size) {
            return None;
        }
        Some(Ok(batch))
    }
}

/// Runs an upstream stream on a background thread, queueing up to `depth` items.
///
/// Dropping the consumer disconnects the channel, which stops the producer.
pub struct Prefetch<T> {
    rx: Receiver<DatasetResult<T>>,
}

impl<T: Send + 'static> Prefetch<T> {
    pub fn spawn<I>(upstream: I, depth: usize) -> Self
    where
        I: Iterator<Item = DatasetResult<T>> + Send + 'static,
    {
        let (tx, rx) = bounded(depth.max(1));
        thread::spawn(move || {
            for item in upstream {
                let stop = item.is_err();
                if tx.send(item).is_err() || stop {
                    break;
                }
            }
        });
        Self { rx }
    }
}

impl<T> Iterator for Prefetch<T> {
    type Item = DatasetResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

/// Batches pulled from a built pipeline.
pub struct BatchIter {
    inner: Batcher<SampleStream>,
    mode: Mode,
}

impl BatchIter {
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

impl Iterator for BatchIter {
    type Item = DatasetResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

pub struct BatchPipeline;

impl BatchPipeline {
    /// Build decode -> (shuffle) -> repeat -> batch over the given containers.
    ///
    /// Train mode never ends on its own unless `repeat` overrides it; eval mode makes one
    /// ordered pass and keeps the final short batch.
    pub fn build(paths: &[PathBuf], cfg: &PipelineConfig) -> DatasetResult<BatchIter> {
        cfg.validate()?;
        if paths.is_empty() {
            return Err(RecordDatasetError::InvalidConfig {
                msg: "no record containers given".to_string(),
            });
        }
        tracing::info!(containers = paths.len(), "building pipeline: {}", cfg.describe());

        let paths = paths.to_vec();
        let policy = cfg.repeat_policy();
        let mut stream: SampleStream = match cfg.mode {
            Mode::Train => {
                let base_seed = cfg.seed.unwrap_or_else(rand::random);
                let buffer = cfg.shuffle_buffer_size;
                let factory = move |epoch: usize| {
                    let seed = base_seed ^ (epoch as u64).wrapping_mul(EPOCH_SEED_STRIDE);
                    ShuffleBuffer::new(decode_files(&paths), buffer, seed)
                };
                Box::new(RepeatSource::new(factory, policy))
            }
            Mode::Eval => {
                let factory = move |_epoch: usize| decode_files(&paths);
                Box::new(RepeatSource::new(factory, policy))
            }
        };
        if let Some(depth) = cfg.prefetch {
            stream = Box::new(Prefetch::spawn(stream, depth));
        }
        Ok(BatchIter {
            inner: Batcher::new(stream, cfg.batch_size, cfg.drop_remainder),
            mode: cfg.mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_items(n: usize) -> impl Iterator<Item = DatasetResult<usize>> {
        (0..n).map(Ok)
    }

    fn sample(label: i32) -> Sample {
        Sample {
            image: vec![label as f32; 2],
            label,
        }
    }

    fn samples(n: usize) -> impl Iterator<Item = DatasetResult<Sample>> {
        (0..n as i32).map(|l| Ok(sample(l)))
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut out: Vec<usize> = ShuffleBuffer::new(ok_items(100), 10, 7)
            .map(Result::unwrap)
            .collect();
        assert_ne!(out, (0..100).collect::<Vec<_>>());
        out.sort();
        assert_eq!(out, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn shuffle_buffer_of_one_keeps_order() {
        let out: Vec<usize> = ShuffleBuffer::new(ok_items(20), 1, 3)
            .map(Result::unwrap)
            .collect();
        assert_eq!(out, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn shuffle_draws_only_from_buffered_items() {
        for seed in 0..20 {
            let out: Vec<usize> = ShuffleBuffer::new(ok_items(50), 4, seed)
                .map(Result::unwrap)
                .collect();
            // After k outputs only the first k + 4 inputs can have entered the buffer.
            for (k, v) in out.iter().enumerate() {
                assert!(*v < k + 4, "seed {seed}: item {v} emitted at {k}");
            }
        }
    }

    #[test]
    fn shuffle_is_deterministic_per_seed() {
        let a: Vec<usize> = ShuffleBuffer::new(ok_items(30), 8, 11)
            .map(Result::unwrap)
            .collect();
        let b: Vec<usize> = ShuffleBuffer::new(ok_items(30), 8, 11)
            .map(Result::unwrap)
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn shuffle_passes_errors_through_and_stops() {
        let upstream = vec![Ok(1), Err(RecordDatasetError::Other("boom".into())), Ok(2)];
        let out: Vec<_> = ShuffleBuffer::new(upstream.into_iter(), 10, 0).collect();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
    }

    #[test]
    fn repeat_times_replays_each_epoch() {
        let out: Vec<usize> = RepeatSource::new(|_| ok_items(3), Repeat::Times(2))
            .map(Result::unwrap)
            .collect();
        assert_eq!(out, vec![0, 1, 2, 0, 1, 2]);

        let none: Vec<_> = RepeatSource::new(|_| ok_items(3), Repeat::Times(0)).collect();
        assert!(none.is_empty());
    }

    #[test]
    fn repeat_forever_keeps_going() {
        let mut epochs_seen = Vec::new();
        let out: Vec<usize> = RepeatSource::new(
            |epoch| {
                epochs_seen.push(epoch);
                ok_items(2)
            },
            Repeat::Forever,
        )
        .take(7)
        .map(Result::unwrap)
        .collect();
        assert_eq!(out, vec![0, 1, 0, 1, 0, 1, 0]);
        assert_eq!(epochs_seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn repeat_forever_over_nothing_is_an_error() {
        let out: Vec<_> = RepeatSource::new(|_| ok_items(0), Repeat::Forever)
            .take(3)
            .collect();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(RecordDatasetError::NothingToRepeat)));
    }

    #[test]
    fn batcher_keeps_short_tail() {
        let sizes: Vec<usize> = Batcher::new(samples(10), 4, false)
            .map(|b| b.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let sizes: Vec<usize> = Batcher::new(samples(8), 4, false)
            .map(|b| b.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![4, 4]);
    }

    #[test]
    fn batcher_can_drop_short_tail() {
        let sizes: Vec<usize> = Batcher::new(samples(10), 4, true)
            .map(|b| b.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![4, 4]);
    }

    #[test]
    fn batcher_stacks_in_order() {
        let batch = Batcher::new(samples(3), 3, false).next().unwrap().unwrap();
        assert_eq!(batch.labels, vec![0, 1, 2]);
        assert_eq!(batch.images, vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn batcher_on_empty_stream_yields_nothing() {
        assert!(Batcher::new(samples(0), 4, false).next().is_none());
    }

    #[test]
    fn prefetch_preserves_items_and_order() {
        let out: Vec<usize> = Prefetch::spawn(ok_items(100), 3)
            .map(Result::unwrap)
            .collect();
        assert_eq!(out, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn prefetch_stops_after_error() {
        let upstream = vec![Ok(1usize), Err(RecordDatasetError::Other("x".into())), Ok(2)];
        let out: Vec<_> = Prefetch::spawn(upstream.into_iter(), 1).collect();
        assert_eq!(out.len(), 2);
        assert!(out[1].is_err());
    }

    #[test]
    fn config_defaults_and_validation() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.batch_size, 64);
        assert_eq!(cfg.shuffle_buffer_size, 1000);
        assert_eq!(cfg.repeat_policy(), Repeat::Forever);
        assert_eq!(PipelineConfig::eval().repeat_policy(), Repeat::Times(1));

        let bad = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::eval()
        };
        assert!(matches!(
            BatchPipeline::build(&[PathBuf::from("x")], &bad),
            Err(RecordDatasetError::InvalidConfig { .. })
        ));
        assert!(matches!(
            BatchPipeline::build(&[], &PipelineConfig::eval()),
            Err(RecordDatasetError::InvalidConfig { .. })
        ));
    }
}
