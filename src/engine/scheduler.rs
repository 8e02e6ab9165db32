//! Parallel execution of query jobs.
//!
//! A [`ParallelJobRunner`] owns a fixed rayon pool. A [`QueryJob`] walks the
//! matching chunks of its query on the calling thread and lets the runner
//! split each chunk into contiguous sections that run concurrently.
//!
//! ## Partitioning
//!
//! For a chunk of `L` rows, `T` threads and a minimum section length `m`:
//!
//! * if `T == 1` or `L < m * T` the chunk runs on the calling thread as one
//!   invocation;
//! * otherwise `sections = min(T, ceil(L / m))`, and the chunk is cut in
//!   units of the query's SIMD lane (the lcm of the projected types'
//!   `simd_multiple`). Units are spread evenly, earlier sections taking the
//!   remainder, and the last section is clipped to `L`.
//!
//! Section 0 runs on the calling thread, the others on the pool. A chunk
//! returns only after every section completed. There is no cancellation.
//!
//! ## Invariants
//! * Sections of one chunk never overlap and together cover the chunk.
//! * Every section boundary except the end of the chunk is a multiple of the
//!   SIMD lane.
//! * The runner never touches archetype structure; sections only receive
//!   disjoint `&mut` sub-slices of the columns locked by the query.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::engine::error::{EcsError, EcsResult};
use crate::engine::query::{ChunkEntities, ComponentSet, Query};

/// Greatest common divisor.
const fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple. `lcm(0, x)` is `x`.
pub(crate) const fn lcm(a: usize, b: usize) -> usize {
    if a == 0 || b == 0 {
        return if a == 0 { b } else { a };
    }
    a / gcd(a, b) * b
}

/// Tuning knobs of a [`QueryJob`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobConfig {
    /// A chunk is only split when it holds at least this many rows per
    /// thread, and no section is planned shorter than this.
    pub min_parallel_chunk_length: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self { min_parallel_chunk_length: 128 }
    }
}

/// Lengths of the sections one chunk is split into.
///
/// Produced by [`ParallelJobRunner::sections`].
#[derive(Clone, Debug)]
pub struct Sections {
    remaining: usize,
    lane: usize,
    count: usize,
    emitted: usize,
    base_units: usize,
    extra_units: usize,
}

impl Iterator for Sections {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.emitted == self.count {
            return None;
        }
        let units = self.base_units + usize::from(self.emitted < self.extra_units);
        self.emitted += 1;
        let len = if self.emitted == self.count { self.remaining } else { (units * self.lane).min(self.remaining) };
        self.remaining -= len;
        Some(len)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.count - self.emitted;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Sections {}

/// Chunk data a runner can split into contiguous sections.
///
/// Implemented for tuples of one to five `&mut [T]`.
pub trait ChunkSlices: Send + Sized {
    /// Rows in the chunk.
    fn len(&self) -> usize;

    /// Returns `true` if there are no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits every slice at `mid`.
    fn split_at(self, mid: usize) -> (Self, Self);
}

macro_rules! impl_chunk_slices {
    ($(($T:ident, $n:tt)),+) => {
        impl<'a, $($T: Send),+> ChunkSlices for ($(&'a mut [$T],)+) {
            #[inline]
            fn len(&self) -> usize {
                self.0.len()
            }

            #[inline]
            fn split_at(self, mid: usize) -> (Self, Self) {
                let split = ($(self.$n.split_at_mut(mid),)+);
                (($(split.$n.0,)+), ($(split.$n.1,)+))
            }
        }
    };
}

impl_chunk_slices!((A, 0));
impl_chunk_slices!((A, 0), (B, 1));
impl_chunk_slices!((A, 0), (B, 1), (C, 2));
impl_chunk_slices!((A, 0), (B, 1), (C, 2), (D, 3));
impl_chunk_slices!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));

/// Fixed worker pool plus the calling thread.
///
/// `new(n)` starts `n - 1` pool threads; the thread that runs a job is the
/// `n`-th worker.
pub struct ParallelJobRunner {
    thread_count: usize,
    pool: Option<ThreadPool>,
}

impl fmt::Debug for ParallelJobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelJobRunner").field("thread_count", &self.thread_count).finish()
    }
}

impl ParallelJobRunner {
    /// Runner with `thread_count` workers including the caller. `0` is
    /// treated as `1`.
    ///
    /// ## Errors
    /// [`EcsError::ThreadPool`] if the pool threads cannot be spawned.
    pub fn new(thread_count: usize) -> EcsResult<Self> {
        let thread_count = thread_count.max(1);
        let pool = if thread_count == 1 {
            None
        } else {
            let pool = ThreadPoolBuilder::new()
                .num_threads(thread_count - 1)
                .thread_name(|i| format!("ecs-worker-{i}"))
                .build()
                .map_err(|e| EcsError::ThreadPool(e.to_string()))?;
            Some(pool)
        };
        debug!(thread_count, "job runner started");
        Ok(Self { thread_count, pool })
    }

    /// Runner sized to the machine's available parallelism.
    pub fn with_available_parallelism() -> EcsResult<Self> {
        Self::new(thread::available_parallelism().map_or(1, NonZeroUsize::get))
    }

    /// Workers including the calling thread.
    #[inline]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Section lengths for a chunk of `len` rows.
    ///
    /// Yields exactly one length (`len`) when the chunk runs sequentially.
    pub fn sections(&self, len: usize, min_parallel_chunk_length: usize, lane: usize) -> Sections {
        let min = min_parallel_chunk_length.max(1);
        let lane = lane.max(1);
        let sequential = Sections { remaining: len, lane, count: 1, emitted: 0, base_units: 0, extra_units: 0 };
        if self.thread_count == 1 || len < min.saturating_mul(self.thread_count) {
            return sequential;
        }
        let units = len.div_ceil(lane);
        let count = self.thread_count.min(len.div_ceil(min)).min(units).max(1);
        Sections { remaining: len, lane, count, emitted: 0, base_units: units / count, extra_units: units % count }
    }

    /// Runs `f` over `slices`, split per [`sections`](Self::sections).
    pub(crate) fn run_sections<S, F>(&self, slices: S, entities: ChunkEntities<'_>, lane: usize, min: usize, f: &F)
    where
        S: ChunkSlices,
        F: Fn(S, ChunkEntities<'_>) + Sync,
    {
        let sections = self.sections(slices.len(), min, lane);
        let pool = match &self.pool {
            Some(pool) if sections.len() > 1 => pool,
            _ => return f(slices, entities),
        };
        pool.in_place_scope(|scope| {
            let mut rest = (slices, entities);
            let mut first = None;
            for (n, len) in sections.enumerate() {
                let (head, tail) = rest.0.split_at(len);
                let (head_ids, tail_ids) = rest.1.split_at(len);
                rest = (tail, tail_ids);
                if n == 0 {
                    first = Some((head, head_ids));
                } else {
                    scope.spawn(move |_| f(head, head_ids));
                }
            }
            if let Some((head, head_ids)) = first {
                f(head, head_ids);
            }
        });
    }
}

/// A query bound to a runner and an action.
///
/// Create one with [`Query::job`]; execute it with `run(&store)`. The action
/// receives one section of a chunk per call and must be `Fn + Sync` because
/// sections of the same chunk run concurrently.
///
/// ```ignore
/// let runner = ParallelJobRunner::new(4)?;
/// let mut job = store
///     .query::<(Position, Velocity)>()?
///     .job(&runner, |(positions, velocities), _| {
///         for (p, v) in positions.iter_mut().zip(velocities.iter()) {
///             p.x += v.x;
///         }
///     });
/// job.run(&store)?;
/// ```
pub struct QueryJob<'r, C: ComponentSet, F> {
    pub(crate) query: Query<C>,
    pub(crate) runner: &'r ParallelJobRunner,
    pub(crate) action: F,
    pub(crate) config: JobConfig,
    pub(crate) invocations: AtomicUsize,
}

impl<'r, C: ComponentSet, F> QueryJob<'r, C, F> {
    pub(crate) fn new(query: Query<C>, runner: &'r ParallelJobRunner, config: JobConfig, action: F) -> Self {
        Self { query, runner, action, config, invocations: AtomicUsize::new(0) }
    }

    /// Sets the minimum section length.
    pub fn min_parallel_chunk_length(mut self, len: usize) -> Self {
        self.config.min_parallel_chunk_length = len;
        self
    }

    /// Replaces the job configuration.
    pub fn with_config(mut self, config: JobConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    #[inline]
    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Underlying query.
    #[inline]
    pub fn query(&self) -> &Query<C> {
        &self.query
    }

    /// Number of action calls made by the last `run`.
    #[inline]
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Releases the query.
    pub fn into_query(self) -> Query<C> {
        self.query
    }
}
