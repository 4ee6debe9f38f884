// pool.rs — Pooled runtime resources used by fused bodies
//
// Collector-style evaluations write into a `PooledList` whose backing buffer
// is rented from an `ArrayPool`. The pool is passed in explicitly; the
// process-wide `SharedPool` is only the default. Distinct's `DedupSet` and
// the `SeqCursor` over a wrapped sequence are plain owned resources with an
// explicit release.
//
// Preconditions: none.
// Postconditions: every buffer a `PooledList` rents is given back exactly
//   once, by `dispose` or on drop.
// Failure modes: `Fault::CapacityOverflow` when a collector would grow past
//   its limit.
// Side effects: `SharedPool` retains returned buffers for reuse.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::trace;

use crate::value::{Fault, Key, Value};

// ── Array pool ──

/// Source of reusable element buffers.
pub trait ArrayPool: Send + Sync {
    /// An empty buffer with capacity of at least `min_len`.
    fn rent(&self, min_len: usize) -> Vec<Value>;
    /// Return a buffer previously obtained from `rent`.
    fn give_back(&self, buf: Vec<Value>);
}

const BUCKETS: usize = 32;
const RETAINED_PER_BUCKET: usize = 8;

/// Bucketed pool keyed by power-of-two capacity.
#[derive(Debug)]
pub struct SharedPool {
    buckets: Mutex<Vec<Vec<Vec<Value>>>>,
}

impl Default for SharedPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedPool {
    pub fn new() -> Self {
        SharedPool {
            buckets: Mutex::new(vec![Vec::new(); BUCKETS]),
        }
    }

    /// Process-wide pool.
    pub fn global() -> Arc<SharedPool> {
        static GLOBAL: OnceLock<Arc<SharedPool>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(SharedPool::new())))
    }

    /// Number of buffers currently held for reuse.
    pub fn retained(&self) -> usize {
        self.lock().iter().map(Vec::len).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<Vec<Value>>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn bucket_for_request(min_len: usize) -> usize {
    min_len.max(1).next_power_of_two().trailing_zeros() as usize
}

fn bucket_for_capacity(capacity: usize) -> Option<usize> {
    (capacity > 0).then(|| (usize::BITS - 1 - capacity.leading_zeros()) as usize)
}

impl ArrayPool for SharedPool {
    fn rent(&self, min_len: usize) -> Vec<Value> {
        let bucket = bucket_for_request(min_len);
        if bucket < BUCKETS {
            if let Some(buf) = self.lock()[bucket].pop() {
                return buf;
            }
        }
        Vec::with_capacity(1usize << bucket.min(usize::BITS as usize - 1))
    }

    fn give_back(&self, mut buf: Vec<Value>) {
        buf.clear();
        let Some(bucket) = bucket_for_capacity(buf.capacity()) else {
            return;
        };
        if bucket < BUCKETS {
            let mut buckets = self.lock();
            if buckets[bucket].len() < RETAINED_PER_BUCKET {
                buckets[bucket].push(buf);
            }
        }
    }
}

// ── Pooled collector ──

/// Growable output sink backed by rented buffers.
pub struct PooledList {
    buf: Vec<Value>,
    pool: Arc<dyn ArrayPool>,
    limit: usize,
    rented: bool,
}

impl std::fmt::Debug for PooledList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledList")
            .field("len", &self.buf.len())
            .field("capacity", &self.buf.capacity())
            .field("limit", &self.limit)
            .finish()
    }
}

impl PooledList {
    /// Largest element count a collector may hold.
    pub const DEFAULT_LIMIT: usize = 1 << 28;
    /// Largest buffer rented up front; bigger hints grow on `append`.
    pub const MAX_PRESIZE: usize = 1 << 16;

    pub fn create(pool: Arc<dyn ArrayPool>, hint: usize) -> Self {
        Self::with_limit(pool, hint, Self::DEFAULT_LIMIT)
    }

    pub fn with_limit(pool: Arc<dyn ArrayPool>, hint: usize, limit: usize) -> Self {
        let hint = hint.min(limit).min(Self::MAX_PRESIZE);
        let (buf, rented) = if hint > 0 {
            (pool.rent(hint), true)
        } else {
            (Vec::new(), false)
        };
        PooledList {
            buf,
            pool,
            limit,
            rented,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    fn grow(&mut self, needed: usize) -> Result<(), Fault> {
        if needed > self.limit {
            return Err(Fault::CapacityOverflow {
                requested: needed,
                limit: self.limit,
            });
        }
        let target = needed.max(self.buf.capacity() * 2).max(4).min(self.limit);
        let mut next = self.pool.rent(target);
        next.append(&mut self.buf);
        let old = std::mem::replace(&mut self.buf, next);
        if self.rented {
            self.pool.give_back(old);
        }
        self.rented = true;
        trace!(capacity = self.buf.capacity(), "collector grew");
        Ok(())
    }

    pub fn append(&mut self, value: Value) -> Result<(), Fault> {
        if self.buf.len() >= self.limit {
            return Err(Fault::CapacityOverflow {
                requested: self.buf.len() + 1,
                limit: self.limit,
            });
        }
        if self.buf.len() == self.buf.capacity() {
            self.grow(self.buf.len() + 1)?;
        }
        self.buf.push(value);
        Ok(())
    }

    /// Append everything `iter` yields, growing once per exhausted buffer.
    pub fn add_all(&mut self, iter: impl IntoIterator<Item = Value>) -> Result<(), Fault> {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        if self.buf.len() + lower > self.buf.capacity() {
            self.grow(self.buf.len() + lower)?;
        }
        for value in iter {
            self.append(value)?;
        }
        Ok(())
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.buf
    }

    /// Copy the collected elements out; the rented buffer stays owned until
    /// `dispose`.
    pub fn finalize(&self) -> Vec<Value> {
        self.buf.clone()
    }

    /// Give the backing buffer back. Safe to call more than once.
    pub fn dispose(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        if std::mem::take(&mut self.rented) {
            self.pool.give_back(buf);
        }
    }
}

impl Drop for PooledList {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ── Dedup set ──

/// Seen-set for Distinct; insertion order is irrelevant because the fused
/// loop emits elements as they are first inserted.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: HashSet<Key>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `value` was not seen before.
    pub fn insert(&mut self, value: Value) -> bool {
        self.seen.insert(Key(value))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn release(&mut self) {
        self.seen = HashSet::new();
    }
}

// ── Sequence cursor ──

/// Pull cursor over a wrapped sequence with no random access.
#[derive(Debug, Clone)]
pub struct SeqCursor {
    items: Arc<[Value]>,
    /// Position of the current element; `None` before the first advance.
    pos: Option<usize>,
    closed: bool,
}

impl SeqCursor {
    pub fn open(items: impl Into<Arc<[Value]>>) -> Self {
        SeqCursor {
            items: items.into(),
            pos: None,
            closed: false,
        }
    }

    pub fn advance(&mut self) -> bool {
        if self.closed {
            return false;
        }
        let next = self.pos.map_or(0, |p| p + 1);
        self.pos = Some(next.min(self.items.len()));
        next < self.items.len()
    }

    pub fn current(&self) -> Option<&Value> {
        self.pos.and_then(|p| self.items.get(p))
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingPool {
        rented: AtomicUsize,
        returned: AtomicUsize,
        largest: AtomicUsize,
    }

    impl ArrayPool for CountingPool {
        fn rent(&self, min_len: usize) -> Vec<Value> {
            self.rented.fetch_add(1, Ordering::SeqCst);
            self.largest.fetch_max(min_len, Ordering::SeqCst);
            Vec::with_capacity(min_len)
        }

        fn give_back(&self, _buf: Vec<Value>) {
            self.returned.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn list_returns_every_rented_buffer() {
        let pool = Arc::new(CountingPool::default());
        let mut list = PooledList::create(pool.clone(), 2);
        for i in 0..20 {
            list.append(Value::Int(i)).unwrap();
        }
        assert_eq!(list.len(), 20);
        assert_eq!(list.finalize()[19], Value::Int(19));
        list.dispose();
        list.dispose();
        assert_eq!(
            pool.rented.load(Ordering::SeqCst),
            pool.returned.load(Ordering::SeqCst)
        );
        assert!(pool.rented.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn zero_hint_rents_nothing_until_first_append() {
        let pool = Arc::new(CountingPool::default());
        {
            let list = PooledList::create(pool.clone(), 0);
            assert!(list.is_empty());
        }
        assert_eq!(pool.rented.load(Ordering::SeqCst), 0);
        assert_eq!(pool.returned.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn large_hint_is_capped() {
        let pool = Arc::new(CountingPool::default());
        let mut list = PooledList::create(pool.clone(), PooledList::DEFAULT_LIMIT);
        assert_eq!(pool.largest.load(Ordering::SeqCst), PooledList::MAX_PRESIZE);
        list.add_all((0..3).map(Value::Int)).unwrap();
        assert_eq!(list.len(), 3);
        list.dispose();
        assert_eq!(pool.returned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_gives_back() {
        let pool = Arc::new(CountingPool::default());
        {
            let mut list = PooledList::create(pool.clone(), 4);
            list.append(Value::Int(1)).unwrap();
        }
        assert_eq!(pool.returned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn growth_past_limit_faults() {
        let pool = Arc::new(CountingPool::default());
        let mut list = PooledList::with_limit(pool, 0, 3);
        list.add_all((0..3).map(Value::Int)).unwrap();
        assert_eq!(
            list.append(Value::Int(3)),
            Err(Fault::CapacityOverflow {
                requested: 4,
                limit: 3
            })
        );
    }

    #[test]
    fn shared_pool_reuses_buffers() {
        let pool = SharedPool::new();
        let buf = pool.rent(5);
        assert!(buf.capacity() >= 5);
        pool.give_back(buf);
        assert_eq!(pool.retained(), 1);
        let again = pool.rent(6);
        assert!(again.capacity() >= 6);
        assert_eq!(pool.retained(), 0);
    }

    #[test]
    fn dedup_set_reports_first_sighting() {
        let mut set = DedupSet::new();
        assert!(set.insert(Value::Int(3)));
        assert!(!set.insert(Value::Int(3)));
        assert!(set.insert(Value::Str("3".into())));
        set.release();
        assert!(set.is_empty());
    }

    #[test]
    fn cursor_walks_then_stops() {
        let mut c = SeqCursor::open(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(c.current(), None);
        assert!(c.advance());
        assert_eq!(c.current(), Some(&Value::Int(1)));
        assert!(c.advance());
        assert!(!c.advance());
        assert!(!c.advance());
        c.close();
        assert!(c.is_closed());
    }
}
