use std::{
    error::Error,
    fmt,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    error::{HandoffError, Result},
    semaphore::{CountingSemaphore, WaitStrategy},
};

/// Ring storage. Only ever touched with the channel lock held.
struct Ring<T> {
    slots:        Box<[Option<T>]>,
    read_cursor:  usize,
    write_cursor: usize,
    len:          usize,
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        Ring {
            slots:        (0..capacity).map(|_| None).collect(),
            read_cursor:  0,
            write_cursor: 0,
            len:          0,
        }
    }

    fn push(&mut self, item: T) {
        let cursor = self.write_cursor;
        let slot = &mut self.slots[cursor];
        assert!(slot.is_none(), "write cursor {cursor} points at an occupied slot");
        *slot = Some(item);
        self.write_cursor = (cursor + 1) % self.slots.len();
        self.len += 1;
    }

    fn pop(&mut self) -> T {
        let cursor = self.read_cursor;
        let item = self.slots[cursor]
            .take()
            .unwrap_or_else(|| panic!("read cursor {cursor} points at an empty slot"));
        self.read_cursor = (cursor + 1) % self.slots.len();
        self.len -= 1;
        item
    }
}

/// Fixed-capacity FIFO shared between any number of producers and consumers.
///
/// `space_available` counts free slots and `items_available` counts filled
/// ones. A caller holds a unit of the matching semaphore before it touches the
/// ring, so the ring lock is only taken when the operation is known to fit.
pub struct BoundedChannel<T> {
    ring:            Mutex<Ring<T>>,
    space_available: CountingSemaphore,
    items_available: CountingSemaphore,
    capacity:        usize,
}

impl<T> BoundedChannel<T> {
    #[inline]
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_strategy(capacity, WaitStrategy::default())
    }

    #[inline]
    pub fn with_strategy(capacity: usize, strategy: WaitStrategy) -> Result<Self> {
        if capacity == 0 {
            return Err(HandoffError::ZeroCapacity);
        }
        Ok(BoundedChannel {
            ring: Mutex::new(Ring::with_capacity(capacity)),
            space_available: CountingSemaphore::with_strategy(capacity, strategy),
            items_available: CountingSemaphore::with_strategy(0, strategy),
            capacity,
        })
    }

    /// Insert `item`, blocking while the channel is full.
    #[inline]
    pub fn put(&self, item: T) -> Result<()> {
        self.space_available.acquire()?;
        self.ring()?.push(item);
        self.items_available.release()
    }

    /// Insert `item`, handing it back if no slot frees up within `timeout`.
    #[inline]
    pub fn put_timeout(&self, item: T, timeout: Duration) -> Result<(), PutTimeoutError<T>> {
        match self.space_available.acquire_timeout(timeout) {
            Ok(()) => {},
            Err(HandoffError::TimedOut(_)) => return Err(PutTimeoutError::Timeout(item)),
            Err(err) => return Err(PutTimeoutError::Failed(err)),
        }
        self.ring().map_err(PutTimeoutError::Failed)?.push(item);
        self.items_available.release().map_err(PutTimeoutError::Failed)
    }

    /// Remove the oldest item, blocking while the channel is empty.
    #[inline]
    pub fn take(&self) -> Result<T> {
        self.items_available.acquire()?;
        let item = self.ring()?.pop();
        self.space_available.release()?;
        Ok(item)
    }

    #[inline]
    pub fn take_timeout(&self, timeout: Duration) -> Result<T> {
        self.items_available.acquire_timeout(timeout)?;
        let item = self.ring()?.pop();
        self.space_available.release()?;
        Ok(item)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items stored right now.
    #[inline]
    pub fn len(&self) -> Result<usize> {
        Ok(self.ring()?.len)
    }

    #[inline]
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn ring(&self) -> Result<MutexGuard<'_, Ring<T>>> {
        self.ring.lock().map_err(|_| HandoffError::Poisoned {
            lock: "channel",
        })
    }
}

impl<T> fmt::Debug for BoundedChannel<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedChannel")
            .field("capacity", &self.capacity)
            .field("space_available", &self.space_available)
            .field("items_available", &self.items_available)
            .finish_non_exhaustive()
    }
}

/// Error returned by [`BoundedChannel::put_timeout`].
pub enum PutTimeoutError<T> {
    /// No slot freed up in time. The item is handed back.
    Timeout(T),
    Failed(HandoffError),
}

impl<T> PutTimeoutError<T> {
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Recover the undelivered item, if the channel handed it back.
    #[inline]
    pub fn into_inner(self) -> Option<T> {
        match self {
            Self::Timeout(item) => Some(item),
            Self::Failed(_) => None,
        }
    }
}

impl<T> fmt::Debug for PutTimeoutError<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(_) => f.write_str("Timeout(..)"),
            Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

impl<T> fmt::Display for PutTimeoutError<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(_) => f.write_str("Timed out waiting for a free slot"),
            Self::Failed(err) => err.fmt(f),
        }
    }
}

impl<T> Error for PutTimeoutError<T> {
    #[inline]
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Timeout(_) => None,
            Self::Failed(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use super::BoundedChannel;
    use crate::{error::HandoffError, semaphore::WaitStrategy};

    #[test]
    fn poisoned_ring_is_reported_not_propagated() {
        let channel = Arc::new(BoundedChannel::new(2).expect("channel"));
        channel.put(1_u64).expect("put before poisoning");
        let poisoner = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                let _ring = channel.ring.lock().expect("ring lock");
                panic!("panicking while holding the ring lock");
            })
        };
        assert!(poisoner.join().is_err());

        let poisoned = |err: HandoffError| {
            matches!(err, HandoffError::Poisoned { lock: "channel" })
        };
        assert!(poisoned(channel.put(2).expect_err("put")));
        assert!(poisoned(channel.take().expect_err("take")));
        assert!(poisoned(channel.len().expect_err("len")));
        assert!(poisoned(channel.is_empty().expect_err("is_empty")));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            BoundedChannel::<u64>::new(0),
            Err(HandoffError::ZeroCapacity)
        ));
    }

    #[test]
    fn full_channel_blocks_put_until_take() {
        let channel = Arc::new(BoundedChannel::new(2).expect("channel"));
        channel.put(1).expect("put 1");
        channel.put(2).expect("put 2");

        let finished = Arc::new(AtomicBool::new(false));
        let blocked = {
            let channel = Arc::clone(&channel);
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                channel.put(3).expect("put 3");
                finished.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!finished.load(Ordering::SeqCst), "put on a full channel returned");
        assert_eq!(channel.len().expect("len"), 2);

        assert_eq!(channel.take().expect("take"), 1);
        blocked.join().expect("blocked producer");
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(channel.take().expect("take"), 2);
        assert_eq!(channel.take().expect("take"), 3);
        assert!(channel.is_empty().expect("is_empty"));
    }

    #[test]
    fn concurrent_puts_yield_one_of_the_inserted_items() {
        let channel = Arc::new(BoundedChannel::new(4).expect("channel"));
        let producers = [1, 2]
            .into_iter()
            .map(|item| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || channel.put(item).expect("put"))
            })
            .collect::<Vec<_>>();
        for producer in producers {
            producer.join().expect("producer");
        }

        let first = channel.take_timeout(Duration::from_millis(100)).expect("item available");
        assert!(first == 1 || first == 2, "unexpected item {first}");
        assert_eq!(channel.len().expect("len"), 1);
    }

    #[test]
    fn items_come_out_in_insertion_order() {
        let channel = Arc::new(BoundedChannel::new(4).expect("channel"));
        let producer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                for item in 0..500_u32 {
                    channel.put(item).expect("put");
                }
            })
        };

        let received = (0..500).map(|_| channel.take().expect("take")).collect::<Vec<_>>();
        producer.join().expect("producer");
        assert_eq!(received, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn cursors_wrap_around_many_times() {
        let channel = BoundedChannel::new(3).expect("channel");
        for round in 0..50_u32 {
            channel.put(round * 2).expect("put");
            channel.put(round * 2 + 1).expect("put");
            assert_eq!(channel.take().expect("take"), round * 2);
            assert_eq!(channel.take().expect("take"), round * 2 + 1);
        }
        assert!(channel.is_empty().expect("is_empty"));
    }

    #[test]
    fn put_timeout_on_full_channel_hands_item_back() {
        let channel = BoundedChannel::new(1).expect("channel");
        channel.put("first").expect("put");

        let err = channel
            .put_timeout("second", Duration::from_millis(10))
            .expect_err("channel is full");
        assert!(err.is_timeout());
        assert_eq!(err.into_inner(), Some("second"));
        assert_eq!(channel.len().expect("len"), 1);

        assert_eq!(channel.take().expect("take"), "first");
        channel.put_timeout("second", Duration::from_millis(10)).expect("slot is free");
        assert_eq!(channel.take().expect("take"), "second");
    }

    #[test]
    fn take_timeout_on_empty_channel_times_out() {
        let channel = BoundedChannel::<u8>::new(2).expect("channel");
        let err = channel.take_timeout(Duration::from_millis(10)).expect_err("channel is empty");
        assert!(err.is_timeout());

        channel.put(7).expect("put");
        assert_eq!(channel.take_timeout(Duration::from_millis(10)).expect("item"), 7);
    }

    fn hammer(strategy: WaitStrategy) {
        const PRODUCERS: u64 = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: u64 = 400;
        const CAPACITY: usize = 4;

        let channel = Arc::new(BoundedChannel::with_strategy(CAPACITY, strategy).expect("channel"));
        let producers = (0..PRODUCERS)
            .map(|producer| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || {
                    for sequence in 0..PER_PRODUCER {
                        channel.put(producer * PER_PRODUCER + sequence).expect("put");
                    }
                })
            })
            .collect::<Vec<_>>();

        let total = (PRODUCERS * PER_PRODUCER) as usize;
        let consumers = (0..CONSUMERS)
            .map(|_| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || {
                    let mut taken = Vec::with_capacity(total / CONSUMERS);
                    for _ in 0..total / CONSUMERS {
                        let len = channel.len().expect("len");
                        assert!(len <= CAPACITY, "{len} items in a channel of {CAPACITY}");
                        taken.push(channel.take().expect("take"));
                    }
                    taken
                })
            })
            .collect::<Vec<_>>();

        for producer in producers {
            producer.join().expect("producer");
        }
        let mut seen = HashMap::new();
        for consumer in consumers {
            for item in consumer.join().expect("consumer") {
                *seen.entry(item).or_insert(0_u32) += 1;
            }
        }

        assert_eq!(seen.len(), total, "items were lost");
        assert!(seen.values().all(|&count| count == 1), "items were duplicated");
        assert!(channel.is_empty().expect("is_empty"));
    }

    #[test]
    fn many_producers_and_consumers_lose_and_duplicate_nothing() {
        hammer(WaitStrategy::Park);
    }

    #[test]
    fn polling_channel_loses_and_duplicates_nothing() {
        hammer(WaitStrategy::poll());
    }
}
