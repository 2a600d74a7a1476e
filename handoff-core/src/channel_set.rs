use rand::Rng;

use crate::{
    channel::BoundedChannel,
    error::{HandoffError, Result},
    semaphore::WaitStrategy,
};

pub const DEFAULT_LANES: usize = 2;

/// Independent channels of equal capacity. Callers spread their operations
/// over the lanes by picking one at random each time.
///
/// The pick ignores lane state, so a caller may land on a full or empty lane
/// and simply wait there.
#[derive(Debug)]
pub struct ChannelSet<T> {
    lanes: Vec<BoundedChannel<T>>,
}

impl<T> ChannelSet<T> {
    #[inline]
    pub fn new(lanes: usize, capacity: usize, strategy: WaitStrategy) -> Result<Self> {
        if lanes == 0 {
            return Err(HandoffError::NoLanes);
        }
        let lanes = (0..lanes)
            .map(|_| BoundedChannel::with_strategy(capacity, strategy))
            .collect::<Result<Vec<_>>>()?;
        Ok(ChannelSet {
            lanes,
        })
    }

    #[inline]
    pub fn select_for_put(&self) -> (usize, &BoundedChannel<T>) {
        self.select_with(&mut rand::rng())
    }

    #[inline]
    pub fn select_for_take(&self) -> (usize, &BoundedChannel<T>) {
        self.select_with(&mut rand::rng())
    }

    /// Pick a lane uniformly at random using `rng`.
    #[inline]
    pub fn select_with<R: Rng + ?Sized>(&self, rng: &mut R) -> (usize, &BoundedChannel<T>) {
        let index = rng.random_range(0..self.lanes.len());
        (index, &self.lanes[index])
    }

    #[inline]
    pub fn lane(&self, index: usize) -> Option<&BoundedChannel<T>> {
        self.lanes.get(index)
    }

    #[inline]
    pub fn lanes(&self) -> &[BoundedChannel<T>] {
        &self.lanes
    }

    #[inline]
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Items sitting in any lane right now.
    #[inline]
    pub fn in_flight(&self) -> Result<usize> {
        self.lanes.iter().try_fold(0, |total, lane| Ok(total + lane.len()?))
    }
}
