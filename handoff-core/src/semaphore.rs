use std::{
    sync::{Condvar, Mutex, MutexGuard},
    thread,
    time::{Duration, Instant},
};

use tracing::trace;

use crate::error::{HandoffError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// How a caller that drove the count negative waits for its credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Block on a condition variable tied to the semaphore lock.
    #[default]
    Park,
    /// Drop the lock, sleep for `interval`, then re-check. Wake-up latency is
    /// bounded by the interval.
    Poll { interval: Duration },
}

impl WaitStrategy {
    #[inline]
    pub fn poll() -> Self {
        Self::Poll {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug)]
struct Permits {
    /// Negative values count callers still owed a permit.
    count:            isize,
    /// Releases posted while a caller was waiting that nobody has claimed yet.
    pending_releases: usize,
}

impl Permits {
    /// Credits are claimed before `count` is consulted so one is never stranded.
    fn claim(&mut self) -> bool {
        if self.pending_releases > 0 {
            self.pending_releases -= 1;
            return true;
        }
        // Unreachable while callers wait, since count is then pending minus
        // waiters. Kept so a claim never depends on how the count got here.
        self.count >= 0
    }
}

/// Counting semaphore whose count may go negative while callers wait.
///
/// Every `release` that lands while the count is at or below zero leaves a
/// credit in `pending_releases`, which exactly one waiter claims. A release
/// posted between a waiter's decrement and its first check is therefore
/// never lost.
#[derive(Debug)]
pub struct CountingSemaphore {
    permits:  Mutex<Permits>,
    wakeup:   Condvar,
    strategy: WaitStrategy,
}

impl CountingSemaphore {
    #[inline]
    pub fn new(initial_permits: usize) -> Self {
        Self::with_strategy(initial_permits, WaitStrategy::default())
    }

    #[inline]
    pub fn with_strategy(initial_permits: usize, strategy: WaitStrategy) -> Self {
        CountingSemaphore {
            permits: Mutex::new(Permits {
                count:            isize::try_from(initial_permits).unwrap_or(isize::MAX),
                pending_releases: 0,
            }),
            wakeup: Condvar::new(),
            strategy,
        }
    }

    #[inline]
    pub fn strategy(&self) -> WaitStrategy {
        self.strategy
    }

    /// Acquire a permit and block until one is available.
    #[inline]
    pub fn acquire(&self) -> Result<()> {
        let acquired = self.acquire_until(None)?;
        debug_assert!(acquired, "acquire without a deadline cannot time out");
        Ok(())
    }

    /// Acquire a permit, giving up once `timeout` has elapsed.
    ///
    /// A caller that gives up hands its decrement back, so the count is left
    /// as if it had never tried.
    #[inline]
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now().checked_add(timeout);
        if self.acquire_until(deadline)? {
            Ok(())
        } else {
            Err(HandoffError::TimedOut(timeout))
        }
    }

    /// Take a permit only if one is free right now.
    #[inline]
    pub fn try_acquire(&self) -> Result<bool> {
        let mut permits = self.lock()?;
        if permits.count > 0 {
            permits.count -= 1;
            return Ok(true);
        }
        Ok(false)
    }

    /// Releases a permit, allowing next acquire to succeed.
    #[inline]
    pub fn release(&self) -> Result<()> {
        let mut permits = self.lock()?;
        permits.count += 1;
        if permits.count <= 0 {
            permits.pending_releases += 1;
            drop(permits);
            self.wakeup.notify_one();
        }
        Ok(())
    }

    /// Current count. Negative while callers are waiting.
    #[inline]
    pub fn available(&self) -> Result<isize> {
        Ok(self.lock()?.count)
    }

    fn acquire_until(&self, deadline: Option<Instant>) -> Result<bool> {
        let mut permits = self.lock()?;
        permits.count -= 1;
        if permits.count >= 0 {
            return Ok(true);
        }
        trace!(count = permits.count, "semaphore exhausted, waiting for a release");

        loop {
            if permits.claim() {
                return Ok(true);
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        permits.count += 1;
                        return Ok(false);
                    }
                    Some(deadline - now)
                },
                None => None,
            };

            permits = match self.strategy {
                WaitStrategy::Park => match remaining {
                    Some(remaining) => {
                        self.wakeup
                            .wait_timeout(permits, remaining)
                            .map_err(|_| Self::poisoned())?
                            .0
                    },
                    None => self.wakeup.wait(permits).map_err(|_| Self::poisoned())?,
                },
                WaitStrategy::Poll {
                    interval,
                } => {
                    // Releasing the lock is what lets a release get in.
                    drop(permits);
                    thread::sleep(remaining.map_or(interval, |remaining| remaining.min(interval)));
                    self.lock()?
                },
            };
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Permits>> {
        self.permits.lock().map_err(|_| Self::poisoned())
    }

    fn poisoned() -> HandoffError {
        HandoffError::Poisoned {
            lock: "semaphore",
        }
    }

    #[cfg(test)]
    fn pending_releases(&self) -> usize {
        self.lock().expect("semaphore lock").pending_releases
    }
}
