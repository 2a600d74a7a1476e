use std::{
    fmt,
    io::Write,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
        Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use rand::Rng;
use tracing::{debug, error, trace};

use crate::{
    channel::PutTimeoutError,
    channel_set::ChannelSet,
    error::{HandoffError, Result},
    settings::Settings,
};

/// Pauses are a uniform pick of `0..JITTER_STEPS` jitter units.
pub const JITTER_STEPS: u32 = 5;

/// Running counts shared by every driver of a run.
#[derive(Debug, Default)]
pub struct Tally {
    produced: AtomicU64,
    consumed: AtomicU64,
}

impl Tally {
    #[inline]
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub produced:  u64,
    pub consumed:  u64,
    pub in_flight: usize,
}

impl fmt::Display for RunSummary {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "produced {} items, consumed {}, {} left in flight",
            self.produced, self.consumed, self.in_flight
        )
    }
}

/// Sleep for `duration`, waking early once `cancelled` is raised.
fn nap(duration: Duration, slice: Duration, cancelled: &AtomicBool) {
    let deadline = Instant::now() + duration;
    loop {
        if cancelled.load(Ordering::Relaxed) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(slice));
    }
}

fn pause<R: Rng + ?Sized>(rng: &mut R, settings: &Settings, cancelled: &AtomicBool) {
    let jitter = settings.jitter() * rng.random_range(0..JITTER_STEPS);
    if !jitter.is_zero() {
        nap(jitter, settings.cancel_check(), cancelled);
    }
}

/// Put increasing tokens, starting at 1, on randomly chosen lanes until
/// cancelled or until the per-producer limit is reached.
///
/// Returns the number of items this producer delivered.
#[inline]
pub fn produce(
    id: usize,
    set: &ChannelSet<u64>,
    settings: &Settings,
    tally: &Tally,
    cancelled: &AtomicBool,
) -> Result<u64> {
    let mut rng = rand::rng();
    let mut delivered = 0;
    debug!("Producer {} started", id);

    'items: for item in 1.. {
        if settings.items_per_producer.is_some_and(|limit| item > limit) {
            break;
        }
        pause(&mut rng, settings, cancelled);
        if cancelled.load(Ordering::Relaxed) {
            break;
        }

        let (lane, channel) = set.select_with(&mut rng);
        let mut pending = item;
        loop {
            match channel.put_timeout(pending, settings.cancel_check()) {
                Ok(()) => break,
                Err(PutTimeoutError::Timeout(returned)) => {
                    if cancelled.load(Ordering::Relaxed) {
                        break 'items;
                    }
                    pending = returned;
                },
                Err(PutTimeoutError::Failed(err)) => return Err(err),
            }
        }

        trace!(producer = id, lane, item, "put");
        tally.produced.fetch_add(1, Ordering::SeqCst);
        delivered += 1;
    }

    debug!("Producer {} stopped after {} items", id, delivered);
    Ok(delivered)
}

/// Take items from randomly chosen lanes and write each one, followed by a
/// space, to `output`.
///
/// Stops when cancelled, or once `target` items have been consumed across
/// all consumers. Returns the number of items this consumer took.
#[inline]
pub fn consume<W: Write>(
    id: usize,
    set: &ChannelSet<u64>,
    settings: &Settings,
    tally: &Tally,
    output: &Mutex<W>,
    target: Option<u64>,
    cancelled: &AtomicBool,
) -> Result<u64> {
    let mut rng = rand::rng();
    let mut taken = 0;
    debug!("Consumer {} started", id);

    loop {
        if target.is_some_and(|target| tally.consumed() >= target) {
            break;
        }
        pause(&mut rng, settings, cancelled);
        if cancelled.load(Ordering::Relaxed) {
            break;
        }

        let (lane, channel) = set.select_with(&mut rng);
        let item = match channel.take_timeout(settings.cancel_check()) {
            Ok(item) => item,
            Err(err) if err.is_timeout() => continue,
            Err(err) => return Err(err),
        };
        tally.consumed.fetch_add(1, Ordering::SeqCst);
        taken += 1;
        trace!(consumer = id, lane, item, "take");

        let mut out = output.lock().map_err(|_| HandoffError::Poisoned {
            lock: "output",
        })?;
        write!(out, "{} ", item)?;
        out.flush()?;
    }

    debug!("Consumer {} stopped after {} items", id, taken);
    Ok(taken)
}

/// Run `settings.producers` producers and `settings.consumers` consumers over
/// `set` until `cancelled` is raised or a bounded run has moved every item.
///
/// A driver that fails raises `cancelled` so the rest wind down, and the
/// first failure is returned once every driver has been joined.
#[tracing::instrument(skip_all)]
#[inline]
pub fn run<W: Write + Send>(
    set: &Arc<ChannelSet<u64>>,
    settings: &Settings,
    output: &Arc<Mutex<W>>,
    cancelled: &Arc<AtomicBool>,
) -> Result<RunSummary> {
    settings.validate()?;
    let tally = Arc::new(Tally::default());
    let target = settings.total_items();
    debug!(
        "Running {} producers and {} consumers over {} lanes of {} slots",
        settings.producers,
        settings.consumers,
        set.lane_count(),
        settings.capacity
    );

    let results = crossbeam_utils::thread::scope(|s| {
        let mut drivers = Vec::with_capacity(settings.producers + settings.consumers);

        for id in 0..settings.producers {
            let set = Arc::clone(set);
            let tally = Arc::clone(&tally);
            let cancelled = Arc::clone(cancelled);
            drivers.push(s.spawn(move |_| {
                let result = produce(id, &set, settings, &tally, &cancelled).map(|_| ());
                if result.is_err() {
                    cancelled.store(true, Ordering::SeqCst);
                }
                result
            }));
        }

        for id in 0..settings.consumers {
            let set = Arc::clone(set);
            let tally = Arc::clone(&tally);
            let output = Arc::clone(output);
            let cancelled = Arc::clone(cancelled);
            drivers.push(s.spawn(move |_| {
                let result =
                    consume(id, &set, settings, &tally, &output, target, &cancelled).map(|_| ());
                if result.is_err() {
                    cancelled.store(true, Ordering::SeqCst);
                }
                result
            }));
        }

        drivers
            .into_iter()
            .map(|driver| driver.join().expect("should join driver thread"))
            .collect::<Vec<_>>()
    })
    .expect("driver threads should not panic");

    if let Some(err) = results.into_iter().find_map(Result::err) {
        error!("{}", err);
        return Err(err);
    }

    Ok(RunSummary {
        produced:  tally.produced(),
        consumed:  tally.consumed(),
        in_flight: set.in_flight()?,
    })
}
