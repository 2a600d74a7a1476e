//! Bounded producer/consumer hand-off.
//!
//! Items travel through [`BoundedChannel`]s, each gated by two
//! [`CountingSemaphore`]s: one counting free slots, one counting filled ones.
//! A [`ChannelSet`] groups several channels into lanes, and the drivers in
//! [`worker`] spread producers and consumers across them at random.

pub mod channel;
pub mod channel_set;
pub mod error;
pub mod semaphore;
pub mod settings;
pub mod worker;

pub use crate::{
    channel::{BoundedChannel, PutTimeoutError},
    channel_set::ChannelSet,
    error::{HandoffError, Result, SettingsError},
    semaphore::{CountingSemaphore, WaitStrategy},
    settings::{Settings, WaitMode},
    worker::RunSummary,
};
