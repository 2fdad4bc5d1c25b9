//! Channels: the external capability and the per-task pool built on it.
//!
//! ## Contents
//! - [`ChannelFactory`], [`ChannelHandle`], [`ChannelRef`] the seam to the external system
//! - [`ChannelState`] health of one channel as observers see it
//! - `ChannelPool` staggered logins, failure marking, reconnection (crate-internal)

mod channel;
mod factory;
mod pool;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::ChannelState;
pub use factory::{ChannelFactory, ChannelHandle, ChannelRef, TargetInfo};
pub(crate) use pool::{ChannelPool, PoolTimings};
