//! # Event consumers.
//!
//! Two kinds of consumers receive engine events:
//!
//! ```text
//!   Bus ──► router ──┬──► Broadcaster ──► Observer (owner-scoped, optionally one task)
//!                    └──► SubscriberSet ──► Subscribe impls (process-wide)
//! ```
//!
//! - [`Observer`]: what a transport holds for one connected owner. Created by
//!   [`Engine::subscribe`](crate::Engine::subscribe).
//! - [`Subscribe`]: process-wide handlers registered on the
//!   [`EngineBuilder`](crate::EngineBuilder) (logging, audit, metrics).

mod broadcaster;
mod embedded;
mod set;
mod subscribe;

pub use broadcaster::Observer;
#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;

pub(crate) use broadcaster::Broadcaster;
