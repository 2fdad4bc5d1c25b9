//! Dispatch: which message goes next and through which channel.
//!
//! - [`LoopScheduler`] cursor/loop bookkeeping over the message sequence
//! - `Dispatcher` round-robin selection and bounded retries (crate-internal)

mod dispatcher;
mod sequence;

pub use sequence::{Advance, LoopScheduler};

pub(crate) use dispatcher::{Delivery, Dispatcher, Interrupts, SendOutcome};
