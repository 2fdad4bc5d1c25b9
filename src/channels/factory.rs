//! # External channel capability.
//!
//! The engine never talks to the external system itself. It receives a
//! [`ChannelFactory`] that turns a [`Credential`] into a live [`ChannelHandle`],
//! and the handle performs deliveries.
//!
//! ```text
//! ChannelFactory::login(credential) ──► ChannelRef ──► send(destination, message)
//!                                           │
//!                                           ├──► disconnected()     (resolves when the session drops)
//!                                           └──► describe_target()  (best effort)
//! ```
//!
//! Implementations must be cancellation-safe: the engine may drop a pending
//! `login` or `send` future when the task stops.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::tasks::Credential;

/// Shared handle to a logged-in channel.
pub type ChannelRef = Arc<dyn ChannelHandle>;

/// Best-effort description of a destination, as seen by one channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetInfo {
    /// Display name of the destination, when the external system reports one.
    pub name: Option<String>,
}

/// Authenticates credentials against the external system.
#[async_trait]
pub trait ChannelFactory: Send + Sync + 'static {
    /// Performs one login attempt.
    async fn login(&self, credential: &Credential) -> Result<ChannelRef, ChannelError>;
}

/// A logged-in, send-capable session.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use loopvisor::{ChannelError, ChannelHandle};
///
/// struct Stdout;
///
/// #[async_trait]
/// impl ChannelHandle for Stdout {
///     async fn send(&self, destination: &str, message: &str) -> Result<(), ChannelError> {
///         println!("{destination} <- {message}");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ChannelHandle: Send + Sync + 'static {
    /// Delivers one message to `destination`.
    async fn send(&self, destination: &str, message: &str) -> Result<(), ChannelError>;

    /// Resolves once the external session is lost.
    ///
    /// The default never resolves (the session only fails through `send`).
    async fn disconnected(&self) {
        futures::future::pending::<()>().await
    }

    /// Looks up the destination. Failures are not errors; return `None`.
    async fn describe_target(&self, _destination: &str) -> Option<TargetInfo> {
        None
    }
}
