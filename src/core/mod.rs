//! Runtime core: engine facade, task actors and the owner registry.
//!
//! The only public API from this module is [`Engine`] (built with
//! [`EngineBuilder`]) and its [`EngineConfig`].
//!
//! Internal modules:
//! - [`engine`]: control operations, event routing, background loops, shutdown;
//! - [`actor`]: runs one dispatch task (logins, sends, restarts);
//! - [`registry`]: owners and their tasks behind one lock;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod actor;
mod builder;
mod config;
mod engine;
mod registry;
mod shutdown;

pub use builder::EngineBuilder;
pub use config::EngineConfig;
pub use engine::Engine;

pub(crate) use actor::TaskActor;
pub(crate) use registry::Registry;
