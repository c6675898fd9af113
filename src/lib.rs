//! Online bookstore backend.
//!
//! Domain modules (catalog, users, orders, notifications, real-time events)
//! built on the kernel module lifecycle and mounted by the HTTP facade.

pub mod app;
pub mod context;
pub mod effects;
pub mod mail;
pub mod modules;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use app::App;
pub use context::{AppContext, SharedContext};
