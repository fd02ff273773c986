//! HTTP boundary for keygate
//!
//! Exposes the auth surface over hyper: login, refresh, principal echo and
//! the IP-gated key rotation trigger. Everything else an application would
//! serve (its actual resources) is expected to sit behind
//! [`guard::AccessGuard`] in the embedding service.

pub mod guard;
pub mod handlers;
pub mod server;

pub use guard::{AccessGuard, GuardConfig};
pub use handlers::{AppContext, Credential};
pub use server::Server;
