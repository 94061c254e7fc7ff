//! Durable notification dispatch: enqueue, lease, dispatch, retry.
//!
//! The [`Manager`] owns a dispatcher registry and a wake channel, and runs
//! a configurable number of notifier workers against a shared durable
//! store. Delivery is at-least-once; per-message mutual
//! exclusion is enforced by the store's lease protocol, which also makes
//! recovery from crashed workers automatic.

pub mod manager;
mod notifier;
pub mod wake;

pub use manager::{Manager, NotifierConfig};
pub use wake::{LocalWake, RedisWake, WakeChannel, WakeListener};
