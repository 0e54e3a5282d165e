//! Retained messages replayed to late subscribers.
//!
//! The bus only talks to the [`HistoryStore`] trait; [`InMemoryHistory`] is
//! the default. Nothing survives a restart.

mod memory;

pub use memory::InMemoryHistory;

use crate::types::{Envelope, TypeKey};
use std::sync::Arc;

/// Storage for retained messages, keyed by concrete message type.
pub trait HistoryStore: Send + Sync {
    /// Retain `message`. Storing a message that is already retained is a
    /// no-op.
    fn store(&self, message: Arc<Envelope>);

    /// Forget `message`. Returns true if it was retained.
    fn remove(&self, message: &Envelope) -> bool;

    fn remove_all(&self);

    /// Retained messages whose concrete type is `contract`, plus, with
    /// `include_subtypes`, those whose concrete type descends from it.
    /// Returned in publish order.
    fn find(&self, contract: TypeKey, include_subtypes: bool) -> Vec<Arc<Envelope>>;

    /// Number of retained messages.
    fn size(&self) -> usize;
}
