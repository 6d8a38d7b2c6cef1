//! Dense 1..N ordering for service queues.
//!
//! [`transition`] holds the pure order arithmetic, [`QueueStore`] is the
//! persistence seam, and [`QueueOrderingEngine`] ties the two together so that
//! every mutation is committed as one transition and verified on failure.

mod engine;
mod error;
mod store;
pub mod transition;

pub use engine::QueueOrderingEngine;
pub use error::{OrderingError, PersistError};
pub use store::{QueueItemRecord, QueueStore};
pub use transition::{OrderChange, OrderedItem, Transition};
