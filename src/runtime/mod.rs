//! Run-time consumers of a built hierarchy
//!
//! - **Camera** (`camera`): perspective projection of error witnesses.
//! - **Selector** (`selector`): per-view cut through the cluster DAG under a
//!   pixel error threshold.
//! - **Streaming** (`streaming`): bounded residency table with LRU
//!   replacement.
//!
//! Both the selector and the cache are single-threaded per call; share
//! them across threads behind a lock.
//!
//! Author: Moroya Sakamoto

pub mod camera;
pub mod selector;
pub mod streaming;

pub use camera::Camera;
pub use selector::{RuntimeSelector, Selection};
pub use streaming::{Residency, Slot, StreamingCache, StreamingError, StreamingStats};
