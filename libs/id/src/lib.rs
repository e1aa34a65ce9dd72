//! # laterq-id
//!
//! Typed identifiers for the laterq service.
//!
//! Every persisted record is keyed by a UUID. Wrapping each one in its own
//! newtype keeps a `TaskId` from being passed where a `PoolId` is expected,
//! while the canonical string form stays the plain hyphenated UUID that the
//! database columns and deep links already use.
//!
//! ```
//! use laterq_id::TaskId;
//!
//! let id: TaskId = "0b5bb5a4-2f0c-4a3e-9d8a-3c5f4b1f7e21".parse().unwrap();
//! assert_eq!(id.to_string(), "0b5bb5a4-2f0c-4a3e-9d8a-3c5f4b1f7e21");
//! ```

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export uuid for consumers that bind raw UUIDs.
pub use uuid::Uuid;
