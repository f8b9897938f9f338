//! WorkStore - durable records for open units of work
//!
//! A unit of work is a named, cross-repository change effort: one work branch
//! spanning one or more projects, linked to one or more tracker issues. This
//! crate owns the record shape and its on-disk representation.
//!
//! # Architecture
//!
//! ```text
//! work-db.yaml         # map: work key -> WorkUnit
//! work-db.yaml.lock    # advisory lock, held for the lifetime of a WorkStore
//! ```
//!
//! The whole file is read when the store is opened and rewritten after every
//! mutation. Callers only ever receive copies of the stored records.
//!
//! # Example
//!
//! ```ignore
//! use workstore::{LockMode, WorkStore};
//!
//! let store = WorkStore::open("work-db.yaml", LockMode::Shared, Duration::from_secs(5))?;
//! for key in store.keys() {
//!     println!("{}", key);
//! }
//! ```

mod error;
mod lock;
mod record;
mod reference;
mod store;

pub use error::StoreError;
pub use lock::{LockMode, StoreLock};
pub use record::{IssueEntry, ProjectEntry, WorkUnit};
pub use reference::{IssueRef, ProjectRef, work_branch_name};
pub use store::WorkStore;

/// Prefix marking store keys reserved for metadata rather than work units
pub const RESERVED_KEY_PREFIX: char = '_';
