//! Local git access
//!
//! [`GitFacade`] is the seam between reconciliation logic and the working
//! copies on disk. [`GitCli`] shells out to `git`; [`memory::MemoryGit`]
//! models repositories in memory for tests.

mod cli;
mod error;
mod facade;
mod locks;
pub mod memory;

pub use cli::GitCli;
pub use error::GitError;
pub use facade::{GitFacade, Head, SyncStatus};
pub use locks::RepoLocks;
