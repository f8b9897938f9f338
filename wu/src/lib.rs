//! Workunit - cross-repository unit-of-work tracking
//!
//! A unit of work is one branch name spanning several projects, linked to
//! tracker issues. Workunit reconciles what local git, the remote host and the
//! tracker say about that unit, and decides when it is finished.
//!
//! # Core Concepts
//!
//! - **Facades at the edges**: [`git::GitFacade`] and [`tracker::TrackerFacade`]
//!   are the only ways out of the process; both have in-memory fakes
//! - **Per-project isolation**: one project failing to reconcile never stops its siblings
//! - **Policy after facts**: [`status::StatusAggregator`] only gathers state;
//!   [`lifecycle`] decides what to do with it
//!
//! # Modules
//!
//! - [`reconcile`] - Per-project status, branch setup and deletion
//! - [`status`] - Concurrent status aggregation over a unit of work
//! - [`lifecycle`] - Closability and branch-deletion policy
//! - [`work`] - Store mutations composed with tracker and git effects
//! - [`providers`] - Identity and dev-linking capabilities
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod lifecycle;
pub mod paths;
pub mod providers;
pub mod reconcile;
pub mod report;
pub mod status;
pub mod store;
pub mod tasklog;
pub mod tracker;
pub mod work;

// Re-export commonly used types
pub use config::Config;
pub use error::{ErrorKind, WorkError};
pub use git::{GitCli, GitError, GitFacade, Head, SyncStatus};
pub use lifecycle::{
    BranchDeletion, CleanAllEntry, CleanOptions, CleanOutcome, Closability, CloseBlocker, LifecycleController,
    ProjectDeletion, SkipReason, evaluate_closable,
};
pub use paths::Playground;
pub use providers::{DevLinker, IdentityProvider, NoopLinker, Providers};
pub use reconcile::{BranchAction, BranchReconciler, BranchSetup, SwitchDirection, SwitchReport};
pub use report::{IssueState, IssueStatus, ProjectStatus, StatusOptions, StatusReport};
pub use status::StatusAggregator;
pub use store::open_store;
pub use tasklog::{LogLevel, TaskLog};
pub use tracker::{GitHubTracker, TrackerError, TrackerFacade};
pub use work::{CreateRequest, WorkService};
