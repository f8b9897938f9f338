//! Issue and pull-request tracker access
//!
//! [`TrackerFacade`] covers the handful of reads reconciliation needs plus
//! fork creation for public projects. [`GitHubTracker`] talks to the GitHub
//! REST API; [`memory::MemoryTracker`] is the test double.

mod client;
mod error;
mod github;
pub mod memory;
mod types;

pub use client::TrackerFacade;
pub use error::TrackerError;
pub use github::GitHubTracker;
pub use types::{Issue, PullRequest, PullRequestHead, PullRequestQuery, RepoInfo};
