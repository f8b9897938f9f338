//! Work branch existence reconciliation

use serde::Serialize;

/// What to do to make a work branch exist both locally and on the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchAction {
    /// Neither exists: create locally, push, set upstream
    CreateAndPush,
    /// Only the remote exists: create a local branch tracking it
    TrackRemote,
    /// Only the local exists: push it and set upstream
    PushLocal,
    /// Both exist
    Nothing,
}

impl BranchAction {
    pub fn plan(remote_exists: bool, local_exists: bool) -> Self {
        match (remote_exists, local_exists) {
            (false, false) => BranchAction::CreateAndPush,
            (true, false) => BranchAction::TrackRemote,
            (false, true) => BranchAction::PushLocal,
            (true, true) => BranchAction::Nothing,
        }
    }

    pub fn describe(&self, branch: &str) -> String {
        match self {
            BranchAction::CreateAndPush => format!("Creating and pushing '{}'...", branch),
            BranchAction::TrackRemote => format!("Pulling remote branch '{}'...", branch),
            BranchAction::PushLocal => format!("Pushing local branch '{}'...", branch),
            BranchAction::Nothing => format!("Work branch '{}' exists locally and remotely; nothing to do.", branch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_table() {
        assert_eq!(BranchAction::plan(false, false), BranchAction::CreateAndPush);
        assert_eq!(BranchAction::plan(true, false), BranchAction::TrackRemote);
        assert_eq!(BranchAction::plan(false, true), BranchAction::PushLocal);
        assert_eq!(BranchAction::plan(true, true), BranchAction::Nothing);
    }

    #[test]
    fn test_describe_names_branch() {
        assert!(BranchAction::TrackRemote.describe("work-a/b/1").contains("work-a/b/1"));
        assert!(BranchAction::Nothing.describe("work-a/b/1").contains("nothing to do"));
    }
}
