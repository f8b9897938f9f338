//! Persisted work unit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reference::{IssueRef, ProjectRef};

/// An issue linked to a unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueEntry {
    pub id: IssueRef,
    #[serde(default)]
    pub summary: String,
}

/// A project participating in a unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub name: ProjectRef,
    #[serde(default)]
    pub private: bool,
}

/// One open unit of work
///
/// `key` doubles as the git branch name in every listed project. `initiator`
/// and the start timestamps are set once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkUnit {
    #[serde(alias = "workBranch")]
    pub key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub initiator: String,
    pub started: String,
    pub started_epoch: i64,
    #[serde(default)]
    pub issues: Vec<IssueEntry>,
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
}

impl WorkUnit {
    /// Create an empty unit stamped with `now`
    pub fn new(
        key: impl Into<String>,
        description: impl Into<String>,
        initiator: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            initiator: initiator.into(),
            started: now.format("%Y-%m-%d").to_string(),
            started_epoch: now.timestamp_millis(),
            issues: Vec::new(),
            projects: Vec::new(),
        }
    }

    /// The first listed project; bare issue numbers are qualified against it
    pub fn primary_project(&self) -> Option<&ProjectRef> {
        self.projects.first().map(|p| &p.name)
    }

    pub fn has_issue(&self, id: &IssueRef) -> bool {
        self.issues.iter().any(|i| &i.id == id)
    }

    pub fn has_project(&self, name: &ProjectRef) -> bool {
        self.projects.iter().any(|p| &p.name == name)
    }

    pub fn project(&self, name: &ProjectRef) -> Option<&ProjectEntry> {
        self.projects.iter().find(|p| &p.name == name)
    }

    pub fn issue_ids(&self) -> impl Iterator<Item = &IssueRef> {
        self.issues.iter().map(|i| &i.id)
    }

    pub fn project_names(&self) -> impl Iterator<Item = &ProjectRef> {
        self.projects.iter().map(|p| &p.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> WorkUnit {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 0).unwrap();
        let mut unit = WorkUnit::new("work-acme/widgets/42", "Fix widgets", "dev@acme.io", now);
        unit.issues.push(IssueEntry {
            id: IssueRef::new("acme", "widgets", 42),
            summary: "Fix widgets".to_string(),
        });
        unit.projects.push(ProjectEntry {
            name: ProjectRef::new("acme", "widgets"),
            private: true,
        });
        unit
    }

    #[test]
    fn test_new_stamps_dates() {
        let unit = sample();
        assert_eq!(unit.started, "2024-03-09");
        assert_eq!(unit.started_epoch, 1_709_987_400_000);
    }

    #[test]
    fn test_lookups() {
        let unit = sample();
        assert!(unit.has_issue(&IssueRef::new("acme", "widgets", 42)));
        assert!(!unit.has_issue(&IssueRef::new("acme", "widgets", 43)));
        assert!(unit.has_project(&ProjectRef::new("acme", "widgets")));
        assert_eq!(unit.primary_project(), Some(&ProjectRef::new("acme", "widgets")));
    }

    #[test]
    fn test_yaml_field_names() {
        let yaml = serde_yaml::to_string(&sample()).unwrap();
        assert!(yaml.contains("startedEpoch:"));
        assert!(yaml.contains("id: acme/widgets/42"));
        assert!(yaml.contains("name: acme/widgets"));
    }

    #[test]
    fn test_legacy_work_branch_alias() {
        let yaml = r#"
workBranch: work-acme/widgets/1
started: "2024-01-01"
startedEpoch: 0
"#;
        let unit: WorkUnit = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(unit.key, "work-acme/widgets/1");
        assert!(unit.issues.is_empty());
    }
}
