//! Issue and project references

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::StoreError;

static PROJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)/([A-Za-z0-9._-]+)$").expect("valid project regex"));

static ISSUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)/([A-Za-z0-9._-]+)/([0-9]+)$").expect("valid issue regex")
});

static BARE_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid number regex"));

/// Refuse names that would walk out of the playground once joined as a path
fn check_path_segment(input: &str, segment: &str) -> Result<(), StoreError> {
    if segment == "." || segment == ".." {
        return Err(StoreError::InvalidReference {
            reference: input.to_string(),
            reason: format!("'{}' is not a valid project name", segment),
        });
    }
    Ok(())
}

/// A project named `<org>/<project>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectRef {
    pub org: String,
    pub project: String,
}

impl ProjectRef {
    pub fn new(org: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            project: project.into(),
        }
    }

    /// Parse `<org>/<project>`, trimming surrounding whitespace
    pub fn parse(input: &str) -> Result<Self, StoreError> {
        let trimmed = input.trim();
        let caps = PROJECT_RE.captures(trimmed).ok_or_else(|| StoreError::InvalidReference {
            reference: input.to_string(),
            reason: "expected <org>/<project>".to_string(),
        })?;
        check_path_segment(input, &caps[2])?;
        Ok(Self::new(&caps[1], &caps[2]))
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.project)
    }
}

impl FromStr for ProjectRef {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProjectRef {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProjectRef> for String {
    fn from(value: ProjectRef) -> Self {
        value.to_string()
    }
}

/// A tracker issue named `<org>/<project>/<number>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IssueRef {
    pub org: String,
    pub project: String,
    pub number: u64,
}

impl IssueRef {
    pub fn new(org: impl Into<String>, project: impl Into<String>, number: u64) -> Self {
        Self {
            org: org.into(),
            project: project.into(),
            number,
        }
    }

    /// Parse a fully qualified issue reference
    pub fn parse(input: &str) -> Result<Self, StoreError> {
        let trimmed = input.trim();
        let caps = ISSUE_RE.captures(trimmed).ok_or_else(|| StoreError::InvalidReference {
            reference: input.to_string(),
            reason: "expected <org>/<project>/<number>".to_string(),
        })?;
        check_path_segment(input, &caps[2])?;
        let number = caps[3].parse::<u64>().map_err(|e| StoreError::InvalidReference {
            reference: input.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(&caps[1], &caps[2], number))
    }

    /// Parse an issue reference, qualifying bare numbers against `primary`
    pub fn normalize(input: &str, primary: Option<&ProjectRef>) -> Result<Self, StoreError> {
        let trimmed = input.trim();
        if BARE_NUMBER_RE.is_match(trimmed) {
            let project = primary.ok_or_else(|| StoreError::InvalidReference {
                reference: input.to_string(),
                reason: "bare issue number with no primary project to qualify it".to_string(),
            })?;
            let number = trimmed.parse::<u64>().map_err(|e| StoreError::InvalidReference {
                reference: input.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(Self::new(&project.org, &project.project, number));
        }
        Self::parse(trimmed)
    }

    /// The project this issue belongs to
    pub fn project_ref(&self) -> ProjectRef {
        ProjectRef::new(&self.org, &self.project)
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.org, self.project, self.number)
    }
}

impl FromStr for IssueRef {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IssueRef {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IssueRef> for String {
    fn from(value: IssueRef) -> Self {
        value.to_string()
    }
}

/// Work branch name (and store key) for a unit whose primary issue is `issue`
pub fn work_branch_name(issue: &IssueRef) -> String {
    format!("work-{}", issue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_project() {
        let p = ProjectRef::parse(" acme/widgets ").unwrap();
        assert_eq!(p.org, "acme");
        assert_eq!(p.project, "widgets");
        assert_eq!(p.to_string(), "acme/widgets");
    }

    #[test]
    fn test_parse_project_rejects_garbage() {
        assert!(ProjectRef::parse("widgets").is_err());
        assert!(ProjectRef::parse("acme/widgets/42").is_err());
        assert!(ProjectRef::parse("").is_err());
    }

    #[test]
    fn test_dot_segments_rejected() {
        for input in ["acme/..", "acme/.", "acme/../42", "acme/./7"] {
            let project = ProjectRef::parse(input);
            let issue = IssueRef::parse(input);
            assert!(project.is_err() && issue.is_err(), "{} accepted", input);
        }
        assert!(ProjectRef::parse("../widgets").is_err());
        let err = ProjectRef::parse("acme/..").unwrap_err();
        assert!(err.is_bad_request());
        assert!(err.to_string().contains("acme/.."));

        // Dots inside a name are fine
        assert_eq!(ProjectRef::parse("acme/widgets.rs").unwrap().project, "widgets.rs");
        assert_eq!(IssueRef::parse("acme/.github/3").unwrap().project, ".github");
    }

    #[test]
    fn test_parse_issue() {
        let i = IssueRef::parse("acme/widgets/42").unwrap();
        assert_eq!(i, IssueRef::new("acme", "widgets", 42));
        assert_eq!(i.project_ref(), ProjectRef::new("acme", "widgets"));
    }

    #[test]
    fn test_normalize_bare_number() {
        let primary = ProjectRef::new("acme", "widgets");
        let i = IssueRef::normalize("42", Some(&primary)).unwrap();
        assert_eq!(i.to_string(), "acme/widgets/42");
    }

    #[test]
    fn test_normalize_bare_number_without_primary() {
        let err = IssueRef::normalize("42", None).unwrap_err();
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_work_branch_name() {
        let i = IssueRef::new("acme", "widgets", 42);
        assert_eq!(work_branch_name(&i), "work-acme/widgets/42");
    }

    #[test]
    fn test_serde_as_string() {
        let i = IssueRef::new("acme", "widgets", 7);
        let yaml = serde_yaml::to_string(&i).unwrap();
        assert_eq!(yaml.trim(), "acme/widgets/7");
        let back: IssueRef = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, i);
    }

    proptest! {
        #[test]
        fn prop_bare_and_qualified_normalize_equal(
            org in "[a-z][a-z0-9-]{0,10}",
            project in "[a-z][a-z0-9._-]{0,10}",
            number in 1u64..100_000,
        ) {
            let primary = ProjectRef::new(&org, &project);
            let bare = IssueRef::normalize(&number.to_string(), Some(&primary)).unwrap();
            let qualified = IssueRef::normalize(&format!("{}/{}/{}", org, project, number), Some(&primary)).unwrap();
            prop_assert_eq!(bare, qualified);
        }

        #[test]
        fn prop_display_parse_identity(
            org in "[a-z][a-z0-9-]{0,10}",
            project in "[a-z][a-z0-9._-]{0,10}",
            number in 0u64..1_000_000,
        ) {
            let issue = IssueRef::new(&org, &project, number);
            prop_assert_eq!(IssueRef::parse(&issue.to_string()).unwrap(), issue);
        }
    }
}
