//! YAML-backed work store

use serde_yaml::Value;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::RESERVED_KEY_PREFIX;
use crate::error::StoreError;
use crate::lock::{LockMode, StoreLock};
use crate::record::{IssueEntry, ProjectEntry, WorkUnit};
use crate::reference::{IssueRef, ProjectRef};

/// The durable map of open units of work
///
/// Holds the store lock for as long as the value lives.
#[derive(Debug)]
pub struct WorkStore {
    path: PathBuf,
    units: BTreeMap<String, WorkUnit>,
    reserved: BTreeMap<String, Value>,
    lock: StoreLock,
}

impl WorkStore {
    /// Lock and load the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl AsRef<Path>, mode: LockMode, lock_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), ?mode, "WorkStore::open: called");

        let lock = StoreLock::acquire(&lock_path(&path), mode, lock_timeout)?;
        let (units, reserved) = Self::load(&path)?;

        debug!(count = units.len(), "WorkStore::open: loaded");
        Ok(Self {
            path,
            units,
            reserved,
            lock,
        })
    }

    fn load(path: &Path) -> Result<(BTreeMap<String, WorkUnit>, BTreeMap<String, Value>), StoreError> {
        let mut units = BTreeMap::new();
        let mut reserved = BTreeMap::new();

        if !path.exists() {
            debug!("WorkStore::load: no store file yet");
            return Ok((units, reserved));
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok((units, reserved));
        }

        let raw: BTreeMap<String, Value> = serde_yaml::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

        for (key, value) in raw {
            if key.starts_with(RESERVED_KEY_PREFIX) {
                reserved.insert(key, value);
                continue;
            }
            let mut unit: WorkUnit = serde_yaml::from_value(value).map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;
            if unit.key.is_empty() {
                warn!(%key, "WorkStore::load: record missing key, using map key");
                unit.key = key.clone();
            }
            units.insert(key, unit);
        }
        Ok((units, reserved))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.lock.mode() == LockMode::Shared
    }

    /// Keys of every open unit, sorted, excluding reserved entries
    pub fn keys(&self) -> Vec<String> {
        self.units.keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.units.contains_key(key)
    }

    /// A copy of the unit stored under `key`
    pub fn get(&self, key: &str) -> Option<WorkUnit> {
        self.units.get(key).cloned()
    }

    /// Like `get`, failing with `NotFound` when absent
    pub fn require(&self, key: &str) -> Result<WorkUnit, StoreError> {
        self.get(key).ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Insert a new unit and persist
    pub fn insert(&mut self, unit: WorkUnit) -> Result<WorkUnit, StoreError> {
        debug!(key = %unit.key, "WorkStore::insert: called");
        self.ensure_writable()?;
        if unit.key.trim().is_empty() || unit.key.starts_with(RESERVED_KEY_PREFIX) {
            return Err(StoreError::InvalidReference {
                reference: unit.key.clone(),
                reason: "work key must be non-empty and not reserved".to_string(),
            });
        }
        if self.units.contains_key(&unit.key) {
            return Err(StoreError::AlreadyExists(unit.key.clone()));
        }

        self.units.insert(unit.key.clone(), unit.clone());
        self.save()?;
        info!(key = %unit.key, "Created unit of work");
        Ok(unit)
    }

    /// Append issues not already linked (by id) and persist
    pub fn append_issues(&mut self, key: &str, entries: Vec<IssueEntry>) -> Result<WorkUnit, StoreError> {
        debug!(%key, count = entries.len(), "WorkStore::append_issues: called");
        self.ensure_writable()?;
        let unit = self.unit_mut(key)?;
        for entry in entries {
            if unit.has_issue(&entry.id) {
                debug!(id = %entry.id, "WorkStore::append_issues: already linked");
                continue;
            }
            unit.issues.push(entry);
        }
        let updated = unit.clone();
        self.save()?;
        Ok(updated)
    }

    /// Append projects not already listed (by name) and persist
    pub fn append_projects(&mut self, key: &str, entries: Vec<ProjectEntry>) -> Result<WorkUnit, StoreError> {
        debug!(%key, count = entries.len(), "WorkStore::append_projects: called");
        self.ensure_writable()?;
        let unit = self.unit_mut(key)?;
        for entry in entries {
            if unit.has_project(&entry.name) {
                debug!(name = %entry.name, "WorkStore::append_projects: already listed");
                continue;
            }
            unit.projects.push(entry);
        }
        let updated = unit.clone();
        self.save()?;
        Ok(updated)
    }

    /// Remove issues; every id must currently be linked
    pub fn remove_issues(&mut self, key: &str, ids: &[IssueRef]) -> Result<WorkUnit, StoreError> {
        debug!(%key, count = ids.len(), "WorkStore::remove_issues: called");
        self.ensure_writable()?;
        let unit = self.unit_mut(key)?;
        if let Some(missing) = ids.iter().find(|id| !unit.has_issue(id)) {
            return Err(StoreError::NotInWork {
                key: key.to_string(),
                reference: missing.to_string(),
            });
        }
        unit.issues.retain(|i| !ids.contains(&i.id));
        let updated = unit.clone();
        self.save()?;
        Ok(updated)
    }

    /// Remove projects; every name must currently be listed
    pub fn remove_projects(&mut self, key: &str, names: &[ProjectRef]) -> Result<WorkUnit, StoreError> {
        debug!(%key, count = names.len(), "WorkStore::remove_projects: called");
        self.ensure_writable()?;
        let unit = self.unit_mut(key)?;
        if let Some(missing) = names.iter().find(|n| !unit.has_project(n)) {
            return Err(StoreError::NotInWork {
                key: key.to_string(),
                reference: missing.to_string(),
            });
        }
        unit.projects.retain(|p| !names.contains(&p.name));
        let updated = unit.clone();
        self.save()?;
        Ok(updated)
    }

    /// Delete the unit and persist, returning the removed record
    pub fn close(&mut self, key: &str) -> Result<WorkUnit, StoreError> {
        debug!(%key, "WorkStore::close: called");
        self.ensure_writable()?;
        let removed = self
            .units
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        self.save()?;
        info!(%key, "Closed unit of work");
        Ok(removed)
    }

    fn unit_mut(&mut self, key: &str) -> Result<&mut WorkUnit, StoreError> {
        self.units
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn ensure_writable(&self) -> Result<(), StoreError> {
        if self.is_read_only() {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    /// Write the whole map to a sibling temp file and rename it into place
    fn save(&self) -> Result<(), StoreError> {
        debug!(path = %self.path.display(), "WorkStore::save: called");
        let mut raw: BTreeMap<String, Value> = self.reserved.clone();
        for (key, unit) in &self.units {
            raw.insert(key.clone(), serde_yaml::to_value(unit)?);
        }
        let content = serde_yaml::to_string(&raw)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = sibling(&self.path, ".tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn lock_path(path: &Path) -> PathBuf {
    sibling(path, ".lock")
}
