use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::storage::{FileStorage, IdentifierStore};

/// Consistency between stored files and the identifier map.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VerificationReport {
    pub stored_files: usize,
    pub identifiers: usize,
    /// Ids whose file is gone
    pub dangling: Vec<(String, String)>,
    /// Files with no id
    pub untracked: Vec<String>,
}

impl VerificationReport {
    pub fn is_consistent(&self) -> bool {
        self.dangling.is_empty()
    }
}

pub struct StartupValidator<'a, S: FileStorage> {
    storage: &'a S,
    ids: &'a IdentifierStore,
}

impl<'a, S: FileStorage> StartupValidator<'a, S> {
    pub fn new(storage: &'a S, ids: &'a IdentifierStore) -> Self {
        Self { storage, ids }
    }

    /// Reports problems; never repairs them.
    pub async fn validate(&self) -> Result<VerificationReport> {
        info!("Verifying storage against identifier map");

        let files = self.storage.list().await?;
        let present: HashSet<&str> = files.iter().map(String::as_str).collect();
        let tracked: HashSet<&str> = self.ids.iter().map(|(_, name)| name).collect();

        let mut dangling: Vec<(String, String)> = self
            .ids
            .iter()
            .filter(|(_, name)| !present.contains(name))
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect();
        dangling.sort();

        let untracked: Vec<String> = files
            .iter()
            .filter(|name| !tracked.contains(name.as_str()))
            .cloned()
            .collect();

        for (id, name) in &dangling {
            warn!("Identifier {} points at missing file {}", id, name);
        }

        let report = VerificationReport {
            stored_files: files.len(),
            identifiers: self.ids.len(),
            dangling,
            untracked,
        };
        info!(
            "Found {} files, {} identifiers, {} dangling, {} untracked",
            report.stored_files,
            report.identifiers,
            report.dangling.len(),
            report.untracked.len()
        );
        Ok(report)
    }
}
