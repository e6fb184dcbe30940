//! Hierarchy builder: flat input files → canonical session tree
//!
//! Files of allow-listed patients are grouped by patient and age and copied to
//! `PRV-{id}/primary/sub-PRV-{id}/ses-visit-m{age}/eeg/sub-PRV-{id}-{age}.{ext}`.
//! The source tree is only ever read. Failures are recorded per file and the
//! run continues with the remaining files and patients.

use crate::allow_list::AllowList;
use crate::error::ReorgError;
use crate::identity::FileIdentity;
use prv_common::layout;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One file copied to its canonical destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub bytes: u64,
}

/// One file that could not be placed
#[derive(Debug)]
pub struct CopyFailure {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub error: ReorgError,
}

/// Result of one builder run
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Allow-listed patients that had at least one file
    pub patients: Vec<String>,
    /// Number of (patient, age) session directories materialized
    pub sessions: usize,
    pub copied: Vec<CopiedFile>,
    pub failures: Vec<CopyFailure>,
    /// Patients present in the input but not on the allow-list
    pub excluded: BTreeSet<String>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Groups identities into sessions and copies them into place
pub struct HierarchyBuilder<'a> {
    allow_list: &'a AllowList,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(allow_list: &'a AllowList) -> Self {
        Self { allow_list }
    }

    /// Group allow-listed identities by patient, then by age
    ///
    /// Files within a session keep sorted source-name order, which decides
    /// which source wins when two map onto the same destination.
    pub fn plan<'f>(
        &self,
        identities: &'f [FileIdentity],
    ) -> BTreeMap<&'f str, BTreeMap<u32, Vec<&'f FileIdentity>>> {
        let mut plan: BTreeMap<&str, BTreeMap<u32, Vec<&FileIdentity>>> = BTreeMap::new();

        for identity in identities {
            if !self.allow_list.contains(&identity.patient_id) {
                continue;
            }
            plan.entry(identity.patient_id.as_str())
                .or_default()
                .entry(identity.age_months)
                .or_default()
                .push(identity);
        }

        for sessions in plan.values_mut() {
            for files in sessions.values_mut() {
                files.sort_by_key(|identity| identity.source_file_name());
            }
        }

        plan
    }

    /// Materialize the session tree under `output_dir` and copy every planned file
    pub fn build(
        &self,
        identities: &[FileIdentity],
        input_dir: &Path,
        output_dir: &Path,
    ) -> BuildReport {
        let mut report = BuildReport {
            excluded: identities
                .iter()
                .filter(|identity| !self.allow_list.contains(&identity.patient_id))
                .map(|identity| identity.patient_id.clone())
                .collect(),
            ..Default::default()
        };
        for patient_id in &report.excluded {
            debug!(patient_id = %patient_id, "Patient not on allow-list, excluded");
        }

        let plan = self.plan(identities);

        for (patient_id, sessions) in &plan {
            let ages: Vec<u32> = sessions.keys().copied().collect();
            info!(patient_id = %patient_id, ?ages, "Processing patient");
            report.patients.push(patient_id.to_string());

            for (age, files) in sessions {
                let session_dir = output_dir.join(layout::session_modality_dir(patient_id, *age));

                if let Err(e) = fs::create_dir_all(&session_dir) {
                    warn!(
                        dir = %session_dir.display(),
                        error = %e,
                        "Cannot create session directory"
                    );
                    for identity in files {
                        report.failures.push(CopyFailure {
                            source: input_dir.join(identity.source_file_name()),
                            destination: session_dir.join(identity.canonical_file_name()),
                            error: ReorgError::io(&session_dir, io::Error::new(e.kind(), e.to_string())),
                        });
                    }
                    continue;
                }
                report.sessions += 1;

                let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
                for identity in files {
                    let source = input_dir.join(identity.source_file_name());
                    let destination = session_dir.join(identity.canonical_file_name());

                    if let Some(first_source) = claimed.get(&destination) {
                        warn!(
                            source = %source.display(),
                            destination = %destination.display(),
                            "Destination already written in this run, skipping"
                        );
                        report.failures.push(CopyFailure {
                            error: ReorgError::DestinationConflict {
                                destination: destination.clone(),
                                first_source: first_source.clone(),
                            },
                            source,
                            destination,
                        });
                        continue;
                    }

                    match copy_preserving_metadata(&source, &destination) {
                        Ok(bytes) => {
                            debug!(
                                source = %source.display(),
                                destination = %destination.display(),
                                bytes,
                                "Copied"
                            );
                            claimed.insert(destination.clone(), source.clone());
                            report.copied.push(CopiedFile {
                                source,
                                destination,
                                bytes,
                            });
                        }
                        Err(e) => {
                            warn!(source = %source.display(), error = %e, "Copy failed");
                            report.failures.push(CopyFailure {
                                error: ReorgError::io(&source, e),
                                source,
                                destination,
                            });
                        }
                    }
                }
            }
        }

        info!(
            patients = report.patients.len(),
            sessions = report.sessions,
            copied = report.copied.len(),
            failed = report.failures.len(),
            "Reorganization complete"
        );

        report
    }
}

/// Copy contents, permission bits and access/modification times
///
/// Overwrites an existing destination, including one left read-only by an
/// earlier run.
fn copy_preserving_metadata(source: &Path, destination: &Path) -> io::Result<u64> {
    let metadata = fs::metadata(source)?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "source is not a regular file",
        ));
    }

    if let Ok(existing) = fs::metadata(destination) {
        if existing.permissions().readonly() {
            make_writable(destination, existing.permissions())?;
        }
    }

    // fs::copy carries the permission bits over
    let bytes = fs::copy(source, destination)?;

    let permissions = metadata.permissions();
    if permissions.readonly() {
        make_writable(destination, permissions.clone())?;
    }

    let mut times = FileTimes::new();
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    File::options()
        .write(true)
        .open(destination)?
        .set_times(times)?;

    if permissions.readonly() {
        fs::set_permissions(destination, permissions)?;
    }

    Ok(bytes)
}

#[allow(clippy::permissions_set_readonly_false)]
fn make_writable(path: &Path, mut permissions: fs::Permissions) -> io::Result<()> {
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identities(names: &[&str]) -> Vec<FileIdentity> {
        names.iter().map(|n| FileIdentity::parse(n).unwrap()).collect()
    }

    #[test]
    fn test_plan_groups_by_patient_and_age() {
        let allow: AllowList = ["4ZHY", "AB12"].into_iter().collect();
        let files = identities(&[
            "PRV-001-4ZHY-15.edf",
            "PRV-001-4ZHY-3.edf",
            "PRV-001-4ZHY-15-annotations.xml",
            "PRV-002-AB12-6.edf",
            "PRV-003-NOPE-6.edf",
        ]);

        let plan = HierarchyBuilder::new(&allow).plan(&files);
        assert_eq!(plan.keys().copied().collect::<Vec<_>>(), vec!["4ZHY", "AB12"]);

        let sessions = &plan["4ZHY"];
        assert_eq!(sessions.keys().copied().collect::<Vec<_>>(), vec![3, 15]);
        let names: Vec<String> = sessions[&15].iter().map(|i| i.source_file_name()).collect();
        assert_eq!(
            names,
            vec!["PRV-001-4ZHY-15-annotations.xml", "PRV-001-4ZHY-15.edf"]
        );
    }

    #[test]
    fn test_empty_allow_list_plans_nothing() {
        let allow = AllowList::default();
        let files = identities(&["PRV-001-4ZHY-15.edf"]);
        assert!(HierarchyBuilder::new(&allow).plan(&files).is_empty());
    }
}
