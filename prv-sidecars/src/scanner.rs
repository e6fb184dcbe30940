//! Hierarchy scanner: canonical session tree → session records
//!
//! Walks `PRV-{id}/primary/sub-PRV-{id}/ses-visit-m{age}/eeg/` one level at a
//! time with sorted listings, so records come out in a deterministic order.
//! Directories that do not follow the canonical names are skipped silently.

use crate::error::ScanError;
use prv_common::config::SignalFilePolicy;
use prv_common::layout::{self, MODALITY_DIR, SIGNAL_EXTENSION};
use prv_common::LogHandle;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// One (patient, age) session with a usable signal file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub patient_id: String,
    pub age_months: u32,
    pub subject_dir: PathBuf,
    pub session_dir: PathBuf,
    pub eeg_dir: PathBuf,
    pub signal_file: PathBuf,
}

impl SessionRecord {
    /// Forward-slash path of the session's `eeg/` directory below the output root
    pub fn bids_path(&self) -> String {
        layout::session_bids_path(&self.patient_id, self.age_months)
    }
}

/// Session dropped because its signal file was ambiguous
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedSession {
    pub patient_id: String,
    pub age_months: u32,
    pub eeg_dir: PathBuf,
    pub signal_files: Vec<PathBuf>,
}

/// Sessions found in one scan
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub sessions: Vec<SessionRecord>,
    pub rejected: Vec<RejectedSession>,
}

impl ScanReport {
    /// Sessions grouped by patient, in scan order
    pub fn sessions_by_patient(&self) -> BTreeMap<&str, Vec<&SessionRecord>> {
        let mut grouped: BTreeMap<&str, Vec<&SessionRecord>> = BTreeMap::new();
        for session in &self.sessions {
            grouped
                .entry(session.patient_id.as_str())
                .or_default()
                .push(session);
        }
        grouped
    }
}

/// Reconstructs session records from a reorganized tree
pub struct HierarchyScanner {
    policy: SignalFilePolicy,
    log: LogHandle,
}

impl HierarchyScanner {
    pub fn new(policy: SignalFilePolicy, log: LogHandle) -> Self {
        Self { policy, log }
    }

    pub fn scan(&self, output_dir: &Path) -> Result<ScanReport, ScanError> {
        self.log.in_scope(|| self.scan_tree(output_dir))
    }

    fn scan_tree(&self, output_dir: &Path) -> Result<ScanReport, ScanError> {
        if !output_dir.is_dir() {
            return Err(ScanError::OutputNotFound(output_dir.to_path_buf()));
        }

        let mut report = ScanReport::default();

        for dataset_dir in sorted_subdirectories(output_dir)? {
            let Some(patient_id) = dir_name(&dataset_dir).and_then(layout::patient_id_from_dataset)
            else {
                continue;
            };
            let patient_id = patient_id.to_string();

            let subject_dir = output_dir.join(layout::subject_dir(&patient_id));
            if !subject_dir.is_dir() {
                debug!(dataset = %dataset_dir.display(), "No subject directory, skipping");
                continue;
            }

            for session_dir in sorted_subdirectories(&subject_dir)? {
                let Some(age_months) = dir_name(&session_dir).and_then(layout::age_from_session)
                else {
                    continue;
                };

                let eeg_dir = session_dir.join(MODALITY_DIR);
                if !eeg_dir.is_dir() {
                    continue;
                }
                let signal_files = sorted_signal_files(&eeg_dir)?;
                let Some(first) = signal_files.first().cloned() else {
                    continue;
                };

                if signal_files.len() > 1 {
                    match self.policy {
                        SignalFilePolicy::FirstSorted => {
                            warn!(
                                patient_id = %patient_id,
                                age_months,
                                used = %first.display(),
                                ignored = signal_files.len() - 1,
                                "Multiple signal files in session, using the first"
                            );
                        }
                        SignalFilePolicy::Reject => {
                            error!(
                                patient_id = %patient_id,
                                age_months,
                                files = signal_files.len(),
                                "Multiple signal files in session, rejecting session"
                            );
                            report.rejected.push(RejectedSession {
                                patient_id: patient_id.clone(),
                                age_months,
                                eeg_dir,
                                signal_files,
                            });
                            continue;
                        }
                    }
                }

                report.sessions.push(SessionRecord {
                    patient_id: patient_id.clone(),
                    age_months,
                    subject_dir: subject_dir.clone(),
                    session_dir,
                    eeg_dir,
                    signal_file: first,
                });
            }
        }

        info!(
            sessions = report.sessions.len(),
            rejected = report.rejected.len(),
            "Scan complete"
        );
        Ok(report)
    }
}

fn dir_name(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()
}

fn sorted_children(dir: &Path) -> Result<Vec<walkdir::DirEntry>, ScanError> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.map_err(ScanError::from))
        .collect()
}

fn sorted_subdirectories(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    Ok(sorted_children(dir)?
        .into_iter()
        .filter(|e| e.file_type().is_dir())
        .map(walkdir::DirEntry::into_path)
        .collect())
}

fn sorted_signal_files(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    Ok(sorted_children(dir)?
        .into_iter()
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().is_some_and(|ext| ext == SIGNAL_EXTENSION))
        .collect())
}
