//! Canonical naming for the reorganized dataset tree
//!
//! The reorganizer writes this layout and the sidecar generator reads it back,
//! so both sides derive every directory and file name from here:
//!
//! ```text
//! {output}/PRV-{id}/primary/sub-PRV-{id}/ses-visit-m{age}/eeg/sub-PRV-{id}-{age}.{edf|xml}
//! ```

use std::path::PathBuf;

/// Literal study prefix used in source file names and dataset names
pub const STUDY_PREFIX: &str = "PRV";

/// Directory holding the BIDS root inside each dataset
pub const PRIMARY_DIR: &str = "primary";

/// Modality directory inside each session
pub const MODALITY_DIR: &str = "eeg";

/// Session directory prefix; the age in months follows
pub const SESSION_PREFIX: &str = "ses-visit-m";

/// Extension of signal (recording) files
pub const SIGNAL_EXTENSION: &str = "edf";

/// Extension of annotation files
pub const ANNOTATION_EXTENSION: &str = "xml";

/// Dataset directory name, e.g. `PRV-4ZHY`
pub fn dataset_name(patient_id: &str) -> String {
    format!("{}-{}", STUDY_PREFIX, patient_id)
}

/// Patient id embedded in a dataset directory name, if the name is canonical
pub fn patient_id_from_dataset(name: &str) -> Option<&str> {
    let id = name.strip_prefix(STUDY_PREFIX)?.strip_prefix('-')?;
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        Some(id)
    } else {
        None
    }
}

/// Subject label, e.g. `sub-PRV-4ZHY`
pub fn subject_label(patient_id: &str) -> String {
    format!("sub-{}", dataset_name(patient_id))
}

/// Session label, e.g. `ses-visit-m15`
pub fn session_label(age_months: u32) -> String {
    format!("{}{}", SESSION_PREFIX, age_months)
}

/// Age embedded in a session directory name, if the name is canonical
pub fn age_from_session(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(SESSION_PREFIX)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Recording entity used as file stem, e.g. `sub-PRV-4ZHY-15`
pub fn recording_entity(patient_id: &str, age_months: u32) -> String {
    format!("{}-{}", subject_label(patient_id), age_months)
}

/// Canonical data file name, e.g. `sub-PRV-4ZHY-15.edf`
pub fn recording_file_name(patient_id: &str, age_months: u32, extension: &str) -> String {
    format!("{}.{}", recording_entity(patient_id, age_months), extension)
}

/// Subject directory relative to the output root
pub fn subject_dir(patient_id: &str) -> PathBuf {
    PathBuf::from(dataset_name(patient_id))
        .join(PRIMARY_DIR)
        .join(subject_label(patient_id))
}

/// Modality directory of one session relative to the output root
pub fn session_modality_dir(patient_id: &str, age_months: u32) -> PathBuf {
    subject_dir(patient_id)
        .join(session_label(age_months))
        .join(MODALITY_DIR)
}

/// Forward-slash sidecar path of the BIDS root, e.g. `PRV-4ZHY/primary/`
pub fn dataset_bids_path(patient_id: &str) -> String {
    format!("{}/{}/", dataset_name(patient_id), PRIMARY_DIR)
}

/// Forward-slash sidecar path of a subject, e.g. `PRV-4ZHY/primary/sub-PRV-4ZHY/`
pub fn subject_bids_path(patient_id: &str) -> String {
    format!("{}{}/", dataset_bids_path(patient_id), subject_label(patient_id))
}

/// Forward-slash sidecar path of a session's modality directory
pub fn session_bids_path(patient_id: &str, age_months: u32) -> String {
    format!(
        "{}{}/{}/",
        subject_bids_path(patient_id),
        session_label(age_months),
        MODALITY_DIR
    )
}
