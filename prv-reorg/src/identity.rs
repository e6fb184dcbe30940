//! Source filename parsing
//!
//! Flat input files follow `PRV-{site}-{patient}-{age}[suffix][-annotations].{edf|xml}`,
//! for example `PRV-001-4ZHY-15.edf` or `PRV-001-4ZHY-15A-annotations.xml`.
//! Parsing is pure: no filesystem access, and anything that does not match
//! the full pattern is rejected rather than guessed.

use crate::error::ParseError;
use prv_common::layout::{self, ANNOTATION_EXTENSION, SIGNAL_EXTENSION, STUDY_PREFIX};
use std::fmt;
use std::str::FromStr;

const ANNOTATION_MARKER: &str = "-annotations";

/// Kind of data file, from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileExtension {
    /// `.edf` signal recording
    Signal,
    /// `.xml` annotation export
    Annotation,
}

impl FileExtension {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileExtension::Signal => SIGNAL_EXTENSION,
            FileExtension::Annotation => ANNOTATION_EXTENSION,
        }
    }

    fn from_file_name(filename: &str) -> Option<(&str, FileExtension)> {
        if let Some(stem) = filename.strip_suffix(".edf") {
            Some((stem, FileExtension::Signal))
        } else {
            filename
                .strip_suffix(".xml")
                .map(|stem| (stem, FileExtension::Annotation))
        }
    }
}

impl fmt::Display for FileExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured identity of one source file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    /// Numeric site code, kept as text so leading zeros survive
    pub site: String,
    pub patient_id: String,
    pub age_months: u32,
    pub variant_suffix: Option<char>,
    pub extension: FileExtension,
    pub annotation_marker: bool,
}

impl FileIdentity {
    /// Parse a bare file name (no directory components)
    pub fn parse(filename: &str) -> Result<FileIdentity, ParseError> {
        let (stem, extension) = FileExtension::from_file_name(filename)
            .ok_or_else(|| ParseError::new(filename, "extension must be .edf or .xml"))?;

        let (stem, annotation_marker) = match stem.strip_suffix(ANNOTATION_MARKER) {
            Some(stem) => (stem, true),
            None => (stem, false),
        };

        let mut parts = stem.split('-');
        let (prefix, site, patient_id, age_part) =
            match (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(prefix), Some(site), Some(patient), Some(age), None) => {
                    (prefix, site, patient, age)
                }
                _ => {
                    return Err(ParseError::new(
                        filename,
                        "expected PRV-{site}-{patient}-{age} before the extension",
                    ))
                }
            };

        if prefix != STUDY_PREFIX {
            return Err(ParseError::new(
                filename,
                format!("prefix must be {}", STUDY_PREFIX),
            ));
        }
        if site.is_empty() || !site.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseError::new(filename, "site code must be numeric"));
        }
        if patient_id.is_empty()
            || !patient_id
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(ParseError::new(
                filename,
                "patient id must be upper-case letters and digits",
            ));
        }

        let (digits, variant_suffix) = split_variant_suffix(age_part);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseError::new(filename, "age must be numeric"));
        }
        // "015" and "15" would name the same session; only the plain form is accepted
        if digits.len() > 1 && digits.starts_with('0') {
            return Err(ParseError::new(filename, "age has a leading zero"));
        }
        let age_months: u32 = digits
            .parse()
            .map_err(|_| ParseError::new(filename, "age out of range"))?;

        Ok(FileIdentity {
            site: site.to_string(),
            patient_id: patient_id.to_string(),
            age_months,
            variant_suffix,
            extension,
            annotation_marker,
        })
    }

    /// The exact file name this identity was parsed from
    pub fn source_file_name(&self) -> String {
        let marker = if self.annotation_marker {
            ANNOTATION_MARKER
        } else {
            ""
        };
        format!("{}{}.{}", self.stem(), marker, self.extension)
    }

    /// Source file name without the `-annotations` infix
    pub fn base_file_name(&self) -> String {
        format!("{}.{}", self.stem(), self.extension)
    }

    /// Destination name inside the session's `eeg/` directory
    pub fn canonical_file_name(&self) -> String {
        layout::recording_file_name(&self.patient_id, self.age_months, self.extension.as_str())
    }

    fn stem(&self) -> String {
        let mut stem = format!(
            "{}-{}-{}-{}",
            STUDY_PREFIX, self.site, self.patient_id, self.age_months
        );
        if let Some(suffix) = self.variant_suffix {
            stem.push(suffix);
        }
        stem
    }
}

impl FromStr for FileIdentity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileIdentity::parse(s)
    }
}

fn split_variant_suffix(age_part: &str) -> (&str, Option<char>) {
    match age_part.chars().last() {
        Some(last) if last.is_ascii_uppercase() => {
            (&age_part[..age_part.len() - last.len_utf8()], Some(last))
        }
        _ => (age_part, None),
    }
}
