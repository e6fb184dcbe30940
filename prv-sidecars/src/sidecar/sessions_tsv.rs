//! Session table sidecar (`sub-PRV-{id}_sessions.tsv`)
//!
//! One row per visit, sorted by age. Whether the earliest visit counts as
//! baseline is decided by `BaselinePolicy`; every other visit is a followup.

use super::{
    finish_validation, table_issues, FieldTaxonomy, Fields, PathOptions, Payload, Sidecar,
    SidecarCore, SidecarKind,
};
use crate::error::{OutputFormat, Result, ValidationError, ValidationIssue};
use prv_common::config::{BaselinePolicy, SessionsConfig};
use prv_common::{layout, LogHandle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

pub static SESSIONS_TSV: SidecarKind = SidecarKind {
    name: "SessionsTsv",
    default_filename: "sessions.tsv",
    default_bids_path: "output_sidecars/",
    default_format: OutputFormat::Tsv,
    taxonomy: FieldTaxonomy {
        required: &["session", "age_in_months", "visit_type"],
        recommended: &[],
        optional: &[],
    },
};

/// `sub-PRV-{id}_sessions.tsv`
pub fn file_name(patient_id: &str) -> String {
    format!("{}_sessions.tsv", layout::subject_label(patient_id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitType {
    Baseline,
    Followup,
}

impl VisitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitType::Baseline => "baseline",
            VisitType::Followup => "followup",
        }
    }
}

impl fmt::Display for VisitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One visit of a patient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub session: String,
    pub age_months: u32,
    pub visit_type: VisitType,
}

impl SessionRow {
    fn to_fields(&self) -> Fields {
        let mut row = Fields::new();
        row.insert("session".into(), Value::from(self.session.as_str()));
        row.insert("age_in_months".into(), Value::from(self.age_months));
        row.insert("visit_type".into(), Value::from(self.visit_type.as_str()));
        row
    }
}

/// Session rows for a patient's visit ages, sorted ascending and deduplicated
pub fn session_rows(ages: &[u32], config: &SessionsConfig) -> Vec<SessionRow> {
    let mut ages = ages.to_vec();
    ages.sort_unstable();
    ages.dedup();

    ages.iter()
        .enumerate()
        .map(|(i, &age)| {
            let baseline = i == 0
                && match config.baseline_policy {
                    BaselinePolicy::AgeWindow => config.in_baseline_window(age),
                    BaselinePolicy::FirstSession => true,
                };
            SessionRow {
                session: layout::session_label(age),
                age_months: age,
                visit_type: if baseline {
                    VisitType::Baseline
                } else {
                    VisitType::Followup
                },
            }
        })
        .collect()
}

/// Visit schedule of one patient
#[derive(Debug, Clone)]
pub struct SessionsTsv {
    core: SidecarCore,
}

impl SessionsTsv {
    pub fn new(rows: Vec<Fields>, options: PathOptions, log: LogHandle) -> Result<Self> {
        let count = rows.len();
        let core = SidecarCore::new(&SESSIONS_TSV, Payload::Table(rows), options, log)?;
        core.log()
            .in_scope(|| debug!("SessionsTsv initialized with {} rows", count));
        Ok(Self { core })
    }

    pub fn from_ages(
        ages: &[u32],
        config: &SessionsConfig,
        options: PathOptions,
        log: LogHandle,
    ) -> Result<Self> {
        let rows: Vec<Fields> = session_rows(ages, config)
            .iter()
            .map(SessionRow::to_fields)
            .collect();
        Self::new(rows, options, log)
    }

    pub fn rows(&self) -> &[Fields] {
        self.core.rows()
    }

    /// Visit types in row order
    pub fn visit_types(&self) -> Vec<&str> {
        self.rows()
            .iter()
            .filter_map(|row| row.get("visit_type").and_then(Value::as_str))
            .collect()
    }
}

impl Sidecar for SessionsTsv {
    fn core(&self) -> &SidecarCore {
        &self.core
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let Payload::Table(rows) = self.core.payload() else {
            return finish_validation(&self.core, vec![ValidationIssue::not_a_table()]);
        };
        let issues = table_issues(&self.core, rows);
        finish_validation(&self.core, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn first_session() -> SessionsConfig {
        SessionsConfig {
            baseline_policy: BaselinePolicy::FirstSession,
            ..SessionsConfig::default()
        }
    }

    #[test]
    fn test_age_window_policy() {
        let config = SessionsConfig::default();

        let rows = session_rows(&[12, 3, 24], &config);
        let ages: Vec<u32> = rows.iter().map(|r| r.age_months).collect();
        assert_eq!(ages, vec![3, 12, 24]);
        assert_eq!(rows[0].visit_type, VisitType::Baseline);
        assert_eq!(rows[0].session, "ses-visit-m3");
        assert_eq!(rows[1].visit_type, VisitType::Followup);

        // Earliest visit outside [1.5, 6.0] is not baseline
        let rows = session_rows(&[15, 18], &config);
        assert!(rows.iter().all(|r| r.visit_type == VisitType::Followup));

        let rows = session_rows(&[1], &config);
        assert_eq!(rows[0].visit_type, VisitType::Followup);
        let rows = session_rows(&[6], &config);
        assert_eq!(rows[0].visit_type, VisitType::Baseline);
    }

    #[test]
    fn test_first_session_policy() {
        let rows = session_rows(&[18, 15], &first_session());
        assert_eq!(rows[0].age_months, 15);
        assert_eq!(rows[0].visit_type, VisitType::Baseline);
        assert_eq!(rows[1].visit_type, VisitType::Followup);
    }

    #[test]
    fn test_from_ages_is_valid() {
        let tsv = SessionsTsv::from_ages(
            &[3, 12],
            &SessionsConfig::default(),
            PathOptions::new(),
            LogHandle::discard(),
        )
        .unwrap();
        assert!(tsv.validate().is_ok());
        assert_eq!(tsv.visit_types(), vec!["baseline", "followup"]);
        assert_eq!(tsv.rows()[1]["age_in_months"], json!(12));
    }

    #[test]
    fn test_heterogeneous_rows_name_field_and_row() {
        let rows = vec![
            fields(json!({"session": "ses-visit-m3", "age_in_months": 3, "visit_type": "baseline"})),
            fields(json!({"session": "ses-visit-m12", "visit_type": "followup"})),
        ];
        let tsv = SessionsTsv::new(rows, PathOptions::new(), LogHandle::discard()).unwrap();

        let err = tsv.validate().unwrap_err();
        assert!(err.mentions("age_in_months"));
        assert!(err.issues.iter().all(|issue| issue.row() == Some(1)));
        let text = err.to_string();
        assert!(text.contains("age_in_months"));
        assert!(text.contains("row 1"));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("4ZHY"), "sub-PRV-4ZHY_sessions.tsv");
    }
}
