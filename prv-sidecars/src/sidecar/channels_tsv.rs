//! Channel table sidecar (`*_channels.tsv`)

use super::{
    finish_validation, number_value, table_issues, FieldTaxonomy, Fields, PathOptions, Payload,
    Sidecar, SidecarCore, SidecarKind,
};
use crate::error::{OutputFormat, Result, ValidationError, ValidationIssue};
use crate::signal::ChannelRecord;
use prv_common::{layout, LogHandle};
use serde_json::Value;
use tracing::debug;

pub static CHANNELS_TSV: SidecarKind = SidecarKind {
    name: "ChannelsTsv",
    default_filename: "channels.tsv",
    default_bids_path: "bids_root/",
    default_format: OutputFormat::Tsv,
    taxonomy: FieldTaxonomy {
        required: &["name", "type", "units", "sampling_frequency"],
        recommended: &["low_cutoff", "high_cutoff", "notch"],
        optional: &["reference", "status", "status_description"],
    },
};

/// Hardware filter band written for every channel
const LOW_CUTOFF_HZ: u32 = 0;
const HIGH_CUTOFF_HZ: u32 = 500;

/// `sub-PRV-{id}-{age}_task-{task}_channels.tsv`
pub fn file_name(patient_id: &str, age_months: u32, task: &str) -> String {
    format!(
        "{}_task-{}_channels.tsv",
        layout::recording_entity(patient_id, age_months),
        task
    )
}

/// One row per recorded channel
#[derive(Debug, Clone)]
pub struct ChannelsTsv {
    core: SidecarCore,
}

impl ChannelsTsv {
    pub fn new(rows: Vec<Fields>, options: PathOptions, log: LogHandle) -> Result<Self> {
        let count = rows.len();
        let core = SidecarCore::new(&CHANNELS_TSV, Payload::Table(rows), options, log)?;
        core.log()
            .in_scope(|| debug!("ChannelsTsv initialized with {} channels", count));
        Ok(Self { core })
    }

    /// Rows for `channels`, typed by label, in the given `units`
    pub fn from_channels(
        channels: &[ChannelRecord],
        units: &str,
        options: PathOptions,
        log: LogHandle,
    ) -> Result<Self> {
        let rows: Vec<Fields> = log.in_scope(|| channels.iter().map(|c| channel_row(c, units)).collect());
        Self::new(rows, options, log)
    }

    pub fn rows(&self) -> &[Fields] {
        self.core.rows()
    }

    /// Channel names in row order
    pub fn channel_names(&self) -> Vec<&str> {
        self.rows()
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str))
            .collect()
    }
}

fn channel_row(channel: &ChannelRecord, units: &str) -> Fields {
    let mut row = Fields::new();
    row.insert("name".into(), Value::from(channel.name.as_str()));
    row.insert("type".into(), Value::from(channel.channel_type().as_str()));
    row.insert("units".into(), Value::from(units));
    row.insert(
        "sampling_frequency".into(),
        number_value(channel.sampling_frequency),
    );
    row.insert("low_cutoff".into(), Value::from(LOW_CUTOFF_HZ));
    row.insert("high_cutoff".into(), Value::from(HIGH_CUTOFF_HZ));
    row.insert("notch".into(), Value::from("n/a"));
    row
}

impl Sidecar for ChannelsTsv {
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
    use crate::signal::placeholder_channels;
    use serde_json::json;

    #[test]
    fn test_rows_from_channels() {
        let channels = vec![
            ChannelRecord::new("Fp1", 256.0),
            ChannelRecord::new("EKG1", 256.0),
            ChannelRecord::new("Photic", 128.5),
        ];
        let tsv =
            ChannelsTsv::from_channels(&channels, "uV", PathOptions::new(), LogHandle::discard())
                .unwrap();

        assert!(tsv.validate().is_ok());
        assert_eq!(tsv.channel_names(), vec!["Fp1", "EKG1", "Photic"]);
        let rows = tsv.rows();
        assert_eq!(rows[0]["type"], json!("EEG"));
        assert_eq!(rows[1]["type"], json!("ECG"));
        assert_eq!(rows[2]["type"], json!("MISC"));
        assert_eq!(rows[0]["sampling_frequency"], json!(256));
        assert_eq!(rows[2]["sampling_frequency"], json!(128.5));
        assert_eq!(rows[0]["high_cutoff"], json!(500));
    }

    #[test]
    fn test_unknown_channel_warns_once() {
        let (log, capture) = LogHandle::capture();
        let channels = vec![ChannelRecord::new("XYZ99", 256.0)];
        ChannelsTsv::from_channels(&channels, "uV", PathOptions::new(), log).unwrap();
        assert_eq!(capture.count_matching("defaulting to MISC"), 1);
    }

    #[test]
    fn test_empty_table_fails() {
        let tsv = ChannelsTsv::new(Vec::new(), PathOptions::new(), LogHandle::discard()).unwrap();
        let err = tsv.validate().unwrap_err();
        assert_eq!(err.issues, vec![ValidationIssue::EmptyTable]);
    }

    #[test]
    fn test_missing_required_column() {
        let mut row = channel_row(&ChannelRecord::new("Cz", 256.0), "uV");
        row.remove("units");
        let tsv = ChannelsTsv::new(vec![row], PathOptions::new(), LogHandle::discard()).unwrap();
        let err = tsv.validate().unwrap_err();
        assert_eq!(
            err.issues,
            vec![ValidationIssue::MissingRequired {
                row: Some(0),
                fields: vec!["units".to_string()],
            }]
        );
    }

    #[test]
    fn test_placeholder_table_written_as_tsv() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let tsv = ChannelsTsv::from_channels(
            &placeholder_channels(),
            "uV",
            PathOptions::new().with_filename(file_name("4ZHY", 15, "rest")),
            LogHandle::discard(),
        )
        .unwrap();

        let path = tsv.persist(Some(temp_dir.path()), true).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 22);
        assert_eq!(
            lines[0],
            "name\ttype\tunits\tsampling_frequency\tlow_cutoff\thigh_cutoff\tnotch"
        );
        assert_eq!(lines[1], "Fp1\tEEG\tuV\t2000\t0\t500\tn/a");
    }
}
