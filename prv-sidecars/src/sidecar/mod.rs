//! Sidecar framework
//!
//! A sidecar is a payload plus where to write it. Every kind declares its
//! field taxonomy (REQUIRED, RECOMMENDED, OPTIONAL) and default location in a
//! static `SidecarKind`, holds its state in a `SidecarCore`, and implements
//! the `Sidecar` trait for validation. Persistence is shared.
//!
//! Payloads come in two shapes:
//! - `Payload::Object`: one mapping, written as JSON (recording metadata,
//!   dataset description)
//! - `Payload::Table`: ordered rows with identical columns, written as TSV
//!   (channel and session tables) or as a JSON array

pub mod channels_tsv;
pub mod dataset_description;
pub mod eeg_json;
pub mod sessions_tsv;

pub use channels_tsv::ChannelsTsv;
pub use dataset_description::{DatasetConstants, DatasetDescription};
pub use eeg_json::EegJson;
pub use sessions_tsv::{SessionRow, SessionsTsv, VisitType};

use crate::error::{OutputFormat, Result, SidecarError, ValidationError, ValidationIssue};
use prv_common::LogHandle;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// One object payload or one table row
pub type Fields = Map<String, Value>;

/// Base directory used when neither `persist` nor the path options name one
pub const DEFAULT_OUTPUT_DIR: &str = "output/json";

/// Default JSON indentation width
pub const DEFAULT_JSON_INDENT: usize = 2;

/// Keys that configure the output location rather than carry data
const PATH_OPTION_KEYS: [&str; 5] = ["bids_path", "output_dir", "filename", "json_indent", "input_dir"];

/// Sidecar data
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Object(Fields),
    Table(Vec<Fields>),
}

/// Disjoint field name sets of one sidecar kind
#[derive(Debug, Clone, Copy)]
pub struct FieldTaxonomy {
    pub required: &'static [&'static str],
    pub recommended: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl FieldTaxonomy {
    /// True if `field` belongs to any of the three sets
    pub fn knows(&self, field: &str) -> bool {
        self.required
            .iter()
            .chain(self.recommended)
            .chain(self.optional)
            .any(|f| *f == field)
    }

    /// REQUIRED fields absent from `fields`, sorted
    pub fn missing_required(&self, fields: &Fields) -> Vec<String> {
        missing(self.required, fields)
    }

    /// RECOMMENDED fields absent from `fields`, sorted
    pub fn missing_recommended(&self, fields: &Fields) -> Vec<String> {
        missing(self.recommended, fields)
    }

    /// Fields outside all three sets, sorted
    pub fn extras(&self, fields: &Fields) -> Vec<String> {
        let extras: BTreeSet<&str> = fields
            .keys()
            .map(String::as_str)
            .filter(|k| !self.knows(k))
            .collect();
        extras.into_iter().map(String::from).collect()
    }

    /// Three-line listing of the taxonomy
    pub fn summary(&self) -> String {
        format!(
            "REQUIRED: {}\nRECOMMENDED: {}\nOPTIONAL: {}",
            sorted_list(self.required),
            sorted_list(self.recommended),
            sorted_list(self.optional)
        )
    }
}

fn missing(names: &[&str], fields: &Fields) -> Vec<String> {
    let missing: BTreeSet<&str> = names
        .iter()
        .copied()
        .filter(|name| !fields.contains_key(*name))
        .collect();
    missing.into_iter().map(String::from).collect()
}

fn sorted_list(names: &[&str]) -> String {
    let sorted: BTreeSet<&str> = names.iter().copied().collect();
    sorted.into_iter().collect::<Vec<_>>().join(", ")
}

/// Static description of one sidecar kind
#[derive(Debug)]
pub struct SidecarKind {
    pub name: &'static str,
    pub default_filename: &'static str,
    pub default_bids_path: &'static str,
    pub default_format: OutputFormat,
    pub taxonomy: FieldTaxonomy,
}

/// Caller-supplied location options; unset values fall back to kind defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathOptions {
    pub bids_path: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub filename: Option<String>,
    pub json_indent: Option<usize>,
}

impl PathOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bids_path(mut self, bids_path: impl Into<String>) -> Self {
        self.bids_path = Some(bids_path.into());
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_json_indent(mut self, json_indent: usize) -> Self {
        self.json_indent = Some(json_indent);
        self
    }

    /// Move path keys out of an object payload; explicit options win
    fn absorb(&mut self, kind: &'static SidecarKind, fields: &mut Fields) -> Result<()> {
        for key in PATH_OPTION_KEYS {
            let Some(value) = fields.remove(key) else {
                continue;
            };
            let invalid = || SidecarError::InvalidPayload {
                sidecar: kind.name,
                message: format!("path option '{}' has invalid value {}", key, value),
            };
            match key {
                "bids_path" => {
                    let v = value.as_str().ok_or_else(invalid)?;
                    self.bids_path.get_or_insert_with(|| v.to_string());
                }
                "output_dir" => {
                    let v = value.as_str().ok_or_else(invalid)?;
                    self.output_dir.get_or_insert_with(|| PathBuf::from(v));
                }
                "filename" => {
                    let v = value.as_str().ok_or_else(invalid)?;
                    self.filename.get_or_insert_with(|| v.to_string());
                }
                "json_indent" => {
                    let v = value.as_u64().ok_or_else(invalid)?;
                    self.json_indent.get_or_insert(v as usize);
                }
                // Accepted for compatibility, not used for writing
                _ => {}
            }
        }
        Ok(())
    }
}

/// Location options after defaults are applied
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPaths {
    /// Forward-slash path below the output directory, e.g. `PRV-4ZHY/primary/`
    pub bids_path: String,
    pub output_dir: Option<PathBuf>,
    pub filename: String,
    pub json_indent: usize,
}

/// State shared by every sidecar kind
#[derive(Debug, Clone)]
pub struct SidecarCore {
    kind: &'static SidecarKind,
    payload: Payload,
    paths: ResolvedPaths,
    log: LogHandle,
}

impl SidecarCore {
    pub fn new(
        kind: &'static SidecarKind,
        mut payload: Payload,
        mut options: PathOptions,
        log: LogHandle,
    ) -> Result<Self> {
        if let Payload::Object(fields) = &mut payload {
            options.absorb(kind, fields)?;
        }

        let paths = ResolvedPaths {
            bids_path: options
                .bids_path
                .unwrap_or_else(|| kind.default_bids_path.to_string()),
            output_dir: options.output_dir,
            filename: options
                .filename
                .unwrap_or_else(|| kind.default_filename.to_string()),
            json_indent: options.json_indent.unwrap_or(DEFAULT_JSON_INDENT),
        };

        log.in_scope(|| {
            debug!(
                sidecar = kind.name,
                entries = payload_len(&payload),
                filename = %paths.filename,
                "Initialized sidecar"
            )
        });

        Ok(Self {
            kind,
            payload,
            paths,
            log,
        })
    }

    pub fn kind(&self) -> &'static SidecarKind {
        self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    pub fn log(&self) -> &LogHandle {
        &self.log
    }

    /// Object payload, if this sidecar holds one
    pub fn object(&self) -> Option<&Fields> {
        match &self.payload {
            Payload::Object(fields) => Some(fields),
            Payload::Table(_) => None,
        }
    }

    /// Table rows; empty for object payloads
    pub fn rows(&self) -> &[Fields] {
        match &self.payload {
            Payload::Table(rows) => rows,
            Payload::Object(_) => &[],
        }
    }

    /// One field of an object payload
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.object()?.get(name)
    }

    /// Destination for `persist` with the given arguments
    pub fn resolve_path(&self, output_dir: Option<&Path>, flat: bool) -> PathBuf {
        let mut path = output_dir
            .map(Path::to_path_buf)
            .or_else(|| self.paths.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        if !flat {
            for component in self.paths.bids_path.split('/').filter(|c| !c.is_empty()) {
                path.push(component);
            }
        }
        path.push(&self.paths.filename);
        path
    }

    fn write(&self, output_dir: Option<&Path>, flat: bool, format: OutputFormat) -> Result<PathBuf> {
        let contents = match (format, &self.payload) {
            (OutputFormat::Json, payload) => encode_json(self.kind, payload, self.paths.json_indent)?,
            (OutputFormat::Tsv, Payload::Table(rows)) => encode_tsv(self.kind, rows)?,
            (OutputFormat::Tsv, Payload::Object(_)) => {
                return Err(SidecarError::UnsupportedFormat {
                    sidecar: self.kind.name,
                    format,
                })
            }
        };

        let path = self.resolve_path(output_dir, flat);
        let persistence = |source| SidecarError::Persistence {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(persistence)?;
        }
        fs::write(&path, contents).map_err(persistence)?;
        let resolved = fs::canonicalize(&path).map_err(persistence)?;

        self.log.in_scope(|| {
            info!("Saved {} to {}", self.kind.name, resolved.display());
        });
        Ok(resolved)
    }
}

fn payload_len(payload: &Payload) -> usize {
    match payload {
        Payload::Object(fields) => fields.len(),
        Payload::Table(rows) => rows.len(),
    }
}

/// Polymorphic sidecar: kinds supply the core and their validation rule
pub trait Sidecar {
    fn core(&self) -> &SidecarCore;

    /// Check the payload against the kind's rules
    ///
    /// Pure apart from logging: repeated calls give the same answer and the
    /// payload is never modified.
    fn validate(&self) -> std::result::Result<(), ValidationError>;

    fn kind(&self) -> &'static SidecarKind {
        self.core().kind()
    }

    fn payload(&self) -> &Payload {
        self.core().payload()
    }

    fn paths(&self) -> &ResolvedPaths {
        self.core().paths()
    }

    /// Write the sidecar in its kind's default format
    ///
    /// The file goes to `output_dir/filename` when `flat`, otherwise to
    /// `output_dir/bids_path/filename`. Returns the canonicalized path.
    fn persist(&self, output_dir: Option<&Path>, flat: bool) -> Result<PathBuf> {
        self.core().write(output_dir, flat, self.kind().default_format)
    }

    /// Write the sidecar in an explicit format
    fn persist_as(&self, output_dir: Option<&Path>, flat: bool, format: OutputFormat) -> Result<PathBuf> {
        self.core().write(output_dir, flat, format)
    }

    /// Payload as pretty JSON text
    fn to_json(&self) -> Result<String> {
        let core = self.core();
        let bytes = encode_json(core.kind, &core.payload, core.paths.json_indent)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn field_summary(&self) -> String {
        self.kind().taxonomy.summary()
    }

    fn log_field_summary(&self) {
        let summary = self.field_summary();
        self.core().log().in_scope(|| info!("{} fields\n{}", self.kind().name, summary));
    }
}

/// Object rule: REQUIRED present; RECOMMENDED and unknown fields only warn
pub(crate) fn object_issues(core: &SidecarCore, fields: &Fields) -> Vec<ValidationIssue> {
    let taxonomy = &core.kind.taxonomy;
    let mut issues = Vec::new();

    let missing_required = taxonomy.missing_required(fields);
    if !missing_required.is_empty() {
        issues.push(ValidationIssue::MissingRequired {
            row: None,
            fields: missing_required,
        });
    }

    core.log.in_scope(|| {
        let missing_recommended = taxonomy.missing_recommended(fields);
        if !missing_recommended.is_empty() {
            warn!(sidecar = core.kind.name, "Missing RECOMMENDED fields: {:?}", missing_recommended);
        }
        let extras = taxonomy.extras(fields);
        if !extras.is_empty() {
            warn!(sidecar = core.kind.name, "Extra (non-BIDS) fields found: {:?}", extras);
        }
    });

    issues
}

/// Table rule: non-empty, identical columns, columns include REQUIRED
pub(crate) fn table_issues(core: &SidecarCore, rows: &[Fields]) -> Vec<ValidationIssue> {
    let taxonomy = &core.kind.taxonomy;
    let Some(first) = rows.first() else {
        return vec![ValidationIssue::EmptyTable];
    };

    let mut issues = column_issues(rows);
    for (row, fields) in rows.iter().enumerate() {
        let missing_required = taxonomy.missing_required(fields);
        if !missing_required.is_empty() {
            issues.push(ValidationIssue::MissingRequired {
                row: Some(row),
                fields: missing_required,
            });
        }
    }

    core.log.in_scope(|| {
        let missing_recommended = taxonomy.missing_recommended(first);
        if !missing_recommended.is_empty() {
            warn!(sidecar = core.kind.name, "Missing RECOMMENDED fields: {:?}", missing_recommended);
        }
        let extras = taxonomy.extras(first);
        if !extras.is_empty() {
            warn!(sidecar = core.kind.name, "Extra (non-BIDS) columns found: {:?}", extras);
        }
    });

    issues
}

/// Rows whose key set differs from the first row's
fn column_issues(rows: &[Fields]) -> Vec<ValidationIssue> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let expected: BTreeSet<&str> = first.keys().map(String::as_str).collect();

    rows.iter()
        .enumerate()
        .skip(1)
        .filter_map(|(row, fields)| {
            let actual: BTreeSet<&str> = fields.keys().map(String::as_str).collect();
            if actual == expected {
                return None;
            }
            Some(ValidationIssue::InconsistentColumns {
                row,
                missing: expected.difference(&actual).map(|s| s.to_string()).collect(),
                extra: actual.difference(&expected).map(|s| s.to_string()).collect(),
            })
        })
        .collect()
}

/// Turn collected issues into the validation outcome, logging each failure
pub(crate) fn finish_validation(
    core: &SidecarCore,
    issues: Vec<ValidationIssue>,
) -> std::result::Result<(), ValidationError> {
    core.log.in_scope(|| {
        if issues.is_empty() {
            info!("{} validation passed", core.kind.name);
            return Ok(());
        }
        for issue in &issues {
            error!(sidecar = core.kind.name, "{}", issue);
        }
        Err(ValidationError {
            sidecar: core.kind.name,
            issues,
        })
    })
}

/// Defaults overlaid with user fields; user values win and keep default order
pub(crate) fn merge_defaults(defaults: Fields, user: Fields) -> Fields {
    let mut merged = defaults;
    for (key, value) in user {
        merged.insert(key, value);
    }
    merged
}

/// JSON number for `value`, integral values without a fractional part
pub fn number_value(value: f64) -> Value {
    const EXACT_LIMIT: f64 = 9_007_199_254_740_992.0; // 2^53
    if value.fract() == 0.0 && value.abs() < EXACT_LIMIT {
        if value >= 0.0 {
            return Value::from(value as u64);
        }
        return Value::from(value as i64);
    }
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn encode_json(kind: &'static SidecarKind, payload: &Payload, indent: usize) -> Result<Vec<u8>> {
    let indent = vec![b' '; indent];
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(&indent));
    payload
        .serialize(&mut serializer)
        .map_err(|e| SidecarError::InvalidPayload {
            sidecar: kind.name,
            message: e.to_string(),
        })?;
    out.push(b'\n');
    Ok(out)
}

fn encode_tsv(kind: &'static SidecarKind, rows: &[Fields]) -> Result<Vec<u8>> {
    let Some(first) = rows.first() else {
        return Err(ValidationError {
            sidecar: kind.name,
            issues: vec![ValidationIssue::EmptyTable],
        }
        .into());
    };
    let issues = column_issues(rows);
    if !issues.is_empty() {
        return Err(ValidationError {
            sidecar: kind.name,
            issues,
        }
        .into());
    }

    let encoding = |e: csv::Error| SidecarError::InvalidPayload {
        sidecar: kind.name,
        message: e.to_string(),
    };

    let header: Vec<&str> = first.keys().map(String::as_str).collect();
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());
    writer.write_record(&header).map_err(encoding)?;
    for row in rows {
        writer
            .write_record(header.iter().map(|key| {
                row.get(*key)
                    .map(cell_text)
                    .unwrap_or(Cow::Borrowed("n/a"))
                    .into_owned()
            }))
            .map_err(encoding)?;
    }
    writer.into_inner().map_err(|e| SidecarError::InvalidPayload {
        sidecar: kind.name,
        message: e.to_string(),
    })
}

/// TSV cell text: strings raw, null as `n/a`, everything else as JSON
fn cell_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        Value::Null => Cow::Borrowed("n/a"),
        other => Cow::Owned(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    static TEST_KIND: SidecarKind = SidecarKind {
        name: "TestSidecar",
        default_filename: "test.json",
        default_bids_path: "bids_root/",
        default_format: OutputFormat::Json,
        taxonomy: FieldTaxonomy {
            required: &["A", "B"],
            recommended: &["C"],
            optional: &["D"],
        },
    };

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_path_keys_partitioned_out() {
        let payload = Payload::Object(fields(json!({
            "A": 1,
            "bids_path": "from/payload/",
            "filename": "payload.json",
            "input_dir": "ignored",
        })));
        let options = PathOptions::new().with_filename("explicit.json");
        let core = SidecarCore::new(&TEST_KIND, payload, options, LogHandle::discard()).unwrap();

        assert_eq!(core.paths().bids_path, "from/payload/");
        assert_eq!(core.paths().filename, "explicit.json");
        assert_eq!(core.payload(), &Payload::Object(fields(json!({"A": 1}))));
    }

    #[test]
    fn test_invalid_path_option_rejected() {
        let payload = Payload::Object(fields(json!({"json_indent": "wide"})));
        let result = SidecarCore::new(&TEST_KIND, payload, PathOptions::new(), LogHandle::discard());
        assert!(matches!(result, Err(SidecarError::InvalidPayload { .. })));
    }

    #[test]
    fn test_resolve_path_defaults_and_flat() {
        let core = SidecarCore::new(
            &TEST_KIND,
            Payload::Object(Fields::new()),
            PathOptions::new(),
            LogHandle::discard(),
        )
        .unwrap();
        assert_eq!(
            core.resolve_path(None, false),
            PathBuf::from("output/json/bids_root/test.json")
        );
        assert_eq!(
            core.resolve_path(Some(Path::new("/tmp/x")), true),
            PathBuf::from("/tmp/x/test.json")
        );
    }

    #[test]
    fn test_merge_defaults_user_wins() {
        let merged = merge_defaults(
            fields(json!({"A": 1, "B": 2})),
            fields(json!({"B": 20, "Z": 26})),
        );
        let keys: Vec<&str> = merged.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["A", "B", "Z"]);
        assert_eq!(merged["B"], json!(20));
    }

    #[test]
    fn test_taxonomy_summary_sorted() {
        let taxonomy = FieldTaxonomy {
            required: &["b", "a"],
            recommended: &[],
            optional: &["z"],
        };
        assert_eq!(taxonomy.summary(), "REQUIRED: a, b\nRECOMMENDED: \nOPTIONAL: z");
        assert!(taxonomy.knows("z"));
        assert!(!taxonomy.knows("y"));
    }

    #[test]
    fn test_tsv_cells_and_header_order() {
        let rows = vec![
            fields(json!({"name": "Fp1", "sampling_frequency": 256.5, "notch": null})),
            fields(json!({"name": "Cz", "sampling_frequency": 2000, "notch": "n/a"})),
        ];
        let bytes = encode_tsv(&TEST_KIND, &rows).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "name\tsampling_frequency\tnotch\nFp1\t256.5\tn/a\nCz\t2000\tn/a\n"
        );
    }

    #[test]
    fn test_tsv_rejects_inconsistent_rows() {
        let rows = vec![fields(json!({"a": 1, "b": 2})), fields(json!({"a": 1, "c": 3}))];
        match encode_tsv(&TEST_KIND, &rows) {
            Err(SidecarError::Validation(e)) => {
                assert!(e.mentions("b"));
                assert!(e.mentions("c"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_json_indent_and_trailing_newline() {
        let bytes = encode_json(&TEST_KIND, &Payload::Object(fields(json!({"A": 1}))), 4).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "{\n    \"A\": 1\n}\n");
    }

    #[test]
    fn test_persist_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let core = SidecarCore::new(
            &TEST_KIND,
            Payload::Object(fields(json!({"A": 1, "B": 2}))),
            PathOptions::new().with_bids_path("PRV-4ZHY/primary/"),
            LogHandle::discard(),
        )
        .unwrap();

        let path = core.write(Some(temp_dir.path()), false, OutputFormat::Json).unwrap();
        let expected = temp_dir.path().join("PRV-4ZHY/primary/test.json");
        assert_eq!(path, fs::canonicalize(expected).unwrap());

        let object_as_tsv = core.write(Some(temp_dir.path()), false, OutputFormat::Tsv);
        assert!(matches!(object_as_tsv, Err(SidecarError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_number_value() {
        assert_eq!(number_value(2000.0), json!(2000));
        assert_eq!(number_value(-3.0), json!(-3));
        assert_eq!(number_value(256.5), json!(256.5));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }
}
