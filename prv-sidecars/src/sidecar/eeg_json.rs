//! Recording metadata sidecar (`*_eeg.json`)

use super::{
    finish_validation, merge_defaults, object_issues, Fields, PathOptions, Payload, Sidecar,
    SidecarCore, SidecarKind, FieldTaxonomy,
};
use crate::error::{OutputFormat, Result, ValidationError, ValidationIssue};
use crate::signal::SignalMetadata;
use prv_common::{layout, LogHandle};
use serde_json::{json, Value};
use tracing::debug;

pub static EEG_JSON: SidecarKind = SidecarKind {
    name: "EegJson",
    default_filename: "eeg.json",
    default_bids_path: "output_sidecars/",
    default_format: OutputFormat::Json,
    taxonomy: FieldTaxonomy {
        required: &[
            "TaskName",
            "TaskDescription",
            "EEGReference",
            "EEGGround",
            "SamplingFrequency",
            "PowerLineFrequency",
            "SoftwareFilters",
        ],
        recommended: &[
            "InstitutionName",
            "Manufacturer",
            "EEGChannelCount",
            "ECGChannelCount",
            "EMGChannelCount",
            "EOGChannelCount",
            "MiscChannelCount",
            "TriggerChannelCount",
            "RecordingDuration",
            "RecordingType",
            "EEGPlacementScheme",
            "HardwareFilters",
        ],
        optional: &["ManufacturerModelName", "SubjectArtefactDescription", "Impedance"],
    },
};

/// Accepted values for one field
enum Rule {
    Text,
    TextOneOf(&'static [&'static str]),
    Object,
    /// Number with an inclusive lower bound
    NumberAtLeast(f64),
    NumberOneOf(&'static [f64]),
    /// Integer with an inclusive lower bound
    IntegerAtLeast(i64),
}

const PROPERTY_RULES: &[(&str, Rule)] = &[
    ("TaskName", Rule::Text),
    ("TaskDescription", Rule::Text),
    ("EEGReference", Rule::Text),
    ("EEGGround", Rule::Text),
    ("SamplingFrequency", Rule::NumberAtLeast(0.0)),
    ("PowerLineFrequency", Rule::NumberOneOf(&[50.0, 60.0])),
    ("SoftwareFilters", Rule::Object),
    ("InstitutionName", Rule::Text),
    ("Manufacturer", Rule::Text),
    ("EEGChannelCount", Rule::IntegerAtLeast(0)),
    ("ECGChannelCount", Rule::IntegerAtLeast(0)),
    ("EMGChannelCount", Rule::IntegerAtLeast(0)),
    ("EOGChannelCount", Rule::IntegerAtLeast(0)),
    ("MiscChannelCount", Rule::IntegerAtLeast(0)),
    ("TriggerChannelCount", Rule::IntegerAtLeast(0)),
    ("RecordingDuration", Rule::NumberAtLeast(0.0)),
    (
        "RecordingType",
        Rule::TextOneOf(&["continuous", "discontinuous", "epoched"]),
    ),
    ("EEGPlacementScheme", Rule::Text),
    ("HardwareFilters", Rule::Object),
    ("ManufacturerModelName", Rule::Text),
    ("SubjectArtefactDescription", Rule::Text),
    ("Impedance", Rule::NumberAtLeast(0.0)),
];

impl Rule {
    fn check(&self, value: &Value) -> Option<String> {
        match self {
            Rule::Text if !value.is_string() => Some(format!("{} is not a string", value)),
            Rule::TextOneOf(allowed) => match value.as_str() {
                Some(s) if allowed.contains(&s) => None,
                _ => Some(format!("{} is not one of {:?}", value, allowed)),
            },
            Rule::Object if !value.is_object() => Some(format!("{} is not an object", value)),
            Rule::NumberAtLeast(min) => match value.as_f64() {
                Some(n) if n >= *min => None,
                Some(n) => Some(format!("{} is less than the minimum of {}", n, min)),
                None => Some(format!("{} is not a number", value)),
            },
            Rule::NumberOneOf(allowed) => match value.as_f64() {
                Some(n) if allowed.contains(&n) => None,
                _ => Some(format!("{} is not one of {:?}", value, allowed)),
            },
            Rule::IntegerAtLeast(min) => match value.as_i64() {
                Some(n) if n >= *min => None,
                Some(n) => Some(format!("{} is less than the minimum of {}", n, min)),
                None => Some(format!("{} is not an integer", value)),
            },
            _ => None,
        }
    }
}

/// Study defaults merged under user-supplied fields
pub fn defaults() -> Fields {
    let value = json!({
        "TaskName": "PREVeNT Study EEG",
        "TaskDescription": "All video EEG studies will be recorded for one hour, incorporating both 20mins of sleep and wakefulness, recordings can be up to 80min to capture sleep",
        "EEGReference": "Slightly anterior and slightly left of the Cz electrode",
        "EEGGround": "slightly anterior and slightly right of the Cz electrode",
        "PowerLineFrequency": 60,
        "SoftwareFilters": {
            "Anti-aliasing filter": {
                "half-amplitude cutoff (Hz)": 500,
                "Roll-off": "6dB/Octave"
            }
        },
        "Manufacturer": "n/a",
        "RecordingType": "continuous",
        "EEGPlacementScheme": "n/a",
        "HardwareFilters": {
            "ADC's decimation filter (hardware bandwidth limit)": {
                "-3dB cutoff point (Hz)": 480,
                "Filter order sinc response": 5
            }
        },
        "ManufacturerModelName": "n/a",
        "SubjectArtefactDescription": "n/a"
    });
    match value {
        Value::Object(fields) => fields,
        _ => Fields::new(),
    }
}

/// `sub-PRV-{id}-{age}_task-{task}_eeg.json`
pub fn file_name(patient_id: &str, age_months: u32, task: &str) -> String {
    format!(
        "{}_task-{}_eeg.json",
        layout::recording_entity(patient_id, age_months),
        task
    )
}

/// Recording metadata for one session
#[derive(Debug, Clone)]
pub struct EegJson {
    core: SidecarCore,
}

impl EegJson {
    /// Build from user fields merged over the study defaults
    pub fn new(fields: Fields, options: PathOptions, log: LogHandle) -> Result<Self> {
        let supplied = fields.len();
        let core = SidecarCore::new(
            &EEG_JSON,
            Payload::Object(merge_defaults(defaults(), fields)),
            options,
            log,
        )?;
        core.log().in_scope(|| {
            debug!(
                "EegJson initialized with {} fields ({} user-supplied, {} defaults)",
                core.object().map_or(0, Fields::len),
                supplied,
                defaults().len()
            )
        });
        Ok(Self { core })
    }

    pub fn from_metadata(
        metadata: &SignalMetadata,
        options: PathOptions,
        log: LogHandle,
    ) -> Result<Self> {
        Self::new(metadata.to_fields(), options, log)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.core.field(name)
    }

    pub fn task_name(&self) -> Option<&str> {
        self.field("TaskName").and_then(Value::as_str)
    }

    pub fn sampling_frequency(&self) -> Option<f64> {
        self.field("SamplingFrequency").and_then(Value::as_f64)
    }

    pub fn power_line_frequency(&self) -> Option<f64> {
        self.field("PowerLineFrequency").and_then(Value::as_f64)
    }

    pub fn recording_duration(&self) -> Option<f64> {
        self.field("RecordingDuration").and_then(Value::as_f64)
    }

    pub fn eeg_channel_count(&self) -> Option<u64> {
        self.field("EEGChannelCount").and_then(Value::as_u64)
    }
}

impl Sidecar for EegJson {
    fn core(&self) -> &SidecarCore {
        &self.core
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let Some(fields) = self.core.object() else {
            return finish_validation(&self.core, vec![ValidationIssue::not_an_object()]);
        };
        let mut issues: Vec<ValidationIssue> = PROPERTY_RULES
            .iter()
            .filter_map(|(name, rule)| {
                let message = rule.check(fields.get(*name)?)?;
                Some(ValidationIssue::Schema {
                    field: name.to_string(),
                    message,
                })
            })
            .collect();
        issues.extend(object_issues(&self.core, fields));
        finish_validation(&self.core, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::placeholder_metadata;

    fn with(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn sidecar(fields: Fields) -> EegJson {
        EegJson::new(fields, PathOptions::new(), LogHandle::discard()).unwrap()
    }

    #[test]
    fn test_defaults_plus_metadata_is_valid() {
        let eeg = EegJson::from_metadata(
            &placeholder_metadata(),
            PathOptions::new(),
            LogHandle::discard(),
        )
        .unwrap();
        assert!(eeg.validate().is_ok());
        assert_eq!(eeg.sampling_frequency(), Some(2000.0));
        assert_eq!(eeg.power_line_frequency(), Some(60.0));
        assert_eq!(eeg.eeg_channel_count(), Some(19));
        assert_eq!(eeg.task_name(), Some("PREVeNT Study EEG"));
    }

    #[test]
    fn test_missing_sampling_frequency_fails() {
        let err = sidecar(Fields::new()).validate().unwrap_err();
        assert!(err.mentions("SamplingFrequency"));
        assert_eq!(err.issues.len(), 1);
    }

    #[test]
    fn test_negative_sampling_frequency_fails() {
        let eeg = sidecar(with(&[("SamplingFrequency", json!(-1))]));
        let err = eeg.validate().unwrap_err();
        assert!(matches!(
            &err.issues[0],
            ValidationIssue::Schema { field, .. } if field == "SamplingFrequency"
        ));
    }

    #[test]
    fn test_power_line_frequency_must_be_50_or_60() {
        let ok = sidecar(with(&[
            ("SamplingFrequency", json!(256)),
            ("PowerLineFrequency", json!(50)),
        ]));
        assert!(ok.validate().is_ok());

        let bad = sidecar(with(&[
            ("SamplingFrequency", json!(256)),
            ("PowerLineFrequency", json!(55)),
        ]));
        assert!(bad.validate().unwrap_err().mentions("PowerLineFrequency"));
    }

    #[test]
    fn test_every_issue_enumerated() {
        let eeg = sidecar(with(&[
            ("SamplingFrequency", json!("fast")),
            ("RecordingType", json!("sometimes")),
            ("EEGChannelCount", json!(2.5)),
        ]));
        let err = eeg.validate().unwrap_err();
        assert_eq!(err.issues.len(), 3);
        let text = err.to_string();
        assert!(text.contains("SamplingFrequency"));
        assert!(text.contains("RecordingType"));
        assert!(text.contains("EEGChannelCount"));
    }

    #[test]
    fn test_user_values_override_defaults() {
        let eeg = sidecar(with(&[
            ("SamplingFrequency", json!(512)),
            ("Manufacturer", json!("Natus")),
        ]));
        assert_eq!(eeg.field("Manufacturer"), Some(&json!("Natus")));
        assert_eq!(eeg.core().object().unwrap().len(), defaults().len() + 1);
    }

    #[test]
    fn test_validation_is_repeatable_and_pure() {
        let (log, capture) = LogHandle::capture();
        let eeg = EegJson::new(
            with(&[("SamplingFrequency", json!(256)), ("Scanner", json!("x"))]),
            PathOptions::new(),
            log,
        )
        .unwrap();
        let before = eeg.payload().clone();

        let first = eeg.validate();
        let second = eeg.validate();
        assert_eq!(first, second);
        assert_eq!(eeg.payload(), &before);
        assert_eq!(capture.count_matching("Extra (non-BIDS) fields found"), 2);
        assert_eq!(capture.count_matching("Missing RECOMMENDED fields"), 2);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("4ZHY", 15, "rest"), "sub-PRV-4ZHY-15_task-rest_eeg.json");
    }
}
