//! Dataset description sidecar (`dataset_description.json`)
//!
//! Written once per dataset at the BIDS root (`PRV-{id}/primary/`). Only
//! `Name` varies per dataset; everything else comes from `DatasetConstants`.

use super::{
    finish_validation, merge_defaults, object_issues, FieldTaxonomy, Fields, PathOptions, Payload,
    Sidecar, SidecarCore, SidecarKind,
};
use crate::error::{OutputFormat, Result, ValidationError, ValidationIssue};
use prv_common::{layout, LogHandle};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub static DATASET_DESCRIPTION: SidecarKind = SidecarKind {
    name: "DatasetDescription",
    default_filename: "dataset_description.json",
    default_bids_path: "bids_root/",
    default_format: OutputFormat::Json,
    taxonomy: FieldTaxonomy {
        required: &["Name", "BIDSVersion"],
        recommended: &["DatasetType", "License", "Authors", "GeneratedBy"],
        optional: &[
            "Acknowledgements",
            "HowToAcknowledge",
            "Funding",
            "EthicsApprovals",
            "ReferencesAndLinks",
            "DatasetDOI",
            "Description",
        ],
    },
};

/// Software entry of `GeneratedBy`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GeneratedBy {
    pub name: String,
    pub version: String,
}

/// Fixed descriptive values shared by every dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatasetConstants {
    #[serde(rename = "BIDSVersion")]
    pub bids_version: String,
    pub dataset_type: String,
    pub license: String,
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub acknowledgements: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub how_to_acknowledge: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub funding: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ethics_approvals: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references_and_links: Vec<String>,
    #[serde(rename = "DatasetDOI", skip_serializing_if = "String::is_empty")]
    pub dataset_doi: String,
    pub generated_by: Vec<GeneratedBy>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Default for DatasetConstants {
    fn default() -> Self {
        Self {
            bids_version: "1.8.0".to_string(),
            dataset_type: "raw".to_string(),
            license: "CC-BY".to_string(),
            authors: vec!["PREVeNT Study Investigators".to_string()],
            acknowledgements: String::new(),
            how_to_acknowledge: String::new(),
            funding: Vec::new(),
            ethics_approvals: Vec::new(),
            references_and_links: Vec::new(),
            dataset_doi: String::new(),
            generated_by: vec![GeneratedBy {
                name: "prv-sidecars".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            }],
            description: "Clinical video EEG recordings of the PREVeNT study in a BIDS-like layout"
                .to_string(),
        }
    }
}

impl DatasetConstants {
    fn to_fields(&self) -> Fields {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            _ => Fields::new(),
        }
    }
}

const DATASET_TYPES: [&str; 2] = ["raw", "derivative"];

/// Top-level description of one dataset
#[derive(Debug, Clone)]
pub struct DatasetDescription {
    core: SidecarCore,
}

impl DatasetDescription {
    /// Build from user fields merged over `constants`
    pub fn new(
        fields: Fields,
        constants: &DatasetConstants,
        options: PathOptions,
        log: LogHandle,
    ) -> Result<Self> {
        let core = SidecarCore::new(
            &DATASET_DESCRIPTION,
            Payload::Object(merge_defaults(constants.to_fields(), fields)),
            options,
            log,
        )?;
        Ok(Self { core })
    }

    /// Description of the `PRV-{id}` dataset, located at its BIDS root
    pub fn for_patient(
        patient_id: &str,
        constants: &DatasetConstants,
        json_indent: usize,
        log: LogHandle,
    ) -> Result<Self> {
        let mut fields = Fields::new();
        fields.insert("Name".into(), Value::from(layout::dataset_name(patient_id)));
        let options = PathOptions::new()
            .with_bids_path(layout::dataset_bids_path(patient_id))
            .with_json_indent(json_indent);
        Self::new(fields, constants, options, log)
    }

    pub fn name(&self) -> Option<&str> {
        self.core.field("Name").and_then(Value::as_str)
    }
}

fn string_list_issue(fields: &Fields, field: &str) -> Option<ValidationIssue> {
    let value = fields.get(field)?;
    let ok = value
        .as_array()
        .is_some_and(|items| items.iter().all(Value::is_string));
    (!ok).then(|| ValidationIssue::Schema {
        field: field.to_string(),
        message: format!("{} is not a list of strings", value),
    })
}

impl Sidecar for DatasetDescription {
    fn core(&self) -> &SidecarCore {
        &self.core
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let Some(fields) = self.core.object() else {
            return finish_validation(&self.core, vec![ValidationIssue::not_an_object()]);
        };
        let mut issues = Vec::new();

        for field in ["Name", "BIDSVersion"] {
            match fields.get(field) {
                Some(Value::String(s)) if !s.trim().is_empty() => {}
                Some(other) => issues.push(ValidationIssue::Schema {
                    field: field.to_string(),
                    message: format!("{} is not a non-empty string", other),
                }),
                None => {}
            }
        }

        if let Some(value) = fields.get("DatasetType") {
            if !value.as_str().is_some_and(|t| DATASET_TYPES.contains(&t)) {
                issues.push(ValidationIssue::Schema {
                    field: "DatasetType".to_string(),
                    message: format!("{} is not one of {:?}", value, DATASET_TYPES),
                });
            }
        }

        issues.extend(
            ["Authors", "Funding", "EthicsApprovals", "ReferencesAndLinks"]
                .iter()
                .filter_map(|field| string_list_issue(fields, field)),
        );

        if let Some(value) = fields.get("GeneratedBy") {
            let ok = value.as_array().is_some_and(|entries| {
                entries
                    .iter()
                    .all(|entry| entry.get("Name").is_some_and(Value::is_string))
            });
            if !ok {
                issues.push(ValidationIssue::Schema {
                    field: "GeneratedBy".to_string(),
                    message: "every entry needs a Name".to_string(),
                });
            }
        }

        issues.extend(object_issues(&self.core, fields));
        finish_validation(&self.core, issues)
    }
}
