//! Sidecar generation over a scanned tree
//!
//! Phases run kind by kind: recording metadata for every session, then
//! channel tables for every session, then one session table per patient, then
//! (if enabled) one dataset description per patient. A failure is logged with
//! the offending identifier and counted; it never stops the remaining work.

use crate::error::SidecarError;
use crate::scanner::{ScanReport, SessionRecord};
use crate::sidecar::{
    channels_tsv, eeg_json, sessions_tsv, ChannelsTsv, DatasetConstants, DatasetDescription,
    EegJson, PathOptions, Sidecar, SessionsTsv,
};
use crate::signal::SignalMetadataSource;
use prv_common::config::{SessionsConfig, SidecarConfig};
use prv_common::{layout, LogHandle};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Successes and failures of one sidecar kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub failed: usize,
}

impl Tally {
    fn record(&mut self, ok: bool) {
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} successful, {} failed", self.succeeded, self.failed)
    }
}

/// Outcome of one generation pass
#[derive(Debug, Clone, Default)]
pub struct GenerationSummary {
    pub eeg_json: Tally,
    pub channels_tsv: Tally,
    pub sessions_tsv: Tally,
    /// None when dataset descriptions are disabled
    pub dataset_description: Option<Tally>,
    /// Sessions the scanner rejected before generation
    pub rejected_sessions: usize,
    /// Every file written, in write order
    pub written: Vec<PathBuf>,
}

impl GenerationSummary {
    /// True if nothing failed and no session was rejected
    pub fn all_succeeded(&self) -> bool {
        self.eeg_json.failed == 0
            && self.channels_tsv.failed == 0
            && self.sessions_tsv.failed == 0
            && self.dataset_description.map_or(true, |t| t.failed == 0)
            && self.rejected_sessions == 0
    }

    /// Per-kind summary lines
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("EEG JSON: {}", self.eeg_json),
            format!("Channels TSV: {}", self.channels_tsv),
            format!("Sessions TSV: {}", self.sessions_tsv),
        ];
        if let Some(tally) = self.dataset_description {
            lines.push(format!("Dataset description: {}", tally));
        }
        if self.rejected_sessions > 0 {
            lines.push(format!("Rejected sessions: {}", self.rejected_sessions));
        }
        lines
    }
}

/// Builds, validates and writes every sidecar for a scanned tree
pub struct SidecarGenerator {
    sidecar: SidecarConfig,
    sessions: SessionsConfig,
    constants: DatasetConstants,
    source: Box<dyn SignalMetadataSource>,
    log: LogHandle,
}

impl SidecarGenerator {
    pub fn new(
        sidecar: SidecarConfig,
        sessions: SessionsConfig,
        source: impl SignalMetadataSource + 'static,
        log: LogHandle,
    ) -> Self {
        Self {
            sidecar,
            sessions,
            constants: DatasetConstants::default(),
            source: Box::new(source),
            log,
        }
    }

    pub fn with_constants(mut self, constants: DatasetConstants) -> Self {
        self.constants = constants;
        self
    }

    pub fn generate(&self, scan: &ScanReport, output_dir: &Path) -> GenerationSummary {
        let mut summary = GenerationSummary {
            rejected_sessions: scan.rejected.len(),
            ..Default::default()
        };
        let patients = scan.sessions_by_patient();

        self.log.in_scope(|| info!("Generating _eeg.json sidecars..."));
        for session in &scan.sessions {
            let result = self.eeg_json(session).and_then(|s| finish(&s, output_dir));
            self.tally(&mut summary.eeg_json, &mut summary.written, result, || {
                session_label(session)
            });
        }
        self.log
            .in_scope(|| info!("EEG JSON: {}", summary.eeg_json));

        self.log.in_scope(|| info!("Generating _channels.tsv sidecars..."));
        for session in &scan.sessions {
            let result = self.channels_tsv(session).and_then(|s| finish(&s, output_dir));
            self.tally(&mut summary.channels_tsv, &mut summary.written, result, || {
                session_label(session)
            });
        }
        self.log
            .in_scope(|| info!("Channels TSV: {}", summary.channels_tsv));

        self.log.in_scope(|| info!("Generating sessions.tsv sidecars..."));
        for (patient_id, sessions) in &patients {
            let result = self
                .sessions_tsv(patient_id, sessions)
                .and_then(|s| finish(&s, output_dir));
            self.tally(&mut summary.sessions_tsv, &mut summary.written, result, || {
                layout::dataset_name(patient_id)
            });
        }
        self.log
            .in_scope(|| info!("Sessions TSV: {}", summary.sessions_tsv));

        if self.sidecar.dataset_description {
            self.log
                .in_scope(|| info!("Generating dataset_description.json sidecars..."));
            let mut tally = Tally::default();
            for patient_id in patients.keys() {
                let result = DatasetDescription::for_patient(
                    patient_id,
                    &self.constants,
                    self.sidecar.json_indent,
                    self.log.clone(),
                )
                .and_then(|s| finish(&s, output_dir));
                self.tally(&mut tally, &mut summary.written, result, || {
                    layout::dataset_name(patient_id)
                });
            }
            self.log
                .in_scope(|| info!("Dataset description: {}", tally));
            summary.dataset_description = Some(tally);
        }

        summary
    }

    fn eeg_json(&self, session: &SessionRecord) -> Result<EegJson, SidecarError> {
        let metadata = self.source.extract_metadata(&session.signal_file);
        let options = PathOptions::new()
            .with_bids_path(session.bids_path())
            .with_filename(eeg_json::file_name(
                &session.patient_id,
                session.age_months,
                &self.sidecar.task_label,
            ))
            .with_json_indent(self.sidecar.json_indent);
        EegJson::from_metadata(&metadata, options, self.log.clone())
    }

    fn channels_tsv(&self, session: &SessionRecord) -> Result<ChannelsTsv, SidecarError> {
        let channels = self.source.extract_channels(&session.signal_file);
        let options = PathOptions::new()
            .with_bids_path(session.bids_path())
            .with_filename(channels_tsv::file_name(
                &session.patient_id,
                session.age_months,
                &self.sidecar.task_label,
            ));
        ChannelsTsv::from_channels(
            &channels,
            &self.sidecar.channel_units,
            options,
            self.log.clone(),
        )
    }

    fn sessions_tsv(
        &self,
        patient_id: &str,
        sessions: &[&SessionRecord],
    ) -> Result<SessionsTsv, SidecarError> {
        let ages: Vec<u32> = sessions.iter().map(|s| s.age_months).collect();
        let options = PathOptions::new()
            .with_bids_path(layout::subject_bids_path(patient_id))
            .with_filename(sessions_tsv::file_name(patient_id));
        SessionsTsv::from_ages(&ages, &self.sessions, options, self.log.clone())
    }

    fn tally(
        &self,
        tally: &mut Tally,
        written: &mut Vec<PathBuf>,
        result: Result<PathBuf, SidecarError>,
        entity: impl FnOnce() -> String,
    ) {
        match result {
            Ok(path) => {
                written.push(path);
                tally.record(true);
            }
            Err(e) => {
                let entity = entity();
                self.log.in_scope(|| error!("  ✗ {}: {}", entity, e));
                tally.record(false);
            }
        }
    }
}

/// Validate, then write under the kind's BIDS path
fn finish<T: Sidecar>(sidecar: &T, output_dir: &Path) -> Result<PathBuf, SidecarError> {
    sidecar.validate()?;
    sidecar.persist(Some(output_dir), false)
}

fn session_label(session: &SessionRecord) -> String {
    format!(
        "{} {}",
        layout::subject_label(&session.patient_id),
        layout::session_label(session.age_months)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_succeeded_counts_rejections() {
        let mut summary = GenerationSummary::default();
        assert!(summary.all_succeeded());

        summary.rejected_sessions = 1;
        assert!(!summary.all_succeeded());

        summary.rejected_sessions = 0;
        summary.dataset_description = Some(Tally {
            succeeded: 1,
            failed: 1,
        });
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn test_summary_lines() {
        let summary = GenerationSummary {
            eeg_json: Tally {
                succeeded: 2,
                failed: 1,
            },
            ..Default::default()
        };
        let lines = summary.lines();
        assert_eq!(lines[0], "EEG JSON: 2 successful, 1 failed");
        assert_eq!(lines.len(), 3);
    }
}
