//! Signal metadata collaborator
//!
//! Sidecar generation only needs a metadata record and a channel list per
//! recording. `SignalMetadataSource` is the seam; extraction never fails from
//! the caller's point of view and degrades to placeholder data instead.

use crate::edf::EdfHeader;
use crate::error::SignalError;
use crate::sidecar::{number_value, Fields};
use chrono::NaiveDateTime;
use prv_common::{ChannelCounts, ChannelType, LogHandle};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// Sampling frequency reported when a file cannot be read
pub const PLACEHOLDER_SAMPLING_FREQUENCY: f64 = 2000.0;

/// Channel montage reported when a file cannot be read
pub const PLACEHOLDER_CHANNELS: [&str; 21] = [
    "Fp1", "Fp2", "F3", "F4", "C3", "C4", "P3", "P4", "O1", "O2", "F7", "F8", "T3", "T4", "T5",
    "T6", "Fz", "Cz", "Pz", "EKG1", "EOG1",
];

/// One channel of a recording
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRecord {
    pub name: String,
    pub sampling_frequency: f64,
}

impl ChannelRecord {
    pub fn new(name: impl Into<String>, sampling_frequency: f64) -> Self {
        Self {
            name: name.into(),
            sampling_frequency,
        }
    }

    pub fn channel_type(&self) -> ChannelType {
        ChannelType::classify(&self.name)
    }
}

/// Recording-level metadata
#[derive(Debug, Clone, PartialEq)]
pub struct SignalMetadata {
    pub sampling_frequency: f64,
    /// Seconds
    pub recording_duration: f64,
    pub counts: ChannelCounts,
    pub start: Option<NaiveDateTime>,
}

impl SignalMetadata {
    /// Recording metadata fields in their sidecar spelling
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            "SamplingFrequency".into(),
            number_value(self.sampling_frequency),
        );
        fields.insert(
            "RecordingDuration".into(),
            number_value(self.recording_duration),
        );
        let counts = [
            ("EEGChannelCount", self.counts.eeg),
            ("ECGChannelCount", self.counts.ecg),
            ("EMGChannelCount", self.counts.emg),
            ("EOGChannelCount", self.counts.eog),
            ("MiscChannelCount", self.counts.misc),
            ("TriggerChannelCount", self.counts.trigger),
        ];
        for (key, count) in counts {
            fields.insert(key.into(), Value::from(count));
        }
        fields
    }
}

/// Placeholder channel list
pub fn placeholder_channels() -> Vec<ChannelRecord> {
    PLACEHOLDER_CHANNELS
        .iter()
        .map(|name| ChannelRecord::new(*name, PLACEHOLDER_SAMPLING_FREQUENCY))
        .collect()
}

/// Placeholder metadata, consistent with `placeholder_channels`
pub fn placeholder_metadata() -> SignalMetadata {
    SignalMetadata {
        sampling_frequency: PLACEHOLDER_SAMPLING_FREQUENCY,
        recording_duration: 0.0,
        counts: ChannelCounts::from_labels(PLACEHOLDER_CHANNELS),
        start: None,
    }
}

/// Source of recording metadata and channel lists
pub trait SignalMetadataSource {
    fn extract_metadata(&self, path: &Path) -> SignalMetadata;

    fn extract_channels(&self, path: &Path) -> Vec<ChannelRecord>;
}

/// Always reports placeholder data without touching the file
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderSource;

impl SignalMetadataSource for PlaceholderSource {
    fn extract_metadata(&self, _path: &Path) -> SignalMetadata {
        placeholder_metadata()
    }

    fn extract_channels(&self, _path: &Path) -> Vec<ChannelRecord> {
        placeholder_channels()
    }
}

/// Reads EDF headers, falling back to placeholders with a warning
#[derive(Debug, Clone)]
pub struct EdfHeaderSource {
    log: LogHandle,
}

impl EdfHeaderSource {
    pub fn new(log: LogHandle) -> Self {
        Self { log }
    }

    fn read_channels(path: &Path) -> Result<(EdfHeader, Vec<ChannelRecord>), SignalError> {
        let header = EdfHeader::read(path)?;
        let channels: Vec<ChannelRecord> = header
            .data_signals()
            .map(|signal| {
                ChannelRecord::new(
                    signal.label.clone(),
                    header
                        .sampling_frequency(signal)
                        .unwrap_or(PLACEHOLDER_SAMPLING_FREQUENCY),
                )
            })
            .collect();
        if channels.is_empty() {
            return Err(SignalError::NoDataSignals);
        }
        Ok((header, channels))
    }
}

impl SignalMetadataSource for EdfHeaderSource {
    fn extract_metadata(&self, path: &Path) -> SignalMetadata {
        self.log.in_scope(|| match Self::read_channels(path) {
            Ok((header, channels)) => {
                let metadata = SignalMetadata {
                    sampling_frequency: channels[0].sampling_frequency,
                    recording_duration: header.duration_seconds(),
                    counts: ChannelCounts::from_labels(channels.iter().map(|c| c.name.as_str())),
                    start: header.start,
                };
                debug!(
                    file = %path.display(),
                    sampling_frequency = metadata.sampling_frequency,
                    channels = channels.len(),
                    "Read EDF header"
                );
                metadata
            }
            Err(e) => {
                warn!(
                    file = %path.display(),
                    error = %e,
                    "Could not extract EDF metadata, using placeholder values"
                );
                placeholder_metadata()
            }
        })
    }

    fn extract_channels(&self, path: &Path) -> Vec<ChannelRecord> {
        self.log.in_scope(|| match Self::read_channels(path) {
            Ok((_, channels)) => channels,
            Err(e) => {
                warn!(
                    file = %path.display(),
                    error = %e,
                    "Could not extract EDF channels, using placeholder channels"
                );
                placeholder_channels()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edf::testing::header_bytes;
    use tempfile::TempDir;

    #[test]
    fn test_placeholder_counts_match_channels() {
        let metadata = placeholder_metadata();
        assert_eq!(metadata.counts.eeg, 19);
        assert_eq!(metadata.counts.ecg, 1);
        assert_eq!(metadata.counts.eog, 1);
        assert_eq!(metadata.counts.total() as usize, placeholder_channels().len());
        assert_eq!(metadata.recording_duration, 0.0);
    }

    #[test]
    fn test_fields_use_sidecar_names() {
        let fields = placeholder_metadata().to_fields();
        assert_eq!(fields["SamplingFrequency"], Value::from(2000));
        assert_eq!(fields["RecordingDuration"], Value::from(0));
        assert_eq!(fields["EEGChannelCount"], Value::from(19));
        assert_eq!(fields["TriggerChannelCount"], Value::from(0));
    }

    #[test]
    fn test_edf_source_reads_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rec.edf");
        std::fs::write(
            &path,
            header_bytes(&[("Fp1", 512), ("EOG1", 512), ("EDF Annotations", 60)], 600, 2.0),
        )
        .unwrap();

        let source = EdfHeaderSource::new(LogHandle::discard());
        let metadata = source.extract_metadata(&path);
        assert_eq!(metadata.sampling_frequency, 256.0);
        assert_eq!(metadata.recording_duration, 1200.0);
        assert_eq!(metadata.counts.eeg, 1);
        assert_eq!(metadata.counts.eog, 1);
        assert!(metadata.start.is_some());

        let channels = source.extract_channels(&path);
        assert_eq!(
            channels,
            vec![ChannelRecord::new("Fp1", 256.0), ChannelRecord::new("EOG1", 256.0)]
        );
    }

    #[test]
    fn test_edf_source_degrades_with_warning() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.edf");
        std::fs::write(&path, b"not an edf file").unwrap();

        let (log, capture) = LogHandle::capture();
        let source = EdfHeaderSource::new(log);

        assert_eq!(source.extract_metadata(&path), placeholder_metadata());
        assert_eq!(source.extract_channels(&path).len(), 21);
        assert_eq!(capture.count_matching("placeholder"), 2);
    }
}
