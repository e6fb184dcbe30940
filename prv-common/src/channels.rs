//! Channel type classification from channel labels
//!
//! Shared by the channel table (one `type` per row) and the recording metadata
//! (per-type channel counts), so both always agree.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Electrode labels of the 10-20 system, upper-cased
///
/// Includes the modern T7/T8/P7/P8 aliases of T3/T4/T5/T6.
const TEN_TWENTY_LABELS: &[&str] = &[
    "FP1", "FP2", "F3", "F4", "C3", "C4", "P3", "P4", "O1", "O2", "F7", "F8", "T3", "T4", "T5",
    "T6", "FZ", "CZ", "PZ", "A1", "A2", "T7", "T8", "P7", "P8",
];

/// Channel type written to the `type` column of channel tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelType {
    Eeg,
    Ecg,
    Eog,
    Emg,
    Misc,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Eeg => "EEG",
            ChannelType::Ecg => "ECG",
            ChannelType::Eog => "EOG",
            ChannelType::Emg => "EMG",
            ChannelType::Misc => "MISC",
        }
    }

    /// Classify a channel label
    ///
    /// Total over all strings: exact 10-20 match → EEG, then substring checks
    /// for ECG (EKG/ECG), EOG, EMG (EMG/MUSC), otherwise MISC. Unknown labels
    /// are logged as a warning.
    pub fn classify(label: &str) -> ChannelType {
        let upper = label.trim().to_uppercase();

        if TEN_TWENTY_LABELS.contains(&upper.as_str()) {
            return ChannelType::Eeg;
        }
        if upper.contains("EKG") || upper.contains("ECG") {
            return ChannelType::Ecg;
        }
        if upper.contains("EOG") {
            return ChannelType::Eog;
        }
        if upper.contains("EMG") || upper.contains("MUSC") {
            return ChannelType::Emg;
        }

        tracing::warn!(channel = %label, "Channel type unknown, defaulting to MISC");
        ChannelType::Misc
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of channels of each type in one recording
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCounts {
    pub eeg: u32,
    pub ecg: u32,
    pub eog: u32,
    pub emg: u32,
    pub misc: u32,
    /// Always zero: no label maps to a trigger channel
    pub trigger: u32,
}

impl ChannelCounts {
    /// Count channel types over a list of labels
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts = Self::default();
        for label in labels {
            counts.add(ChannelType::classify(label));
        }
        counts
    }

    pub fn add(&mut self, channel_type: ChannelType) {
        match channel_type {
            ChannelType::Eeg => self.eeg += 1,
            ChannelType::Ecg => self.ecg += 1,
            ChannelType::Eog => self.eog += 1,
            ChannelType::Emg => self.emg += 1,
            ChannelType::Misc => self.misc += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.eeg + self.ecg + self.eog + self.emg + self.misc + self.trigger
    }
}
