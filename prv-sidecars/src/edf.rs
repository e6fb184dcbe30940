//! EDF/EDF+ header reader
//!
//! Only the header is read: the fixed 256-byte main header followed by
//! 256 bytes per signal, stored field by field for all signals:
//!
//! ```text
//! label 16 | transducer 80 | physical dimension 8 | physical min 8 | physical max 8
//! digital min 8 | digital max 8 | prefiltering 80 | samples per record 8 | reserved 32
//! ```
//!
//! Sample data is never touched.

use crate::error::SignalError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const MAIN_HEADER_SIZE: usize = 256;
const SIGNAL_HEADER_SIZE: usize = 256;
const MAX_SIGNALS: usize = 4096;

/// Label of the EDF+ annotation pseudo-signal
pub const ANNOTATION_LABEL: &str = "EDF Annotations";

/// One signal described in the header
#[derive(Debug, Clone, PartialEq)]
pub struct EdfSignal {
    pub label: String,
    pub transducer: String,
    pub physical_dimension: String,
    pub prefiltering: String,
    pub samples_per_record: u64,
}

impl EdfSignal {
    pub fn is_annotation(&self) -> bool {
        self.label == ANNOTATION_LABEL
    }
}

/// Parsed EDF header
#[derive(Debug, Clone, PartialEq)]
pub struct EdfHeader {
    pub patient: String,
    pub recording: String,
    /// None when the date/time fields are malformed
    pub start: Option<NaiveDateTime>,
    /// Number of data records; -1 while a recording is still being written
    pub data_records: i64,
    /// Duration of one data record in seconds
    pub record_duration: f64,
    pub is_edf_plus: bool,
    pub signals: Vec<EdfSignal>,
}

impl EdfHeader {
    /// Read the header of the EDF file at `path`
    pub fn read(path: &Path) -> Result<EdfHeader, SignalError> {
        let file = File::open(path)?;
        Self::parse(BufReader::new(file))
    }

    pub fn parse<R: Read>(mut reader: R) -> Result<EdfHeader, SignalError> {
        let mut main = [0u8; MAIN_HEADER_SIZE];
        reader.read_exact(&mut main)?;

        let version = ascii_field(&main[0..8]);
        if !version.starts_with('0') {
            return Err(SignalError::InvalidHeader(format!(
                "unknown version '{}'",
                version
            )));
        }

        let signal_count = parse_int(&main[252..256], "number of signals")?;
        if signal_count < 1 || signal_count as usize > MAX_SIGNALS {
            return Err(SignalError::InvalidHeader(format!(
                "invalid number of signals {}",
                signal_count
            )));
        }
        let signal_count = signal_count as usize;

        let header_bytes = parse_int(&main[184..192], "header size")?;
        let expected = (signal_count + 1) * SIGNAL_HEADER_SIZE;
        if header_bytes != expected as i64 {
            return Err(SignalError::InvalidHeader(format!(
                "header size {} does not match {} signals",
                header_bytes, signal_count
            )));
        }

        let data_records = parse_int(&main[236..244], "number of data records")?;
        let record_duration = parse_float(&main[244..252], "data record duration")?;
        if record_duration < 0.0 {
            return Err(SignalError::InvalidHeader(format!(
                "negative data record duration {}",
                record_duration
            )));
        }

        let reserved = ascii_field(&main[192..236]);
        let start = parse_start(&ascii_field(&main[168..176]), &ascii_field(&main[176..184]));

        let mut signal_header = vec![0u8; signal_count * SIGNAL_HEADER_SIZE];
        reader.read_exact(&mut signal_header)?;
        let signals = parse_signals(&signal_header, signal_count)?;

        Ok(EdfHeader {
            patient: ascii_field(&main[8..88]),
            recording: ascii_field(&main[88..168]),
            start,
            data_records,
            record_duration,
            is_edf_plus: reserved.starts_with("EDF+"),
            signals,
        })
    }

    /// Signals carrying samples (annotation signal excluded)
    pub fn data_signals(&self) -> impl Iterator<Item = &EdfSignal> {
        self.signals.iter().filter(|s| !s.is_annotation())
    }

    /// Sampling frequency of one signal in Hz
    pub fn sampling_frequency(&self, signal: &EdfSignal) -> Option<f64> {
        if self.record_duration > 0.0 {
            Some(signal.samples_per_record as f64 / self.record_duration)
        } else {
            None
        }
    }

    /// Total recording duration in seconds (0 when the record count is unknown)
    pub fn duration_seconds(&self) -> f64 {
        if self.data_records > 0 {
            self.data_records as f64 * self.record_duration
        } else {
            0.0
        }
    }
}

fn parse_signals(header: &[u8], count: usize) -> Result<Vec<EdfSignal>, SignalError> {
    // Byte offset of each field block, in units of `count`
    let field = |block_offset: usize, width: usize, i: usize| {
        let start = count * block_offset + i * width;
        ascii_field(&header[start..start + width])
    };

    (0..count)
        .map(|i| {
            let samples = field(216, 8, i);
            let samples_per_record = samples.parse::<u64>().map_err(|_| {
                SignalError::InvalidHeader(format!(
                    "signal {}: invalid samples per record '{}'",
                    i, samples
                ))
            })?;
            Ok(EdfSignal {
                label: field(0, 16, i),
                transducer: field(16, 80, i),
                physical_dimension: field(96, 8, i),
                prefiltering: field(136, 80, i),
                samples_per_record,
            })
        })
        .collect()
}

/// Start date `dd.mm.yy` and time `hh.mm.ss`; two-digit years 85-99 are 19xx
fn parse_start(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date_parts = split_three(date)?;
    let time_parts = split_three(time)?;

    let year = if date_parts[2] > 84 {
        1900 + date_parts[2]
    } else {
        2000 + date_parts[2]
    };
    let date = NaiveDate::from_ymd_opt(year as i32, date_parts[1], date_parts[0])?;
    let time = NaiveTime::from_hms_opt(time_parts[0], time_parts[1], time_parts[2])?;
    Some(NaiveDateTime::new(date, time))
}

fn split_three(value: &str) -> Option<[u32; 3]> {
    let mut parts = value.split('.').map(|p| p.parse::<u32>().ok());
    let result = [parts.next()??, parts.next()??, parts.next()??];
    if parts.next().is_some() {
        return None;
    }
    Some(result)
}

fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

fn parse_int(bytes: &[u8], name: &str) -> Result<i64, SignalError> {
    let text = ascii_field(bytes);
    text.parse::<i64>()
        .map_err(|_| SignalError::InvalidHeader(format!("invalid {} '{}'", name, text)))
}

fn parse_float(bytes: &[u8], name: &str) -> Result<f64, SignalError> {
    let text = ascii_field(bytes);
    text.parse::<f64>()
        .map_err(|_| SignalError::InvalidHeader(format!("invalid {} '{}'", name, text)))
}

/// Header bytes for a minimal file, used by tests in this crate and downstream
#[doc(hidden)]
pub mod testing {
    /// Build a header with the given signals, each `(label, samples_per_record)`
    pub fn header_bytes(signals: &[(&str, u64)], data_records: i64, record_duration: f64) -> Vec<u8> {
        let n = signals.len();
        let mut out = Vec::with_capacity((n + 1) * 256);

        push_field(&mut out, "0", 8);
        push_field(&mut out, "X X X X", 80);
        push_field(&mut out, "Startdate X X X X", 80);
        push_field(&mut out, "14.03.23", 8);
        push_field(&mut out, "09.30.05", 8);
        push_field(&mut out, &((n + 1) * 256).to_string(), 8);
        push_field(&mut out, "EDF+C", 44);
        push_field(&mut out, &data_records.to_string(), 8);
        push_field(&mut out, &record_duration.to_string(), 8);
        push_field(&mut out, &n.to_string(), 4);

        let per_signal: [(usize, fn(&str, u64) -> String); 10] = [
            (16, |label, _| label.to_string()),
            (80, |_, _| String::new()),
            (8, |label, _| if label == "EDF Annotations" { String::new() } else { "uV".to_string() }),
            (8, |_, _| "-3200".to_string()),
            (8, |_, _| "3200".to_string()),
            (8, |_, _| "-32768".to_string()),
            (8, |_, _| "32767".to_string()),
            (80, |_, _| String::new()),
            (8, |_, samples| samples.to_string()),
            (32, |_, _| String::new()),
        ];
        for (width, value) in per_signal {
            for (label, samples) in signals {
                push_field(&mut out, &value(label, *samples), width);
            }
        }
        out
    }

    fn push_field(out: &mut Vec<u8>, value: &str, width: usize) {
        let mut bytes = value.as_bytes().to_vec();
        bytes.resize(width, b' ');
        out.extend_from_slice(&bytes[..width]);
    }
}

#[cfg(test)]
mod tests {
    use super::testing::header_bytes;
    use super::*;

    #[test]
    fn test_parse_signals_and_frequency() {
        let bytes = header_bytes(
            &[("Fp1", 256), ("Cz", 256), ("EKG1", 256), ("EDF Annotations", 60)],
            1800,
            1.0,
        );
        let header = EdfHeader::parse(bytes.as_slice()).unwrap();

        assert!(header.is_edf_plus);
        assert_eq!(header.signals.len(), 4);
        let labels: Vec<&str> = header.data_signals().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Fp1", "Cz", "EKG1"]);
        assert_eq!(header.signals[0].physical_dimension, "uV");
        assert_eq!(header.sampling_frequency(&header.signals[0]), Some(256.0));
        assert_eq!(header.duration_seconds(), 1800.0);
    }

    #[test]
    fn test_start_date_century() {
        let bytes = header_bytes(&[("Cz", 200)], 10, 0.5);
        let header = EdfHeader::parse(bytes.as_slice()).unwrap();
        let start = header.start.unwrap();
        assert_eq!(start.to_string(), "2023-03-14 09:30:05");
        assert_eq!(header.sampling_frequency(&header.signals[0]), Some(400.0));

        assert_eq!(
            parse_start("01.02.99", "00.00.00").unwrap().to_string(),
            "1999-02-01 00:00:00"
        );
        assert!(parse_start("32.01.20", "00.00.00").is_none());
        assert!(parse_start("1.2", "00.00.00").is_none());
    }

    #[test]
    fn test_unknown_record_count_has_zero_duration() {
        let bytes = header_bytes(&[("Cz", 200)], -1, 1.0);
        let header = EdfHeader::parse(bytes.as_slice()).unwrap();
        assert_eq!(header.duration_seconds(), 0.0);
    }

    #[test]
    fn test_rejects_truncated_and_garbage() {
        assert!(matches!(
            EdfHeader::parse(&b"0       short"[..]),
            Err(SignalError::Io(_))
        ));

        let mut bytes = header_bytes(&[("Cz", 200)], 10, 1.0);
        bytes[0] = b'X';
        assert!(matches!(
            EdfHeader::parse(bytes.as_slice()),
            Err(SignalError::InvalidHeader(_))
        ));

        // Header declares two signals but carries one signal block
        let mut bytes = header_bytes(&[("Cz", 200)], 10, 1.0);
        bytes[252..256].copy_from_slice(b"2   ");
        assert!(matches!(
            EdfHeader::parse(bytes.as_slice()),
            Err(SignalError::InvalidHeader(_))
        ));
    }
}
