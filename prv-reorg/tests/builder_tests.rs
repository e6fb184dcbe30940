//! Hierarchy builder integration tests over real temporary directories

use prv_reorg::{discover, AllowList, FileIdentity, HierarchyBuilder, ReorgError};
use std::collections::BTreeMap;
use std::fs::{self, File, FileTimes};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use walkdir::WalkDir;

fn write_inputs(input: &Path, names: &[&str]) {
    fs::create_dir_all(input).unwrap();
    for name in names {
        fs::write(input.join(name), format!("contents of {}", name)).unwrap();
    }
}

/// Relative path → file contents for every file under `root`
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            (
                e.path().strip_prefix(root).unwrap().to_path_buf(),
                fs::read(e.path()).unwrap(),
            )
        })
        .collect()
}

#[test]
fn test_reorganizes_signal_and_annotation() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    let output = temp_dir.path().join("output");
    write_inputs(
        &input,
        &[
            "PRV-001-4ZHY-15.edf",
            "PRV-001-4ZHY-15-annotations.xml",
            "PRV-002-OTHR-6.edf",
        ],
    );
    let allow: AllowList = ["4ZHY"].into_iter().collect();

    let discovery = discover(&input).unwrap();
    let report = HierarchyBuilder::new(&allow).build(&discovery.identities, &input, &output);

    assert!(report.is_success());
    assert_eq!(report.patients, vec!["4ZHY".to_string()]);
    assert_eq!(report.sessions, 1);
    assert_eq!(report.copied.len(), 2);
    assert!(report.excluded.contains("OTHR"));

    let eeg_dir = output.join("PRV-4ZHY/primary/sub-PRV-4ZHY/ses-visit-m15/eeg");
    assert_eq!(
        fs::read_to_string(eeg_dir.join("sub-PRV-4ZHY-15.edf")).unwrap(),
        "contents of PRV-001-4ZHY-15.edf"
    );
    assert_eq!(
        fs::read_to_string(eeg_dir.join("sub-PRV-4ZHY-15.xml")).unwrap(),
        "contents of PRV-001-4ZHY-15-annotations.xml"
    );
    assert!(!output.join("PRV-OTHR").exists());

    // Source tree untouched
    assert_eq!(snapshot(&input).len(), 3);
}

#[test]
fn test_second_run_produces_identical_tree() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    let output = temp_dir.path().join("output");
    write_inputs(
        &input,
        &[
            "PRV-001-4ZHY-3.edf",
            "PRV-001-4ZHY-15.edf",
            "PRV-001-4ZHY-15-annotations.xml",
            "PRV-001-AB12-6.edf",
        ],
    );
    let allow: AllowList = ["4ZHY", "AB12"].into_iter().collect();
    let builder = HierarchyBuilder::new(&allow);
    let identities = discover(&input).unwrap().identities;

    let first = builder.build(&identities, &input, &output);
    let after_first = snapshot(&output);
    let second = builder.build(&identities, &input, &output);
    let after_second = snapshot(&output);

    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(after_first.len(), 4);
    assert_eq!(after_first, after_second);
}

#[test]
fn test_missing_source_fails_only_that_file() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    let output = temp_dir.path().join("output");
    write_inputs(&input, &["PRV-001-4ZHY-15.edf"]);
    let allow: AllowList = ["4ZHY", "AB12"].into_iter().collect();

    let identities = vec![
        FileIdentity::parse("PRV-001-4ZHY-15.edf").unwrap(),
        FileIdentity::parse("PRV-001-AB12-6.edf").unwrap(),
    ];
    let report = HierarchyBuilder::new(&allow).build(&identities, &input, &output);

    assert_eq!(report.copied.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].source.ends_with("PRV-001-AB12-6.edf"));
    assert!(matches!(report.failures[0].error, ReorgError::Io { .. }));
    assert!(output
        .join("PRV-4ZHY/primary/sub-PRV-4ZHY/ses-visit-m15/eeg/sub-PRV-4ZHY-15.edf")
        .exists());
}

#[test]
fn test_variant_suffix_collision_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    let output = temp_dir.path().join("output");
    write_inputs(&input, &["PRV-001-4ZHY-15.edf", "PRV-001-4ZHY-15A.edf"]);
    let allow: AllowList = ["4ZHY"].into_iter().collect();

    let identities = discover(&input).unwrap().identities;
    let report = HierarchyBuilder::new(&allow).build(&identities, &input, &output);

    assert_eq!(report.copied.len(), 1);
    assert_eq!(report.failures.len(), 1);
    match &report.failures[0].error {
        ReorgError::DestinationConflict { first_source, .. } => {
            assert!(first_source.ends_with("PRV-001-4ZHY-15.edf"));
        }
        other => panic!("unexpected error: {}", other),
    }
    let copied = output.join("PRV-4ZHY/primary/sub-PRV-4ZHY/ses-visit-m15/eeg/sub-PRV-4ZHY-15.edf");
    assert_eq!(
        fs::read_to_string(copied).unwrap(),
        "contents of PRV-001-4ZHY-15.edf"
    );
}

#[test]
fn test_modification_time_preserved() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    let output = temp_dir.path().join("output");
    write_inputs(&input, &["PRV-001-4ZHY-15.edf"]);

    let recorded = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    File::options()
        .write(true)
        .open(input.join("PRV-001-4ZHY-15.edf"))
        .unwrap()
        .set_times(FileTimes::new().set_modified(recorded))
        .unwrap();

    let allow: AllowList = ["4ZHY"].into_iter().collect();
    let identities = discover(&input).unwrap().identities;
    let report = HierarchyBuilder::new(&allow).build(&identities, &input, &output);

    assert!(report.is_success());
    let modified = fs::metadata(&report.copied[0].destination)
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(modified, recorded);
}

#[test]
fn test_read_only_source_copied_twice() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    let output = temp_dir.path().join("output");
    write_inputs(&input, &["PRV-001-4ZHY-15.edf"]);
    let source = input.join("PRV-001-4ZHY-15.edf");
    let mut permissions = fs::metadata(&source).unwrap().permissions();
    permissions.set_readonly(true);
    fs::set_permissions(&source, permissions).unwrap();

    let allow: AllowList = ["4ZHY"].into_iter().collect();
    let identities = discover(&input).unwrap().identities;
    let builder = HierarchyBuilder::new(&allow);

    assert!(builder.build(&identities, &input, &output).is_success());
    let report = builder.build(&identities, &input, &output);
    assert!(report.is_success());
    assert!(fs::metadata(&report.copied[0].destination)
        .unwrap()
        .permissions()
        .readonly());
}
