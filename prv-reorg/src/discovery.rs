//! Input directory discovery
//!
//! Lists the flat input directory (one level, sorted by name), keeps regular
//! `.edf`/`.xml` files and parses each name. Unparseable names are skipped
//! with a warning and returned so the caller can report them.

use crate::error::{ParseError, ReorgError, Result};
use crate::identity::FileIdentity;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Outcome of listing the input directory
#[derive(Debug, Default)]
pub struct Discovery {
    /// Parsed identities, sorted by source file name
    pub identities: Vec<FileIdentity>,
    /// Names that looked like data files but did not parse
    pub skipped: Vec<ParseError>,
}

/// List and parse the data files directly inside `input_dir`
pub fn discover(input_dir: &Path) -> Result<Discovery> {
    if !input_dir.is_dir() {
        return Err(ReorgError::InputNotFound(input_dir.to_path_buf()));
    }

    let mut discovery = Discovery::default();

    for entry in WalkDir::new(input_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            warn!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };
        if !(name.ends_with(".edf") || name.ends_with(".xml")) {
            debug!(file = name, "Ignoring non-data file");
            continue;
        }

        match FileIdentity::parse(name) {
            Ok(identity) => discovery.identities.push(identity),
            Err(e) => {
                warn!("{}", e);
                discovery.skipped.push(e);
            }
        }
    }

    debug!(
        parsed = discovery.identities.len(),
        skipped = discovery.skipped.len(),
        "Input discovery complete"
    );

    Ok(discovery)
}
