//! Project manifest walk.

use std::path::Path;

use tracing::{debug, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::core::manifest::Manifest;
use crate::io::config::ManifestConfig;

/// Walk `root` and collect every non-ignored file as a relative `/` path.
///
/// Directories whose name is in `ignore_dirs` are pruned wherever they
/// appear; files whose name is in `ignore_files` are dropped. Unreadable
/// entries are skipped, so this never fails.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn build_manifest(root: &Path, config: &ManifestConfig) -> Manifest {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_ignored_dir(entry, config));

    let mut paths = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(err = %err, "skipping unreadable manifest entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if config.ignore_files.iter().any(|ignored| *ignored == name) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let joined = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        paths.push(joined);
    }

    let manifest = Manifest::from_paths(paths);
    debug!(files = manifest.len(), "built manifest");
    manifest
}

fn is_ignored_dir(entry: &DirEntry, config: &ManifestConfig) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    config.ignore_dirs.iter().any(|ignored| *ignored == name)
}
