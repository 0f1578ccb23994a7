//! In-memory project manifest.

use serde::Serialize;

/// Ordered, `/`-separated relative paths of every non-ignored project file.
///
/// Built fresh each iteration by [`crate::io::manifest::build_manifest`];
/// never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    paths: Vec<String>,
}

impl Manifest {
    /// Build from arbitrary paths; sorts and deduplicates.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        paths.sort();
        paths.dedup();
        Self { paths }
    }

    /// Whether `path` names a manifest entry, tolerating `./` and `\`.
    pub fn contains(&self, path: &str) -> bool {
        let normalized = normalize_path(path);
        self.paths.binary_search(&normalized).is_ok()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Pretty JSON array, as embedded in planner and auditor prompts.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.paths).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Normalize a plan-supplied path to manifest form.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    normalized
}
