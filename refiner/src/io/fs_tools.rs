//! Filesystem tool executors, confined to the project root.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

/// Typed precondition and I/O failures of the file tools.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("file already exists: {0}")]
    AlreadyExists(String),
    #[error("cannot create via modify: {0} does not exist")]
    CannotCreateViaModify(String),
    #[error("path escapes the project root: {0}")]
    OutsideRoot(String),
}

/// File tools rooted at the project directory.
#[derive(Debug, Clone)]
pub struct ProjectFs {
    root: PathBuf,
}

impl ProjectFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a project-relative path, rejecting absolute paths and `..`.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, ToolError> {
        let candidate = Path::new(relative);
        let escapes = candidate.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if relative.trim().is_empty() || escapes {
            return Err(ToolError::OutsideRoot(relative.to_string()));
        }
        Ok(self.root.join(candidate))
    }

    /// Read a file as text, trying UTF-8, BOM-marked UTF-16, then Latin-1.
    #[instrument(skip(self))]
    pub fn read_file(&self, relative: &str) -> Result<String, ToolError> {
        let path = self.resolve(relative)?;
        let bytes = fs::read(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ToolError::NotFound(relative.to_string()),
            _ => ToolError::Read {
                path: relative.to_string(),
                reason: err.to_string(),
            },
        })?;
        debug!(bytes = bytes.len(), "read file");
        decode_text(&bytes).ok_or_else(|| ToolError::Read {
            path: relative.to_string(),
            reason: "no supported text encoding decodes the file".to_string(),
        })
    }

    /// Write a file, creating parent directories and overwriting.
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    pub fn write_file(&self, relative: &str, content: &str) -> Result<(), ToolError> {
        let path = self.resolve(relative)?;
        let write_err = |source| ToolError::Write {
            path: relative.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&path, content).map_err(write_err)
    }

    /// Create a new file; fails if anything already exists at the path.
    ///
    /// The create is exclusive, so an existing entry of any kind (including a
    /// dangling symlink) is refused rather than written through.
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    pub fn create_file(&self, relative: &str, content: &str) -> Result<(), ToolError> {
        let path = self.resolve(relative)?;
        let write_err = |source| ToolError::Write {
            path: relative.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| match err.kind() {
                io::ErrorKind::AlreadyExists => ToolError::AlreadyExists(relative.to_string()),
                _ => write_err(err),
            })?;
        file.write_all(content.as_bytes()).map_err(write_err)
    }

    /// Precondition of `modify_file`: the target must already be a file.
    pub fn require_existing(&self, relative: &str) -> Result<(), ToolError> {
        let path = self.resolve(relative)?;
        if path.is_file() {
            Ok(())
        } else {
            Err(ToolError::CannotCreateViaModify(relative.to_string()))
        }
    }
}

fn decode_text(bytes: &[u8]) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(text.strip_prefix('\u{feff}').unwrap_or(text).to_string());
    }
    if let Some(text) = decode_utf16_with_bom(bytes) {
        return Some(text);
    }
    // Latin-1 maps every byte, so only binary content is refused.
    if bytes.contains(&0) {
        return None;
    }
    Some(bytes.iter().map(|&byte| char::from(byte)).collect())
}

fn decode_utf16_with_bom(bytes: &[u8]) -> Option<String> {
    let (body, little_endian) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (rest, true),
        [0xFE, 0xFF, rest @ ..] => (rest, false),
        _ => return None,
    };
    if body.len() % 2 != 0 {
        return None;
    }
    let units = body.chunks_exact(2).map(|pair| {
        if little_endian {
            u16::from_le_bytes([pair[0], pair[1]])
        } else {
            u16::from_be_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> (tempfile::TempDir, ProjectFs) {
        let temp = tempfile::tempdir().expect("tempdir");
        let fs = ProjectFs::new(temp.path());
        (temp, fs)
    }

    #[test]
    fn write_then_read_with_nested_dirs() {
        let (_temp, tools) = project();
        tools.write_file("a/b/c.txt", "hello").expect("write");
        assert_eq!(tools.read_file("a/b/c.txt").expect("read"), "hello");
        tools.write_file("a/b/c.txt", "again").expect("overwrite");
        assert_eq!(tools.read_file("a/b/c.txt").expect("read"), "again");
    }

    #[test]
    fn read_missing_is_not_found() {
        let (_temp, tools) = project();
        assert!(matches!(tools.read_file("nope.txt"), Err(ToolError::NotFound(_))));
    }

    #[test]
    fn read_falls_back_through_encodings() {
        let (temp, tools) = project();
        fs::write(temp.path().join("latin1.txt"), [b'c', b'a', b'f', 0xE9]).expect("write");
        assert_eq!(tools.read_file("latin1.txt").expect("read"), "café");

        let mut utf16 = vec![0xFF, 0xFE];
        for unit in "hé".encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        fs::write(temp.path().join("utf16.txt"), utf16).expect("write");
        assert_eq!(tools.read_file("utf16.txt").expect("read"), "hé");

        fs::write(temp.path().join("bom.txt"), "\u{feff}text").expect("write");
        assert_eq!(tools.read_file("bom.txt").expect("read"), "text");

        fs::write(temp.path().join("binary.bin"), [0x00, 0xFF, 0x80]).expect("write");
        assert!(matches!(tools.read_file("binary.bin"), Err(ToolError::Read { .. })));
    }

    #[test]
    fn create_refuses_existing_file() {
        let (_temp, tools) = project();
        tools.create_file("docs/new.md", "# new").expect("create");
        let err = tools.create_file("docs/new.md", "again").unwrap_err();
        assert!(matches!(err, ToolError::AlreadyExists(_)));
        assert_eq!(err.to_string(), "file already exists: docs/new.md");
        assert_eq!(tools.read_file("docs/new.md").expect("read"), "# new");
    }

    #[cfg(unix)]
    #[test]
    fn create_refuses_dangling_symlink() {
        let (temp, tools) = project();
        let outside = tempfile::tempdir().expect("outside tempdir");
        let target = outside.path().join("escaped.txt");
        std::os::unix::fs::symlink(&target, temp.path().join("link.txt")).expect("symlink");

        let err = tools.create_file("link.txt", "payload").unwrap_err();
        assert!(matches!(err, ToolError::AlreadyExists(_)));
        assert!(!target.exists());
    }

    #[test]
    fn require_existing_reports_cannot_create_via_modify() {
        let (_temp, tools) = project();
        let err = tools.require_existing("src/missing.rs").unwrap_err();
        assert!(err.to_string().contains("cannot create via modify"));
    }

    #[test]
    fn paths_outside_root_are_rejected() {
        let (_temp, tools) = project();
        assert!(matches!(tools.resolve("../x"), Err(ToolError::OutsideRoot(_))));
        assert!(matches!(tools.resolve("/etc/passwd"), Err(ToolError::OutsideRoot(_))));
        assert!(matches!(tools.resolve(""), Err(ToolError::OutsideRoot(_))));
    }
}
