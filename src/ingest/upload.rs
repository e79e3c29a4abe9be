//! Uploaded files awaiting import.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A file handed to the import pipeline.
///
/// Temporary uploads are removed when the value is dropped, so the file is
/// gone after the import finishes whether it succeeded or not.
#[derive(Debug)]
pub struct Upload {
    path: PathBuf,
    file_name: String,
    mime_type: Option<String>,
    temporary: bool,
}

impl Upload {
    /// A file written for this import only; deleted on drop.
    pub fn temporary(
        path: impl Into<PathBuf>,
        file_name: impl Into<String>,
        mime_type: Option<String>,
    ) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
            mime_type,
            temporary: true,
        }
    }

    /// A file the caller owns, e.g. a path given on the command line. Never deleted.
    pub fn existing(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        Self {
            path,
            file_name,
            mime_type: None,
            temporary: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Original file name as supplied by the user.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }
}

impl Drop for Upload {
    fn drop(&mut self) {
        if !self.temporary {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed upload {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove upload {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_upload_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, b"data").unwrap();

        drop(Upload::temporary(&path, "Report.pdf", Some("application/pdf".to_string())));
        assert!(!path.exists());
    }

    #[test]
    fn test_existing_file_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, b"# notes").unwrap();

        let upload = Upload::existing(&path);
        assert_eq!(upload.file_name(), "notes.md");
        drop(upload);
        assert!(path.exists());
    }
}
