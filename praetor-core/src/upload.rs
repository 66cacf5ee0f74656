// Uploaded file handles

use crate::error::{Error, Result};
use crate::logging::debug;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Upload outcome, with the numeric codes clients already know
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    Ok,
    /// The part exceeded `MultipartLimits::max_file_size`
    SizeExceeded,
    /// The part named a field but carried no file
    NoFile,
    /// The temp file could not be written
    CantWrite,
}

impl UploadError {
    pub fn code(&self) -> u8 {
        match self {
            UploadError::Ok => 0,
            UploadError::SizeExceeded => 1,
            UploadError::NoFile => 4,
            UploadError::CantWrite => 7,
        }
    }
}

enum Storage {
    /// Removed from disk when dropped
    Temporary(TempPath),
    Persisted(PathBuf),
    Empty,
}

/// A file received with the request.
///
/// Until [`UploadedFile::move_to`] succeeds the bytes live in a temporary
/// file that is deleted together with the handle.
pub struct UploadedFile {
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub error_code: UploadError,
    storage: Storage,
}

impl UploadedFile {
    pub(crate) fn temporary(
        original_name: String,
        mime_type: String,
        size_bytes: u64,
        path: TempPath,
    ) -> Self {
        Self {
            original_name,
            mime_type,
            size_bytes,
            error_code: UploadError::Ok,
            storage: Storage::Temporary(path),
        }
    }

    /// A file entry that carries no bytes, only an error code
    pub fn failed(original_name: String, mime_type: String, error_code: UploadError) -> Self {
        Self {
            original_name,
            mime_type,
            size_bytes: 0,
            error_code,
            storage: Storage::Empty,
        }
    }

    /// Wrap a file that already exists on disk. It is not deleted on drop.
    pub fn from_path(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let size_bytes = fs::metadata(&path)?.len();
        Ok(Self {
            original_name: file_name(&path),
            mime_type: mime_type.into(),
            size_bytes,
            error_code: UploadError::Ok,
            storage: Storage::Persisted(path),
        })
    }

    /// Where the bytes currently live
    pub fn storage_path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::Temporary(path) => Some(&**path),
            Storage::Persisted(path) => Some(path.as_path()),
            Storage::Empty => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_code == UploadError::Ok
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.storage, Storage::Temporary(_))
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.original_name)
            .extension()
            .and_then(|ext| ext.to_str())
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Move the file to `destination`.
    ///
    /// On success `storage_path` points at the destination, `original_name`
    /// becomes its file name, and the file is no longer removed on drop.
    /// On failure the handle is left untouched.
    pub fn move_to(&mut self, destination: impl AsRef<Path>) -> Result<()> {
        let destination = destination.as_ref();

        match std::mem::replace(&mut self.storage, Storage::Empty) {
            Storage::Temporary(path) => match path.persist(destination) {
                Ok(()) => {}
                Err(err) => {
                    // Rename fails across filesystems, copy instead. The temp
                    // path still owns the source and removes it once dropped.
                    let path = err.path;
                    if let Err(e) = fs::copy(&path, destination) {
                        self.storage = Storage::Temporary(path);
                        return Err(e.into());
                    }
                }
            },
            Storage::Persisted(path) => {
                if fs::rename(&path, destination).is_err() {
                    if let Err(e) = fs::copy(&path, destination).and_then(|_| fs::remove_file(&path))
                    {
                        self.storage = Storage::Persisted(path);
                        return Err(e.into());
                    }
                }
            }
            Storage::Empty => {
                return Err(Error::Internal(format!(
                    "Upload '{}' has no stored content to move",
                    self.original_name
                )));
            }
        }

        debug!(destination = %destination.display(), "Uploaded file moved");
        self.storage = Storage::Persisted(destination.to_path_buf());
        self.original_name = file_name(destination);
        Ok(())
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("original_name", &self.original_name)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.size_bytes)
            .field("error_code", &self.error_code)
            .field("storage_path", &self.storage_path())
            .finish()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_upload(dir: &Path, content: &[u8]) -> UploadedFile {
        let mut file = tempfile::NamedTempFile::new_in(dir).unwrap();
        file.write_all(content).unwrap();
        UploadedFile::temporary(
            "report.pdf".into(),
            "application/pdf".into(),
            content.len() as u64,
            file.into_temp_path(),
        )
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(UploadError::Ok.code(), 0);
        assert_eq!(UploadError::SizeExceeded.code(), 1);
        assert_eq!(UploadError::NoFile.code(), 4);
        assert_eq!(UploadError::CantWrite.code(), 7);
    }

    #[test]
    fn test_move_to_updates_path_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut upload = temp_upload(dir.path(), b"0123456789");
        let destination = dir.path().join("stored.pdf");

        upload.move_to(&destination).unwrap();

        assert_eq!(upload.storage_path(), Some(destination.as_path()));
        assert_eq!(upload.original_name, "stored.pdf");
        assert!(!upload.is_temporary());

        drop(upload);
        assert_eq!(fs::read(&destination).unwrap(), b"0123456789");
    }

    #[test]
    fn test_unmoved_upload_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let upload = temp_upload(dir.path(), b"abc");
        let path = upload.storage_path().unwrap().to_path_buf();

        assert!(path.exists());
        drop(upload);
        assert!(!path.exists());
    }

    #[test]
    fn test_move_failure_leaves_handle_intact() {
        let dir = tempfile::tempdir().unwrap();
        let mut upload = temp_upload(dir.path(), b"abc");
        let before = upload.storage_path().unwrap().to_path_buf();

        let result = upload.move_to(dir.path().join("missing").join("x.pdf"));

        assert!(result.is_err());
        assert_eq!(upload.storage_path(), Some(before.as_path()));
        assert_eq!(upload.original_name, "report.pdf");
    }

    #[test]
    fn test_failed_upload_has_no_storage() {
        let mut upload = UploadedFile::failed(
            "huge.bin".into(),
            "application/octet-stream".into(),
            UploadError::SizeExceeded,
        );
        assert!(!upload.is_ok());
        assert!(upload.storage_path().is_none());
        assert!(upload.move_to("/tmp/never").is_err());
    }

    #[test]
    fn test_file_helpers() {
        let upload = UploadedFile::failed("photo.png".into(), "image/png".into(), UploadError::Ok);
        assert_eq!(upload.extension(), Some("png"));
        assert!(upload.is_image());
    }
}
