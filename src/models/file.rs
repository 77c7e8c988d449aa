//! Represents a file picked for upload.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::fs;

/// Where the bytes of a [`SelectedFile`] live. Cloning is cheap in both cases.
#[derive(Clone, Debug)]
pub enum FileSource {
    /// Read lazily from disk when the upload starts.
    Disk(PathBuf),
    /// Already in memory (e.g. handed over by a UI layer).
    Memory(Bytes),
}

/// Broad imaging format, derived from the file name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Dicom,
    Nifti,
    Unknown,
}

impl FileKind {
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.ends_with(".dcm") {
            FileKind::Dicom
        } else if lower.ends_with(".nii") || lower.ends_with(".nii.gz") {
            FileKind::Nifti
        } else {
            FileKind::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Dicom => "DICOM",
            FileKind::Nifti => "NIFTI",
            FileKind::Unknown => "UNKNOWN",
        }
    }
}

/// A candidate or selected file.
///
/// Two files are considered the same selection entry when both `name` and
/// `size` match.
#[derive(Clone, Debug, Serialize)]
pub struct SelectedFile {
    /// File name as shown to the user (no directory part).
    pub name: String,

    /// Size in bytes.
    pub size: u64,

    /// Last modification time reported by the source.
    pub last_modified: DateTime<Utc>,

    /// Handle to the content; never copied by the pipeline.
    #[serde(skip)]
    pub source: FileSource,
}

impl SelectedFile {
    pub fn new(
        name: impl Into<String>,
        size: u64,
        last_modified: DateTime<Utc>,
        source: FileSource,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified,
            source,
        }
    }

    /// Build a file entry from disk metadata. The content is not read.
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let meta = fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let last_modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Self::new(
            name,
            meta.len(),
            last_modified,
            FileSource::Disk(path.to_path_buf()),
        ))
    }

    /// Wrap in-memory content, stamped with the current time.
    pub fn from_bytes(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        Self::new(
            name,
            content.len() as u64,
            Utc::now(),
            FileSource::Memory(content),
        )
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from_name(&self.name)
    }

    /// Selection identity: same name and same size.
    pub fn same_entry(&self, other: &SelectedFile) -> bool {
        self.name == other.name && self.size == other.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_kind_from_name() {
        assert_eq!(FileKind::from_name("CT_001.DCM"), FileKind::Dicom);
        assert_eq!(FileKind::from_name("brain.nii"), FileKind::Nifti);
        assert_eq!(FileKind::from_name("brain.NII.GZ"), FileKind::Nifti);
        assert_eq!(FileKind::from_name("notes.gz"), FileKind::Unknown);
    }

    #[test]
    fn test_same_entry_needs_name_and_size() {
        let a = SelectedFile::from_bytes("scan1.dcm", vec![1u8; 10]);
        let b = SelectedFile::from_bytes("scan1.dcm", vec![2u8; 10]);
        let c = SelectedFile::from_bytes("scan1.dcm", vec![1u8; 11]);
        assert!(a.same_entry(&b));
        assert!(!a.same_entry(&c));
    }

    #[tokio::test]
    async fn test_from_path_reads_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.dcm");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[0u8; 128]).unwrap();

        let selected = SelectedFile::from_path(&path).await.unwrap();
        assert_eq!(selected.name, "series.dcm");
        assert_eq!(selected.size, 128);
        assert!(matches!(selected.source, FileSource::Disk(ref p) if p == &path));

        let err = SelectedFile::from_path(dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
