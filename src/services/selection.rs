//! The set of validated files awaiting upload.

use crate::{
    errors::{SelectionError, SelectionResult, ValidationError},
    models::file::SelectedFile,
    services::validator::FileValidator,
};
use tracing::debug;

/// A file refused by the validator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedFile {
    pub name: String,
    pub error: ValidationError,
}

impl RejectedFile {
    /// `"<filename>: <reason>"`
    pub fn message(&self) -> String {
        format!("{}: {}", self.name, self.error)
    }
}

/// Outcome of one [`SelectionManager::add`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddReport {
    pub added: usize,
    /// Valid files dropped because an identical entry was already selected.
    pub duplicates: usize,
    pub rejected: Vec<RejectedFile>,
}

impl AddReport {
    pub fn messages(&self) -> impl Iterator<Item = String> + '_ {
        self.rejected.iter().map(RejectedFile::message)
    }
}

/// Ordered selection, unique by (name, size).
#[derive(Clone, Debug, Default)]
pub struct SelectionManager {
    validator: FileValidator,
    files: Vec<SelectedFile>,
}

impl SelectionManager {
    pub fn new(validator: FileValidator) -> Self {
        Self {
            validator,
            files: Vec::new(),
        }
    }

    /// Validate each candidate and append the valid, not-yet-selected ones.
    pub fn add(&mut self, candidates: impl IntoIterator<Item = SelectedFile>) -> AddReport {
        let mut report = AddReport::default();

        for file in candidates {
            if let Err(error) = self.validator.validate(&file) {
                debug!("rejected {}: {}", file.name, error);
                report.rejected.push(RejectedFile {
                    name: file.name,
                    error,
                });
                continue;
            }

            if self.files.iter().any(|existing| existing.same_entry(&file)) {
                report.duplicates += 1;
                continue;
            }

            self.files.push(file);
            report.added += 1;
        }

        report
    }

    /// Remove the file at `index`; later entries shift down by one.
    pub fn remove(&mut self, index: usize) -> SelectionResult<SelectedFile> {
        if index >= self.files.len() {
            return Err(SelectionError::OutOfRange {
                index,
                len: self.files.len(),
            });
        }
        Ok(self.files.remove(index))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn files(&self) -> &[SelectedFile] {
        &self.files
    }

    /// Owned copy for a batch; content handles are shared, not duplicated.
    pub fn snapshot(&self) -> Vec<SelectedFile> {
        self.files.clone()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::file::FileSource;
    use chrono::Utc;

    const MB: u64 = 1024 * 1024;

    fn file(name: &str, size: u64) -> SelectedFile {
        SelectedFile::new(name, size, Utc::now(), FileSource::Disk(name.into()))
    }

    fn names(selection: &SelectionManager) -> Vec<&str> {
        selection.files().iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_mixed_add() {
        let mut selection = SelectionManager::default();
        let report = selection.add(vec![
            file("scan1.dcm", 10 * MB),
            file("scan1.dcm", 10 * MB),
            file("brain.nii.gz", 2 * MB),
            file("huge.dcm", 600 * MB),
        ]);

        assert_eq!(names(&selection), vec!["scan1.dcm", "brain.nii.gz"]);
        assert_eq!(report.added, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].name, "huge.dcm");
        assert!(matches!(
            report.rejected[0].error,
            ValidationError::TooLarge { .. }
        ));
        assert_eq!(
            report.messages().collect::<Vec<_>>(),
            vec!["huge.dcm: File too large (600 MB). Maximum size is 500 MB"]
        );
    }

    #[test]
    fn test_duplicate_across_calls() {
        let mut selection = SelectionManager::default();
        selection.add(vec![file("scan1.dcm", 10)]);
        let report = selection.add(vec![file("scan1.dcm", 10)]);
        assert_eq!(selection.len(), 1);
        assert_eq!(report.duplicates, 1);

        // Same name, different size is a different entry.
        selection.add(vec![file("scan1.dcm", 11)]);
        assert_eq!(selection.len(), 2);
    }

    #[test]
    fn test_remove_shifts_positions() {
        let mut selection = SelectionManager::default();
        selection.add(vec![file("a.dcm", 1), file("b.dcm", 1), file("c.dcm", 1)]);

        let removed = selection.remove(0).unwrap();
        assert_eq!(removed.name, "a.dcm");
        assert_eq!(names(&selection), vec!["b.dcm", "c.dcm"]);

        assert_eq!(
            selection.remove(2).unwrap_err(),
            SelectionError::OutOfRange { index: 2, len: 2 }
        );
        assert_eq!(selection.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut selection = SelectionManager::default();
        selection.add(vec![file("a.dcm", 1), file("b.nii", 1)]);
        assert!(!selection.is_empty());
        selection.clear();
        assert!(selection.is_empty());
        assert_eq!(selection.len(), 0);
    }
}
