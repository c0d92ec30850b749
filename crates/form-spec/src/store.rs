//! Persistence collaborator: forms and submissions behind a small trait.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::spec::{FormSchema, Submission};

/// Which record a lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Form,
    Submission,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Form => f.write_str("form"),
            RecordKind::Submission => f.write_str("submission"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: RecordKind, id: String },
    #[error("store I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("store file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode store: {0}")]
    Encode(#[source] serde_json::Error),
}

impl StoreError {
    pub fn form_not_found(id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind: RecordKind::Form,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Storage operations the catalog is written against.
pub trait FormStore {
    fn list_forms(&self) -> Result<Vec<FormSchema>, StoreError>;
    fn get_form(&self, id: &str) -> Result<Option<FormSchema>, StoreError>;
    /// Inserts the form, or replaces the stored form with the same id.
    fn save_form(&mut self, form: FormSchema) -> Result<(), StoreError>;
    /// Removes the form and every submission that references it.
    ///
    /// Returns whether a form with that id existed.
    fn delete_form(&mut self, id: &str) -> Result<bool, StoreError>;
    fn list_submissions(&self, form_id: &str) -> Result<Vec<Submission>, StoreError>;
    fn add_submission(&mut self, submission: Submission) -> Result<(), StoreError>;
}

/// Whole-store snapshot as kept on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub forms: Vec<FormSchema>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
}

impl Database {
    fn upsert_form(&mut self, form: FormSchema) {
        match self.forms.iter_mut().find(|existing| existing.id == form.id) {
            Some(existing) => *existing = form,
            None => self.forms.push(form),
        }
    }

    fn remove_form(&mut self, id: &str) -> bool {
        let before = self.forms.len();
        self.forms.retain(|form| form.id != id);
        let removed = self.forms.len() != before;
        self.submissions.retain(|submission| submission.form_id != id);
        removed
    }

    fn submissions_for(&self, form_id: &str) -> Vec<Submission> {
        self.submissions
            .iter()
            .filter(|submission| submission.form_id == form_id)
            .cloned()
            .collect()
    }
}

/// Store kept entirely in memory; used by tests and previews.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    db: Database,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FormStore for MemoryStore {
    fn list_forms(&self) -> Result<Vec<FormSchema>, StoreError> {
        Ok(self.db.forms.clone())
    }

    fn get_form(&self, id: &str) -> Result<Option<FormSchema>, StoreError> {
        Ok(self.db.forms.iter().find(|form| form.id == id).cloned())
    }

    fn save_form(&mut self, form: FormSchema) -> Result<(), StoreError> {
        self.db.upsert_form(form);
        Ok(())
    }

    fn delete_form(&mut self, id: &str) -> Result<bool, StoreError> {
        Ok(self.db.remove_form(id))
    }

    fn list_submissions(&self, form_id: &str) -> Result<Vec<Submission>, StoreError> {
        Ok(self.db.submissions_for(form_id))
    }

    fn add_submission(&mut self, submission: Submission) -> Result<(), StoreError> {
        self.db.submissions.push(submission);
        Ok(())
    }
}

/// Single JSON document holding every form and submission.
///
/// Each call re-reads the file so edits made by other processes are seen;
/// writes go through a sibling temp file and a rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub const FILE_NAME: &'static str = "db.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<dir>/db.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Database, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Database::default()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if contents.trim().is_empty() {
            return Ok(Database::default());
        }
        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, db: &Database) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = serde_json::to_string_pretty(db).map_err(StoreError::Encode)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!(path = %self.path.display(), forms = db.forms.len(), "wrote store");
        Ok(())
    }

    fn update<T>(&self, apply: impl FnOnce(&mut Database) -> T) -> Result<T, StoreError> {
        let mut db = self.read()?;
        let result = apply(&mut db);
        self.write(&db)?;
        Ok(result)
    }
}

impl FormStore for JsonFileStore {
    fn list_forms(&self) -> Result<Vec<FormSchema>, StoreError> {
        Ok(self.read()?.forms)
    }

    fn get_form(&self, id: &str) -> Result<Option<FormSchema>, StoreError> {
        Ok(self.read()?.forms.into_iter().find(|form| form.id == id))
    }

    fn save_form(&mut self, form: FormSchema) -> Result<(), StoreError> {
        self.update(|db| db.upsert_form(form))
    }

    fn delete_form(&mut self, id: &str) -> Result<bool, StoreError> {
        self.update(|db| db.remove_form(id))
    }

    fn list_submissions(&self, form_id: &str) -> Result<Vec<Submission>, StoreError> {
        Ok(self.read()?.submissions_for(form_id))
    }

    fn add_submission(&mut self, submission: Submission) -> Result<(), StoreError> {
        self.update(|db| db.submissions.push(submission))
    }
}
