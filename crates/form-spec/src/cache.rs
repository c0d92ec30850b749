use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::spec::FormSchema;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("form cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode form cache: {0}")]
    Encode(#[source] serde_cbor::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    forms: Vec<FormSchema>,
}

/// Local copy of recently generated forms.
///
/// Loaded once, mutated in memory and written back with [`FormCache::save`].
/// An unreadable snapshot is discarded rather than treated as fatal since the
/// store remains the source of truth.
#[derive(Debug)]
pub struct FormCache {
    path: PathBuf,
    forms: Vec<FormSchema>,
    dirty: bool,
}

impl FormCache {
    pub const FILE_NAME: &'static str = "forms.cache";

    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let forms = match fs::read(&path) {
            Ok(bytes) => match serde_cbor::from_slice::<Snapshot>(&bytes) {
                Ok(snapshot) => snapshot.forms,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "discarding unreadable form cache");
                    Vec::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        debug!(path = %path.display(), forms = forms.len(), "loaded form cache");
        Ok(Self {
            path,
            forms,
            dirty: false,
        })
    }

    /// Cache at `<dir>/forms.cache`.
    pub fn load_in_dir(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        Self::load(dir.as_ref().join(Self::FILE_NAME))
    }

    pub fn get(&self, id: &str) -> Option<&FormSchema> {
        self.forms.iter().find(|form| form.id == id)
    }

    pub fn forms(&self) -> &[FormSchema] {
        &self.forms
    }

    /// Adds the form, replacing any cached copy with the same id.
    pub fn insert(&mut self, form: FormSchema) {
        match self.forms.iter_mut().find(|cached| cached.id == form.id) {
            Some(cached) => *cached = form,
            None => self.forms.push(form),
        }
        self.dirty = true;
    }

    pub fn remove(&mut self, id: &str) -> Option<FormSchema> {
        let index = self.forms.iter().position(|form| form.id == id)?;
        self.dirty = true;
        Some(self.forms.remove(index))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes the snapshot if anything changed since load or the last save.
    pub fn save(&mut self) -> Result<(), CacheError> {
        if !self.dirty {
            return Ok(());
        }
        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let snapshot = Snapshot {
            forms: self.forms.clone(),
        };
        let bytes = serde_cbor::to_vec(&snapshot).map_err(CacheError::Encode)?;
        fs::write(&self.path, bytes).map_err(io_err)?;
        self.dirty = false;
        debug!(path = %self.path.display(), forms = self.forms.len(), "saved form cache");
        Ok(())
    }
}
