use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::models::audio::AudioBuffer;
use crate::models::separation::StemName;
use crate::services::codec::{self, CodecError};

/// Extension of every stem file written by the store.
pub const STEM_EXTENSION: &str = "wav";

/// Filesystem store for separated stems.
///
/// Layout: `<root>/<job_id>/<stem>.wav`. Each job writes into its own
/// subdirectory so concurrent jobs never collide. Stems are written to a
/// hidden staging directory and only appear under `<job_id>/` once the whole
/// set is published, so a job that fails halfway leaves nothing readable.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    /// Where stems of an unpublished job are written.
    pub fn staging_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join(format!(".{job_id}.partial"))
    }

    /// Path of a stem relative to the store root.
    pub fn relative_path(job_id: Uuid, stem: StemName) -> String {
        format!("{job_id}/{stem}.{STEM_EXTENSION}")
    }

    /// Encode and stage one stem, returning the relative path it will have
    /// once published.
    pub fn write(
        &self,
        job_id: Uuid,
        stem: StemName,
        audio: &AudioBuffer,
    ) -> Result<String, StorageError> {
        let dir = self.staging_dir(job_id);
        fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{stem}.{STEM_EXTENSION}"));
        codec::write_wav(&path, audio)?;

        tracing::debug!(job_id = %job_id, stem = %stem, path = %path.display(), "Stem staged");
        Ok(Self::relative_path(job_id, stem))
    }

    /// Make every staged stem of a job readable in one rename.
    pub fn publish(&self, job_id: Uuid) -> Result<(), StorageError> {
        let target = self.job_dir(job_id);
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(self.staging_dir(job_id), &target)?;

        tracing::debug!(job_id = %job_id, path = %target.display(), "Stems published");
        Ok(())
    }

    /// Remove stems staged by a job that will never be published.
    pub fn discard(&self, job_id: Uuid) -> Result<(), StorageError> {
        match fs::remove_dir_all(self.staging_dir(job_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Resolve an existing stem file.
    ///
    /// Names outside the known stem set are never joined onto the root.
    pub fn locate(&self, job_id: Uuid, stem_name: &str) -> Result<PathBuf, StorageError> {
        let not_found = || StorageError::NotFound {
            job_id,
            stem: stem_name.to_string(),
        };

        let stem: StemName = stem_name.parse().map_err(|_| not_found())?;
        let path = self
            .job_dir(job_id)
            .join(format!("{stem}.{STEM_EXTENSION}"));

        if path.is_file() {
            Ok(path)
        } else {
            Err(not_found())
        }
    }

    /// Read the encoded bytes of a stem.
    pub fn read(&self, job_id: Uuid, stem_name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.locate(job_id, stem_name)?;
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound {
                job_id,
                stem: stem_name.to_string(),
            },
            _ => StorageError::Io(e),
        })
    }

    /// Check the root exists (creating it if needed) and accepts writes.
    pub fn check_writable(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        tempfile::tempfile_in(&self.root)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Stem '{stem}' not found for job {job_id}")]
    NotFound { job_id: Uuid, stem: String },

    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to encode stem: {0}")]
    Encode(#[from] CodecError),
}
