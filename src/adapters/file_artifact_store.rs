//! Filesystem artifact store.
//!
//! Layout under the root directory, one pair per split:
//! `{stem}.pipeline.json` and `{stem}.weights.bin`, where `stem` comes from
//! [`ArtifactKey::stem`]. Writes go to a temporary sibling first and are
//! renamed into place so a reader never sees a half-written artifact.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::error::WfsimError;
use crate::domain::feature::PipelineArtifact;
use crate::ports::artifact_port::{ArtifactKey, ArtifactStore};

pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, WfsimError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pipeline_path(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(format!("{}.pipeline.json", key.stem()))
    }

    pub fn weights_path(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(format!("{}.weights.bin", key.stem()))
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WfsimError> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl ArtifactStore for FileArtifactStore {
    fn save_pipeline(
        &self,
        key: &ArtifactKey,
        artifact: &PipelineArtifact,
    ) -> Result<String, WfsimError> {
        let path = self.pipeline_path(key);
        Self::write_atomic(&path, artifact.to_json()?.as_bytes())?;
        debug!(key = %key, path = %path.display(), "wrote pipeline artifact");
        Ok(path.display().to_string())
    }

    fn load_pipeline(&self, key: &ArtifactKey) -> Result<PipelineArtifact, WfsimError> {
        let text = fs::read_to_string(self.pipeline_path(key))?;
        PipelineArtifact::from_json(&text)
    }

    fn save_weights(&self, key: &ArtifactKey, blob: &[u8]) -> Result<String, WfsimError> {
        let path = self.weights_path(key);
        Self::write_atomic(&path, blob)?;
        debug!(key = %key, bytes = blob.len(), "wrote policy weights");
        Ok(path.display().to_string())
    }

    fn load_weights(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>, WfsimError> {
        match fs::read(self.weights_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
