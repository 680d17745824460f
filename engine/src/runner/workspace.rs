//! Working area for generated artifacts.
//!
//! One flat directory, one file per execution attempt. File names carry a v4
//! UUID and are opened with `create_new`, so an existing file is never
//! overwritten. Nothing here deletes files: artifacts are kept for post-hoc
//! inspection.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::RunnerFault;

/// Writes scripts into the working area under unique names.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl ArtifactStore {
    pub fn new(dir: impl AsRef<Path>, prefix: &str, extension: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            prefix: prefix.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A fresh, collision-resistant path inside the working area.
    pub fn fresh_path(&self) -> PathBuf {
        let name = if self.extension.is_empty() {
            format!("{}{}", self.prefix, Uuid::new_v4())
        } else {
            format!("{}{}.{}", self.prefix, Uuid::new_v4(), self.extension)
        };
        self.dir.join(name)
    }

    /// Persist `script` to a new file, creating the working area if needed.
    pub async fn persist(&self, script: &str) -> Result<PathBuf, RunnerFault> {
        if !self.dir.exists() {
            tokio::fs::create_dir_all(&self.dir)
                .await
                .map_err(|source| RunnerFault::WorkArea {
                    path: self.dir.clone(),
                    source,
                })?;
            tracing::info!(dir = %self.dir.display(), "created working area");
        }

        let path = self.fresh_path();
        let write = async {
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await?;
            file.write_all(script.as_bytes()).await?;
            file.flush().await
        };
        write.await.map_err(|source| RunnerFault::WriteArtifact {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), bytes = script.len(), "artifact saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persist_creates_dir_and_unique_files() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(root.path().join("tests"), "test_script_", "py");

        let first = store.persist("print(1)").await.unwrap();
        let second = store.persist("print(1)").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "print(1)");
        let name = first.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("test_script_") && name.ends_with(".py"), "{name}");
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn persist_reports_unusable_work_area() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("occupied");
        std::fs::write(&blocker, "file, not a dir").unwrap();

        let store = ArtifactStore::new(blocker.join("tests"), "s_", "py");
        let err = store.persist("x").await.unwrap_err();
        assert!(matches!(err, RunnerFault::WorkArea { .. }), "{err}");
    }
}
