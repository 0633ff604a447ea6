//! Scoped per-run workspace directories.
//!
//! Every pipeline run owns exactly one freshly created directory and all of
//! its artifacts live inside it under fixed names. Download handlers address
//! artifacts by these names, so they must stay stable.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::WorkspaceConfig;
use crate::error::WorkspaceError;

/// Artifacts a run produces, each at a fixed name inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Artifact {
    InputVideo,
    ExtractedAudio,
    /// Subtitle file for a language code
    Subtitles(String),
    DubbedAudio,
    OutputVideo,
    /// Directory holding per-segment speech clips before they are mixed
    SpeechClips,
}

impl Artifact {
    pub fn file_name(&self, video_extension: &str, audio_extension: &str) -> String {
        match self {
            Self::InputVideo => format!("input_video.{}", video_extension),
            Self::ExtractedAudio => format!("extracted_audio.{}", audio_extension),
            Self::Subtitles(lang) => format!("subtitles_{}.srt", lang),
            Self::DubbedAudio => format!("dubbed_audio.{}", audio_extension),
            Self::OutputVideo => format!("output_dubbed_video.{}", video_extension),
            Self::SpeechClips => "dubbed_audio_clips".to_string(),
        }
    }
}

/// Result of a destroy request. Failures are diagnostics, never pipeline errors.
#[derive(Debug)]
pub enum DestroyOutcome {
    Removed,
    AlreadyGone,
    Failed(WorkspaceError),
}

enum Ownership {
    /// Removed automatically if the handle is dropped without an explicit destroy
    Scoped(TempDir),
    /// Survives the process; only an explicit destroy removes it
    Detached,
    Destroyed,
}

/// Handle to one run's workspace directory.
pub struct Workspace {
    path: PathBuf,
    ownership: Ownership,
    video_extension: String,
    audio_extension: String,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("path", &self.path)
            .field("live", &self.is_live())
            .finish()
    }
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory is still owned by this handle.
    pub fn is_live(&self) -> bool {
        !matches!(self.ownership, Ownership::Destroyed)
    }

    pub fn artifact_path(&self, artifact: &Artifact) -> PathBuf {
        self.path.join(artifact.file_name(&self.video_extension, &self.audio_extension))
    }

    /// Store uploaded video bytes as the input video artifact.
    pub async fn store_input_bytes(&self, bytes: &[u8]) -> Result<PathBuf, WorkspaceError> {
        let target = self.live_artifact_path(&Artifact::InputVideo)?;
        fs::write(&target, bytes).await.map_err(|source| WorkspaceError::Artifact {
            path: target.clone(),
            source,
        })?;
        info!("Stored input video ({} bytes) at {}", bytes.len(), target.display());
        Ok(target)
    }

    /// Copy an existing video file in as the input video artifact.
    pub async fn store_input_file(&self, source_path: &Path) -> Result<PathBuf, WorkspaceError> {
        let target = self.live_artifact_path(&Artifact::InputVideo)?;
        fs::copy(source_path, &target).await.map_err(|source| WorkspaceError::Artifact {
            path: target.clone(),
            source,
        })?;
        info!("Copied input video {} to {}", source_path.display(), target.display());
        Ok(target)
    }

    /// Files currently present in the workspace, sorted by path.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        if !self.is_live() {
            return Vec::new();
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&self.path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }

    /// Stop removing the directory when the handle is dropped, so a failed
    /// run can be inspected after the process exits.
    pub fn detach(&mut self) -> Option<PathBuf> {
        match std::mem::replace(&mut self.ownership, Ownership::Detached) {
            Ownership::Scoped(dir) => {
                let path = dir.into_path();
                info!("Workspace {} detached from automatic cleanup", path.display());
                Some(path)
            }
            Ownership::Detached => Some(self.path.clone()),
            Ownership::Destroyed => {
                self.ownership = Ownership::Destroyed;
                None
            }
        }
    }

    /// Recursively remove the directory. Idempotent.
    pub fn destroy(&mut self) -> DestroyOutcome {
        let result = match std::mem::replace(&mut self.ownership, Ownership::Destroyed) {
            Ownership::Scoped(dir) => dir.close(),
            Ownership::Detached => std::fs::remove_dir_all(&self.path),
            Ownership::Destroyed => {
                debug!("Workspace {} already destroyed", self.path.display());
                return DestroyOutcome::AlreadyGone;
            }
        };

        match result {
            Ok(()) => {
                info!("Removed workspace {}", self.path.display());
                DestroyOutcome::Removed
            }
            Err(e) if e.kind() == ErrorKind::NotFound => DestroyOutcome::AlreadyGone,
            Err(source) => {
                let error = WorkspaceError::Destroy { path: self.path.clone(), source };
                warn!("{}", error);
                DestroyOutcome::Failed(error)
            }
        }
    }

    fn live_artifact_path(&self, artifact: &Artifact) -> Result<PathBuf, WorkspaceError> {
        if !self.is_live() {
            return Err(WorkspaceError::Destroyed(self.path.clone()));
        }
        Ok(self.artifact_path(artifact))
    }
}

/// Allocates fresh workspaces under a common root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    prefix: String,
    video_extension: String,
    audio_extension: String,
}

impl WorkspaceManager {
    pub fn new(config: &WorkspaceConfig) -> Self {
        Self {
            root: config.root.clone().unwrap_or_else(std::env::temp_dir),
            prefix: config.prefix.clone(),
            video_extension: config.video_extension.clone(),
            audio_extension: config.audio_extension.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a new, empty, exclusively owned directory.
    pub fn create(&self) -> Result<Workspace, WorkspaceError> {
        let create_error = |source| WorkspaceError::Create { root: self.root.clone(), source };

        std::fs::create_dir_all(&self.root).map_err(create_error)?;
        let dir = tempfile::Builder::new()
            .prefix(&self.prefix)
            .tempdir_in(&self.root)
            .map_err(create_error)?;

        let path = dir.path().to_path_buf();
        info!("Created workspace {}", path.display());

        Ok(Workspace {
            path,
            ownership: Ownership::Scoped(dir),
            video_extension: self.video_extension.clone(),
            audio_extension: self.audio_extension.clone(),
        })
    }

    /// Remove a workspace. Never fails; problems come back as a diagnostic.
    pub fn destroy(&self, workspace: &mut Workspace) -> DestroyOutcome {
        workspace.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(root: &Path) -> WorkspaceManager {
        WorkspaceManager::new(&WorkspaceConfig {
            root: Some(root.to_path_buf()),
            ..WorkspaceConfig::default()
        })
    }

    #[test]
    fn test_fixed_artifact_names() {
        let root = tempfile::tempdir().unwrap();
        let workspace = manager(root.path()).create().unwrap();

        let name = |a: Artifact| workspace.artifact_path(&a).file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(name(Artifact::InputVideo), "input_video.mp4");
        assert_eq!(name(Artifact::ExtractedAudio), "extracted_audio.wav");
        assert_eq!(name(Artifact::Subtitles("en".into())), "subtitles_en.srt");
        assert_eq!(name(Artifact::DubbedAudio), "dubbed_audio.wav");
        assert_eq!(name(Artifact::OutputVideo), "output_dubbed_video.mp4");
    }

    #[test]
    fn test_each_create_is_fresh_and_empty() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager(root.path());

        let first = manager.create().unwrap();
        let second = manager.create().unwrap();

        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with(root.path()));
        assert!(first.artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager(root.path());
        let mut workspace = manager.create().unwrap();
        workspace.store_input_bytes(b"video").await.unwrap();
        let path = workspace.path().to_path_buf();

        assert!(matches!(manager.destroy(&mut workspace), DestroyOutcome::Removed));
        assert!(!path.exists());
        assert!(matches!(manager.destroy(&mut workspace), DestroyOutcome::AlreadyGone));
    }

    #[test]
    fn test_destroy_after_external_removal() {
        let root = tempfile::tempdir().unwrap();
        let mut workspace = manager(root.path()).create().unwrap();
        std::fs::remove_dir_all(workspace.path()).unwrap();

        assert!(matches!(workspace.destroy(), DestroyOutcome::AlreadyGone));
    }

    #[tokio::test]
    async fn test_store_after_destroy_fails() {
        let root = tempfile::tempdir().unwrap();
        let mut workspace = manager(root.path()).create().unwrap();
        workspace.destroy();

        let result = workspace.store_input_bytes(b"video").await;
        assert!(matches!(result, Err(WorkspaceError::Destroyed(_))));
    }

    #[test]
    fn test_detached_survives_drop_until_destroyed() {
        let root = tempfile::tempdir().unwrap();
        let mut workspace = manager(root.path()).create().unwrap();
        let path = workspace.detach().unwrap();
        assert!(path.exists());

        assert!(matches!(workspace.destroy(), DestroyOutcome::Removed));
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_scoped_workspace() {
        let root = tempfile::tempdir().unwrap();
        let workspace = manager(root.path()).create().unwrap();
        let path = workspace.path().to_path_buf();
        drop(workspace);
        assert!(!path.exists());
    }
}
