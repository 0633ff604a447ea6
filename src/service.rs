//! Handle-based boundary over the pipeline controller for a presentation
//! layer. Status queries never wait for a running phase; every other
//! operation fails fast while one holds the controller.

use std::fmt;
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, StateError};
use crate::pipeline::{
    DubbingResult, PipelineController, PipelineState, PipelineStatus, ReviewData, ReviewDecision,
    VideoSource,
};
use crate::subtitle::EditSet;

/// Opaque reference to one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunHandle(Uuid);

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct DubbingService {
    controller: Mutex<PipelineController>,
    status: watch::Receiver<PipelineStatus>,
}

impl DubbingService {
    pub fn new(controller: PipelineController) -> Self {
        let status = controller.subscribe();
        Self {
            controller: Mutex::new(controller),
            status,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(PipelineController::from_config(config)?))
    }

    /// Run phase 1 for a new upload. On a stage failure the run stays
    /// inspectable through [`DubbingService::active_run`].
    pub async fn start_dubbing(
        &self,
        video: Vec<u8>,
        target_language: &str,
        source_language: &str,
    ) -> Result<RunHandle> {
        self.start_from(VideoSource::Bytes(video), target_language, source_language)
            .await
    }

    pub async fn start_from(
        &self,
        video: VideoSource,
        target_language: &str,
        source_language: &str,
    ) -> Result<RunHandle> {
        let mut controller = self
            .controller
            .try_lock()
            .map_err(|_| StateError::AlreadyRunning(self.published_state()))?;

        let id = controller.start(video, target_language, source_language).await?;
        Ok(RunHandle(id))
    }

    /// Latest published status. Never blocks on a running phase.
    pub fn get_status(&self, handle: RunHandle) -> Result<PipelineStatus> {
        let status = self.status.borrow().clone();
        match status.run_id {
            Some(id) if id == handle.0 => Ok(status),
            _ => Err(StateError::UnknownRun(handle.0).into()),
        }
    }

    pub fn get_review_data(&self, handle: RunHandle) -> Result<ReviewData> {
        let controller = self.acquire(handle, "read review data")?;
        controller.review_data()
    }

    pub async fn submit_review(
        &self,
        handle: RunHandle,
        edits: EditSet,
        decision: ReviewDecision,
    ) -> Result<()> {
        let mut controller = self.acquire(handle, "submit review")?;
        match decision {
            ReviewDecision::Approve => controller.approve_review(edits).await,
            ReviewDecision::Reject => controller.reject_review(),
        }
    }

    pub fn get_result(&self, handle: RunHandle) -> Result<DubbingResult> {
        let controller = self.acquire(handle, "get result")?;
        controller.result()
    }

    /// Tear the run down. A handle whose run is already gone is a no-op.
    pub fn reset_run(&self, handle: RunHandle) -> Result<()> {
        let mut controller = self.lock("reset")?;
        match controller.run_id() {
            None => {
                debug!("Run {} already reset", handle);
                Ok(())
            }
            Some(id) if id == handle.0 => controller.reset(),
            Some(_) => Err(StateError::UnknownRun(handle.0).into()),
        }
    }

    /// Handle of the run currently owned by the controller, if any.
    pub fn active_run(&self) -> Option<RunHandle> {
        self.status.borrow().run_id.map(RunHandle)
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.status.clone()
    }

    fn published_state(&self) -> PipelineState {
        self.status.borrow().state
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, PipelineController>> {
        self.controller.try_lock().map_err(|_| {
            StateError::InvalidState {
                operation,
                state: self.published_state(),
            }
            .into()
        })
    }

    fn acquire(
        &self,
        handle: RunHandle,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, PipelineController>> {
        let controller = self.lock(operation)?;
        if controller.run_id() != Some(handle.0) {
            return Err(StateError::UnknownRun(handle.0).into());
        }
        Ok(controller)
    }
}
