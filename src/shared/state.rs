//! Scan status shared between the capture controller and its observers

use crate::capture::CaptureState;
use crate::classifier::ResultRecord;

/// Snapshot of what a presentation layer renders during capture
#[derive(Debug, Clone)]
pub struct ScanStatus {
    /// Current controller state
    pub state: CaptureState,
    /// Last published live-scan result
    pub latest_result: Option<ResultRecord>,
    /// Classifications started but not yet finished
    pub pending: usize,
    /// Frames captured in the current controller lifetime
    pub frames_captured: u64,
    /// Last error message (if any)
    pub last_error: Option<String>,
}

impl Default for ScanStatus {
    fn default() -> Self {
        Self {
            state: CaptureState::Idle,
            latest_result: None,
            pending: 0,
            frames_captured: 0,
            last_error: None,
        }
    }
}

impl ScanStatus {
    /// Whether a classification is in flight
    pub fn is_loading(&self) -> bool {
        self.pending > 0
    }

    /// Clear any error state
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Set an error message
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}
