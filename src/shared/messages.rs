//! Message types sent from the capture controller to its observers

use crate::capture::CaptureState;
use crate::classifier::ResultRecord;

/// Events published by the capture controller
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// The controller moved between states
    StateChanged {
        from: CaptureState,
        to: CaptureState,
    },
    /// A live-scan frame was handed to the classifier
    Classifying { sequence: u64 },
    /// A live-scan result became the latest result
    ResultPublished { sequence: u64, record: ResultRecord },
    /// The camera failed to deliver a live-scan frame
    FrameFailed { message: String },
}
