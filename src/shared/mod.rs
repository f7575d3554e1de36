//! Shared state and messaging between the capture controller and observers

pub mod messages;
pub mod state;

pub use messages::CaptureEvent;
pub use state::ScanStatus;
