pub mod keyboard;

mod library;
mod recorder;
mod runtime;
mod types;

#[cfg(test)]
mod tests;

pub use keyboard::{KeyCommand, KeyboardInputHandler};
pub use recorder::Recorder;
pub use runtime::shutdown_signal;
pub use types::{RecorderStatus, SavedRecording, ShutdownReason};
