mod session;
mod state;
#[cfg(test)]
mod tests;

pub use session::{RecordingSession, SessionOptions};
pub use state::{SessionState, SessionStats};
