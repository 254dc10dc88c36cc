use crate::error::Result;
use crate::profile::ResolutionProfile;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Action requested from the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    ToggleRecording,
    SetProfile(ResolutionProfile),
    ExportAll,
    Clear,
    Quit,
}

impl KeyCommand {
    /// `r` toggles recording, `1`-`5` pick a profile, `e` exports, `c` clears,
    /// `q`/Esc quits. Raw mode delivers Ctrl+C and Ctrl+D as key presses; both
    /// quit, and no other modified key maps to a command.
    pub fn from_key(key: KeyEvent) -> Option<Self> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') | KeyCode::Char('d') => Some(Self::Quit),
                _ => None,
            };
        }
        if key.modifiers.intersects(KeyModifiers::ALT | KeyModifiers::SUPER) {
            return None;
        }

        match key.code {
            KeyCode::Char('r') | KeyCode::Char(' ') => Some(Self::ToggleRecording),
            KeyCode::Char('e') => Some(Self::ExportAll),
            KeyCode::Char('c') => Some(Self::Clear),
            KeyCode::Char('q') | KeyCode::Esc => Some(Self::Quit),
            KeyCode::Char(digit @ '1'..='9') => {
                let index = digit.to_digit(10)? as usize - 1;
                ResolutionProfile::all()
                    .get(index)
                    .copied()
                    .map(Self::SetProfile)
            }
            _ => None,
        }
    }
}

/// Reads key presses in raw terminal mode and forwards them as commands
pub struct KeyboardInputHandler {
    commands: mpsc::Sender<KeyCommand>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(commands: mpsc::Sender<KeyCommand>) -> Self {
        Self {
            commands,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub fn start(&self) -> Result<JoinHandle<()>> {
        info!("Starting keyboard input handler");

        let commands = self.commands.clone();
        let cancellation_token = self.cancellation_token.clone();

        let handle = task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled - keyboard handler active");

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let key_event = match event::read() {
                            Ok(Event::Key(key_event)) if key_event.kind == KeyEventKind::Press => {
                                key_event
                            }
                            Ok(_) => continue,
                            Err(e) => {
                                warn!("Error reading keyboard event: {}", e);
                                continue;
                            }
                        };

                        let Some(command) = KeyCommand::from_key(key_event) else {
                            debug!("Key pressed: {:?}", key_event.code);
                            continue;
                        };

                        if commands.blocking_send(command).is_err() {
                            debug!("Command receiver closed");
                            break;
                        }
                        if command == KeyCommand::Quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }

            debug!("Keyboard input handler task exited");
        });

        Ok(handle)
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // one poll interval for the task to restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}
