use super::keyboard::{KeyCommand, KeyboardInputHandler};
use super::types::{SavedRecording, ShutdownReason};
use super::Recorder;
use crate::error::Result;
use crate::events::RecorderEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Resolve on Ctrl+C or, on Unix, SIGTERM
pub async fn shutdown_signal() -> ShutdownReason {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received SIGINT signal (Ctrl+C)");
            ShutdownReason::Signal("SIGINT".to_string())
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
            ShutdownReason::Signal("SIGTERM".to_string())
        }
    }
}

impl Recorder {
    /// Record until `duration` elapses (if given) or a shutdown signal
    /// arrives, then persist
    pub async fn record_for(&self, duration: Option<Duration>) -> Result<SavedRecording> {
        self.start_recording().await?;

        let reason = match duration {
            Some(duration) => tokio::select! {
                _ = tokio::time::sleep(duration) => ShutdownReason::DurationElapsed,
                reason = shutdown_signal() => reason,
            },
            None => shutdown_signal().await,
        };

        info!("Stopping recording: {:?}", reason);
        self.stop_recording().await
    }

    /// Keyboard-driven session. Returns when the user quits or a shutdown
    /// signal arrives; an in-progress recording is saved first.
    pub async fn run_interactive(&self) -> Result<ShutdownReason> {
        let (tx, mut rx) = mpsc::channel(16);
        let keyboard = KeyboardInputHandler::new(tx);
        let keyboard_task = keyboard.start()?;

        println!("r: start/stop  1-5: resolution  e: export all  c: clear  q: quit\r");

        let reason = loop {
            let command = tokio::select! {
                command = rx.recv() => command,
                reason = shutdown_signal() => break reason,
            };

            let Some(command) = command else {
                break ShutdownReason::UserRequest;
            };

            if command == KeyCommand::Quit {
                break ShutdownReason::UserRequest;
            }

            if let Err(e) = self.handle_command(command).await {
                error!("Command {:?} failed: {}", command, e);
                println!("Error: {}\r", e);
            }
        };

        self.event_bus.emit(RecorderEvent::ShutdownRequested {
            reason: format!("{:?}", reason),
        });

        keyboard.stop().await?;
        if let Err(e) = keyboard_task.await {
            warn!("Keyboard task ended abnormally: {}", e);
        }

        if let Some(saved) = self.shutdown().await? {
            println!("Saved recording {} ({} bytes)", saved.key, saved.bytes);
        }

        Ok(reason)
    }

    pub(super) async fn handle_command(&self, command: KeyCommand) -> Result<()> {
        match command {
            KeyCommand::ToggleRecording => {
                if self.is_recording().await {
                    let saved = self.stop_recording().await?;
                    println!("Saved recording {} ({} bytes)\r", saved.key, saved.bytes);
                } else {
                    self.start_recording().await?;
                    println!("Recording at {}\r", self.profile().await);
                }
            }
            KeyCommand::SetProfile(profile) => {
                if let Some(saved) = self.set_profile(profile.label).await? {
                    println!("Saved recording {} ({} bytes)\r", saved.key, saved.bytes);
                }
                println!("Resolution set to {}\r", profile);
            }
            KeyCommand::ExportAll => {
                let written = self.export_all(None).await?;
                println!("Exported {} recordings\r", written.len());
            }
            KeyCommand::Clear => {
                self.clear().await?;
                println!("Archive cleared\r");
            }
            KeyCommand::Quit => {}
        }
        Ok(())
    }
}
