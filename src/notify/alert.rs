// src/notify/alert.rs
//! Sustained audio/visual alert for desktop sessions.

use super::AlertSignal;
use crate::error::{AlarmError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sustained alert that replays an external command (video or sound
/// player) until it is stopped.
#[derive(Debug)]
pub struct CommandAlert {
    program: String,
    args: Vec<String>,
    player: Mutex<Option<JoinHandle<()>>>,
}

impl CommandAlert {
    /// `argv[0]` is the program, the rest are its arguments
    pub fn new(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| AlarmError::Config("alert command must not be empty".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            player: Mutex::new(None),
        })
    }

    /// Whether the player loop is active
    pub fn is_running(&self) -> bool {
        self.player
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

#[async_trait]
impl AlertSignal for CommandAlert {
    async fn start(&self) -> Result<()> {
        let mut player = self.player.lock();
        if player.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return Ok(());
        }

        info!("Starting sustained alarm alert");
        let program = self.program.clone();
        let args = self.args.clone();
        *player = Some(tokio::spawn(async move {
            loop {
                // dropping the future on abort kills the player
                let status = Command::new(&program).args(&args).kill_on_drop(true).status().await;
                match status {
                    Ok(status) => debug!("Alert player exited with {}", status),
                    Err(e) => {
                        warn!("Cannot run alert player {}: {}", program, e);
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(handle) = self.player.lock().take() {
            info!("Stopping sustained alarm alert");
            handle.abort();
        }
        Ok(())
    }
}

impl Drop for CommandAlert {
    fn drop(&mut self) {
        if let Some(handle) = self.player.get_mut().take() {
            handle.abort();
        }
    }
}
