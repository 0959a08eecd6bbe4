// src/daemon.rs
//! Long-running server process around an [`EscalationEngine`].

use crate::engine::EscalationEngine;
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Heartbeat log line for `count` active alarms
pub fn heartbeat_message(count: usize) -> String {
    if count == 0 {
        "No alarms active.".to_string()
    } else {
        format!("Number of active alarms: {}", count)
    }
}

/// Drives the engine until a stop is requested, logging a heartbeat with
/// the active alarm count.
pub struct Daemon {
    engine: Arc<EscalationEngine>,
    heartbeat: Duration,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
}

impl Daemon {
    /// Daemon around a not yet started engine
    pub fn new(engine: Arc<EscalationEngine>, heartbeat: Duration) -> Self {
        Self {
            engine,
            heartbeat,
            running: Arc::new(AtomicBool::new(true)),
            stop: Arc::new(Notify::new()),
        }
    }

    /// Flag cleared when the daemon stops; shared with the bus client
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// The driven engine
    pub fn engine(&self) -> &Arc<EscalationEngine> {
        &self.engine
    }

    /// Make [`run`](Self::run) return after shutting the engine down
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop.notify_one();
    }

    /// Start the engine and block until [`request_stop`](Self::request_stop)
    /// or a shutdown signal, then stop the engine.
    pub async fn run(&self) -> Result<()> {
        self.engine.start()?;

        let running = Arc::clone(&self.running);
        let stop = Arc::clone(&self.stop);
        let listener = tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(name) => info!("Received {}, shutting down", name),
                Err(e) => error!("Cannot listen for shutdown signals: {}", e),
            }
            running.store(false, Ordering::SeqCst);
            stop.notify_one();
        });

        let mut ticker = interval(self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = ticker.tick() => {
                    info!("{}", heartbeat_message(self.engine.count()));
                }
                _ = self.stop.notified() => break,
            }
        }

        listener.abort();
        self.running.store(false, Ordering::SeqCst);
        self.engine.shutdown().await
    }
}

/// Resolve with the name of the first termination signal received
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigquit = signal(SignalKind::quit())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;

    let name = tokio::select! {
        result = signal::ctrl_c() => { result?; "SIGINT" }
        _ = sigterm.recv() => "SIGTERM",
        _ = sighup.recv() => "SIGHUP",
        _ = sigquit.recv() => "SIGQUIT",
        _ = sigusr1.recv() => "SIGUSR1",
        _ = sigusr2.recv() => "SIGUSR2",
    };
    Ok(name)
}

/// Resolve once Ctrl-C is received
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    signal::ctrl_c().await?;
    Ok("Ctrl-C")
}
