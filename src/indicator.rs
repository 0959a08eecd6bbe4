// src/indicator.rs
//! Desktop front-end status.
//!
//! A [`DesktopSession`] owns the desktop-role engine and can switch
//! notifications off (dropping the engine and its alarm state) and back on
//! (building a fresh engine). Front ends implement [`AlarmIndicator`] to
//! follow the session's state.

use crate::bus::AlarmSink;
use crate::engine::EscalationEngine;
use crate::error::Result;
use crate::record::AlarmRecord;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// How often [`DesktopSession::observe`] samples the alarm count
pub const OBSERVE_INTERVAL: Duration = Duration::from_millis(500);

/// State shown by a front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorStatus {
    /// Notifications are switched off
    Disabled,
    /// Listening, no alarm active
    ActiveOk,
    /// Listening, at least one alarm active
    ActiveAlarm,
}

/// Severity of a status message shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    /// Nothing to do
    Info,
    /// Alarms may be missed
    Warning,
    /// Alarms are active
    Critical,
}

/// Text for a front end's status dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    /// How the dialog should be presented
    pub level: MessageLevel,
    /// Message body
    pub text: String,
}

/// Front end reacting to session changes (tray icon, log output)
pub trait AlarmIndicator: Send + Sync {
    /// Alarms appeared or all went away
    fn on_alarm_changed(&self, status: IndicatorStatus);
    /// Notifications were switched on or off
    fn on_toggle(&self, enabled: bool);
}

/// Builds a new engine each time notifications are switched on
pub type EngineFactory = Box<dyn Fn() -> Result<EscalationEngine> + Send + Sync>;

/// Per-user notification session that can be switched on and off
pub struct DesktopSession {
    factory: EngineFactory,
    engine: Mutex<Option<Arc<EscalationEngine>>>,
    indicator: Arc<dyn AlarmIndicator>,
}

impl DesktopSession {
    /// Create a session with notifications switched off
    pub fn new(factory: EngineFactory, indicator: Arc<dyn AlarmIndicator>) -> Self {
        Self {
            factory,
            engine: Mutex::new(None),
            indicator,
        }
    }

    /// Whether an engine is currently running
    pub fn is_enabled(&self) -> bool {
        self.engine.lock().is_some()
    }

    /// Current front end state
    pub fn status(&self) -> IndicatorStatus {
        match self.engine.lock().as_ref() {
            None => IndicatorStatus::Disabled,
            Some(engine) if engine.count() > 0 => IndicatorStatus::ActiveAlarm,
            Some(_) => IndicatorStatus::ActiveOk,
        }
    }

    /// Status dialog text for the current state
    pub fn status_message(&self) -> StatusMessage {
        let count = self.engine.lock().as_ref().map(|engine| engine.count());
        match count {
            None => StatusMessage {
                level: MessageLevel::Warning,
                text: "The alarm notifications desktop widget is currently disabled, so information about alarms is not received from the alarm server!".to_string(),
            },
            Some(0) => StatusMessage {
                level: MessageLevel::Info,
                text: "No alarms are known to the alarm notifications desktop widget.\n\nPlease note that alarms triggered before the start or re-activation of this widget have not been received, so if you want to be sure that nothing is wrong, look at the alarm display.".to_string(),
            },
            Some(n) => StatusMessage {
                level: MessageLevel::Critical,
                text: format!(
                    "ATTENTION!\n\nThere are {} alarm(s) active in the Detector Control System! For detailed information look at the alarm display!",
                    n
                ),
            },
        }
    }

    /// Build and start an engine. No-op if already enabled.
    pub fn enable(&self) -> Result<()> {
        let mut slot = self.engine.lock();
        if slot.is_some() {
            return Ok(());
        }
        let engine = Arc::new((self.factory)()?);
        engine.start()?;
        *slot = Some(engine);
        drop(slot);

        info!("Desktop notifications enabled");
        self.indicator.on_toggle(true);
        Ok(())
    }

    /// Stop and drop the engine. No-op if already disabled.
    pub async fn disable(&self) -> Result<()> {
        let Some(engine) = self.engine.lock().take() else {
            return Ok(());
        };
        engine.shutdown().await?;

        info!("Desktop notifications disabled");
        self.indicator.on_toggle(false);
        Ok(())
    }

    /// Switch notifications; returns whether they are now enabled
    pub async fn toggle(&self) -> Result<bool> {
        if self.is_enabled() {
            self.disable().await?;
            Ok(false)
        } else {
            self.enable()?;
            Ok(true)
        }
    }

    /// Report alarm/no-alarm transitions to the indicator until `running`
    /// is cleared.
    pub async fn observe(&self, running: Arc<AtomicBool>) {
        let mut ticker = interval(OBSERVE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = None;

        while running.load(Ordering::SeqCst) {
            ticker.tick().await;
            self.observe_once(&mut last);
        }
    }

    fn observe_once(&self, last: &mut Option<IndicatorStatus>) {
        let status = self.status();
        if status == IndicatorStatus::Disabled {
            // the toggle callback already told the front end
            *last = None;
            return;
        }
        if *last != Some(status) {
            *last = Some(status);
            self.indicator.on_alarm_changed(status);
        }
    }
}

impl AlarmSink for DesktopSession {
    fn ingest(&self, event: AlarmRecord) {
        let engine = self.engine.lock().clone();
        match engine {
            Some(engine) => {
                engine.ingest(event);
            }
            None => debug!("Notifications disabled, ignoring {}", event.id()),
        }
    }
}

/// Indicator for headless sessions that writes state changes to the log
#[derive(Debug, Default)]
pub struct LogIndicator;

impl AlarmIndicator for LogIndicator {
    fn on_alarm_changed(&self, status: IndicatorStatus) {
        match status {
            IndicatorStatus::ActiveAlarm => warn!("Alarms active"),
            IndicatorStatus::ActiveOk => info!("No alarms active"),
            IndicatorStatus::Disabled => info!("Alarm notifications disabled"),
        }
    }

    fn on_toggle(&self, enabled: bool) {
        info!("Alarm notifications {}", if enabled { "enabled" } else { "disabled" });
    }
}
