// src/engine.rs
//! Alarm escalation engine.
//!
//! The engine owns the [`AlarmStore`] and runs two periodic actors against
//! it:
//!
//! - the notification actor, which fires desktop popups and (server role
//!   only) alarm e-mails once the oldest active alarm is older than the
//!   channel's timeout;
//! - the flashlight actor (server role only), which switches the laboratory
//!   relay on after the laboratory timeout and off once no alarm is left.
//!
//! Actors scan and mark under the store lock, then hand the selected copies
//! to detached tasks so a slow notifier never delays the next poll. Every
//! dispatch failure is logged and swallowed; the flags already set are not
//! rolled back, so each alarm gets at most one attempt per channel and
//! episode.
//!
//! # Examples
//!
//! ```rust,no_run
//! use alarm_notify::{AlarmRecord, EngineSettings, EscalationEngine, Role};
//! use alarm_notify::notify::NotifySendPresenter;
//! use std::sync::Arc;
//!
//! # async fn run() -> alarm_notify::Result<()> {
//! let settings = EngineSettings {
//!     desktop_timeout_secs: 30,
//!     ..EngineSettings::new(Role::Desktop)
//! };
//! let engine = EscalationEngine::builder(settings)
//!     .desktop(Arc::new(NotifySendPresenter::default()))
//!     .build()?;
//! engine.start()?;
//! engine.ingest(AlarmRecord::new("DET:HV:1", "MAJOR", "HIHI"));
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use crate::bus::AlarmSink;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{AlarmError, Result};
use crate::notify::{AlertSignal, DesktopNotifier, MailSender, RelayController};
use crate::record::AlarmRecord;
use crate::store::{AlarmStore, IngestOutcome};
use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

// ============================================================================
// SETTINGS
// ============================================================================

/// Deployment role of an engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Central daemon: may drive the flashlight and send e-mails
    Server,
    /// Per-user instance: desktop notifications only
    Desktop,
}

/// Construction-time settings. Timeouts are whole seconds, 0 disables the
/// channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Which channels this instance may drive
    pub role: Role,
    /// Delay before the flashlight is switched on
    pub laboratory_timeout_secs: u32,
    /// Delay before a desktop popup is shown
    pub desktop_timeout_secs: u32,
    /// Delay before an alarm e-mail is sent
    pub email_timeout_secs: u32,
    /// Period of both actors
    pub poll_interval: Duration,
}

impl EngineSettings {
    /// All channels disabled, one second poll interval
    pub fn new(role: Role) -> Self {
        Self {
            role,
            laboratory_timeout_secs: 0,
            desktop_timeout_secs: 0,
            email_timeout_secs: 0,
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Take timeouts and poll interval from the `notifications` section
    pub fn from_config(config: &Config, role: Role) -> Self {
        Self {
            role,
            laboratory_timeout_secs: config.notifications.laboratory_timeout_secs,
            desktop_timeout_secs: config.notifications.desktop_timeout_secs,
            email_timeout_secs: config.notifications.email_timeout_secs,
            poll_interval: config.poll_interval(),
        }
    }
}

fn secs(timeout: u32) -> ChronoDuration {
    ChronoDuration::seconds(i64::from(timeout))
}

// ============================================================================
// BUILDER
// ============================================================================

/// Collects the notifier collaborators of an [`EscalationEngine`]
pub struct EngineBuilder {
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    desktop: Option<Arc<dyn DesktopNotifier>>,
    mail: Option<Arc<dyn MailSender>>,
    relay: Option<Arc<dyn RelayController>>,
    alert: Option<Arc<dyn AlertSignal>>,
}

impl EngineBuilder {
    /// Time source, [`SystemClock`] by default
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach the desktop popup channel
    pub fn desktop(mut self, notifier: Arc<dyn DesktopNotifier>) -> Self {
        self.desktop = Some(notifier);
        self
    }

    /// Attach the e-mail channel (server role only)
    pub fn mail(mut self, sender: Arc<dyn MailSender>) -> Self {
        self.mail = Some(sender);
        self
    }

    /// Attach the laboratory flashlight (server role only)
    pub fn relay(mut self, relay: Arc<dyn RelayController>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Attach the sustained alert (desktop role only)
    pub fn alert(mut self, alert: Arc<dyn AlertSignal>) -> Self {
        self.alert = Some(alert);
        self
    }

    /// Validate the deployment and create the engine.
    ///
    /// Fails when a channel is attached to an instance whose role may not
    /// drive it.
    pub fn build(self) -> Result<EscalationEngine> {
        let role = self.settings.role;
        if role == Role::Desktop && self.relay.is_some() {
            return Err(AlarmError::Config(
                "Laboratory notifications can only be used in server mode".into(),
            ));
        }
        if role == Role::Desktop && self.mail.is_some() {
            return Err(AlarmError::Config(
                "E-mail notifications can only be used in server mode".into(),
            ));
        }
        if role == Role::Server && self.alert.is_some() {
            return Err(AlarmError::Config(
                "The sustained alert can only be used in desktop mode".into(),
            ));
        }
        if self.settings.poll_interval.is_zero() {
            return Err(AlarmError::Config("Poll interval must be greater than 0".into()));
        }

        let (count_tx, _) = watch::channel(0);
        Ok(EscalationEngine {
            core: Arc::new(EngineCore {
                settings: self.settings,
                store: AlarmStore::new(),
                clock: self.clock,
                desktop: self.desktop,
                mail: self.mail,
                relay: self.relay,
                alert: self.alert,
                running: AtomicBool::new(false),
                alarm_seen: AtomicBool::new(false),
                alert_active: AtomicBool::new(false),
                flashlight_on: AtomicBool::new(false),
                count_tx,
            }),
            actors: Mutex::new(Vec::new()),
        })
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// What one poll of the notification actor handed to the notifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationTick {
    /// The store drained since the previous poll and the no-alarm side
    /// effects were triggered
    pub cleared: bool,
    /// Records dispatched to the desktop notifier
    pub desktop: Vec<AlarmRecord>,
    /// Records dispatched to the mail sender
    pub email: Vec<AlarmRecord>,
}

/// Flashlight transition performed by one poll of the flashlight actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashlightAction {
    /// The laboratory timeout elapsed and the relay was switched on
    SwitchedOn,
    /// The store drained and the relay was switched off
    SwitchedOff,
}

struct EngineCore {
    settings: EngineSettings,
    store: AlarmStore,
    clock: Arc<dyn Clock>,
    desktop: Option<Arc<dyn DesktopNotifier>>,
    mail: Option<Arc<dyn MailSender>>,
    relay: Option<Arc<dyn RelayController>>,
    alert: Option<Arc<dyn AlertSignal>>,
    running: AtomicBool,
    /// The notification actor saw a non-empty store since the last drain
    alarm_seen: AtomicBool,
    alert_active: AtomicBool,
    flashlight_on: AtomicBool,
    count_tx: watch::Sender<usize>,
}

/// Alarm lifecycle and escalation engine
pub struct EscalationEngine {
    core: Arc<EngineCore>,
    actors: Mutex<Vec<JoinHandle<()>>>,
}

impl EscalationEngine {
    /// Start configuring an engine; every channel starts detached
    pub fn builder(settings: EngineSettings) -> EngineBuilder {
        EngineBuilder {
            settings,
            clock: Arc::new(SystemClock),
            desktop: None,
            mail: None,
            relay: None,
            alert: None,
        }
    }

    /// Settings the engine was built with
    pub fn settings(&self) -> &EngineSettings {
        &self.core.settings
    }

    /// Handle to the shared alarm store
    pub fn store(&self) -> &AlarmStore {
        &self.core.store
    }

    /// Apply one alarm server event
    pub fn ingest(&self, event: AlarmRecord) -> IngestOutcome {
        let outcome = self.core.store.ingest(event);
        // count is read under the channel lock; the last publisher sees the latest state
        let store = &self.core.store;
        self.core.count_tx.send_if_modified(|count| {
            let current = store.count();
            let changed = *count != current;
            *count = current;
            changed
        });
        outcome
    }

    /// Number of active alarms
    pub fn count(&self) -> usize {
        self.core.store.count()
    }

    /// Receiver that is updated with the active alarm count after every
    /// ingested event
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.core.count_tx.subscribe()
    }

    /// Whether the actors have been started and not shut down
    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::SeqCst)
    }

    /// Spawn the periodic actors on the current tokio runtime.
    ///
    /// The flashlight actor only runs in server role. Fails outside a tokio
    /// runtime or when the engine is already running.
    pub fn start(&self) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(AlarmError::Runtime(
                "Escalation engine must be started inside a tokio runtime".into(),
            ));
        }
        if self.core.running.swap(true, Ordering::SeqCst) {
            return Err(AlarmError::Runtime("Escalation engine is already running".into()));
        }

        let settings = &self.core.settings;
        info!(
            "Starting escalation engine ({:?} role, laboratory {}s, desktop {}s, e-mail {}s)",
            settings.role,
            settings.laboratory_timeout_secs,
            settings.desktop_timeout_secs,
            settings.email_timeout_secs
        );

        let mut actors = self.actors.lock();
        actors.push(tokio::spawn(notification_actor(Arc::clone(&self.core))));
        if settings.role == Role::Server {
            actors.push(tokio::spawn(flashlight_actor(Arc::clone(&self.core))));
        }
        Ok(())
    }

    /// Ask the actors to stop and wait until every one of them has exited.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Stopping escalation engine");
        self.core.running.store(false, Ordering::SeqCst);

        let actors: Vec<_> = self.actors.lock().drain(..).collect();
        let mut failure = None;
        for actor in actors {
            if let Err(e) = actor.await {
                error!("Escalation actor terminated abnormally: {}", e);
                failure = Some(AlarmError::Runtime(format!("Escalation actor failed: {}", e)));
            }
        }

        info!("Escalation engine stopped");
        failure.map_or(Ok(()), Err)
    }

    /// One poll of the desktop/e-mail actor at the clock's current time.
    ///
    /// # Panics
    ///
    /// Dispatch is spawned onto the current tokio runtime, so this panics
    /// when called outside one while a batch or the no-alarm transition is
    /// due.
    pub fn poll_notifications(&self) -> NotificationTick {
        self.core.poll_notifications()
    }

    /// One poll of the flashlight actor at the clock's current time.
    pub async fn poll_flashlight(&self) -> Option<FlashlightAction> {
        self.core.poll_flashlight().await
    }
}

impl AlarmSink for EscalationEngine {
    fn ingest(&self, event: AlarmRecord) {
        EscalationEngine::ingest(self, event);
    }
}

impl Drop for EscalationEngine {
    fn drop(&mut self) {
        // actors see the flag on their next poll and exit on their own
        self.core.running.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// ACTORS
// ============================================================================

async fn notification_actor(core: Arc<EngineCore>) {
    let mut ticker = interval(core.settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    while core.running.load(Ordering::SeqCst) {
        ticker.tick().await;
        if !core.running.load(Ordering::SeqCst) {
            break;
        }
        core.poll_notifications();
    }
    debug!("Notification actor exited");
}

async fn flashlight_actor(core: Arc<EngineCore>) {
    let mut ticker = interval(core.settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    while core.running.load(Ordering::SeqCst) {
        ticker.tick().await;
        if !core.running.load(Ordering::SeqCst) {
            break;
        }
        core.poll_flashlight().await;
    }
    debug!("Flashlight actor exited");
}

impl EngineCore {
    fn poll_notifications(&self) -> NotificationTick {
        let now = self.clock.now();
        let mut tick = NotificationTick::default();

        if self.store.is_empty() {
            if self.alarm_seen.swap(false, Ordering::SeqCst) {
                tick.cleared = true;
                self.dispatch_cleared();
            }
            return tick;
        }
        self.alarm_seen.store(true, Ordering::SeqCst);

        let desktop_timeout = self.settings.desktop_timeout_secs;
        if desktop_timeout > 0 && self.store.episode_elapsed(now, secs(desktop_timeout)) {
            if let Some(desktop) = &self.desktop {
                tick.desktop = self.store.prepare_desktop_batch(now, secs(desktop_timeout));
                if !tick.desktop.is_empty() {
                    dispatch_desktop(Arc::clone(desktop), tick.desktop.clone());
                }
            }
            self.start_alert();
        }

        let email_timeout = self.settings.email_timeout_secs;
        if self.settings.role == Role::Server
            && email_timeout > 0
            && self.store.episode_elapsed(now, secs(email_timeout))
        {
            if let Some(mail) = &self.mail {
                tick.email = self.store.prepare_email_batch();
                if !tick.email.is_empty() {
                    dispatch_email(Arc::clone(mail), tick.email.clone());
                }
            }
        }

        tick
    }

    fn start_alert(&self) {
        let Some(alert) = &self.alert else { return };
        if self.alert_active.swap(true, Ordering::SeqCst) {
            return;
        }
        let alert = Arc::clone(alert);
        tokio::spawn(async move {
            if let Err(e) = alert.start().await {
                error!("Cannot start sustained alert: {}", e);
            }
        });
    }

    fn dispatch_cleared(&self) {
        info!("No alarms active anymore");
        if self.alert_active.swap(false, Ordering::SeqCst) {
            if let Some(alert) = &self.alert {
                let alert = Arc::clone(alert);
                tokio::spawn(async move {
                    if let Err(e) = alert.stop().await {
                        error!("Cannot stop sustained alert: {}", e);
                    }
                });
            }
        }
        if let Some(desktop) = &self.desktop {
            let desktop = Arc::clone(desktop);
            tokio::spawn(async move {
                if let Err(e) = desktop.clear().await {
                    error!("Cannot clear desktop notifications: {}", e);
                }
            });
        }
    }

    async fn poll_flashlight(&self) -> Option<FlashlightAction> {
        let relay = self.relay.as_ref()?;
        let timeout = self.settings.laboratory_timeout_secs;
        if timeout == 0 {
            return None;
        }

        let now = self.clock.now();
        let is_on = self.flashlight_on.load(Ordering::SeqCst);

        if !is_on && self.store.episode_elapsed(now, secs(timeout)) {
            self.flashlight_on.store(true, Ordering::SeqCst);
            info!("Flash light on!");
            switch_relay(Arc::clone(relay), true).await;
            return Some(FlashlightAction::SwitchedOn);
        }

        if is_on && self.store.is_empty() {
            self.flashlight_on.store(false, Ordering::SeqCst);
            info!("Flash light off!");
            switch_relay(Arc::clone(relay), false).await;
            return Some(FlashlightAction::SwitchedOff);
        }

        None
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

fn dispatch_desktop(desktop: Arc<dyn DesktopNotifier>, batch: Vec<AlarmRecord>) {
    debug!("Dispatching desktop notification for {} alarm(s)", batch.len());
    tokio::spawn(async move {
        if let Err(e) = desktop.show(&batch).await {
            error!("Desktop notification for {} alarm(s) failed: {}", batch.len(), e);
        }
    });
}

fn dispatch_email(mail: Arc<dyn MailSender>, batch: Vec<AlarmRecord>) {
    debug!("Dispatching e-mail notification for {} alarm(s)", batch.len());
    tokio::spawn(async move {
        if let Err(e) = mail.send_alarm_notification(&batch).await {
            error!("E-mail notification for {} alarm(s) failed: {}", batch.len(), e);
        }
    });
}

async fn switch_relay(relay: Arc<dyn RelayController>, on: bool) {
    let result = tokio::task::spawn_blocking(move || {
        if on {
            relay.switch_on()
        } else {
            relay.switch_off()
        }
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Switching the flash light {} failed: {}", if on { "on" } else { "off" }, e),
        Err(e) => warn!("Relay task failed: {}", e),
    }
}
