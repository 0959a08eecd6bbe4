// src/notify/mod.rs
//! Notification channels driven by the escalation engine.
//!
//! The engine only knows the traits defined here. Concrete adapters live in
//! the submodules and are injected at construction time.

use crate::error::Result;
use crate::record::AlarmRecord;
use async_trait::async_trait;

pub mod alert;
pub mod desktop;
#[cfg(feature = "email")]
pub mod email;
pub mod relay;

pub use alert::CommandAlert;
pub use desktop::NotifySendPresenter;
#[cfg(feature = "email")]
pub use email::SmtpMailSender;
pub use relay::SerialRelay;

/// Popup notifications on the user's desktop
#[async_trait]
pub trait DesktopNotifier: Send + Sync {
    /// Show one notification listing `records`
    async fn show(&self, records: &[AlarmRecord]) -> Result<()>;

    /// Called once when the last active alarm went away
    async fn clear(&self) -> Result<()>;
}

/// Alarm e-mails to the mailing list
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Send one e-mail listing `records`
    async fn send_alarm_notification(&self, records: &[AlarmRecord]) -> Result<()>;
}

/// Flashlight relay in the laboratory.
///
/// Implementations serialize access to the device themselves and must
/// tolerate redundant calls.
#[cfg_attr(test, mockall::automock)]
pub trait RelayController: Send + Sync {
    /// Light the flashlight
    fn switch_on(&self) -> Result<()>;
    /// Turn the flashlight off
    fn switch_off(&self) -> Result<()>;
}

/// Sustained audio/visual alert that runs until stopped
#[async_trait]
pub trait AlertSignal: Send + Sync {
    /// Start the alert; a no-op if it is already running
    async fn start(&self) -> Result<()>;

    /// Stop the alert; a no-op if it is not running
    async fn stop(&self) -> Result<()>;
}
