//! Alarm notifications for a detector control system.
//!
//! Active alarms received from the alarm server are kept in an
//! [`AlarmStore`]. The [`EscalationEngine`] watches the store and escalates
//! alarms that stay active too long: a desktop popup, an e-mail to the
//! mailing list and a flashlight in the laboratory, each after its own
//! timeout.
//!
//! # Feature Flags
//!
//! - `mqtt` (default): [`bus::MqttBusClient`] receiving alarm server
//!   messages from an MQTT broker
//! - `email` (default): [`notify::SmtpMailSender`]
//!
//! # Examples
//!
//! ```rust
//! use alarm_notify::{AlarmRecord, EngineSettings, EscalationEngine, IngestOutcome, Role};
//!
//! let engine = EscalationEngine::builder(EngineSettings::new(Role::Desktop)).build()?;
//! assert_eq!(engine.ingest(AlarmRecord::new("DET:HV:1", "MAJOR", "HIHI")), IngestOutcome::Inserted);
//! assert_eq!(engine.ingest(AlarmRecord::new("DET:HV:1", "MAJOR_ACK", "HIHI")), IngestOutcome::Removed);
//! assert_eq!(engine.count(), 0);
//! # Ok::<(), alarm_notify::AlarmError>(())
//! ```

#![warn(missing_docs)]

// ============================================================================
// CORE MODULES
// ============================================================================

/// Error types
pub mod error;

/// Alarm records and the clearing predicate
pub mod record;

/// Thread-safe map of active alarms
pub mod store;

/// Time source used by the engine
pub mod clock;

/// YAML configuration
pub mod config;

/// Escalation engine and its periodic actors
pub mod engine;

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Alarm server bus client
pub mod bus;

/// Notification channels
pub mod notify;

/// Desktop session and status indicators
pub mod indicator;

/// Server daemon
pub mod daemon;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use bus::{AlarmSink, StateMessage};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use daemon::Daemon;
pub use engine::{EngineBuilder, EngineSettings, EscalationEngine, Role};
pub use error::{AlarmError, Result};
pub use indicator::{AlarmIndicator, DesktopSession, IndicatorStatus};
pub use record::AlarmRecord;
pub use store::{AlarmStore, IngestOutcome};

// ============================================================================
// VERSION INFORMATION
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build information exported by the build script
pub mod build_info {
    /// Git commit the binary was built from, if known
    pub const GIT_HASH: Option<&str> = option_env!("ALARM_NOTIFY_GIT_HASH");

    /// RFC 3339 build time
    pub const BUILD_TIMESTAMP: Option<&str> = option_env!("ALARM_NOTIFY_BUILD_TIMESTAMP");
}
