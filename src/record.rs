// src/record.rs
//! Alarm record value type.
//!
//! An [`AlarmRecord`] is the state of one monitored process variable as last
//! reported by the alarm server, plus the per-channel "already notified"
//! flags for the current alarm episode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity that marks an alarm as returned to normal.
pub const SEVERITY_OK: &str = "OK";

/// Severity suffix the alarm server appends once an operator acknowledged.
pub const ACK_SUFFIX: &str = "_ACK";

/// Returns `true` when `severity` resolves an alarm instead of raising one.
///
/// ```rust
/// use alarm_notify::record::is_clearing_severity;
///
/// assert!(is_clearing_severity("OK"));
/// assert!(is_clearing_severity("MAJOR_ACK"));
/// assert!(!is_clearing_severity("MAJOR"));
/// ```
pub fn is_clearing_severity(severity: &str) -> bool {
    severity == SEVERITY_OK || severity.ends_with(ACK_SUFFIX)
}

/// One alarm as tracked by the escalation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    id: String,
    severity: String,
    status: String,
    trigger_time: DateTime<Utc>,
    #[serde(default)]
    desktop_notified: bool,
    #[serde(default)]
    email_notified: bool,
}

impl AlarmRecord {
    /// Create a record stamped with the current time
    pub fn new(id: impl Into<String>, severity: impl Into<String>, status: impl Into<String>) -> Self {
        Self::with_trigger_time(id, severity, status, Utc::now())
    }

    /// Create a record with an explicit trigger time
    pub fn with_trigger_time(
        id: impl Into<String>,
        severity: impl Into<String>,
        status: impl Into<String>,
        trigger_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            severity: severity.into(),
            status: status.into(),
            trigger_time,
            desktop_notified: false,
            email_notified: false,
        }
    }

    /// Process variable name
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Alarm severity as reported, e.g. `MAJOR` or `MINOR_ACK`
    pub fn severity(&self) -> &str {
        &self.severity
    }

    /// Alarm status as reported, e.g. `HIHI`
    pub fn status(&self) -> &str {
        &self.status
    }

    /// When the alarm was first raised in this episode
    pub fn trigger_time(&self) -> DateTime<Utc> {
        self.trigger_time
    }

    /// A desktop popup has been dispatched for this alarm
    pub fn desktop_notified(&self) -> bool {
        self.desktop_notified
    }

    /// An e-mail has been dispatched for this alarm
    pub fn email_notified(&self) -> bool {
        self.email_notified
    }

    /// Whether this record resolves the alarm rather than raising it
    pub fn is_clearing(&self) -> bool {
        is_clearing_severity(&self.severity)
    }

    /// Take over severity and status from `newer`, but only if it was
    /// triggered strictly later than this record.
    ///
    /// Trigger time and notification flags are left untouched. Returns
    /// whether anything was applied.
    pub fn update(&mut self, newer: &AlarmRecord) -> bool {
        if self.trigger_time < newer.trigger_time {
            self.severity.clone_from(&newer.severity);
            self.status.clone_from(&newer.status);
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_desktop_notified(&mut self) {
        self.desktop_notified = true;
    }

    pub(crate) fn mark_email_notified(&mut self) {
        self.email_notified = true;
    }
}

impl fmt::Display for AlarmRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PV: {}  Severity: {}  Status: {}  Time: {}",
            self.id,
            self.severity,
            self.status,
            self.trigger_time.timestamp()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_clearing_predicate() {
        assert!(is_clearing_severity("OK"));
        assert!(is_clearing_severity("MINOR_ACK"));
        assert!(is_clearing_severity("_ACK"));
        assert!(!is_clearing_severity("ACK"));
        assert!(!is_clearing_severity("ok"));
        assert!(!is_clearing_severity("INVALID"));
        assert!(!is_clearing_severity(""));
    }

    #[test]
    fn test_update_only_applies_newer_records() {
        let mut record = AlarmRecord::with_trigger_time("PV1", "MINOR", "HIGH", at(100));

        let stale = AlarmRecord::with_trigger_time("PV1", "MAJOR", "HIHI", at(100));
        assert!(!record.update(&stale));
        assert_eq!(record.severity(), "MINOR");
        assert_eq!(record.status(), "HIGH");

        let newer = AlarmRecord::with_trigger_time("PV1", "MAJOR", "HIHI", at(101));
        assert!(record.update(&newer));
        assert_eq!(record.severity(), "MAJOR");
        assert_eq!(record.status(), "HIHI");
        // trigger time is kept
        assert_eq!(record.trigger_time(), at(100));
    }

    #[test]
    fn test_update_keeps_notification_flags() {
        let mut record = AlarmRecord::with_trigger_time("PV1", "MINOR", "HIGH", at(100));
        record.mark_desktop_notified();

        let newer = AlarmRecord::with_trigger_time("PV1", "MAJOR", "HIHI", at(200));
        record.update(&newer);

        assert!(record.desktop_notified());
        assert!(!record.email_notified());
    }

    #[test]
    fn test_display() {
        let record = AlarmRecord::with_trigger_time("PV1", "MAJOR", "HIHI", at(1000));
        assert_eq!(
            record.to_string(),
            "PV: PV1  Severity: MAJOR  Status: HIHI  Time: 1000"
        );
    }
}
