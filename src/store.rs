// src/store.rs
//! Shared map of currently active alarms.
//!
//! All access goes through one exclusive lock over the map together with the
//! oldest-active timestamp, so a scan always sees a consistent snapshot.
//! The lock is never held across an `.await`: callers scan and mark here,
//! then dispatch the returned copies elsewhere.

use crate::record::AlarmRecord;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// What an ingested record did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new alarm episode started
    Inserted,
    /// An active alarm took over newer severity/status
    Updated,
    /// A stale record for an active alarm was ignored
    Stale,
    /// A clearing record removed an active alarm
    Removed,
    /// A clearing record arrived for an alarm that was not active
    Ignored,
}

#[derive(Debug, Default)]
struct StoreInner {
    alarms: HashMap<String, AlarmRecord>,
    /// Trigger time of the record that opened the current episode.
    /// Set only on the empty -> non-empty transition, reset when the map
    /// drains; never recomputed as a running minimum.
    oldest_active: Option<DateTime<Utc>>,
}

/// Concurrent store of active alarms
///
/// Cloning yields another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct AlarmStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl AlarmStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event from the alarm server.
    pub fn ingest(&self, event: AlarmRecord) -> IngestOutcome {
        let mut inner = self.inner.lock();

        if event.is_clearing() {
            return match inner.alarms.remove(event.id()) {
                Some(_) => {
                    if inner.alarms.is_empty() {
                        inner.oldest_active = None;
                    }
                    debug!("Alarm {} cleared ({})", event.id(), event.severity());
                    IngestOutcome::Removed
                }
                None => {
                    trace!("Clearing event for inactive alarm {}", event.id());
                    IngestOutcome::Ignored
                }
            };
        }

        if inner.oldest_active.is_none() {
            inner.oldest_active = Some(event.trigger_time());
        }

        if let Some(active) = inner.alarms.get_mut(event.id()) {
            if active.update(&event) {
                debug!("Alarm {} updated to {}", event.id(), event.severity());
                IngestOutcome::Updated
            } else {
                trace!("Ignoring stale event for alarm {}", event.id());
                IngestOutcome::Stale
            }
        } else {
            debug!("Alarm {} raised ({})", event.id(), event.severity());
            inner.alarms.insert(event.id().to_string(), event);
            IngestOutcome::Inserted
        }
    }

    /// Number of active alarms
    pub fn count(&self) -> usize {
        self.inner.lock().alarms.len()
    }

    /// Whether no alarm is active
    pub fn is_empty(&self) -> bool {
        self.inner.lock().alarms.is_empty()
    }

    /// Trigger time of the alarm that opened the current episode, or `None`
    /// when no alarm is active
    pub fn oldest_active(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().oldest_active
    }

    /// Copy of one active alarm
    pub fn get(&self, id: &str) -> Option<AlarmRecord> {
        self.inner.lock().alarms.get(id).cloned()
    }

    /// Copies of all active alarms, ordered by id
    pub fn snapshot(&self) -> Vec<AlarmRecord> {
        let inner = self.inner.lock();
        let mut records: Vec<_> = inner.alarms.values().cloned().collect();
        records.sort_by(|a, b| a.id().cmp(b.id()));
        records
    }

    /// Select and mark the alarms due for a desktop notification.
    ///
    /// A record is due when it has not been shown yet in this episode and
    /// its own trigger time plus `timeout` has passed. Returned records are
    /// copies taken after marking.
    pub fn prepare_desktop_batch(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<AlarmRecord> {
        let mut inner = self.inner.lock();
        let mut batch = Vec::new();
        for record in inner.alarms.values_mut() {
            if record.trigger_time() + timeout <= now && !record.desktop_notified() {
                record.mark_desktop_notified();
                batch.push(record.clone());
            }
        }
        batch.sort_by(|a, b| a.id().cmp(b.id()));
        batch
    }

    /// Select and mark every active alarm that has not been e-mailed yet.
    pub fn prepare_email_batch(&self) -> Vec<AlarmRecord> {
        let mut inner = self.inner.lock();
        let mut batch = Vec::new();
        for record in inner.alarms.values_mut() {
            if !record.email_notified() {
                record.mark_email_notified();
                batch.push(record.clone());
            }
        }
        batch.sort_by(|a, b| a.id().cmp(b.id()));
        batch
    }

    /// Whether an episode is running and at least `timeout` has passed
    /// since it opened
    pub fn episode_elapsed(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let inner = self.inner.lock();
        match inner.oldest_active {
            Some(oldest) => !inner.alarms.is_empty() && oldest + timeout <= now,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn alarm(id: &str, severity: &str, secs: i64) -> AlarmRecord {
        AlarmRecord::with_trigger_time(id, severity, "STATE_ALARM", at(secs))
    }

    #[test]
    fn test_first_alarm_opens_episode() {
        let store = AlarmStore::new();
        assert_eq!(store.ingest(alarm("PV1", "MAJOR", 1000)), IngestOutcome::Inserted);
        assert_eq!(store.count(), 1);
        assert_eq!(store.oldest_active(), Some(at(1000)));
    }

    #[test]
    fn test_ack_suffix_clears() {
        let store = AlarmStore::new();
        store.ingest(alarm("PV1", "MAJOR", 1000));
        assert_eq!(store.ingest(alarm("PV1", "MAJOR_ACK", 1001)), IngestOutcome::Removed);
        assert_eq!(store.count(), 0);
        assert_eq!(store.oldest_active(), None);
    }

    #[test]
    fn test_clearing_unknown_alarm_is_noop() {
        let store = AlarmStore::new();
        store.ingest(alarm("PV1", "MINOR", 1000));
        assert_eq!(store.ingest(alarm("PV2", "OK", 1001)), IngestOutcome::Ignored);
        assert_eq!(store.count(), 1);
        assert_eq!(store.oldest_active(), Some(at(1000)));
    }

    #[test]
    fn test_second_alarm_keeps_oldest() {
        let store = AlarmStore::new();
        store.ingest(alarm("PV1", "MAJOR", 1000));
        store.ingest(alarm("PV2", "MINOR", 900));
        assert_eq!(store.oldest_active(), Some(at(1000)));
    }

    #[test]
    fn test_oldest_not_advanced_when_first_alarm_clears() {
        let store = AlarmStore::new();
        store.ingest(alarm("PV1", "MAJOR", 1000));
        store.ingest(alarm("PV2", "MAJOR", 2000));
        store.ingest(alarm("PV1", "OK", 2001));
        assert_eq!(store.count(), 1);
        assert_eq!(store.oldest_active(), Some(at(1000)));
    }

    #[test]
    fn test_episode_reset_after_drain() {
        let store = AlarmStore::new();
        store.ingest(alarm("PV1", "MAJOR", 1000));
        store.ingest(alarm("PV1", "OK", 1001));
        store.ingest(alarm("PV3", "MINOR", 5000));
        assert_eq!(store.oldest_active(), Some(at(5000)));
    }

    #[test]
    fn test_stale_update_rejected() {
        let store = AlarmStore::new();
        store.ingest(alarm("PV1", "MINOR", 1000));
        assert_eq!(store.ingest(alarm("PV1", "MAJOR", 1000)), IngestOutcome::Stale);
        assert_eq!(store.ingest(alarm("PV1", "MAJOR", 999)), IngestOutcome::Stale);
        assert_eq!(store.get("PV1").unwrap().severity(), "MINOR");

        assert_eq!(store.ingest(alarm("PV1", "MAJOR", 1001)), IngestOutcome::Updated);
        assert_eq!(store.get("PV1").unwrap().severity(), "MAJOR");
    }

    #[test]
    fn test_desktop_batch_marks_once() {
        let store = AlarmStore::new();
        store.ingest(alarm("PV2", "MAJOR", 100));

        let batch = store.prepare_desktop_batch(at(105), Duration::seconds(5));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id(), "PV2");
        assert!(batch[0].desktop_notified());
        assert!(store.get("PV2").unwrap().desktop_notified());

        assert!(store.prepare_desktop_batch(at(110), Duration::seconds(5)).is_empty());
    }

    #[test]
    fn test_desktop_batch_respects_record_age() {
        let store = AlarmStore::new();
        store.ingest(alarm("PV1", "MAJOR", 100));
        store.ingest(alarm("PV2", "MAJOR", 103));

        let batch = store.prepare_desktop_batch(at(105), Duration::seconds(5));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id(), "PV1");

        let batch = store.prepare_desktop_batch(at(108), Duration::seconds(5));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id(), "PV2");
    }

    #[test]
    fn test_email_batch_ignores_record_age() {
        let store = AlarmStore::new();
        store.ingest(alarm("PV1", "MAJOR", 100));
        store.ingest(alarm("PV2", "MAJOR", 10_000));

        let batch = store.prepare_email_batch();
        assert_eq!(batch.len(), 2);
        assert!(store.prepare_email_batch().is_empty());
    }

    #[test]
    fn test_new_episode_resets_flags() {
        let store = AlarmStore::new();
        store.ingest(alarm("PV1", "MAJOR", 100));
        assert_eq!(store.prepare_email_batch().len(), 1);

        store.ingest(alarm("PV1", "MAJOR_ACK", 101));
        store.ingest(alarm("PV1", "MAJOR", 102));
        assert_eq!(store.prepare_email_batch().len(), 1);
    }

    #[test]
    fn test_episode_elapsed() {
        let store = AlarmStore::new();
        assert!(!store.episode_elapsed(at(10_000), Duration::zero()));

        store.ingest(alarm("PV1", "MAJOR", 100));
        assert!(!store.episode_elapsed(at(104), Duration::seconds(5)));
        assert!(store.episode_elapsed(at(105), Duration::seconds(5)));
    }
}
