use alarm_notify::record::is_clearing_severity;
use alarm_notify::{AlarmRecord, AlarmStore};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn severity() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("OK".to_string()),
        Just("MINOR".to_string()),
        Just("MAJOR".to_string()),
        Just("INVALID".to_string()),
        Just("MINOR_ACK".to_string()),
        Just("MAJOR_ACK".to_string()),
    ]
}

fn events() -> impl Strategy<Value = Vec<(String, String, i64)>> {
    prop::collection::vec(("PV[0-4]", severity(), 0i64..1000), 1..60)
}

proptest! {
    #[test]
    fn test_store_never_holds_clearing_records(events in events()) {
        let store = AlarmStore::new();
        for (id, sev, secs) in events {
            store.ingest(AlarmRecord::with_trigger_time(id, sev, "STATE_ALARM", at(secs)));
            prop_assert!(store.snapshot().iter().all(|r| !is_clearing_severity(r.severity())));
            prop_assert_eq!(store.oldest_active().is_none(), store.is_empty());
        }
    }

    #[test]
    fn test_oldest_is_first_trigger_of_episode(events in events()) {
        let store = AlarmStore::new();
        let mut episode_start = None;
        for (id, sev, secs) in events {
            let clearing = is_clearing_severity(&sev);
            store.ingest(AlarmRecord::with_trigger_time(id, sev, "STATE_ALARM", at(secs)));
            if store.is_empty() {
                episode_start = None;
            } else if !clearing && episode_start.is_none() {
                episode_start = Some(at(secs));
            }
            prop_assert_eq!(store.oldest_active(), episode_start);
        }
    }

    #[test]
    fn test_each_alarm_batched_at_most_once(events in events(), polls in prop::collection::vec(0i64..1200, 1..20)) {
        let store = AlarmStore::new();
        for (id, sev, secs) in events {
            store.ingest(AlarmRecord::with_trigger_time(id, sev, "STATE_ALARM", at(secs)));
        }

        let mut desktop = HashSet::new();
        let mut email = HashSet::new();
        for now in polls {
            for record in store.prepare_desktop_batch(at(now), Duration::seconds(30)) {
                prop_assert!(record.trigger_time() + Duration::seconds(30) <= at(now));
                prop_assert!(desktop.insert(record.id().to_string()));
            }
            for record in store.prepare_email_batch() {
                prop_assert!(email.insert(record.id().to_string()));
            }
        }
    }

    #[test]
    fn test_concurrent_batches_never_duplicate(count in 1usize..40) {
        let store = Arc::new(AlarmStore::new());
        for i in 0..count {
            store.ingest(AlarmRecord::with_trigger_time(format!("PV{}", i), "MAJOR", "HIHI", at(0)));
        }

        let batches = tokio_test::block_on(async {
            let mut handles = vec![];
            for _ in 0..4 {
                let store = Arc::clone(&store);
                handles.push(tokio::spawn(async move { store.prepare_email_batch() }));
            }
            let mut batches = vec![];
            for handle in handles {
                batches.push(handle.await.unwrap());
            }
            batches
        });

        let total: usize = batches.iter().map(Vec::len).sum();
        prop_assert_eq!(total, count);
    }
}
