// src/bus.rs
//! Alarm server bus client.
//!
//! The alarm server publishes one map message per state change. Only
//! `TEXT == "STATE"` messages carry alarm transitions; everything else
//! (idle heartbeats, acknowledgement commands) is dropped here before it
//! reaches the engine.

use crate::error::Result;
use crate::record::AlarmRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[cfg(feature = "mqtt")]
pub use self::mqtt::MqttBusClient;

/// Receiver of parsed alarm events
pub trait AlarmSink: Send + Sync {
    /// Hand over one well-formed alarm event
    fn ingest(&self, event: AlarmRecord);
}

/// Message kind carrying an alarm state change
pub const STATE_TEXT: &str = "STATE";
/// Address prefix the alarm server puts in front of channel names
pub const ADDRESS_PREFIX: &str = "epics://";

/// Raw alarm server message, a flat map of string fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateMessage {
    fields: HashMap<String, String>,
}

impl StateMessage {
    /// Message without any fields
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a JSON object payload as published on the bus
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Add or replace one field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Value of one field, if present
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Convert a state message into an alarm event stamped with
    /// `received`. Returns `None` for any other message kind or when a
    /// required field is missing.
    pub fn to_record(&self, received: DateTime<Utc>) -> Option<AlarmRecord> {
        if self.field("TEXT") != Some(STATE_TEXT) {
            return None;
        }

        let (Some(name), Some(severity), Some(status)) = (
            self.field("NAME"),
            self.field("SEVERITY"),
            self.field("STATUS"),
        ) else {
            debug!("Dropping incomplete state message: {:?}", self.fields);
            return None;
        };

        let id = name.strip_prefix(ADDRESS_PREFIX).unwrap_or(name);
        Some(AlarmRecord::with_trigger_time(id, severity, status, received))
    }
}

#[cfg(feature = "mqtt")]
mod mqtt {
    use super::{AlarmSink, StateMessage};
    use crate::clock::Clock;
    use crate::config::BusConfig;
    use crate::error::{AlarmError, Result};
    use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::{debug, error, info, warn};

    const RETRY_DELAY: Duration = Duration::from_secs(1);

    /// Subscribes to the alarm topic on an MQTT broker and feeds accepted
    /// state messages into an [`AlarmSink`]
    pub struct MqttBusClient {
        client: AsyncClient,
        eventloop: EventLoop,
        config: BusConfig,
        sink: Arc<dyn AlarmSink>,
        clock: Arc<dyn Clock>,
        running: Arc<AtomicBool>,
    }

    impl MqttBusClient {
        /// Set up the connection; nothing is sent before [`run`](Self::run)
        pub fn new(
            config: BusConfig,
            sink: Arc<dyn AlarmSink>,
            clock: Arc<dyn Clock>,
            running: Arc<AtomicBool>,
        ) -> Self {
            let mut options = MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
            options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
            if let (Some(username), Some(password)) = (&config.username, &config.password) {
                options.set_credentials(username, password);
            }

            let (client, eventloop) = AsyncClient::new(options, 100);
            Self {
                client,
                eventloop,
                config,
                sink,
                clock,
                running,
            }
        }

        /// Receive until the running flag is cleared
        pub async fn run(mut self) -> Result<()> {
            info!(
                "Connecting to alarm server bus {}:{} (topic {})",
                self.config.broker_host, self.config.broker_port, self.config.topic
            );
            self.client
                .subscribe(&self.config.topic, QoS::AtLeastOnce)
                .await
                .map_err(|e| AlarmError::Bus(format!("Cannot subscribe to {}: {}", self.config.topic, e)))?;

            while self.running.load(Ordering::SeqCst) {
                match self.eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        self.handle_payload(&publish.payload);
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to alarm server bus");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Alarm server bus connection error: {}", e);
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }

            if let Err(e) = self.client.disconnect().await {
                debug!("Bus disconnect failed: {}", e);
            }
            info!("Alarm server bus client stopped");
            Ok(())
        }

        fn handle_payload(&self, payload: &[u8]) {
            let message = match StateMessage::from_json(payload) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Dropping malformed bus message: {}", e);
                    return;
                }
            };

            if let Some(record) = message.to_record(self.clock.now()) {
                debug!("Received {}", record);
                self.sink.ingest(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AlarmError;
    use chrono::TimeZone;

    fn received() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn state(name: &str) -> StateMessage {
        StateMessage::new()
            .with_field("TEXT", "STATE")
            .with_field("NAME", name)
            .with_field("SEVERITY", "MAJOR")
            .with_field("STATUS", "HIHI")
    }

    #[test]
    fn test_state_message_becomes_record() {
        let record = state("epics://DET:HV:1").to_record(received()).unwrap();
        assert_eq!(record.id(), "DET:HV:1");
        assert_eq!(record.severity(), "MAJOR");
        assert_eq!(record.status(), "HIHI");
        assert_eq!(record.trigger_time(), received());
    }

    #[test]
    fn test_name_without_prefix_kept() {
        let record = state("DET:TEMP").to_record(received()).unwrap();
        assert_eq!(record.id(), "DET:TEMP");
    }

    #[test]
    fn test_idle_message_dropped() {
        let idle = StateMessage::new().with_field("TEXT", "IDLE");
        assert!(idle.to_record(received()).is_none());

        let mut msg = state("PV1");
        msg = msg.with_field("TEXT", "ACK");
        assert!(msg.to_record(received()).is_none());
    }

    #[test]
    fn test_missing_field_dropped() {
        let msg = StateMessage::new()
            .with_field("TEXT", "STATE")
            .with_field("NAME", "PV1")
            .with_field("SEVERITY", "MAJOR");
        assert!(msg.to_record(received()).is_none());
    }

    #[test]
    fn test_malformed_payload_is_json_error() {
        let err = StateMessage::from_json(b"{\"TEXT\": 42").unwrap_err();
        assert!(matches!(err, AlarmError::Json(_)));

        let err = StateMessage::from_json(b"[\"STATE\"]").unwrap_err();
        assert!(matches!(err, AlarmError::Json(_)));
    }

    #[test]
    fn test_decode_json_payload() {
        let payload = r#"{"TEXT":"STATE","NAME":"epics://PV1","SEVERITY":"MINOR_ACK","STATUS":"LOW","HOST":"ioc1"}"#;
        let msg = StateMessage::from_json(payload.as_bytes()).unwrap();
        let record = msg.to_record(received()).unwrap();
        assert_eq!(record.id(), "PV1");
        assert!(record.is_clearing());
    }
}
