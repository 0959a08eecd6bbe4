// src/config.rs - Service configuration loaded from YAML

use crate::error::{AlarmError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that points at an alternative configuration file
pub const CONFIG_ENV_VAR: &str = "ALARMNOTIFICATIONSCONFIG";

/// Per-user configuration file, relative to `$HOME`
pub const USER_CONFIG_FILE: &str = ".alarmnotifications.yaml";

/// System-wide fallback configuration file
pub const SYSTEM_CONFIG_FILE: &str = "/etc/alarmnotifications.yaml";

// ============================================================================
// MAIN CONFIGURATION
// ============================================================================

/// Main alarm-notify configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Escalation timeouts
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Alarm bus connection
    #[serde(default)]
    pub bus: BusConfig,

    /// SMTP settings for alarm e-mails
    #[serde(default)]
    pub email: EmailConfig,

    /// Flashlight relay
    #[serde(default)]
    pub flashlight: FlashlightConfig,

    /// Desktop notification commands
    #[serde(default)]
    pub desktop: DesktopConfig,

    /// Daemon heartbeat
    #[serde(default)]
    pub daemon: DaemonConfig,
}

// ============================================================================
// SECTIONS
// ============================================================================

/// Timeouts after which each channel fires, measured from the oldest
/// active alarm. A timeout of 0 disables the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Flashlight in the laboratory
    #[serde(default)]
    pub laboratory_timeout_secs: u32,

    /// Desktop popups
    #[serde(default)]
    pub desktop_timeout_secs: u32,

    /// Alarm e-mails to the mailing list
    #[serde(default)]
    pub email_timeout_secs: u32,

    /// How often the escalation actors look at the alarm store
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            laboratory_timeout_secs: 0,
            desktop_timeout_secs: 0,
            email_timeout_secs: 0,
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// MQTT broker carrying the alarm server messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Broker host name
    #[serde(default = "default_broker_host")]
    pub broker_host: String,

    /// Broker port
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,

    /// MQTT client identifier
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Login, used together with `password`
    #[serde(default)]
    pub username: Option<String>,

    /// Password for `username`
    #[serde(default)]
    pub password: Option<String>,

    /// Topic the alarm server publishes state changes on
    #[serde(default = "default_topic")]
    pub topic: String,

    /// MQTT keep-alive interval
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            broker_host: default_broker_host(),
            broker_port: default_broker_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            topic: default_topic(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

/// Plain SMTP delivery of alarm e-mails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP relay host
    #[serde(default)]
    pub server_name: String,

    /// SMTP relay port
    #[serde(default = "default_smtp_port")]
    pub server_port: u16,

    /// Sender address
    #[serde(default)]
    pub from: String,

    /// Mailing list address
    #[serde(default)]
    pub to: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            server_name: String::new(),
            server_port: default_smtp_port(),
            from: String::new(),
            to: String::new(),
        }
    }
}

/// Laboratory flashlight relay
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashlightConfig {
    /// Serial device node of the USB relay, e.g. `/dev/ttyUSB0`
    #[serde(default)]
    pub device_node: String,
}

/// Desktop session commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesktopConfig {
    /// libnotify-compatible popup command
    #[serde(default = "default_notify_command")]
    pub command: String,

    /// Command (program and arguments) that plays the sustained alert
    #[serde(default)]
    pub alert_command: Vec<String>,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            command: default_notify_command(),
            alert_command: Vec::new(),
        }
    }
}

/// Server daemon settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Interval of the active alarm count log line
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat(),
        }
    }
}

fn default_poll_interval() -> u64 { 1000 }
fn default_broker_host() -> String { "localhost".to_string() }
fn default_broker_port() -> u16 { 1883 }
fn default_client_id() -> String { "alarm-notify".to_string() }
fn default_topic() -> String { "ALARM".to_string() }
fn default_keep_alive() -> u64 { 30 }
fn default_smtp_port() -> u16 { 25 }
fn default_notify_command() -> String { "notify-send".to_string() }
fn default_heartbeat() -> u64 { 3 }

// ============================================================================
// LOADING & VALIDATION
// ============================================================================

impl Config {
    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AlarmError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Work out which configuration file to use.
    ///
    /// An explicit path wins, then `ALARMNOTIFICATIONSCONFIG`, then the
    /// per-user file in `$HOME` if it exists, then the system-wide file.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return PathBuf::from(path);
        }
        if let Some(home) = std::env::var_os("HOME") {
            let user = Path::new(&home).join(USER_CONFIG_FILE);
            if user.is_file() {
                return user;
            }
        }
        PathBuf::from(SYSTEM_CONFIG_FILE)
    }

    /// Reject channels enabled without the settings they need
    pub fn validate(&self) -> Result<()> {
        let n = &self.notifications;
        if n.poll_interval_ms == 0 {
            return Err(AlarmError::Config("poll_interval_ms must be greater than 0".into()));
        }
        if n.email_timeout_secs > 0 {
            if self.email.server_name.is_empty() {
                return Err(AlarmError::Config(
                    "email.server_name is required when e-mail notifications are enabled".into(),
                ));
            }
            if self.email.from.is_empty() || self.email.to.is_empty() {
                return Err(AlarmError::Config(
                    "email.from and email.to are required when e-mail notifications are enabled".into(),
                ));
            }
        }
        if n.laboratory_timeout_secs > 0 && self.flashlight.device_node.is_empty() {
            return Err(AlarmError::Config(
                "flashlight.device_node is required when laboratory notifications are enabled".into(),
            ));
        }
        if self.daemon.heartbeat_secs == 0 {
            return Err(AlarmError::Config("daemon.heartbeat_secs must be greater than 0".into()));
        }
        Ok(())
    }

    /// Poll interval of the escalation actors
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.notifications.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.notifications.desktop_timeout_secs, 0);
        assert_eq!(config.notifications.poll_interval_ms, 1000);
        assert_eq!(config.bus.broker_port, 1883);
        assert_eq!(config.bus.topic, "ALARM");
        assert_eq!(config.email.server_port, 25);
        assert_eq!(config.desktop.command, "notify-send");
        assert_eq!(config.daemon.heartbeat_secs, 3);
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
notifications:
  laboratory_timeout_secs: 60
  desktop_timeout_secs: 30
  email_timeout_secs: 300
bus:
  broker_host: alarms.lab
  topic: CSS_ALARM_SERVER
email:
  server_name: smtp.lab
  from: alarms@lab
  to: shift@lab
flashlight:
  device_node: /dev/ttyUSB0
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.notifications.laboratory_timeout_secs, 60);
        assert_eq!(config.bus.broker_host, "alarms.lab");
        assert_eq!(config.bus.topic, "CSS_ALARM_SERVER");
        assert_eq!(config.flashlight.device_node, "/dev/ttyUSB0");
    }

    #[test]
    fn test_email_requires_addresses() {
        let yaml = r#"
notifications:
  email_timeout_secs: 300
email:
  server_name: smtp.lab
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, AlarmError::Config(_)));
    }

    #[test]
    fn test_laboratory_requires_device() {
        let yaml = "notifications:\n  laboratory_timeout_secs: 10\n";
        assert!(matches!(Config::from_yaml(yaml), Err(AlarmError::Config(_))));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let yaml = "notifications:\n  poll_interval_ms: 0\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "notifications:\n  desktop_timeout_secs: 5").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.notifications.desktop_timeout_secs, 5);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::from_file("/nonexistent/alarmnotifications.yaml").unwrap_err();
        assert!(matches!(err, AlarmError::Config(_)));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = Config::resolve_path(Some(Path::new("/tmp/custom.yaml")));
        assert_eq!(path, PathBuf::from("/tmp/custom.yaml"));
    }
}
