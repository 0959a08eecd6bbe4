// src/notify/desktop.rs
//! Desktop popups via `notify-send`.

use super::DesktopNotifier;
use crate::error::{AlarmError, Result};
use crate::record::AlarmRecord;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

/// Summary line of every desktop popup
pub const NOTIFICATION_TITLE: &str = "Detector Alarm";

/// Shows alarms through a libnotify-compatible command line tool
#[derive(Debug, Clone)]
pub struct NotifySendPresenter {
    command: String,
}

impl NotifySendPresenter {
    /// Presenter running `command` instead of `notify-send`
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Arguments passed to the notification command for `records`
    pub fn arguments(records: &[AlarmRecord]) -> Vec<String> {
        vec![
            "-u".to_string(),
            "critical".to_string(),
            "-t".to_string(),
            "0".to_string(),
            "-i".to_string(),
            "dialog-warning".to_string(),
            NOTIFICATION_TITLE.to_string(),
            compose_notification_text(records),
        ]
    }
}

impl Default for NotifySendPresenter {
    fn default() -> Self {
        Self::new("notify-send")
    }
}

/// Body text of a desktop popup
pub fn compose_notification_text(records: &[AlarmRecord]) -> String {
    let mut text = String::from("Alarm on this/these PV(s):\n");
    for record in records {
        text.push_str(record.id());
        text.push('\n');
    }
    text
}

#[async_trait]
impl DesktopNotifier for NotifySendPresenter {
    async fn show(&self, records: &[AlarmRecord]) -> Result<()> {
        info!("Showing desktop notification for {} alarm(s)", records.len());

        let status = Command::new(&self.command)
            .args(Self::arguments(records))
            .status()
            .await
            .map_err(|e| AlarmError::Desktop(format!("Cannot run {}: {}", self.command, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(AlarmError::Desktop(format!("{} exited with {}", self.command, status)))
        }
    }

    async fn clear(&self) -> Result<()> {
        // notifications never expire; the user dismisses them
        debug!("No active alarms left on the desktop");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_text_lists_every_pv() {
        let records = vec![
            AlarmRecord::new("DET:HV:1", "MAJOR", "HIHI"),
            AlarmRecord::new("DET:TEMP", "MINOR", "HIGH"),
        ];
        assert_eq!(
            compose_notification_text(&records),
            "Alarm on this/these PV(s):\nDET:HV:1\nDET:TEMP\n"
        );
    }

    #[test]
    fn test_arguments_request_critical_sticky_popup() {
        let args = NotifySendPresenter::arguments(&[AlarmRecord::new("PV1", "MAJOR", "HIHI")]);
        assert_eq!(&args[..6], &["-u", "critical", "-t", "0", "-i", "dialog-warning"]);
        assert_eq!(args[6], NOTIFICATION_TITLE);
    }

    #[tokio::test]
    async fn test_missing_command_is_desktop_error() {
        let presenter = NotifySendPresenter::new("/nonexistent/notify-send");
        let err = presenter
            .show(&[AlarmRecord::new("PV1", "MAJOR", "HIHI")])
            .await
            .unwrap_err();
        assert!(matches!(err, AlarmError::Desktop(_)));
    }
}
