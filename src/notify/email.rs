// src/notify/email.rs
//! Alarm e-mails over SMTP.

use super::MailSender;
use crate::config::EmailConfig;
use crate::error::{AlarmError, Result};
use crate::record::AlarmRecord;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{Address, Message, SmtpTransport, Transport};
use tracing::info;

/// Subject line of every alarm e-mail
pub const MAIL_SUBJECT: &str = "Detector Control System Alarm";
const SENDER_NAME: &str = "Alarm Notification Daemon";
const RECIPIENT_NAME: &str = "Alarm Notification Mailing List";

/// Sends alarm e-mails over plain SMTP
#[derive(Debug, Clone)]
pub struct SmtpMailSender {
    config: EmailConfig,
}

impl SmtpMailSender {
    /// Sender for the configured relay and addresses
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Build the message for `records` without sending it
    pub fn compose(&self, records: &[AlarmRecord]) -> Result<Message> {
        let from = mailbox(SENDER_NAME, &self.config.from)?;
        let to = mailbox(RECIPIENT_NAME, &self.config.to)?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(MAIL_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(compose_message_text(records))
            .map_err(|e| AlarmError::Mail(format!("Failed to build email: {}", e)))
    }
}

fn mailbox(name: &str, address: &str) -> Result<Mailbox> {
    let address: Address = address
        .parse()
        .map_err(|e| AlarmError::Mail(format!("Invalid email address '{}': {}", address, e)))?;
    Ok(Mailbox::new(Some(name.to_string()), address))
}

/// Body of an alarm e-mail
pub fn compose_message_text(records: &[AlarmRecord]) -> String {
    let mut text = String::from("Hello,\n\nthe following PV(s) triggered an alarm:\n\n");
    for record in records {
        text.push_str(record.id());
        text.push('\n');
    }
    text.push_str(
        "\nPlease remember to acknowledge the alarms if you go solving the problem.\n\n\nYour Alarm Notification Service\n",
    );
    text
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send_alarm_notification(&self, records: &[AlarmRecord]) -> Result<()> {
        let email = self.compose(records)?;
        let host = self.config.server_name.clone();
        let port = self.config.server_port;

        info!("Sending alarm notification for {} alarm(s) by e-mail", records.len());

        tokio::task::spawn_blocking(move || {
            let mailer = SmtpTransport::builder_dangerous(host.as_str()).port(port).build();
            mailer
                .send(&email)
                .map(|_| ())
                .map_err(|e| AlarmError::Mail(format!("Failed to send email via {}:{}: {}", host, port, e)))
        })
        .await
        .map_err(|e| AlarmError::Runtime(format!("E-mail task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            server_name: "smtp.lab".to_string(),
            server_port: 25,
            from: "alarms@lab.example".to_string(),
            to: "shift@lab.example".to_string(),
        }
    }

    #[test]
    fn test_message_text() {
        let records = vec![AlarmRecord::new("DET:HV:1", "MAJOR", "HIHI")];
        let text = compose_message_text(&records);
        assert!(text.starts_with("Hello,\n\nthe following PV(s) triggered an alarm:\n\nDET:HV:1\n"));
        assert!(text.ends_with("Your Alarm Notification Service\n"));
    }

    #[test]
    fn test_compose_sets_headers() {
        let sender = SmtpMailSender::new(config());
        let message = sender
            .compose(&[AlarmRecord::new("PV1", "MAJOR", "HIHI")])
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Detector Control System Alarm"));
        assert!(raw.contains("Alarm Notification Daemon"));
        assert!(raw.contains("shift@lab.example"));
    }

    #[test]
    fn test_invalid_address_is_mail_error() {
        let mut config = config();
        config.to = "not an address".to_string();
        let err = SmtpMailSender::new(config).compose(&[]).unwrap_err();
        assert!(matches!(err, AlarmError::Mail(_)));
    }
}
