use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::config::{MailConfig, MailProvider};

/// Email delivery capability.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()>;
}

/// Delivers through the SendGrid v3 HTTP API.
pub struct SendGridMailer {
    http: reqwest::Client,
    api_key: String,
    from: String,
}

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        let body = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from },
            "subject": subject,
            "content": [{ "type": "text/html", "value": html }],
        });
        self.http
            .post(SENDGRID_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("sendgrid request")?
            .error_for_status()
            .context("sendgrid response")?;
        info!(%to, %subject, "email sent");
        Ok(())
    }
}

/// Drops mails after logging the envelope. Bodies carry one-time tokens and
/// never reach the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        info!(%to, %subject, body_len = html.len(), "email (log provider)");
        Ok(())
    }
}

pub fn from_config(cfg: &MailConfig) -> anyhow::Result<Box<dyn Mailer>> {
    match cfg.provider {
        MailProvider::Log => Ok(Box::new(LogMailer)),
        MailProvider::SendGrid => {
            let api_key = cfg
                .api_key
                .clone()
                .context("sendgrid api key missing")?;
            Ok(Box::new(SendGridMailer {
                http: reqwest::Client::new(),
                api_key,
                from: cfg.from.clone(),
            }))
        }
    }
}

pub fn verification_email(client_url: &str, token: &str) -> (String, String) {
    let link = format!("{}/verify-email?token={}", client_url, token);
    (
        "Email Verification".to_string(),
        format!(
            "<p> Click <a href=\"{}\">here</a> to verify your email. This link will expire in 1 hour.</p>",
            link
        ),
    )
}

pub fn reset_password_email(client_url: &str, token: &str) -> (String, String) {
    let link = format!("{}/reset-password?token={}", client_url, token);
    (
        "Reset your password".to_string(),
        format!("<p>Click <a href=\"{}\">here</a> to reset your password</p>", link),
    )
}

pub fn workspace_invite_email(
    client_url: &str,
    workspace_id: uuid::Uuid,
    workspace_name: &str,
    token: &str,
) -> (String, String) {
    let link = format!("{}/workspace-invite/{}?tk={}", client_url, workspace_id, token);
    (
        "You have been invited to join a workspace".to_string(),
        format!(
            "<p>You have been invited to join {}</p><p>Click here to join: <a href=\"{}\">{}</a></p>",
            workspace_name, link, link
        ),
    )
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct SentMail {
        pub to: String,
        pub subject: String,
        pub html: String,
    }

    /// Keeps every mail in memory; `fail` simulates a provider outage.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<SentMail>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("mail provider unavailable");
            }
            self.sent.lock().unwrap().push(SentMail {
                to: to.into(),
                subject: subject.into(),
                html: html.into(),
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingMailer;
    use super::*;

    #[test]
    fn verification_link_embeds_token() {
        let (subject, html) = verification_email("http://app.local", "abc.def.ghi");
        assert_eq!(subject, "Email Verification");
        assert!(html.contains("http://app.local/verify-email?token=abc.def.ghi"));
    }

    #[test]
    fn invite_link_points_at_workspace() {
        let ws = uuid::Uuid::new_v4();
        let (_, html) = workspace_invite_email("http://app.local", ws, "Acme", "tok");
        assert!(html.contains(&format!("/workspace-invite/{}?tk=tok", ws)));
        assert!(html.contains("Acme"));
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn log_mailer_keeps_tokens_out_of_logs() {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (subject, html) = verification_email("http://app.local", "secret-token-123");
        LogMailer.send("a@b.io", &subject, &html).await.unwrap();

        let logged = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("Email Verification"), "{logged}");
        assert!(logged.contains("a@b.io"));
        assert!(!logged.contains("secret-token-123"), "{logged}");
    }

    #[tokio::test]
    async fn recording_mailer_captures_and_fails_on_demand() {
        let ok = RecordingMailer::default();
        ok.send("a@b.io", "hi", "<p>x</p>").await.unwrap();
        assert_eq!(ok.sent.lock().unwrap().len(), 1);

        let broken = RecordingMailer {
            fail: true,
            ..Default::default()
        };
        assert!(broken.send("a@b.io", "hi", "x").await.is_err());
    }
}
