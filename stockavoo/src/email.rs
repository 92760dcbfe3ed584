//! Outbound account email: verification, welcome, password reset and invitation.
//!
//! Delivery goes through the [`Mailer`] trait so the HTTP layer can be tested against a
//! recording implementation. [`EmailService`] is the lettre-backed one used in production.
//!
//! Every message in this module is best-effort from the caller's point of view: use
//! [`dispatch`] to send without holding up (or failing) the request that triggered it.

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use tracing::{Instrument, debug, info_span, warn};

use crate::{
    config::{EmailConfig, EmailTransportConfig},
    errors::Error,
};

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to_email: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), Error>;
}

/// Send `email` in the background. Failures are logged and otherwise ignored.
pub fn dispatch(mailer: Arc<dyn Mailer>, email: OutgoingEmail) {
    let span = info_span!("send_email", subject = %email.subject);
    tokio::spawn(
        async move {
            match mailer.send(email).await {
                Ok(()) => debug!("Email sent"),
                Err(e) => warn!(error = %e, "Failed to send email"),
            }
        }
        .instrument(span),
    );
}

pub struct EmailService {
    transport: EmailTransport,
    from: Mailbox,
    reply_to: Option<Mailbox>,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

fn mailbox(name: Option<&str>, email: &str) -> Result<Mailbox, Error> {
    let address = email.parse().map_err(|e| Error::EmailDelivery {
        message: format!("invalid address {email}: {e}"),
    })?;
    Ok(Mailbox::new(name.map(str::to_string), address))
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> Result<Self, Error> {
        let transport = match &config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        let reply_to = config.reply_to.as_deref().map(|addr| mailbox(None, addr)).transpose()?;

        Ok(Self {
            transport,
            from: mailbox(Some(&config.from_name), &config.from_email)?,
            reply_to,
        })
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn send(&self, email: OutgoingEmail) -> Result<(), Error> {
        let to = mailbox(email.to_name.as_deref(), &email.to_email)?;

        let mut builder = Message::builder().from(self.from.clone()).to(to).subject(email.subject);
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.clone());
        }
        let message = builder
            .multipart(MultiPart::alternative_plain_html(email.text, email.html))
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::EmailDelivery {
                    message: format!("SMTP: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::EmailDelivery {
                    message: format!("file transport: {e}"),
                })?;
            }
        }

        Ok(())
    }
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

/// Link lifetime in words: whole hours, then whole minutes, else humantime's rendering.
fn describe_lifetime(valid_for: Duration) -> String {
    let secs = valid_for.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        plural(secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        plural(secs / 60, "minute")
    } else {
        humantime::format_duration(valid_for).to_string()
    }
}

/// Builds account emails with links into the frontend at `client_url`.
#[derive(Debug, Clone)]
pub struct Templates {
    client_url: String,
}

impl Templates {
    pub fn new(client_url: &str) -> Self {
        Self {
            client_url: client_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn verification_url(&self, raw_token: &str) -> String {
        format!("{}/verify-email/{raw_token}", self.client_url)
    }

    pub fn reset_url(&self, raw_token: &str) -> String {
        format!("{}/reset-password/{raw_token}", self.client_url)
    }

    pub fn setup_url(&self, raw_token: &str) -> String {
        format!("{}/setup-password/{raw_token}", self.client_url)
    }

    pub fn verification(&self, to_name: &str, to_email: &str, raw_token: &str, valid_for: Duration) -> OutgoingEmail {
        let url = self.verification_url(raw_token);
        let expiry = describe_lifetime(valid_for);
        compose(
            to_name,
            to_email,
            "Verify Your Email - Stockavoo",
            &format!("Welcome, {to_name}!"),
            &[
                "Thank you for registering with Stockavoo! To get started, verify your email address.",
                &format!("This link expires in {expiry}."),
                "Didn't create an account? Ignore this email.",
            ],
            Some(("Verify Email Address", &url)),
        )
    }

    pub fn welcome(&self, to_name: &str, to_email: &str) -> OutgoingEmail {
        let dashboard = format!("{}/dashboard", self.client_url);
        compose(
            to_name,
            to_email,
            "Welcome to Stockavoo!",
            &format!("You're all set, {to_name}!"),
            &[
                "Your email has been verified and your Stockavoo account is ready.",
                "Add your first store and start tracking inventory from your dashboard.",
            ],
            Some(("Go to Dashboard", &dashboard)),
        )
    }

    pub fn password_reset(&self, to_name: &str, to_email: &str, raw_token: &str, valid_for: Duration) -> OutgoingEmail {
        let url = self.reset_url(raw_token);
        let expiry = describe_lifetime(valid_for);
        compose(
            to_name,
            to_email,
            "Reset Your Password - Stockavoo",
            &format!("Hello {to_name},"),
            &[
                "We received a request to reset your password.",
                &format!("This link expires in {expiry}."),
                "If you didn't request a password reset, you can safely ignore this email.",
            ],
            Some(("Reset Password", &url)),
        )
    }

    pub fn invitation(&self, to_name: &str, to_email: &str, raw_token: &str, valid_for: Duration) -> OutgoingEmail {
        let url = self.setup_url(raw_token);
        let expiry = describe_lifetime(valid_for);
        compose(
            to_name,
            to_email,
            "You have been invited to Stockavoo",
            &format!("Hello {to_name},"),
            &[
                &format!("An account has been created for you on Stockavoo with the email {to_email}."),
                "Set your password to finish setting up your account.",
                &format!("This link expires in {expiry}."),
            ],
            Some(("Set Up Your Account", &url)),
        )
    }
}

fn compose(
    to_name: &str,
    to_email: &str,
    subject: &str,
    heading: &str,
    paragraphs: &[&str],
    action: Option<(&str, &str)>,
) -> OutgoingEmail {
    let mut text = format!("{heading}\n\n");
    let mut body = String::new();
    for paragraph in paragraphs {
        text.push_str(paragraph);
        text.push_str("\n\n");
        body.push_str(&format!("        <p>{paragraph}</p>\n"));
    }
    if let Some((label, url)) = action {
        text.push_str(&format!("{label}: {url}\n"));
        body.push_str(&format!(
            "        <p><a class=\"button\" href=\"{url}\">{label}</a></p>\n        <p>Or copy this link: {url}</p>\n"
        ));
    }
    text.push_str("\n- The Stockavoo Team\n");

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{subject}</title>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.5; color: #333; background-color: #f4f4f4; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 25px; background-color: #ffffff; }}
        .header {{ background: #4A1D66; color: #ffffff; padding: 15px 25px; }}
        .button {{ display: inline-block; padding: 12px 30px; background: #7C3E8C; color: #ffffff; text-decoration: none; border-radius: 5px; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #666; }}
    </style>
</head>
<body>
    <div class="header"><h1>Stockavoo</h1><p>Inventory Management</p></div>
    <div class="container">
        <h2>{heading}</h2>
{body}        <div class="footer">
            <p>This is an automated message, please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>"#
    );

    OutgoingEmail {
        to_email: to_email.to_string(),
        to_name: Some(to_name.to_string()),
        subject: subject.to_string(),
        html,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn templates() -> Templates {
        Templates::new("https://app.stockavoo.test/")
    }

    #[test]
    fn test_links_point_at_client() {
        let t = templates();
        assert_eq!(t.verification_url("abc"), "https://app.stockavoo.test/verify-email/abc");
        assert_eq!(t.reset_url("abc"), "https://app.stockavoo.test/reset-password/abc");
        assert_eq!(t.setup_url("abc"), "https://app.stockavoo.test/setup-password/abc");
    }

    #[test]
    fn test_verification_email_has_both_bodies() {
        let email = templates().verification("Jane Doe", "jane@x.com", "tok123", Duration::from_secs(24 * 3600));
        assert_eq!(email.subject, "Verify Your Email - Stockavoo");
        assert_eq!(email.to_email, "jane@x.com");
        for body in [&email.html, &email.text] {
            assert!(body.contains("https://app.stockavoo.test/verify-email/tok123"));
            assert!(body.contains("Jane Doe"));
            assert!(body.contains("This link expires in 24 hours."));
        }
    }

    #[test]
    fn test_lifetimes_read_as_words() {
        assert_eq!(describe_lifetime(Duration::from_secs(24 * 3600)), "24 hours");
        assert_eq!(describe_lifetime(Duration::from_secs(3600)), "1 hour");
        assert_eq!(describe_lifetime(Duration::from_secs(30 * 60)), "30 minutes");
        assert_eq!(describe_lifetime(Duration::from_secs(90)), "1m 30s");

        let reset = templates().password_reset("Jane", "jane@x.com", "r1", Duration::from_secs(3600));
        assert!(reset.text.contains("This link expires in 1 hour."));
    }

    #[test]
    fn test_invitation_links_to_setup() {
        let email = templates().invitation("Sam", "sam@x.com", "setup1", Duration::from_secs(3600));
        assert!(email.text.contains("/setup-password/setup1"));
        assert!(email.text.contains("sam@x.com"));
        assert!(!email.text.contains("/verify-email/"));
    }

    #[tokio::test]
    async fn test_file_transport_writes_message() {
        let dir = TempDir::new().unwrap();
        let config = EmailConfig {
            transport: EmailTransportConfig::File {
                path: dir.path().to_string_lossy().to_string(),
            },
            reply_to: Some("support@stockavoo.com".to_string()),
            ..Default::default()
        };
        let service = EmailService::new(&config).unwrap();

        let email = templates().welcome("Jane", "jane@x.com");
        service.send(email).await.unwrap();

        let written: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(written.len(), 1);
    }

    #[test]
    fn test_invalid_sender_is_rejected() {
        let config = EmailConfig {
            from_email: "not-an-address".to_string(),
            transport: EmailTransportConfig::File {
                path: std::env::temp_dir().join("stockavoo-invalid-sender").to_string_lossy().to_string(),
            },
            ..Default::default()
        };
        assert!(EmailService::new(&config).is_err());
    }
}
