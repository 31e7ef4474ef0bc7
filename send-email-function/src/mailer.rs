use crate::{secrets::SecretRepository, settings::SmtpSettings, validation::OutboundMessage};
use async_once_cell::OnceCell;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::{
        self,
        authentication::{Credentials, Mechanism},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Deserialize;
use std::fmt::Display;
use tracing::{debug, info};

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), MailError>;
}

/// Delivers messages through an SMTP relay.
///
/// The transport is set up on first use and kept for the lifetime of the process. A failed set-up
/// is retried on the next message.
pub struct SmtpMailSender<SecretRepositoryT: SecretRepository> {
    secrets_repository: SecretRepositoryT,
    settings: SmtpSettings,
    mailer: OnceCell<AsyncSmtpTransport<Tokio1Executor>>,
}

impl<SecretRepositoryT: SecretRepository> SmtpMailSender<SecretRepositoryT> {
    pub fn new(secrets_repository: SecretRepositoryT, settings: SmtpSettings) -> Self {
        Self {
            secrets_repository,
            settings,
            mailer: Default::default(),
        }
    }

    fn build_email(&self, message: &OutboundMessage) -> Result<Message, lettre::error::Error> {
        let builder = match self.settings.sender.as_ref() {
            Some(sender) => Message::builder()
                .from(sender.clone())
                .reply_to(message.from_mailbox().clone()),
            None => Message::builder().from(message.from_mailbox().clone()),
        };
        builder
            .to(message.to().clone())
            .subject(message.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body().to_string())
    }

    async fn initialise_mailer(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        info!("Connecting to SMTP server at {}", self.settings.url);
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::from_url(&self.settings.url)
            .map_err(MailError::Connect)?
            .authentication(vec![Mechanism::Plain])
            .timeout(Some(self.settings.timeout));

        // Credentials never go over a plaintext connection. A relay which requires them then
        // rejects the message instead.
        if self.settings.uses_tls() {
            let credentials: SmtpCredentials = self
                .secrets_repository
                .get_secret(&self.settings.credentials_secret)
                .await
                .map_err(MailError::Credentials)?;
            builder = builder.credentials(Credentials::new(
                credentials.username,
                credentials.password,
            ));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl<SecretRepositoryT: SecretRepository> MailSender for SmtpMailSender<SecretRepositoryT> {
    async fn send(&self, message: &OutboundMessage) -> Result<(), MailError> {
        let email = self.build_email(message).map_err(MailError::Build)?;
        let mailer = self
            .mailer
            .get_or_try_init(self.initialise_mailer())
            .await?;
        debug!("Sending message to {}", message.to());
        mailer.send(email).await.map_err(MailError::Send)?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct SmtpCredentials {
    #[serde(rename = "SMTP_USERNAME")]
    username: String,
    #[serde(rename = "SMTP_PASSWORD")]
    password: String,
}

#[derive(Debug)]
pub enum MailError {
    Connect(smtp::Error),
    Credentials(lambda_http::Error),
    Build(lettre::error::Error),
    Send(smtp::Error),
}

impl Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailError::Connect(error) => write!(f, "Unable to connect to SMTP server: {error}"),
            MailError::Credentials(error) => {
                write!(f, "Unable to retrieve SMTP credentials: {error}")
            }
            MailError::Build(error) => write!(f, "Error building message: {error}"),
            MailError::Send(error) => write!(f, "Error sending message: {error}"),
        }
    }
}

impl std::error::Error for MailError {}


#[cfg(test)]
mod tests {
    use super::{MailError, MailSender, SmtpMailSender};
    use crate::{
        form::FormFields,
        secrets::{
            test_support::{FakeSecretRepository, SMTP_CREDENTIALS_NAME},
            SecretRepository,
        },
        settings::{Settings, SmtpSettings},
        validation::{validate, OutboundMessage},
    };
    use googletest::prelude::*;
    use serial_test::serial;
    use std::{sync::OnceLock, time::Duration};
    use test_support::fake_smtp::{
        start_poisoned_smtp_server, FakeSmtpServer, POISONED_SMTP_PORT, SMTP_PORT,
    };
    use tokio::time::timeout;

    fn message() -> OutboundMessage {
        let settings = Settings::new("Site owner <to@test.com>".parse().unwrap());
        let fields = FormFields::from_iter([
            ("name", "Captain Test"),
            ("email", "test@test.com"),
            ("subject", "Ahoy"),
            ("message", "Test message!"),
        ]);
        validate(&fields, &settings).unwrap()
    }

    async fn mail_sender(settings: SmtpSettings) -> SmtpMailSender<FakeSecretRepository> {
        SmtpMailSender::new(FakeSecretRepository::open().await, settings)
    }

    fn formatted(email: lettre::Message) -> String {
        String::from_utf8(email.formatted()).unwrap()
    }

    #[googletest::test]
    #[tokio::test]
    async fn builds_plain_text_email_from_submitter() {
        let subject = mail_sender(SmtpSettings::new(format!("smtp://localhost:{SMTP_PORT}"))).await;

        let email = formatted(subject.build_email(&message()).unwrap());

        expect_that!(email, contains_substring("Captain Test"));
        expect_that!(email, contains_substring("<test@test.com>"));
        expect_that!(email, contains_substring("<to@test.com>"));
        expect_that!(email, contains_substring("Subject: Ahoy"));
        expect_that!(email, contains_substring("Content-Type: text/plain"));
        expect_that!(email, contains_substring("Test message!"));
        expect_that!(email, not(contains_substring("Reply-To")));
    }

    #[googletest::test]
    #[tokio::test]
    async fn puts_submitter_in_reply_to_when_sender_is_configured() {
        let settings = SmtpSettings {
            sender: Some("Contact form <noreply@test.com>".parse().unwrap()),
            ..SmtpSettings::new(format!("smtp://localhost:{SMTP_PORT}"))
        };
        let subject = mail_sender(settings).await;

        let email = formatted(subject.build_email(&message()).unwrap());

        expect_that!(email, contains_substring("<noreply@test.com>"));
        expect_that!(email, contains_substring("Reply-To: "));
        expect_that!(email, contains_substring("<test@test.com>"));
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn delivers_message_to_smtp_server() {
        init().await;
        let subject = mail_sender(SmtpSettings::new(format!("smtp://localhost:{SMTP_PORT}"))).await;

        let result = subject.send(&message()).await;

        expect_that!(result, ok(anything()));
        expect_that!(
            timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
            ok(ok(all!(
                contains_substring("Subject: Ahoy"),
                contains_substring("Test message!")
            )))
        );
    }

    #[tokio::test]
    #[serial]
    async fn fails_when_smtp_server_rejects_message() -> Result<()> {
        init().await;
        start_poisoned_smtp_server();
        let subject =
            mail_sender(SmtpSettings::new(format!("smtp://localhost:{POISONED_SMTP_PORT}"))).await;

        let result = subject.send(&message()).await;

        verify_that!(result, err(matches_pattern!(MailError::Send(anything()))))
    }

    #[tokio::test]
    #[serial]
    async fn fails_when_smtp_credentials_are_missing_for_tls() -> Result<()> {
        let subject =
            mail_sender(SmtpSettings::new(format!("smtps://localhost:{SMTP_PORT}"))).await;
        subject.secrets_repository.remove_secret(SMTP_CREDENTIALS_NAME);

        let result = subject.send(&message()).await;

        verify_that!(
            result,
            err(matches_pattern!(MailError::Credentials(anything())))
        )
    }

    #[tokio::test]
    #[serial]
    async fn does_not_fetch_credentials_without_tls() -> Result<()> {
        init().await;
        let subject = mail_sender(SmtpSettings::new(format!("smtp://localhost:{SMTP_PORT}"))).await;
        subject.secrets_repository.remove_secret(SMTP_CREDENTIALS_NAME);

        let result = subject.send(&message()).await;

        verify_that!(result, ok(anything()))
    }

    #[googletest::test]
    #[tokio::test]
    #[serial]
    async fn retries_set_up_after_credentials_become_available() {
        let subject =
            mail_sender(SmtpSettings::new(format!("smtps://localhost:{SMTP_PORT}"))).await;
        subject.secrets_repository.remove_secret(SMTP_CREDENTIALS_NAME);
        let first_result = subject.send(&message()).await;
        subject.secrets_repository.add_secret(
            SMTP_CREDENTIALS_NAME,
            r#"{"SMTP_USERNAME": "username", "SMTP_PASSWORD": "password"}"#,
        );

        let second_result = subject.send(&message()).await;

        expect_that!(
            first_result,
            err(matches_pattern!(MailError::Credentials(anything())))
        );
        // The fake server does not speak TLS, so getting as far as sending is the best outcome.
        expect_that!(
            second_result,
            err(matches_pattern!(MailError::Send(anything())))
        );
    }

    async fn init() {
        fake_smtp().start();
        fake_smtp().flush().await;
    }

    fn fake_smtp() -> &'static FakeSmtpServer {
        static FAKE_SMTP: OnceLock<FakeSmtpServer> = OnceLock::new();
        FAKE_SMTP.get_or_init(FakeSmtpServer::new)
    }
}
