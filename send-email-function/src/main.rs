use anyhow::Context;
use lambda_http::{run, service_fn, Error};
use send_email_function::{
    handler::SendEmailHandler,
    mailer::SmtpMailSender,
    recaptcha::HttpReCaptchaVerifier,
    secrets::{AwsSecretsManagerSecretRepository, SecretRepository},
    settings::{ReCaptchaSettings, Settings, SmtpSettings},
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let settings = Settings::from_env().context("Unable to read function settings")?;
    let smtp_settings = SmtpSettings::from_env().context("Unable to read SMTP settings")?;
    let recaptcha_settings =
        ReCaptchaSettings::from_env().context("Unable to read reCAPTCHA settings")?;
    info!(
        "Sending contact form messages to {} (reCAPTCHA {})",
        settings.recipient,
        if settings.verification_required() {
            "required"
        } else {
            "not required"
        }
    );

    let secrets_repository = AwsSecretsManagerSecretRepository::open().await;
    let recaptcha_verifier = HttpReCaptchaVerifier::new(&recaptcha_settings)
        .context("Unable to create reCAPTCHA client")?;
    let handler = SendEmailHandler::new(
        settings,
        SmtpMailSender::new(secrets_repository, smtp_settings),
        recaptcha_verifier,
    );
    run(service_fn(|event| handler.handle(event))).await
}
