use crate::{
    form::{read_form, FormFields, FormReadError},
    mailer::{MailError, MailSender},
    recaptcha::{verify_recaptcha, ReCaptchaVerifier},
    redirect::resolve_redirect_url,
    response::ResponseDescriptor,
    settings::{ResponseMode, Settings},
    validation::{validate, ValidationError},
};
use lambda_http::{Body, Error, Request, Response};
use std::fmt::Display;
use tracing::{debug, error, info, warn};

/// Handles one contact form submission from start to finish.
pub struct SendEmailHandler<MailSenderT: MailSender, ReCaptchaVerifierT: ReCaptchaVerifier> {
    settings: Settings,
    mail_sender: MailSenderT,
    recaptcha_verifier: ReCaptchaVerifierT,
}

impl<MailSenderT: MailSender, ReCaptchaVerifierT: ReCaptchaVerifier>
    SendEmailHandler<MailSenderT, ReCaptchaVerifierT>
{
    pub fn new(
        settings: Settings,
        mail_sender: MailSenderT,
        recaptcha_verifier: ReCaptchaVerifierT,
    ) -> Self {
        Self {
            settings,
            mail_sender,
            recaptcha_verifier,
        }
    }

    pub async fn handle(&self, event: Request) -> Result<Response<Body>, Error> {
        let descriptor = match self.process(&event).await {
            Ok(descriptor) => descriptor,
            Err(error) => {
                error.log();
                error.into_descriptor()
            }
        };
        match descriptor.into_response() {
            Ok(response) => Ok(response),
            Err(error) => {
                error!("Unable to build response: {error}");
                Ok(ResponseDescriptor::ServerError.into_response()?)
            }
        }
    }

    /// Runs the request through validation, verification and sending, then picks the response.
    ///
    /// The message goes out before the redirect URL is resolved, so a missing redirect URL is
    /// reported for a message which was already sent.
    pub async fn process(&self, event: &Request) -> Result<ResponseDescriptor, SendEmailError> {
        let fields = read_form(event)
            .await
            .map_err(SendEmailError::InvalidFormData)?;
        self.process_fields(&fields).await
    }

    pub async fn process_fields(
        &self,
        fields: &FormFields,
    ) -> Result<ResponseDescriptor, SendEmailError> {
        let message = validate(fields, &self.settings).map_err(SendEmailError::Validation)?;
        debug!("Message from {} passed validation", message.from_address());
        if !verify_recaptcha(fields, &self.settings, &self.recaptcha_verifier).await {
            return Err(SendEmailError::VerificationFailed);
        }
        self.mail_sender
            .send(&message)
            .await
            .map_err(SendEmailError::SendFailure)?;
        info!("Email sent");
        self.resolve_response(fields)
    }

    fn resolve_response(&self, fields: &FormFields) -> Result<ResponseDescriptor, SendEmailError> {
        let redirect_url = resolve_redirect_url(fields, &self.settings);
        match (self.settings.response_mode, redirect_url) {
            (ResponseMode::Ok, Some(url)) => Ok(ResponseDescriptor::JsonRedirect(url.into())),
            (ResponseMode::Ok, None) => Ok(ResponseDescriptor::NoContent),
            (ResponseMode::Redirect, Some(url)) => Ok(ResponseDescriptor::HttpRedirect(url.into())),
            (ResponseMode::Redirect, None) => Err(SendEmailError::MissingRedirectUrl),
        }
    }
}

#[derive(Debug)]
pub enum SendEmailError {
    InvalidFormData(FormReadError),
    Validation(ValidationError),
    VerificationFailed,
    MissingRedirectUrl,
    SendFailure(MailError),
}

impl SendEmailError {
    pub fn log(&self) {
        match self {
            SendEmailError::InvalidFormData(error) => {
                warn!("Client error sending email: {error}");
            }
            SendEmailError::SendFailure(error) => {
                error!("Internal error sending email: {error}");
            }
            _ => warn!("Client error sending email: {self}"),
        }
    }

    /// What the client is told. Send failures carry no detail.
    pub fn into_descriptor(self) -> ResponseDescriptor {
        match self {
            SendEmailError::SendFailure(_) => ResponseDescriptor::ServerError,
            error => ResponseDescriptor::BadRequest(error.to_string()),
        }
    }
}

impl Display for SendEmailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendEmailError::InvalidFormData(_) => write!(f, "Invalid form data."),
            SendEmailError::Validation(error) => error.fmt(f),
            SendEmailError::VerificationFailed => {
                write!(f, "ReCAPTCHA verification failed. Please try again.")
            }
            SendEmailError::MissingRedirectUrl => write!(f, "Missing redirect URL"),
            SendEmailError::SendFailure(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for SendEmailError {}
