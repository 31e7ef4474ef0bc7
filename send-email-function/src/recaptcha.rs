use crate::{
    form::{FormFields, RECAPTCHA_TOKEN_FIELD},
    settings::{ReCaptchaSettings, Settings},
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[async_trait]
pub trait ReCaptchaVerifier: Send + Sync {
    async fn verify_token(&self, secret: &str, token: &str) -> Result<(), ReCaptchaError>;
}

/// Decides whether the submitter passed the reCAPTCHA challenge.
///
/// Every failure, including an unreachable or misbehaving verification service, counts as
/// "not verified". There are no retries.
pub async fn verify_recaptcha(
    fields: &FormFields,
    settings: &Settings,
    verifier: &impl ReCaptchaVerifier,
) -> bool {
    if !settings.verification_required() {
        return true;
    }
    let Some(token) = fields
        .get(RECAPTCHA_TOKEN_FIELD)
        .filter(|token| !token.trim().is_empty())
    else {
        warn!("Request has no reCAPTCHA token");
        return false;
    };
    match verifier
        .verify_token(&settings.recaptcha_secret, token)
        .await
    {
        Ok(()) => true,
        Err(error) => {
            warn!("ReCAPTCHA verification failed: {error}");
            false
        }
    }
}

pub struct HttpReCaptchaVerifier {
    client: Client,
    verify_url: String,
}

impl HttpReCaptchaVerifier {
    pub fn new(settings: &ReCaptchaSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(settings.timeout).build()?,
            verify_url: settings.verify_url.clone(),
        })
    }
}

#[async_trait]
impl ReCaptchaVerifier for HttpReCaptchaVerifier {
    async fn verify_token(&self, secret: &str, token: &str) -> Result<(), ReCaptchaError> {
        debug!("Verifying reCAPTCHA token against {}", self.verify_url);
        let response = self
            .client
            .post(&self.verify_url)
            .form(&SiteverifyPayload {
                secret,
                response: token,
            })
            .send()
            .await
            .map_err(ReCaptchaError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReCaptchaError::UnsuccessfulStatus(status));
        }
        let body = response.text().await.map_err(ReCaptchaError::Transport)?;
        if body.trim().is_empty() {
            return Err(ReCaptchaError::EmptyResponse);
        }
        let response_body: SiteverifyResponse =
            serde_json::from_str(&body).map_err(ReCaptchaError::InvalidResponse)?;
        if response_body.success == Some(true) {
            Ok(())
        } else {
            Err(ReCaptchaError::Rejected(response_body.error_codes))
        }
    }
}

#[derive(Serialize)]
struct SiteverifyPayload<'a> {
    secret: &'a str,
    response: &'a str,
}

#[derive(Deserialize)]
struct SiteverifyResponse {
    success: Option<bool>,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

#[derive(Debug)]
pub enum ReCaptchaError {
    Transport(reqwest::Error),
    UnsuccessfulStatus(StatusCode),
    EmptyResponse,
    InvalidResponse(serde_json::Error),
    Rejected(Vec<String>),
}

impl std::fmt::Display for ReCaptchaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReCaptchaError::Transport(error) => write!(f, "Could not reach verifier: {error}"),
            ReCaptchaError::UnsuccessfulStatus(status) => {
                write!(f, "Verifier responded with status {status}")
            }
            ReCaptchaError::EmptyResponse => write!(f, "Verifier sent an empty response"),
            ReCaptchaError::InvalidResponse(error) => {
                write!(f, "Verifier sent an unreadable response: {error}")
            }
            ReCaptchaError::Rejected(error_codes) => {
                write!(f, "Token rejected with error codes {error_codes:?}")
            }
        }
    }
}

impl std::error::Error for ReCaptchaError {}
