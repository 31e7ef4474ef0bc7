use lettre::message::Mailbox;
use std::{fmt::Display, time::Duration};

const DEFAULT_FALLBACK_SUBJECT: &str = "Email received";
const DEFAULT_SMTP_URL: &str = "smtps://email-smtp.eu-north-1.amazonaws.com";
const DEFAULT_SMTP_CREDENTIALS_SECRET: &str = "smtp-credentials";
const DEFAULT_RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const RECIPIENT: &str = "RECIPIENT";
const IS_SUBJECT_REQUIRED: &str = "IS_SUBJECT_REQUIRED";
const FALLBACK_SUBJECT: &str = "FALLBACK_SUBJECT";
const USE_REDIRECT_RESPONSE: &str = "USE_REDIRECT_RESPONSE";
const ALLOW_USER_REDIRECT_URLS: &str = "ALLOW_USER_REDIRECT_URLS";
const SUCCESS_REDIRECT_URL: &str = "SUCCESS_REDIRECT_URL";
const RECAPTCHA_SECRET: &str = "RECAPTCHA_SECRET";
const SMTP_URL: &str = "SMTP_URL";
const SMTP_CREDENTIALS_SECRET: &str = "SMTP_CREDENTIALS_SECRET";
const SMTP_TIMEOUT_SECS: &str = "SMTP_TIMEOUT_SECS";
const SENDER_ADDRESS: &str = "SENDER_ADDRESS";
const RECAPTCHA_VERIFY_URL: &str = "RECAPTCHA_VERIFY_URL";
const RECAPTCHA_TIMEOUT_SECS: &str = "RECAPTCHA_TIMEOUT_SECS";

/// How a successfully sent message is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// 200 with a JSON redirect pointer, or 204 when there is nowhere to go.
    Ok,
    /// 302 to the resolved redirect URL.
    Redirect,
}

/// Process-wide behaviour of the function. Loaded once at startup and only read afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    pub recipient: Mailbox,
    pub subject_required: bool,
    pub fallback_subject: String,
    pub response_mode: ResponseMode,
    pub allow_user_redirect_urls: bool,
    pub success_redirect_url: String,
    pub recaptcha_secret: String,
}

impl Settings {
    pub fn new(recipient: Mailbox) -> Self {
        Self {
            recipient,
            subject_required: false,
            fallback_subject: DEFAULT_FALLBACK_SUBJECT.into(),
            response_mode: ResponseMode::Ok,
            allow_user_redirect_urls: false,
            success_redirect_url: String::new(),
            recaptcha_secret: String::new(),
        }
    }

    pub fn from_env() -> Result<Self, EnvironmentError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EnvironmentError> {
        let Some(recipient) = non_blank(&lookup, RECIPIENT) else {
            return Err(EnvironmentError::MissingVariable(RECIPIENT));
        };
        let response_mode = if read_bool(&lookup, USE_REDIRECT_RESPONSE)? {
            ResponseMode::Redirect
        } else {
            ResponseMode::Ok
        };
        Ok(Self {
            recipient: read_mailbox(RECIPIENT, recipient)?,
            subject_required: read_bool(&lookup, IS_SUBJECT_REQUIRED)?,
            fallback_subject: non_blank(&lookup, FALLBACK_SUBJECT)
                .unwrap_or_else(|| DEFAULT_FALLBACK_SUBJECT.into()),
            response_mode,
            allow_user_redirect_urls: read_bool(&lookup, ALLOW_USER_REDIRECT_URLS)?,
            success_redirect_url: lookup(SUCCESS_REDIRECT_URL).unwrap_or_default(),
            recaptcha_secret: lookup(RECAPTCHA_SECRET).unwrap_or_default(),
        })
    }

    pub fn verification_required(&self) -> bool {
        !self.recaptcha_secret.is_empty()
    }

    pub fn with_subject_required(self, subject_required: bool) -> Self {
        Self {
            subject_required,
            ..self
        }
    }

    pub fn with_fallback_subject(self, fallback_subject: impl Into<String>) -> Self {
        Self {
            fallback_subject: fallback_subject.into(),
            ..self
        }
    }

    pub fn with_response_mode(self, response_mode: ResponseMode) -> Self {
        Self {
            response_mode,
            ..self
        }
    }

    pub fn with_user_redirect_urls_allowed(self, allow_user_redirect_urls: bool) -> Self {
        Self {
            allow_user_redirect_urls,
            ..self
        }
    }

    pub fn with_success_redirect_url(self, success_redirect_url: impl Into<String>) -> Self {
        Self {
            success_redirect_url: success_redirect_url.into(),
            ..self
        }
    }

    pub fn with_recaptcha_secret(self, recaptcha_secret: impl Into<String>) -> Self {
        Self {
            recaptcha_secret: recaptcha_secret.into(),
            ..self
        }
    }
}

/// Where and how outgoing mail is delivered.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub url: String,
    pub credentials_secret: String,
    pub timeout: Duration,
    /// When set, mail goes out from this mailbox and the submitter is put in `Reply-To`.
    pub sender: Option<Mailbox>,
}

impl SmtpSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials_secret: DEFAULT_SMTP_CREDENTIALS_SECRET.into(),
            timeout: DEFAULT_TIMEOUT,
            sender: None,
        }
    }

    pub fn from_env() -> Result<Self, EnvironmentError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EnvironmentError> {
        let sender = match non_blank(&lookup, SENDER_ADDRESS) {
            Some(sender) => Some(read_mailbox(SENDER_ADDRESS, sender)?),
            None => None,
        };
        Ok(Self {
            url: non_blank(&lookup, SMTP_URL).unwrap_or_else(|| DEFAULT_SMTP_URL.into()),
            credentials_secret: non_blank(&lookup, SMTP_CREDENTIALS_SECRET)
                .unwrap_or_else(|| DEFAULT_SMTP_CREDENTIALS_SECRET.into()),
            timeout: read_timeout(&lookup, SMTP_TIMEOUT_SECS)?,
            sender,
        })
    }

    pub fn uses_tls(&self) -> bool {
        self.url.starts_with("smtps://")
    }
}

#[derive(Debug, Clone)]
pub struct ReCaptchaSettings {
    pub verify_url: String,
    pub timeout: Duration,
}

impl ReCaptchaSettings {
    pub fn new(verify_url: impl Into<String>) -> Self {
        Self {
            verify_url: verify_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self, EnvironmentError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EnvironmentError> {
        Ok(Self {
            verify_url: non_blank(&lookup, RECAPTCHA_VERIFY_URL)
                .unwrap_or_else(|| DEFAULT_RECAPTCHA_VERIFY_URL.into()),
            timeout: read_timeout(&lookup, RECAPTCHA_TIMEOUT_SECS)?,
        })
    }
}

fn non_blank(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|value| !value.trim().is_empty())
}

fn read_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<bool, EnvironmentError> {
    let Some(value) = non_blank(lookup, name) else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(EnvironmentError::InvalidValue { name, value }),
    }
}

fn read_timeout(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Duration, EnvironmentError> {
    let Some(value) = non_blank(lookup, name) else {
        return Ok(DEFAULT_TIMEOUT);
    };
    match value.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds)),
        _ => Err(EnvironmentError::InvalidValue { name, value }),
    }
}

fn read_mailbox(name: &'static str, value: String) -> Result<Mailbox, EnvironmentError> {
    value
        .parse()
        .map_err(|_| EnvironmentError::InvalidValue { name, value })
}

#[derive(Debug)]
pub enum EnvironmentError {
    MissingVariable(&'static str),
    InvalidValue { name: &'static str, value: String },
    MissingSecret(String),
}

impl Display for EnvironmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentError::MissingVariable(name) => {
                write!(f, "Missing environment variable {name}")
            }
            EnvironmentError::InvalidValue { name, value } => {
                write!(f, "Invalid value '{value}' for environment variable {name}")
            }
            EnvironmentError::MissingSecret(name) => write!(f, "Missing secret {name}"),
        }
    }
}

impl std::error::Error for EnvironmentError {}
