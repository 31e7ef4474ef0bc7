use crate::{
    form::{FormFields, EMAIL_FIELD, MESSAGE_FIELD, NAME_FIELD, SUBJECT_FIELD},
    settings::Settings,
};
use lettre::{message::Mailbox, Address};
use std::fmt::Display;

/// A contact form submission that passed validation, ready to be mailed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    from: Mailbox,
    to: Mailbox,
    subject: String,
    body: String,
}

impl OutboundMessage {
    pub fn from_display_name(&self) -> &str {
        self.from.name.as_deref().unwrap_or_default()
    }

    pub fn from_address(&self) -> &Address {
        &self.from.email
    }

    /// The submitter as a mailbox, display name included.
    pub fn from_mailbox(&self) -> &Mailbox {
        &self.from
    }

    pub fn to(&self) -> &Mailbox {
        &self.to
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Turns raw form fields into a message. Checks run in a fixed order and the first failure wins.
pub fn validate(
    fields: &FormFields,
    settings: &Settings,
) -> Result<OutboundMessage, ValidationError> {
    let subject = fields.get(SUBJECT_FIELD);
    let (Some(name), Some(email), Some(message)) = (
        fields.get(NAME_FIELD),
        fields.get(EMAIL_FIELD),
        fields.get(MESSAGE_FIELD),
    ) else {
        return Err(ValidationError::MissingDetails);
    };
    if settings.subject_required && subject.is_none() {
        return Err(ValidationError::MissingDetails);
    }

    if is_blank(name)
        || is_blank(email)
        || (settings.subject_required && subject.is_some_and(is_blank))
        || is_blank(message)
    {
        return Err(ValidationError::BlankDetails);
    }

    let Some(address) = parse_address(email) else {
        return Err(ValidationError::InvalidEmail(email.into()));
    };

    let subject = match subject {
        Some(subject) if !is_blank(subject) => subject,
        _ => settings.fallback_subject.as_str(),
    };

    Ok(OutboundMessage {
        from: Mailbox::new(Some(name.into()), address),
        to: settings.recipient.clone(),
        subject: subject.into(),
        body: message.into(),
    })
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

// lettre accepts dotless domains such as `localhost`; a contact form sender needs a real one.
fn parse_address(email: &str) -> Option<Address> {
    let address: Address = email.parse().ok()?;
    let domain = address.domain();
    if domain.starts_with('.') || domain.ends_with('.') || !domain.contains('.') {
        return None;
    }
    Some(address)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingDetails,
    BlankDetails,
    InvalidEmail(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingDetails => write!(f, "Missing email details."),
            ValidationError::BlankDetails => write!(f, "Blank email details."),
            ValidationError::InvalidEmail(email) => {
                write!(f, "Invalid from email address '{email}'.")
            }
        }
    }
}

impl std::error::Error for ValidationError {}
