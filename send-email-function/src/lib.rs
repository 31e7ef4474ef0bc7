pub mod form;
pub mod handler;
pub mod mailer;
pub mod recaptcha;
pub mod redirect;
pub mod response;
pub mod secrets;
pub mod settings;
pub mod validation;
