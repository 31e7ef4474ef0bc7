use crate::{
    form::{FormFields, REDIRECT_URL_FIELD},
    settings::Settings,
};

/// Picks where to send the submitter after a successful send, if anywhere.
///
/// A `redirectUrl` field wins when user-supplied URLs are allowed, then the configured success
/// URL.
pub fn resolve_redirect_url<'a>(fields: &'a FormFields, settings: &'a Settings) -> Option<&'a str> {
    if settings.allow_user_redirect_urls {
        if let Some(url) = fields.get(REDIRECT_URL_FIELD).filter(|url| !url.is_empty()) {
            return Some(url);
        }
    }
    Some(settings.success_redirect_url.as_str()).filter(|url| !url.is_empty())
}
