use lambda_http::{http::header::CONTENT_TYPE, Request, RequestPayloadExt};
use multer::Multipart;
use serde::Deserialize;
use std::{collections::HashMap, fmt::Display};
use tracing::debug;

pub const NAME_FIELD: &str = "name";
pub const EMAIL_FIELD: &str = "email";
pub const SUBJECT_FIELD: &str = "subject";
pub const MESSAGE_FIELD: &str = "message";
pub const REDIRECT_URL_FIELD: &str = "redirectUrl";
pub const RECAPTCHA_TOKEN_FIELD: &str = "g-recaptcha-response";

/// Submitted form fields. An absent field and a field submitted empty are different things.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct FormFields(HashMap<String, String>);

impl FormFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.0.remove(name);
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Reads the form out of a URL-encoded, multipart or JSON request body.
pub async fn read_form(event: &Request) -> Result<FormFields, FormReadError> {
    if let Some(content_type) = multipart_content_type(event) {
        return read_multipart_form(event, content_type).await;
    }
    match event.payload::<FormFields>() {
        Ok(Some(fields)) => Ok(fields),
        Ok(None) => Err(FormReadError::MissingPayload),
        Err(error) => Err(FormReadError::InvalidPayload(error.to_string())),
    }
}

fn multipart_content_type(event: &Request) -> Option<&str> {
    let content_type = event.headers().get(CONTENT_TYPE)?.to_str().ok()?;
    content_type
        .get(.."multipart/form-data".len())
        .filter(|mime| mime.eq_ignore_ascii_case("multipart/form-data"))
        .map(|_| content_type)
}

// File parts are not form fields and are skipped.
async fn read_multipart_form(
    event: &Request,
    content_type: &str,
) -> Result<FormFields, FormReadError> {
    let boundary = multer::parse_boundary(content_type).map_err(FormReadError::from)?;
    let body: &[u8] = event.body().as_ref();
    let mut multipart = Multipart::with_reader(body, boundary);
    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        if field.file_name().is_some() {
            debug!("Skipping file part {name}");
            continue;
        }
        fields.insert(name, field.text().await?);
    }
    Ok(FormFields(fields))
}

#[derive(Debug, PartialEq, Eq)]
pub enum FormReadError {
    MissingPayload,
    InvalidPayload(String),
}

impl Display for FormReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormReadError::MissingPayload => {
                write!(f, "Request has no form payload or an unsupported content type")
            }
            FormReadError::InvalidPayload(description) => {
                write!(f, "Malformed form payload: {description}")
            }
        }
    }
}

impl std::error::Error for FormReadError {}

impl From<multer::Error> for FormReadError {
    fn from(error: multer::Error) -> Self {
        FormReadError::InvalidPayload(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{read_form, FormFields, FormReadError};
    use googletest::prelude::*;
    use lambda_http::{http::HeaderValue, Body, Request};

    fn event(content_type: &'static str, body: &str) -> Request {
        event_with_body(content_type, Body::Text(body.into()))
    }

    fn event_with_body(content_type: &'static str, body: Body) -> Request {
        let mut event = Request::new(body);
        event
            .headers_mut()
            .append("Content-Type", HeaderValue::from_static(content_type));
        event
    }

    const MULTIPART_BODY: &str = "--XYZ\r\n\
        Content-Disposition: form-data; name=\"name\"\r\n\r\n\
        Captain Test\r\n\
        --XYZ\r\n\
        Content-Disposition: form-data; name=\"subject\"\r\n\r\n\
        \r\n\
        --XYZ\r\n\
        Content-Disposition: form-data; name=\"attachment\"; filename=\"a.txt\"\r\n\
        Content-Type: text/plain\r\n\r\n\
        file content\r\n\
        --XYZ--\r\n";

    #[googletest::test]
    #[tokio::test]
    async fn reads_url_encoded_form() {
        let fields = read_form(&event(
            "application/x-www-form-urlencoded",
            "name=Captain+Test&email=test%40test.com&message=Hi%21",
        ))
        .await
        .unwrap();

        expect_that!(fields.get("name"), some(eq("Captain Test")));
        expect_that!(fields.get("email"), some(eq("test@test.com")));
        expect_that!(fields.get("message"), some(eq("Hi!")));
    }

    #[googletest::test]
    #[tokio::test]
    async fn keeps_empty_fields_distinct_from_absent_ones() {
        let fields = read_form(&event(
            "application/x-www-form-urlencoded; charset=utf-8",
            "name=&email=test%40test.com",
        ))
        .await
        .unwrap();

        expect_that!(fields.get("name"), some(eq("")));
        expect_that!(fields.get("subject"), none());
    }

    #[tokio::test]
    async fn reads_multipart_form_without_file_parts() -> Result<()> {
        let fields = read_form(&event("multipart/form-data; boundary=XYZ", MULTIPART_BODY))
            .await
            .unwrap();

        verify_that!(
            fields,
            eq(FormFields::from_iter([
                ("name", "Captain Test"),
                ("subject", "")
            ]))
        )
    }

    #[tokio::test]
    async fn reads_binary_multipart_body() -> Result<()> {
        let fields = read_form(&event_with_body(
            "Multipart/Form-Data; boundary=XYZ",
            Body::Binary(MULTIPART_BODY.as_bytes().to_vec()),
        ))
        .await
        .unwrap();

        verify_that!(fields.get("name"), some(eq("Captain Test")))
    }

    #[tokio::test]
    async fn rejects_multipart_form_without_boundary() -> Result<()> {
        let result = read_form(&event("multipart/form-data", MULTIPART_BODY)).await;

        verify_that!(
            result,
            err(matches_pattern!(FormReadError::InvalidPayload(anything())))
        )
    }

    #[tokio::test]
    async fn rejects_truncated_multipart_form() -> Result<()> {
        let result = read_form(&event(
            "multipart/form-data; boundary=XYZ",
            "--XYZ\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nCaptain",
        ))
        .await;

        verify_that!(
            result,
            err(matches_pattern!(FormReadError::InvalidPayload(anything())))
        )
    }

    #[tokio::test]
    async fn reads_json_form() -> Result<()> {
        let fields = read_form(&event(
            "application/json",
            r#"{"name":"Captain Test","g-recaptcha-response":"token"}"#,
        ))
        .await
        .unwrap();

        verify_that!(
            fields,
            eq(FormFields::from_iter([
                ("name", "Captain Test"),
                ("g-recaptcha-response", "token")
            ]))
        )
    }

    #[tokio::test]
    async fn rejects_json_with_non_string_values() -> Result<()> {
        let result = read_form(&event("application/json", r#"{"name":42}"#)).await;

        verify_that!(
            result,
            err(matches_pattern!(FormReadError::InvalidPayload(anything())))
        )
    }

    #[tokio::test]
    async fn rejects_malformed_json() -> Result<()> {
        let result = read_form(&event("application/json", "{not json")).await;

        verify_that!(result, err(anything()))
    }

    #[tokio::test]
    async fn rejects_request_without_content_type() -> Result<()> {
        let result = read_form(&Request::new(Body::Text("name=Captain+Test".into()))).await;

        verify_that!(result, err(eq(FormReadError::MissingPayload)))
    }
}
