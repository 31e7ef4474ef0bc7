use lambda_http::{
    http::{
        header::{CONTENT_TYPE, LOCATION},
        StatusCode,
    },
    Body, Response,
};
use serde_json::json;

/// The answer to a request, before it is turned into an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseDescriptor {
    BadRequest(String),
    NoContent,
    JsonRedirect(String),
    HttpRedirect(String),
    ServerError,
}

impl ResponseDescriptor {
    pub fn status(&self) -> StatusCode {
        match self {
            ResponseDescriptor::BadRequest(_) => StatusCode::BAD_REQUEST,
            ResponseDescriptor::NoContent => StatusCode::NO_CONTENT,
            ResponseDescriptor::JsonRedirect(_) => StatusCode::OK,
            ResponseDescriptor::HttpRedirect(_) => StatusCode::FOUND,
            ResponseDescriptor::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Fails only if a redirect URL is not a valid header value.
    pub fn into_response(self) -> Result<Response<Body>, lambda_http::http::Error> {
        let builder = Response::builder().status(self.status());
        match self {
            ResponseDescriptor::BadRequest(message) => builder
                .header(CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(message.into()),
            ResponseDescriptor::JsonRedirect(url) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(json!({ "redirect": url }).to_string().into()),
            ResponseDescriptor::HttpRedirect(url) => {
                builder.header(LOCATION, url).body(Body::Empty)
            }
            ResponseDescriptor::NoContent | ResponseDescriptor::ServerError => {
                builder.body(Body::Empty)
            }
        }
    }
}
