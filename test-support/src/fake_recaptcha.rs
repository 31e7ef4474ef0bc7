use axum::{
    extract::{Form, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::net::TcpListener;

const VERIFY_PATH: &str = "/recaptcha/api/siteverify";

/// A siteverify endpoint which accepts tokens signed with one secret.
#[derive(Clone)]
pub struct FakeReCaptcha {
    required_secret: String,
    required_token: Option<String>,
    behaviour: Behaviour,
    request_count: Arc<AtomicUsize>,
}

#[derive(Clone, Copy)]
enum Behaviour {
    Verify,
    ReturnStatus(u16),
    ReturnEmptyResponse,
    ReturnInvalidResponse,
    ReturnResponseWithoutSuccess,
}

#[derive(Deserialize)]
struct VerifyRequestPayload {
    secret: String,
    response: String,
}

#[derive(Serialize)]
struct VerifyResponsePayload {
    success: bool,
    #[serde(rename = "error-codes")]
    error_codes: Vec<String>,
}

impl FakeReCaptcha {
    pub fn new(required_secret: impl Into<String>) -> Self {
        Self {
            required_secret: required_secret.into(),
            required_token: None,
            behaviour: Behaviour::Verify,
            request_count: Default::default(),
        }
    }

    pub fn require_token(self, required_token: impl Into<String>) -> Self {
        Self {
            required_token: Some(required_token.into()),
            ..self
        }
    }

    pub fn return_status(self, status: u16) -> Self {
        Self {
            behaviour: Behaviour::ReturnStatus(status),
            ..self
        }
    }

    pub fn return_empty_response(self) -> Self {
        Self {
            behaviour: Behaviour::ReturnEmptyResponse,
            ..self
        }
    }

    pub fn return_invalid_response(self) -> Self {
        Self {
            behaviour: Behaviour::ReturnInvalidResponse,
            ..self
        }
    }

    pub fn return_response_without_success(self) -> Self {
        Self {
            behaviour: Behaviour::ReturnResponseWithoutSuccess,
            ..self
        }
    }

    /// Serves on an ephemeral local port in the background and returns the verify URL.
    pub async fn start(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = Router::new()
            .route(VERIFY_PATH, post(verify))
            .with_state(self.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{address}{VERIFY_PATH}")
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

async fn verify(
    State(state): State<FakeReCaptcha>,
    Form(payload): Form<VerifyRequestPayload>,
) -> Response {
    state.request_count.fetch_add(1, Ordering::SeqCst);
    debug!("Fake reCAPTCHA got token {}", payload.response);
    match state.behaviour {
        Behaviour::ReturnStatus(status) => StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        Behaviour::ReturnEmptyResponse => StatusCode::OK.into_response(),
        Behaviour::ReturnInvalidResponse => (
            [(header::CONTENT_TYPE, "text/plain")],
            "Invalid response",
        )
            .into_response(),
        Behaviour::ReturnResponseWithoutSuccess => (
            [(header::CONTENT_TYPE, "application/json")],
            json!({"hostname": "localhost"}).to_string(),
        )
            .into_response(),
        Behaviour::Verify => {
            let error_codes = if payload.secret != state.required_secret {
                vec!["invalid-input-secret".to_string()]
            } else if state
                .required_token
                .as_ref()
                .is_some_and(|token| *token != payload.response)
            {
                vec!["invalid-input-response".to_string()]
            } else {
                vec![]
            };
            (
                [(header::CONTENT_TYPE, "application/json")],
                json!(VerifyResponsePayload {
                    success: error_codes.is_empty(),
                    error_codes,
                })
                .to_string(),
            )
                .into_response()
        }
    }
}
