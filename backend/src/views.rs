use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub level: Level,
    pub message: String,
}

impl Flash {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: Level::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub location: String,
    pub messages: Vec<Flash>,
}

impl Redirect {
    pub fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            messages: Vec::new(),
        }
    }

    pub fn with(mut self, flash: Flash) -> Self {
        self.messages.push(flash);
        self
    }
}

/// What a controller asks the boundary to send back.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Page rendered normally.
    Render(T),
    /// Page re-rendered with validation errors, nothing persisted.
    Rejected(T),
    Redirect(Redirect),
}

impl<T: Serialize> IntoResponse for Outcome<T> {
    fn into_response(self) -> Response {
        match self {
            Outcome::Render(page) => (StatusCode::OK, Json(page)).into_response(),
            Outcome::Rejected(page) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(page)).into_response()
            }
            Outcome::Redirect(redirect) => (
                StatusCode::SEE_OTHER,
                [(header::LOCATION, redirect.location.clone())],
                Json(redirect),
            )
                .into_response(),
        }
    }
}
