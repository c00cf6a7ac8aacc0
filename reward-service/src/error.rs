use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reward_utils::error::Error as RulesError;

use crate::store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    // Froms
    #[error("{0}")]
    Rules(#[from] RulesError),
    #[error("{0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let msg = self.to_string();
        let status: StatusCode = (&self).into();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        (status, msg).into_response()
    }
}

impl From<&Error> for StatusCode {
    fn from(error: &Error) -> Self {
        match error {
            Error::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Rules(RulesError::Ineligible(_)) => StatusCode::CONFLICT,
            Error::Rules(_) => StatusCode::BAD_REQUEST,
            Error::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            Error::Store(StoreError::InvalidId(_)) => StatusCode::BAD_REQUEST,
            Error::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
