use rocket::http::Status;
use rocket::response::Responder;
use rocket::serde::json::Json;
use shared::validation::ValidationError;
use shared::{Error, ErrorCode};
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Entry not found")]
    NotFound,
    #[error("Invalid entry ID")]
    InvalidId,
    #[error("Invalid category: {0}")]
    InvalidCategory(String),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("Possible profanity detected in {0}")]
    Inappropriate(&'static str),
    #[error("Sign in to submit an entry")]
    SignInRequired,
    #[error("Administrator access required")]
    Forbidden,
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("Could not save changes, please try again")]
    Store(StoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Store(other),
        }
    }
}

impl ApiError {
    fn status_and_code(&self) -> (Status, ErrorCode) {
        match self {
            ApiError::NotFound => (Status::NotFound, ErrorCode::NotFound),
            ApiError::InvalidId | ApiError::InvalidCategory(_) => (Status::BadRequest, ErrorCode::InvalidInput),
            ApiError::Validation(_) | ApiError::Inappropriate(_) => (Status::BadRequest, ErrorCode::ValidationFailed),
            ApiError::SignInRequired => (Status::Unauthorized, ErrorCode::SignInRequired),
            ApiError::Forbidden => (Status::Forbidden, ErrorCode::Forbidden),
            ApiError::Auth(auth) => match auth {
                AuthError::EmailInUse => (Status::Conflict, ErrorCode::Conflict),
                AuthError::WrongPassword | AuthError::InvalidToken(_) => (Status::Unauthorized, ErrorCode::Unauthorized),
                AuthError::UserNotFound => (Status::NotFound, ErrorCode::NotFound),
                AuthError::TermsNotAccepted | AuthError::Invalid(_) => (Status::BadRequest, ErrorCode::ValidationFailed),
                AuthError::ConfirmationPending => (Status::Forbidden, ErrorCode::Unauthorized),
                AuthError::Provider(_) => (Status::BadGateway, ErrorCode::Unavailable),
                AuthError::Transport(_) => (Status::ServiceUnavailable, ErrorCode::Unavailable),
            },
            ApiError::Store(_) => (Status::ServiceUnavailable, ErrorCode::Unavailable),
            ApiError::Internal(_) => (Status::InternalServerError, ErrorCode::SystemError),
        }
    }

    pub fn body(&self) -> Error {
        let (_, code) = self.status_and_code();
        match self {
            ApiError::Auth(AuthError::InvalidToken(details) | AuthError::Provider(details)) => {
                Error::new(code, self.to_string()).with_details(details.clone())
            }
            _ => Error::new(code, self.to_string()),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ApiError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let (status, _) = self.status_and_code();
        match &self {
            ApiError::Store(e) => error!("Entry store write failed: {}", e),
            ApiError::Internal(e) => error!("Internal error: {}", e),
            ApiError::Auth(AuthError::Transport(e)) => error!("Auth provider unreachable: {}", e),
            _ => {}
        }
        (status, Json(self.body())).respond_to(req)
    }
}
