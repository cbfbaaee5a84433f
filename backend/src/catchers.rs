use rocket::{Request, catch, serde::json::Json};
use shared::{Error, ErrorCode};

use crate::viewer::GuardFailure;

fn render(req: &Request, code: ErrorCode, fallback: &str) -> Json<Error> {
    let failure = req.local_cache(GuardFailure::default);
    Json(failure.0.clone().unwrap_or_else(|| Error::new(code, fallback)))
}

#[catch(401)]
pub fn unauthorized(req: &Request) -> Json<Error> {
    render(req, ErrorCode::Unauthorized, "Invalid or expired session token.")
}

#[catch(403)]
pub fn forbidden(req: &Request) -> Json<Error> {
    render(req, ErrorCode::Forbidden, "Access forbidden.")
}

#[catch(400)]
pub fn bad_request(req: &Request) -> Json<Error> {
    render(req, ErrorCode::InvalidInput, "Invalid request parameters.")
}

#[catch(422)]
pub fn unprocessable(req: &Request) -> Json<Error> {
    render(req, ErrorCode::ValidationFailed, "Malformed request body.")
}

#[catch(500)]
pub fn internal_error(req: &Request) -> Json<Error> {
    render(req, ErrorCode::SystemError, "An internal server error occurred.")
}

#[catch(404)]
pub fn not_found(_req: &Request) -> Json<Error> {
    Json(Error::new(ErrorCode::NotFound, "The requested resource was not found."))
}
