use rocket::http::Status;
use rocket::outcome::try_outcome;
use rocket::request::{FromRequest, Outcome};
use rocket::{Request, State};
use shared::{classify, submission_gate, vote_weight, Identity, SessionInfo, SubmitGate, UserInfo, ViewerClass};
use tracing::debug;

use crate::auth::AuthError;
use crate::error::ApiError;
use crate::routes::AppState;

/// Error body left behind by a failed guard for the catchers to render.
#[derive(Default)]
pub struct GuardFailure(pub Option<shared::Error>);

fn fail<T>(req: &Request<'_>, status: Status, err: ApiError) -> Outcome<T, ApiError> {
    let body = err.body();
    req.local_cache(|| GuardFailure(Some(body)));
    Outcome::Error((status, err))
}

/// The session behind a request: a verified bearer token, or an ephemeral
/// guest derived from the caller's network fingerprint.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub identity: Identity,
    pub class: ViewerClass,
    pub access_token: Option<String>,
}

impl Viewer {
    pub fn vote_weight(&self) -> u32 {
        vote_weight(&self.identity)
    }

    pub fn can_submit(&self) -> bool {
        submission_gate(self.class) == SubmitGate::Allowed
    }

    pub fn session_info(&self) -> SessionInfo {
        SessionInfo {
            uid: self.identity.uid.clone(),
            class: self.class,
            display_name: self.identity.display_name.clone(),
            email: self.identity.email.clone(),
            vote_weight: self.vote_weight(),
            can_submit: self.can_submit(),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Viewer {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(state) = req.guard::<&State<AppState>>().await.succeeded() else {
            return fail(req, Status::InternalServerError, ApiError::Internal("application state missing".into()));
        };

        let Some(header) = req.headers().get_one("Authorization") else {
            let Some(info) = req.guard::<UserInfo>().await.succeeded() else {
                return fail(req, Status::InternalServerError, ApiError::Internal("caller fingerprint unavailable".into()));
            };
            let identity = Identity::guest(info.guest_uid());
            return Outcome::Success(Viewer {
                class: classify(&identity, &state.config.admins),
                identity,
                access_token: None,
            });
        };

        let Some(token) = header.strip_prefix("Bearer ").map(str::trim) else {
            return fail(req, Status::Unauthorized, AuthError::InvalidToken("expected a bearer token".into()).into());
        };

        match state.tokens.verify(token) {
            Ok(identity) => Outcome::Success(Viewer {
                class: classify(&identity, &state.config.admins),
                identity,
                access_token: Some(token.to_string()),
            }),
            Err(e) => {
                debug!("Rejected session token: {:?}", e);
                fail(req, Status::Unauthorized, e.into())
            }
        }
    }
}

/// A viewer whose uid is in the configured administrator set.
#[derive(Debug, Clone)]
pub struct Admin(pub Viewer);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Admin {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let viewer = try_outcome!(req.guard::<Viewer>().await);
        if viewer.class.is_admin() {
            Outcome::Success(Admin(viewer))
        } else {
            fail(req, Status::Forbidden, ApiError::Forbidden)
        }
    }
}
