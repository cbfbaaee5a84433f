use std::sync::Arc;

use rocket::http::{ContentType, Header, Status};
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::tokio::select;
use rocket::{delete, get, post, put, Responder, Shutdown, State};
use shared::{
    export_file_name, to_csv, AuthSession, Credentials, Entry, GalleryView, MapView, NewEntryRequest, Registration,
    ResumeRequest, SessionInfo, VoteReceipt, VotesOverride,
};
use tracing::{info, instrument, warn};

use crate::audit::AuditSink;
use crate::auth::{check_registration, AuthProvider, TokenVerifier};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::geocode::Geocoder;
use crate::processor::ContestProcessor;
use crate::store::EntryStore;
use crate::utils::{parse_category, parse_entry_id};
use crate::viewer::{Admin, Viewer};

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn EntryStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub geocoder: Arc<dyn Geocoder>,
    pub tokens: TokenVerifier,
    pub audit: AuditSink,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn EntryStore>,
        auth: Arc<dyn AuthProvider>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        Self {
            tokens: TokenVerifier::new(&config.auth.jwt_secret, &config.auth.audience),
            audit: AuditSink::new(config.audit_webhook.clone()),
            config,
            store,
            auth,
            geocoder,
        }
    }
}

#[derive(Responder)]
pub struct CsvExport {
    body: (ContentType, String),
    disposition: Header<'static>,
}

#[get("/entries?<q>&<category>")]
pub async fn list_entries(
    state: &State<AppState>,
    viewer: Viewer,
    q: Option<String>,
    category: Option<&str>,
) -> Result<Json<GalleryView>, ApiError> {
    let filter = parse_category(category)?;
    let snapshot = state.store.snapshot();
    let search = q.unwrap_or_default();
    Ok(Json(ContestProcessor::gallery(&snapshot, &search, filter, viewer.vote_weight())))
}

/// Server-sent gallery updates: the derived view now, then again after every
/// snapshot change.
#[get("/entries/stream?<q>&<category>")]
pub fn stream_entries(
    state: &State<AppState>,
    viewer: Viewer,
    q: Option<String>,
    category: Option<&str>,
    mut end: Shutdown,
) -> Result<EventStream![], ApiError> {
    let filter = parse_category(category)?;
    let search = q.unwrap_or_default();
    let weight = viewer.vote_weight();
    let mut snapshots = state.store.subscribe();

    Ok(EventStream! {
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            yield Event::json(&ContestProcessor::gallery(&snapshot, &search, filter, weight)).event("gallery");

            select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                },
                _ = &mut end => break,
            }
        }
    })
}

#[instrument(skip(state, viewer, request), fields(uid = %viewer.identity.uid))]
#[post("/entries", format = "json", data = "<request>")]
pub async fn create_entry(
    state: &State<AppState>,
    viewer: Viewer,
    request: Json<NewEntryRequest>,
) -> Result<(Status, Json<Entry>), ApiError> {
    let entry = ContestProcessor::submit_entry(state.store.as_ref(), &state.audit, &viewer, &request).await?;
    Ok((Status::Created, Json(entry)))
}

#[instrument(skip(state, viewer), fields(entry_id = %id))]
#[post("/entries/<id>/vote")]
pub async fn cast_vote(state: &State<AppState>, viewer: Viewer, id: &str) -> Result<Json<VoteReceipt>, ApiError> {
    let uuid = parse_entry_id(id)?;
    let outcome = ContestProcessor::cast_vote(state.store.as_ref(), uuid, &viewer).await?;
    Ok(Json(outcome.receipt(uuid)))
}

#[get("/map")]
pub async fn map(state: &State<AppState>) -> Json<MapView> {
    let snapshot = state.store.snapshot();
    Json(ContestProcessor::map_view(state.geocoder.as_ref(), &snapshot, state.config.map_center).await)
}

#[get("/session")]
pub fn session(viewer: Viewer) -> Json<SessionInfo> {
    Json(viewer.session_info())
}

#[post("/auth/anonymous")]
pub async fn sign_in_anonymously(state: &State<AppState>) -> Result<Json<AuthSession>, ApiError> {
    Ok(Json(state.auth.sign_in_anonymously().await?))
}

#[post("/auth/login", format = "json", data = "<credentials>")]
pub async fn login(state: &State<AppState>, credentials: Json<Credentials>) -> Result<Json<AuthSession>, ApiError> {
    Ok(Json(state.auth.sign_in_with_password(&credentials).await?))
}

#[post("/auth/register", format = "json", data = "<registration>")]
pub async fn register(state: &State<AppState>, registration: Json<Registration>) -> Result<Json<AuthSession>, ApiError> {
    check_registration(&registration)?;
    Ok(Json(state.auth.register(&registration).await?))
}

/// Ends the current session and starts a fresh anonymous one.
#[post("/auth/logout")]
pub async fn logout(state: &State<AppState>, viewer: Viewer) -> Result<Json<AuthSession>, ApiError> {
    if let Some(token) = &viewer.access_token {
        if let Err(e) = state.auth.sign_out(token).await {
            warn!("Sign out for {} failed: {}", viewer.identity.uid, e);
        }
    }
    Ok(Json(state.auth.sign_in_anonymously().await?))
}

/// Adopts an externally issued token, falling back to an anonymous session.
#[post("/auth/resume", format = "json", data = "<request>")]
pub async fn resume(state: &State<AppState>, request: Json<ResumeRequest>) -> Result<Json<AuthSession>, ApiError> {
    match state.tokens.verify(&request.token) {
        Ok(identity) => Ok(Json(AuthSession {
            access_token: request.into_inner().token,
            uid: identity.uid,
            anonymous: identity.anonymous,
            email: identity.email,
            display_name: identity.display_name,
        })),
        Err(e) => {
            warn!("Initial token rejected, continuing anonymously: {}", e);
            Ok(Json(state.auth.sign_in_anonymously().await?))
        }
    }
}

#[instrument(skip(state, admin, request), fields(entry_id = %id, admin = %admin.0.identity.uid))]
#[put("/admin/entries/<id>/votes", format = "json", data = "<request>")]
pub async fn override_votes(
    state: &State<AppState>,
    admin: Admin,
    id: &str,
    request: Json<VotesOverride>,
) -> Result<Json<VotesOverride>, ApiError> {
    let uuid = parse_entry_id(id)?;
    let votes = ContestProcessor::override_votes(state.store.as_ref(), uuid, request.votes).await?;
    Ok(Json(VotesOverride { votes: i64::from(votes) }))
}

#[instrument(skip(state, admin), fields(entry_id = %id, admin = %admin.0.identity.uid))]
#[delete("/admin/entries/<id>")]
pub async fn delete_entry(state: &State<AppState>, admin: Admin, id: &str) -> Result<Status, ApiError> {
    let uuid = parse_entry_id(id)?;
    ContestProcessor::remove_entry(state.store.as_ref(), uuid).await?;
    Ok(Status::NoContent)
}

#[get("/admin/export")]
pub fn export_entries(state: &State<AppState>, admin: Admin) -> CsvExport {
    let snapshot = state.store.snapshot();
    let file_name = export_file_name(&state.config.contest_name);
    info!("📤 {} exported {} entries", admin.0.identity.uid, snapshot.len());

    CsvExport {
        body: (ContentType::CSV, to_csv(&snapshot)),
        disposition: Header::new("Content-Disposition", format!("attachment; filename=\"{file_name}\"")),
    }
}

#[post("/admin/seed")]
pub async fn seed(state: &State<AppState>, viewer: Viewer) -> Result<(Status, Json<Vec<Entry>>), ApiError> {
    let created = ContestProcessor::seed(state.store.as_ref(), &viewer).await?;
    Ok((Status::Created, Json(created)))
}

#[rocket::options("/<_..>")]
pub async fn all_options() -> Status {
    Status::Ok
}
