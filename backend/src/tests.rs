#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use jsonwebtoken::{encode, EncodingKey, Header as JwtHeader};
    use reqwest::StatusCode;
    use rocket::async_trait;
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::{Client, LocalResponse};
    use shared::validation::ValidationError;
    use shared::{
        AuthSession, Category, CategoryFilter, Coordinates, Credentials, Entry, Error, ErrorCode, GalleryView, MapView,
        Registration, SessionInfo, ViewerClass, VoteReceipt, VotesOverride, GUEST_PREFIX,
    };
    use sqlx::postgres::PgPoolOptions;
    use time::format_description::well_known::Rfc3339;
    use time::macros::datetime;
    use time::OffsetDateTime;
    use tokio::io::{AsyncRead, AsyncReadExt};
    use tokio::sync::broadcast;
    use uuid::Uuid;

    use crate::audit::{AuditSink, SubmissionRecord};
    use crate::auth::{check_registration, map_provider_error, AuthError, AuthProvider, Claims, SessionEvent, UserMetadata};
    use crate::build_rocket;
    use crate::config::{AppConfig, ConfigError};
    use crate::geocode::{Geocoder, Nominatim};
    use crate::pg_store::PgEntryStore;
    use crate::processor::ContestProcessor;
    use crate::routes::AppState;
    use crate::store::{EntryPatch, EntryStore, MemoryStore, NewEntry, StoreError};

    const SECRET: &str = "test-secret-with-enough-length-for-hs256";
    const ADMIN: &str = "admin-uid";

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("backend=debug")
            .with_test_writer()
            .try_init();
    }

    fn lookup(extra: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let mut values: HashMap<String, String> = [
            ("ADMIN_UIDS", ADMIN),
            ("AUTH_URL", "https://auth.example.com/"),
            ("AUTH_API_KEY", "anon-key"),
            ("AUTH_JWT_SECRET", SECRET),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            values.insert(k.to_string(), v.to_string());
        }
        move |key: &str| values.get(key).cloned()
    }

    fn config() -> AppConfig {
        AppConfig::from_lookup(lookup(&[])).unwrap()
    }

    fn token(uid: &str, anonymous: bool) -> String {
        let claims = Claims {
            sub: uid.into(),
            exp: (OffsetDateTime::now_utc().unix_timestamp() + 3600) as u64,
            aud: Some("authenticated".into()),
            email: (!anonymous).then(|| format!("{uid}@example.com")),
            is_anonymous: anonymous,
            user_metadata: UserMetadata { display_name: (!anonymous).then(|| uid.to_string()) },
        };
        encode(&JwtHeader::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn bearer(uid: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", token(uid, false)))
    }

    fn anonymous_bearer(uid: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", token(uid, true)))
    }

    fn entry(n: u128, votes: u32, category: Category, title: &str, location: &str) -> Entry {
        Entry {
            id: Uuid::from_u128(n),
            title: title.into(),
            author: format!("Author {n}"),
            location: location.into(),
            category,
            url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into(),
            votes,
            created_at: datetime!(2026-04-01 18:30 UTC),
            owner_id: "owner".into(),
        }
    }

    fn two_entries() -> Vec<Entry> {
        vec![
            entry(1, 10, Category::Individual, "Dansa al Castell", "Carrer del Castell, 2"),
            entry(2, 20, Category::Group, "Hip Hop al Pont", "Pont de les 15 Arcades"),
        ]
    }

    struct FakeAuth {
        accounts: Mutex<HashMap<String, (String, String)>>,
        events: broadcast::Sender<SessionEvent>,
    }

    impl FakeAuth {
        fn new() -> Self {
            let (events, _) = broadcast::channel(16);
            Self { accounts: Mutex::new(HashMap::new()), events }
        }

        fn session(uid: &str, anonymous: bool, email: Option<&str>) -> AuthSession {
            AuthSession {
                access_token: token(uid, anonymous),
                uid: uid.into(),
                anonymous,
                email: email.map(str::to_string),
                display_name: None,
            }
        }
    }

    #[async_trait]
    impl AuthProvider for FakeAuth {
        async fn sign_in_anonymously(&self) -> Result<AuthSession, AuthError> {
            Ok(Self::session(&format!("anon-{}", Uuid::new_v4()), true, None))
        }

        async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
            let accounts = self.accounts.lock().unwrap();
            let (password, uid) = accounts.get(&credentials.email).ok_or(AuthError::UserNotFound)?;
            if *password != credentials.password {
                return Err(AuthError::WrongPassword);
            }
            Ok(Self::session(uid, false, Some(&credentials.email)))
        }

        async fn register(&self, registration: &Registration) -> Result<AuthSession, AuthError> {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(&registration.email) {
                return Err(AuthError::EmailInUse);
            }
            let uid = format!("user-{}", accounts.len() + 1);
            accounts.insert(registration.email.clone(), (registration.password.clone(), uid.clone()));
            Ok(Self::session(&uid, false, Some(&registration.email)))
        }

        async fn sign_out(&self, _access_token: &str) -> Result<(), AuthError> {
            let _ = self.events.send(SessionEvent::SignedOut);
            Ok(())
        }

        fn events(&self) -> broadcast::Receiver<SessionEvent> {
            self.events.subscribe()
        }
    }

    #[derive(Default)]
    struct FakeGeocoder {
        known: HashMap<String, Coordinates>,
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn locate(&self, address: &str) -> Option<Coordinates> {
            self.known.get(address).copied()
        }
    }

    struct TestApp {
        client: Client,
        store: Arc<MemoryStore>,
    }

    async fn app_with(entries: Vec<Entry>) -> TestApp {
        init_tracing();
        let store = Arc::new(MemoryStore::with_entries(entries));
        let mut geocoder = FakeGeocoder::default();
        geocoder.known.insert("Pont de les 15 Arcades".into(), Coordinates { lat: 41.41, lon: 2.02 });

        let state = AppState::new(config(), store.clone(), Arc::new(FakeAuth::new()), Arc::new(geocoder));
        let client = Client::tracked(build_rocket(state)).await.expect("valid rocket instance");
        TestApp { client, store }
    }

    fn votes_of(store: &MemoryStore, n: u128) -> Option<u32> {
        store.snapshot().iter().find(|e| e.id == Uuid::from_u128(n)).map(|e| e.votes)
    }

    async fn error_body(response: LocalResponse<'_>) -> Error {
        response.into_json::<Error>().await.expect("error body")
    }

    #[rocket::async_test]
    async fn test_gallery_orders_by_votes() {
        let app = app_with(two_entries()).await;
        let response = app.client.get("/api/entries").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let view: GalleryView = response.into_json().await.unwrap();
        let ids: Vec<_> = view.entries.iter().map(|r| r.entry.id.as_u128()).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(view.total, 2);
        assert_eq!(view.vote_weight, 1);
        assert!(view.entries.iter().all(|r| r.top_three));
    }

    #[rocket::async_test]
    async fn test_gallery_filters() {
        let app = app_with(two_entries()).await;

        let view: GalleryView = app.client.get("/api/entries?category=Group").dispatch().await.into_json().await.unwrap();
        assert_eq!(view.total, 1);
        assert_eq!(view.entries[0].entry.id, Uuid::from_u128(2));

        let view: GalleryView = app.client.get("/api/entries?q=CASTELL&category=All").dispatch().await.into_json().await.unwrap();
        assert_eq!(view.total, 1);
        assert_eq!(view.entries[0].entry.id, Uuid::from_u128(1));

        let view: GalleryView = app.client
            .get("/api/entries")
            .header(bearer("joan"))
            .dispatch().await.into_json().await.unwrap();
        assert_eq!(view.vote_weight, 5);
    }

    #[rocket::async_test]
    async fn test_gallery_rejects_unknown_category() {
        let app = app_with(two_entries()).await;
        let response = app.client.get("/api/entries?category=Tango").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
        assert_eq!(error_body(response).await.code, ErrorCode::InvalidInput);
    }

    #[rocket::async_test]
    async fn test_guest_vote_adds_one() {
        let app = app_with(two_entries()).await;
        let response = app.client.post(format!("/api/entries/{}/vote", Uuid::from_u128(1))).dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let receipt: VoteReceipt = response.into_json().await.unwrap();
        assert!(receipt.recorded);
        assert_eq!(receipt.points, 1);
        assert_eq!(receipt.votes, Some(11));
        assert_eq!(votes_of(&app.store, 1), Some(11));
    }

    #[rocket::async_test]
    async fn test_anonymous_session_vote_adds_one() {
        let app = app_with(two_entries()).await;
        let response = app.client
            .post(format!("/api/entries/{}/vote", Uuid::from_u128(1)))
            .header(anonymous_bearer("anon-7"))
            .dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(votes_of(&app.store, 1), Some(11));
    }

    #[rocket::async_test]
    async fn test_registered_vote_adds_five() {
        let app = app_with(two_entries()).await;
        let response = app.client
            .post(format!("/api/entries/{}/vote", Uuid::from_u128(1)))
            .header(bearer("joan"))
            .dispatch().await;
        let receipt: VoteReceipt = response.into_json().await.unwrap();
        assert_eq!(receipt.points, 5);
        assert_eq!(votes_of(&app.store, 1), Some(15));

        // no ledger: voting again counts again
        app.client.post(format!("/api/entries/{}/vote", Uuid::from_u128(1))).header(bearer("joan")).dispatch().await;
        assert_eq!(votes_of(&app.store, 1), Some(20));
    }

    #[rocket::async_test]
    async fn test_vote_on_missing_entry_is_ignored() {
        let app = app_with(two_entries()).await;
        let before = app.store.snapshot();

        let response = app.client.post(format!("/api/entries/{}/vote", Uuid::from_u128(99))).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let receipt: VoteReceipt = response.into_json().await.unwrap();
        assert!(!receipt.recorded);
        assert_eq!(receipt.votes, None);
        assert!(Arc::ptr_eq(&before, &app.store.snapshot()), "no write may happen");
    }

    #[rocket::async_test]
    async fn test_vote_write_failure_is_reported() {
        let app = app_with(two_entries()).await;
        app.store.set_unavailable(true);

        let response = app.client.post(format!("/api/entries/{}/vote", Uuid::from_u128(2))).dispatch().await;
        assert_eq!(response.status(), Status::ServiceUnavailable);
        assert_eq!(error_body(response).await.code, ErrorCode::Unavailable);
        assert_eq!(votes_of(&app.store, 2), Some(20));
    }

    #[rocket::async_test]
    async fn test_admin_override_clamps_to_zero() {
        let app = app_with(two_entries()).await;
        let response = app.client
            .put(format!("/api/admin/entries/{}/votes", Uuid::from_u128(1)))
            .header(bearer(ADMIN))
            .header(ContentType::JSON)
            .body(r#"{"votes": -3}"#)
            .dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_json::<VotesOverride>().await.unwrap().votes, 0);
        assert_eq!(votes_of(&app.store, 1), Some(0));

        app.client
            .put(format!("/api/admin/entries/{}/votes", Uuid::from_u128(1)))
            .header(bearer(ADMIN))
            .header(ContentType::JSON)
            .body(r#"{"votes": 42}"#)
            .dispatch().await;
        assert_eq!(votes_of(&app.store, 1), Some(42));
    }

    #[rocket::async_test]
    async fn test_override_requires_admin() {
        let app = app_with(two_entries()).await;
        let response = app.client
            .put(format!("/api/admin/entries/{}/votes", Uuid::from_u128(1)))
            .header(bearer("joan"))
            .header(ContentType::JSON)
            .body(r#"{"votes": 500}"#)
            .dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
        assert_eq!(error_body(response).await.code, ErrorCode::Forbidden);
        assert_eq!(votes_of(&app.store, 1), Some(10));
    }

    #[rocket::async_test]
    async fn test_override_unknown_entry() {
        let app = app_with(two_entries()).await;
        let response = app.client
            .put(format!("/api/admin/entries/{}/votes", Uuid::from_u128(5)))
            .header(bearer(ADMIN))
            .header(ContentType::JSON)
            .body(r#"{"votes": 1}"#)
            .dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_invalid_token_is_rejected() {
        let app = app_with(two_entries()).await;
        let response = app.client
            .post(format!("/api/entries/{}/vote", Uuid::from_u128(1)))
            .header(Header::new("Authorization", "Bearer not-a-jwt"))
            .dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(error_body(response).await.code, ErrorCode::Unauthorized);
        assert_eq!(votes_of(&app.store, 1), Some(10));
    }

    #[rocket::async_test]
    async fn test_submission_requires_sign_in() {
        let app = app_with(Vec::new()).await;
        let body = r#"{"title":"Solo","author":"Anna","location":"Plaça de la Vila, 1","category":"Individual","url":"https://youtu.be/kYtGl1dX5qI"}"#;

        let response = app.client.post("/api/entries").header(ContentType::JSON).body(body).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(error_body(response).await.code, ErrorCode::SignInRequired);

        let response = app.client
            .post("/api/entries")
            .header(anonymous_bearer("anon-1"))
            .header(ContentType::JSON)
            .body(body)
            .dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert!(app.store.snapshot().is_empty());
    }

    #[rocket::async_test]
    async fn test_registered_submission() {
        let app = app_with(Vec::new()).await;
        let response = app.client
            .post("/api/entries")
            .header(bearer("anna"))
            .header(ContentType::JSON)
            .body(r#"{"title":" Solo ","author":"Anna","location":"Plaça de la Vila, 1","category":"DanceSchool","url":"https://youtu.be/kYtGl1dX5qI"}"#)
            .dispatch().await;
        assert_eq!(response.status(), Status::Created);

        let created: Entry = response.into_json().await.unwrap();
        assert_eq!(created.title, "Solo");
        assert_eq!(created.votes, 0);
        assert_eq!(created.owner_id, "anna");
        assert_eq!(created.category, Category::DanceSchool);
        assert_eq!(app.store.snapshot().as_slice(), &[created]);
    }

    #[rocket::async_test]
    async fn test_submission_validation() {
        let app = app_with(Vec::new()).await;
        let response = app.client
            .post("/api/entries")
            .header(bearer("anna"))
            .header(ContentType::JSON)
            .body(r#"{"title":"Solo","author":"Anna","location":"Plaça","category":"Group","url":"javascript:alert(1)"}"#)
            .dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
        assert_eq!(error_body(response).await.code, ErrorCode::ValidationFailed);

        let response = app.client
            .post("/api/entries")
            .header(bearer("anna"))
            .header(ContentType::JSON)
            .body(r#"{"title":"fuck this","author":"Anna","location":"Plaça","category":"Group","url":"https://youtu.be/kYtGl1dX5qI"}"#)
            .dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
        assert!(app.store.snapshot().is_empty());
    }

    #[rocket::async_test]
    async fn test_admin_delete() {
        let app = app_with(two_entries()).await;
        let path = format!("/api/admin/entries/{}", Uuid::from_u128(2));

        let response = app.client.delete(path.clone()).header(bearer("joan")).dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = app.client.delete(path.clone()).header(bearer(ADMIN)).dispatch().await;
        assert_eq!(response.status(), Status::NoContent);
        assert_eq!(votes_of(&app.store, 2), None);

        let response = app.client.delete(path).header(bearer(ADMIN)).dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_admin_export() {
        let app = app_with(two_entries()).await;
        let response = app.client.get("/api/admin/export").dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = app.client.get("/api/admin/export").header(bearer(ADMIN)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.content_type(), Some(ContentType::CSV));
        assert_eq!(
            response.headers().get_one("Content-Disposition"),
            Some("attachment; filename=\"molins_dansa_participants.csv\"")
        );

        let body = response.into_string().await.unwrap();
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with(&Uuid::from_u128(1).to_string()));
        assert!(lines[1].ends_with(",10,\"https://www.youtube.com/watch?v=dQw4w9WgXcQ\",1/4/2026"));
    }

    #[rocket::async_test]
    async fn test_session_classification() {
        let app = app_with(Vec::new()).await;

        let guest: SessionInfo = app.client.get("/api/session").dispatch().await.into_json().await.unwrap();
        assert_eq!(guest.class, ViewerClass::Anonymous);
        assert!(guest.uid.starts_with(GUEST_PREFIX));
        assert_eq!(guest.vote_weight, 1);
        assert!(!guest.can_submit);

        let user: SessionInfo = app.client.get("/api/session").header(bearer("joan")).dispatch().await.into_json().await.unwrap();
        assert_eq!(user.class, ViewerClass::Registered);
        assert_eq!(user.email.as_deref(), Some("joan@example.com"));
        assert!(user.can_submit);

        let admin: SessionInfo = app.client.get("/api/session").header(bearer(ADMIN)).dispatch().await.into_json().await.unwrap();
        assert_eq!(admin.class, ViewerClass::Administrator);
        assert_eq!(admin.vote_weight, 5);
    }

    #[rocket::async_test]
    async fn test_map_skips_unknown_locations() {
        let app = app_with(two_entries()).await;
        let view: MapView = app.client.get("/api/map").dispatch().await.into_json().await.unwrap();
        assert_eq!(view.locations, 2);
        assert_eq!(view.markers.len(), 1);
        assert_eq!(view.markers[0].entry_id, Uuid::from_u128(2));
        assert_eq!(view.center, Coordinates { lat: 41.408, lon: 2.015 });
    }

    #[rocket::async_test]
    async fn test_seed_rules() {
        let app = app_with(Vec::new()).await;

        let response = app.client.post("/api/admin/seed").dispatch().await;
        assert_eq!(response.status(), Status::Created);
        assert_eq!(app.store.snapshot().len(), 3);
        assert!(app.store.snapshot().iter().all(|e| e.owner_id == "system"));

        let response = app.client.post("/api/admin/seed").header(bearer("joan")).dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = app.client.post("/api/admin/seed").header(bearer(ADMIN)).dispatch().await;
        assert_eq!(response.status(), Status::Created);
        assert_eq!(app.store.snapshot().len(), 6);
    }

    #[rocket::async_test]
    async fn test_auth_flows() {
        let app = app_with(Vec::new()).await;
        let register = |accept: bool| {
            format!(r#"{{"email":"hola@exemple.com","password":"secret1","displayName":"Joan Garcia","phone":"600 000 000","acceptTerms":{accept}}}"#)
        };

        let response = app.client.post("/api/auth/register").header(ContentType::JSON).body(register(false)).dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
        assert_eq!(error_body(response).await.message, "Has d'acceptar les bases del concurs.");

        let response = app.client
            .post("/api/auth/register")
            .header(ContentType::JSON)
            .body(r#"{"email":"hola@exemple.com","password":"secret1","displayName":"Joan Garcia","acceptTerms":true}"#)
            .dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
        assert_eq!(error_body(response).await.code, ErrorCode::ValidationFailed);

        let response = app.client.post("/api/auth/register").header(ContentType::JSON).body(register(true)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let session: AuthSession = response.into_json().await.unwrap();
        assert!(!session.anonymous);

        let response = app.client.post("/api/auth/register").header(ContentType::JSON).body(register(true)).dispatch().await;
        assert_eq!(response.status(), Status::Conflict);
        assert_eq!(error_body(response).await.message, "Aquest correu ja està registrat.");

        let response = app.client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(r#"{"email":"hola@exemple.com","password":"wrong!!"}"#)
            .dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(error_body(response).await.message, "Contrasenya incorrecta.");

        let response = app.client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(r#"{"email":"ningu@exemple.com","password":"secret1"}"#)
            .dispatch().await;
        assert_eq!(response.status(), Status::NotFound);

        let response = app.client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(r#"{"email":"hola@exemple.com","password":"secret1"}"#)
            .dispatch().await;
        let login: AuthSession = response.into_json().await.unwrap();
        assert_eq!(login.uid, session.uid);

        let response = app.client
            .post("/api/auth/logout")
            .header(Header::new("Authorization", format!("Bearer {}", login.access_token)))
            .dispatch().await;
        let after: AuthSession = response.into_json().await.unwrap();
        assert!(after.anonymous);
        assert_ne!(after.uid, login.uid);
    }

    #[rocket::async_test]
    async fn test_resume_falls_back_to_anonymous() {
        let app = app_with(Vec::new()).await;

        let response = app.client
            .post("/api/auth/resume")
            .header(ContentType::JSON)
            .body(format!(r#"{{"token":"{}"}}"#, token("joan", false)))
            .dispatch().await;
        let resumed: AuthSession = response.into_json().await.unwrap();
        assert_eq!(resumed.uid, "joan");
        assert!(!resumed.anonymous);

        let response = app.client
            .post("/api/auth/resume")
            .header(ContentType::JSON)
            .body(r#"{"token":"expired-or-forged"}"#)
            .dispatch().await;
        let fallback: AuthSession = response.into_json().await.unwrap();
        assert!(fallback.anonymous);
    }

    #[rocket::async_test]
    async fn test_cors_preflight() {
        let app = app_with(Vec::new()).await;
        let response = app.client
            .options("/api/entries")
            .header(Header::new("Origin", "http://localhost:8080"))
            .dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.headers().get_one("Access-Control-Allow-Origin"), Some("http://localhost:8080"));
        assert_eq!(response.headers().get_one("Access-Control-Expose-Headers"), Some("Content-Disposition"));

        let response = app.client
            .options("/api/entries")
            .header(Header::new("Origin", "https://elsewhere.example"))
            .dispatch().await;
        assert_eq!(response.headers().get_one("Access-Control-Allow-Origin"), None);
    }

    #[rocket::async_test]
    async fn test_anonymous_admin_votes_with_weight_one() {
        let app = app_with(two_entries()).await;
        let response = app.client
            .post(format!("/api/entries/{}/vote", Uuid::from_u128(1)))
            .header(anonymous_bearer(ADMIN))
            .dispatch().await;
        let receipt: VoteReceipt = response.into_json().await.unwrap();
        assert_eq!(receipt.points, 1);
        assert_eq!(votes_of(&app.store, 1), Some(11));

        let info: SessionInfo = app.client
            .get("/api/session")
            .header(anonymous_bearer(ADMIN))
            .dispatch().await.into_json().await.unwrap();
        assert_eq!(info.class, ViewerClass::Administrator);
        assert_eq!(info.vote_weight, 1);
    }

    /// Reads server-sent frames until the next `gallery` event.
    async fn next_gallery<R: AsyncRead + Unpin>(body: &mut R, buf: &mut Vec<u8>) -> GalleryView {
        let read_frame = async {
            loop {
                if let Some(end) = buf.windows(2).position(|w| w == b"\n\n") {
                    let frame = String::from_utf8(buf.drain(..end + 2).collect()).unwrap();
                    let event = frame.lines().find_map(|l| l.strip_prefix("event:")).map(str::trim);
                    let data = frame.lines().find_map(|l| l.strip_prefix("data:"));
                    if let (Some("gallery"), Some(data)) = (event, data) {
                        return serde_json::from_str::<GalleryView>(data.trim()).unwrap();
                    }
                    continue;
                }
                let mut chunk = [0u8; 4096];
                let n = body.read(&mut chunk).await.unwrap();
                assert!(n > 0, "event stream ended");
                buf.extend_from_slice(&chunk[..n]);
            }
        };
        tokio::time::timeout(Duration::from_secs(5), read_frame).await.expect("gallery event in time")
    }

    #[rocket::async_test]
    async fn test_gallery_stream_follows_store() {
        let app = app_with(two_entries()).await;
        let response = app.client.get("/api/entries/stream").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.content_type(), Some(ContentType::EventStream));

        let mut body = Box::pin(response);
        let mut buf = Vec::new();
        let first = next_gallery(&mut body, &mut buf).await;
        let ids: Vec<_> = first.entries.iter().map(|r| r.entry.id.as_u128()).collect();
        assert_eq!(ids, vec![2, 1]);

        app.store.update(Uuid::from_u128(1), EntryPatch::votes(30)).await.unwrap();
        let second = next_gallery(&mut body, &mut buf).await;
        let ids: Vec<_> = second.entries.iter().map(|r| r.entry.id.as_u128()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(second.entries[0].entry.votes, 30);
    }

    #[test]
    fn test_submission_record_shape() {
        let submitted = entry(1, 0, Category::Group, "Hip Hop al Pont", "Pont de les 15 Arcades");

        let json = serde_json::to_value(SubmissionRecord::new(&submitted, None)).unwrap();
        let keys: HashSet<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            HashSet::from(["title", "author", "location", "category", "url", "userEmail", "timestamp"])
        );
        assert_eq!(json["userEmail"], "anonymous");
        assert_eq!(json["category"], "Group");
        assert_eq!(json["location"], "Pont de les 15 Arcades");
        assert!(OffsetDateTime::parse(json["timestamp"].as_str().unwrap(), &Rfc3339).is_ok());

        let json = serde_json::to_value(SubmissionRecord::new(&submitted, Some("anna@example.com"))).unwrap();
        assert_eq!(json["userEmail"], "anna@example.com");

        assert!(!AuditSink::new(None).is_enabled());
        assert!(AuditSink::new(Some("https://hooks.example.com/audit".into())).is_enabled());
    }

    #[tokio::test]
    async fn test_committed_write_survives_failed_reload() {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(250))
            .connect_lazy("postgres://contest@127.0.0.1:1/contest")
            .unwrap();
        let store = PgEntryStore::with_snapshot(pool, two_entries());
        assert!(store.refresh().await.is_err());

        let created = entry(3, 0, Category::Individual, "Solo", "Riera");
        assert_eq!(store.committed(created.clone()).await, created);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_geocoder_forgets_removed_locations() {
        let geocoder = Nominatim::new("http://127.0.0.1:1", "Molins de Rei, Spain", "contest-tests");
        let pont = Coordinates { lat: 41.41, lon: 2.02 };
        geocoder.remember("Pont de les 15 Arcades", Some(pont));
        geocoder.remember("Carrer Desaparegut, 9", None);

        let snapshot = vec![entry(2, 20, Category::Group, "Hip Hop al Pont", "Pont de les 15 Arcades")];
        let view = ContestProcessor::map_view(&geocoder, &snapshot, Coordinates { lat: 41.408, lon: 2.015 }).await;
        assert_eq!(view.markers.len(), 1);
        assert_eq!(view.markers[0].position, pont);

        assert_eq!(geocoder.cached("Pont de les 15 Arcades"), Some(Some(pont)));
        assert_eq!(geocoder.cached("Carrer Desaparegut, 9"), None);
    }

    #[tokio::test]
    async fn test_store_pushes_snapshots() {
        let store = MemoryStore::with_entries(two_entries());
        let mut snapshots = store.subscribe();

        store.update(Uuid::from_u128(1), EntryPatch::votes(30)).await.unwrap();
        snapshots.changed().await.unwrap();
        let view = ContestProcessor::gallery(&snapshots.borrow_and_update(), "", CategoryFilter::All, 1);
        assert_eq!(view.entries[0].entry.id, Uuid::from_u128(1));
        assert_eq!(view.entries[0].entry.votes, 30);

        let created = store
            .create(NewEntry {
                title: "Nou".into(),
                author: "Pau".into(),
                location: "Riera".into(),
                category: Category::Individual,
                url: "https://instagram.com/p/1".into(),
                votes: 0,
                owner_id: "pau".into(),
            })
            .await
            .unwrap();
        snapshots.changed().await.unwrap();
        assert_eq!(snapshots.borrow().last().map(|e| e.id), Some(created.id));

        store.delete(created.id).await.unwrap();
        assert_eq!(store.snapshot().len(), 2);
        assert!(matches!(store.delete(created.id).await, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_config_from_lookup() {
        let config = AppConfig::from_lookup(lookup(&[("ADMIN_UIDS", "a, b"), ("MAP_CENTER", "41.5, 2.1")])).unwrap();
        assert!(config.admins.contains("a") && config.admins.contains("b"));
        assert_eq!(config.map_center, Coordinates { lat: 41.5, lon: 2.1 });
        assert_eq!(config.auth.base_url, "https://auth.example.com");
        assert_eq!(config.contest_name, "molins_dansa");
        assert_eq!(config.audit_webhook, None);

        let missing = AppConfig::from_lookup(lookup(&[("AUTH_JWT_SECRET", " ")]));
        assert!(matches!(missing, Err(ConfigError::Missing("AUTH_JWT_SECRET"))));

        let bad = AppConfig::from_lookup(lookup(&[("MAP_CENTER", "north")]));
        assert!(matches!(bad, Err(ConfigError::Invalid { key: "MAP_CENTER", .. })));
    }

    #[test]
    fn test_provider_errors_map_to_localized_messages() {
        let dup = map_provider_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"code":422,"error_code":"user_already_exists","msg":"User already registered"}"#,
        );
        assert!(matches!(dup, AuthError::EmailInUse));
        assert_eq!(dup.to_string(), "Aquest correu ja està registrat.");

        let grant = map_provider_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert!(matches!(grant, AuthError::WrongPassword));

        let missing = map_provider_error(StatusCode::NOT_FOUND, r#"{"error_code":"user_not_found"}"#);
        assert!(matches!(missing, AuthError::UserNotFound));

        let other = map_provider_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(other, AuthError::Provider(ref m) if m.contains("upstream down")));
    }

    #[test]
    fn test_registration_checks() {
        let mut registration = Registration {
            email: "hola@exemple.com".into(),
            password: "secret1".into(),
            display_name: "Joan Garcia".into(),
            phone: "600 000 000".into(),
            accept_terms: false,
        };
        assert!(matches!(check_registration(&registration), Err(AuthError::TermsNotAccepted)));

        registration.accept_terms = true;
        assert!(check_registration(&registration).is_ok());

        registration.password = "123".into();
        assert!(matches!(
            check_registration(&registration),
            Err(AuthError::Invalid(ValidationError::PasswordTooShort))
        ));

        registration.password = "secret1".into();
        registration.display_name = " ".into();
        assert!(matches!(
            check_registration(&registration),
            Err(AuthError::Invalid(ValidationError::MissingDisplayName))
        ));

        registration.display_name = "Joan Garcia".into();
        registration.phone = "  ".into();
        assert!(matches!(
            check_registration(&registration),
            Err(AuthError::Invalid(ValidationError::MissingPhone))
        ));
    }
}
