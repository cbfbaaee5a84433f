use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use reqwest::{Client, StatusCode};
use rocket::async_trait;
use serde::{Deserialize, Serialize};
use shared::validation::{validate_credentials, ValidationError};
use shared::{AuthSession, Credentials, Identity, Registration};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::config::AuthConfig;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Aquest correu ja està registrat.")]
    EmailInUse,
    #[error("Contrasenya incorrecta.")]
    WrongPassword,
    #[error("Usuari no trobat.")]
    UserNotFound,
    #[error("Has d'acceptar les bases del concurs.")]
    TermsNotAccepted,
    #[error("Revisa el teu correu per confirmar el compte.")]
    ConfirmationPending,
    #[error("{0}")]
    Invalid(#[from] ValidationError),
    #[error("Sessió no vàlida.")]
    InvalidToken(String),
    #[error("Error en l'autenticació.")]
    Provider(String),
    #[error("Servei d'autenticació no disponible.")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { uid: String, anonymous: bool },
    SignedOut,
}

/// Managed identity provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_anonymously(&self) -> Result<AuthSession, AuthError>;

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<AuthSession, AuthError>;

    async fn register(&self, registration: &Registration) -> Result<AuthSession, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;

    fn events(&self) -> broadcast::Receiver<SessionEvent>;
}

pub fn check_registration(registration: &Registration) -> Result<(), AuthError> {
    if !registration.accept_terms {
        return Err(AuthError::TermsNotAccepted);
    }
    if registration.display_name.trim().is_empty() {
        return Err(ValidationError::MissingDisplayName.into());
    }
    if registration.phone.trim().is_empty() {
        return Err(ValidationError::MissingPhone.into());
    }
    validate_credentials(&registration.email, &registration.password)?;
    Ok(())
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Claims carried by the provider's access tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            uid: claims.sub,
            anonymous: claims.is_anonymous,
            email: claims.email.filter(|e| !e.is_empty()),
            display_name: claims.user_metadata.display_name.filter(|n| !n.is_empty()),
        }
    }
}

pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims.into())
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    is_anonymous: bool,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Deserialize)]
struct ProviderSession {
    #[serde(default)]
    access_token: Option<String>,
    user: Option<ProviderUser>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

pub(crate) fn map_provider_error(status: StatusCode, body: &str) -> AuthError {
    let parsed: ProviderError = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error_code.as_deref().or(parsed.error.as_deref()).unwrap_or_default();
    match code {
        "user_already_exists" | "email_exists" => AuthError::EmailInUse,
        "invalid_credentials" | "invalid_grant" => AuthError::WrongPassword,
        "user_not_found" => AuthError::UserNotFound,
        _ => {
            let message = parsed.msg.or(parsed.error_description).unwrap_or_else(|| body.to_string());
            AuthError::Provider(format!("{status}: {message}"))
        }
    }
}

/// REST client for a Supabase-compatible auth service.
pub struct SupabaseAuth {
    client: Client,
    base_url: String,
    api_key: String,
    events: broadcast::Sender<SessionEvent>,
}

impl SupabaseAuth {
    pub fn new(config: &AuthConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            events,
        }
    }

    async fn post_session(&self, path: &str, body: serde_json::Value) -> Result<AuthSession, AuthError> {
        let response = self.client
            .post(format!("{}/auth/v1/{}", self.base_url, path))
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let err = map_provider_error(status, &text);
            warn!("Auth provider rejected {}: {}", path, text);
            return Err(err);
        }

        let session: ProviderSession = serde_json::from_str(&text)
            .map_err(|e| AuthError::Provider(format!("unreadable session: {e}")))?;
        let (Some(access_token), Some(user)) = (session.access_token, session.user) else {
            return Err(AuthError::ConfirmationPending);
        };

        let session = AuthSession {
            access_token,
            uid: user.id,
            anonymous: user.is_anonymous,
            email: user.email.filter(|e| !e.is_empty()),
            display_name: user.user_metadata.display_name,
        };
        let _ = self.events.send(SessionEvent::SignedIn {
            uid: session.uid.clone(),
            anonymous: session.anonymous,
        });
        Ok(session)
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn sign_in_anonymously(&self) -> Result<AuthSession, AuthError> {
        self.post_session("signup", serde_json::json!({ "data": {} })).await
    }

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<AuthSession, AuthError> {
        self.post_session(
            "token?grant_type=password",
            serde_json::json!({ "email": credentials.email.trim(), "password": credentials.password }),
        )
        .await
    }

    async fn register(&self, registration: &Registration) -> Result<AuthSession, AuthError> {
        self.post_session(
            "signup",
            serde_json::json!({
                "email": registration.email.trim(),
                "password": registration.password,
                "data": {
                    "display_name": registration.display_name.trim(),
                    "phone": registration.phone.trim(),
                },
            }),
        )
        .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self.client
            .post(format!("{}/auth/v1/logout", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!("Logout returned {}: {}", status, text);
            return Err(map_provider_error(status, &text));
        }
        let _ = self.events.send(SessionEvent::SignedOut);
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

/// Logs sign-in and sign-out notifications until the provider goes away.
pub async fn log_session_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::SignedIn { uid, anonymous: true }) => debug!("Guest session started for {}", uid),
            Ok(SessionEvent::SignedIn { uid, anonymous: false }) => info!("👤 {} signed in", uid),
            Ok(SessionEvent::SignedOut) => info!("👋 Session ended"),
            Err(RecvError::Lagged(skipped)) => warn!("Skipped {} session events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}
