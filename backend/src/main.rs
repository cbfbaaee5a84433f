use std::sync::Arc;

use backend::{
    auth::{log_session_events, AuthProvider, SupabaseAuth},
    build_rocket,
    config::AppConfig,
    geocode::Nominatim,
    pg_store::PgEntryStore,
    routes::AppState,
};
use shuttle_runtime::CustomError;
use sqlx::PgPool;
use tracing::info;

#[shuttle_runtime::main]
async fn rocket(
    #[shuttle_shared_db::Postgres] pool: PgPool,
    #[shuttle_runtime::Secrets] secret_store: shuttle_runtime::SecretStore,
) -> shuttle_rocket::ShuttleRocket {
    info!("🚀 Starting contest server");

    let config = AppConfig::from_lookup(|key| secret_store.get(key)).map_err(CustomError::new)?;
    info!("🛡️ {} administrator(s) configured", config.admins.len());

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(CustomError::new)?;

    info!("📋 Migrations complete");

    let store = PgEntryStore::connect(pool).await.map_err(CustomError::new)?;
    tokio::spawn(store.clone().listen());

    let auth = Arc::new(SupabaseAuth::new(&config.auth));
    tokio::spawn(log_session_events(auth.events()));

    let geocoder = Arc::new(Nominatim::new(
        config.geocoder_url.clone(),
        config.town.clone(),
        &format!("{}-contest/{}", config.contest_name, env!("CARGO_PKG_VERSION")),
    ));

    let app_state = AppState::new(config, store, auth, geocoder);
    if app_state.audit.is_enabled() {
        info!("📝 Submission audit webhook enabled");
    }
    Ok(build_rocket(app_state).into())
}
