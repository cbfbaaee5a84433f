pub mod audit;
pub mod auth;
pub mod catchers;
pub mod config;
pub mod cors;
pub mod error;
pub mod geocode;
pub mod pg_store;
pub mod processor;
pub mod routes;
pub mod store;
pub mod utils;
pub mod viewer;
pub use shared::{models::*, error::*, session::*, user_info::*};

use rocket::{catchers, routes, Build, Rocket};

use crate::catchers::{bad_request, forbidden, internal_error, not_found, unauthorized, unprocessable};
use crate::cors::CORS;
use crate::routes::*;

/// Mounts the contest API under `/api`.
pub fn build_rocket(state: AppState) -> Rocket<Build> {
    let cors = CORS::new(state.config.allowed_origin.clone());

    rocket::build()
        .attach(cors)
        .manage(state)
        .mount(
            "/api",
            routes![
                list_entries,
                stream_entries,
                create_entry,
                cast_vote,
                map,
                session,
                sign_in_anonymously,
                login,
                register,
                logout,
                resume,
                override_votes,
                delete_entry,
                export_entries,
                seed,
                all_options
            ],
        )
        .register(
            "/",
            catchers![
                unauthorized,
                forbidden,
                bad_request,
                unprocessable,
                internal_error,
                not_found
            ],
        )
}

#[cfg(test)]
mod tests;
