pub mod admin;
pub mod auth;
pub mod config;
pub mod dockets;
pub mod err;
pub mod io;
pub mod models;
pub mod pdf;
pub mod verification;

use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::io::DocumentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cfg = Arc::new(Config::load());

    let pg = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cfg.database_url)
        .await?;

    let docs = Arc::new(DocumentStore::new(&cfg.docs_dir));
    docs.prepare().await?;

    let app = Router::new()
        .route("/api", get(home))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/dockets/eligibility/:student_id", get(dockets::check_eligibility))
        .route("/dockets/generate", post(dockets::generate_docket))
        .route("/dockets/payments", get(dockets::list_payments))
        .route("/dockets/students/search", get(dockets::search_students))
        .route("/dockets/payments/update", post(dockets::update_payment))
        .route("/admin/settings", get(admin::get_settings).post(admin::update_settings))
        .route("/admin/blocked-students", get(admin::get_blocked_students))
        .route("/admin/students/:student_number/block", post(admin::block_student))
        .route("/admin/students/:student_number/unblock", post(admin::unblock_student))
        .route("/verification/verify", post(verification::verify_docket))
        .fallback(err::handler404.into_service())
        .layer(CorsLayer::permissive())
        .layer(Extension(pg))
        .layer(Extension(cfg.clone()))
        .layer(Extension(docs));

    log::info!("Starting Docket System HTTP server on http://{}", cfg.bind_addr);
    axum::Server::bind(&cfg.bind_addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

async fn home() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Docket System Backend Running" }))
}
