use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tokio::task;
use tracing::info;

use super::config::ServiceConfig;
use super::state::{AppState, Stores};
use super::{admin, auth, drafts, runs, BoxError};

pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let config = Arc::new(config);
    let db_path = config.db_path.clone();
    let stores = Arc::new(
        task::spawn_blocking(move || Stores::open(&db_path))
            .await
            .map_err(|err| -> BoxError { err.into() })??,
    );

    let state = AppState {
        config: config.clone(),
        stores,
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!("triage service listening on {}", addr);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/auth/login", post(auth::login))
        .route("/runs/openphone", post(runs::start_openphone_run))
        .route("/triage/gmail", post(runs::run_gmail_triage))
        .route("/runs", get(runs::list_runs))
        .route("/runs/:id", get(runs::get_run))
        .route("/runs/:id/summaries", get(runs::list_summaries))
        .route("/runs/:id/export", get(runs::export_run))
        .route("/drafts", get(drafts::list_drafts))
        .route("/drafts/send-approved", post(drafts::send_approved_drafts))
        .route("/drafts/:id/approve", post(drafts::approve_draft))
        .route("/drafts/:id/reject", post(drafts::reject_draft))
        .route("/drafts/:id/send", post(drafts::send_draft))
        .route(
            "/admin/suppressions",
            get(admin::list_suppressions).post(admin::add_suppression),
        )
        .route("/admin/suppressions/:id", delete(admin::delete_suppression))
        .route("/admin/rules", get(admin::list_rules).post(admin::add_rule))
        .route("/admin/rules/:id", delete(admin::delete_rule))
        .route("/admin/accounts", get(admin::list_accounts))
        .route(
            "/admin/accounts/:id",
            put(admin::upsert_account).delete(admin::delete_account),
        )
        .route("/admin/email-logs", get(admin::list_email_logs))
        .route("/tasks", get(admin::list_tasks).post(admin::create_task))
        .route("/tasks/:id/status", post(admin::set_task_status))
        .route("/tasks/:id", delete(admin::delete_task))
        .route(
            "/templates",
            get(admin::list_templates).post(admin::create_template),
        )
        .route(
            "/templates/:id",
            put(admin::update_template).delete(admin::delete_template),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
