//! Pipeline invocation and run inspection endpoints. The pipelines are
//! blocking, so invocations run on the blocking pool; the request waits
//! for the batch to finish and gets the report back.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use providers_module::onesignal::OneSignalClient;
use providers_module::openphone::OpenPhoneClient;
use providers_module::perplexity::PerplexityClient;
use serde::Deserialize;
use tokio::task;
use tracing::error;

use crate::classifier::Classifier;
use crate::export::{self, ExportFormat};
use crate::pipeline::{CleanupPipeline, PipelineError, RunRequest, TriagePipeline};
use crate::run_store::RunStoreError;

use super::auth::{json_error, verify_cron};
use super::state::AppState;

/// POST /runs/openphone
pub(super) async fn start_openphone_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RunRequest>,
) -> Response {
    if let Err(response) = verify_cron(&headers, &state) {
        return response;
    }

    let config = state.config.clone();
    let stores = state.stores.clone();
    let result = task::spawn_blocking(move || -> Result<_, PipelineError> {
        let openphone = OpenPhoneClient::from_env()?;
        let perplexity = PerplexityClient::from_env()
            .map_err(crate::classifier::ClassifierError::Perplexity)?;
        let classifier = Classifier::new(perplexity, config.perplexity_model.clone());
        let notifier = OneSignalClient::from_env();
        let pipeline = CleanupPipeline {
            openphone: &openphone,
            classifier: &classifier,
            runs: &stores.runs,
            summaries: &stores.summaries,
            drafts: &stores.drafts,
            rules: &stores.rules,
            notifier: notifier.as_ref(),
            max_conversations: config.max_conversations_per_run,
            static_phones: &config.suppressed_phones,
            static_phrases: &config.suppressed_phrases,
            ignored_auto_reply: config.ignored_auto_reply.as_deref(),
        };
        pipeline.execute(&request)
    })
    .await;

    match result {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(PipelineError::NotResumable { .. } | PipelineError::WrongSource { .. })) => {
            json_error(StatusCode::CONFLICT, "run cannot be resumed")
        }
        Ok(Err(PipelineError::RunStore(RunStoreError::NotFound(_)))) => {
            json_error(StatusCode::NOT_FOUND, "run not found")
        }
        Ok(Err(err)) => {
            error!("cleanup run failed: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
        Err(err) => {
            error!("spawn_blocking panicked: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TriageParams {
    lookback_days: Option<u32>,
}

/// POST /triage/gmail
pub(super) async fn run_gmail_triage(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<TriageParams>>,
) -> Response {
    if let Err(response) = verify_cron(&headers, &state) {
        return response;
    }
    let params = body.map(|Json(params)| params).unwrap_or_default();

    let config = state.config.clone();
    let stores = state.stores.clone();
    let result = task::spawn_blocking(move || -> Result<_, PipelineError> {
        let perplexity = PerplexityClient::from_env()
            .map_err(crate::classifier::ClassifierError::Perplexity)?;
        let classifier = Classifier::new(perplexity, config.perplexity_model.clone());
        let pipeline = TriagePipeline {
            classifier: &classifier,
            runs: &stores.runs,
            accounts: &stores.accounts,
            rules: &stores.rules,
            email_logs: &stores.email_logs,
            lookback_days: params.lookback_days.unwrap_or(config.lookback_days),
        };
        pipeline.execute()
    })
    .await;

    match result {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(err)) => {
            error!("gmail triage failed: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
        Err(err) => {
            error!("spawn_blocking panicked: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ListRunsParams {
    limit: Option<u32>,
}

/// GET /runs
pub(super) async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<ListRunsParams>,
) -> Response {
    let stores = state.stores.clone();
    let limit = params.limit.unwrap_or(50);
    let result = task::spawn_blocking(move || stores.runs.list_runs(limit)).await;
    match result {
        Ok(Ok(runs)) => (StatusCode::OK, Json(runs)).into_response(),
        Ok(Err(err)) => {
            error!("list runs failed: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "database error")
        }
        Err(err) => {
            error!("spawn_blocking panicked: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// GET /runs/:id
pub(super) async fn get_run(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let stores = state.stores.clone();
    let result = task::spawn_blocking(move || stores.runs.get_run(&id)).await;
    match result {
        Ok(Ok(run)) => (StatusCode::OK, Json(run)).into_response(),
        Ok(Err(RunStoreError::NotFound(_))) => json_error(StatusCode::NOT_FOUND, "run not found"),
        Ok(Err(err)) => {
            error!("get run failed: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "database error")
        }
        Err(err) => {
            error!("spawn_blocking panicked: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// GET /runs/:id/summaries
pub(super) async fn list_summaries(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let stores = state.stores.clone();
    let result = task::spawn_blocking(move || stores.summaries.list_for_run(&id)).await;
    match result {
        Ok(Ok(summaries)) => (StatusCode::OK, Json(summaries)).into_response(),
        Ok(Err(err)) => {
            error!("list summaries failed: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "database error")
        }
        Err(err) => {
            error!("spawn_blocking panicked: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ExportParams {
    format: Option<String>,
}

/// GET /runs/:id/export?format=csv|json|html
pub(super) async fn export_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ExportParams>,
) -> Response {
    let format = match ExportFormat::parse(params.format.as_deref().unwrap_or("csv")) {
        Ok(format) => format,
        Err(err) => return json_error(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let stores = state.stores.clone();
    let result = task::spawn_blocking(move || {
        let summaries = stores.summaries.list_for_run(&id)?;
        Ok::<_, crate::summary_store::SummaryStoreError>(summaries)
    })
    .await;

    let summaries = match result {
        Ok(Ok(summaries)) => summaries,
        Ok(Err(err)) => {
            error!("export failed: {err}");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "database error");
        }
        Err(err) => {
            error!("spawn_blocking panicked: {err}");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    };

    match export::export_summaries(&summaries, format) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, format.content_type())],
            body,
        )
            .into_response(),
        Err(err) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
    }
}
