use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use segdb_compute::ElbowCurve;
use segdb_core::{Algorithm, CustomerRecord};
use segdb_db::ResultSummary;
use segdb_engine::{
    PredictOutcome, ProfileSummary, ResultVisualizations, ResultWithProfiles, RunOutcome,
    SampleLoad,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_cluster_error, ApiError, ApiResponse, AppState};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn default_algorithm() -> String {
    Algorithm::Kmeans.as_str().to_owned()
}

#[derive(Debug, Deserialize)]
pub(super) struct RunRequest {
    #[serde(default = "default_algorithm")]
    algorithm: String,
    #[serde(default)]
    params: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ElbowQuery {
    k_min: Option<i64>,
    k_max: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AlgorithmQuery {
    algorithm: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PredictRequest {
    customer: Option<CustomerRecord>,
    #[serde(default = "default_algorithm")]
    algorithm: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct SampleDataQuery {
    #[serde(default)]
    clear_existing: bool,
}

fn parse_algorithm(request_id: &str, raw: Option<&str>) -> Result<Option<Algorithm>, ApiError> {
    raw.map(str::parse::<Algorithm>)
        .transpose()
        .map_err(|e| ApiError::validation(request_id, e.to_string()))
}

fn parse_result_id(
    request_id: &str,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::validation(request_id, "result_id must be a UUID"))
}

/// Starts a run on a detached task so the run commits or fails on its own
/// even if the caller disconnects.
pub(super) async fn run_clustering(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> ApiResult<RunOutcome> {
    let Json(body) = payload.map_err(|e| ApiError::validation(req_id.0.clone(), e.body_text()))?;
    let (algorithm, params) = segdb_engine::parse_run_request(&body.algorithm, body.params)
        .map_err(|e| map_cluster_error(req_id.0.clone(), &e))?;

    let coordinator = Arc::clone(&state.coordinator);
    let run = tokio::spawn(async move { coordinator.run_clustering(algorithm, params).await });

    let outcome = match run.await {
        Ok(result) => result.map_err(|e| map_cluster_error(req_id.0.clone(), &e))?,
        Err(join_error) => {
            tracing::error!(%algorithm, error = %join_error, "clustering task did not finish");
            return Err(ApiError::new(
                req_id.0,
                "internal_error",
                "clustering task did not finish",
            ));
        }
    };

    Ok(Json(ApiResponse::ok(req_id.0, outcome)))
}

pub(super) async fn elbow(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    query: Result<Query<ElbowQuery>, QueryRejection>,
) -> ApiResult<ElbowCurve> {
    let Query(query) = query.map_err(|e| ApiError::validation(req_id.0.clone(), e.body_text()))?;
    let curve = state
        .coordinator
        .elbow(query.k_min, query.k_max)
        .await
        .map_err(|e| map_cluster_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::ok(req_id.0, curve)))
}

pub(super) async fn latest_result(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    query: Result<Query<AlgorithmQuery>, QueryRejection>,
) -> ApiResult<ResultWithProfiles> {
    let Query(query) = query.map_err(|e| ApiError::validation(req_id.0.clone(), e.body_text()))?;
    let algorithm = parse_algorithm(&req_id.0, query.algorithm.as_deref())?;
    let latest = state
        .query
        .latest_result(algorithm)
        .await
        .map_err(|e| map_cluster_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::ok(req_id.0, latest)))
}

pub(super) async fn result_history(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Vec<ResultSummary>> {
    let Query(query) = query.map_err(|e| ApiError::validation(req_id.0.clone(), e.body_text()))?;
    let page = state
        .query
        .history(query.page, query.limit)
        .await
        .map_err(|e| map_cluster_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::paged(req_id.0, page)))
}

pub(super) async fn result_detail(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ResultWithProfiles> {
    let result_id = parse_result_id(&req_id.0, path)?;
    let detail = state
        .query
        .result_detail(result_id)
        .await
        .map_err(|e| map_cluster_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::ok(req_id.0, detail)))
}

pub(super) async fn result_visualizations(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ResultVisualizations> {
    let result_id = parse_result_id(&req_id.0, path)?;
    let visualizations = state
        .query
        .visualizations(result_id)
        .await
        .map_err(|e| map_cluster_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::ok(req_id.0, visualizations)))
}

pub(super) async fn predict(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> ApiResult<PredictOutcome> {
    let Json(body) = payload.map_err(|e| ApiError::validation(req_id.0.clone(), e.body_text()))?;
    let Some(customer) = body.customer else {
        return Err(ApiError::validation(req_id.0, "customer data required"));
    };
    let algorithm = body
        .algorithm
        .parse::<Algorithm>()
        .map_err(|e| ApiError::validation(req_id.0.clone(), e.to_string()))?;

    let outcome = state
        .coordinator
        .predict(customer, algorithm)
        .await
        .map_err(|e| map_cluster_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::ok(req_id.0, outcome)))
}

pub(super) async fn profiles(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    query: Result<Query<AlgorithmQuery>, QueryRejection>,
) -> ApiResult<ProfileSummary> {
    let Query(query) = query.map_err(|e| ApiError::validation(req_id.0.clone(), e.body_text()))?;
    let algorithm = parse_algorithm(&req_id.0, query.algorithm.as_deref())?;
    let summary = state
        .query
        .profiles(algorithm)
        .await
        .map_err(|e| map_cluster_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::ok(req_id.0, summary)))
}

pub(super) async fn load_sample_data(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    query: Result<Query<SampleDataQuery>, QueryRejection>,
) -> ApiResult<SampleLoad> {
    let Query(query) = query.map_err(|e| ApiError::validation(req_id.0.clone(), e.body_text()))?;
    let loaded = state
        .coordinator
        .load_sample_data(query.clear_existing)
        .await
        .map_err(|e| map_cluster_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::ok(req_id.0, loaded)))
}
