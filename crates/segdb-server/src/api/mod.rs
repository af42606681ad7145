mod clustering;
mod customers;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use segdb_compute::ComputeClient;
use segdb_core::Pagination;
use segdb_db::SegmentationStore;
use segdb_engine::{ClusterError, Page, QueryService, RunCoordinator};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{request_id, RequestId, REQUEST_ID_HEADER};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RunCoordinator>,
    pub query: QueryService,
    pub store: Arc<dyn SegmentationStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn SegmentationStore>, compute: ComputeClient) -> Self {
        Self {
            coordinator: Arc::new(RunCoordinator::new(Arc::clone(&store), compute)),
            query: QueryService::new(Arc::clone(&store)),
            store,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn ok(request_id: String, data: T) -> Self {
        Self {
            success: true,
            data,
            pagination: None,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl<T: Serialize> ApiResponse<Vec<T>> {
    pub(super) fn paged(request_id: String, page: Page<T>) -> Self {
        Self {
            success: true,
            data: page.items,
            pagination: Some(page.pagination),
            meta: ResponseMeta::new(request_id),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    pub(super) fn validation(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(request_id, "validation_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "validation_error" | "no_data" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "upstream_error" | "upstream_contract_violation" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Converts an engine error into the response envelope. Persistence
/// details stay in the log.
pub(super) fn map_cluster_error(request_id: String, error: &ClusterError) -> ApiError {
    match error {
        ClusterError::Persistence(e) => {
            tracing::error!(error = %e, "store operation failed");
            ApiError::new(request_id, error.code(), "database operation failed")
        }
        ClusterError::Upstream(_) | ClusterError::UpstreamContractViolation(_) => {
            tracing::warn!(error = %error, "compute engine call failed");
            ApiError::new(request_id, error.code(), error.to_string())
        }
        _ => ApiError::new(request_id, error.code(), error.to_string()),
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/clustering/run", post(clustering::run_clustering))
        .route("/api/v1/clustering/elbow", get(clustering::elbow))
        .route(
            "/api/v1/clustering/results/latest",
            get(clustering::latest_result),
        )
        .route(
            "/api/v1/clustering/results/history",
            get(clustering::result_history),
        )
        .route(
            "/api/v1/clustering/results/{result_id}",
            get(clustering::result_detail),
        )
        .route(
            "/api/v1/clustering/results/{result_id}/visualizations",
            get(clustering::result_visualizations),
        )
        .route("/api/v1/clustering/predict", post(clustering::predict))
        .route("/api/v1/clustering/profiles", get(clustering::profiles))
        .route(
            "/api/v1/clustering/sample-data",
            post(clustering::load_sample_data),
        )
        .route("/api/v1/customers", get(customers::list_customers))
        .route(
            "/api/v1/customers/statistics",
            get(customers::customer_statistics),
        )
        .route(
            "/api/v1/customers/bulk-import",
            post(customers::bulk_import),
        )
        .route(
            "/api/v1/customers/{customer_id}",
            get(customers::get_customer),
        )
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(api_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok(
                req_id.0,
                HealthData {
                    status: "ok",
                    database: "ok",
                },
            )),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            let mut body = ApiResponse::ok(
                req_id.0,
                HealthData {
                    status: "degraded",
                    database: "unavailable",
                },
            );
            body.success = false;
            (StatusCode::SERVICE_UNAVAILABLE, Json(body))
        }
    }
}
