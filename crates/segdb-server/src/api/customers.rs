use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use segdb_core::{Customer, CustomerRecord, Gender};
use segdb_db::{CustomerFilter, CustomerStatistics, ImportStats};
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_cluster_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct CustomersQuery {
    page: Option<i64>,
    limit: Option<i64>,
    cluster_id: Option<i32>,
    gender: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct BulkImportRequest {
    customers: Vec<CustomerRecord>,
}

pub(super) async fn list_customers(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    query: Result<Query<CustomersQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<Customer>>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::validation(req_id.0.clone(), e.body_text()))?;
    let gender = query
        .gender
        .as_deref()
        .map(str::parse::<Gender>)
        .transpose()
        .map_err(|e| ApiError::validation(req_id.0.clone(), e.to_string()))?;
    let filter = CustomerFilter {
        cluster_id: query.cluster_id,
        gender,
    };

    let page = state
        .query
        .customers(filter, query.page, query.limit)
        .await
        .map_err(|e| map_cluster_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::paged(req_id.0, page)))
}

pub(super) async fn customer_statistics(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<CustomerStatistics>>, ApiError> {
    let stats = state
        .query
        .statistics()
        .await
        .map_err(|e| map_cluster_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::ok(req_id.0, stats)))
}

pub(super) async fn get_customer(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiResponse<Customer>>, ApiError> {
    let Path(customer_id) =
        path.map_err(|_| ApiError::validation(req_id.0.clone(), "customer_id must be an integer"))?;
    let customer = state
        .query
        .customer(customer_id)
        .await
        .map_err(|e| map_cluster_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::ok(req_id.0, customer)))
}

pub(super) async fn bulk_import(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    payload: Result<Json<BulkImportRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ImportStats>>, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::validation(req_id.0.clone(), e.body_text()))?;
    let stats = state
        .coordinator
        .import_customers(&body.customers)
        .await
        .map_err(|e| map_cluster_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::ok(req_id.0, stats)))
}
