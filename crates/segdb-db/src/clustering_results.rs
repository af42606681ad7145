//! Database operations for the `clustering_results` table.
//!
//! A result row moves `pending → completed | failed` exactly once. Every
//! transition is a conditional `UPDATE ... WHERE status = 'pending'`, so a
//! row that already reached a terminal status is never rewritten.

use chrono::{DateTime, Utc};
use segdb_core::{Algorithm, ClusterMetrics, PageRequest, Parameters, RunStatus, Visualizations};
use sqlx::{types::Json, PgExecutor, PgPool};
use uuid::Uuid;

use crate::model::{Assignment, ClusteringResult, NewClusteringResult, ResultSummary, RunCommit};
use crate::customers;
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A `clustering_results` row without the visualization column.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResultSummaryRow {
    pub id: i64,
    pub result_id: Uuid,
    pub algorithm: String,
    pub parameters: Json<Parameters>,
    pub metrics: Json<ClusterMetrics>,
    pub feature_names: Vec<String>,
    pub pca_variance_explained: Vec<f64>,
    pub status: String,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A full `clustering_results` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClusteringResultRow {
    #[sqlx(flatten)]
    pub summary: ResultSummaryRow,
    pub visualizations: Json<Visualizations>,
}

impl TryFrom<ResultSummaryRow> for ResultSummary {
    type Error = DbError;

    fn try_from(row: ResultSummaryRow) -> Result<Self, Self::Error> {
        Ok(ResultSummary {
            id: row.id,
            result_id: row.result_id,
            algorithm: row.algorithm.parse::<Algorithm>()?,
            parameters: row.parameters.0,
            metrics: row.metrics.0,
            feature_names: row.feature_names,
            pca_variance_explained: row.pca_variance_explained,
            status: row.status.parse::<RunStatus>()?,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<ClusteringResultRow> for ClusteringResult {
    type Error = DbError;

    fn try_from(row: ClusteringResultRow) -> Result<Self, Self::Error> {
        Ok(ClusteringResult {
            summary: ResultSummary::try_from(row.summary)?,
            visualizations: row.visualizations.0,
        })
    }
}

const SUMMARY_COLUMNS: &str = "id, result_id, algorithm, parameters, metrics, feature_names, \
                               pca_variance_explained, status, error_message, started_at, \
                               completed_at, created_at";

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Inserts a new result row with `status = 'pending'`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_pending_result(
    pool: &PgPool,
    new: &NewClusteringResult,
) -> Result<ResultSummary, DbError> {
    let row = sqlx::query_as::<_, ResultSummaryRow>(&format!(
        "INSERT INTO clustering_results \
             (result_id, algorithm, parameters, metrics, visualizations, feature_names, \
              pca_variance_explained, status, started_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8) \
         RETURNING {SUMMARY_COLUMNS}"
    ))
    .bind(new.result_id)
    .bind(new.algorithm.as_str())
    .bind(Json(&new.parameters))
    .bind(Json(&new.metrics))
    .bind(Json(&new.visualizations))
    .bind(&new.feature_names)
    .bind(&new.pca_variance_explained)
    .bind(new.started_at)
    .fetch_one(pool)
    .await?;

    ResultSummary::try_from(row)
}

/// Returns `true` when a `completed` result of `algorithm` started strictly
/// after `started_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn newer_completed_exists<'e, E>(
    executor: E,
    algorithm: Algorithm,
    started_at: DateTime<Utc>,
) -> Result<bool, DbError>
where
    E: PgExecutor<'e>,
{
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS ( \
             SELECT 1 FROM clustering_results \
             WHERE algorithm = $1 AND status = 'completed' AND started_at > $2 \
         )",
    )
    .bind(algorithm.as_str())
    .bind(started_at)
    .fetch_one(executor)
    .await?;

    Ok(exists)
}

/// Marks a pending result `completed` unless a later-started run of the same
/// algorithm has already completed.
///
/// Returns `false` when the row was not pending or was superseded; the
/// caller decides how to report that.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn complete_result<'e, E>(executor: E, id: i64) -> Result<bool, DbError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE clustering_results AS r \
         SET status = 'completed', completed_at = NOW() \
         WHERE r.id = $1 \
           AND r.status = 'pending' \
           AND NOT EXISTS ( \
               SELECT 1 FROM clustering_results AS newer \
               WHERE newer.algorithm = r.algorithm \
                 AND newer.status = 'completed' \
                 AND newer.started_at > r.started_at \
           )",
    )
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Writes a run's assignments and marks its result `completed` in one
/// transaction.
///
/// Commits of the same algorithm are serialized by a transaction-scoped
/// advisory lock, so the newer-run check, the assignment write and the
/// status change see one consistent view. A superseded run rolls back
/// without touching any customer.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement or the commit fails; the
/// transaction is rolled back.
pub async fn commit_run(
    pool: &PgPool,
    result: &ResultSummary,
    assignments: &[Assignment],
) -> Result<RunCommit, DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::BIGINT)")
        .bind(format!("segdb:commit:{}", result.algorithm.as_str()))
        .execute(&mut *tx)
        .await?;

    if newer_completed_exists(&mut *tx, result.algorithm, result.started_at).await? {
        tracing::debug!(result_id = %result.result_id, "newer run already completed");
        return Ok(RunCommit::Superseded);
    }

    let reassigned = customers::apply_assignments(&mut *tx, assignments).await?;

    if !complete_result(&mut *tx, result.id).await? {
        tracing::debug!(result_id = %result.result_id, "result no longer pending");
        return Ok(RunCommit::Superseded);
    }

    tx.commit().await?;
    Ok(RunCommit::Completed { reassigned })
}

/// Marks a pending result `failed` with an error message.
///
/// # Errors
///
/// Returns [`DbError::InvalidResultTransition`] if the row is not pending,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn fail_result(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE clustering_results \
         SET status = 'failed', error_message = $2, completed_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(error_message)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidResultTransition {
            id,
            expected_status: "pending",
        });
    }

    Ok(())
}

/// Fails every result that has been `pending` since before `older_than`.
/// Returns the number of rows transitioned.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_stale_pending(
    pool: &PgPool,
    older_than: DateTime<Utc>,
    error_message: &str,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE clustering_results \
         SET status = 'failed', error_message = $2, completed_at = NOW() \
         WHERE status = 'pending' AND started_at < $1",
    )
    .bind(older_than)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// The most recently started `completed` result, optionally restricted to
/// one algorithm.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_completed_result(
    pool: &PgPool,
    algorithm: Option<Algorithm>,
) -> Result<Option<ClusteringResult>, DbError> {
    let row = sqlx::query_as::<_, ClusteringResultRow>(&format!(
        "SELECT {SUMMARY_COLUMNS}, visualizations FROM clustering_results \
         WHERE status = 'completed' AND ($1::TEXT IS NULL OR algorithm = $1) \
         ORDER BY started_at DESC, created_at DESC, id DESC \
         LIMIT 1"
    ))
    .bind(algorithm.map(Algorithm::as_str))
    .fetch_optional(pool)
    .await?;

    row.map(ClusteringResult::try_from).transpose()
}

/// Fetches one result, including visualizations, by its public id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_result(pool: &PgPool, result_id: Uuid) -> Result<Option<ClusteringResult>, DbError> {
    let row = sqlx::query_as::<_, ClusteringResultRow>(&format!(
        "SELECT {SUMMARY_COLUMNS}, visualizations FROM clustering_results WHERE result_id = $1"
    ))
    .bind(result_id)
    .fetch_optional(pool)
    .await?;

    row.map(ClusteringResult::try_from).transpose()
}

/// Counts result rows of every status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_results(pool: &PgPool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clustering_results")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// One page of result summaries, newest first. Visualizations are not read.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_results(pool: &PgPool, page: PageRequest) -> Result<Vec<ResultSummary>, DbError> {
    let rows = sqlx::query_as::<_, ResultSummaryRow>(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM clustering_results \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1 OFFSET $2"
    ))
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ResultSummary::try_from).collect()
}

/// The internal id of the latest completed result for each algorithm that
/// has one.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_completed_per_algorithm(pool: &PgPool) -> Result<Vec<(Algorithm, i64)>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT DISTINCT ON (algorithm) algorithm, id \
         FROM clustering_results \
         WHERE status = 'completed' \
         ORDER BY algorithm, started_at DESC, created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(algorithm, id)| Ok((algorithm.parse::<Algorithm>()?, id)))
        .collect()
}
