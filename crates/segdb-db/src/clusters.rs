//! Database operations for the `clusters` table (per-result profile snapshots).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use segdb_core::Algorithm;
use sqlx::{types::Json, PgPool};

use crate::model::{ClusterSnapshot, NewCluster, ResultSummary};
use crate::DbError;

/// A row from the `clusters` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClusterRow {
    pub id: i64,
    pub clustering_result_id: i64,
    pub algorithm: String,
    pub cluster_id: i32,
    pub label: String,
    pub size: i32,
    pub percentage: f64,
    pub features: Json<BTreeMap<String, f64>>,
    pub marketing_notes: Json<Vec<String>>,
    pub retired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ClusterRow> for ClusterSnapshot {
    type Error = DbError;

    fn try_from(row: ClusterRow) -> Result<Self, Self::Error> {
        Ok(ClusterSnapshot {
            id: row.id,
            clustering_result_id: row.clustering_result_id,
            algorithm: row.algorithm.parse::<Algorithm>()?,
            cluster_id: row.cluster_id,
            label: row.label,
            size: row.size,
            percentage: row.percentage,
            features: row.features.0,
            marketing_notes: row.marketing_notes.0,
            retired_at: row.retired_at,
            created_at: row.created_at,
        })
    }
}

const CLUSTER_COLUMNS: &str = "id, clustering_result_id, algorithm, cluster_id, label, size, \
                               percentage, features, marketing_notes, retired_at, created_at";

/// Writes every profile of `result` in one transaction; either all rows
/// land or none do.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails (including duplicate
/// `cluster_id` values within the result).
pub async fn insert_clusters(
    pool: &PgPool,
    result: &ResultSummary,
    clusters: &[NewCluster],
) -> Result<Vec<ClusterSnapshot>, DbError> {
    let mut tx = pool.begin().await?;
    let mut inserted = Vec::with_capacity(clusters.len());

    for cluster in clusters {
        let row = sqlx::query_as::<_, ClusterRow>(&format!(
            "INSERT INTO clusters \
                 (clustering_result_id, algorithm, cluster_id, label, size, percentage, \
                  features, marketing_notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {CLUSTER_COLUMNS}"
        ))
        .bind(result.id)
        .bind(result.algorithm.as_str())
        .bind(cluster.cluster_id)
        .bind(&cluster.label)
        .bind(cluster.size)
        .bind(cluster.percentage)
        .bind(Json(&cluster.features))
        .bind(Json(&cluster.marketing_notes))
        .fetch_one(&mut *tx)
        .await?;

        inserted.push(ClusterSnapshot::try_from(row)?);
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Profiles owned by one result, ordered by `cluster_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn clusters_for_result(
    pool: &PgPool,
    clustering_result_id: i64,
) -> Result<Vec<ClusterSnapshot>, DbError> {
    let rows = sqlx::query_as::<_, ClusterRow>(&format!(
        "SELECT {CLUSTER_COLUMNS} FROM clusters \
         WHERE clustering_result_id = $1 \
         ORDER BY cluster_id"
    ))
    .bind(clustering_result_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ClusterSnapshot::try_from).collect()
}

/// Retires live profiles of `algorithm` that belong to results started no
/// later than `current_id`'s result. Profiles of later-started runs are left
/// alone. Returns the number of rows retired.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn retire_superseded_clusters(
    pool: &PgPool,
    algorithm: Algorithm,
    current_id: i64,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE clusters AS c \
         SET retired_at = NOW() \
         FROM clustering_results AS r, clustering_results AS cur \
         WHERE c.clustering_result_id = r.id \
           AND cur.id = $2 \
           AND c.algorithm = $1 \
           AND c.retired_at IS NULL \
           AND r.id <> cur.id \
           AND r.started_at <= cur.started_at",
    )
    .bind(algorithm.as_str())
    .bind(current_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
