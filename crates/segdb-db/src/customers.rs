//! Database operations for the `customers` table.

use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use segdb_core::{Customer, CustomerRecord, Gender, PageRequest, Segment};
use sqlx::{PgExecutor, PgPool};

use crate::model::{Assignment, ClusterCount, CustomerFilter, CustomerStatistics, ImportStats};
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `customers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomerRow {
    pub customer_id: i64,
    pub gender: String,
    pub age: i32,
    pub annual_income: f64,
    pub spending_score: f64,
    pub cluster_id: Option<i32>,
    pub cluster_label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The feature projection of a customer row; assignment columns are not selected.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeatureRow {
    customer_id: i64,
    gender: String,
    age: i32,
    annual_income: f64,
    spending_score: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct OverallStatsRow {
    total_customers: i64,
    avg_age: Option<f64>,
    avg_income: Option<f64>,
    avg_spending: Option<f64>,
    min_age: Option<i32>,
    max_age: Option<i32>,
    min_income: Option<f64>,
    max_income: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct ClusterCountRow {
    cluster_id: i32,
    label: Option<String>,
    count: i64,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = DbError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        let segment = match (row.cluster_id, row.cluster_label) {
            (Some(cluster_id), Some(label)) => Some(Segment { cluster_id, label }),
            (None, None) => None,
            _ => {
                return Err(DbError::Corrupt(format!(
                    "customer {} has a half-set segmentation",
                    row.customer_id
                )))
            }
        };

        Ok(Customer {
            customer_id: row.customer_id,
            gender: row.gender.parse::<Gender>()?,
            age: row.age,
            annual_income: row.annual_income,
            spending_score: row.spending_score,
            segment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<FeatureRow> for CustomerRecord {
    type Error = DbError;

    fn try_from(row: FeatureRow) -> Result<Self, Self::Error> {
        Ok(CustomerRecord {
            customer_id: row.customer_id,
            gender: row.gender.parse::<Gender>()?,
            age: row.age,
            annual_income: row.annual_income,
            spending_score: row.spending_score,
        })
    }
}

const CUSTOMER_COLUMNS: &str = "customer_id, gender, age, annual_income, spending_score, \
                                cluster_id, cluster_label, created_at, updated_at";

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Streams the identifier and feature columns of every customer, ordered by
/// `customer_id`. Rows are decoded as they arrive rather than buffered.
pub fn stream_customer_records(pool: &PgPool) -> BoxStream<'_, Result<CustomerRecord, DbError>> {
    sqlx::query_as::<_, FeatureRow>(
        "SELECT customer_id, gender, age, annual_income, spending_score \
         FROM customers \
         ORDER BY customer_id",
    )
    .fetch(pool)
    .map(|row| row.map_err(DbError::from).and_then(CustomerRecord::try_from))
    .boxed()
}

/// Counts customers matching `filter`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_customers(pool: &PgPool, filter: &CustomerFilter) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM customers \
         WHERE ($1::INTEGER IS NULL OR cluster_id = $1) \
           AND ($2::TEXT IS NULL OR gender = $2)",
    )
    .bind(filter.cluster_id)
    .bind(filter.gender.map(Gender::as_str))
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Returns one page of customers matching `filter`, ordered by `customer_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Corrupt`] if
/// a row violates the segmentation pair invariant.
pub async fn list_customers(
    pool: &PgPool,
    filter: &CustomerFilter,
    page: PageRequest,
) -> Result<Vec<Customer>, DbError> {
    let rows = sqlx::query_as::<_, CustomerRow>(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers \
         WHERE ($1::INTEGER IS NULL OR cluster_id = $1) \
           AND ($2::TEXT IS NULL OR gender = $2) \
         ORDER BY customer_id \
         LIMIT $3 OFFSET $4"
    ))
    .bind(filter.cluster_id)
    .bind(filter.gender.map(Gender::as_str))
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Customer::try_from).collect()
}

/// Fetches a single customer by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_customer(pool: &PgPool, customer_id: i64) -> Result<Option<Customer>, DbError> {
    let row = sqlx::query_as::<_, CustomerRow>(&format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE customer_id = $1"
    ))
    .bind(customer_id)
    .fetch_optional(pool)
    .await?;

    row.map(Customer::try_from).transpose()
}

/// Aggregates over the whole population plus live per-cluster counts.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn customer_statistics(pool: &PgPool) -> Result<CustomerStatistics, DbError> {
    let overall = sqlx::query_as::<_, OverallStatsRow>(
        "SELECT COUNT(*) AS total_customers, \
                AVG(age)::FLOAT8 AS avg_age, \
                AVG(annual_income) AS avg_income, \
                AVG(spending_score) AS avg_spending, \
                MIN(age) AS min_age, \
                MAX(age) AS max_age, \
                MIN(annual_income) AS min_income, \
                MAX(annual_income) AS max_income \
         FROM customers",
    )
    .fetch_one(pool)
    .await?;

    let clusters = sqlx::query_as::<_, ClusterCountRow>(
        "SELECT cluster_id, MIN(cluster_label) AS label, COUNT(*) AS count \
         FROM customers \
         WHERE cluster_id IS NOT NULL \
         GROUP BY cluster_id \
         ORDER BY cluster_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(CustomerStatistics {
        total_customers: overall.total_customers,
        avg_age: overall.avg_age,
        avg_income: overall.avg_income,
        avg_spending: overall.avg_spending,
        min_age: overall.min_age,
        max_age: overall.max_age,
        min_income: overall.min_income,
        max_income: overall.max_income,
        clusters: clusters
            .into_iter()
            .map(|row| ClusterCount {
                cluster_id: row.cluster_id,
                label: row.label.unwrap_or_default(),
                count: row.count,
            })
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Inserts or updates customers keyed by `customer_id`.
///
/// Conflicts update demographics and features only; an existing
/// segmentation is left in place.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails (including CHECK violations).
pub async fn upsert_customers<'e, E>(
    executor: E,
    records: &[CustomerRecord],
) -> Result<ImportStats, DbError>
where
    E: PgExecutor<'e>,
{
    if records.is_empty() {
        return Ok(ImportStats::default());
    }

    let ids: Vec<i64> = records.iter().map(|r| r.customer_id).collect();
    let genders: Vec<&str> = records.iter().map(|r| r.gender.as_str()).collect();
    let ages: Vec<i32> = records.iter().map(|r| r.age).collect();
    let incomes: Vec<f64> = records.iter().map(|r| r.annual_income).collect();
    let spending: Vec<f64> = records.iter().map(|r| r.spending_score).collect();

    // `xmax = 0` is true only for freshly inserted tuples.
    let inserted_flags = sqlx::query_scalar::<_, bool>(
        "INSERT INTO customers (customer_id, gender, age, annual_income, spending_score) \
         SELECT * FROM UNNEST($1::BIGINT[], $2::TEXT[], $3::INTEGER[], \
                              $4::DOUBLE PRECISION[], $5::DOUBLE PRECISION[]) \
         ON CONFLICT (customer_id) DO UPDATE SET \
             gender         = EXCLUDED.gender, \
             age            = EXCLUDED.age, \
             annual_income  = EXCLUDED.annual_income, \
             spending_score = EXCLUDED.spending_score, \
             updated_at     = NOW() \
         RETURNING (xmax = 0) AS inserted",
    )
    .bind(&ids)
    .bind(&genders)
    .bind(&ages)
    .bind(&incomes)
    .bind(&spending)
    .fetch_all(executor)
    .await?;

    let inserted = inserted_flags.iter().filter(|f| **f).count() as u64;
    let total = inserted_flags.len() as u64;
    Ok(ImportStats {
        inserted,
        updated: total - inserted,
        total,
    })
}

/// Deletes every customer. Returns the number of rows removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_all_customers<'e, E>(executor: E) -> Result<u64, DbError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM customers").execute(executor).await?;
    Ok(result.rows_affected())
}

/// Deletes every customer and loads `records` in one transaction. A failed
/// load leaves the previous population in place.
///
/// Returns the number of rows deleted and the load counts.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either statement or the commit fails.
pub async fn replace_customers(
    pool: &PgPool,
    records: &[CustomerRecord],
) -> Result<(u64, ImportStats), DbError> {
    let mut tx = pool.begin().await?;
    let deleted = delete_all_customers(&mut *tx).await?;
    let stats = upsert_customers(&mut *tx, records).await?;
    tx.commit().await?;
    Ok((deleted, stats))
}

/// Writes `cluster_id` and `cluster_label` for every listed customer in one
/// statement. No other customer column is touched, and rows already holding
/// the same segmentation are skipped, so re-applying is a no-op.
///
/// Returns the number of customers whose segmentation changed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn apply_assignments<'e, E>(
    executor: E,
    assignments: &[Assignment],
) -> Result<u64, DbError>
where
    E: PgExecutor<'e>,
{
    if assignments.is_empty() {
        return Ok(0);
    }

    let ids: Vec<i64> = assignments.iter().map(|a| a.customer_id).collect();
    let cluster_ids: Vec<i32> = assignments.iter().map(|a| a.cluster_id).collect();
    let labels: Vec<&str> = assignments.iter().map(|a| a.label.as_str()).collect();

    let result = sqlx::query(
        "UPDATE customers AS c \
         SET cluster_id = a.cluster_id, cluster_label = a.cluster_label, updated_at = NOW() \
         FROM UNNEST($1::BIGINT[], $2::INTEGER[], $3::TEXT[]) \
              AS a(customer_id, cluster_id, cluster_label) \
         WHERE c.customer_id = a.customer_id \
           AND (c.cluster_id IS DISTINCT FROM a.cluster_id \
                OR c.cluster_label IS DISTINCT FROM a.cluster_label)",
    )
    .bind(&ids)
    .bind(&cluster_ids)
    .bind(&labels)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
