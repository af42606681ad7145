//! Read-side tests over the in-memory store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use segdb_core::{Algorithm, ClusterMetrics, CustomerRecord, Gender};
use segdb_db::{
    Assignment, CustomerFilter, MemoryStore, NewCluster, NewClusteringResult, SegmentationStore,
};
use segdb_engine::{ClusterError, QueryService};
use uuid::Uuid;

fn service() -> (Arc<MemoryStore>, QueryService) {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn SegmentationStore> = store.clone();
    (store, QueryService::new(dyn_store))
}

fn new_result(algorithm: Algorithm, offset_secs: i64) -> NewClusteringResult {
    let mut visualizations = serde_json::Map::new();
    visualizations.insert("clusters_2d".to_owned(), "iVBORw0KGgo=".into());
    NewClusteringResult {
        result_id: Uuid::new_v4(),
        algorithm,
        parameters: serde_json::Map::new(),
        metrics: ClusterMetrics {
            n_clusters: 1,
            ..ClusterMetrics::default()
        },
        visualizations,
        feature_names: vec!["Age".to_owned()],
        pca_variance_explained: vec![],
        started_at: Utc::now() + Duration::seconds(offset_secs),
    }
}

fn cluster(label: &str) -> NewCluster {
    NewCluster {
        cluster_id: 0,
        label: label.to_owned(),
        size: 1,
        percentage: 100.0,
        features: BTreeMap::new(),
        marketing_notes: vec![],
    }
}

#[tokio::test]
async fn latest_result_is_not_found_before_any_run() {
    let (_, query) = service();
    let err = query.latest_result(None).await.unwrap_err();
    assert!(matches!(err, ClusterError::NotFound(_)));
}

#[tokio::test]
async fn latest_result_ignores_pending_and_failed_runs() {
    let (store, query) = service();
    let done = store
        .insert_pending_result(&new_result(Algorithm::Kmeans, 0))
        .await
        .unwrap();
    store.insert_clusters(&done, &[cluster("Done")]).await.unwrap();
    store.complete_result(done.id).await.unwrap();

    store
        .insert_pending_result(&new_result(Algorithm::Kmeans, 10))
        .await
        .unwrap();
    let failed = store
        .insert_pending_result(&new_result(Algorithm::Kmeans, 20))
        .await
        .unwrap();
    store.fail_result(failed.id, "boom").await.unwrap();

    let latest = query.latest_result(Some(Algorithm::Kmeans)).await.unwrap();
    assert_eq!(latest.result.summary.result_id, done.result_id);
    assert_eq!(latest.profiles[0].label, "Done");

    assert!(query.latest_result(Some(Algorithm::Dbscan)).await.is_err());
}

#[tokio::test]
async fn latest_without_filter_spans_algorithms() {
    let (store, query) = service();
    let a = store
        .insert_pending_result(&new_result(Algorithm::Kmeans, 0))
        .await
        .unwrap();
    let b = store
        .insert_pending_result(&new_result(Algorithm::Dbscan, 5))
        .await
        .unwrap();
    store.complete_result(a.id).await.unwrap();
    store.complete_result(b.id).await.unwrap();

    let latest = query.latest_result(None).await.unwrap();
    assert_eq!(latest.result.summary.algorithm, Algorithm::Dbscan);
}

#[tokio::test]
async fn history_paginates_newest_first_without_blobs() {
    let (store, query) = service();
    let mut ids = Vec::new();
    for i in 0..12 {
        let r = store
            .insert_pending_result(&new_result(Algorithm::Kmeans, i))
            .await
            .unwrap();
        ids.push(r.result_id);
    }

    let first = query.history(None, None).await.unwrap();
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.pagination.total, 12);
    assert_eq!(first.pagination.pages, 2);
    assert_eq!(first.items[0].result_id, ids[11]);

    let second = query.history(Some(2), Some(10)).await.unwrap();
    assert_eq!(second.items.len(), 2);
    assert_eq!(second.items[1].result_id, ids[0]);

    let json = serde_json::to_value(&first.items[0]).unwrap();
    assert!(json.get("visualizations").is_none());
}

#[tokio::test]
async fn detail_and_visualizations_by_result_id() {
    let (store, query) = service();
    let r = store
        .insert_pending_result(&new_result(Algorithm::Hierarchical, 0))
        .await
        .unwrap();

    let detail = query.result_detail(r.result_id).await.unwrap();
    assert!(detail.result.visualizations.contains_key("clusters_2d"));

    let viz = query.visualizations(r.result_id).await.unwrap();
    assert_eq!(viz.visualizations["clusters_2d"], "iVBORw0KGgo=");

    let err = query.result_detail(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn customers_filter_by_cluster_and_gender() {
    let (store, query) = service();
    let records: Vec<CustomerRecord> = (1..=4)
        .map(|id| CustomerRecord {
            customer_id: id,
            gender: if id % 2 == 0 { Gender::Male } else { Gender::Female },
            age: 30,
            annual_income: 50.0,
            spending_score: 50.0,
        })
        .collect();
    store.upsert_customers(&records).await.unwrap();
    store
        .apply_assignments(&[
            Assignment {
                customer_id: 1,
                cluster_id: 0,
                label: "A".to_owned(),
            },
            Assignment {
                customer_id: 2,
                cluster_id: 0,
                label: "A".to_owned(),
            },
        ])
        .await
        .unwrap();

    let in_zero = query
        .customers(
            CustomerFilter {
                cluster_id: Some(0),
                gender: None,
            },
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(in_zero.pagination.total, 2);
    assert_eq!(in_zero.pagination.limit, 50);

    let female_in_zero = query
        .customers(
            CustomerFilter {
                cluster_id: Some(0),
                gender: Some(Gender::Female),
            },
            None,
            None,
        )
        .await
        .unwrap();
    let ids: Vec<i64> = female_in_zero.items.iter().map(|c| c.customer_id).collect();
    assert_eq!(ids, vec![1]);

    let err = query.customer(42).await.unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn profiles_summarize_current_generation() {
    let (store, query) = service();
    let r = store
        .insert_pending_result(&new_result(Algorithm::Kmeans, 0))
        .await
        .unwrap();
    store.insert_clusters(&r, &[cluster("Everyone")]).await.unwrap();
    store.complete_result(r.id).await.unwrap();

    let summary = query.profiles(None).await.unwrap();
    assert_eq!(summary.result_id, r.result_id);
    assert_eq!(summary.n_clusters, 1);
    assert_eq!(summary.profiles.len(), 1);
}
