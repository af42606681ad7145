//! Contract checks applied to engine responses before anything downstream
//! sees them.

use std::collections::{BTreeMap, HashMap, HashSet};

use segdb_core::{ClusterMetrics, CustomerRecord, NOISE_CLUSTER_ID};

use crate::error::ComputeError;
use crate::types::{
    ClusterAssignment, ClusterProfile, ComputeResponse, ElbowCurve, Prediction,
    RawClusterResponse, RawElbowResponse, RawPrediction, RawProfile,
};

const NOISE_LABEL: &str = "Noise";

fn violation(msg: impl Into<String>) -> ComputeError {
    ComputeError::ContractViolation(msg.into())
}

fn to_i32(value: i64, what: &str) -> Result<i32, ComputeError> {
    i32::try_from(value).map_err(|_| violation(format!("{what} {value} out of range")))
}

/// Checks a `POST /cluster` response against the dataset that produced it.
///
/// Requires a metrics object carrying `n_clusters` or an engine `error` note,
/// a non-empty profile list with unique ids, and exactly one assignment per
/// submitted customer whose cluster id is a profiled cluster or the noise id.
pub(crate) fn validate_cluster_response(
    raw: RawClusterResponse,
    submitted: &[CustomerRecord],
) -> Result<ComputeResponse, ComputeError> {
    let metrics_value = raw.metrics.ok_or_else(|| violation("metrics missing"))?;
    let has_n_clusters = metrics_value.get("n_clusters").is_some();
    if !metrics_value.is_object() || !(has_n_clusters || metrics_value.get("error").is_some()) {
        return Err(violation(
            "metrics must be an object with n_clusters or an error note",
        ));
    }
    let mut metrics: ClusterMetrics = serde_json::from_value(metrics_value)
        .map_err(|e| violation(format!("metrics malformed: {e}")))?;

    let raw_profiles = raw
        .cluster_profiles
        .ok_or_else(|| violation("cluster_profiles missing"))?;
    if raw_profiles.is_empty() {
        return Err(violation("cluster_profiles is empty"));
    }
    let total = submitted.len();
    let profiles = raw_profiles
        .into_iter()
        .map(|p| profile_from_raw(p, total))
        .collect::<Result<Vec<_>, _>>()?;

    let mut labels: HashMap<i32, &str> = HashMap::with_capacity(profiles.len());
    for profile in &profiles {
        if labels.insert(profile.cluster_id, &profile.label).is_some() {
            return Err(violation(format!(
                "duplicate profile for cluster {}",
                profile.cluster_id
            )));
        }
    }

    let raw_assignments = raw
        .customers_with_clusters
        .ok_or_else(|| violation("customers_with_clusters missing"))?;

    let expected: HashSet<i64> = submitted.iter().map(|c| c.customer_id).collect();
    let mut seen: HashSet<i64> = HashSet::with_capacity(raw_assignments.len());
    let mut assignments = Vec::with_capacity(raw_assignments.len());
    for a in raw_assignments {
        if !expected.contains(&a.customer_id) {
            return Err(violation(format!(
                "assignment for unknown customer {}",
                a.customer_id
            )));
        }
        if !seen.insert(a.customer_id) {
            return Err(violation(format!(
                "customer {} assigned more than once",
                a.customer_id
            )));
        }
        let cluster_id = to_i32(a.cluster_id, "cluster id")?;
        let label = match labels.get(&cluster_id) {
            Some(profile_label) => a.label.unwrap_or_else(|| (*profile_label).to_string()),
            None if cluster_id == NOISE_CLUSTER_ID => {
                a.label.unwrap_or_else(|| NOISE_LABEL.to_string())
            }
            None => {
                return Err(violation(format!(
                    "customer {} assigned to unreported cluster {cluster_id}",
                    a.customer_id
                )))
            }
        };
        assignments.push(ClusterAssignment {
            customer_id: a.customer_id,
            cluster_id,
            label,
        });
    }
    if seen.len() != expected.len() {
        let missing = expected.difference(&seen).count();
        return Err(violation(format!(
            "{missing} submitted customer(s) have no assignment"
        )));
    }

    // Scoreless metrics (one cluster, or scoring failed) carry no count.
    if !has_n_clusters {
        metrics.n_clusters = raw
            .n_clusters
            .unwrap_or_else(|| i64::try_from(profiles.len()).unwrap_or(i64::MAX));
    }
    let n_clusters = raw.n_clusters.unwrap_or(metrics.n_clusters);
    Ok(ComputeResponse {
        metrics,
        visualizations: raw.visualizations.unwrap_or_default(),
        feature_names: raw.feature_names,
        pca_variance_explained: raw.pca_variance_explained,
        profiles,
        assignments,
        n_clusters,
    })
}

fn profile_from_raw(raw: RawProfile, total: usize) -> Result<ClusterProfile, ComputeError> {
    let cluster_id = to_i32(raw.cluster_id, "profile cluster id")?;
    let size = to_i32(raw.size, "profile size")?;
    if size < 0 {
        return Err(violation(format!("cluster {cluster_id} has negative size")));
    }
    #[allow(clippy::cast_precision_loss)]
    let percentage = raw.percentage.unwrap_or_else(|| {
        if total == 0 {
            0.0
        } else {
            f64::from(size) * 100.0 / total as f64
        }
    });
    let label = raw
        .label
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| format!("Cluster {cluster_id}"));
    let features: BTreeMap<String, f64> = raw
        .rest
        .into_iter()
        .filter_map(|(k, v)| v.as_f64().map(|f| (k, f)))
        .collect();

    Ok(ClusterProfile {
        cluster_id,
        label,
        size,
        percentage,
        features,
    })
}

/// Checks an elbow response and fills in `recommended_k` when the engine
/// left it out.
pub(crate) fn validate_elbow_response(raw: RawElbowResponse) -> Result<ElbowCurve, ComputeError> {
    let data = raw.elbow_data.ok_or_else(|| violation("elbow_data missing"))?;
    if data.k_values.is_empty() {
        return Err(violation("elbow_data.k_values is empty"));
    }
    if data.inertias.len() != data.k_values.len() {
        return Err(violation(format!(
            "elbow_data has {} k values but {} inertias",
            data.k_values.len(),
            data.inertias.len()
        )));
    }

    let recommended_k = raw
        .recommended_k
        .unwrap_or_else(|| knee_of(&data.k_values, &data.inertias));

    Ok(ElbowCurve {
        k_values: data.k_values,
        inertias: data.inertias,
        silhouette_scores: data.silhouette_scores,
        recommended_k,
        elbow_plot: raw.elbow_plot,
        feature_names: raw.feature_names,
    })
}

/// The `k` at which the inertia curve bends hardest (largest second
/// difference). Falls back to the first `k` for curves shorter than three.
pub(crate) fn knee_of(k_values: &[i64], inertias: &[f64]) -> i64 {
    if k_values.len() < 3 {
        return k_values[0];
    }
    let mut best = 1;
    let mut best_bend = f64::NEG_INFINITY;
    for i in 1..inertias.len() - 1 {
        let bend = inertias[i - 1] - 2.0 * inertias[i] + inertias[i + 1];
        if bend > best_bend {
            best_bend = bend;
            best = i;
        }
    }
    k_values[best]
}

pub(crate) fn validate_prediction(raw: RawPrediction) -> Result<Prediction, ComputeError> {
    let cluster_id = raw
        .cluster_id
        .ok_or_else(|| violation("prediction carries no cluster id"))?;
    Ok(Prediction {
        cluster_id: to_i32(cluster_id, "predicted cluster id")?,
        cluster_label: raw.cluster_label,
    })
}

#[cfg(test)]
mod tests {
    use segdb_core::Gender;
    use serde_json::json;

    use super::*;

    fn customers(ids: &[i64]) -> Vec<CustomerRecord> {
        ids.iter()
            .map(|&id| CustomerRecord {
                customer_id: id,
                gender: Gender::Male,
                age: 30,
                annual_income: 60.0,
                spending_score: 40.0,
            })
            .collect()
    }

    fn raw(body: serde_json::Value) -> RawClusterResponse {
        serde_json::from_value(body).unwrap()
    }

    fn good_body() -> serde_json::Value {
        json!({
            "metrics": { "n_clusters": 2, "silhouette_score": 0.5 },
            "cluster_profiles": [
                { "ClusterID": 0, "Label": "Savers", "Size": 2, "Percentage": 66.7, "Age_mean": 30.0 },
                { "ClusterID": 1, "Label": "Spenders", "Size": 1, "Percentage": 33.3 }
            ],
            "customers_with_clusters": [
                { "CustomerID": 1, "ClusterID": 0, "ClusterLabel": "Savers", "Age": 30 },
                { "CustomerID": 2, "ClusterID": 0 },
                { "CustomerID": 3, "ClusterID": 1, "ClusterLabel": "Spenders" }
            ],
            "n_clusters": 2
        })
    }

    #[test]
    fn accepts_complete_response_and_fills_missing_labels() {
        let response = validate_cluster_response(raw(good_body()), &customers(&[1, 2, 3])).unwrap();
        assert_eq!(response.profiles.len(), 2);
        assert_eq!(response.assignments[1].label, "Savers");
        assert_eq!(response.profiles[0].features.get("Age_mean"), Some(&30.0));
        assert!(response.visualizations.is_empty());
    }

    #[test]
    fn rejects_missing_assignment() {
        let err = validate_cluster_response(raw(good_body()), &customers(&[1, 2, 3, 4])).unwrap_err();
        assert!(matches!(err, ComputeError::ContractViolation(msg) if msg.contains("no assignment")));
    }

    #[test]
    fn rejects_unknown_customer() {
        let err = validate_cluster_response(raw(good_body()), &customers(&[1, 2])).unwrap_err();
        assert!(matches!(err, ComputeError::ContractViolation(_)));
    }

    #[test]
    fn rejects_duplicate_assignment() {
        let mut body = good_body();
        body["customers_with_clusters"][2]["CustomerID"] = json!(2);
        let err = validate_cluster_response(raw(body), &customers(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, ComputeError::ContractViolation(msg) if msg.contains("more than once")));
    }

    #[test]
    fn rejects_empty_profiles() {
        let mut body = good_body();
        body["cluster_profiles"] = json!([]);
        let err = validate_cluster_response(raw(body), &customers(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, ComputeError::ContractViolation(_)));
    }

    #[test]
    fn rejects_metrics_without_cluster_count() {
        let mut body = good_body();
        body["metrics"] = json!({ "silhouette_score": 0.2 });
        let err = validate_cluster_response(raw(body), &customers(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, ComputeError::ContractViolation(_)));
    }

    #[test]
    fn accepts_scoreless_single_cluster_run() {
        let body = json!({
            "metrics": { "error": "Only one cluster found or all noise" },
            "cluster_profiles": [
                { "ClusterID": 0, "Label": "Average Customers", "Size": 2, "Percentage": 100.0 }
            ],
            "customers_with_clusters": [
                { "CustomerID": 1, "ClusterID": 0 },
                { "CustomerID": 2, "ClusterID": 0 }
            ],
            "n_clusters": 1
        });
        let response = validate_cluster_response(raw(body), &customers(&[1, 2])).unwrap();
        assert_eq!(response.n_clusters, 1);
        assert_eq!(response.metrics.n_clusters, 1);
        assert_eq!(
            response.metrics.error.as_deref(),
            Some("Only one cluster found or all noise")
        );
        assert!(response.metrics.silhouette_score.is_none());
    }

    #[test]
    fn scoreless_metrics_fall_back_to_profile_count() {
        let mut body = good_body();
        body["metrics"] = json!({ "error": "scoring failed" });
        body.as_object_mut().unwrap().remove("n_clusters");
        let response = validate_cluster_response(raw(body), &customers(&[1, 2, 3])).unwrap();
        assert_eq!(response.metrics.n_clusters, 2);
        assert_eq!(response.n_clusters, 2);
    }

    #[test]
    fn rejects_assignment_to_unprofiled_cluster() {
        let mut body = good_body();
        body["customers_with_clusters"][2]["ClusterID"] = json!(7);
        let err = validate_cluster_response(raw(body), &customers(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, ComputeError::ContractViolation(msg) if msg.contains("unreported")));
    }

    #[test]
    fn noise_assignment_is_allowed_and_labelled() {
        let mut body = good_body();
        body["customers_with_clusters"][2] = json!({ "CustomerID": 3, "ClusterID": -1 });
        let response = validate_cluster_response(raw(body), &customers(&[1, 2, 3])).unwrap();
        assert_eq!(response.assignments[2].cluster_id, NOISE_CLUSTER_ID);
        assert_eq!(response.assignments[2].label, "Noise");
    }

    #[test]
    fn accepts_lower_case_aliases() {
        let body = json!({
            "metrics": { "n_clusters": 1 },
            "cluster_profiles": [ { "cluster_id": 0, "label": "All", "size": 1 } ],
            "customers_with_clusters": [ { "id": 5, "cluster_id": 0, "cluster_label": "All" } ]
        });
        let response = validate_cluster_response(raw(body), &customers(&[5])).unwrap();
        assert_eq!(response.n_clusters, 1);
        assert!((response.profiles[0].percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn knee_is_largest_second_difference() {
        let k = [2, 3, 4, 5, 6];
        let inertia = [1000.0, 500.0, 200.0, 180.0, 170.0];
        assert_eq!(knee_of(&k, &inertia), 4);
        assert_eq!(knee_of(&[2, 3], &[10.0, 5.0]), 2);
    }

    #[test]
    fn prediction_accepts_predicted_cluster_alias() {
        let raw: RawPrediction =
            serde_json::from_value(json!({ "predicted_cluster": 3, "customer": {} })).unwrap();
        assert_eq!(validate_prediction(raw).unwrap().cluster_id, 3);
    }
}
