//! Clustering command handlers. Each handler prints a short human-readable
//! summary; `--json` switches to the full JSON payload.

use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use segdb_compute::ComputeClient;
use segdb_core::{AppConfig, Parameters};
use segdb_db::SegmentationStore;
use segdb_engine::{QueryService, RunCoordinator};

/// Sub-commands available under `clustering`.
#[derive(Debug, Subcommand)]
pub enum ClusteringCommands {
    /// Run a clustering algorithm and commit it as the current segmentation
    Run {
        /// kmeans, hierarchical or dbscan
        #[arg(long, default_value = "kmeans")]
        algorithm: String,
        /// Algorithm parameter as key=value; repeatable (e.g. --param n_clusters=5)
        #[arg(long = "param")]
        params: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Elbow sweep over a k range
    Elbow {
        #[arg(long)]
        k_min: Option<i64>,
        #[arg(long)]
        k_max: Option<i64>,
    },
    /// Fail abandoned pending runs and finish deferred retirement
    Sweep {
        /// Override SEGDB_PENDING_GRACE_SECS
        #[arg(long)]
        grace_secs: Option<u64>,
    },
    /// List past runs, newest first
    History {
        #[arg(long)]
        page: Option<i64>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Load the engine's sample customer set
    SampleData {
        /// Delete all existing customers first
        #[arg(long)]
        clear: bool,
    },
}

/// Parses repeated `key=value` flags into an engine parameter bag. Values
/// that parse as JSON (`5`, `0.5`, `true`) keep their type; anything else
/// is sent as a string.
pub(crate) fn parse_params(raw: &[String]) -> anyhow::Result<Parameters> {
    let mut params = Parameters::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid --param '{pair}': expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("invalid --param '{pair}': empty key");
        }
        let value = serde_json::from_str(value.trim())
            .unwrap_or_else(|_| serde_json::Value::String(value.trim().to_owned()));
        params.insert(key.to_owned(), value);
    }
    Ok(params)
}

pub(crate) async fn dispatch(
    store: Arc<dyn SegmentationStore>,
    config: &AppConfig,
    command: ClusteringCommands,
) -> anyhow::Result<()> {
    match command {
        ClusteringCommands::Run {
            algorithm,
            params,
            json,
        } => {
            let coordinator = coordinator(store, config)?;
            run(&coordinator, &algorithm, &params, json).await
        }
        ClusteringCommands::Elbow { k_min, k_max } => {
            let coordinator = coordinator(store, config)?;
            let curve = coordinator.elbow(k_min, k_max).await?;
            for ((k, inertia), silhouette) in curve
                .k_values
                .iter()
                .zip(&curve.inertias)
                .zip(&curve.silhouette_scores)
            {
                println!("k={k:<3} inertia={inertia:>12.2} silhouette={silhouette:.3}");
            }
            println!("recommended k: {}", curve.recommended_k);
            Ok(())
        }
        ClusteringCommands::Sweep { grace_secs } => {
            let grace = Duration::from_secs(grace_secs.unwrap_or(config.pending_grace_secs));
            let report = segdb_engine::sweep(store.as_ref(), grace).await?;
            println!(
                "sweep: {} pending run(s) failed, {} cluster(s) retired",
                report.failed_pending, report.retired_clusters
            );
            Ok(())
        }
        ClusteringCommands::History { page, limit } => {
            let history = QueryService::new(store).history(page, limit).await?;
            for item in &history.items {
                println!(
                    "{}  {:<12} {:<9} clusters={:<3} started={}",
                    item.result_id,
                    item.algorithm,
                    item.status,
                    item.metrics.n_clusters,
                    item.started_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            let p = history.pagination;
            println!("page {}/{} ({} runs)", p.page, p.pages, p.total);
            Ok(())
        }
        ClusteringCommands::SampleData { clear } => {
            let coordinator = coordinator(store, config)?;
            let loaded = coordinator.load_sample_data(clear).await?;
            println!(
                "sample data: {} deleted, {} inserted, {} updated",
                loaded.deleted, loaded.imported.inserted, loaded.imported.updated
            );
            Ok(())
        }
    }
}

fn coordinator(
    store: Arc<dyn SegmentationStore>,
    config: &AppConfig,
) -> anyhow::Result<RunCoordinator> {
    let compute = ComputeClient::from_app_config(config)
        .map_err(|e| anyhow::anyhow!("failed to build compute client: {e}"))?;
    Ok(RunCoordinator::new(store, compute))
}

async fn run(
    coordinator: &RunCoordinator,
    algorithm: &str,
    raw_params: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let params = parse_params(raw_params)?;
    let (algorithm, params) =
        segdb_engine::parse_run_request(algorithm, Some(serde_json::Value::Object(params)))?;

    let outcome = coordinator.run_clustering(algorithm, params).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!(
        "{} run {} committed: {} clusters, {} customers reassigned",
        outcome.algorithm, outcome.result_id, outcome.n_clusters, outcome.customers_reassigned
    );
    for profile in &outcome.profiles {
        println!(
            "  [{:>2}] {:<28} size={:<5} {:>6.2}%",
            profile.cluster_id, profile.label, profile.size, profile.percentage
        );
    }
    Ok(())
}
