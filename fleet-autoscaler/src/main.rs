use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fleet_autoscaler::{FleetReconciler, ReconcileOutcome};
use runtime::probes::{ProbeServer, Registry};
use runtime::{pod_identity, EventRecorder, InMemoryStore, LeaderElector, LeaseConfig, ObjectKey, ObjectStore};
use tracing::{error, warn};

/// CLI surface from §6.4, the fields this binary actually consumes.
#[derive(Parser, Debug)]
#[command(name = "fleet-autoscaler", about = "FleetAutoscaler: grows and shrinks a fleet of LLMCluster instances")]
struct Cli {
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<String>,

    #[arg(long, env = "NAMESPACE", default_value = "default")]
    namespace: String,

    /// Ticker period; every `LLMClusterAutoscaler` is reconciled once
    /// per tick, serially (§4.2 "Control loop").
    #[arg(long, env = "SYNC_INTERVAL_SECS", default_value_t = 30)]
    sync_interval_secs: u64,

    #[arg(long, env = "PROM_QUERY_TIMEOUT_SECS", default_value_t = 10)]
    prom_query_timeout_secs: u64,

    #[arg(long, env = "DRAIN_DELAY_SECS", default_value_t = 30)]
    drain_delay_secs: u64,

    #[arg(long, env = "LEADER_ELECT", default_value_t = true)]
    leader_elect: bool,

    #[arg(long, env = "LEADER_ELECTION_ID", default_value = "fleet-autoscaler")]
    leader_election_id: String,

    #[arg(long, env = "LEADER_ELECTION_NAMESPACE")]
    leader_election_namespace: Option<String>,

    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = "0.0.0.0:8082")]
    health_probe_bind_address: String,

    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = "0.0.0.0:8083")]
    metrics_bind_address: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    runtime::logging::init_tracing("info");
    let _ = &cli.kubeconfig;

    if cli.metrics_bind_address != cli.health_probe_bind_address {
        warn!(
            "metrics-bind-address differs from health-probe-bind-address; \
             the probe server exposes /metrics alongside /healthz and /readyz \
             on health-probe-bind-address only"
        );
    }

    let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
    let events = Arc::new(EventRecorder::default());
    let registry = Arc::new(Registry::new());

    let probe_server = ProbeServer::new(cli.health_probe_bind_address.clone(), registry);
    tokio::spawn(async move {
        if let Err(e) = probe_server.run().await {
            error!("probe server exited: {e}");
        }
    });

    if cli.leader_elect {
        let namespace = cli
            .leader_election_namespace
            .clone()
            .or_else(|| std::env::var("POD_NAMESPACE").ok())
            .unwrap_or_else(|| "default".to_string());
        let elector = LeaderElector::new(
            store.clone(),
            &namespace,
            &cli.leader_election_id,
            pod_identity(),
            LeaseConfig::default(),
        );
        elector.run_until_leadership_lost().await;
        error!("leadership lost, exiting");
        std::process::exit(1);
    }

    let reconciler = Arc::new(FleetReconciler {
        store: store.clone(),
        events,
        prom_query_timeout: Duration::from_secs(cli.prom_query_timeout_secs),
        drain_delay: Duration::from_secs(cli.drain_delay_secs),
    });

    run_sync_loop(store, reconciler, cli.namespace, Duration::from_secs(cli.sync_interval_secs)).await;
    Ok(())
}

/// One ticker, every `sync_interval` (§4.2 "Control loop"). Every
/// `LLMClusterAutoscaler` in the namespace is reconciled in turn within
/// a tick — serial across autoscalers, per the concurrency model (§4.2,
/// §5): a slow metrics query for one policy must not starve another's
/// cooldown bookkeeping by racing it.
async fn run_sync_loop(
    store: Arc<dyn ObjectStore>,
    reconciler: Arc<FleetReconciler>,
    namespace: String,
    sync_interval: Duration,
) {
    loop {
        match store.list("LLMClusterAutoscaler", &namespace).await {
            Ok(objects) => {
                for value in objects {
                    let Some(name) = value.get("metadata").and_then(|m| m.get("name")).and_then(|n| n.as_str())
                    else {
                        continue;
                    };
                    let key = ObjectKey::new("LLMClusterAutoscaler", &namespace, name);
                    match reconciler.reconcile(&key).await {
                        Ok(ReconcileOutcome::Reconciled)
                        | Ok(ReconcileOutcome::TerminalForGeneration)
                        | Ok(ReconcileOutcome::Deleted) => {}
                        Err(e) => warn!(object = %key, "fleet reconcile failed: {e}"),
                    }
                }
            }
            Err(e) => warn!("failed to list LLMClusterAutoscaler objects: {e}"),
        }
        tokio::time::sleep(sync_interval).await;
    }
}
