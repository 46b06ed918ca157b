use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cluster_controller::{ClusterReconciler, ReconcileOutcome};
use runtime::probes::{ProbeServer, Registry};
use runtime::{pod_identity, EventRecorder, InMemoryStore, LeaderElector, LeaseConfig, ObjectKey, ObjectStore, WorkQueue};
use tracing::{error, warn};

/// CLI surface from §6.4. `kubeconfig` is accepted for parity with the
/// real deployment but unused here: the orchestrator API client this
/// flag would configure is out of this system's scope (§1), and the
/// in-process `InMemoryStore` used by this binary needs no such client.
#[derive(Parser, Debug)]
#[command(name = "cluster-controller", about = "ClusterReconciler: materializes one LLMCluster's children")]
struct Cli {
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<String>,

    /// Namespace this process watches. A production deployment watches
    /// across all namespaces via the orchestrator's watch stream; this
    /// demo loop polls one namespace by listing it on an interval.
    #[arg(long, env = "NAMESPACE", default_value = "default")]
    namespace: String,

    #[arg(long, env = "LEADER_ELECT", default_value_t = true)]
    leader_elect: bool,

    #[arg(long, env = "LEADER_ELECTION_ID", default_value = "cluster-controller")]
    leader_election_id: String,

    #[arg(long, env = "LEADER_ELECTION_NAMESPACE")]
    leader_election_namespace: Option<String>,

    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = "0.0.0.0:8081")]
    health_probe_bind_address: String,

    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    metrics_bind_address: String,

    #[arg(long, env = "RESYNC_POLL_INTERVAL_SECS", default_value_t = 2)]
    resync_poll_interval_secs: u64,
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

    run_reconcile_loop(store, events, cli.namespace, Duration::from_secs(cli.resync_poll_interval_secs)).await;
    Ok(())
}

/// Stands in for the orchestrator's watch stream (§2, §9): lists the
/// namespace on an interval and feeds every key into the same
/// single-flight work queue that reconcile-triggered requeues use.
async fn run_reconcile_loop(
    store: Arc<dyn ObjectStore>,
    events: Arc<EventRecorder>,
    namespace: String,
    poll_interval: Duration,
) {
    let reconciler = Arc::new(ClusterReconciler::new(store.clone(), events));
    let queue: Arc<WorkQueue<ObjectKey>> = Arc::new(WorkQueue::new());

    {
        let queue = queue.clone();
        let store = store.clone();
        let namespace = namespace.clone();
        tokio::spawn(async move {
            loop {
                if let Ok(objects) = store.list("LLMCluster", &namespace).await {
                    for value in objects {
                        if let Some(name) =
                            value.get("metadata").and_then(|m| m.get("name")).and_then(|n| n.as_str())
                        {
                            queue.requeue_after(ObjectKey::new("LLMCluster", &namespace, name), Duration::ZERO);
                        }
                    }
                }
                tokio::time::sleep(poll_interval).await;
            }
        });
    }

    loop {
        let key = queue.next().await;
        let reconciler = reconciler.clone();
        let queue = queue.clone();
        tokio::spawn(async move {
            match reconciler.reconcile(&key).await {
                Ok(ReconcileOutcome::Requeue(delay)) => queue.requeue_after(key.clone(), delay),
                Ok(ReconcileOutcome::TerminalForGeneration) | Ok(ReconcileOutcome::Deleted) => {}
                Err(e) => warn!(object = %key, "reconcile failed: {e}"),
            }
            queue.release(&key).await;
        });
    }
}
