use std::sync::Arc;

use anyhow::anyhow;
use anyhow::Result;
use clap::Parser;
use kube::CustomResourceExt;
use sriov_api::SriovNetworkNodePolicy;
use sriov_api::SriovNetworkNodeState;
use sriov_api::SriovNetworkPoolConfig;
use sriov_api::SriovOperatorConfig;
use sriov_operator::client::init_kube_client;
use sriov_operator::client::KubeClusterClient;
use sriov_operator::client::KubeEventSink;
use sriov_operator::client::KubePoolClient;
use sriov_operator::config::Cli;
use sriov_operator::config::Commands;
use sriov_operator::config::OperatorSettings;
use sriov_operator::config::RunArgs;
use sriov_operator::controller;
use sriov_operator::drain::DrainReconciler;
use sriov_operator::drain::KubeDrainer;
use sriov_operator::pool_pause::PoolPauseCoordinator;
use sriov_operator::status::StatusAggregator;
use tokio_util::sync::CancellationToken;
use utils::version;

const CONTROLLER_NAME: &str = "sriov-network-operator";

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(run_args) => run_operator(run_args).await,
        Commands::Crds => print_crds(),
    }
}

async fn run_operator(run_args: RunArgs) -> Result<()> {
    utils::logging::init(run_args.log_format);

    let settings = OperatorSettings::from(&run_args);
    tracing::info!(
        namespace = %settings.namespace,
        flavor = %settings.flavor,
        "Starting SR-IOV network operator {}",
        &**version::VERSION
    );

    let client = init_kube_client(run_args.kubeconfig.clone())
        .await
        .map_err(|e| anyhow!("{e:?}"))?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            shutdown.cancel();
        });
    }

    let cluster = Arc::new(KubeClusterClient::new(client.clone(), &settings.namespace));
    let events = Arc::new(KubeEventSink::new(client.clone(), CONTROLLER_NAME));
    let drainer = Arc::new(KubeDrainer::new(client.clone(), settings.drain.clone()));
    let pools = settings.flavor.uses_machine_config_pools().then(|| {
        PoolPauseCoordinator::new(
            Arc::new(KubePoolClient::new(client.clone())),
            cluster.clone(),
            shutdown.clone(),
        )
    });

    let namespace = settings.namespace.clone();
    let reconciler = DrainReconciler::new(cluster.clone(), drainer, pools, settings);

    tracing::info!("Starting controllers:");
    let controllers = vec![
        controller::build_drain_controller(client.clone(), &namespace, reconciler),
        controller::build_policy_controller(
            client.clone(),
            &namespace,
            StatusAggregator::new(cluster.clone(), events.clone()),
        ),
        controller::build_pool_config_controller(
            client,
            &namespace,
            StatusAggregator::new(cluster, events),
        ),
    ];

    futures::future::join_all(controllers).await;
    shutdown.cancel();
    tracing::info!("controllers stopped");
    Ok(())
}

fn print_crds() -> Result<()> {
    let crds = [
        SriovNetworkNodeState::crd(),
        SriovNetworkNodePolicy::crd(),
        SriovNetworkPoolConfig::crd(),
        SriovOperatorConfig::crd(),
    ];
    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
