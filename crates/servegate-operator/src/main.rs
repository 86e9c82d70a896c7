//! servegate operator - publishes InferenceServices through Istio

use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use servegate_common::config::{
    OperatorConfig, DEFAULT_CONFIG_NAMESPACE, INFERENCE_SERVICE_CONFIG_MAP_NAME, POD_NAMESPACE_ENV,
};
use servegate_common::crd::{InferenceService, VirtualService};
use servegate_operator::controller::{error_policy, reconcile, Context};

/// Watcher timeout (seconds), below the client read timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

/// servegate - ingress reconciliation for InferenceServices
#[derive(Parser, Debug)]
#[command(name = "servegate-operator", version, about, long_about = None)]
struct Cli {
    /// Print the InferenceService CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Namespace of the operator ConfigMap
    #[arg(long, env = POD_NAMESPACE_ENV, default_value = DEFAULT_CONFIG_NAMESPACE)]
    config_namespace: String,

    /// Name of the operator ConfigMap
    #[arg(long, default_value = INFERENCE_SERVICE_CONFIG_MAP_NAME)]
    config_name: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    if cli.crd {
        let crd = serde_yaml::to_string(&InferenceService::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let client = Client::try_default().await?;

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), &cli.config_namespace);
    let config_map = config_maps.get(&cli.config_name).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read ConfigMap {}/{}: {}",
            cli.config_namespace,
            cli.config_name,
            e
        )
    })?;
    let config = OperatorConfig::from_config_map(&config_map)?;
    tracing::info!(
        namespace = %cli.config_namespace,
        name = %cli.config_name,
        virtual_host = !config.ingress.disable_istio_virtual_host,
        "loaded operator configuration"
    );

    let ctx = Arc::new(Context::from_client(client.clone(), config));
    let watcher_config = || WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    tracing::info!("starting InferenceService ingress controller");
    Controller::new(Api::<InferenceService>::all(client.clone()), watcher_config())
        .owns(Api::<VirtualService>::all(client.clone()), watcher_config())
        .owns(Api::<Service>::all(client), watcher_config())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            match result {
                Ok(action) => tracing::debug!(?action, "InferenceService reconciliation completed"),
                Err(e) => tracing::error!(error = ?e, "InferenceService reconciliation error"),
            }
            std::future::ready(())
        })
        .await;

    Ok(())
}
