use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand, ValueEnum};
use pool_failover::config::{ConfigSource, FailoverConfig};
use pool_failover::controller::Reconciler;
use pool_failover::store::KubeStore;
use pool_failover::Error;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the failover loop
    Run(RunArgs),
    /// Run a single pass and exit
    Once(ConfigArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    /// Label selector of the nodes to watch
    #[arg(long, env = "NODE_SELECTOR")]
    node_selector: Option<String>,

    /// Label selector of master pods (operator namespace)
    #[arg(long, env = "MASTER_POD_SELECTOR")]
    master_pod_selector: Option<String>,

    /// Label selector of slave pods
    #[arg(long, env = "SLAVE_POD_SELECTOR")]
    slave_pod_selector: Option<String>,

    /// Namespace of slave pods
    #[arg(long, env = "SLAVE_POD_NAMESPACE")]
    slave_pod_namespace: Option<String>,

    /// Node label marking failover pool membership, as key=value
    #[arg(long, env = "FAILOVER_POOL_LABEL")]
    failover_pool_label: Option<String>,

    /// Seconds between passes
    #[arg(long, env = "POLL_INTERVAL_SECS")]
    poll_interval: Option<u64>,

    /// Log a summary line for every node on every pass; `--verbose false`
    /// overrides a config file that turns it on
    #[arg(
        long,
        env = "LOG_EVERY_RUN",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    verbose: Option<bool>,

    /// Operator namespace (defaults to the service account namespace)
    #[arg(long, env = "OPERATOR_NAMESPACE")]
    namespace: Option<String>,

    /// TOML file with default settings; flags take precedence
    #[arg(long, env = "FAILOVER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Listen address of the health/metrics server
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,
}

impl ConfigArgs {
    fn load(&self) -> Result<FailoverConfig, Error> {
        let file = match &self.config {
            Some(path) => ConfigSource::from_file(path)?,
            None => ConfigSource::default(),
        };
        let flags = ConfigSource {
            node_selector: self.node_selector.clone(),
            master_pod_selector: self.master_pod_selector.clone(),
            slave_pod_selector: self.slave_pod_selector.clone(),
            slave_pod_namespace: self.slave_pod_namespace.clone(),
            failover_pool_label: self.failover_pool_label.clone(),
            poll_interval_secs: self.poll_interval,
            verbose: self.verbose,
            namespace: self.namespace.clone(),
        };
        FailoverConfig::try_from(file.merge(flags))
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Pool Failover Operator v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Once(config_args) => {
            init_tracing(args.log_format);
            run_once(config_args).await
        }
        Commands::Run(run_args) => {
            init_tracing(args.log_format);
            run_operator(run_args).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

fn log_banner(config: &FailoverConfig) {
    info!("Working on nodes with labels: {}", config.node_selector);
    info!("Selected master pods with labels: {}", config.master_pod_selector);
    info!(
        "Selected slave pods in namespace {} with labels: {}",
        config.slave_pod_namespace, config.slave_pod_selector
    );
    info!("Failover pool node label: {}", config.pool_label);
}

async fn connect(config: &FailoverConfig) -> Result<Arc<KubeStore>, Error> {
    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");
    Ok(Arc::new(
        KubeStore::new(client).with_namespace(config.namespace.clone()),
    ))
}

async fn run_once(args: ConfigArgs) -> Result<(), Error> {
    let config = args.load()?;
    log_banner(&config);
    let store = connect(&config).await?;

    let summary = Reconciler::new(store, config).run_pass().await?;
    info!(
        "Pass complete: {} nodes, {} joined, {} left, {} restarts, {} write errors, {} in pool",
        summary.nodes,
        summary.joined,
        summary.left,
        summary.restarts,
        summary.mutation_errors,
        summary.in_pool
    );
    Ok(())
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    let config = args.config.load()?;

    info!(
        "Starting Pool Failover Operator v{}",
        env!("CARGO_PKG_VERSION")
    );
    log_banner(&config);

    let store = connect(&config).await?;

    #[cfg(feature = "rest-api")]
    {
        let addr = args.metrics_addr;
        tokio::spawn(async move {
            if let Err(e) = pool_failover::rest_api::run_server(addr).await {
                tracing::error!("Probe server error: {:?}", e);
            }
        });
    }
    #[cfg(not(feature = "rest-api"))]
    let _ = args.metrics_addr;

    Reconciler::new(store, config).run().await
}
