use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use derive_more::Display;
use error_stack::Report;
use sriov_api::ConfigurationMode;
use thiserror::Error;
use utils::logging::LogFormat;
use utils::version;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the drain and status controllers
    Run(RunArgs),
    /// Print the custom resource definitions as YAML
    Crds,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(
        long,
        env = "OPERATOR_NAMESPACE",
        default_value = "openshift-sriov-network-operator",
        help = "Namespace holding node states, policies, pool configs and the operator config"
    )]
    pub namespace: String,

    #[arg(
        long,
        env = "CLUSTER_TYPE",
        value_enum,
        default_value_t = ClusterFlavor::Kubernetes,
        help = "Cluster flavor; openshift enables machine config pool pausing"
    )]
    pub cluster_flavor: ClusterFlavor,

    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        help = "Evict pods that are not managed by a controller"
    )]
    pub drain_force: bool,

    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        help = "Leave daemon set pods in place instead of failing the drain"
    )]
    pub drain_ignore_daemonsets: bool,

    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        help = "Evict pods using emptyDir volumes, losing their data"
    )]
    pub drain_delete_emptydir_data: bool,

    #[arg(
        long,
        default_value_t = -1,
        allow_negative_numbers = true,
        help = "Grace period for evicted pods in seconds, negative uses each pod's own"
    )]
    pub drain_grace_period_secs: i64,

    #[arg(long, default_value_t = 90, help = "How long one drain waits for pods to go away")]
    pub drain_timeout_secs: u64,

    #[arg(long, default_value_t = 5, help = "Cordon and drain attempts before giving up")]
    pub drain_retry_attempts: usize,

    #[arg(long, default_value_t = 10, help = "Delay before the second cordon and drain attempt")]
    pub drain_retry_initial_secs: u64,

    #[arg(long, default_value_t = 5, help = "Requeue delay while the drain budget is exhausted")]
    pub drain_requeue_secs: u64,
}

/// Platform the operator runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Display)]
pub enum ClusterFlavor {
    #[display("kubernetes")]
    Kubernetes,
    #[display("openshift")]
    Openshift,
    /// OpenShift with a hosted control plane, no machine config operator.
    #[display("hypershift")]
    Hypershift,
}

impl ClusterFlavor {
    /// Whether nodes belong to machine config pools that must be paused
    /// before draining.
    pub fn uses_machine_config_pools(self) -> bool {
        self == Self::Openshift
    }
}

/// Exponential backoff around one cordon and drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub attempts: usize,
    pub initial_delay: Duration,
    pub factor: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_secs(10),
            factor: 2,
        }
    }
}

impl RetrySettings {
    /// Delays slept between attempts: `initial * factor^n` (saturating), one
    /// fewer than the attempt count.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let initial = self.initial_delay;
        let factor = self.factor;
        (0..self.attempts.saturating_sub(1)).map(move |n| {
            let n = u32::try_from(n).unwrap_or(u32::MAX);
            initial.saturating_mul(factor.saturating_pow(n))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainSettings {
    pub force: bool,
    pub ignore_daemonsets: bool,
    pub delete_emptydir_data: bool,
    /// `None` keeps each pod's own termination grace period.
    pub grace_period: Option<u32>,
    pub timeout: Duration,
    pub retry: RetrySettings,
    pub requeue_after: Duration,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            force: true,
            ignore_daemonsets: true,
            delete_emptydir_data: true,
            grace_period: None,
            timeout: Duration::from_secs(90),
            retry: RetrySettings::default(),
            requeue_after: Duration::from_secs(5),
        }
    }
}

/// Settings built once at startup and handed to every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorSettings {
    pub namespace: String,
    pub flavor: ClusterFlavor,
    pub drain: DrainSettings,
}

impl From<&RunArgs> for OperatorSettings {
    fn from(args: &RunArgs) -> Self {
        Self {
            namespace: args.namespace.clone(),
            flavor: args.cluster_flavor,
            drain: DrainSettings {
                force: args.drain_force,
                ignore_daemonsets: args.drain_ignore_daemonsets,
                delete_emptydir_data: args.drain_delete_emptydir_data,
                grace_period: u32::try_from(args.drain_grace_period_secs).ok(),
                timeout: Duration::from_secs(args.drain_timeout_secs),
                retry: RetrySettings {
                    attempts: args.drain_retry_attempts.max(1),
                    initial_delay: Duration::from_secs(args.drain_retry_initial_secs),
                    factor: 2,
                },
                requeue_after: Duration::from_secs(args.drain_requeue_secs),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration mode {mode} is not supported on {flavor} clusters")]
    UnsupportedConfigurationMode {
        mode: ConfigurationMode,
        flavor: ClusterFlavor,
    },
}

/// Systemd mode hands configuration to the machine config operator, which a
/// hypershift cluster does not run.
pub fn validate_configuration_mode(
    mode: ConfigurationMode,
    flavor: ClusterFlavor,
) -> Result<(), Report<ConfigError>> {
    if mode == ConfigurationMode::Systemd && flavor == ClusterFlavor::Hypershift {
        return Err(Report::new(ConfigError::UnsupportedConfigurationMode {
            mode,
            flavor,
        }));
    }
    Ok(())
}
