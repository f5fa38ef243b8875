//! labenv: tenant environment naming, subnet allocation and teardown
//!
//! Thin operator front-end over `labenv_coordinator`. Everything it does can
//! be repeated safely: names and subnets are computed from live inventory,
//! and teardown defaults to a dry run.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use labenv_common::defaults::{
    DEFAULT_DELETION_WAIT_TIMEOUT_SECS, DEFAULT_MAX_RETRIES, DEFAULT_REGION,
    DEFAULT_SUBNET_PREFIX_LEN, DEFAULT_TEARDOWN_CONCURRENCY,
};
use labenv_common::{ResourceKind, ResourceScope, TEARDOWN_ORDER};
use labenv_coordinator::aws::{AwsContext, AwsProvider, FromAwsContext};
use labenv_coordinator::config::{AwsConfig, RetryConfig, TeardownConfig};
use labenv_coordinator::wait::WaitConfig;
use labenv_coordinator::{
    CandidateRange, IndexAllocator, Inventory, SubnetPlanner, Teardown, TeardownPlan,
    TeardownReport,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "labenv")]
#[command(about = "Naming, subnet allocation and teardown for tenant research environments")]
#[command(version)]
struct Args {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// Tenant and account selection shared by every command
#[derive(clap::Args, Debug)]
struct ScopeArgs {
    /// Deployment-wide service base name
    #[arg(long, env = "LABENV_SERVICE_BASE_NAME")]
    service_base_name: String,

    /// Tenant (project) identifier
    #[arg(long, env = "LABENV_TENANT")]
    tenant: String,

    /// AWS region
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// AWS profile to use
    #[arg(long, env = "AWS_PROFILE")]
    aws_profile: Option<String>,
}

impl ScopeArgs {
    fn scope(&self) -> Result<ResourceScope> {
        ResourceScope::new(&self.service_base_name, &self.tenant).context("Invalid tenant scope")
    }

    fn aws_config(&self) -> AwsConfig {
        AwsConfig {
            region: self.region.clone(),
            profile: self.aws_profile.clone(),
        }
    }

    async fn provider(&self) -> AwsProvider {
        if let Some(profile) = &self.aws_profile {
            info!(profile = %profile, "Using AWS profile");
        }
        let ctx = AwsContext::from_config(&self.aws_config()).await;
        AwsProvider::from_context(&ctx)
    }
}

#[derive(clap::Args, Debug)]
struct TeardownArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    /// Actually delete resources (default is dry-run)
    #[arg(long)]
    execute: bool,

    /// Deletions in flight at once within a stage
    #[arg(long, default_value_t = DEFAULT_TEARDOWN_CONCURRENCY)]
    concurrency: usize,

    /// Seconds to wait for clusters and instances to finish deleting
    #[arg(long, default_value_t = DEFAULT_DELETION_WAIT_TIMEOUT_SECS)]
    wait_timeout: u64,

    /// Retries for throttling and dependency errors on each deletion
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: usize,

    /// JSON report of an earlier run whose nodes should be accounted for
    #[arg(long)]
    known: Option<PathBuf>,

    /// Write the JSON report to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

impl TeardownArgs {
    fn config(&self) -> TeardownConfig {
        TeardownConfig {
            concurrency: self.concurrency,
            dry_run: !self.execute,
            retry: RetryConfig {
                max_times: self.max_retries,
                ..RetryConfig::default()
            },
            wait: WaitConfig {
                timeout: Duration::from_secs(self.wait_timeout),
                ..WaitConfig::default()
            },
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List resources tagged with the tenant scope
    Scan {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Narrow to one resource type (e.g. "nb")
        #[arg(long)]
        resource_type: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Print the next free name for a resource type
    NextName {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Resource type within the tenant (e.g. "nb", "edge")
        #[arg(long)]
        resource_type: String,

        /// Resource kind whose live names are considered
        #[arg(long, default_value = "instance")]
        kind: ResourceKind,
    },

    /// Print the next free subnet block in a network
    AllocateSubnet {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Parent network (VPC) id
        #[arg(long)]
        network_id: String,

        /// Prefix length of the new block
        #[arg(long, default_value_t = DEFAULT_SUBNET_PREFIX_LEN)]
        prefix_len: u8,

        /// Restrict placement to START-END or a CIDR block
        #[arg(long)]
        range: Option<CandidateRange>,
    },

    /// Delete everything tagged with the tenant scope, in dependency order
    Teardown(Box<TeardownArgs>),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?
        .add_directive("aws_config=warn".parse()?)
        .add_directive("aws_smithy_runtime=warn".parse()?)
        .add_directive("aws_sdk_ec2=warn".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    match args.command {
        Command::Scan {
            scope,
            resource_type,
            format,
        } => handle_scan(scope, resource_type, format).await,
        Command::NextName {
            scope,
            resource_type,
            kind,
        } => handle_next_name(scope, resource_type, kind).await,
        Command::AllocateSubnet {
            scope,
            network_id,
            prefix_len,
            range,
        } => handle_allocate_subnet(scope, network_id, prefix_len, range).await,
        Command::Teardown(teardown_args) => handle_teardown(*teardown_args).await,
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

/// Handle the scan command
async fn handle_scan(
    args: ScopeArgs,
    resource_type: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut scope = args.scope()?;
    if let Some(rt) = &resource_type {
        scope = scope.with_resource_type(rt).context("Invalid resource type")?;
    }
    info!(scope = %scope, region = %args.region, "Scanning for tenant resources");

    let provider = args.provider().await;
    let mut nodes = Vec::new();
    for kind in TEARDOWN_ORDER {
        nodes.extend(
            provider
                .list_by_tag(&scope, kind)
                .await
                .with_context(|| format!("Failed to list {kind} resources"))?,
        );
    }

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
        return Ok(());
    }
    if nodes.is_empty() {
        println!("No resources found in scope {scope}.");
        return Ok(());
    }

    println!("{:<16} {:<32} {:<28} {:<18}", "KIND", "ID", "NAME", "CIDR");
    println!("{}", "-".repeat(96));
    for node in &nodes {
        println!(
            "{:<16} {:<32} {:<28} {:<18}",
            node.kind.as_str(),
            truncate(&node.id, 31),
            truncate(node.name.as_deref().unwrap_or("-"), 27),
            node.cidr.map(|c| c.to_string()).unwrap_or_else(|| "-".into()),
        );
    }
    println!("\nTotal: {} resources", nodes.len());
    Ok(())
}

/// Handle the next-name command
async fn handle_next_name(args: ScopeArgs, resource_type: String, kind: ResourceKind) -> Result<()> {
    let scope = args
        .scope()?
        .with_resource_type(&resource_type)
        .context("Invalid resource type")?;
    let provider = args.provider().await;

    let name = IndexAllocator::new(&provider)
        .next_name(&scope, kind)
        .await
        .context("Failed to allocate name")?;
    println!("{name}");
    Ok(())
}

/// Handle the allocate-subnet command
async fn handle_allocate_subnet(
    args: ScopeArgs,
    network_id: String,
    prefix_len: u8,
    range: Option<CandidateRange>,
) -> Result<()> {
    let scope = args.scope()?;
    info!(scope = %scope, network = %network_id, prefix_len, range = ?range.map(|r| r.to_string()), "Allocating subnet");
    let provider = args.provider().await;

    let block = SubnetPlanner::new(&provider)
        .allocate(&network_id, prefix_len, range.as_ref())
        .await
        .context("Failed to allocate subnet")?;
    println!("{block}");
    Ok(())
}

fn load_known(path: &Path) -> Result<TeardownReport> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse report {}", path.display()))
}

/// Handle the teardown command
async fn handle_teardown(args: TeardownArgs) -> Result<()> {
    let scope = args.scope.scope()?;
    let mode = if args.execute { "EXECUTE" } else { "DRY-RUN" };
    info!(scope = %scope, region = %args.scope.region, mode, "Tearing down tenant environment");

    let mut plan = TeardownPlan::new(scope);
    if let Some(path) = &args.known {
        let previous = load_known(path)?;
        plan = plan.with_known(previous.nodes().cloned());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight deletions");
            on_signal.cancel();
        }
    });

    let provider = args.scope.provider().await;
    let teardown = Teardown::new(provider, args.config());
    let report = teardown.run(&plan, &cancel).await;

    if let Some(path) = &args.output {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report, mode),
    }

    let summary = report.summary;
    if summary.failed > 0 || summary.discovery_failures > 0 {
        anyhow::bail!(
            "Teardown incomplete: {} deletions failed, {} kinds could not be listed",
            summary.failed,
            summary.discovery_failures
        );
    }
    Ok(())
}

fn print_report(report: &TeardownReport, mode: &str) {
    println!("\n=== Teardown Report ===");
    println!("Run:   {}", report.run_id);
    println!("Scope: {}", report.scope);
    println!("Mode:  {mode}");
    println!();

    if !report.entries.is_empty() {
        println!("{:<16} {:<32} {:<10} {}", "KIND", "ID", "OUTCOME", "DETAIL");
        println!("{}", "-".repeat(90));
        for entry in &report.entries {
            let detail = match &entry.outcome {
                labenv_coordinator::Outcome::Failed { reason }
                | labenv_coordinator::Outcome::Skipped { reason } => reason.as_str(),
                _ => "",
            };
            println!(
                "{:<16} {:<32} {:<10} {}",
                entry.node.kind.as_str(),
                truncate(&entry.node.id, 31),
                entry.outcome.as_str(),
                detail
            );
        }
        println!();
    }
    for failure in &report.discovery_failures {
        println!("Discovery of {} failed: {}", failure.kind, failure.error);
    }

    let s = &report.summary;
    println!(
        "Deleted: {}  Not found: {}  Failed: {}  Skipped: {}",
        s.deleted, s.not_found, s.failed, s.skipped
    );
    if report.cancelled {
        println!("Run was interrupted; skipped resources were not attempted.");
    }
    if report.dry_run {
        println!();
        println!("Run with --execute to actually delete resources.");
    }
}
