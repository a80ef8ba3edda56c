//! SEOFIX - safe fix-application CLI
//!
//! The `seofix` command manages tenants and applies SEO fixes to a site kept
//! as a directory of `.html` files.
//!
//! ## Commands
//!
//! - `register`: Create a tenant on a plan
//! - `tenants`: List tenants
//! - `plans`: Show plan tiers and prices
//! - `status`: Suspend, cancel or reactivate a tenant
//! - `check`: Dry run: safety report and fix plan, nothing written
//! - `apply`: Apply one fix with checkpoint and rollback
//! - `usage`: Show a tenant's usage ledger

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};

use seofix_core::tenant::{features_for, unit_price};
use seofix_core::{
    ContentGenerator, Customizations, DirectoryCmsProvider, FatalError, FixContext,
    FixOrchestrator, HttpContentGenerator, HttpGeneratorConfig, LinkTarget, Operation,
    SeofixConfig, TenantRegistration, TenantRegistry, UnconfiguredGenerator,
};
use seofix_state::{CmsCredentials, PlanTier, SurrealTenantStore, TenantId, TenantStatus};

#[derive(Parser)]
#[command(name = "seofix")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Safety-gated, checkpointed SEO fixes for live sites", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Tenant store URL (mem://, surrealkv://path, ws://host:port)
    #[arg(long, global = true, env = "SURREALDB_URL", default_value = "surrealkv://.seofix/db")]
    store: String,

    /// Directory that tenant site directories are resolved against
    #[arg(long, global = true, env = "SEOFIX_SITES", default_value = ".")]
    sites: PathBuf,

    /// TOML configuration file; SEOFIX_* variables override it
    #[arg(long, global = true, env = "SEOFIX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a tenant
    Register {
        /// Display name
        #[arg(long)]
        name: String,

        /// Site domain, e.g. bakery.example
        #[arg(long)]
        domain: String,

        /// Plan tier
        #[arg(long, default_value = "starter")]
        plan: PlanTier,

        /// Site directory, relative to --sites
        #[arg(long)]
        site: Option<String>,
    },

    /// List tenants
    Tenants,

    /// Show plan tiers and prices
    Plans,

    /// Change a tenant's status
    Status {
        tenant: String,

        #[arg(value_enum)]
        status: StatusArg,
    },

    /// Run the safety chain and build the plan without writing anything
    Check {
        tenant: String,

        /// Issue type, e.g. missing_meta_description
        issue: String,

        /// Page URL or path
        page: String,

        #[command(flatten)]
        custom: CustomArgs,
    },

    /// Apply one fix
    Apply {
        tenant: String,

        /// Issue type, e.g. missing_meta_description
        issue: String,

        /// Page URL or path
        page: String,

        #[command(flatten)]
        custom: CustomArgs,
    },

    /// Show a tenant's usage ledger
    Usage { tenant: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Active,
    Suspended,
    Trial,
    Cancelled,
}

impl From<StatusArg> for TenantStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Active => TenantStatus::Active,
            StatusArg::Suspended => TenantStatus::Suspended,
            StatusArg::Trial => TenantStatus::Trial,
            StatusArg::Cancelled => TenantStatus::Cancelled,
        }
    }
}

#[derive(clap::Args, Default)]
struct CustomArgs {
    /// Use this meta description instead of generating one
    #[arg(long)]
    meta_description: Option<String>,

    /// Internal link target as URL=ANCHOR (repeatable)
    #[arg(long = "link", value_parser = parse_link)]
    links: Vec<LinkTarget>,

    /// Subject hint for generated content
    #[arg(long)]
    topic: Option<String>,
}

impl CustomArgs {
    fn into_customizations(self) -> Option<Customizations> {
        let custom = Customizations {
            meta_description: self.meta_description,
            internal_links: self.links,
            topic: self.topic,
        };
        (custom != Customizations::default()).then_some(custom)
    }
}

fn parse_link(raw: &str) -> std::result::Result<LinkTarget, String> {
    match raw.split_once('=') {
        Some((url, anchor)) if !url.trim().is_empty() => Ok(LinkTarget {
            url: url.trim().to_string(),
            anchor: anchor.trim().to_string(),
        }),
        _ => Err(format!("expected URL=ANCHOR, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    seofix_core::telemetry::init_tracing(cli.json, level);

    let config = match &cli.config {
        Some(path) => SeofixConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
            .with_env_overrides()?,
        None => SeofixConfig::from_env()?,
    };

    if let Commands::Plans = cli.command {
        cmd_plans();
        return Ok(ExitCode::SUCCESS);
    }

    let store = SurrealTenantStore::connect(&cli.store)
        .await
        .with_context(|| format!("Failed to connect to tenant store {}", cli.store))?;
    let registry = Arc::new(TenantRegistry::new(Arc::new(store)));

    match cli.command {
        Commands::Register {
            name,
            domain,
            plan,
            site,
        } => cmd_register(&registry, name, domain, plan, site).await,
        Commands::Tenants => cmd_tenants(&registry).await,
        Commands::Plans => Ok(ExitCode::SUCCESS),
        Commands::Status { tenant, status } => {
            cmd_status(&registry, &TenantId::from(tenant.as_str()), status.into()).await
        }
        Commands::Check {
            tenant,
            issue,
            page,
            custom,
        } => {
            let orchestrator = orchestrator(registry, &cli.sites, config)?;
            cmd_check(&orchestrator, &TenantId::from(tenant.as_str()), &issue, &page, custom).await
        }
        Commands::Apply {
            tenant,
            issue,
            page,
            custom,
        } => {
            let orchestrator = orchestrator(registry, &cli.sites, config)?;
            cmd_apply(&orchestrator, &TenantId::from(tenant.as_str()), &issue, &page, custom).await
        }
        Commands::Usage { tenant } => cmd_usage(&registry, &TenantId::from(tenant.as_str())).await,
    }
}

fn orchestrator(
    registry: Arc<TenantRegistry>,
    sites: &std::path::Path,
    config: SeofixConfig,
) -> Result<FixOrchestrator> {
    let generator: Arc<dyn ContentGenerator> = match HttpGeneratorConfig::from_env() {
        Some(generator_config) => Arc::new(
            HttpContentGenerator::new(generator_config)
                .context("Failed to build content generator")?,
        ),
        None => {
            info!("SEOFIX_LLM_URL not set; fixes that need generated content will fail");
            Arc::new(UnconfiguredGenerator)
        }
    };
    let ctx = FixContext::new(
        registry,
        Arc::new(DirectoryCmsProvider::new(sites)),
        generator,
        config,
    );
    Ok(FixOrchestrator::new(ctx))
}

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

async fn cmd_register(
    registry: &TenantRegistry,
    name: String,
    domain: String,
    plan: PlanTier,
    site: Option<String>,
) -> Result<ExitCode> {
    let cms = site.map(|endpoint| CmsCredentials {
        kind: "directory".to_string(),
        endpoint,
        username: None,
        secret: None,
    });
    let tenant = registry
        .register(TenantRegistration {
            name,
            domain,
            plan,
            cms,
        })
        .await
        .context("Failed to register tenant")?;
    println!("{}", serde_json::to_string_pretty(&tenant)?);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_tenants(registry: &TenantRegistry) -> Result<ExitCode> {
    let tenants = registry.list().await.context("Failed to list tenants")?;
    if tenants.is_empty() {
        println!("No tenants. Run 'seofix register' first.");
        return Ok(ExitCode::SUCCESS);
    }
    for t in &tenants {
        println!(
            "{:<38} {:<24} {:<13} {:<10} fixes left: {}",
            t.id.as_str(),
            t.name,
            t.plan.as_str(),
            t.status.to_string(),
            t.features.fixes_per_month
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_status(
    registry: &TenantRegistry,
    tenant_id: &TenantId,
    status: TenantStatus,
) -> Result<ExitCode> {
    let tenant = registry
        .set_status(tenant_id, status)
        .await
        .with_context(|| format!("Failed to update tenant {tenant_id}"))?;
    println!("Tenant {} is now {}", tenant.id, tenant.status);
    Ok(ExitCode::SUCCESS)
}

fn cmd_plans() {
    for plan in PlanTier::ALL {
        let f = features_for(plan);
        println!("{plan}");
        println!("  audits/month:     {}", f.audits_per_month);
        println!("  pages/audit:      {}", f.pages_per_audit);
        println!("  fixes/month:      {}", f.fixes_per_month);
        println!("  competitor:       {}", f.competitor_analysis);
        println!("  white label:      {}", f.white_label);
        println!("  api access:       {}", f.api_access);
        println!("  priority support: {}", f.priority_support);
    }
    println!();
    println!("Prices per unit:");
    for op in [
        Operation::Audit,
        Operation::Fix,
        Operation::CompetitorAnalysis,
        Operation::ContentGeneration,
    ] {
        println!("  {:<20} {:.2}", op.as_str(), unit_price(&op));
    }
}

async fn cmd_usage(registry: &TenantRegistry, tenant_id: &TenantId) -> Result<ExitCode> {
    let records = registry
        .usage(tenant_id)
        .await
        .with_context(|| format!("Failed to read usage for {tenant_id}"))?;
    if records.is_empty() {
        println!("No usage recorded for {tenant_id}");
        return Ok(ExitCode::SUCCESS);
    }
    let mut total = 0.0;
    for r in &records {
        total += r.cost;
        println!(
            "{}  {:<20} {:>6.2}  {}",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.operation,
            r.cost,
            r.details
        );
    }
    println!("Total: {total:.2}");
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Fixes
// ---------------------------------------------------------------------------

async fn cmd_check(
    orchestrator: &FixOrchestrator,
    tenant_id: &TenantId,
    issue: &str,
    page: &str,
    custom: CustomArgs,
) -> Result<ExitCode> {
    let preview = orchestrator
        .preview(tenant_id, issue, page, custom.into_customizations())
        .await
        .with_context(|| format!("Failed to check {page}"))?;
    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(if preview.safety_report.is_safe {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

async fn cmd_apply(
    orchestrator: &FixOrchestrator,
    tenant_id: &TenantId,
    issue: &str,
    page: &str,
    custom: CustomArgs,
) -> Result<ExitCode> {
    let outcome = orchestrator
        .apply_fix(tenant_id, issue, page, custom.into_customizations())
        .await;
    orchestrator.metrics().flush();

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
        Err(e @ FatalError::RollbackFailed { .. }) => {
            let live = orchestrator.checkpoints().live();
            if let Some(checkpoint) = live.first() {
                eprintln!(
                    "Checkpoint {} holds the original page ({} bytes).",
                    checkpoint.checkpoint_id,
                    checkpoint.snapshot.byte_len()
                );
                println!("{}", serde_json::to_string_pretty(checkpoint)?);
            }
            bail!("{e}. Restore the page manually.")
        }
        Err(e) => Err(e).context("Fix failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_link() {
        let link = parse_link("/rye = Rye bread").unwrap();
        assert_eq!(link.url, "/rye");
        assert_eq!(link.anchor, "Rye bread");
        assert!(parse_link("no-anchor").is_err());
        assert!(parse_link("=anchor").is_err());
    }

    #[test]
    fn test_empty_customizations_are_none() {
        assert!(CustomArgs::default().into_customizations().is_none());
        let custom = CustomArgs {
            topic: Some("rye".into()),
            ..CustomArgs::default()
        };
        assert_eq!(
            custom.into_customizations().unwrap().topic.as_deref(),
            Some("rye")
        );
    }

    #[test]
    fn test_apply_args_parse() {
        let cli = Cli::try_parse_from([
            "seofix",
            "--store",
            "mem://",
            "apply",
            "t1",
            "internal_links",
            "/bread",
            "--link",
            "/rye=Rye",
            "--link",
            "/spelt=Spelt",
        ])
        .unwrap();
        match cli.command {
            Commands::Apply { custom, .. } => assert_eq!(custom.links.len(), 2),
            _ => panic!("expected apply"),
        }
    }
}
