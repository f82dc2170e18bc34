use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use effimig_storage::{
    MemoryTargetStore, MySqlTargetStore, PgLegacyCmsStore, PgLegacyWebStore, TargetStore,
};
use effimig_sync::{
    init_logging, DriverKind, MigrationRules, Migrator, RunSummary, SyncConfig,
    DEFAULT_LOG_FILTER,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "effimig")]
#[command(about = "Migrate legacy effi content into WordPress")]
struct Cli {
    /// Write to an in-memory target instead of MySQL and copy no files.
    #[arg(long, global = true)]
    dry_run: bool,
    /// Migration rules file (categories, pages, date overrides).
    #[arg(long, global = true)]
    rules: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// CMS users.
    Users,
    /// Authors named in the articles table.
    Authors,
    /// CMS nodes.
    Nodes,
    /// Legacy articles.
    Articles,
    /// Hand-picked pages from the rules file.
    Pages,
    /// Attachment files under the article root.
    Attachments,
    /// Redirects listed in a `"src" => "target"` file.
    Redirects { file: PathBuf },
    /// Category assignment and recount.
    Categories,
    /// Every driver in dependency order.
    All {
        #[arg(long)]
        redirects: Option<PathBuf>,
    },
    /// Create the unique indexes the writers rely on.
    Prepare,
}

impl Commands {
    fn driver(&self) -> Option<DriverKind> {
        match self {
            Commands::Users => Some(DriverKind::CmsUsers),
            Commands::Authors => Some(DriverKind::ArticleAuthors),
            Commands::Nodes => Some(DriverKind::CmsNodes),
            Commands::Articles => Some(DriverKind::Articles),
            Commands::Pages => Some(DriverKind::Pages),
            Commands::Attachments => Some(DriverKind::Attachments),
            Commands::Categories => Some(DriverKind::Categories),
            Commands::Redirects { .. } | Commands::All { .. } | Commands::Prepare => None,
        }
    }
}

fn target_store(config: &SyncConfig, dry_run: bool) -> Result<Arc<dyn TargetStore>> {
    if dry_run {
        return Ok(Arc::new(MemoryTargetStore::new()));
    }
    let store = MySqlTargetStore::connect_lazy(&config.target_database_url)
        .context("configuring target database pool")?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(DEFAULT_LOG_FILTER)?;

    let mut config = SyncConfig::from_env();
    if let Some(rules) = cli.rules {
        config.rules_path = rules;
    }
    let rules = MigrationRules::load(&config.rules_path)?;
    let target = target_store(&config, cli.dry_run)?;
    let web = PgLegacyWebStore::connect_lazy(&config.web_database_url)
        .context("configuring articles database pool")?;
    let cms = PgLegacyCmsStore::connect_lazy(&config.cms_database_url)
        .context("configuring CMS database pool")?;
    let reports_dir = config.reports_dir.clone();
    let migrator = Migrator::new(config, rules, target)
        .with_web(Arc::new(web))
        .with_cms(Arc::new(cms))
        .with_dry_run(cli.dry_run);

    let mut summary = RunSummary::start(cli.dry_run);
    match &cli.command {
        Commands::Redirects { file } => {
            summary.drivers.push(migrator.import_redirect_file(file).await?);
        }
        Commands::All { redirects } => {
            migrator.prepare(&DriverKind::ALL).await?;
            summary.drivers = migrator.run_all(redirects.as_deref()).await?;
        }
        Commands::Prepare => {
            migrator.prepare(&DriverKind::ALL).await?;
            println!("natural-key indexes in place");
            return Ok(());
        }
        command => {
            if let Some(kind) = command.driver() {
                summary.drivers.push(migrator.run(kind).await?);
            }
        }
    }

    let summary = summary.finish();
    let path = summary.write_to(&reports_dir).await?;
    info!(run_id = %summary.run_id, report = %path.display(), "run complete");
    println!(
        "run complete: run_id={} posts={} redirects={} report={}",
        summary.run_id,
        summary.posts_written(),
        summary.redirects_written(),
        path.display()
    );

    Ok(())
}
