use ans_ingest::config::Config;
use ans_ingest::infra::ReqwestHttp;
use ans_ingest::logging;
use ans_ingest::pipeline::report::RunReport;
use ans_ingest::pipeline::Pipeline;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn};

#[derive(Parser)]
#[command(name = "ans_ingest")]
#[command(about = "ANS quarterly expense ingestion and aggregation")]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults to ./ans_ingest.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover quarters, download and normalize files, write the canonical table
    Consolidate,
    /// Validate and aggregate an existing canonical table (no network access)
    Aggregate,
    /// Run consolidate then aggregate
    Run,
}

fn print_report(report: &RunReport) {
    println!("\n📊 {} results:", report.pipeline);
    for (key, value) in &report.counts {
        println!("   {key}: {value}");
    }
    if let Some(artifact) = &report.artifact {
        println!("   Output file: {}", artifact.display());
    }
    if !report.diagnostics.is_empty() {
        warn!("{} diagnostics recorded during {} run", report.diagnostics.len(), report.pipeline);
        println!("\n⚠️  Diagnostics:");
        for diagnostic in &report.diagnostics {
            println!("   - {diagnostic}");
        }
    }
    match &report.failure {
        None => println!("✅ {} completed successfully", report.pipeline),
        Some(reason) => println!("❌ {} failed: {}", report.pipeline, reason),
    }
}

async fn consolidate(config: &Config) -> anyhow::Result<bool> {
    let http = ReqwestHttp::new(config.request_timeout(), config.download_timeout())?;
    let report = Pipeline::run_consolidation(config, &http).await?;
    print_report(&report);
    Ok(report.succeeded)
}

fn aggregate(config: &Config) -> anyhow::Result<bool> {
    let report = Pipeline::run_aggregation(config)?;
    print_report(&report);
    Ok(report.succeeded)
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Consolidate => {
            println!("🔄 Running consolidation pipeline...");
            consolidate(&config).await
        }
        Commands::Aggregate => {
            println!("🔨 Running aggregation pipeline...");
            aggregate(&config)
        }
        Commands::Run => {
            println!("🚀 Running full pipeline (consolidate + aggregate)...");
            println!("\n📥 Step 1: consolidate");
            if !consolidate(&config).await? {
                return Ok(false);
            }
            println!("\n🔨 Step 2: aggregate");
            aggregate(&config)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };
    let _guard = logging::init_logging(&config.log_dir);

    match run(cli, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Run aborted: {:#}", e);
            println!("❌ Run aborted: {e:#}");
            ExitCode::FAILURE
        }
    }
}
