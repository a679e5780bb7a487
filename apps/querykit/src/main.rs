use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use query_core::Paginator;
use runtime::{AppConfig, CliArgs};
use std::path::{Path, PathBuf};

mod dto;

/// QueryKit - compile query documents and check paging arithmetic
#[derive(Parser)]
#[command(name = "querykit")]
#[command(about = "QueryKit - backend-agnostic query specification engine")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print current configuration and exit
    #[arg(long, global = true)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Default page size (overrides engine.paging.default_page_size)
    #[arg(long, global = true)]
    page_size: Option<u64>,

    /// Disable the query cache (overrides config)
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a YAML query document and print the statement with its bindings
    Compile {
        /// Query document
        file: PathBuf,
    },
    /// Page arithmetic over a result count
    Paginate {
        /// Total number of rows
        #[arg(long)]
        total: u64,
        /// Page size (defaults to engine.paging.default_page_size)
        #[arg(long)]
        size: Option<u64>,
        /// 1-based page, clamped into range
        #[arg(long, default_value_t = 1)]
        page: u64,
        /// Zero-based row index to scroll to
        #[arg(long, allow_negative_numbers = true)]
        scroll: Option<i64>,
    },
    /// Check configuration
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
        page_size: cli.page_size,
        no_cache: cli.no_cache,
    };

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    let home_dir = config.home_dir()?;
    runtime::init_logging_from_config(&logging_config, &home_dir);
    tracing::debug!(home_dir = %home_dir.display(), "querykit starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Check) {
        Commands::Compile { file } => compile_document(&file),
        Commands::Paginate {
            total,
            size,
            page,
            scroll,
        } => paginate(&config, total, size, page, scroll),
        Commands::Check => check_config(&config),
    }
}

fn compile_document(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read query document {}", file.display()))?;
    let query = dto::QueryDoc::parse(&text)?.into_query()?;
    let statement = query
        .compile()
        .with_context(|| format!("Failed to compile {}", file.display()))?;
    tracing::debug!(sql = %statement.sql, params = statement.params.len(), "compiled");

    println!("{}", statement.sql);
    for (name, value) in statement.params.iter() {
        println!("  :{name} = {value}");
    }
    Ok(())
}

fn paginate(
    config: &AppConfig,
    total: u64,
    size: Option<u64>,
    page: u64,
    scroll: Option<i64>,
) -> Result<()> {
    let mut paginator: Paginator = config
        .engine
        .paging
        .paginator(total, size, page)
        .context("Invalid paging arguments")?;

    if let Some(index) = scroll {
        let offset = paginator.scroll_to_index(index)?;
        println!("offset: {offset}");
    }

    let info = paginator.page_info();
    println!("page: {}", info.page);
    println!("page_size: {}", info.page_size);
    println!("pages: {}", info.pages_number);
    println!("first_result: {}", paginator.first_result());
    Ok(())
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    println!("Configuration is valid");
    println!("{}", config.to_yaml()?);
    Ok(())
}
