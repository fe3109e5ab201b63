use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use reposcout::{
    parse, ClientConfig, LocalSearcher, RepositoryRevisions, SearchArgs, SearchBackendClient,
    SearchContext, SearchOptions, SearchOutput, Searcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct RootArgs {
    /// Directory holding one sub-directory per repository
    #[arg(short = 'd', long, default_value = ".")]
    root: PathBuf,

    /// Depth of repository directories below the root
    #[arg(long, default_value_t = reposcout::local::DEFAULT_REPO_DEPTH)]
    depth: usize,

    /// Patterns to ignore (glob format)
    #[arg(short, long)]
    ignore: Vec<String>,
}

#[derive(Parser)]
struct CliSearchArgs {
    /// Query, e.g. `needle file:\.rs$ repohasfile:Cargo.toml`
    query: String,

    #[command(flatten)]
    root: RootArgs,

    /// Repository to search (can be specified multiple times, default: all)
    #[arg(short = 'r', long = "repo")]
    repos: Vec<String>,

    /// Match symbol definitions only
    #[arg(long)]
    symbol: bool,

    /// Give up after this long, returning what was found so far (e.g. 2s, 500ms)
    #[arg(short, long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Stop after this many matching files (0 for unlimited)
    #[arg(long, default_value_t = 0)]
    max_files: usize,

    /// Show only statistics, not matches
    #[arg(short, long)]
    stats: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search repositories under a root directory
    Search(Box<CliSearchArgs>),

    /// List the repositories under a root directory
    List {
        #[command(flatten)]
        root: RootArgs,

        /// Print the repositories as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_client(root: RootArgs, config: ClientConfig) -> SearchBackendClient {
    let searcher: Arc<dyn Searcher> = Arc::new(
        LocalSearcher::new(root.root)
            .with_repo_depth(root.depth)
            .with_ignore_patterns(root.ignore),
    );
    SearchBackendClient::new(Some(searcher), config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ClientConfig::load_from(cli.config.as_deref())?;
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Search(args) => run_search(*args, config).await,
        Commands::List { root, json } => run_list(root, json, config).await,
    }
}

async fn run_list(root: RootArgs, json: bool, config: ClientConfig) -> Result<()> {
    let client = build_client(root, config);
    let listed = client.list_all(&SearchContext::background()).await;
    client.close();

    let mut names: Vec<String> = listed?
        .iter()
        .map(|(_, repo)| repo.name.clone())
        .collect();
    names.sort();

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for name in &names {
            println!("{}", name);
        }
    }
    Ok(())
}

async fn run_search(args: CliSearchArgs, config: ClientConfig) -> Result<()> {
    let pattern = parse(&args.query)?;
    let client = build_client(args.root, config);

    let ctx = match args.timeout {
        Some(timeout) => SearchContext::background().with_timeout(timeout),
        None => SearchContext::background(),
    };

    let repos: Vec<RepositoryRevisions> = if args.repos.is_empty() {
        let mut names: Vec<String> = client
            .list_all(&ctx)
            .await?
            .iter()
            .map(|(_, repo)| repo.name.clone())
            .collect();
        names.sort();
        names.into_iter().map(RepositoryRevisions::new).collect()
    } else {
        args.repos.iter().map(RepositoryRevisions::new).collect()
    };
    debug!("searching {} repositories with {}", repos.len(), client);

    let search_args = SearchArgs {
        pattern,
        repos,
        is_symbol: args.symbol,
        use_full_deadline: args.timeout.is_some(),
        options: SearchOptions {
            max_doc_display_count: args.max_files,
            ..SearchOptions::default()
        },
    };
    let result = client.search(&ctx, &search_args).await;
    client.metrics().log_stats();
    client.close();
    let result = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_search_results(&result, args.stats);
    }
    Ok(())
}

fn print_search_results(result: &SearchOutput, stats_only: bool) {
    if !stats_only {
        for file in &result.files {
            for m in &file.line_matches {
                if m.file_name {
                    println!(
                        "{}:{}",
                        file.repository.blue(),
                        file.file_name.as_str().yellow()
                    );
                } else {
                    println!(
                        "{}:{}:{}: {}",
                        file.repository.blue(),
                        file.file_name,
                        m.line_number.to_string().green(),
                        m.line
                    );
                }
            }
        }
        if !result.files.is_empty() {
            println!();
        }
    }

    println!(
        "Found {} matches in {} files",
        result.stats.match_count, result.stats.file_count
    );
    if result.stats.wall_time_exceeded {
        println!("{}", "Search stopped early: time budget spent".yellow());
    }
}
