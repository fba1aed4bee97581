//! canopy - Asynchronous filesystem tree builder.
//!
//! Usage:
//!   canopy [PATH]                 Build the tree and show a summary
//!   canopy [PATH] --list          Also print every node with its type
//!   canopy export [PATH]          Export the tree to JSON
//!   canopy --help                 Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use canopy_core::{Node, NodeRecord, NodeType, TreeConfig, TreeStats};
use canopy_walk::{TreeBuilder, TreeEnd};

#[derive(Parser)]
#[command(
    name = "canopy",
    version,
    about = "Build a classified tree of a directory",
    long_about = "canopy walks a directory breadth-first and sorts every entry into \
                  branches (directories), leaves (plain files) and fruits (entries \
                  matching a fruit hint).\n\n\
                  Run `canopy [PATH]` for a summary, or `canopy export [PATH]` for JSON."
)]
struct Cli {
    /// Root directory (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Print every node with its classification
    #[arg(short, long)]
    list: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(flatten)]
    tree: TreeArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Options shared by every command.
#[derive(Args, Clone, Debug)]
struct TreeArgs {
    /// Name or extension classified as a fruit (repeatable)
    #[arg(short = 'F', long = "fruit", global = true)]
    fruits: Vec<String>,

    /// Name or extension classified as a leaf (repeatable)
    #[arg(short = 'L', long = "leaf", global = true)]
    leaves: Vec<String>,

    /// TOML file with `fruits`, `leaves`, `debug` and `verbose` keys
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(short, long, global = true)]
    timeout: Option<u64>,

    /// Log classification detail
    #[arg(long, global = true)]
    debug: bool,

    /// Log per-node progress
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Export the tree to JSON
    Export {
        /// Root directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// JSON document written by `export` and `--format json`.
#[derive(Serialize)]
struct Export<'a> {
    root: &'a Path,
    built_at: SystemTime,
    stats: TreeStats,
    nodes: Vec<NodeRecord>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config(&cli.tree)?;
    setup_logging(config.debug, config.verbose);

    match cli.command {
        Some(Command::Export { path, output }) => {
            run_export(&path, output, config, cli.tree.timeout).await?;
        }
        None => {
            run_summary(&cli.path, cli.list, cli.format, config, cli.tree.timeout).await?;
        }
    }

    Ok(())
}

/// Merge the optional config file with command-line flags.
fn load_config(args: &TreeArgs) -> Result<TreeConfig> {
    let file_config = match &args.config {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str::<TreeConfig>(&contents)
                .wrap_err_with(|| format!("Invalid config {}", path.display()))?
        }
        None => TreeConfig::default(),
    };

    let cli_config = TreeConfig::builder()
        .fruits(args.fruits.clone())
        .leaves(args.leaves.clone())
        .debug(args.debug)
        .verbose(args.verbose)
        .build()
        .wrap_err("Invalid classification hints")?;

    Ok(file_config.merge(cli_config))
}

fn setup_logging(debug: bool, verbose: bool) {
    let default = if debug {
        "canopy=debug,canopy_core=debug,canopy_walk=debug,warn"
    } else if verbose {
        "canopy=info,canopy_core=info,canopy_walk=info,warn"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Build the tree, optionally bounded by a timeout.
async fn build(path: &Path, config: TreeConfig, timeout: Option<u64>) -> Result<Arc<TreeEnd>> {
    let builder = TreeBuilder::spawn(path, config);
    let tree = match timeout {
        Some(secs) => {
            let limit = Duration::from_secs(secs);
            match tokio::time::timeout(limit, builder.finish()).await {
                Ok(result) => result,
                Err(_) => bail!("Gave up on {} after {secs}s", path.display()),
            }
        }
        None => builder.finish().await,
    };
    tree.wrap_err("Tree build failed")
}

/// Build the tree and display a summary.
async fn run_summary(
    path: &Path,
    list: bool,
    format: OutputFormat,
    config: TreeConfig,
    timeout: Option<u64>,
) -> Result<()> {
    eprintln!("Building tree from {}...", path.display());
    let tree = build(path, config, timeout).await?;

    match format {
        OutputFormat::Text => {
            let stats = tree.stats();
            println!();
            println!("{}", "─".repeat(60));
            println!(" {}", tree.root_path().display());
            println!(
                " {} nodes: {} branches, {} leaves, {} fruits",
                stats.nodes, stats.branches, stats.leaves, stats.fruits
            );
            println!(" Built in {:.2}s", tree.build_duration().as_secs_f64());
            println!("{}", "─".repeat(60));

            if list {
                println!();
                if let Some(root) = tree.root() {
                    print_node(root, 0);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&export(&tree))?);
        }
    }

    Ok(())
}

/// Export the tree to JSON.
async fn run_export(
    path: &Path,
    output: Option<PathBuf>,
    config: TreeConfig,
    timeout: Option<u64>,
) -> Result<()> {
    eprintln!("Building tree from {}...", path.display());
    let tree = build(path, config, timeout).await?;

    let json = serde_json::to_string_pretty(&export(&tree))?;

    match output {
        Some(output_path) => {
            std::fs::write(&output_path, json)?;
            eprintln!("Exported to {}", output_path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

fn export(tree: &TreeEnd) -> Export<'_> {
    Export {
        root: tree.root_path(),
        built_at: tree.built_at(),
        stats: tree.stats(),
        nodes: tree.records(),
    }
}

/// Print a node and its children.
fn print_node(node: &Node, depth: usize) {
    let indent = "  ".repeat(depth);
    let marker = match node.node_type() {
        Some(NodeType::Branch) => "▼ ",
        Some(NodeType::Fruit) => "* ",
        _ => "  ",
    };
    let kind = node.node_type().map(|t| t.to_string()).unwrap_or_default();

    println!("{indent}{marker}{:<40} {kind}", truncate(node.path(), 40));

    for child in node.children() {
        print_node(&child, depth + 1);
    }
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 1).collect();
        format!("{kept}…")
    }
}
