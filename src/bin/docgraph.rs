//! docgraph CLI: build and inspect document knowledge graphs.
//!
//! Usage:
//!   docgraph build <input> [--toc F] [--config F] [--out F] [--db F] [--backend mock|command] [--workers N]
//!   docgraph inspect <graph.json> [--node ID] [--depth N]

use clap::{Parser, Subcommand};
use docgraph::{
    BackendKind, CancellationToken, GraphDocument, KnowledgeGraph, NodeId, NodeKind, OpenStore,
    PipelineConfig, RelationshipType, RunReport, SemanticOrchestrator, SqliteStore, TextDocument,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "docgraph",
    version,
    about = "Build typed, weighted knowledge graphs from documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over a document and write the graph
    Build {
        /// Text file (pages split on form feeds) or directory of unit files
        input: PathBuf,
        /// JSON file with the native TOC
        #[arg(long)]
        toc: Option<PathBuf>,
        /// YAML config file (default: <config dir>/docgraph/config.yaml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output JSON path (default: <input>.graph.json)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also save the graph to this SQLite database
        #[arg(long)]
        db: Option<PathBuf>,
        /// Intelligence backend: mock or command
        #[arg(long)]
        backend: Option<String>,
        /// Concurrent backend calls
        #[arg(long)]
        workers: Option<usize>,
        /// Enhance at most this many units
        #[arg(long)]
        max_units: Option<usize>,
    },
    /// Print a summary of a graph, or the neighbourhood of one node
    Inspect {
        /// Graph JSON written by `build`
        graph: PathBuf,
        /// Node to start from
        #[arg(long)]
        node: Option<String>,
        /// Traversal depth for --node
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
}

struct BuildArgs {
    input: PathBuf,
    toc: Option<PathBuf>,
    config: Option<PathBuf>,
    out: Option<PathBuf>,
    db: Option<PathBuf>,
    backend: Option<String>,
    workers: Option<usize>,
    max_units: Option<usize>,
}

fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("graph.json")
}

async fn cmd_build(args: BuildArgs) -> i32 {
    let mut config = match PipelineConfig::resolve(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if let Some(kind) = args.backend.as_deref() {
        match kind.parse::<BackendKind>() {
            Ok(kind) => config.backend.kind = kind,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }
    if let Some(workers) = args.workers {
        config.enhancement.worker_count = workers;
    }
    if let Some(max_units) = args.max_units {
        config.enhancement.max_units = Some(max_units);
    }

    let backend = match config.backend.build() {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let mut source = match TextDocument::open(&args.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", args.input.display(), e);
            return 1;
        }
    };
    if let Some(toc) = args.toc {
        source = source.with_toc_file(toc);
    }

    let mut orchestrator = SemanticOrchestrator::new(config, backend);
    if let Some(db) = &args.db {
        match SqliteStore::open(db) {
            Ok(store) => orchestrator = orchestrator.with_store(Arc::new(store)),
            Err(e) => {
                eprintln!("Error: failed to open database: {}", e);
                return 1;
            }
        }
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing with a partial graph");
                cancel.cancel();
            }
        });
    }

    let outcome = match orchestrator.run(&source, &cancel).await {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let out = args
        .out
        .unwrap_or_else(|| default_output_path(&args.input));
    if let Err(e) = GraphDocument::write_to(&outcome.graph, &out) {
        eprintln!("Error: failed to write '{}': {}", out.display(), e);
        return 1;
    }

    print_report(&outcome.report);
    println!("Graph written to {}", out.display());
    if let Some(db) = &args.db {
        println!("Graph saved to {}", db.display());
    }
    0
}

fn print_report(report: &RunReport) {
    println!(
        "Structure:  {} ({} units)",
        report.toc_origin.as_str(),
        report.units_total
    );
    println!(
        "Enhanced:   {} ok, {} failed, {} skipped{}",
        report.units_enhanced,
        report.units_failed,
        report.units_skipped,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    for failure in &report.failures {
        println!("  unit {}: {}", failure.unit_index + 1, failure.error);
    }
    println!(
        "Graph:      {} nodes, {} edges, {} orphaned",
        report.node_count,
        report.edge_count,
        report.orphaned_nodes.len()
    );
}

fn cmd_inspect(path: &Path, node: Option<&str>, depth: usize) -> i32 {
    let graph = match GraphDocument::read_from(path) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error: cannot load '{}': {}", path.display(), e);
            return 1;
        }
    };
    match node {
        None => {
            print_summary(&graph);
            0
        }
        Some(id) => print_neighbourhood(&graph, &NodeId::from_string(id), depth),
    }
}

fn print_summary(graph: &KnowledgeGraph) {
    let root = graph
        .root()
        .and_then(|id| graph.node(id))
        .map(|n| n.label().to_string())
        .unwrap_or_else(|| "(none)".to_string());
    println!("Document: {}", root);
    println!("{:<12}  {:>7}", "NODE KIND", "COUNT");
    println!("{}", "-".repeat(21));
    for kind in NodeKind::ALL {
        println!("{:<12}  {:>7}", kind.as_str(), graph.nodes_of_kind(kind).count());
    }

    let mut by_type: BTreeMap<RelationshipType, (usize, usize)> = BTreeMap::new();
    for edge in graph.edges() {
        let entry = by_type.entry(edge.relationship_type).or_default();
        entry.0 += 1;
        if edge.is_retired() {
            entry.1 += 1;
        }
    }
    println!();
    println!("{:<12}  {:>7}  {:>7}", "EDGE TYPE", "COUNT", "RETIRED");
    println!("{}", "-".repeat(30));
    for (rel, (count, retired)) in by_type {
        println!("{:<12}  {:>7}  {:>7}", rel.as_str(), count, retired);
    }
}

fn print_neighbourhood(graph: &KnowledgeGraph, origin: &NodeId, depth: usize) -> i32 {
    let subgraph = match graph.get_subgraph(origin, depth) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    for node in &subgraph.nodes {
        let distance = subgraph.distances.get(&node.id).copied().unwrap_or_default();
        println!(
            "{}{} [{}] {}",
            "  ".repeat(distance),
            node.id,
            node.kind,
            node.label()
        );
    }
    println!();
    for edge in &subgraph.edges {
        println!(
            "{} -{}-> {}  weight={:.3} confidence={:.2}{}",
            edge.source_id,
            edge.relationship_type,
            edge.target_id,
            edge.weight(),
            edge.confidence,
            if edge.is_semantic { " semantic" } else { "" }
        );
    }
    0
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docgraph=info")),
        )
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Build {
            input,
            toc,
            config,
            out,
            db,
            backend,
            workers,
            max_units,
        } => {
            cmd_build(BuildArgs {
                input,
                toc,
                config,
                out,
                db,
                backend,
                workers,
                max_units,
            })
            .await
        }
        Commands::Inspect { graph, node, depth } => cmd_inspect(&graph, node.as_deref(), depth),
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_defaults_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("docs/report.txt")),
            PathBuf::from("docs/report.graph.json")
        );
        assert_eq!(
            default_output_path(Path::new("scans")),
            PathBuf::from("scans.graph.json")
        );
    }

    #[test]
    fn cli_parses_build_flags() {
        let cli = Cli::try_parse_from([
            "docgraph", "build", "doc.txt", "--workers", "2", "--backend", "command", "--max-units", "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Build {
                input,
                workers,
                backend,
                max_units,
                ..
            } => {
                assert_eq!(input, PathBuf::from("doc.txt"));
                assert_eq!(workers, Some(2));
                assert_eq!(backend.as_deref(), Some("command"));
                assert_eq!(max_units, Some(5));
            }
            Commands::Inspect { .. } => panic!("expected build"),
        }
    }
}
