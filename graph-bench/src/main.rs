//! graph-bench: graph query latency and throughput on PostgreSQL vs Neo4j.
//!
//! Usage:
//!   graph-bench load postgres nodes.tsv edges.tsv        # wipe and bulk load
//!   graph-bench run postgres fof 3 1000 4 results.txt    # timed run, result file
//!   graph-bench run neo4j shortest_path 4 500 8          # timed run, console table
//!   graph-bench generate nodes.tsv edges.tsv --nodes 10000 --edges 80000

use clap::{Parser, Subcommand};
use colored::Colorize;
use graph_bench::adapters::{self, ScopedHandle, DEFAULT_BATCH_SIZE};
use graph_bench::config::ConnectionConfig;
use graph_bench::datagen::DataGen;
use graph_bench::runner::Runner;
use graph_bench::workloads::{self, PreparedWorkload, SamplePolicy};
use graph_bench::{loader, report, Backend, BenchResult, RunSpec, WorkloadKind};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "graph-bench", version)]
#[command(about = "Graph query benchmark for PostgreSQL (recursive CTEs) and Neo4j (Cypher)")]
struct Cli {
    /// TOML file with [postgres] / [neo4j] connection settings. Environment
    /// variables fill anything it leaves out.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wipe the backend and load a nodes file and an edges file.
    Load {
        /// postgres | neo4j
        backend: Backend,
        nodes: PathBuf,
        edges: PathBuf,
        /// Rows per insert batch.
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Run a timed workload.
    Run {
        /// postgres | neo4j
        backend: Backend,
        /// fof | reciprocal | shortest_path | filtered
        workload: WorkloadKind,
        /// Traversal depth (ignored by single-hop workloads, must still be >= 1).
        depth: u32,
        /// Number of timed operations.
        operations: usize,
        /// Number of worker threads, each with its own connection.
        threads: usize,
        /// Write the result file here instead of printing a summary table.
        output: Option<PathBuf>,
        /// What to do if the backend yields fewer candidates than operations.
        #[arg(long, default_value = "pad")]
        undersample: SamplePolicy,
        /// Seed for padding an undersampled working set.
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Also write run_result.json and append to run_results.csv in this directory.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Write a synthetic social graph in the loader's file format.
    Generate {
        nodes_out: PathBuf,
        edges_out: PathBuf,
        #[arg(long, default_value_t = 10_000)]
        nodes: usize,
        #[arg(long, default_value_t = 100_000)]
        edges: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> BenchResult<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Load {
            backend,
            nodes,
            edges,
            batch_size,
        } => {
            let cfg = connection_config(cli.config.as_ref())?;
            cfg.require(backend)?;
            let mut db = ScopedHandle::new(adapters::open(backend, &cfg)?);
            let stats = loader::load(&mut *db, &nodes, &edges, batch_size)?;
            println!(
                "  {} {} nodes, {} edges ({} lines skipped)",
                "LOADED".green().bold(),
                stats.nodes,
                stats.edges,
                stats.skipped
            );
        }

        Command::Run {
            backend,
            workload,
            depth,
            operations,
            threads,
            output,
            undersample,
            seed,
            export,
        } => {
            let spec = RunSpec::new(backend, workload, depth, operations, threads, output)?;
            let cfg = connection_config(cli.config.as_ref())?;
            cfg.require(spec.backend())?;
            run(&spec, &cfg, undersample, seed, export)?;
        }

        Command::Generate {
            nodes_out,
            edges_out,
            nodes,
            edges,
            seed,
        } => {
            let graph = DataGen::new(seed).social_graph(nodes, edges);
            graph.write_nodes(BufWriter::new(File::create(&nodes_out)?))?;
            graph.write_edges(BufWriter::new(File::create(&edges_out)?))?;
            println!(
                "  {} {} nodes -> {}, {} edges -> {}",
                "GENERATED".green().bold(),
                graph.nodes.len(),
                nodes_out.display(),
                graph.edges.len(),
                edges_out.display()
            );
        }
    }

    Ok(())
}

fn connection_config(path: Option<&PathBuf>) -> BenchResult<ConnectionConfig> {
    let cfg = match path {
        Some(p) => ConnectionConfig::load_toml(p)?,
        None => ConnectionConfig::default(),
    };
    Ok(cfg.with_env())
}

fn run(
    spec: &RunSpec,
    cfg: &ConnectionConfig,
    policy: SamplePolicy,
    seed: u64,
    export: Option<PathBuf>,
) -> BenchResult<()> {
    let mut template = ScopedHandle::new(adapters::open(spec.backend(), cfg)?);

    let prepared = PreparedWorkload::setup(
        workloads::create(spec.workload(), spec.depth()),
        &mut *template,
        spec.operations(),
        policy,
        seed,
    )?;
    tracing::info!(
        workload = %prepared.kind(),
        candidates = prepared.candidates().len(),
        ids_per_operation = prepared.candidates().arity(),
        "working set ready"
    );

    let result = Runner::new().run(&prepared, &*template, spec.operations(), spec.threads())?;

    match spec.output() {
        Some(path) => report::write_report(path, spec, &result)?,
        None => report::print_summary(spec, &result),
    }
    if let Some(dir) = export {
        report::export(&dir, spec, &result)?;
    }
    Ok(())
}
