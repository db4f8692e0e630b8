//! bulkgraph: load a line-oriented JSON graph into an in-memory store.
//!
//! Run: cargo run --release --bin bulkgraph -- graph.json --reduce-tasks 8
//!
//! Log level comes from RUST_LOG (default `info`).

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use bulkgraph::{BulkLoader, LoadConfig, LoadError, MemoryGraph};

#[derive(Parser, Debug)]
#[command(name = "bulkgraph", about = "Three-phase parallel bulk graph loader")]
struct Args {
    /// Input file, one JSON vertex per line
    input: PathBuf,

    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Input partitions (vertex-write tasks)
    #[arg(long)]
    map_tasks: Option<usize>,

    /// Reconcile partitions
    #[arg(long)]
    reduce_tasks: Option<usize>,

    /// Worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Write policy: default | merge-by-key
    #[arg(long)]
    policy: Option<String>,

    /// Property key matched by merge-by-key
    #[arg(long)]
    merge_key: Option<String>,

    /// Attempts per task before the load fails
    #[arg(long)]
    max_task_attempts: Option<u32>,

    /// Load into a store without transaction support
    #[arg(long)]
    non_transactional: bool,
}

impl Args {
    fn load_config(&self) -> Result<LoadConfig> {
        let mut config = match &self.config {
            Some(path) => LoadConfig::read_from(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => LoadConfig::default(),
        };
        if let Some(n) = self.map_tasks {
            config.map_tasks = n;
        }
        if let Some(n) = self.reduce_tasks {
            config.reduce_tasks = n;
        }
        if let Some(n) = self.threads {
            config.threads = n;
        }
        if let Some(name) = &self.policy {
            config.policy = name.clone();
        }
        if let Some(key) = &self.merge_key {
            config.merge_key = key.clone();
        }
        if let Some(n) = self.max_task_attempts {
            config.max_task_attempts = n;
        }
        Ok(config)
    }
}

fn run(args: &Args) -> Result<()> {
    let config = args.load_config()?;
    let graph = if args.non_transactional {
        MemoryGraph::non_transactional()
    } else {
        MemoryGraph::new()
    };

    let loader = BulkLoader::from_config(Arc::new(graph.clone()), config)?;
    let file = File::open(&args.input)
        .with_context(|| format!("opening input {}", args.input.display()))?;
    let report = loader.run_input(BufReader::new(file))?;

    println!("{}", report.counters);
    info!(
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        terminators = report.terminators,
        "target graph"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.downcast_ref::<LoadError>().map(LoadError::code).unwrap_or("ERROR");
            error!(code, "{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::try_parse_from([
            "bulkgraph",
            "graph.json",
            "--reduce-tasks",
            "8",
            "--policy",
            "merge-by-key",
            "--merge-key",
            "uid",
        ])
        .unwrap();
        let config = args.load_config().unwrap();

        assert_eq!(config.reduce_tasks, 8);
        assert_eq!(config.policy, "merge-by-key");
        assert_eq!(config.merge_key, "uid");
        assert_eq!(config.map_tasks, LoadConfig::default().map_tasks);
        assert!(!args.non_transactional);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("load.json");
        let file_config = LoadConfig { reduce_tasks: 3, threads: 2, max_task_attempts: 4, ..LoadConfig::default() };
        file_config.write_to(&path).unwrap();

        let path_arg = path.to_string_lossy().into_owned();
        let args = Args::try_parse_from([
            "bulkgraph",
            "graph.json",
            "--config",
            path_arg.as_str(),
            "--threads",
            "6",
            "--non-transactional",
        ])
        .unwrap();
        let config = args.load_config().unwrap();

        assert_eq!(config.reduce_tasks, 3, "kept from the file");
        assert_eq!(config.max_task_attempts, 4, "kept from the file");
        assert_eq!(config.threads, 6, "flag wins");
        assert!(args.non_transactional);
    }

    #[test]
    fn test_missing_config_file_is_reported() {
        let args = Args::try_parse_from(["bulkgraph", "graph.json", "--config", "/nonexistent/load.json"]).unwrap();
        let err = args.load_config().unwrap_err();
        assert!(format!("{err:#}").contains("reading config"));
    }
}
