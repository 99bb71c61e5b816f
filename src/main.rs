use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use suite_runner::limits::ExecutionLimits;
use suite_runner::loader::DirectorySource;
use suite_runner::progress::{NullObserver, ProgressObserver, TracingObserver};
use suite_runner::protocol::{TaskDetails, TaskRequest, TaskStatus};
use suite_runner::queue::TestFileQueue;
use suite_runner::runner::TestFileRunner;
use suite_runner::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use suite_runner::transport::http::ReqwestTransport;

#[derive(Parser)]
#[command(name = "suite-runner")]
#[command(about = "Runs HTTP test suites against an environment", long_about = None)]
struct Cli {
    /// Debug-level logs (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs one test file and prints its result
    Run {
        /// Path to the test file
        #[arg(short, long)]
        file: PathBuf,

        /// Environment used to resolve variables
        #[arg(short, long, default_value = "")]
        environment: String,

        /// Writes the result JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Queues several files from a directory and waits for all of them
    Batch {
        /// Directory holding the test files
        #[arg(short, long)]
        dir: PathBuf,

        #[arg(short, long, default_value = "")]
        environment: String,

        /// Logs every finished test
        #[arg(long)]
        progress: bool,

        /// File names, relative to --dir
        #[arg(required = true)]
        files: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::from_env();
    if cli.verbose {
        telemetry = telemetry.verbose();
    }
    if let Err(e) = init_telemetry(telemetry) {
        eprintln!("Failed to initialize telemetry: {:#}", e);
    }

    let code = match run_cli(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            2
        }
    };

    shutdown_telemetry();
    std::process::exit(code);
}

fn build_queue(base_dir: PathBuf, observer: Arc<dyn ProgressObserver>) -> anyhow::Result<TestFileQueue> {
    let limits = ExecutionLimits::from_env();
    let transport = ReqwestTransport::new(limits.request_timeout).context("Failed to build HTTP client")?;
    let runner = TestFileRunner::new(Arc::new(transport), limits);
    Ok(TestFileQueue::new(runner, Arc::new(DirectorySource::new(base_dir)), observer))
}

/// Exit code: 0 when every test passed, 1 when some failed or a task did not complete.
async fn run_cli(command: Commands) -> anyhow::Result<i32> {
    match command {
        Commands::Run { file, environment, output } => {
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("--file must point to a file")?;
            let base_dir = file
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));

            let queue = build_queue(base_dir, Arc::new(NullObserver))?;
            let result = queue.run_file(&file_name, &environment).await?;

            info!(
                file = %result.file_name,
                passed = result.total_passed,
                failed = result.total_failed,
                elapsed_ms = result.total_elapsed_ms,
                "Run finished"
            );

            let json = serde_json::to_string_pretty(&result)?;
            match output {
                Some(path) => {
                    fs::write(&path, json).with_context(|| format!("Failed to write result to {:?}", path))?;
                    info!(path = ?path, "Result saved");
                }
                None => println!("{}", json),
            }

            Ok(if result.total_failed == 0 { 0 } else { 1 })
        }

        Commands::Batch {
            dir,
            environment,
            progress,
            files,
        } => {
            let observer: Arc<dyn ProgressObserver> = if progress {
                Arc::new(TracingObserver)
            } else {
                Arc::new(NullObserver)
            };
            let queue = build_queue(dir, observer)?;

            let mut ids = Vec::new();
            for file_name in &files {
                match queue.start(TaskRequest::new(file_name.as_str(), environment.as_str())).await {
                    Ok(id) => ids.push(id),
                    Err(e) => warn!(
                        file = %file_name,
                        code = %e.code(),
                        kind = e.code().description(),
                        "Skipping file: {}",
                        e
                    ),
                }
            }

            let stopper = queue.clone();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    for line in stopper.stop_all().await {
                        warn!("{}", line);
                    }
                }
            });

            let mut snapshots: Vec<TaskDetails> = Vec::new();
            for id in ids {
                snapshots.push(queue.join(id).await?);
            }
            interrupt.abort();

            println!("{}", serde_json::to_string_pretty(&snapshots)?);

            let all_passed = files.len() == snapshots.len()
                && snapshots.iter().all(|s| {
                    s.status == TaskStatus::Completed && s.results.iter().all(|r| r.success())
                });
            Ok(if all_passed { 0 } else { 1 })
        }
    }
}
