use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cluster_scheduler::config::{ClusterSpec, SchedulerConfig};
use cluster_scheduler::scheduler::{JobRecord, Scheduler, SchedulerHandle};
use cluster_scheduler::shutdown::install_shutdown_handler;
use cluster_scheduler::ClusterSnapshot;

#[derive(Parser, Debug)]
#[command(name = "cluster-scheduler")]
#[command(version)]
#[command(about = "Place CPU/memory-bound jobs onto capacity-limited clusters")]
struct Args {
    /// Number of worker tasks
    #[arg(long, default_value = "5")]
    workers: usize,

    /// Maximum number of queued jobs before submissions are refused
    #[arg(long, default_value = "100")]
    queue_capacity: usize,

    /// Longest a placement attempt waits for a cluster's guard
    #[arg(long, default_value = "5")]
    lock_timeout_ms: u64,

    /// Drop jobs still unplaced this long after submission
    #[arg(long)]
    job_timeout_secs: Option<u64>,

    /// Interrupt jobs still running this long after shutdown begins.
    /// Without it, shutdown waits for every accepted job to finish.
    #[arg(long)]
    drain_timeout_secs: Option<u64>,

    /// Cluster to register, format "ID:CPU:MEM" (repeatable).
    /// Defaults to A:8:32 and B:16:64.
    #[arg(long = "cluster", value_parser = parse_cluster)]
    clusters: Vec<ClusterSpec>,

    /// Job to submit, format "ID:CPU:MEM:SECONDS" (repeatable).
    /// Defaults to 1:4:16:3, 2:2:8:9 and 3:6:24:12.
    #[arg(long = "job", value_parser = parse_job)]
    jobs: Vec<JobArg>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct JobArg {
    id: String,
    cpu: i64,
    memory: i64,
    duration_secs: i64,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct Rejection {
    job_id: String,
    backpressure: bool,
    error: String,
}

#[derive(Serialize)]
struct RunReport {
    jobs: Vec<JobRecord>,
    rejected: Vec<Rejection>,
    clusters: Vec<ClusterSnapshot>,
}

fn parse_cluster(s: &str) -> Result<ClusterSpec, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [id, cpu, memory] = parts.as_slice() else {
        return Err(format!("expected ID:CPU:MEM, got '{}'", s));
    };
    let cpu = cpu
        .parse::<u64>()
        .map_err(|e| format!("invalid cpu '{}': {}", cpu, e))?;
    let memory = memory
        .parse::<u64>()
        .map_err(|e| format!("invalid memory '{}': {}", memory, e))?;
    Ok(ClusterSpec::new(*id, cpu, memory))
}

fn parse_job(s: &str) -> Result<JobArg, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [id, cpu, memory, secs] = parts.as_slice() else {
        return Err(format!("expected ID:CPU:MEM:SECONDS, got '{}'", s));
    };
    let number = |field: &str, value: &str| {
        value
            .parse::<i64>()
            .map_err(|e| format!("invalid {} '{}': {}", field, value, e))
    };
    Ok(JobArg {
        id: id.to_string(),
        cpu: number("cpu", *cpu)?,
        memory: number("memory", *memory)?,
        duration_secs: number("duration", *secs)?,
    })
}

fn default_clusters() -> Vec<ClusterSpec> {
    vec![ClusterSpec::new("A", 8, 32), ClusterSpec::new("B", 16, 64)]
}

fn default_jobs() -> Vec<JobArg> {
    [("1", 4, 16, 3), ("2", 2, 8, 9), ("3", 6, 24, 12)]
        .into_iter()
        .map(|(id, cpu, memory, duration_secs)| JobArg {
            id: id.to_string(),
            cpu,
            memory,
            duration_secs,
        })
        .collect()
}

/// Wait until every accepted job is terminal or a shutdown signal arrives.
async fn wait_for_jobs(handle: &SchedulerHandle, shutdown: &CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let stats = handle.stats();
                if stats.jobs.queued + stats.jobs.running == 0 {
                    break;
                }
            }
        }
    }
}

fn print_report(report: &RunReport, format: &OutputFormat) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Table => {
            println!(
                "{:<12} {:<12} {:<10} {:>8} {:>8} {:>8}",
                "JOB", "STATUS", "CLUSTER", "CPU", "MEMORY", "RETRIES"
            );
            for job in &report.jobs {
                println!(
                    "{:<12} {:<12} {:<10} {:>8} {:>8} {:>8}",
                    job.id,
                    job.status.to_string(),
                    job.cluster_id.as_deref().unwrap_or("-"),
                    job.resource.cpu,
                    job.resource.memory,
                    job.attempts
                );
            }
            for rejection in &report.rejected {
                let status = if rejection.backpressure {
                    "backpressured"
                } else {
                    "rejected"
                };
                println!("{:<12} {:<12} {}", rejection.job_id, status, rejection.error);
            }
            println!();
            println!(
                "{:<10} {:>10} {:>10} {:>8} {:>8}",
                "CLUSTER", "CPU", "MEMORY", "ALLOCS", "RELEASES"
            );
            for cluster in &report.clusters {
                println!(
                    "{:<10} {:>10} {:>10} {:>8} {:>8}",
                    cluster.id,
                    format!("{}/{}", cluster.available_cpu, cluster.total_cpu),
                    format!("{}/{}", cluster.available_memory, cluster.total_memory),
                    cluster.allocations,
                    cluster.releases
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = SchedulerConfig::new(args.workers, args.queue_capacity)
        .with_lock_timeout(Duration::from_millis(args.lock_timeout_ms));
    if let Some(secs) = args.job_timeout_secs {
        config = config.with_default_job_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = args.drain_timeout_secs {
        config = config.with_drain_timeout(Duration::from_secs(secs));
    }

    let clusters = if args.clusters.is_empty() {
        default_clusters()
    } else {
        args.clusters
    };
    let mut scheduler = Scheduler::new(config)?;
    for cluster in clusters {
        scheduler.register_cluster(cluster.id, cluster.cpu, cluster.memory)?;
    }

    let handle = scheduler.start();
    let shutdown = install_shutdown_handler();

    let jobs = if args.jobs.is_empty() {
        default_jobs()
    } else {
        args.jobs
    };
    let mut rejected = Vec::new();
    for job in jobs {
        if let Err(e) = handle.submit_job(&job.id, job.cpu, job.memory, job.duration_secs) {
            tracing::warn!(job_id = %job.id, error = %e, "Job not accepted");
            rejected.push(Rejection {
                job_id: job.id,
                backpressure: e.is_backpressure(),
                error: e.to_string(),
            });
        }
    }

    wait_for_jobs(&handle, &shutdown).await;
    handle.shutdown().await;

    let report = RunReport {
        jobs: handle.jobs(),
        rejected,
        clusters: handle.cluster_status(),
    };
    print_report(&report, &args.output)?;
    Ok(())
}
