//! Job and daemon commands.

use console::style;
use tracing::info;

use super::helpers::open_services;
use crate::config::{Config, Settings};
use crate::scheduler::{JobRun, JobStatus};

fn print_run(run: &JobRun) {
    let status = match run.status {
        JobStatus::Success => style(run.status.as_str()).green(),
        JobStatus::Failed => style(run.status.as_str()).red(),
        _ => style(run.status.as_str()).yellow(),
    };
    println!("{} {} in {}ms", style(&run.name).bold(), status, run.duration_ms);
    if let Some(error) = &run.error {
        println!("  {}", error);
    }
    if let Some(result) = &run.result {
        println!("  {}", result);
    }
}

pub async fn cmd_jobs_list(settings: &Settings, config: &Config, json: bool) -> anyhow::Result<()> {
    let services = open_services(settings, config).await?;
    let jobs = services.scheduler.list_jobs().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }
    for job in &jobs {
        let enabled = if job.enabled {
            style("enabled").green()
        } else {
            style("disabled").dim()
        };
        println!(
            "  {:<18} every {:>4}h  {}",
            style(&job.name).bold(),
            job.interval_hours,
            enabled
        );
    }
    Ok(())
}

pub async fn cmd_jobs_run(settings: &Settings, config: &Config, name: &str) -> anyhow::Result<()> {
    let services = open_services(settings, config).await?;
    let run = services.scheduler.run_job(name).await?;
    print_run(&run);
    if run.status == JobStatus::Failed {
        anyhow::bail!("Job {} failed", name);
    }
    Ok(())
}

/// Run the scheduler until Ctrl-C.
pub async fn cmd_daemon(settings: &Settings, config: &Config, run_now: bool) -> anyhow::Result<()> {
    let services = open_services(settings, config).await?;
    let scheduler = &services.scheduler;

    if run_now {
        for job in scheduler.list_jobs().await.iter().filter(|j| j.enabled) {
            print_run(&scheduler.run_job(&job.name).await?);
        }
    }

    scheduler.start().await;
    let stats = scheduler.stats().await;
    println!(
        "{} Scheduler running on {} with {} of {} jobs enabled (Ctrl-C to stop)",
        style("✓").green(),
        stats.host,
        stats.enabled_jobs,
        stats.jobs_count
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    scheduler.stop().await;

    let stats = scheduler.stats().await;
    println!(
        "{} Stopped after {} runs ({} failed)",
        style("✓").green(),
        stats.total_runs,
        stats.total_failures
    );
    Ok(())
}
