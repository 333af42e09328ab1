//! Status command - report on a single job.

use super::get_environment;
use anyhow::{Context, Result};
use colored::Colorize;
use docent_core::JobState;
use docent_pipeline::{job_report, JobReport};

pub fn run(job_id: &str, json: bool) -> Result<()> {
    let env = get_environment()?;
    let report = job_report(&env.db, job_id)?;

    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", out);
        return Ok(());
    }

    print_report(&report);

    // Delivery details only matter while the job is still moving
    if report.status == JobState::Processing {
        if let Some(entry) = env.db.queue_entries_for_job(&report.job_id)?.first() {
            println!(
                "  Queue: {} (attempt {}/{})",
                entry.status, entry.attempts, entry.max_attempts
            );
            if let Some(ref err) = entry.last_error {
                println!("  Last error: {}", err.dimmed());
            }
        }
    }

    Ok(())
}

fn print_report(report: &JobReport) {
    let status = match report.status {
        JobState::Processing => "processing".yellow(),
        JobState::Completed => "completed".green(),
        JobState::Failed => "failed".red(),
    };

    println!("{} {}", "Job".cyan().bold(), report.job_id);
    println!("{}", "─".repeat(50));
    println!("  Status: {}", status);

    if let Some(ref summary) = report.summary {
        println!();
        println!("{}", "Summary".white().bold());
        println!("  {}", summary);
    }

    if let Some(ref topics) = report.topics {
        println!();
        println!("{}", "Topics".white().bold());
        for topic in topics {
            println!("  {} {}", "•".dimmed(), topic);
        }
    }

    if let Some(sentiment) = report.sentiment {
        println!();
        println!("  Sentiment: {}", sentiment);
    }

    if let Some(ref error) = report.error {
        println!();
        println!("  {} {}", "Error:".red(), error);
    }
}
