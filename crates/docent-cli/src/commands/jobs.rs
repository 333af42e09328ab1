//! Jobs command - list recent jobs.

use super::{get_environment, short_id, truncate};
use anyhow::Result;
use colored::Colorize;
use docent_core::JobState;

pub fn run(state: Option<String>, limit: usize) -> Result<()> {
    let state = match state {
        Some(s) => Some(
            JobState::from_str(&s)
                .ok_or_else(|| anyhow::anyhow!("Unknown job state: {}", s))?,
        ),
        None => None,
    };

    let env = get_environment()?;
    let counts = env.db.job_counts()?;
    let jobs = env.db.list_jobs(state, limit)?;

    println!("{}", "Jobs".cyan().bold());
    println!("{}", "─".repeat(70));
    println!(
        "  {} Processing: {}   {} Completed: {}   {} Failed: {}",
        "◐".yellow(),
        counts.processing,
        "●".green(),
        counts.completed,
        "✗".red(),
        counts.failed
    );
    println!();

    if jobs.is_empty() {
        println!(
            "{}",
            "No jobs found. Use 'docent submit <file>' to add one.".dimmed()
        );
        return Ok(());
    }

    for job in &jobs {
        let marker = match job.state {
            JobState::Processing => "◐".yellow(),
            JobState::Completed => "●".green(),
            JobState::Failed => "✗".red(),
        };
        let detail = match job.state {
            JobState::Completed => job.summary.as_deref().unwrap_or(""),
            JobState::Failed => job.error_message.as_deref().unwrap_or(""),
            JobState::Processing => "",
        };

        println!(
            "  {} {}  {}  {:<10}  {}",
            marker,
            short_id(&job.id).dimmed(),
            job.created_at.format("%Y-%m-%d %H:%M"),
            job.state.as_str(),
            truncate(detail, 40)
        );
    }

    Ok(())
}
