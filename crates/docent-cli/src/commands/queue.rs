//! Queue command - work queue totals and dead letters.

use super::{get_environment, short_id};
use anyhow::Result;
use colored::Colorize;

const DEAD_LETTER_LIMIT: usize = 50;

pub fn run(dead: bool, purge: bool) -> Result<()> {
    let env = get_environment()?;

    if purge {
        let removed = env.db.purge_done()?;
        println!("{} Removed {} delivered messages", "✓".green(), removed);
    }

    let counts = env.db.queue_counts()?;

    println!("{}", "Work Queue".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("  {} Pending: {}", "○".yellow(), counts.pending);
    println!("  {} Processing: {}", "◐".blue(), counts.processing);
    println!("  {} Delivered: {}", "●".green(), counts.done);
    if counts.dead > 0 {
        println!("  {} Dead: {}", "✗".red(), counts.dead);
    }

    println!();
    if env.db.integrity_check()? {
        println!("  Database: {}", "OK".green());
    } else {
        println!("  Database: {}", "INTEGRITY CHECK FAILED".red().bold());
    }

    if dead {
        let entries = env.db.dead_letters(DEAD_LETTER_LIMIT)?;
        println!();
        println!("{}", "Dead Letters".red().bold());

        if entries.is_empty() {
            println!("  {}", "None".dimmed());
        }

        for entry in &entries {
            println!(
                "  {} job {} after {} attempts ({})",
                "✗".red(),
                short_id(&entry.message.job_id),
                entry.attempts,
                entry.updated_at.format("%Y-%m-%d %H:%M")
            );
            if let Some(ref err) = entry.last_error {
                println!("    {}", err.dimmed());
            }
        }
    }

    if counts.pending == 0 && counts.processing == 0 {
        println!();
        println!(
            "{}",
            "Nothing waiting. Use 'docent submit <file>' to add a document.".dimmed()
        );
    }

    Ok(())
}
