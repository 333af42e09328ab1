//! Worker command - consume the work queue.

use super::get_environment;
use anyhow::{Context, Result};
use colored::Colorize;
use docent_pipeline::ProcessOutcome;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tracing::info;

pub fn run(concurrency: Option<usize>, once: bool) -> Result<()> {
    let env = get_environment()?;
    let client = env.ollama()?;

    let rt = Runtime::new().context("Failed to create async runtime")?;

    // Short documents never reach the model, so these are only warnings
    if rt.block_on(client.is_available()) {
        for model in [&env.config.ollama.model, &env.config.ollama.embedding_model] {
            if !rt.block_on(client.has_model(model)).unwrap_or(false) {
                println!(
                    "{} Model '{}' not found. Run: {}",
                    "Note:".yellow(),
                    model,
                    format!("ollama pull {}", model).cyan()
                );
            }
        }
    } else {
        println!(
            "{} Ollama is not running at {}. Start it with 'ollama serve'.",
            "Note:".yellow(),
            client.host()
        );
    }

    let worker = env.worker(client);

    if once {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.set_message("Draining work queue");
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        let outcomes = rt.block_on(worker.drain());
        pb.finish_and_clear();

        print_summary(&outcomes?);
        return Ok(());
    }

    let concurrency = concurrency.unwrap_or(env.config.worker.concurrency);
    if concurrency == 0 {
        anyhow::bail!("Concurrency must be at least 1");
    }

    println!(
        "{} Running {} workers. Press Ctrl+C to stop.",
        "Docent".cyan().bold(),
        concurrency
    );

    rt.block_on(async {
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, stopping workers");
                println!("\n{}", "Shutting down after in-flight jobs...".yellow());
                let _ = tx.send(true);
            }
        });

        worker.run_pool(concurrency, rx).await;
    });

    println!("{}", "Workers stopped.".green());
    Ok(())
}

fn print_summary(outcomes: &[ProcessOutcome]) {
    if outcomes.is_empty() {
        println!("{}", "Queue is empty.".dimmed());
        return;
    }

    for outcome in outcomes {
        match outcome {
            ProcessOutcome::Completed { job_id } => {
                println!("  {} {} completed", "●".green(), job_id)
            }
            ProcessOutcome::Skipped { job_id } => {
                println!("  {} {} skipped", "○".dimmed(), job_id)
            }
            ProcessOutcome::Retrying { job_id, delay } => println!(
                "  {} {} failed, retrying in {}s",
                "◐".yellow(),
                job_id,
                delay.as_secs()
            ),
            ProcessOutcome::DeadLettered { job_id } => {
                println!("  {} {} failed permanently", "✗".red(), job_id)
            }
            ProcessOutcome::LeaseLost { job_id } => println!(
                "  {} {} lease expired, left to another worker",
                "◐".dimmed(),
                job_id
            ),
        }
    }

    println!();
    println!("{} Processed {} messages", "✓".green(), outcomes.len());
}
