//! Submit command - hand a document to the intake handler.

use super::get_environment;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tokio::runtime::Runtime;
use tracing::debug;

pub fn run(file: &str) -> Result<()> {
    let env = get_environment()?;

    let path = Path::new(file);
    if !path.is_file() {
        anyhow::bail!("File does not exist: {}", path.display());
    }

    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());
    debug!("Read {} bytes from {}", bytes.len(), path.display());

    let rt = Runtime::new().context("Failed to create async runtime")?;
    let job_id = rt.block_on(env.intake().submit(&bytes, &name))?;

    println!("{} {}", "Submitted:".green().bold(), name);
    println!("  Job ID: {}", job_id);
    println!(
        "  Check progress: {}",
        format!("docent status {}", job_id).cyan()
    );

    Ok(())
}
