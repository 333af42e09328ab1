//! Initialize Docent.

use super::load_config;
use anyhow::{Context, Result};
use colored::Colorize;
use docent_config::Config;
use docent_db::Database;

pub fn run() -> Result<()> {
    let (paths, config) = load_config()?;

    if paths.is_initialized() {
        println!("{} Docent is already initialized.", "Note:".yellow().bold());
        println!("  Config: {}", paths.config_file.display());
        println!("  Database: {}", paths.database_file.display());
        return Ok(());
    }

    println!("{}", "Initializing Docent...".cyan().bold());

    paths.ensure_dirs().context("Failed to create directories")?;
    let blob_dir = config.blob_dir(&paths);
    std::fs::create_dir_all(&blob_dir)
        .with_context(|| format!("Failed to create blob directory {}", blob_dir.display()))?;
    println!("  {} Created directories", "✓".green());

    if !paths.config_file.exists() {
        Config::create_default_file(&paths.config_file).context("Failed to create config file")?;
        println!(
            "  {} Created config: {}",
            "✓".green(),
            paths.config_file.display()
        );
    }

    let _db = Database::open(&paths.database_file).context("Failed to initialize database")?;
    println!(
        "  {} Created database: {}",
        "✓".green(),
        paths.database_file.display()
    );

    println!();
    println!("{}", "Docent initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Pull the models: {}", format!("ollama pull {}", config.ollama.model).cyan());
    println!("  2. Submit a document: {}", "docent submit notes.txt".cyan());
    println!("  3. Start the workers: {}", "docent worker".cyan());

    Ok(())
}
