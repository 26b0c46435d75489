//! Initialize command.

use console::style;

use crate::config::{Config, Settings, CONFIG_FILENAME};
use crate::repository::SqliteStore;

/// Create the data directory and database, and write a starter config
/// when none exists.
pub async fn cmd_init(settings: &Settings, config: &Config) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    SqliteStore::new(&settings.database_path)?;
    println!(
        "  {} Database ready: {}",
        style("✓").green(),
        settings.database_path.display()
    );

    if settings.config_path.is_none() {
        let path = settings.data_dir.join(CONFIG_FILENAME);
        std::fs::write(&path, config.to_toml()?)?;
        println!("  {} Wrote config: {}", style("✓").green(), path.display());
    }

    if config.sources.api.is_empty() && config.sources.scrapers.is_empty() && !config.sources.demo {
        println!(
            "{} No live sources configured; add [[sources.api]] or [[sources.scrapers]] entries, or set sources.demo = true",
            style("!").yellow()
        );
    }

    println!(
        "{} Initialized umrahfare in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    Ok(())
}
