use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::agent::ScheduleStore;
use crate::config::AkerConfig;

use super::utils::load_persisted;

/// Print the devices the persisted schedule blocks at `at` (default: now)
pub fn check(config: &AkerConfig, at: Option<DateTime<Utc>>) -> Result<()> {
    let at = at.unwrap_or_else(Utc::now);
    let data_file = &config.schedule.data_file;

    let runtime = tokio::runtime::Runtime::new()?;
    let blocked = runtime.block_on(async {
        let store = ScheduleStore::new();
        load_persisted(data_file, &store)
            .await
            .with_context(|| format!("Failed to load schedule from {}", data_file.display()))?;

        store
            .evaluate_active(at)
            .await
            .with_context(|| format!("No schedule found at {}", data_file.display()))
    })?;

    println!("Schedule: {}", data_file.display());
    println!("At:       {}", at.format("%Y-%m-%d %H:%M:%S %Z"));
    println!();

    if blocked.is_empty() {
        println!("No devices blocked");
    } else {
        println!("Blocked devices ({}):", blocked.len());
        for mac in blocked.iter() {
            println!("  {}", mac);
        }
    }

    Ok(())
}
