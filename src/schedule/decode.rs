use anyhow::{Context, Result};

use crate::error::AkerError;
use crate::schedule::model::{AbsoluteBlock, BlockRule, DAY_NAMES, Schedule};

/// Largest accepted distance from UTC, in minutes
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Decode a schedule document (JSON) and validate it
pub fn decode_schedule(bytes: &[u8]) -> Result<Schedule, AkerError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(AkerError::DecodeFailure(
            "schedule document is empty".to_string(),
        ));
    }

    let schedule: Schedule = serde_json::from_slice(bytes)
        .map_err(|e| AkerError::DecodeFailure(e.to_string()))?;

    validate_schedule(&schedule).map_err(|e| AkerError::DecodeFailure(format!("{:#}", e)))?;

    Ok(schedule)
}

/// Validate a decoded schedule
pub fn validate_schedule(schedule: &Schedule) -> Result<()> {
    if schedule.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        anyhow::bail!(
            "UTC offset must be within ±{} minutes, got: {}",
            MAX_UTC_OFFSET_MINUTES,
            schedule.utc_offset_minutes
        );
    }

    for (i, rule) in schedule.rules.iter().enumerate() {
        validate_rule(rule).with_context(|| format!("Invalid rule #{}", i + 1))?;
    }

    for (i, block) in schedule.absolute.iter().enumerate() {
        validate_absolute(block).with_context(|| format!("Invalid absolute block #{}", i + 1))?;
    }

    Ok(())
}

fn validate_rule(rule: &BlockRule) -> Result<()> {
    if rule.macs.is_empty() {
        anyhow::bail!("Rule must list at least one MAC address");
    }

    if rule.start == rule.end {
        anyhow::bail!("Rule start and end are both {}", rule.start);
    }

    for day in &rule.days {
        let day_lower = day.to_lowercase();
        if !DAY_NAMES.contains(&day_lower.as_str()) {
            anyhow::bail!("Invalid day name: {}", day);
        }
    }

    Ok(())
}

fn validate_absolute(block: &AbsoluteBlock) -> Result<()> {
    if block.macs.is_empty() {
        anyhow::bail!("Absolute block must list at least one MAC address");
    }

    if block.until <= block.from {
        anyhow::bail!(
            "Absolute block ends ({}) before it starts ({})",
            block.until.to_rfc3339(),
            block.from.to_rfc3339()
        );
    }

    Ok(())
}
