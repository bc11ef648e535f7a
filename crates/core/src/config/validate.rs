use super::{types::BatchConfig, ConfigError};
use crate::planner::BatchSize;

/// Validate configuration
/// Currently validates:
/// - Target expression and function are not blank
/// - Batch sizes resolve to at least one target
/// - Timeouts are not 0
/// - `safe_limit` and `safe_size` are set together
pub fn validate_config(config: &BatchConfig) -> Result<(), ConfigError> {
    if config.target.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "target cannot be empty".to_string(),
        ));
    }

    if config.function.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "function cannot be empty".to_string(),
        ));
    }

    if config.probe_function.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "probe_function cannot be empty".to_string(),
        ));
    }

    validate_batch_size("batch_size", &config.batch_size)?;

    if config.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.gather_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "gather_timeout_secs cannot be 0".to_string(),
        ));
    }

    match (config.safe_limit, &config.safe_size) {
        (Some(0), _) => {
            return Err(ConfigError::ValidationError(
                "safe_limit cannot be 0".to_string(),
            ));
        }
        (Some(_), Some(size)) => validate_batch_size("safe_size", size)?,
        (Some(_), None) => {
            return Err(ConfigError::ValidationError(
                "safe_limit requires safe_size".to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(ConfigError::ValidationError(
                "safe_size requires safe_limit".to_string(),
            ));
        }
        (None, None) => {}
    }

    Ok(())
}

fn validate_batch_size(field: &str, size: &BatchSize) -> Result<(), ConfigError> {
    match size {
        BatchSize::Absolute(0) => Err(ConfigError::ValidationError(format!(
            "{} cannot be 0",
            field
        ))),
        BatchSize::Percent(p) if !(*p > 0.0 && *p <= 100.0) => Err(ConfigError::ValidationError(
            format!("{} percentage must be in (0, 100], got {}", field, p),
        )),
        _ => Ok(()),
    }
}
