use crate::error::{Result, ToolFlowError};
use crate::runtime::RetryPolicy;

const MAX_RETRIES: u32 = 10;

/// Checks shared by the config loaders.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(ToolFlowError::Configuration("URL must not be empty".into()));
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolFlowError::Configuration(format!(
                "URL `{url}` must start with http:// or https://"
            )));
        }

        Ok(())
    }

    /// Letters, digits, `_`, `-` and `.` only.
    pub fn validate_tool_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ToolFlowError::Configuration("tool name must not be empty".into()));
        }

        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(ToolFlowError::Configuration(format!(
                "tool name `{name}` contains invalid characters"
            )));
        }

        Ok(())
    }

    pub fn validate_unit_interval(field: &str, value: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ToolFlowError::Configuration(format!(
                "`{field}` must be within [0, 1], got {value}"
            )));
        }
        Ok(())
    }

    pub fn validate_non_negative(field: &str, value: f64) -> Result<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(ToolFlowError::Configuration(format!(
                "`{field}` must be a non-negative number, got {value}"
            )));
        }
        Ok(())
    }

    pub fn validate_retry(field: &str, policy: &RetryPolicy) -> Result<()> {
        if !policy.multiplier.is_finite() || policy.multiplier < 1.0 {
            return Err(ToolFlowError::Configuration(format!(
                "`{field}.multiplier` must be >= 1.0, got {}",
                policy.multiplier
            )));
        }
        if policy.max_retries > MAX_RETRIES {
            return Err(ToolFlowError::Configuration(format!(
                "`{field}.max_retries` must be <= {MAX_RETRIES}, got {}",
                policy.max_retries
            )));
        }
        if policy.max_retries > 5 {
            tracing::warn!(field, retries = policy.max_retries, "unusually high retry count");
        }
        Ok(())
    }
}
