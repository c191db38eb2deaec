use std::env;
use std::str::FromStr;

use crate::error::{Result, ToolFlowError};

/// Environment variable lookups.
pub struct EnvConfig;

impl EnvConfig {
    /// Resolves an API key:
    /// 1. a literal `api_key` is used as is
    /// 2. `${VAR_NAME}` reads that variable
    /// 3. an empty value falls back to `default_env_var`
    pub fn get_api_key(api_key: &str, default_env_var: &str) -> Result<String> {
        if api_key.starts_with("${") && api_key.ends_with('}') {
            let env_var_name = &api_key[2..api_key.len() - 1];
            Self::get_env(env_var_name)
        } else if api_key.is_empty() || api_key.starts_with("your_") {
            Self::get_env(default_env_var)
        } else {
            Ok(api_key.to_string())
        }
    }

    /// Required variable.
    pub fn get_env(key: &str) -> Result<String> {
        env::var(key).map_err(|_| {
            ToolFlowError::Configuration(format!("environment variable `{key}` is not set"))
        })
    }

    pub fn get_env_optional(key: &str) -> Option<String> {
        env::var(key).ok().filter(|value| !value.trim().is_empty())
    }

    /// Parses an optional variable; a present but malformed value is an error.
    pub fn parse_optional<T>(key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match Self::get_env_optional(key) {
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                ToolFlowError::Configuration(format!("`{key}` has invalid value `{raw}`: {e}"))
            }),
            None => Ok(None),
        }
    }

    /// True when `TOOLFLOW_DEBUG` is set.
    pub fn is_debug_mode() -> bool {
        env::var("TOOLFLOW_DEBUG").is_ok()
    }
}
