//! Environment variable parsing utilities.
//!
//! Configuration overrides (`FBS_DUMPER_*`) are read through these helpers so the
//! `var -> parse -> default` boilerplate lives in one place.
//!
//! # Example
//!
//! ```
//! use fbs_types::env_utils::{env_var, env_var_or};
//!
//! let window: usize = env_var_or("FBS_DUMPER_MAX_FUNCTION_BYTES", 0x4000);
//! let threads: Option<usize> = env_var("FBS_DUMPER_THREADS");
//! ```

use std::str::FromStr;

/// Parse an environment variable into a type that implements `FromStr`.
///
/// Returns `None` if the variable is not set or cannot be parsed.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse an environment variable with a default value.
pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    env_var(key).unwrap_or(default)
}

/// Get a non-empty string variable.
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_parsing() {
        std::env::set_var("FBS_TEST_WINDOW", " 512 ");
        let val: Option<usize> = env_var("FBS_TEST_WINDOW");
        assert_eq!(val, Some(512));

        let missing: Option<usize> = env_var("FBS_TEST_NONEXISTENT_1");
        assert_eq!(missing, None);

        std::env::remove_var("FBS_TEST_WINDOW");
    }

    #[test]
    fn test_env_var_or_falls_back_on_garbage() {
        std::env::set_var("FBS_TEST_GARBAGE", "lots");
        let val: u64 = env_var_or("FBS_TEST_GARBAGE", 7);
        assert_eq!(val, 7);
        std::env::remove_var("FBS_TEST_GARBAGE");
    }

    #[test]
    fn test_env_string_ignores_blank() {
        std::env::set_var("FBS_TEST_BLANK", "  ");
        assert_eq!(env_string("FBS_TEST_BLANK"), None);
        std::env::set_var("FBS_TEST_BLANK", "FlatData");
        assert_eq!(env_string("FBS_TEST_BLANK").as_deref(), Some("FlatData"));
        std::env::remove_var("FBS_TEST_BLANK");
    }
}
