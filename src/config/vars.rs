//! Environment variable interpolation for config files.
//!
//! Supports the following syntax:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset or empty
//! - `$$` - escape sequence for literal `$`

use regex::Regex;
use std::env;
use std::sync::LazyLock;

/// Regex pattern for environment variable interpolation.
static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # Escape sequence $$
        |
        \$\{                           # Opening ${
            ([A-Za-z_][A-Za-z0-9_]*)   # Variable name (capture group 1)
            (?:                        # Optional default value group
                :-                     # :- separator
                ([^}]*)                # Default value (capture group 2)
            )?
        \}                             # Closing }
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # Unbraced $VAR (capture group 3)
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Any errors encountered during interpolation.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
///
/// All errors are accumulated so the operator can see every missing
/// variable at once.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let full_match = caps.get(0).expect("match always present").as_str();

            if full_match == "$$" {
                return "$".to_string();
            }

            let var_name = caps
                .get(1)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or("");
            let default_value = caps.get(2).map(|m| m.as_str());

            match env::var(var_name) {
                Ok(value) if !value.is_empty() => value,
                _ => {
                    if let Some(default) = default_value {
                        default.to_string()
                    } else {
                        errors.push(format!("environment variable '{var_name}' is not set"));
                        full_match.to_string()
                    }
                }
            }
        })
        .to_string();

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: test env vars use unique names and are restored below
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        // SAFETY: restoring original environment state
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_basic_substitution() {
        with_env_vars(&[("SHEETPRESS_TEST_BASIC", Some("hello"))], || {
            let result = interpolate("value: $SHEETPRESS_TEST_BASIC");
            assert!(result.is_ok());
            assert_eq!(result.text, "value: hello");
        });
    }

    #[test]
    fn test_braced_substitution() {
        with_env_vars(&[("SHEETPRESS_TEST_BRACED", Some("world"))], || {
            let result = interpolate("value: ${SHEETPRESS_TEST_BRACED}");
            assert!(result.is_ok());
            assert_eq!(result.text, "value: world");
        });
    }

    #[test]
    fn test_missing_variable_error() {
        with_env_vars(&[("SHEETPRESS_TEST_MISSING", None)], || {
            let result = interpolate("value: $SHEETPRESS_TEST_MISSING");
            assert!(!result.is_ok());
            assert_eq!(result.errors.len(), 1);
            assert!(result.errors[0].contains("SHEETPRESS_TEST_MISSING"));
        });
    }

    #[test]
    fn test_default_value_when_unset() {
        with_env_vars(&[("SHEETPRESS_TEST_UNSET", None)], || {
            let result = interpolate("value: ${SHEETPRESS_TEST_UNSET:-fallback}");
            assert!(result.is_ok());
            assert_eq!(result.text, "value: fallback");
        });
    }

    #[test]
    fn test_default_value_when_empty() {
        with_env_vars(&[("SHEETPRESS_TEST_EMPTY", Some(""))], || {
            let result = interpolate("value: ${SHEETPRESS_TEST_EMPTY:-fallback}");
            assert!(result.is_ok());
            assert_eq!(result.text, "value: fallback");
        });
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate("price: $$100");
        assert!(result.is_ok());
        assert_eq!(result.text, "price: $100");
    }

    #[test]
    fn test_yaml_config_example() {
        with_env_vars(
            &[
                ("SHEETPRESS_TEST_DB_HOST", Some("db.example.internal")),
                ("SHEETPRESS_TEST_DB_PASSWORD", Some("secret")),
                ("SHEETPRESS_TEST_DB_PORT", None),
            ],
            || {
                let yaml = r#"
database:
  host: ${SHEETPRESS_TEST_DB_HOST}
  password: ${SHEETPRESS_TEST_DB_PASSWORD}
  port: ${SHEETPRESS_TEST_DB_PORT:-5432}
"#;
                let result = interpolate(yaml);
                assert!(result.is_ok());
                assert!(result.text.contains("host: db.example.internal"));
                assert!(result.text.contains("password: secret"));
                assert!(result.text.contains("port: 5432"));
            },
        );
    }
}
