//! Environment variable interpolation for config files.
//!
//! Supports the following syntax:
//! - `$VAR` or `${VAR}` - substitute with the variable, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`
//!
//! Credentials are normally supplied this way (`${AWS_ACCESS_KEY_ID}`), so the
//! values end up as explicit config fields rather than ambient process state.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # escape
        |
        \$\{
            ([A-Za-z_][A-Za-z0-9_]*)   # 1: name
            (?:
                (:?-)                  # 2: default operator
                ([^}]*)                # 3: default value
            )?
        \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # 4: bare name
        ",
    )
    .expect("Invalid regex pattern")
});

/// Interpolate variables from the process environment.
///
/// All problems are collected so the user sees every missing variable at once.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    interpolate_with(input, |name| std::env::var(name).ok())
}

/// Interpolate variables resolved through `lookup`.
pub fn interpolate_with<F>(input: &str, lookup: F) -> Result<String, Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        let whole = &caps[0];
        if whole == "$$" {
            return "$".to_string();
        }

        let name = caps
            .get(1)
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let operator = caps.get(2).map(|m| m.as_str());
        let default = caps.get(3).map(|m| m.as_str());

        match lookup(name) {
            Some(value) if value.contains(['\n', '\r']) => {
                errors.push(format!(
                    "environment variable '{name}' contains newlines, which is not allowed"
                ));
                whole.to_string()
            }
            Some(value) if value.is_empty() && operator == Some(":-") => {
                default.unwrap_or_default().to_string()
            }
            Some(value) => value,
            None => match default {
                Some(default) => default.to_string(),
                None => {
                    errors.push(format!("environment variable '{name}' is not set"));
                    whole.to_string()
                }
            },
        }
    });

    if errors.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(errors)
    }
}
