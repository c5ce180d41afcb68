//! Environment variable access.
//!
//! Everything that reads the environment takes a [`Lookup`] so tests can
//! supply a fixed map instead of mutating the process environment.

/// Returns the value of a variable, or `None` when unset.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Lookup backed by the process environment.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Replace `${VAR}` references. Unset variables expand to the empty string.
pub fn resolve_env_with(s: &str, lookup: Lookup<'_>) -> String {
    let mut result = s.to_string();
    let mut from = 0;

    while let Some(offset) = result[from..].find("${") {
        let start = from + offset;
        let Some(len) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + len];
        let value = lookup(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + len + 1..]);
        // Expanded text is not scanned again.
        from = start + value.len();
    }

    result
}

/// Parse a boolean flag: `true`, `1`, `yes` and `on` are true, ignoring case.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
