use std::collections::HashMap;

use crate::overrides::OverrideProvider;

/// Derive the environment variable name for a member.
///
/// `camelCase` boundaries (a lowercase letter or digit followed by an
/// uppercase letter) and runs of whitespace or hyphens become `_`, then the
/// result is uppercased: `poolSize` → `POOL_SIZE`, `log level` → `LOG_LEVEL`.
pub fn env_name(member: &str) -> String {
    let mut out = String::with_capacity(member.len() + 4);
    let mut prev: Option<char> = None;
    for c in member.chars() {
        if c.is_whitespace() || c == '-' {
            if !out.ends_with('_') || prev.is_some_and(|p| !p.is_whitespace() && p != '-') {
                out.push('_');
            }
            prev = Some(c);
            continue;
        }
        if c.is_uppercase() && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit()) {
            out.push('_');
        }
        out.extend(c.to_uppercase());
        prev = Some(c);
    }
    out
}

/// Looks overrides up in the process environment.
///
/// [`from_vars`](Self::from_vars) takes an iterator so tests can pass
/// synthetic data instead of `std::env::vars()`.
#[derive(Debug, Clone, Default)]
pub struct EnvProvider {
    snapshot: Option<HashMap<String, String>>,
}

impl EnvProvider {
    /// Read variables live from the process environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read variables from a fixed set instead of the environment.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            snapshot: Some(vars.into_iter().collect()),
        }
    }
}

impl OverrideProvider for EnvProvider {
    fn lookup(&self, key: &str) -> Option<String> {
        match &self.snapshot {
            Some(vars) => vars.get(key).cloned(),
            None => std::env::var(key).ok(),
        }
    }
}
