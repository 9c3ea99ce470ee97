//! Repository parameter injection.
//!
//! Build configurations reference repository parameters as `$$NAME`. The
//! placeholders are replaced before the YAML is parsed, so parameters can
//! carry secrets that never live in the repository itself. Unknown names are
//! left untouched.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static PARAM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\$([a-zA-Z_][a-zA-Z0-9_]*)").unwrap());

/// Replace every known `$$NAME` placeholder in `input`.
pub fn inject(input: &str, params: &HashMap<String, String>) -> String {
    if params.is_empty() {
        return input.to_string();
    }

    PARAM_REGEX
        .replace_all(input, |caps: &Captures| match params.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Names of placeholders in `input` that `params` does not define.
pub fn unresolved(input: &str, params: &HashMap<String, String>) -> Vec<String> {
    PARAM_REGEX
        .captures_iter(input)
        .map(|caps| caps[1].to_string())
        .filter(|name| !params.contains_key(name))
        .collect()
}
