//! `${{key}}` placeholder substitution for prompt and message templates.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\{(\w+)\}\}").expect("placeholder pattern is valid"));

/// Replace each `${{key}}` in `template` with `variables[key]`.
///
/// Keys are word characters only (`[A-Za-z0-9_]`, plus Unicode word chars).
/// A placeholder whose key is missing from `variables` is left as written,
/// and substituted values are never re-scanned.
pub fn replace_template_placeholders(template: &str, variables: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            variables
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
