//! Metadata filter engine
//!
//! Evaluates ordered glob patterns over a label or annotation map. Patterns are
//! applied in order starting from an empty result: a positive pattern adds every
//! matching key, a pattern prefixed with `!` removes every matching key. The last
//! pattern that matches a key decides. An empty pattern list copies the whole map.
//!
//! `*` is the only wildcard and matches any run of characters, `/` included.
//! Every other character matches itself.

use std::collections::BTreeMap;

/// Domains whose keys are managed by KubeVirt components rather than users
const SYSTEM_DOMAINS: &[&str] = &["kubevirt.io", "kubemacpool.io"];

/// Apply `patterns` to `source`, returning the keys that survive
pub fn filter_map(
    source: &BTreeMap<String, String>,
    patterns: &[String],
) -> BTreeMap<String, String> {
    if patterns.is_empty() {
        return source.clone();
    }

    let mut result = BTreeMap::new();
    for pattern in patterns {
        let (negated, glob) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern.as_str()),
        };
        for (key, value) in source {
            if !glob_match(glob, key) {
                continue;
            }
            if negated {
                result.remove(key);
            } else {
                result.insert(key.clone(), value.clone());
            }
        }
    }
    result
}

/// Whether `key` belongs to a system-managed domain (`<domain>/<name>`)
pub fn is_system_key(key: &str) -> bool {
    let Some((prefix, _)) = key.split_once('/') else {
        return false;
    };
    SYSTEM_DOMAINS.iter().any(|domain| {
        prefix == *domain
            || prefix
                .strip_suffix(domain)
                .is_some_and(|rest| rest.ends_with('.'))
    })
}

/// Copy user-authored metadata through the filters.
///
/// System-managed keys are dropped before filtering so no pattern can retain
/// them. Returns `None` when nothing is left.
pub fn copy_metadata(
    source: Option<&BTreeMap<String, String>>,
    patterns: &[String],
) -> Option<BTreeMap<String, String>> {
    let user_keys: BTreeMap<String, String> = source?
        .iter()
        .filter(|(key, _)| !is_system_key(key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let filtered = filter_map(&user_keys, patterns);
    if filtered.is_empty() {
        None
    } else {
        Some(filtered)
    }
}

/// Match `text` against a glob where `*` matches any sequence of characters
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text index it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
#[path = "filter_test.rs"]
mod filter_test;
