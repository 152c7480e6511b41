//! Module and language attribution for changed files.
//!
//! Module rules are tried in order against the forward-slash path; the first
//! match wins. Unmatched paths fall back to their top-level directory, and
//! bare file names land in [`UNCATEGORIZED`]. Classification never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::config::ModuleRuleConfig;
use crate::error::{Result, WorklogError};

pub const UNCATEGORIZED: &str = "uncategorized";
pub const UNKNOWN_LANGUAGE: &str = "Unknown";

#[derive(Debug, Clone)]
pub struct ModuleRule {
    pattern: Regex,
    module: String,
}

impl ModuleRule {
    pub fn new(pattern: &str, module: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|err| {
            WorklogError::InvalidInput(format!("Invalid module pattern {pattern:?}: {err}"))
        })?;
        Ok(Self {
            pattern,
            module: module.to_string(),
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Built-in Tables
// ═══════════════════════════════════════════════════════════════════════════════

const BUILTIN_RULES: &[(&str, &str)] = &[
    (r"aoem/crates/core/aoem-core", "aoem-core"),
    (r"aoem/crates/cc/aoem-cc", "aoem-cc"),
    (r"aoem/crates/state-kv", "aoem-state-kv"),
    (r"src/gpu-executor", "gpu-executor"),
    (r"src/vm-runtime", "vm-runtime"),
    (r"src/l2-executor", "l2-executor"),
    (r"src/defi-core", "defi-core"),
    (r"src/domain-registry", "domain-registry"),
    (r"plugins/evm-linker", "evm-linker"),
    (r"plugins/bitcoin-linker", "bitcoin-linker"),
    (r"plugins/solana-linker", "solana-linker"),
    (r"scripts/", "scripts"),
    (r"docs/", "docs"),
    (r"tests/", "tests"),
    (r"\.github/", "ci"),
];

pub static BUILTIN_MODULE_RULES: Lazy<Vec<ModuleRule>> = Lazy::new(|| {
    BUILTIN_RULES
        .iter()
        .map(|(pattern, module)| ModuleRule {
            pattern: Regex::new(pattern).unwrap(),
            module: (*module).to_string(),
        })
        .collect()
});

const LANGUAGES: &[(&str, &str)] = &[
    ("rs", "Rust"),
    ("ts", "TypeScript"),
    ("js", "JavaScript"),
    ("py", "Python"),
    ("md", "Markdown"),
    ("toml", "TOML"),
    ("json", "JSON"),
    ("yaml", "YAML"),
    ("yml", "YAML"),
    ("sol", "Solidity"),
    ("go", "Go"),
    ("sql", "SQL"),
    ("sh", "Bash"),
    ("ps1", "PowerShell"),
    ("c", "C"),
    ("cpp", "C++"),
];

/// Built-in rule table as `(pattern, module)` pairs, in match order.
pub fn builtin_rules() -> &'static [(&'static str, &'static str)] {
    BUILTIN_RULES
}

// ═══════════════════════════════════════════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub module: String,
    pub language: &'static str,
}

/// Classifier with optional user rules tried ahead of the built-in table.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    extra_rules: Vec<ModuleRule>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: &[ModuleRuleConfig]) -> Result<Self> {
        let extra_rules = rules
            .iter()
            .map(|rule| ModuleRule::new(&rule.pattern, &rule.module))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { extra_rules })
    }

    pub fn classify(&self, path: &str) -> Classification {
        Classification {
            module: self.module_for(path),
            language: detect_language(path),
        }
    }

    pub fn module_for(&self, path: &str) -> String {
        let normalized = normalize(path);
        self.extra_rules
            .iter()
            .chain(BUILTIN_MODULE_RULES.iter())
            .find(|rule| rule.matches(&normalized))
            .map(|rule| rule.module.clone())
            .unwrap_or_else(|| fallback_module(&normalized))
    }
}

/// Classifies with the built-in rules only.
pub fn classify(path: &str) -> Classification {
    Classifier::new().classify(path)
}

pub fn infer_module(path: &str) -> String {
    Classifier::new().module_for(path)
}

pub fn detect_language(path: &str) -> &'static str {
    let normalized = normalize(path);
    let extension = Path::new(&normalized)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    extension
        .and_then(|ext| {
            LANGUAGES
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, language)| *language)
        })
        .unwrap_or(UNKNOWN_LANGUAGE)
}

fn normalize(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    replaced.trim_start_matches("./").to_string()
}

fn fallback_module(normalized: &str) -> String {
    match normalized.split_once('/') {
        Some((first, _)) if !first.is_empty() => first.to_string(),
        _ => UNCATEGORIZED.to_string(),
    }
}
