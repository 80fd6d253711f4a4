//! Keyword canonicalization
//!
//! Every place that compares keywords (preference learning, keyword affinity,
//! recommendation similarity) goes through `KeywordNormalizer` so that
//! "Apps", "app " and "APPS" meet on the same canonical form.
//!
//! Pipeline:
//!   trim → strip markup/entities → lowercase → fold diacritics
//!   → quotes/underscores/hyphens to spaces → collapse whitespace
//!   → length bounds → naive singularization → stopwords → aliases → stopwords

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const MIN_KEYWORD_LEN: usize = 2;
pub const MAX_KEYWORD_LEN: usize = 60;

const DEFAULT_STOPWORDS: &[&str] = &[
    // English
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
    "of", "on", "or", "our", "the", "this", "that", "to", "we", "with", "your",
    // French
    "au", "aux", "avec", "ce", "ces", "dans", "de", "des", "du", "en", "et", "la", "le", "les",
    "leur", "mais", "nos", "notre", "ou", "par", "pour", "sa", "se", "ses", "son", "sur", "un",
    "une", "vos", "votre",
    // Too generic on a project platform
    "projet", "project", "idee", "idea",
];

const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("app", "application"),
    ("appli", "application"),
    ("ia", "ai"),
    ("intelligence artificielle", "ai"),
    ("artificial intelligence", "ai"),
    ("ecolo", "ecologie"),
    ("ecology", "ecologie"),
    ("js", "javascript"),
];

/// Keyword normalizer settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Extra stopwords, merged with the built-in list
    #[serde(default)]
    pub stopwords: Vec<String>,
    /// Extra `alias → canonical` pairs, overriding built-ins on conflict
    #[serde(default)]
    pub aliases: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeywordNormalizer {
    stopwords: HashSet<String>,
    aliases: HashMap<String, String>,
}

impl Default for KeywordNormalizer {
    fn default() -> Self {
        Self::new(&KeywordConfig::default())
    }
}

impl KeywordNormalizer {
    pub fn new(config: &KeywordConfig) -> Self {
        let stopwords: HashSet<String> = DEFAULT_STOPWORDS
            .iter()
            .map(|s| s.to_string())
            .chain(config.stopwords.iter().filter_map(|s| canonicalize(s)))
            .collect();

        let raw_aliases = DEFAULT_ALIASES
            .iter()
            .map(|(a, c)| (a.to_string(), c.to_string()))
            .chain(config.aliases.iter().cloned());

        // Keys and targets go through the same pipeline as input so lookups line up.
        let mut aliases = HashMap::new();
        for (alias, canonical) in raw_aliases {
            if let (Some(alias), Some(canonical)) = (canonicalize(&alias), canonicalize(&canonical)) {
                if alias != canonical {
                    aliases.insert(alias, canonical);
                }
            }
        }

        Self {
            stopwords,
            aliases: resolve_alias_chains(aliases),
        }
    }

    /// Canonical form of one keyword, or `None` when it is unusable
    pub fn normalize_keyword(&self, raw: &str) -> Option<String> {
        let candidate = canonicalize(raw)?;
        if self.stopwords.contains(&candidate) {
            return None;
        }

        let resolved = self.aliases.get(&candidate).cloned().unwrap_or(candidate);
        if self.stopwords.contains(&resolved) {
            return None;
        }

        Some(resolved)
    }

    /// Splits a delimited keyword string and returns unique canonical keywords
    /// in first-seen order, at most `limit` of them.
    pub fn normalize_raw_keywords(&self, raw: &str, limit: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for part in raw.split([',', ';', '|', '#', '\n', '\r', '\t']) {
            if out.len() >= limit {
                break;
            }
            if let Some(keyword) = self.normalize_keyword(part) {
                if seen.insert(keyword.clone()) {
                    out.push(keyword);
                }
            }
        }

        out
    }

    /// Normalized keyword set of an optional free-text field
    pub fn keyword_set(&self, raw: Option<&str>, limit: usize) -> HashSet<String> {
        raw.map(|r| self.normalize_raw_keywords(r, limit))
            .unwrap_or_default()
            .into_iter()
            .collect()
    }
}

/// Everything up to and including singularization. Idempotent.
fn canonicalize(raw: &str) -> Option<String> {
    let stripped = strip_markup(raw.trim());
    let lowered = stripped.to_lowercase();
    let folded = fold_diacritics(&lowered);

    let spaced: String = folded
        .chars()
        .map(|c| match c {
            '\'' | '"' | '`' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{201C}'
            | '\u{201D}' | '\u{00AB}' | '\u{00BB}' | '\u{00B4}' | '_' | '-' | '\u{2010}'
            | '\u{2013}' | '\u{2014}' => ' ',
            other => other,
        })
        .collect();

    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    if !within_bounds(&collapsed) {
        return None;
    }

    let singular = collapsed
        .split(' ')
        .map(singularize)
        .collect::<Vec<_>>()
        .join(" ");
    if !within_bounds(&singular) {
        return None;
    }

    Some(singular)
}

fn within_bounds(keyword: &str) -> bool {
    let len = keyword.chars().count();
    (MIN_KEYWORD_LEN..=MAX_KEYWORD_LEN).contains(&len)
}

/// Drops `<tags>` and replaces `&entities;` with spaces
fn strip_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '<' => {
                for inner in chars.by_ref() {
                    if inner == '>' {
                        break;
                    }
                }
                out.push(' ');
            }
            '&' => {
                let mut entity = String::new();
                let mut terminated = false;
                while let Some(&next) = chars.peek() {
                    if next == ';' {
                        chars.next();
                        terminated = true;
                        break;
                    }
                    if !(next.is_ascii_alphanumeric() || next == '#') || entity.len() > 10 {
                        break;
                    }
                    entity.push(next);
                    chars.next();
                }
                if terminated && !entity.is_empty() {
                    out.push(' ');
                } else {
                    out.push(' ');
                    out.push_str(&entity);
                }
            }
            other => out.push(other),
        }
    }

    out
}

/// NFD decomposition with combining marks removed, then a few ligatures
/// that have no decomposition. Characters without a mapping pass through.
fn fold_diacritics(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.nfd().filter(|c| !is_combining_mark(*c)) {
        match c {
            'æ' => out.push_str("ae"),
            'œ' => out.push_str("oe"),
            'ß' => out.push_str("ss"),
            'ø' => out.push('o'),
            'ł' => out.push('l'),
            'đ' => out.push('d'),
            'ð' => out.push('d'),
            'þ' => out.push_str("th"),
            other => out.push(other),
        }
    }
    out
}

fn singularize(word: &str) -> String {
    if word.chars().count() <= 3 {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    if word.ends_with("us") || word.ends_with("is") || word.ends_with("ss") {
        return word.to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => word.to_string(),
    }
}

/// Follows alias chains (a → b → c becomes a → c); cycles keep their first hop.
fn resolve_alias_chains(aliases: HashMap<String, String>) -> HashMap<String, String> {
    let mut resolved = HashMap::with_capacity(aliases.len());
    for (alias, first) in &aliases {
        let mut target = first.clone();
        let mut visited = HashSet::from([alias.clone()]);
        while let Some(next) = aliases.get(&target) {
            if !visited.insert(target.clone()) {
                target = first.clone();
                break;
            }
            target = next.clone();
        }
        resolved.insert(alias.clone(), target);
    }
    resolved
}
