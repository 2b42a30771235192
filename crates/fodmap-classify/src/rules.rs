//! Deterministic keyword classifier.
//!
//! Matches normalized product text against configured low/high FODMAP
//! keyword tables. HIGH is tested before LOW: a product naming both a high-
//! and a low-FODMAP ingredient (e.g. "wheat bread with corn") is classified
//! HIGH, the conservative choice. Makes no I/O calls and never fails.

use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::{KeywordSet, RuleConfig};
use crate::FodmapClassifier;
use fodmap_core::{Classification, Error, FodmapStatus, Product, Result};

/// Standalone weight/volume/count tokens stripped before matching.
static UNIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+g\b|\b\d+ml\b|\b\d+l\b|\b\d+kg\b|\b\d+\b").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// A compiled keyword pattern and the canonical keyword it reports.
struct KeywordPattern {
    pattern: Regex,
    canonical: String,
}

/// Rule-based classifier over configured keyword/synonym tables.
pub struct RuleClassifier {
    high: Vec<KeywordPattern>,
    low: Vec<KeywordPattern>,
    ignore: Vec<String>,
}

impl RuleClassifier {
    pub fn new(config: &RuleConfig) -> Result<Self> {
        let ignore: Vec<String> = config.ignore.iter().map(|t| fold_ascii(t)).collect();
        Ok(Self {
            high: compile_keyword_set(&config.high, &ignore)?,
            low: compile_keyword_set(&config.low, &ignore)?,
            ignore,
        })
    }

    /// Classify from name and category text alone.
    pub fn classify_text(&self, name: &str, category: &str) -> Classification {
        let text = self.normalize(&format!("{} {}", name, category));

        if let Some(keyword) = first_match(&self.high, &text) {
            return matched(FodmapStatus::High, keyword);
        }
        if let Some(keyword) = first_match(&self.low, &text) {
            return matched(FodmapStatus::Low, keyword);
        }

        Classification {
            status: FodmapStatus::Unknown,
            is_food: None,
            explanation: None,
        }
    }

    /// Fold to plain ASCII lowercase, drop ignore tokens and standalone
    /// numeric/unit tokens, collapse whitespace.
    fn normalize(&self, text: &str) -> String {
        let mut normalized = fold_ascii(text);
        for token in &self.ignore {
            if !token.is_empty() {
                normalized = normalized.replace(token.as_str(), "");
            }
        }
        let normalized = UNIT_RE.replace_all(&normalized, "");
        WHITESPACE_RE.replace_all(&normalized, " ").trim().to_string()
    }
}

#[async_trait]
impl FodmapClassifier for RuleClassifier {
    async fn classify(&self, product: &Product) -> Classification {
        let result = self.classify_text(&product.name, &product.category);
        debug!(
            "Rule classification for '{}': {}",
            product.name, result.status
        );
        result
    }

    async fn classify_batch(
        &self,
        products: &[Product],
    ) -> Result<HashMap<String, Classification>> {
        Ok(products
            .iter()
            .map(|p| {
                (
                    p.identity_hash.clone(),
                    self.classify_text(&p.name, &p.category),
                )
            })
            .collect())
    }
}

fn matched(status: FodmapStatus, keyword: &str) -> Classification {
    Classification {
        status,
        is_food: Some(true),
        explanation: Some(format!("matched '{}'", keyword)),
    }
}

fn first_match<'a>(patterns: &'a [KeywordPattern], text: &str) -> Option<&'a str> {
    patterns
        .iter()
        .find(|kp| kp.pattern.is_match(text))
        .map(|kp| kp.canonical.as_str())
}

/// Compile keywords plus synonym keys into word-boundary patterns. Synonyms
/// match under their own spelling but report the canonical keyword.
fn compile_keyword_set(set: &KeywordSet, ignore: &[String]) -> Result<Vec<KeywordPattern>> {
    let mut patterns = Vec::with_capacity(set.keywords.len() + set.synonyms.len());
    for keyword in &set.keywords {
        patterns.push(compile_pattern(keyword, keyword, ignore)?);
    }
    for (synonym, canonical) in &set.synonyms {
        patterns.push(compile_pattern(synonym, canonical, ignore)?);
    }
    Ok(patterns)
}

fn compile_pattern(keyword: &str, canonical: &str, ignore: &[String]) -> Result<KeywordPattern> {
    let mut normalized = fold_ascii(keyword);
    for token in ignore {
        if !token.is_empty() {
            normalized = normalized.replace(token.as_str(), "");
        }
    }
    let normalized = WHITESPACE_RE.replace_all(normalized.trim(), " ");
    let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(&normalized)))
        .map_err(|e| Error::Config(format!("invalid keyword '{}': {}", keyword, e)))?;
    Ok(KeywordPattern {
        pattern,
        canonical: canonical.to_string(),
    })
}

/// Lowercase and transliterate to ASCII. Covers the Serbian Latin
/// diacritics the keyword tables use; other non-ASCII characters are
/// dropped, matching how both sides of a comparison are normalized.
fn fold_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        match c {
            'š' => out.push('s'),
            'č' | 'ć' => out.push('c'),
            'ž' => out.push('z'),
            'đ' => out.push_str("dj"),
            c if c.is_ascii() => out.push(c),
            _ => {}
        }
    }
    out
}
