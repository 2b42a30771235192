//! Gemini-backed FODMAP classifier.
//!
//! Builds natural-language prompts for single products or enumerated
//! batches, calls the Gemini generateContent endpoint, and parses the
//! response into classification results. The external API is treated as
//! unreliable: parse failures degrade item-by-item, only transport-level
//! batch failures propagate to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::ClassifierConfig;
use crate::rate_limit::{acquire, RateLimiter, RatePolicy};
use crate::FodmapClassifier;
use fodmap_core::{normalize_status, Classification, Error, FodmapStatus, Product, Result};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Classifier calling the Gemini generateContent API.
pub struct GeminiClassifier {
    client: Client,
    api_key: Option<String>,
    model: String,
    batch_cap: usize,
    inter_chunk_delay: Duration,
    limiter: Arc<RateLimiter>,
    policy: RatePolicy,
}

impl GeminiClassifier {
    pub fn new(config: &ClassifierConfig, limiter: Arc<RateLimiter>) -> Self {
        let policy = match config.rate_limit_policy.as_str() {
            "wait" => RatePolicy::Wait {
                max_attempts: config.rate_limit_wait_attempts,
                poll_interval: Duration::from_millis(config.rate_limit_poll_interval_ms),
            },
            _ => RatePolicy::Reject,
        };

        Self {
            client: Client::new(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
            batch_cap: config.effective_batch_size(),
            inter_chunk_delay: Duration::from_secs(config.inter_chunk_delay_secs),
            limiter,
            policy,
        }
    }

    /// One generateContent round-trip, returning the candidate text.
    async fn generate(&self, api_key: &str, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_BASE, self.model, api_key
        );
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
        });

        debug!("Calling Gemini model {}", self.model);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!("API error {}: {}", status, body)));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("Invalid response body: {}", e)))?;

        value["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| Error::Http("Response missing candidate text".into()))
    }
}

#[async_trait]
impl FodmapClassifier for GeminiClassifier {
    async fn classify(&self, product: &Product) -> Classification {
        let Some(api_key) = self.api_key.clone() else {
            return Classification::unknown("Gemini API key not configured");
        };

        if !acquire(&self.limiter, &self.policy).await {
            warn!(
                "Gemini rate limit reached, falling back to UNKNOWN for '{}' ({} calls in window)",
                product.name,
                self.limiter.current_count()
            );
            return Classification::unknown("rate limit exceeded, classification deferred");
        }

        let prompt = build_single_prompt(product);
        match self.generate(&api_key, &prompt).await {
            Ok(text) => {
                let result = parse_single_response(&text);
                debug!(
                    "Gemini classified '{}' as {} ({} calls in window)",
                    product.name,
                    result.status,
                    self.limiter.current_count()
                );
                result
            }
            Err(e) => {
                error!("Gemini classification failed for '{}': {}", product.name, e);
                Classification::unknown(e.to_string())
            }
        }
    }

    async fn classify_batch(
        &self,
        products: &[Product],
    ) -> Result<HashMap<String, Classification>> {
        if products.is_empty() {
            return Ok(HashMap::new());
        }

        // A misconfigured API key degrades every item instead of failing the
        // pipeline: the records surface as UNKNOWN rather than stuck PENDING.
        let Some(api_key) = self.api_key.clone() else {
            warn!(
                "Gemini API key not configured, marking {} products UNKNOWN",
                products.len()
            );
            return Ok(products
                .iter()
                .map(|p| {
                    (
                        p.identity_hash.clone(),
                        Classification::unknown("Gemini API key not configured"),
                    )
                })
                .collect());
        };

        if products.len() == 1 {
            let result = self.classify(&products[0]).await;
            return Ok(HashMap::from([(products[0].identity_hash.clone(), result)]));
        }

        let mut results = HashMap::with_capacity(products.len());
        for (i, chunk) in products.chunks(self.batch_cap.max(1)).enumerate() {
            if i > 0 && !self.inter_chunk_delay.is_zero() {
                tokio::time::sleep(self.inter_chunk_delay).await;
            }

            if !acquire(&self.limiter, &self.policy).await {
                warn!(
                    "Gemini rate limit reached for batch chunk of {}, falling back to UNKNOWN",
                    chunk.len()
                );
                for product in chunk {
                    results.insert(
                        product.identity_hash.clone(),
                        Classification::unknown("rate limit exceeded, classification deferred"),
                    );
                }
                continue;
            }

            let prompt = build_batch_prompt(chunk);
            let text = self.generate(&api_key, &prompt).await?;
            info!(
                "Gemini batch response for {} products ({} calls in window)",
                chunk.len(),
                self.limiter.current_count()
            );
            results.extend(parse_batch_response(&text, chunk));
        }

        Ok(results)
    }
}

fn build_single_prompt(product: &Product) -> String {
    format!(
        r#"You are a FODMAP classification expert. Classify the following product based on FODMAP content.

CRITICAL: Product names are in Serbian/Bosnian/Croatian/Montenegrin language. Translate and understand them first.

Key terms: "hleb/kruh" = bread (HIGH if wheat), "mleko/mlijeko" = milk (HIGH, lactose), "jogurt" = yogurt (HIGH), "jabuka" = apple (HIGH, fructose), "kruška" = pear (HIGH), "luk" = onion (HIGH), "beli luk" = garlic (HIGH), "pasulj" = beans (HIGH), "sočivo" = lentils (HIGH), "pšenica" = wheat (HIGH), "pirinač/riža" = rice (LOW), "krompir" = potato (LOW), "bezglutenski" = gluten-free (usually LOW), "kokos" = coconut (LOW), "instant kafa" = instant coffee (LOW).

Product Name: {name}
Category: {category}

Steps: translate the name, decide food vs non-food, then classify.

Classification rules:
- low: safe for IBS in normal portions (rice, potatoes, meat, fish, eggs, most vegetables, lactose-free dairy)
- moderate: tolerable in small portions only
- high: significant FODMAPs (wheat products, onion, garlic, beans, milk/dairy, apples, pears)
- na: non-food items (cosmetics, cleaning products, toiletries, household items)
- unknown: food whose FODMAP level cannot be determined with confidence

Respond with ONLY a JSON object, no other text:
{{"status": "low|moderate|high|na|unknown", "is_food": true|false, "explanation": "one short sentence"}}"#,
        name = product.name,
        category = product.category,
    )
}

fn build_batch_prompt(products: &[Product]) -> String {
    let mut product_list = String::new();
    for (index, product) in products.iter().enumerate() {
        product_list.push_str(&format!(
            "{}. Name: {}\n   Category: {}\n\n",
            index + 1,
            product.name,
            product.category
        ));
    }

    format!(
        r#"You are a FODMAP classification expert. Classify each product based on FODMAP content.

CONTEXT: These are grocery products sold in Serbia. Names are in Serbian/Bosnian/Croatian/Montenegrin. Use the category field to understand the product type.

Key Serbian food terms: "čips" = chips, "keks" = biscuit, "bezglutenski/gluten free" = gluten-free (usually low), "pšenica" = wheat (high), "ječam" = barley (high), "mleko" = milk (high), "jogurt" = yogurt (high), "luk" = onion (high), "beli luk" = garlic (high), "pasulj" = beans (high), "sočivo" = lentils (high), "pirinač/riža" = rice (low), "krompir" = potato (low), "meso" = meat (low), "riba" = fish (low).

Products to classify:
{product_list}
Classification rules:
- low: safe for IBS (rice, potatoes, meat, fish, eggs, most vegetables, gluten-free products)
- moderate: tolerable in small portions only
- high: significant FODMAPs (wheat/grain products, milk/dairy, onion, garlic, beans/legumes, apples, pears)
- na: non-food items (cosmetics, cleaning products, toiletries, household items)
- unknown: food but ingredients unclear

Respond with ONLY a JSON array, one object per product, using the product numbers above:
[{{"index": 1, "status": "low", "is_food": true, "explanation": "one short sentence"}}]

Be decisive based on category context and main ingredients."#,
    )
}

/// Remove a markdown code fence wrapper, if present.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the optional language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Parse a single-product response: JSON object first, then a bare
/// status-token heuristic, then UNKNOWN.
fn parse_single_response(text: &str) -> Classification {
    let body = strip_code_fences(text);

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(raw_status) = value.get("status").and_then(|s| s.as_str()) {
            return Classification {
                status: normalize_status(raw_status),
                is_food: value.get("is_food").and_then(|b| b.as_bool()),
                explanation: value
                    .get("explanation")
                    .and_then(|e| e.as_str())
                    .map(|e| e.to_string()),
            };
        }
    }

    let status = normalize_status(body);
    if status != FodmapStatus::Unknown {
        return Classification::from_status(status);
    }

    Classification {
        status: FodmapStatus::Unknown,
        is_food: None,
        explanation: None,
    }
}

static BATCH_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+):\s*(\w+)").unwrap());

/// Parse a batch response into a per-identity result map.
///
/// Tries a JSON array of `{index, status, is_food, explanation}` objects,
/// then the legacy `N: status` line format. Every input product appears in
/// the output exactly once: indices the response skipped are filled with
/// UNKNOWN and logged.
fn parse_batch_response(text: &str, products: &[Product]) -> HashMap<String, Classification> {
    let body = strip_code_fences(text);
    let mut by_index: HashMap<usize, Classification> = HashMap::new();

    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(body) {
        for item in items {
            let Some(index) = item.get("index").and_then(|i| i.as_u64()) else {
                continue;
            };
            let index = index as usize;
            if index == 0 || index > products.len() {
                continue;
            }
            let raw_status = item.get("status").and_then(|s| s.as_str()).unwrap_or("");
            by_index.insert(
                index - 1,
                Classification {
                    status: normalize_status(raw_status),
                    is_food: item.get("is_food").and_then(|b| b.as_bool()),
                    explanation: item
                        .get("explanation")
                        .and_then(|e| e.as_str())
                        .map(|e| e.to_string()),
                },
            );
        }
    }

    if by_index.is_empty() {
        // Legacy "N: status" line format.
        for line in body.lines() {
            if let Some(caps) = BATCH_LINE_RE.captures(line.trim()) {
                let index: usize = caps[1].parse().unwrap_or(0);
                if index == 0 || index > products.len() {
                    continue;
                }
                by_index.insert(
                    index - 1,
                    Classification::from_status(normalize_status(&caps[2])),
                );
            }
        }
    }

    let mut results = HashMap::with_capacity(products.len());
    for (i, product) in products.iter().enumerate() {
        let classification = match by_index.remove(&i) {
            Some(c) => c,
            None => {
                warn!(
                    "Missing classification for product index {} ('{}') in batch response",
                    i + 1,
                    product.name
                );
                Classification::unknown("no classification returned in batch response")
            }
        };
        results.insert(product.identity_hash.clone(), classification);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str) -> Product {
        Product {
            id: 0,
            identity_hash: fodmap_core::product_identity_hash(name),
            name: name.to_string(),
            category: "Test".to_string(),
            is_food: None,
            status: FodmapStatus::Pending,
            explanation: None,
            created_at: 0,
            updated_at: 0,
            processed_at: None,
        }
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  ```json\n[1, 2]\n```  "), "[1, 2]");
    }

    #[test]
    fn test_parse_single_json() {
        let result = parse_single_response(
            r#"{"status": "high", "is_food": true, "explanation": "wheat bread"}"#,
        );
        assert_eq!(result.status, FodmapStatus::High);
        assert_eq!(result.is_food, Some(true));
        assert_eq!(result.explanation.as_deref(), Some("wheat bread"));
    }

    #[test]
    fn test_parse_single_fenced_json() {
        let result = parse_single_response(
            "```json\n{\"status\": \"na\", \"is_food\": false, \"explanation\": \"detergent\"}\n```",
        );
        assert_eq!(result.status, FodmapStatus::Na);
        assert_eq!(result.is_food, Some(false));
    }

    #[test]
    fn test_parse_single_bare_token() {
        let result = parse_single_response("low");
        assert_eq!(result.status, FodmapStatus::Low);
        assert_eq!(result.is_food, Some(true));
    }

    #[test]
    fn test_parse_single_verbose_token() {
        let result = parse_single_response("The product is LOW fodmap.");
        assert_eq!(result.status, FodmapStatus::Low);
    }

    #[test]
    fn test_parse_single_garbage_is_unknown() {
        let result = parse_single_response("I cannot classify this product.");
        assert_eq!(result.status, FodmapStatus::Unknown);
        assert_eq!(result.is_food, None);
    }

    #[test]
    fn test_parse_batch_json_array() {
        let products = vec![product("Hleb"), product("Banana")];
        let response = r#"[
            {"index": 1, "status": "high", "is_food": true, "explanation": "wheat"},
            {"index": 2, "status": "low", "is_food": true, "explanation": "banana"}
        ]"#;
        let results = parse_batch_response(response, &products);
        assert_eq!(results.len(), 2);
        assert_eq!(results[&products[0].identity_hash].status, FodmapStatus::High);
        assert_eq!(results[&products[1].identity_hash].status, FodmapStatus::Low);
    }

    #[test]
    fn test_parse_batch_legacy_lines() {
        let products = vec![product("Hleb"), product("Sapun"), product("Banana")];
        let response = "1: high\n2: na\n3: low";
        let results = parse_batch_response(response, &products);
        assert_eq!(results.len(), 3);
        assert_eq!(results[&products[0].identity_hash].status, FodmapStatus::High);
        assert_eq!(results[&products[1].identity_hash].status, FodmapStatus::Na);
        assert_eq!(results[&products[1].identity_hash].is_food, Some(false));
        assert_eq!(results[&products[2].identity_hash].status, FodmapStatus::Low);
    }

    #[test]
    fn test_parse_batch_missing_index_filled_unknown() {
        let products = vec![product("A"), product("B"), product("C")];
        let response = "1: low\n3: high";
        let results = parse_batch_response(response, &products);
        assert_eq!(results.len(), 3);
        assert_eq!(results[&products[0].identity_hash].status, FodmapStatus::Low);
        assert_eq!(
            results[&products[1].identity_hash].status,
            FodmapStatus::Unknown
        );
        assert!(results[&products[1].identity_hash]
            .explanation
            .as_deref()
            .unwrap()
            .contains("no classification"));
        assert_eq!(results[&products[2].identity_hash].status, FodmapStatus::High);
    }

    #[test]
    fn test_parse_batch_unparseable_fills_all_unknown() {
        let products = vec![product("A"), product("B")];
        let results = parse_batch_response("sorry, I can't help with that", &products);
        assert_eq!(results.len(), 2);
        for p in &products {
            assert_eq!(results[&p.identity_hash].status, FodmapStatus::Unknown);
        }
    }

    #[test]
    fn test_parse_batch_out_of_range_index_ignored() {
        let products = vec![product("A")];
        let response = r#"[{"index": 1, "status": "low"}, {"index": 9, "status": "high"}]"#;
        let results = parse_batch_response(response, &products);
        assert_eq!(results.len(), 1);
        assert_eq!(results[&products[0].identity_hash].status, FodmapStatus::Low);
    }

    #[tokio::test]
    async fn test_missing_api_key_degrades_to_unknown() {
        let config = ClassifierConfig {
            api_key: None,
            ..ClassifierConfig::default()
        };
        let limiter = Arc::new(RateLimiter::new(15, Duration::from_secs(60)));
        let classifier = GeminiClassifier::new(&config, limiter);

        let single = classifier.classify(&product("Banana")).await;
        assert_eq!(single.status, FodmapStatus::Unknown);
        assert!(single.explanation.unwrap().contains("not configured"));

        let products = vec![product("A"), product("B")];
        let results = classifier.classify_batch(&products).await.unwrap();
        assert_eq!(results.len(), 2);
        for p in &products {
            assert_eq!(results[&p.identity_hash].status, FodmapStatus::Unknown);
        }
    }

    #[tokio::test]
    async fn test_rate_limited_single_falls_back_to_unknown() {
        let config = ClassifierConfig {
            api_key: Some("test-key".to_string()),
            ..ClassifierConfig::default()
        };
        // Zero budget: every acquire is rejected before any network call.
        let limiter = Arc::new(RateLimiter::new(0, Duration::from_secs(60)));
        let classifier = GeminiClassifier::new(&config, limiter);

        let result = classifier.classify(&product("Banana")).await;
        assert_eq!(result.status, FodmapStatus::Unknown);
        assert!(result.explanation.unwrap().contains("rate limit"));
    }

    #[tokio::test]
    async fn test_rate_limited_batch_covers_every_input() {
        let config = ClassifierConfig {
            api_key: Some("test-key".to_string()),
            ..ClassifierConfig::default()
        };
        let limiter = Arc::new(RateLimiter::new(0, Duration::from_secs(60)));
        let classifier = GeminiClassifier::new(&config, limiter);

        let products = vec![product("A"), product("B"), product("C")];
        let results = classifier.classify_batch(&products).await.unwrap();
        assert_eq!(results.len(), 3);
        for p in &products {
            assert_eq!(results[&p.identity_hash].status, FodmapStatus::Unknown);
        }
    }
}
