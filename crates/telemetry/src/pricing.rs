//! Built-in pricing table for the models calsync uses.
//!
//! Prices are in USD per 1 million tokens. Each model has an input and
//! output price. Custom pricing can be added at runtime via TOML config.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let mut prices = HashMap::new();

        // ── Anthropic ──────────────────────────────────────────────
        prices.insert("claude-sonnet-4-6".into(), ModelPricing::new(3.0, 15.0));
        prices.insert("claude-sonnet-4-5".into(), ModelPricing::new(3.0, 15.0));
        prices.insert("claude-sonnet-4".into(), ModelPricing::new(3.0, 15.0));
        prices.insert("claude-opus-4-1".into(), ModelPricing::new(15.0, 75.0));
        prices.insert("claude-opus-4".into(), ModelPricing::new(15.0, 75.0));
        prices.insert("claude-haiku-4-5".into(), ModelPricing::new(1.0, 5.0));
        prices.insert("claude-3-5-haiku".into(), ModelPricing::new(0.8, 4.0));
        prices.insert("claude-3-haiku".into(), ModelPricing::new(0.25, 1.25));

        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Built-in prices layered under the given overrides.
    pub fn with_overrides<I, S>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (S, ModelPricing)>,
        S: Into<String>,
    {
        let table = Self::with_defaults();
        for (model, pricing) in overrides {
            table.set(model, pricing);
        }
        table
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ModelPricing>> {
        self.prices.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ModelPricing>> {
        self.prices.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up pricing for a model. Returns None if not found.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        self.read().get(model).copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        self.write().insert(model.into(), pricing);
    }

    /// Resolve pricing for a model name as reported by the API.
    ///
    /// Tries an exact match first, then strips a provider prefix
    /// (`anthropic/claude-sonnet-4-5` → `claude-sonnet-4-5`), then picks
    /// the longest known name that prefixes the model
    /// (`claude-sonnet-4-5-20250929` matches `claude-sonnet-4-5`).
    pub fn resolve(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.read();

        if let Some(p) = prices.get(model) {
            return Some(*p);
        }

        let bare_model = model.rsplit('/').next().unwrap_or(model).to_lowercase();
        if let Some(p) = prices.get(bare_model.as_str()) {
            return Some(*p);
        }

        prices
            .iter()
            .filter(|(key, _)| bare_model.starts_with(&key.to_lowercase()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, p)| *p)
    }

    /// Compute cost for a model call, returning 0.0 if the model is unknown.
    pub fn compute_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        match self.resolve(model) {
            Some(p) => p.cost(input_tokens, output_tokens),
            None => {
                tracing::warn!(model, "No pricing known for model, counting cost as 0");
                0.0
            }
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_pipeline_models() {
        let table = PricingTable::with_defaults();
        assert!(table.get("claude-sonnet-4-5").is_some());
        assert!(table.get("claude-sonnet-4-6").is_some());
    }

    #[test]
    fn known_model_cost() {
        let table = PricingTable::with_defaults();
        // $3/M input, $15/M output: (1000 * 3 + 500 * 15) / 1M = 0.0105
        let cost = table.compute_cost("claude-sonnet-4-5", 1000, 500);
        assert!((cost - 0.0105).abs() < 1e-10);
    }

    #[test]
    fn dated_model_ids_match_by_prefix() {
        let table = PricingTable::with_defaults();
        let p = table.resolve("claude-sonnet-4-5-20250929").unwrap();
        assert!((p.input_per_m - 3.0).abs() < 1e-10);
        // Longest prefix wins: opus-4-1 over opus-4
        table.set("claude-opus-4-1", ModelPricing::new(20.0, 80.0));
        let p = table.resolve("claude-opus-4-1-20250805").unwrap();
        assert!((p.input_per_m - 20.0).abs() < 1e-10);
    }

    #[test]
    fn provider_prefix_is_stripped() {
        let table = PricingTable::with_defaults();
        assert!(table.resolve("anthropic/claude-sonnet-4-5").is_some());
    }

    #[test]
    fn unknown_model_returns_zero() {
        let table = PricingTable::with_defaults();
        assert_eq!(table.compute_cost("gpt-4o", 1000, 500), 0.0);
    }

    #[test]
    fn overrides_replace_defaults() {
        let table = PricingTable::with_overrides([("claude-sonnet-4-5", ModelPricing::new(1.0, 2.0))]);
        let cost = table.compute_cost("claude-sonnet-4-5", 1_000_000, 1_000_000);
        assert!((cost - 3.0).abs() < 1e-10);
        // Other defaults survive
        assert!(table.get("claude-sonnet-4-6").is_some());
    }

    #[test]
    fn empty_table() {
        let table = PricingTable::empty();
        assert!(table.is_empty());
        table.set("custom", ModelPricing::new(1.0, 1.0));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("custom"), Some(ModelPricing::new(1.0, 1.0)));
    }
}
