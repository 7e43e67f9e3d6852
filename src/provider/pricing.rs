//! Model Pricing
//!
//! Maps model identifiers to token prices (USD per 1k tokens).
//!
//! # Example YAML Format
//!
//! ```yaml
//! gpt-4o:
//!   input_per_1k: 0.0025
//!   output_per_1k: 0.01
//! gpt-4o-mini:
//!   input_per_1k: 0.00015
//!   output_per_1k: 0.0006
//! ```

use std::collections::HashMap;
use std::error::Error;
use std::fs;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::TokenUsage;

/// Price of one model, in USD per 1k tokens.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelPricing {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Cost of a completion with the given usage.
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.input as f64 / 1000.0) * self.input_per_1k
            + (usage.output as f64 / 1000.0) * self.output_per_1k
    }
}

/// Pricing for every known model. Unknown models cost nothing.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a pricing table from a YAML file.
    pub fn load(path: &str) -> Result<Self, Box<dyn Error>> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read pricing file '{}': {}", path, e))?;
        let table: PricingTable = serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse pricing file '{}': {}", path, e))?;

        info!("Loaded pricing for {} models", table.models.len());
        Ok(table)
    }

    pub fn set(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.models.insert(model.into(), pricing);
    }

    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        self.models.get(model)
    }

    /// Cost of `usage` on `model`, zero when the model is unpriced.
    pub fn cost(&self, model: &str, usage: &TokenUsage) -> f64 {
        match self.models.get(model) {
            Some(pricing) => pricing.cost(usage),
            None => {
                debug!("No pricing for model '{}', cost recorded as 0", model);
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_model_cost() {
        let pricing = ModelPricing::new(1.0, 2.0);
        let cost = pricing.cost(&TokenUsage::new(500, 250));
        assert!((cost - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_is_free() {
        let table = PricingTable::new();
        assert_eq!(table.cost("mystery", &TokenUsage::new(1000, 1000)), 0.0);
    }

    #[test]
    fn test_table_lookup() {
        let mut table = PricingTable::new();
        table.set("gpt-4o", ModelPricing::new(0.0025, 0.01));

        assert!(table.get("gpt-4o").is_some());
        let cost = table.cost("gpt-4o", &TokenUsage::new(1000, 1000));
        assert!((cost - 0.0125).abs() < 1e-9);
    }

    #[test]
    fn test_load_from_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gpt-4o-mini:\n  input_per_1k: 0.00015\n  output_per_1k: 0.0006").unwrap();

        let table = PricingTable::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(
            table.get("gpt-4o-mini"),
            Some(&ModelPricing::new(0.00015, 0.0006))
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = PricingTable::load("/nonexistent/pricing.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read pricing file"));
    }
}
