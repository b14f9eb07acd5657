//! Token usage and cost accounting

use super::model::Model;
use serde::{Deserialize, Serialize};

/// Dollar cost of a request, split by token class
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cost {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
    pub total: f64,
}

/// Token counts for a request
///
/// `input` never includes cache-read tokens. Adapters whose vendor reports
/// cached tokens inline subtract them before storing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    pub total_tokens: u64,
    pub cost: Cost,
}

impl Usage {
    /// Build usage from a vendor that folds cached tokens into the prompt count
    pub fn from_inclusive_prompt(prompt_tokens: u64, cached_tokens: u64, output: u64) -> Self {
        let cache_read = cached_tokens.min(prompt_tokens);
        let mut usage = Self {
            input: prompt_tokens - cache_read,
            output,
            cache_read,
            ..Self::default()
        };
        usage.total_tokens = usage.computed_total();
        usage
    }

    /// input + output + cache_read + cache_write
    pub fn computed_total(&self) -> u64 {
        self.input + self.output + self.cache_read + self.cache_write
    }

    /// Recompute the total when the vendor gave none
    pub fn fill_total(&mut self) {
        if self.total_tokens == 0 {
            self.total_tokens = self.computed_total();
        }
    }

    /// Whether any token was counted
    pub fn is_empty(&self) -> bool {
        self.computed_total() == 0
    }
}

/// Derive `usage.cost` from token counts and the model's price table
///
/// Pure and idempotent: running it twice yields the same cost.
pub fn calculate_cost(model: &Model, usage: &mut Usage) -> Cost {
    let per_token = |tokens: u64, price: f64| tokens as f64 * price / 1_000_000.0;
    let input = per_token(usage.input, model.cost.input);
    let output = per_token(usage.output, model.cost.output);
    let cache_read = per_token(usage.cache_read, model.cost.cache_read);
    let cache_write = per_token(usage.cache_write, model.cost.cache_write);
    usage.cost = Cost {
        input,
        output,
        cache_read,
        cache_write,
        total: input + output + cache_read + cache_write,
    };
    usage.cost
}
