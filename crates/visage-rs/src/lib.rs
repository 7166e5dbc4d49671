//! Personalization engine for replicating a reference makeup look.
//!
//! `visage-rs` takes a structured description of a reference look, the
//! user's face profile, and a similarity report, and produces per-region
//! adjustment advice: what to change, the concrete steps, and why. The
//! core abstraction is the [`PersonalizationEngine`](engine::PersonalizationEngine) —
//! a deterministic pipeline of declarative rules, a bilingual technique
//! knowledge base, and a skeleton renderer, with an optional LLM pass that
//! may restyle the final wording but can never add facts.
//!
//! # Getting started
//!
//! ```ignore
//! use visage_rs::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let engine = PersonalizationEngine::new(
//!         Arc::new(KbCache::new()),
//!         EngineConfig::from_env(),
//!     )
//!     .with_env_client();
//!
//!     let request = PersonalizeRequest {
//!         market: Market::Us,
//!         signals: LocaleSignals::from_locale("en-US"),
//!         look_spec: serde_json::from_str(look_json)?,
//!         ..Default::default()
//!     };
//!
//!     let output = engine.personalize(&request).await?;
//!     for adjustment in &output.adjustments {
//!         println!("[{}] {}", adjustment.area, adjustment.title);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Request/response types:** [`inputs`] for the look spec, face
//!   profiles, similarity report, and locale signals;
//!   [`rephrase::Adjustment`] for the output unit.
//! - **The rule table:** [`rules::table`] holds the canonical-region rules,
//!   [`rules::extended`] the config-gated extended regions. Selection and
//!   tie-breaking live in [`rules`].
//! - **Content:** [`kb`] loads and indexes technique cards;
//!   [`kb::resolver`] handles bilingual id addressing; [`kb::selector`]
//!   scores `choose_one` candidate sets. Authored triggers use the
//!   condition DSL in [`conditions`].
//! - **Rendering:** [`render`] expands technique references into step text
//!   with warnings and fallbacks.
//! - **The trust boundary:** [`rephrase`] runs the LLM pass;
//!   [`rephrase::validate`] enforces that the model only restyled text.
//!
//! # Design principles
//!
//! 1. **Deterministic first.** Every request has a complete deterministic
//!    answer before any model is consulted. The LLM is a copy editor, not
//!    an author.
//! 2. **Fail soft on content, fast on configuration.** Missing or
//!    mismatched cards produce warnings and fallbacks at request time;
//!    malformed content fails at load time.
//! 3. **Explicit configuration.** Behavior flags travel in an
//!    [`EngineConfig`](config::EngineConfig) value, and loaded content in a
//!    passed-in [`KbCache`](kb::KbCache) — nothing reads globals mid-request.

pub mod conditions;
pub mod config;
pub mod engine;
pub mod inputs;
pub mod kb;
pub mod llm;
pub mod prelude;
pub mod render;
pub mod rephrase;
pub mod rules;

use schemars::JsonSchema;

// Re-export schemars for downstream crates.
pub use schemars;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. Used to validate LLM output against the
/// [`Adjustment`](rephrase::Adjustment) wire shape.
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rephrase::Adjustment;

    #[test]
    fn adjustment_schema_is_generable() {
        let schema = json_schema_for::<Vec<Adjustment>>();
        assert!(schema.is_object());
    }
}
