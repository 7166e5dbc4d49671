//! Convenience re-exports for common `visage-rs` types.
//!
//! Meant to be glob-imported when building callers:
//!
//! ```ignore
//! use visage_rs::prelude::*;
//! ```
//!
//! This pulls in the types needed for the vast majority of callers: the
//! engine + request/output types, the engine config, the KB cache, and the
//! shared input types. Specialized types (the condition DSL, resolver
//! internals, retry config) are intentionally excluded — import those from
//! their modules directly when needed.

// ── Engine ──────────────────────────────────────────────────────────
pub use crate::engine::{PersonalizationEngine, PersonalizationOutput, PersonalizeRequest};

// ── Configuration and content ───────────────────────────────────────
pub use crate::config::{ActivitySlots, EngineConfig};
pub use crate::kb::{KbCache, TechniqueCard, TechniqueKb};

// ── Inputs and outputs ──────────────────────────────────────────────
pub use crate::inputs::{
    Confidence, FaceProfile, ImpactArea, LocaleSignals, LookSpec, Market, PreferenceMode,
    SimilarityReport,
};
pub use crate::rephrase::Adjustment;
pub use crate::rules::{RenderedSkeleton, SkeletonDraft};

// ── LLM client ──────────────────────────────────────────────────────
pub use crate::llm::LlmClient;

pub use crate::json_schema_for;
