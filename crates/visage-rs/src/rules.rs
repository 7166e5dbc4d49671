//! Declarative adjustment rules and per-region selection.
//!
//! Rules are flat `(predicate, builder)` records — see [`table`] for the
//! rule list and [`extended`] for the optional extended-region skeletons.
//! Running the table is a pure function over the request: for each region,
//! matching rules compete and exactly one [`SkeletonDraft`] wins, with the
//! region's always-true fallback rule guaranteeing an output even when
//! nothing matches.
//!
//! Tie-breaking is part of the contract: `ease` prefers the lowest declared
//! difficulty, every other mode prefers the highest built severity, and
//! both break ties by ascending rule id.

pub mod extended;
pub mod table;

use crate::config::EngineConfig;
use crate::inputs::{
    Confidence, FaceProfile, ImpactArea, LookSpec, Market, PreferenceMode, SimilarityReport,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

// ── Skeleton types ────────────────────────────────────────────────

/// How a skeleton's technique ids are consumed: `sequence` fans out to
/// every id, `choose_one` selects exactly one.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DoActionSelection {
    #[default]
    Sequence,
    ChooseOne,
}

/// Reference to a resolved technique card, kept for downstream telemetry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TechniqueRef {
    pub id: String,
    pub area: ImpactArea,
}

/// The rule engine's structured output for one face region, before
/// technique references are expanded into step text. This is the sole
/// source of truth for facts and actions downstream.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SkeletonDraft {
    pub market: Market,
    pub impact_area: ImpactArea,
    pub rule_id: String,
    /// How much this region differs from the reference, in `[0, 1]`.
    pub severity: f64,
    pub confidence: Confidence,
    pub because_facts: Vec<String>,
    #[serde(default)]
    pub do_action_selection: DoActionSelection,
    pub do_action_ids: Vec<String>,
    pub why_mechanism: Vec<String>,
    pub evidence_keys: Vec<String>,
    #[serde(default)]
    pub safety_notes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A skeleton with its technique references resolved into concrete step
/// text. Produced only by the renderer's pure transform over a draft.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RenderedSkeleton {
    pub market: Market,
    pub impact_area: ImpactArea,
    pub rule_id: String,
    pub severity: f64,
    pub confidence: Confidence,
    pub because_facts: Vec<String>,
    pub do_action_selection: DoActionSelection,
    pub do_action_ids: Vec<String>,
    pub do_actions: Vec<String>,
    pub why_mechanism: Vec<String>,
    pub evidence_keys: Vec<String>,
    #[serde(default)]
    pub technique_refs: Vec<TechniqueRef>,
    #[serde(default)]
    pub safety_notes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ── Rule records ──────────────────────────────────────────────────

/// Inputs a rule's predicate and builder read. Pure data — rules never see
/// configuration or the KB.
#[derive(Clone, Copy, Debug)]
pub struct RuleContext<'a> {
    pub market: Market,
    pub look_spec: &'a LookSpec,
    pub user_face: Option<&'a FaceProfile>,
    pub ref_face: Option<&'a FaceProfile>,
    pub similarity: Option<&'a SimilarityReport>,
    pub preference_mode: PreferenceMode,
}

/// One declarative rule: a predicate over the context and a skeleton
/// builder. `difficulty` (0 = easiest) is the `ease`-mode sort key.
pub struct AdjustmentRule {
    pub rule_id: &'static str,
    pub impact_area: ImpactArea,
    pub difficulty: f64,
    pub matches: fn(&RuleContext) -> bool,
    pub build: fn(&RuleContext) -> SkeletonDraft,
}

// ── Shared rule helpers ───────────────────────────────────────────

/// Clamp to `[0, 1]`; non-finite inputs clamp to 0.
pub fn clamp01(n: f64) -> f64 {
    if !n.is_finite() { 0.0 } else { n.clamp(0.0, 1.0) }
}

/// Case-insensitive "contains any of these needles".
pub fn includes_any(haystack: &str, needles: &[&str]) -> bool {
    let s = haystack.to_lowercase();
    needles.iter().any(|n| s.contains(&n.to_lowercase()))
}

/// Baseline confidence for a skeleton: low whenever either face profile is
/// missing or the user profile is invalid or below the quality floor.
pub fn base_confidence(ctx: &RuleContext) -> Confidence {
    match (ctx.user_face, ctx.ref_face) {
        (Some(user), Some(_)) if user.is_reliable() => Confidence::Medium,
        _ => Confidence::Low,
    }
}

// ── Region selection ──────────────────────────────────────────────

/// Run the rule table for one region and return the winning skeleton.
pub fn select_for_region(ctx: &RuleContext, area: ImpactArea) -> SkeletonDraft {
    let matched: Vec<&AdjustmentRule> = table::rules()
        .iter()
        .filter(|r| r.impact_area == area && (r.matches)(ctx))
        .collect();

    let fallback = table::fallback_rule(area);
    let winner = match matched.len() {
        0 => {
            debug!("no {area} rule matched, using fallback {}", fallback.rule_id);
            return (fallback.build)(ctx);
        }
        1 => return (matched[0].build)(ctx),
        _ if ctx.preference_mode == PreferenceMode::Ease => {
            let mut sorted = matched;
            sorted.sort_by(|a, b| {
                a.difficulty
                    .partial_cmp(&b.difficulty)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.rule_id.cmp(b.rule_id))
            });
            sorted.first().map(|r| (r.build)(ctx))
        }
        _ => {
            let mut built: Vec<SkeletonDraft> = matched.iter().map(|r| (r.build)(ctx)).collect();
            built.sort_by(|a, b| {
                b.severity
                    .partial_cmp(&a.severity)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.rule_id.cmp(&b.rule_id))
            });
            built.into_iter().next()
        }
    };

    winner.unwrap_or_else(|| (fallback.build)(ctx))
}

/// Run the full table: one skeleton per canonical region, in canonical
/// order, plus any configured extended-region skeletons.
pub fn select_skeletons(ctx: &RuleContext, config: &EngineConfig) -> Vec<SkeletonDraft> {
    let mut out: Vec<SkeletonDraft> = ImpactArea::CANONICAL
        .iter()
        .map(|&area| select_for_region(ctx, area))
        .collect();

    if config.extended_regions {
        out.extend(extended::extended_skeletons(ctx, config));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::{FaceGeometry, ProfileQuality};

    fn profile(score: f64, tilt: f64) -> FaceProfile {
        FaceProfile {
            quality: ProfileQuality {
                valid: true,
                score,
            },
            geometry: FaceGeometry {
                eye_tilt_deg: tilt,
                eye_openness_ratio: 0.35,
                lip_fullness_ratio: 0.35,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn ctx<'a>(
        look: &'a LookSpec,
        user: Option<&'a FaceProfile>,
        refp: Option<&'a FaceProfile>,
        mode: PreferenceMode,
    ) -> RuleContext<'a> {
        RuleContext {
            market: Market::Us,
            look_spec: look,
            user_face: user,
            ref_face: refp,
            similarity: None,
            preference_mode: mode,
        }
    }

    #[test]
    fn missing_profile_forces_low_confidence() {
        let look = LookSpec::default();
        let user = profile(90.0, 0.0);
        assert_eq!(
            base_confidence(&ctx(&look, Some(&user), None, PreferenceMode::Structure)),
            Confidence::Low
        );
        let refp = profile(90.0, 0.0);
        assert_eq!(
            base_confidence(&ctx(&look, Some(&user), Some(&refp), PreferenceMode::Structure)),
            Confidence::Medium
        );
        let weak = profile(50.0, 0.0);
        assert_eq!(
            base_confidence(&ctx(&look, Some(&weak), Some(&refp), PreferenceMode::Structure)),
            Confidence::Low
        );
    }

    #[test]
    fn every_region_always_yields_a_skeleton() {
        let look = LookSpec::default();
        let ctx = ctx(&look, None, None, PreferenceMode::Structure);
        for area in ImpactArea::CANONICAL {
            let skeleton = select_for_region(&ctx, area);
            assert_eq!(skeleton.impact_area, area);
            assert!(!skeleton.because_facts.is_empty());
            assert!(!skeleton.why_mechanism.is_empty());
            assert!(!skeleton.evidence_keys.is_empty());
            assert!(!skeleton.do_action_ids.is_empty());
        }
    }

    #[test]
    fn canonical_selection_order_is_base_eye_lip() {
        let look = LookSpec::default();
        let ctx = ctx(&look, None, None, PreferenceMode::Vibe);
        let skeletons = select_skeletons(&ctx, &EngineConfig::default());
        assert_eq!(skeletons.len(), 3);
        let areas: Vec<ImpactArea> = skeletons.iter().map(|s| s.impact_area).collect();
        assert_eq!(areas, ImpactArea::CANONICAL.to_vec());
    }

    #[test]
    fn clamp01_handles_non_finite() {
        assert_eq!(clamp01(f64::NAN), 0.0);
        assert_eq!(clamp01(f64::INFINITY), 0.0);
        assert_eq!(clamp01(-0.5), 0.0);
        assert_eq!(clamp01(1.5), 1.0);
        assert_eq!(clamp01(0.4), 0.4);
    }
}
