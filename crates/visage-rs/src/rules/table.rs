//! The canonical-region rule table.
//!
//! Each rule's predicate reads the look spec, the face profiles, and the
//! similarity report; its builder emits a fully-populated skeleton draft.
//! Severity prefers the similarity report's own top-delta figure and only
//! falls back to a raw geometric difference when the report is silent.

use super::{
    AdjustmentRule, DoActionSelection, RuleContext, SkeletonDraft, base_confidence, clamp01,
    includes_any,
};
use crate::inputs::ImpactArea;

/// Suffix used to look up the eye-tilt delta in the similarity report.
const EYE_TILT_KEY: &str = "geometry.eyeTiltDeg";

/// Eye-tilt severity: the report's figure when present, otherwise the raw
/// tilt difference scaled so 10 degrees saturates.
fn eye_tilt_severity(ctx: &RuleContext) -> Option<f64> {
    if let Some(delta) = ctx.similarity.and_then(|s| s.top_delta_for(EYE_TILT_KEY)) {
        return Some(clamp01(delta.severity));
    }
    let user = ctx.user_face?;
    let reference = ctx.ref_face?;
    let diff = (user.geometry.eye_tilt_deg - reference.geometry.eye_tilt_deg).abs();
    Some(clamp01(diff / 10.0))
}

fn strs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn draft(
    ctx: &RuleContext,
    rule_id: &'static str,
    area: ImpactArea,
    severity: f64,
    because: &[&str],
    action_ids: &[&str],
    why: &[&str],
    evidence: &[&str],
) -> SkeletonDraft {
    SkeletonDraft {
        market: ctx.market,
        impact_area: area,
        rule_id: rule_id.to_string(),
        severity: clamp01(severity),
        confidence: base_confidence(ctx),
        because_facts: strs(because),
        do_action_selection: DoActionSelection::Sequence,
        do_action_ids: strs(action_ids),
        why_mechanism: strs(why),
        evidence_keys: strs(evidence),
        safety_notes: Vec::new(),
        tags: Vec::new(),
    }
}

// ── Eye rules ─────────────────────────────────────────────────────

fn liner_direction_matches(ctx: &RuleContext) -> bool {
    matches!(eye_tilt_severity(ctx), Some(s) if s >= 0.35)
}

fn liner_direction_build(ctx: &RuleContext) -> SkeletonDraft {
    let severity = eye_tilt_severity(ctx).unwrap_or(0.6);
    let because = if ctx
        .user_face
        .zip(ctx.ref_face)
        .is_some_and(|(u, r)| u.geometry.eye_tilt_deg < r.geometry.eye_tilt_deg)
    {
        [
            "Your eye tilt differs from the reference look.",
            "Your outer eye sits lower than the reference.",
        ]
    } else {
        [
            "Your eye tilt differs from the reference look.",
            "Your outer eye sits higher than the reference.",
        ]
    };
    let action_ids: &[&str] = if ctx.preference_mode == crate::inputs::PreferenceMode::Ease {
        &[
            "T_EYE_LINER_OUTER_THIRD_START",
            "T_EYE_LINER_THIN_LINE",
            "T_EYE_WING_SHORTEN",
        ]
    } else {
        &[
            "T_EYE_LINER_OUTER_THIRD_START",
            "T_EYE_WING_ANGLE_MORE_HORIZONTAL",
            "T_EYE_LINER_THIN_LINE",
            "T_EYE_WING_SHORTEN",
        ]
    };
    let mut skeleton = draft(
        ctx,
        "EYE_LINER_DIRECTION_ADAPT",
        ImpactArea::Eye,
        severity,
        &because,
        action_ids,
        &[
            "Starting from the outer third keeps the inner lash line clean.",
            "A flatter wing angle reads closer to the reference tilt.",
        ],
        &[
            "userFaceProfile.geometry.eyeTiltDeg",
            "refFaceProfile.geometry.eyeTiltDeg",
        ],
    );
    if let Some(delta) = ctx.similarity.and_then(|s| s.top_delta_for(EYE_TILT_KEY)) {
        for key in &delta.evidence {
            if !skeleton.evidence_keys.contains(key) {
                skeleton.evidence_keys.push(key.clone());
            }
        }
    }
    skeleton
}

fn wants_liner(ctx: &RuleContext) -> bool {
    let eye = &ctx.look_spec.breakdown.eye;
    includes_any(&eye.intent, &["liner", "wing", "cat"])
        || includes_any(&eye.finish, &["sharp", "defined"])
}

fn tightline_matches(ctx: &RuleContext) -> bool {
    let Some(user) = ctx.user_face else {
        return false;
    };
    let openness = user.geometry.eye_openness_ratio;
    openness > 0.0 && openness <= 0.32 && wants_liner(ctx)
}

fn tightline_build(ctx: &RuleContext) -> SkeletonDraft {
    let openness = ctx
        .user_face
        .map(|u| u.geometry.eye_openness_ratio)
        .unwrap_or(0.32);
    draft(
        ctx,
        "EYE_TIGHTLINE_AND_SMUDGE",
        ImpactArea::Eye,
        clamp01((0.35 - openness) / 0.15),
        &[
            "Your eye shape has limited visible lid space.",
            "Thick liner on the lid can close the eye off.",
        ],
        &[
            "T_EYE_TIGHTLINE_UPPER_LASHLINE",
            "T_EYE_FILL_GAP_LASHLINE",
            "T_EYE_SMUDGE_OUTER_CORNER",
        ],
        &[
            "Tightlining adds definition without using lid space.",
            "A smudged outer corner keeps lift without a hard wing.",
        ],
        &[
            "userFaceProfile.geometry.eyeOpennessRatio",
            "lookSpec.breakdown.eye.intent",
        ],
    )
}

// ── Base rules ────────────────────────────────────────────────────

fn thin_glow_matches(ctx: &RuleContext) -> bool {
    includes_any(
        &ctx.look_spec.breakdown.base.finish,
        &["dewy", "glow", "radiant"],
    )
}

fn thin_glow_build(ctx: &RuleContext) -> SkeletonDraft {
    draft(
        ctx,
        "BASE_THIN_LAYERS_TARGET_GLOW",
        ImpactArea::Base,
        0.6,
        &["The reference base reads dewy and lit from within."],
        &[
            "T_BASE_HYDRATE_PREP",
            "T_BASE_THIN_LAYER",
            "T_BASE_TARGET_GLOW_HIGHLIGHTS",
            "T_BASE_SET_TZONE_LIGHT",
        ],
        &[
            "Thin layers keep glow without heaviness.",
            "Setting only the T-zone preserves the reflective finish.",
        ],
        &["lookSpec.breakdown.base.finish"],
    )
}

fn build_coverage_matches(ctx: &RuleContext) -> bool {
    includes_any(
        &ctx.look_spec.breakdown.base.coverage,
        &["full", "high", "medium-full"],
    )
}

fn build_coverage_build(ctx: &RuleContext) -> SkeletonDraft {
    draft(
        ctx,
        "BASE_BUILD_COVERAGE_SPOT",
        ImpactArea::Base,
        0.7,
        &["The reference coverage is higher than a sheer skin finish."],
        &[
            "T_BASE_SPOT_CONCEAL_ONLY",
            "T_BASE_BUILD_COVERAGE_THIN_PASSES",
            "T_BASE_MIST_MELT",
        ],
        &[
            "Spot-concealing first means less product overall.",
            "Thin passes build coverage without caking.",
        ],
        &["lookSpec.breakdown.base.coverage"],
    )
}

// ── Lip rules ─────────────────────────────────────────────────────

fn gloss_center_matches(ctx: &RuleContext) -> bool {
    let lip = &ctx.look_spec.breakdown.lip;
    if !includes_any(&lip.finish, &["gloss", "glossy", "shine"]) {
        return false;
    }
    match ctx.user_face {
        None => true,
        Some(user) => {
            user.geometry.lip_fullness_ratio <= 0.32
                || user.categorical.lip_type.as_deref() == Some("thin")
        }
    }
}

fn gloss_center_build(ctx: &RuleContext) -> SkeletonDraft {
    let severity = match ctx.user_face {
        Some(user) => clamp01((0.35 - user.geometry.lip_fullness_ratio) / 0.15),
        None => 0.5,
    };
    draft(
        ctx,
        "LIP_GLOSS_CENTER_GRADIENT",
        ImpactArea::Lip,
        severity,
        &["The reference lip is glossy with a fuller center."],
        &[
            "T_LIP_GLOSS_CENTER",
            "T_LIP_SHADE_CLOSE_FAMILY",
            "T_LIP_CENTER_STRONGER",
        ],
        &[
            "Gloss at the center reads fuller without overlining.",
            "Staying in a close shade family keeps the look cohesive.",
        ],
        &[
            "lookSpec.breakdown.lip.finish",
            "userFaceProfile.geometry.lipFullnessRatio",
        ],
    )
}

fn soft_edge_matches(ctx: &RuleContext) -> bool {
    let lip = &ctx.look_spec.breakdown.lip;
    includes_any(&lip.intent, &["soft", "blur", "diffused"])
        || includes_any(&lip.finish, &["satin", "matte"])
}

fn soft_edge_build(ctx: &RuleContext) -> SkeletonDraft {
    draft(
        ctx,
        "LIP_SOFT_EDGE_BLUR",
        ImpactArea::Lip,
        0.45,
        &["The reference lip edge is soft, not sharply lined."],
        &["T_LIP_SOFT_EDGE", "T_LIP_BLUR_EDGE", "T_LIP_MATCH_FINISH"],
        &["A blurred edge is forgiving and matches the reference's diffusion."],
        &[
            "lookSpec.breakdown.lip.intent",
            "lookSpec.breakdown.lip.finish",
        ],
    )
}

// ── Fallback rules ────────────────────────────────────────────────

fn always(_: &RuleContext) -> bool {
    true
}

fn base_fallback_build(ctx: &RuleContext) -> SkeletonDraft {
    draft(
        ctx,
        "BASE_FALLBACK_THIN_LAYER",
        ImpactArea::Base,
        0.2,
        &["No strong base difference stood out."],
        &["T_BASE_THIN_LAYER", "T_BASE_SPOT_CONCEAL_ONLY"],
        &["A thin base layer is the safest match for most references."],
        &["lookSpec.breakdown.base"],
    )
}

fn eye_fallback_build(ctx: &RuleContext) -> SkeletonDraft {
    draft(
        ctx,
        "EYE_FALLBACK_SAFE_CONTROL",
        ImpactArea::Eye,
        0.2,
        &["No strong eye difference stood out."],
        &[
            "T_EYE_LINER_OUTER_THIRD_START",
            "T_EYE_LINER_THIN_LINE",
            "T_EYE_WING_SHORTEN",
        ],
        &["A thin, short line is the safest liner default."],
        &["lookSpec.breakdown.eye"],
    )
}

fn lip_fallback_build(ctx: &RuleContext) -> SkeletonDraft {
    draft(
        ctx,
        "LIP_FALLBACK_FINISH_FOCUS",
        ImpactArea::Lip,
        0.2,
        &["No strong lip difference stood out."],
        &["T_LIP_MATCH_FINISH", "T_LIP_SHADE_CLOSE_FAMILY"],
        &["Matching finish and shade family carries most of the lip look."],
        &["lookSpec.breakdown.lip"],
    )
}

// ── Tables ────────────────────────────────────────────────────────

static RULES: [AdjustmentRule; 6] = [
    AdjustmentRule {
        rule_id: "EYE_LINER_DIRECTION_ADAPT",
        impact_area: ImpactArea::Eye,
        difficulty: 0.4,
        matches: liner_direction_matches,
        build: liner_direction_build,
    },
    AdjustmentRule {
        rule_id: "EYE_TIGHTLINE_AND_SMUDGE",
        impact_area: ImpactArea::Eye,
        difficulty: 0.3,
        matches: tightline_matches,
        build: tightline_build,
    },
    AdjustmentRule {
        rule_id: "BASE_THIN_LAYERS_TARGET_GLOW",
        impact_area: ImpactArea::Base,
        difficulty: 0.2,
        matches: thin_glow_matches,
        build: thin_glow_build,
    },
    AdjustmentRule {
        rule_id: "BASE_BUILD_COVERAGE_SPOT",
        impact_area: ImpactArea::Base,
        difficulty: 0.3,
        matches: build_coverage_matches,
        build: build_coverage_build,
    },
    AdjustmentRule {
        rule_id: "LIP_GLOSS_CENTER_GRADIENT",
        impact_area: ImpactArea::Lip,
        difficulty: 0.2,
        matches: gloss_center_matches,
        build: gloss_center_build,
    },
    AdjustmentRule {
        rule_id: "LIP_SOFT_EDGE_BLUR",
        impact_area: ImpactArea::Lip,
        difficulty: 0.3,
        matches: soft_edge_matches,
        build: soft_edge_build,
    },
];

static BASE_FALLBACK: AdjustmentRule = AdjustmentRule {
    rule_id: "BASE_FALLBACK_THIN_LAYER",
    impact_area: ImpactArea::Base,
    difficulty: 0.1,
    matches: always,
    build: base_fallback_build,
};

static EYE_FALLBACK: AdjustmentRule = AdjustmentRule {
    rule_id: "EYE_FALLBACK_SAFE_CONTROL",
    impact_area: ImpactArea::Eye,
    difficulty: 0.1,
    matches: always,
    build: eye_fallback_build,
};

static LIP_FALLBACK: AdjustmentRule = AdjustmentRule {
    rule_id: "LIP_FALLBACK_FINISH_FOCUS",
    impact_area: ImpactArea::Lip,
    difficulty: 0.1,
    matches: always,
    build: lip_fallback_build,
};

/// The ordered canonical rule table.
pub fn rules() -> &'static [AdjustmentRule] {
    &RULES
}

/// The always-matching fallback rule for a region. Extended regions reuse
/// the base fallback shape but are handled in [`super::extended`].
pub fn fallback_rule(area: ImpactArea) -> &'static AdjustmentRule {
    match area {
        ImpactArea::Eye => &EYE_FALLBACK,
        ImpactArea::Lip => &LIP_FALLBACK,
        _ => &BASE_FALLBACK,
    }
}

/// Human title for a skeleton, keyed by rule id.
pub fn title_for_rule(rule_id: &str, area: ImpactArea) -> String {
    match rule_id {
        "EYE_LINER_DIRECTION_ADAPT" => "Adapt liner direction".to_string(),
        "EYE_TIGHTLINE_AND_SMUDGE" => "Keep liner thin + smudged".to_string(),
        "EYE_FALLBACK_SAFE_CONTROL" => "Control liner safely".to_string(),
        "BASE_THIN_LAYERS_TARGET_GLOW" => "Keep base thin + targeted glow".to_string(),
        "BASE_BUILD_COVERAGE_SPOT" => "Build coverage in thin passes".to_string(),
        "BASE_FALLBACK_THIN_LAYER" => "Keep base thin".to_string(),
        "LIP_GLOSS_CENTER_GRADIENT" => "Add gloss focus at center".to_string(),
        "LIP_SOFT_EDGE_BLUR" => "Soften lip edge".to_string(),
        "LIP_FALLBACK_FINISH_FOCUS" => "Match lip finish".to_string(),
        _ => format!("Adjust {}", area.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::{
        Confidence, FaceGeometry, FaceProfile, LookSpec, Market, PreferenceMode, ProfileQuality,
        SimilarityReport, TopDelta,
    };
    use crate::rules::select_for_region;

    fn profile(tilt: f64, openness: f64, lip: f64) -> FaceProfile {
        FaceProfile {
            quality: ProfileQuality {
                valid: true,
                score: 85.0,
            },
            geometry: FaceGeometry {
                eye_tilt_deg: tilt,
                eye_openness_ratio: openness,
                lip_fullness_ratio: lip,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn ctx<'a>(
        look: &'a LookSpec,
        user: Option<&'a FaceProfile>,
        refp: Option<&'a FaceProfile>,
        sim: Option<&'a SimilarityReport>,
        mode: PreferenceMode,
    ) -> RuleContext<'a> {
        RuleContext {
            market: Market::Us,
            look_spec: look,
            user_face: user,
            ref_face: refp,
            similarity: sim,
            preference_mode: mode,
        }
    }

    #[test]
    fn dewy_finish_selects_thin_glow_rule() {
        let mut look = LookSpec::default();
        look.breakdown.base.finish = "dewy glow".to_string();
        let c = ctx(&look, None, None, None, PreferenceMode::Structure);
        let skeleton = select_for_region(&c, ImpactArea::Base);
        assert_eq!(skeleton.rule_id, "BASE_THIN_LAYERS_TARGET_GLOW");
        assert_eq!(skeleton.confidence, Confidence::Low);
    }

    #[test]
    fn coverage_outranks_glow_on_severity() {
        let mut look = LookSpec::default();
        look.breakdown.base.finish = "dewy".to_string();
        look.breakdown.base.coverage = "full".to_string();
        let c = ctx(&look, None, None, None, PreferenceMode::Structure);
        let skeleton = select_for_region(&c, ImpactArea::Base);
        // severity 0.7 beats 0.6
        assert_eq!(skeleton.rule_id, "BASE_BUILD_COVERAGE_SPOT");
    }

    #[test]
    fn ease_mode_prefers_lower_difficulty() {
        let mut look = LookSpec::default();
        look.breakdown.base.finish = "dewy".to_string();
        look.breakdown.base.coverage = "full".to_string();
        let c = ctx(&look, None, None, None, PreferenceMode::Ease);
        let skeleton = select_for_region(&c, ImpactArea::Base);
        // difficulty 0.2 beats 0.3 regardless of severity
        assert_eq!(skeleton.rule_id, "BASE_THIN_LAYERS_TARGET_GLOW");
    }

    #[test]
    fn tilt_severity_prefers_similarity_report() {
        let look = LookSpec::default();
        let user = profile(2.0, 0.4, 0.4);
        let refp = profile(3.0, 0.4, 0.4);
        // raw diff is 1 degree (severity 0.1), but the report says 0.8
        let sim = SimilarityReport {
            top_deltas: vec![TopDelta {
                key: "user.geometry.eyeTiltDeg".to_string(),
                severity: 0.8,
                explanation_key: "eyeTilt".to_string(),
                evidence: vec!["similarity.topDeltas[0]".to_string()],
            }],
            ..Default::default()
        };
        let c = ctx(
            &look,
            Some(&user),
            Some(&refp),
            Some(&sim),
            PreferenceMode::Structure,
        );
        let skeleton = select_for_region(&c, ImpactArea::Eye);
        assert_eq!(skeleton.rule_id, "EYE_LINER_DIRECTION_ADAPT");
        assert!((skeleton.severity - 0.8).abs() < 1e-9);
        assert!(
            skeleton
                .evidence_keys
                .contains(&"similarity.topDeltas[0]".to_string())
        );
    }

    #[test]
    fn ease_mode_drops_wing_angle_action() {
        let look = LookSpec::default();
        let user = profile(-4.0, 0.4, 0.4);
        let refp = profile(6.0, 0.4, 0.4);
        let structure = ctx(
            &look,
            Some(&user),
            Some(&refp),
            None,
            PreferenceMode::Structure,
        );
        let ease = ctx(&look, Some(&user), Some(&refp), None, PreferenceMode::Ease);
        let with_angle = select_for_region(&structure, ImpactArea::Eye);
        let without_angle = select_for_region(&ease, ImpactArea::Eye);
        assert!(
            with_angle
                .do_action_ids
                .contains(&"T_EYE_WING_ANGLE_MORE_HORIZONTAL".to_string())
        );
        assert!(
            !without_angle
                .do_action_ids
                .contains(&"T_EYE_WING_ANGLE_MORE_HORIZONTAL".to_string())
        );
    }

    #[test]
    fn tightline_requires_liner_intent() {
        let mut look = LookSpec::default();
        look.breakdown.eye.intent = "soft wash of color".to_string();
        let user = profile(0.0, 0.28, 0.4);
        let c = ctx(&look, Some(&user), None, None, PreferenceMode::Structure);
        let skeleton = select_for_region(&c, ImpactArea::Eye);
        assert_eq!(skeleton.rule_id, "EYE_FALLBACK_SAFE_CONTROL");

        look.breakdown.eye.intent = "winged liner".to_string();
        let c = ctx(&look, Some(&user), None, None, PreferenceMode::Structure);
        let skeleton = select_for_region(&c, ImpactArea::Eye);
        assert_eq!(skeleton.rule_id, "EYE_TIGHTLINE_AND_SMUDGE");
    }

    #[test]
    fn gloss_rule_matches_without_user_profile() {
        let mut look = LookSpec::default();
        look.breakdown.lip.finish = "glossy".to_string();
        let c = ctx(&look, None, None, None, PreferenceMode::Structure);
        let skeleton = select_for_region(&c, ImpactArea::Lip);
        assert_eq!(skeleton.rule_id, "LIP_GLOSS_CENTER_GRADIENT");
        assert!((skeleton.severity - 0.5).abs() < 1e-9);

        // full lips stop the gradient rule
        let full = profile(0.0, 0.4, 0.45);
        let c = ctx(&look, Some(&full), None, None, PreferenceMode::Structure);
        let skeleton = select_for_region(&c, ImpactArea::Lip);
        assert_eq!(skeleton.rule_id, "LIP_FALLBACK_FINISH_FOCUS");
    }

    #[test]
    fn titles_exist_for_every_rule() {
        for rule in rules() {
            let title = title_for_rule(rule.rule_id, rule.impact_area);
            assert!(!title.starts_with("Adjust "), "missing title: {}", rule.rule_id);
        }
    }
}
