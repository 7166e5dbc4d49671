//! Extended-region skeletons (prep, contour, brow, blush).
//!
//! These regions sit behind the `extended_regions` flag and never feed the
//! rephrasing step. Prep and blush always emit; contour and brow emit only
//! when the similarity report flags the region as needing a change. When a
//! region's activity slot is on, the skeleton switches to `choose_one` over
//! a candidate pool ordered by the user's declared signals, and trigger
//! matching picks the concrete card at render time.

use super::{DoActionSelection, RuleContext, SkeletonDraft, base_confidence, clamp01};
use crate::config::EngineConfig;
use crate::inputs::ImpactArea;

fn strs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[allow(clippy::too_many_arguments)]
fn extended_draft(
    ctx: &RuleContext,
    rule_id: &'static str,
    area: ImpactArea,
    severity: f64,
    selection: DoActionSelection,
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
        do_action_selection: selection,
        do_action_ids: strs(action_ids),
        why_mechanism: strs(why),
        evidence_keys: strs(evidence),
        safety_notes: Vec::new(),
        tags: strs(&["extended"]),
    }
}

fn wants_oil_control(ctx: &RuleContext) -> bool {
    ctx.user_face
        .and_then(|u| u.categorical.needs_oil_control)
        .unwrap_or(false)
}

fn face_shape_is(ctx: &RuleContext, shape: &str) -> bool {
    ctx.user_face
        .and_then(|u| u.categorical.face_shape.as_deref())
        .is_some_and(|s| s.eq_ignore_ascii_case(shape))
}

fn prep_skeleton(ctx: &RuleContext, config: &EngineConfig) -> SkeletonDraft {
    if config.activity_slots.prep {
        // ordered so the preferred primer comes first; choose_one keeps
        // exactly one at render time
        let pool: &[&str] = if wants_oil_control(ctx) {
            &[
                "T_PREP_PRIMER_PORE_BLUR",
                "T_PREP_PRIMER_HYDRATING",
                "T_PREP_HYDRATE_LAYER",
            ]
        } else {
            &[
                "T_PREP_PRIMER_HYDRATING",
                "T_PREP_PRIMER_PORE_BLUR",
                "T_PREP_HYDRATE_LAYER",
            ]
        };
        return extended_draft(
            ctx,
            "PREP_ACTIVITY_PRIMER_CHOICE",
            ImpactArea::Prep,
            0.3,
            DoActionSelection::ChooseOne,
            &["Prep sets how every later layer sits."],
            pool,
            &["The right primer keeps the base finish stable longer."],
            &["userFaceProfile.categorical.needsOilControl"],
        );
    }
    extended_draft(
        ctx,
        "PREP_SAFE_MINIMAL",
        ImpactArea::Prep,
        0.2,
        DoActionSelection::Sequence,
        &["Prep sets how every later layer sits."],
        &["T_PREP_HYDRATE_LAYER", "T_PREP_SUNSCREEN_SMOOTH"],
        &["Hydrated, smooth skin takes thin base layers evenly."],
        &["lookSpec.breakdown.base"],
    )
}

fn contour_skeleton(ctx: &RuleContext, config: &EngineConfig) -> Option<SkeletonDraft> {
    if !ctx.similarity.is_some_and(|s| s.needs_change(ImpactArea::Contour)) {
        return None;
    }
    let skeleton = if config.activity_slots.contour {
        let pool: &[&str] = if face_shape_is(ctx, "round") {
            &[
                "T_CONTOUR_ROUND_SOFTEN",
                "T_CONTOUR_SOFT_SWEEP",
                "T_CONTOUR_CREAM_BLEND",
            ]
        } else {
            &[
                "T_CONTOUR_SOFT_SWEEP",
                "T_CONTOUR_CREAM_BLEND",
                "T_CONTOUR_ROUND_SOFTEN",
            ]
        };
        extended_draft(
            ctx,
            "CONTOUR_ACTIVITY_SHAPE_CHOICE",
            ImpactArea::Contour,
            0.4,
            DoActionSelection::ChooseOne,
            &["The reference face structure reads differently from yours."],
            pool,
            &["Contour placement should follow your bone structure, not the reference's."],
            &["similarityReport.lookDiff.contour", "userFaceProfile.categorical.faceShape"],
        )
    } else {
        extended_draft(
            ctx,
            "CONTOUR_NEEDS_CHANGE_SOFT",
            ImpactArea::Contour,
            0.35,
            DoActionSelection::Sequence,
            &["The reference face structure reads differently from yours."],
            &["T_CONTOUR_SOFT_SWEEP", "T_CONTOUR_CREAM_BLEND"],
            &["A soft, blended contour adapts the reference shape safely."],
            &["similarityReport.lookDiff.contour"],
        )
    };
    Some(skeleton)
}

fn brow_skeleton(ctx: &RuleContext) -> Option<SkeletonDraft> {
    if !ctx.similarity.is_some_and(|s| s.needs_change(ImpactArea::Brow)) {
        return None;
    }
    Some(extended_draft(
        ctx,
        "BROW_NEEDS_CHANGE_SOFT_FILL",
        ImpactArea::Brow,
        0.35,
        DoActionSelection::Sequence,
        &["The reference brow shape differs from yours."],
        &["T_BROW_FILL_LIGHT_STROKES", "T_BROW_BRUSH_UP_SET"],
        &["Light strokes adjust shape without redrawing the brow."],
        &["similarityReport.lookDiff.brow"],
    ))
}

fn blush_skeleton(ctx: &RuleContext, config: &EngineConfig) -> SkeletonDraft {
    if config.activity_slots.blush {
        let pool: &[&str] = if face_shape_is(ctx, "round") {
            &[
                "T_BLUSH_PLACEMENT_LIFT",
                "T_BLUSH_CREAM_DIFFUSE",
                "T_BLUSH_LAYER_SHEER",
            ]
        } else {
            &[
                "T_BLUSH_CREAM_DIFFUSE",
                "T_BLUSH_PLACEMENT_LIFT",
                "T_BLUSH_LAYER_SHEER",
            ]
        };
        return extended_draft(
            ctx,
            "BLUSH_ACTIVITY_PLACEMENT_CHOICE",
            ImpactArea::Blush,
            0.3,
            DoActionSelection::ChooseOne,
            &["Blush placement shifts how the whole look reads."],
            pool,
            &["Placement tuned to your face shape keeps the reference mood."],
            &["userFaceProfile.categorical.faceShape"],
        );
    }
    extended_draft(
        ctx,
        "BLUSH_SAFE_DIFFUSE",
        ImpactArea::Blush,
        0.25,
        DoActionSelection::Sequence,
        &["Blush placement shifts how the whole look reads."],
        &["T_BLUSH_CREAM_DIFFUSE", "T_BLUSH_LAYER_SHEER"],
        &["Sheer, diffused layers are the safest blush default."],
        &["lookSpec.breakdown.base"],
    )
}

/// Extended-region skeletons in fixed order: prep, contour, brow, blush.
pub fn extended_skeletons(ctx: &RuleContext, config: &EngineConfig) -> Vec<SkeletonDraft> {
    let mut out = Vec::with_capacity(4);
    out.push(prep_skeleton(ctx, config));
    if let Some(contour) = contour_skeleton(ctx, config) {
        out.push(contour);
    }
    if let Some(brow) = brow_skeleton(ctx) {
        out.push(brow);
    }
    out.push(blush_skeleton(ctx, config));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActivitySlots;
    use crate::inputs::{
        FaceCategorical, FaceProfile, LookDiffField, LookSpec, Market, PreferenceMode,
        ProfileQuality, SimilarityReport,
    };

    fn ctx<'a>(
        look: &'a LookSpec,
        user: Option<&'a FaceProfile>,
        sim: Option<&'a SimilarityReport>,
    ) -> RuleContext<'a> {
        RuleContext {
            market: Market::Us,
            look_spec: look,
            user_face: user,
            ref_face: None,
            similarity: sim,
            preference_mode: PreferenceMode::Structure,
        }
    }

    fn needs_change_report(regions: &[&str]) -> SimilarityReport {
        let mut report = SimilarityReport::default();
        for region in regions {
            report.look_diff.insert(
                (*region).to_string(),
                LookDiffField {
                    user: "softer".to_string(),
                    target: "sharper".to_string(),
                    needs_change: true,
                },
            );
        }
        report
    }

    #[test]
    fn contour_and_brow_require_needs_change() {
        let look = LookSpec::default();
        let config = EngineConfig::default().with_extended_regions(true);

        let quiet = extended_skeletons(&ctx(&look, None, None), &config);
        let areas: Vec<ImpactArea> = quiet.iter().map(|s| s.impact_area).collect();
        assert_eq!(areas, vec![ImpactArea::Prep, ImpactArea::Blush]);

        let report = needs_change_report(&["contour", "brow"]);
        let flagged = extended_skeletons(&ctx(&look, None, Some(&report)), &config);
        let areas: Vec<ImpactArea> = flagged.iter().map(|s| s.impact_area).collect();
        assert_eq!(
            areas,
            vec![
                ImpactArea::Prep,
                ImpactArea::Contour,
                ImpactArea::Brow,
                ImpactArea::Blush
            ]
        );
    }

    #[test]
    fn prep_activity_slot_switches_to_choose_one() {
        let look = LookSpec::default();
        let config = EngineConfig::default()
            .with_extended_regions(true)
            .with_activity_slots(ActivitySlots {
                prep: true,
                ..Default::default()
            });
        let skeletons = extended_skeletons(&ctx(&look, None, None), &config);
        let prep = &skeletons[0];
        assert_eq!(prep.rule_id, "PREP_ACTIVITY_PRIMER_CHOICE");
        assert_eq!(prep.do_action_selection, DoActionSelection::ChooseOne);
        assert_eq!(prep.do_action_ids[0], "T_PREP_PRIMER_HYDRATING");
    }

    #[test]
    fn oil_control_prefers_pore_blur_primer() {
        let look = LookSpec::default();
        let user = FaceProfile {
            quality: ProfileQuality {
                valid: true,
                score: 80.0,
            },
            categorical: FaceCategorical {
                needs_oil_control: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        let config = EngineConfig::default()
            .with_extended_regions(true)
            .with_activity_slots(ActivitySlots {
                prep: true,
                ..Default::default()
            });
        let skeletons = extended_skeletons(&ctx(&look, Some(&user), None), &config);
        assert_eq!(skeletons[0].do_action_ids[0], "T_PREP_PRIMER_PORE_BLUR");
    }

    #[test]
    fn round_face_leads_contour_and_blush_pools() {
        let look = LookSpec::default();
        let user = FaceProfile {
            categorical: FaceCategorical {
                face_shape: Some("Round".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let report = needs_change_report(&["contour"]);
        let config = EngineConfig::default()
            .with_extended_regions(true)
            .with_activity_slots(ActivitySlots::all());
        let skeletons = extended_skeletons(&ctx(&look, Some(&user), Some(&report)), &config);
        let contour = skeletons
            .iter()
            .find(|s| s.impact_area == ImpactArea::Contour)
            .unwrap();
        assert_eq!(contour.do_action_ids[0], "T_CONTOUR_ROUND_SOFTEN");
        let blush = skeletons
            .iter()
            .find(|s| s.impact_area == ImpactArea::Blush)
            .unwrap();
        assert_eq!(blush.do_action_ids[0], "T_BLUSH_PLACEMENT_LIFT");
    }

    #[test]
    fn extended_skeletons_are_tagged() {
        let look = LookSpec::default();
        let config = EngineConfig::default().with_extended_regions(true);
        for skeleton in extended_skeletons(&ctx(&look, None, None), &config) {
            assert!(skeleton.tags.contains(&"extended".to_string()));
            assert!(!skeleton.impact_area.is_canonical());
        }
    }
}
