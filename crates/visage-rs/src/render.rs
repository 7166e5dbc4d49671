//! Skeleton rendering: expand technique references into concrete steps.
//!
//! Rendering is a pure transform from [`SkeletonDraft`]s plus a loaded KB
//! to [`RenderedSkeleton`]s. Content problems are never errors here: a
//! missing card, a market mismatch, or a card landing in the wrong region
//! is rejected with a warning, and a region whose cards all fail falls
//! back to its hardcoded safe steps, so a personalization request always
//! gets renderable output.

use crate::conditions::EvalContext;
use crate::config::EngineConfig;
use crate::inputs::{ImpactArea, LocaleSignals};
use crate::kb::resolver::{Language, infer_language, resolve_for_language};
use crate::kb::selector::select_best_technique_id;
use crate::kb::{TechniqueCard, TechniqueKb};
use crate::rules::{DoActionSelection, RenderedSkeleton, SkeletonDraft, TechniqueRef};
use tracing::debug;

/// Rendered skeletons plus everything the caller needs to explain them.
#[derive(Debug)]
pub struct RenderOutput {
    /// Canonical-region skeletons only, in canonical order.
    pub skeletons: Vec<RenderedSkeleton>,
    /// Every rendered skeleton, canonical and extended, in draft order.
    pub all_skeletons: Vec<RenderedSkeleton>,
    pub warnings: Vec<String>,
    /// Whether any region fell through to its hardcoded fallback steps.
    pub used_fallback: bool,
}

// ── Defaults ──────────────────────────────────────────────────────

/// Region-default template variables, consulted after the card's own.
fn default_variable(area: ImpactArea, name: &str) -> Option<&'static str> {
    match (area, name) {
        (ImpactArea::Eye, "linerAngleHint") => Some("angle slightly more horizontal"),
        _ => None,
    }
}

/// Safe generic steps for a region when no technique content resolves.
fn fallback_steps(area: ImpactArea) -> &'static [&'static str] {
    match area {
        ImpactArea::Base => &[
            "Apply a thin base layer.",
            "Spot-correct only where needed.",
            "Set only where needed.",
        ],
        ImpactArea::Eye => &[
            "Start liner from the outer third.",
            "Keep the line thin.",
            "Keep the wing short.",
        ],
        ImpactArea::Lip => &[
            "Match the reference finish.",
            "Stay in a close shade family.",
            "Blot lightly to adjust intensity.",
        ],
        ImpactArea::Prep => &[
            "Start with a light moisturizer.",
            "Let skincare settle before base.",
        ],
        ImpactArea::Contour => &[
            "Use a soft, blendable shade.",
            "Blend until no edges remain.",
        ],
        ImpactArea::Brow => &["Fill with light strokes.", "Brush up and set softly."],
        ImpactArea::Blush => &["Apply sheer layers.", "Diffuse the edges well."],
    }
}

// ── Template expansion ────────────────────────────────────────────

/// Expand `{{name}}` placeholders. Unknown names are left in place.
fn expand_step(step: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(step.len());
    let mut rest = step;
    loop {
        let Some(open) = rest.find("{{") else {
            out.push_str(rest);
            return out;
        };
        let (head, tail) = match (rest.get(..open), rest.get(open + 2..)) {
            (Some(h), Some(t)) => (h, t),
            _ => {
                out.push_str(rest);
                return out;
            }
        };
        out.push_str(head);
        let Some(close) = tail.find("}}") else {
            out.push_str("{{");
            out.push_str(tail);
            return out;
        };
        let (name, after) = match (tail.get(..close), tail.get(close + 2..)) {
            (Some(n), Some(a)) => (n, a),
            _ => {
                out.push_str("{{");
                out.push_str(tail);
                return out;
            }
        };
        match lookup(name.trim()) {
            Some(value) => out.push_str(&value),
            None => {
                out.push_str("{{");
                out.push_str(name);
                out.push_str("}}");
            }
        }
        rest = after;
    }
}

fn card_steps(card: &TechniqueCard, area: ImpactArea) -> Vec<String> {
    let lookup = |name: &str| -> Option<String> {
        card.action_template
            .variables
            .get(name)
            .cloned()
            .or_else(|| default_variable(area, name).map(str::to_string))
    };
    card.action_template
        .steps
        .iter()
        .map(|step| expand_step(step, &lookup))
        .collect()
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) {
        out.push(value);
    }
}

// ── Rendering ─────────────────────────────────────────────────────

struct SkeletonRender<'a> {
    cards: Vec<&'a TechniqueCard>,
    warnings: Vec<String>,
}

/// Resolve one draft's technique ids to cards, honoring the draft's
/// selection mode.
fn resolve_cards<'a>(
    draft: &SkeletonDraft,
    kb: &'a TechniqueKb,
    ctx: &EvalContext,
    signals: &LocaleSignals,
    config: &EngineConfig,
) -> SkeletonRender<'a> {
    let mut render = SkeletonRender {
        cards: Vec::new(),
        warnings: Vec::new(),
    };

    let mut resolved: Vec<&TechniqueCard> = Vec::new();
    for id in &draft.do_action_ids {
        let resolution = resolve_for_language(id, kb, signals);
        let Some(card) = resolution.card else {
            render
                .warnings
                .push(format!("no {} content for technique '{id}'", kb.market()));
            continue;
        };
        if resolution.used_fallback_language {
            render.warnings.push(format!(
                "technique language fallback for '{id}': missing zh, used en ('{}')",
                card.id,
            ));
        }
        if card.area != draft.impact_area {
            render.warnings.push(format!(
                "technique '{}' targets {} but skeleton {} is for {}",
                card.id,
                card.area.as_str(),
                draft.rule_id,
                draft.impact_area.as_str(),
            ));
            continue;
        }
        if !resolved.iter().any(|c| c.id == card.id) {
            resolved.push(card);
        }
    }

    match draft.do_action_selection {
        DoActionSelection::Sequence => render.cards = resolved,
        DoActionSelection::ChooseOne => {
            if resolved.is_empty() {
                return render;
            }
            let chosen = if config.trigger_matching {
                let selection = select_best_technique_id(
                    ctx,
                    &resolved,
                    &resolved[0].id,
                    config.debug_logging,
                );
                resolved
                    .iter()
                    .find(|c| c.id == selection.selected_id)
                    .copied()
                    .unwrap_or(resolved[0])
            } else {
                resolved[0]
            };
            render.cards = vec![chosen];
        }
    }
    render
}

fn render_one(
    draft: &SkeletonDraft,
    kb: &TechniqueKb,
    ctx: &EvalContext,
    signals: &LocaleSignals,
    config: &EngineConfig,
    warnings: &mut Vec<String>,
    used_fallback: &mut bool,
) -> RenderedSkeleton {
    // A market mismatch rejects every card; the region falls through to
    // its fallback steps.
    let resolved = if draft.market == kb.market() {
        resolve_cards(draft, kb, ctx, signals, config)
    } else {
        warnings.push(format!(
            "skeleton {} targets market {} but content is {}",
            draft.rule_id,
            draft.market,
            kb.market(),
        ));
        SkeletonRender {
            cards: Vec::new(),
            warnings: Vec::new(),
        }
    };
    warnings.extend(resolved.warnings);

    let mut do_actions: Vec<String> = Vec::new();
    let mut technique_refs: Vec<TechniqueRef> = Vec::new();
    let mut safety_notes = draft.safety_notes.clone();
    let mut tags = draft.tags.clone();
    let mut because_facts = draft.because_facts.clone();
    let mut why_mechanism = draft.why_mechanism.clone();

    let zh = infer_language(signals) == Language::Zh;
    let mut rationale_overridden = false;

    for card in &resolved.cards {
        for step in card_steps(card, draft.impact_area) {
            push_unique(&mut do_actions, step);
        }
        technique_refs.push(TechniqueRef {
            id: card.id.clone(),
            area: card.area,
        });
        for note in &card.safety_notes {
            push_unique(&mut safety_notes, note.clone());
        }
        for hint in &card.product_role_hints {
            push_unique(&mut tags, format!("role:{hint}"));
        }
        // Localized rationale replaces the rule's English facts and
        // mechanism text.
        if zh && !rationale_overridden && card.id.ends_with("-zh") && !card.rationale_template.is_empty()
        {
            because_facts = card.rationale_template.clone();
            why_mechanism = card.rationale_template.clone();
            rationale_overridden = true;
        }
    }

    if do_actions.is_empty() {
        debug!(
            "skeleton {} resolved no content, using {} fallback steps",
            draft.rule_id,
            draft.impact_area.as_str(),
        );
        warnings.push(format!(
            "no steps rendered for {}: using safe fallback steps",
            draft.impact_area.as_str(),
        ));
        do_actions = fallback_steps(draft.impact_area)
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        *used_fallback = true;
    }

    RenderedSkeleton {
        market: draft.market,
        impact_area: draft.impact_area,
        rule_id: draft.rule_id.clone(),
        severity: draft.severity,
        confidence: draft.confidence,
        because_facts,
        do_action_selection: draft.do_action_selection,
        do_action_ids: draft.do_action_ids.clone(),
        do_actions,
        why_mechanism,
        evidence_keys: draft.evidence_keys.clone(),
        technique_refs,
        safety_notes,
        tags,
    }
}

/// Render every draft against the KB. Draft order is preserved;
/// `skeletons` filters down to the canonical regions.
pub fn render(
    drafts: &[SkeletonDraft],
    kb: &TechniqueKb,
    ctx: &EvalContext,
    signals: &LocaleSignals,
    config: &EngineConfig,
) -> RenderOutput {
    let mut warnings = Vec::new();
    let mut used_fallback = false;

    let all_skeletons: Vec<RenderedSkeleton> = drafts
        .iter()
        .map(|draft| render_one(draft, kb, ctx, signals, config, &mut warnings, &mut used_fallback))
        .collect();

    let skeletons = all_skeletons
        .iter()
        .filter(|s| s.impact_area.is_canonical())
        .cloned()
        .collect();

    RenderOutput {
        skeletons,
        all_skeletons,
        warnings,
        used_fallback,
    }
}
