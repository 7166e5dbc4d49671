//! Trigger-based selection of one technique from a candidate set.
//!
//! Used only for skeletons with `choose_one` selection. Candidates are
//! filtered through the trigger-set semantics, then scored so that cards
//! with more (and more specific) conditions outrank looser ones:
//! `2·|all| + |any| + |none|`. Ranking is fully deterministic — descending
//! score, ties broken by ascending id — and a request never fails here:
//! when no candidate's triggers pass, the caller-supplied fallback id (by
//! convention the first declared candidate) is selected.

use crate::conditions::{EvalContext, trigger_set_passes};
use crate::kb::TechniqueCard;
use tracing::debug;

/// One ranked candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankedCandidate {
    pub id: String,
    pub score: u32,
}

/// Outcome of a `choose_one` selection.
#[derive(Clone, Debug)]
pub struct Selection {
    pub selected_id: String,
    /// Candidates whose triggers passed, in rank order. Empty when the
    /// fallback id was used.
    pub ranked: Vec<RankedCandidate>,
}

/// Specificity score for a card's trigger set.
fn trigger_score(card: &TechniqueCard) -> u32 {
    let t = &card.triggers;
    (2 * t.all.len() + t.any.len() + t.none.len()) as u32
}

/// Select the best technique id from `candidates` for this context.
///
/// `debug_logging` gates per-candidate diagnostics; the sort key (ascending
/// id on ties) is deliberate and load-bearing for determinism.
pub fn select_best_technique_id(
    ctx: &EvalContext,
    candidates: &[&TechniqueCard],
    fallback_id: &str,
    debug_logging: bool,
) -> Selection {
    let mut ranked: Vec<RankedCandidate> = candidates
        .iter()
        .filter(|card| {
            let passed = trigger_set_passes(ctx, &card.triggers);
            if debug_logging {
                debug!(
                    "trigger selection: candidate={} conditions={} passed={}",
                    card.id,
                    card.triggers.condition_count(),
                    passed,
                );
            }
            passed
        })
        .map(|card| RankedCandidate {
            id: card.id.clone(),
            score: trigger_score(card),
        })
        .collect();

    ranked.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));

    let selected_id = ranked
        .first()
        .map(|c| c.id.clone())
        .unwrap_or_else(|| fallback_id.to_string());

    if debug_logging {
        debug!(
            "trigger selection: selected={} (ranked {} of {} candidates)",
            selected_id,
            ranked.len(),
            candidates.len(),
        );
    }

    Selection {
        selected_id,
        ranked,
    }
}
