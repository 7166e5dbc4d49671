//! Adjustment assembly and the LLM rephrasing pass.
//!
//! The deterministic path builds final [`Adjustment`]s straight from
//! rendered skeletons; the optional LLM pass only restyles their text.
//! Model output is schema-validated, then each rephrased adjustment is
//! checked against its original by [`validate::check_rephrased`]. The gate
//! is all-or-nothing: if anything fails, the deterministic originals ship
//! unchanged with a warning.

pub mod validate;

use crate::inputs::{Confidence, ImpactArea, LocaleSignals};
use crate::llm::{ChatRequest, LlmClient};
use crate::rules::{RenderedSkeleton, table::title_for_rule};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const REPHRASE_PROMPT_EN: &str = include_str!("../content/prompts/rephrase_en.txt");
const REPHRASE_PROMPT_JA: &str = include_str!("../content/prompts/rephrase_ja.txt");

// ── Adjustment ────────────────────────────────────────────────────

/// One final advice unit for a region. This is the wire shape callers see,
/// and the shape the rephrasing model must echo back.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Adjustment {
    pub area: ImpactArea,
    pub rule_id: String,
    pub title: String,
    pub because: Vec<String>,
    #[serde(rename = "do")]
    pub do_steps: Vec<String>,
    pub why: Vec<String>,
    pub severity: f64,
    pub confidence: Confidence,
    pub evidence: Vec<String>,
}

fn ensure_period(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let ends_with_punct = trimmed
        .chars()
        .next_back()
        .is_some_and(|c| matches!(c, '.' | '!' | '?' | '。' | '！' | '？'));
    if ends_with_punct {
        trimmed.to_string()
    } else {
        format!("{trimmed}.")
    }
}

/// Build the deterministic adjustment for a rendered skeleton.
pub fn adjustment_from_skeleton(skeleton: &RenderedSkeleton) -> Adjustment {
    Adjustment {
        area: skeleton.impact_area,
        rule_id: skeleton.rule_id.clone(),
        title: title_for_rule(&skeleton.rule_id, skeleton.impact_area),
        because: skeleton.because_facts.iter().map(|s| ensure_period(s)).collect(),
        do_steps: skeleton.do_actions.iter().map(|s| ensure_period(s)).collect(),
        why: skeleton.why_mechanism.iter().map(|s| ensure_period(s)).collect(),
        severity: skeleton.severity,
        confidence: skeleton.confidence,
        evidence: skeleton.evidence_keys.clone(),
    }
}

// ── Locale handling ───────────────────────────────────────────────

fn is_ja_tag(tag: &str) -> bool {
    let t = tag.trim().to_lowercase();
    t == "ja" || t.starts_with("ja-") || t.starts_with("ja_")
}

/// Whether the request's locale signals select Japanese output.
pub fn is_ja_locale(signals: &LocaleSignals) -> bool {
    [
        signals.user_language.as_deref(),
        signals.app_language.as_deref(),
        signals.locale.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find(|tag| !tag.trim().is_empty())
    .is_some_and(is_ja_tag)
}

// ── Parsing and validation ────────────────────────────────────────

/// Strip a surrounding markdown code fence, if any.
fn strip_code_fence(content: &str) -> String {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    lines.remove(0);
    if lines.last().is_some_and(|l| l.trim().starts_with("```")) {
        lines.pop();
    }
    lines.join("\n")
}

/// Parse model output and run it through schema and trust validation.
/// Returns the accepted adjustments with severity and confidence pinned
/// back to the originals' values.
pub fn parse_and_validate(
    content: &str,
    originals: &[Adjustment],
    skip_verb_check: bool,
) -> Result<Vec<Adjustment>, String> {
    let body = strip_code_fence(content);
    let value: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| format!("rephrased output is not JSON: {e}"))?;

    let schema = crate::json_schema_for::<Vec<Adjustment>>();
    if let Ok(validator) = jsonschema::validator_for(&schema) {
        let errors: Vec<String> = validator
            .iter_errors(&value)
            .map(|e| format!("{}: {e}", e.instance_path()))
            .collect();
        if !errors.is_empty() {
            return Err(format!("rephrased output failed schema: {}", errors.join("; ")));
        }
    }

    let candidates: Vec<Adjustment> = serde_json::from_value(value)
        .map_err(|e| format!("rephrased output has wrong shape: {e}"))?;

    if candidates.len() != originals.len() {
        return Err(format!(
            "rephrased output has {} adjustments, expected {}",
            candidates.len(),
            originals.len(),
        ));
    }

    let allowed_text = serde_json::to_string(originals)
        .map_err(|e| format!("could not serialize adjustments: {e}"))?;

    // The model may return regions in any order; pair by area, and reject
    // the batch when a region is missing or duplicated.
    let mut remaining = candidates;
    let mut accepted = Vec::with_capacity(originals.len());
    for original in originals {
        let position = remaining
            .iter()
            .position(|c| c.area == original.area)
            .ok_or_else(|| {
                format!(
                    "rephrased output is missing the {} adjustment",
                    original.area.as_str(),
                )
            })?;
        let mut candidate = remaining.swap_remove(position);
        validate::check_rephrased(original, &candidate, &allowed_text, skip_verb_check)?;
        // The model may only touch text.
        candidate.severity = original.severity;
        candidate.confidence = original.confidence;
        candidate.evidence = original.evidence.clone();
        accepted.push(candidate);
    }
    Ok(accepted)
}

// ── The gate ──────────────────────────────────────────────────────

/// Result of the rephrasing pass.
#[derive(Debug)]
pub struct RephraseOutcome {
    pub adjustments: Vec<Adjustment>,
    /// True when the deterministic originals shipped instead of the
    /// model's output.
    pub used_fallback: bool,
    pub warnings: Vec<String>,
}

/// Rephrase the given adjustments through the LLM, falling back to the
/// originals whole when the model's output fails any check.
pub async fn rephrase_adjustments(
    client: &LlmClient,
    originals: Vec<Adjustment>,
    signals: &LocaleSignals,
) -> RephraseOutcome {
    if originals.is_empty() {
        return RephraseOutcome {
            adjustments: originals,
            used_fallback: false,
            warnings: Vec::new(),
        };
    }

    let ja = is_ja_locale(signals);
    let system = if ja { REPHRASE_PROMPT_JA } else { REPHRASE_PROMPT_EN };

    let user = match serde_json::to_string_pretty(&originals) {
        Ok(json) => json,
        Err(e) => {
            return RephraseOutcome {
                adjustments: originals,
                used_fallback: true,
                warnings: vec![format!("could not serialize adjustments: {e}")],
            };
        }
    };

    let request = ChatRequest::rephrase(&client.model, system, &user);
    let content = match client.chat_with_retry(&request).await {
        Ok(content) => content,
        Err(e) => {
            warn!("rephrasing call failed, shipping deterministic text: {e}");
            return RephraseOutcome {
                adjustments: originals,
                used_fallback: true,
                warnings: vec![format!("rephrasing unavailable: {e}")],
            };
        }
    };

    match parse_and_validate(&content, &originals, ja) {
        Ok(adjustments) => {
            debug!("rephrased {} adjustments accepted", adjustments.len());
            RephraseOutcome {
                adjustments,
                used_fallback: false,
                warnings: Vec::new(),
            }
        }
        Err(e) => {
            warn!("rephrased output rejected: {e}");
            RephraseOutcome {
                adjustments: originals,
                used_fallback: true,
                warnings: vec![format!("rephrasing rejected: {e}")],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::Market;
    use crate::rules::DoActionSelection;

    fn skeleton() -> RenderedSkeleton {
        RenderedSkeleton {
            market: Market::Us,
            impact_area: ImpactArea::Lip,
            rule_id: "LIP_SOFT_EDGE_BLUR".to_string(),
            severity: 0.45,
            confidence: Confidence::Medium,
            because_facts: vec!["The reference lip edge is soft, not sharply lined".to_string()],
            do_action_selection: DoActionSelection::Sequence,
            do_action_ids: vec!["T_LIP_SOFT_EDGE".to_string()],
            do_actions: vec!["Blur the edge with a fingertip".to_string()],
            why_mechanism: vec!["A blurred edge is forgiving.".to_string()],
            evidence_keys: vec!["lookSpec.breakdown.lip.intent".to_string()],
            technique_refs: Vec::new(),
            safety_notes: Vec::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn adjustment_mapping_adds_periods_and_title() {
        let adjustment = adjustment_from_skeleton(&skeleton());
        assert_eq!(adjustment.title, "Soften lip edge");
        assert_eq!(adjustment.do_steps, vec!["Blur the edge with a fingertip."]);
        assert_eq!(
            adjustment.because,
            vec!["The reference lip edge is soft, not sharply lined."]
        );
        assert_eq!(adjustment.rule_id, "LIP_SOFT_EDGE_BLUR");
    }

    #[test]
    fn ensure_period_respects_cjk_punctuation() {
        assert_eq!(ensure_period("瞼の際を埋める。"), "瞼の際を埋める。");
        assert_eq!(ensure_period("Keep it thin"), "Keep it thin.");
        assert_eq!(ensure_period("  "), "");
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("[1]"), "[1]");
    }

    #[test]
    fn ja_locale_detection() {
        assert!(is_ja_locale(&LocaleSignals::from_locale("ja-JP")));
        assert!(!is_ja_locale(&LocaleSignals::from_locale("en-US")));
        let mixed = LocaleSignals {
            user_language: Some("en".to_string()),
            locale: Some("ja-JP".to_string()),
            ..Default::default()
        };
        // user language outranks the device locale
        assert!(!is_ja_locale(&mixed));
    }

    #[test]
    fn round_trip_of_originals_validates() {
        let originals = vec![adjustment_from_skeleton(&skeleton())];
        let echoed = serde_json::to_string(&originals).unwrap();
        let accepted = parse_and_validate(&echoed, &originals, false).unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].rule_id, originals[0].rule_id);
    }

    #[test]
    fn wire_shape_uses_do_key() {
        let json = serde_json::to_value(adjustment_from_skeleton(&skeleton())).unwrap();
        assert!(json.get("do").is_some());
        assert!(json.get("ruleId").is_some());
        assert!(json.get("doSteps").is_none());
    }

    #[test]
    fn reordered_regions_pair_by_area() {
        let lip = adjustment_from_skeleton(&skeleton());
        let mut eye = lip.clone();
        eye.area = ImpactArea::Eye;
        eye.rule_id = "EYE_FALLBACK_SAFE_CONTROL".to_string();
        let originals = vec![lip, eye];

        let reversed: Vec<Adjustment> = originals.iter().rev().cloned().collect();
        let echoed = serde_json::to_string(&reversed).unwrap();
        let accepted = parse_and_validate(&echoed, &originals, false).unwrap();
        assert_eq!(accepted[0].area, ImpactArea::Lip);
        assert_eq!(accepted[1].area, ImpactArea::Eye);
    }

    #[test]
    fn duplicated_region_rejected() {
        let lip = adjustment_from_skeleton(&skeleton());
        let mut eye = lip.clone();
        eye.area = ImpactArea::Eye;
        eye.rule_id = "EYE_FALLBACK_SAFE_CONTROL".to_string();
        let originals = vec![lip.clone(), eye];

        let echoed = serde_json::to_string(&vec![lip.clone(), lip]).unwrap();
        let err = parse_and_validate(&echoed, &originals, false).unwrap_err();
        assert!(err.contains("missing the eye adjustment"));
    }

    #[test]
    fn emptied_evidence_rejects_the_batch() {
        let originals = vec![adjustment_from_skeleton(&skeleton())];
        let mut tampered = originals.clone();
        tampered[0].evidence.clear();
        let echoed = serde_json::to_string(&tampered).unwrap();
        let err = parse_and_validate(&echoed, &originals, false).unwrap_err();
        assert!(err.contains("evidence is empty"));
    }

    #[test]
    fn length_mismatch_rejected() {
        let originals = vec![adjustment_from_skeleton(&skeleton())];
        let err = parse_and_validate("[]", &originals, false).unwrap_err();
        assert!(err.contains("expected 1"));
    }

    #[test]
    fn tampered_structure_rejected_whole() {
        let originals = vec![adjustment_from_skeleton(&skeleton())];
        let mut tampered = originals.clone();
        tampered[0].evidence.push("lookSpec.evidence".to_string());
        let echoed = serde_json::to_string(&tampered).unwrap();
        assert!(parse_and_validate(&echoed, &originals, false).is_err());
    }

    #[test]
    fn schema_accepts_generated_adjustments() {
        let schema = crate::json_schema_for::<Vec<Adjustment>>();
        let validator = jsonschema::validator_for(&schema).unwrap();
        let value = serde_json::to_value(vec![adjustment_from_skeleton(&skeleton())]).unwrap();
        assert!(validator.validate(&value).is_ok());
    }
}
