//! Trust-boundary checks on rephrased adjustments.
//!
//! The model is only allowed to restyle text. Every structural fact — the
//! region, the rule, the evidence, the set of numeric claims — must survive
//! rephrasing unchanged, and certain content (identity comparisons, face
//! traits the skeleton never asserted) is forbidden outright. A candidate
//! failing any check is rejected whole; there is no partial acceptance.

use super::Adjustment;

/// Verbs a rephrased step may open with even when no original step did.
/// Everything else must match the first word of some original step.
const ALLOWED_DO_VERBS: [&str; 11] = [
    "and", "then", "also", "try", "aim", "keep", "use", "add", "apply", "blend", "press",
];

/// Phrases that compare the user to another person. Never acceptable.
const IDENTITY_PHRASES: [&str; 8] = [
    "look like",
    "resemble",
    "celebrity",
    "famous",
    "actor",
    "actress",
    "singer",
    "model",
];

/// CJK identity phrases (Japanese/Chinese locales).
const IDENTITY_PHRASES_CJK: [&str; 6] = ["有名人", "芸能人", "セレブ", "そっくり", "似ている", "似てる"];

/// Face-trait tokens the model may not introduce on its own.
const FORBIDDEN_TRAITS: [&str; 13] = [
    "hooded",
    "downturned",
    "upturned",
    "thin lips",
    "oily skin",
    "dry skin",
    "pores",
    "wrinkles",
    "acne",
    "undertone",
    "warm",
    "cool",
    "skin type",
];

fn joined_text(adjustment: &Adjustment) -> String {
    let mut parts = vec![adjustment.title.clone()];
    parts.extend(adjustment.because.iter().cloned());
    parts.extend(adjustment.do_steps.iter().cloned());
    parts.extend(adjustment.why.iter().cloned());
    parts.join(" ").to_lowercase()
}

/// Extract numeric tokens (integers and decimals) from text.
fn numeric_tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if c == '.'
            && !current.is_empty()
            && chars.peek().is_some_and(|n| n.is_ascii_digit())
        {
            current.push(c);
        } else if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn first_word(step: &str) -> Option<String> {
    step.split_whitespace().next().map(|w| {
        w.chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase()
    })
}

/// Check one rephrased adjustment against its deterministic original.
///
/// `allowed_text` is the serialized batch of originals: numeric and trait
/// tokens appearing anywhere in it (any region's text, severities) are not
/// new claims. `skip_verb_check` disables the English opening-verb check;
/// it is set for Japanese-locale output where the verb comes last.
pub fn check_rephrased(
    original: &Adjustment,
    candidate: &Adjustment,
    allowed_text: &str,
    skip_verb_check: bool,
) -> Result<(), String> {
    let rule = &original.rule_id;

    if candidate.area != original.area {
        return Err(format!(
            "{rule}: area changed from {} to {}",
            original.area.as_str(),
            candidate.area.as_str(),
        ));
    }
    if candidate.rule_id != original.rule_id {
        return Err(format!(
            "{rule}: rule id changed to '{}'",
            candidate.rule_id
        ));
    }
    if candidate.do_steps.is_empty() {
        return Err(format!("{rule}: rephrased steps are empty"));
    }

    let candidate_text = joined_text(candidate);
    let allowed_lower = allowed_text.to_lowercase();

    for phrase in IDENTITY_PHRASES.iter().map(|p| p.to_string()).chain(
        IDENTITY_PHRASES_CJK.iter().map(|p| p.to_string()),
    ) {
        if candidate_text.contains(&phrase) {
            return Err(format!("{rule}: identity comparison '{phrase}'"));
        }
    }

    let allowed_numbers = numeric_tokens(allowed_text);
    for number in numeric_tokens(&candidate_text) {
        if !allowed_numbers.contains(&number) {
            return Err(format!("{rule}: new numeric claim '{number}'"));
        }
    }

    for trait_token in FORBIDDEN_TRAITS {
        if candidate_text.contains(trait_token) && !allowed_lower.contains(trait_token) {
            return Err(format!("{rule}: new trait claim '{trait_token}'"));
        }
    }

    if !skip_verb_check {
        let original_verbs: Vec<String> = original
            .do_steps
            .iter()
            .filter_map(|s| first_word(s))
            .collect();
        for step in &candidate.do_steps {
            let Some(verb) = first_word(step) else {
                return Err(format!("{rule}: unreadable step '{step}'"));
            };
            if !ALLOWED_DO_VERBS.contains(&verb.as_str()) && !original_verbs.contains(&verb) {
                return Err(format!("{rule}: step opens with unexpected verb '{verb}'"));
            }
        }
    }

    if candidate.evidence.is_empty() {
        return Err(format!("{rule}: rephrased evidence is empty"));
    }
    for key in &candidate.evidence {
        if !original.evidence.contains(key) {
            return Err(format!("{rule}: invented evidence key '{key}'"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::{Confidence, ImpactArea};

    fn original() -> Adjustment {
        Adjustment {
            area: ImpactArea::Eye,
            rule_id: "EYE_LINER_DIRECTION_ADAPT".to_string(),
            title: "Adapt liner direction".to_string(),
            because: vec!["Your eye tilt differs from the reference look.".to_string()],
            do_steps: vec![
                "Start liner from the outer third.".to_string(),
                "Keep the line thin.".to_string(),
            ],
            why: vec!["A flatter wing angle reads closer to the reference tilt.".to_string()],
            severity: 0.6,
            confidence: Confidence::Medium,
            evidence: vec!["userFaceProfile.geometry.eyeTiltDeg".to_string()],
        }
    }

    fn batch_text(batch: &[Adjustment]) -> String {
        serde_json::to_string(batch).unwrap()
    }

    fn check(original: &Adjustment, candidate: &Adjustment, skip_verb: bool) -> Result<(), String> {
        check_rephrased(
            original,
            candidate,
            &batch_text(std::slice::from_ref(original)),
            skip_verb,
        )
    }

    #[test]
    fn faithful_rewording_passes() {
        let mut candidate = original();
        candidate.do_steps = vec![
            "Start your liner at the outer third of the eye.".to_string(),
            "Keep the line thin and close to the lashes.".to_string(),
        ];
        candidate.why = vec!["A flatter angle suits the reference tilt.".to_string()];
        assert!(check(&original(), &candidate, false).is_ok());
    }

    #[test]
    fn area_and_rule_pinned() {
        let mut candidate = original();
        candidate.area = ImpactArea::Lip;
        assert!(check(&original(), &candidate, false).is_err());

        let mut candidate = original();
        candidate.rule_id = "SOMETHING_ELSE".to_string();
        assert!(check(&original(), &candidate, false).is_err());
    }

    #[test]
    fn identity_comparison_rejected() {
        let mut candidate = original();
        candidate.why = vec!["This will make you look like the celebrity.".to_string()];
        let err = check(&original(), &candidate, false).unwrap_err();
        assert!(err.contains("identity comparison"));

        let mut candidate = original();
        candidate.because = vec!["有名人のようになります。".to_string()];
        assert!(check(&original(), &candidate, true).is_err());
    }

    #[test]
    fn new_numeric_claim_rejected() {
        let mut candidate = original();
        candidate.do_steps = vec!["Start liner at a 45 degree angle.".to_string()];
        let err = check(&original(), &candidate, false).unwrap_err();
        assert!(err.contains("numeric claim '45'"));
    }

    #[test]
    fn numbers_present_in_original_are_allowed() {
        let mut source = original();
        source.because = vec!["The tilt differs by 3 degrees.".to_string()];
        let mut candidate = source.clone();
        candidate.because = vec!["There is a 3 degree tilt difference.".to_string()];
        assert!(check(&source, &candidate, false).is_ok());
    }

    #[test]
    fn numbers_from_serialized_batch_are_allowed() {
        // Severity values and other regions' text are part of the batch;
        // echoing them back is not a new claim.
        let mut candidate = original();
        candidate.why = vec!["This carries a 0.6 weight in the plan.".to_string()];
        assert!(check(&original(), &candidate, false).is_ok());

        let mut other = original();
        other.area = ImpactArea::Lip;
        other.rule_id = "LIP_SOFT_EDGE_BLUR".to_string();
        other.because = vec!["The lip edge blurs over 2 passes.".to_string()];
        let batch = vec![original(), other];
        let mut candidate = original();
        candidate.because = vec!["Work in 2 passes here too.".to_string()];
        assert!(check_rephrased(&batch[0], &candidate, &batch_text(&batch), false).is_ok());
    }

    #[test]
    fn new_trait_claim_rejected() {
        let mut candidate = original();
        candidate.because = vec!["Since your eyes are hooded, start further out.".to_string()];
        let err = check(&original(), &candidate, false).unwrap_err();
        assert!(err.contains("trait claim 'hooded'"));
    }

    #[test]
    fn unexpected_opening_verb_rejected_unless_ja() {
        let mut candidate = original();
        candidate.do_steps = vec!["Consider starting from the outer third.".to_string()];
        assert!(check(&original(), &candidate, false).is_err());
        // Japanese sentences put the verb last, so the check is skipped.
        assert!(check(&original(), &candidate, true).is_ok());
    }

    #[test]
    fn connective_verbs_allowed() {
        let mut candidate = original();
        candidate.do_steps = vec![
            "Keep the line thin.".to_string(),
            "Then blend the outer corner softly.".to_string(),
        ];
        assert!(check(&original(), &candidate, false).is_ok());
    }

    #[test]
    fn empty_evidence_rejected() {
        let mut candidate = original();
        candidate.evidence.clear();
        let err = check(&original(), &candidate, false).unwrap_err();
        assert!(err.contains("evidence is empty"));
    }

    #[test]
    fn invented_evidence_rejected() {
        let mut candidate = original();
        candidate
            .evidence
            .push("userFaceProfile.categorical.eyeShape".to_string());
        let err = check(&original(), &candidate, false).unwrap_err();
        assert!(err.contains("invented evidence"));
    }

    #[test]
    fn numeric_tokens_handle_decimals() {
        assert_eq!(numeric_tokens("shift 0.5 cm, then 10 deg"), vec!["0.5", "10"]);
        assert_eq!(numeric_tokens("no numbers here."), Vec::<String>::new());
    }
}
