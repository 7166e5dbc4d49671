//! Language/market card resolution.
//!
//! Technique ids are addressed bilingually: a base id plus a `-en`/`-zh`
//! suffix. Given a requested id and the request's locale signals, this
//! module infers the target language, generates candidate ids in fallback
//! order, and returns the first loaded card whose language gate (if any)
//! admits that language. Chinese requests fall back to English content
//! when no Chinese candidate resolves; nothing resolving is "missing
//! content" for the caller to warn about, never an error.

use crate::conditions::{Condition, ConditionOp, TriggerSet};
use crate::inputs::LocaleSignals;
use crate::kb::{TechniqueCard, TechniqueKb};
use serde_json::Value;

// ── Language inference ────────────────────────────────────────────

/// Content language. Only two are addressable today.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Language {
    En,
    Zh,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
        }
    }

    fn other(&self) -> Language {
        match self {
            Language::En => Language::Zh,
            Language::Zh => Language::En,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a locale-ish string selects Chinese content.
fn is_zh_tag(tag: &str) -> bool {
    let t = tag.trim().to_lowercase();
    t == "zh" || t.starts_with("zh-") || t.starts_with("zh_")
}

/// Parse the first language tag out of an `Accept-Language`-style header.
fn first_accept_language_tag(header: &str) -> Option<String> {
    header
        .split(',')
        .map(|entry| entry.split(';').next().unwrap_or("").trim())
        .find(|tag| !tag.is_empty())
        .map(str::to_string)
}

/// Infer the content language from locale signals, in priority order:
/// explicit user language, app language, locale, `Accept-Language` header,
/// default English.
pub fn infer_language(signals: &LocaleSignals) -> Language {
    let candidates = [
        signals.user_language.clone(),
        signals.app_language.clone(),
        signals.locale.clone(),
        signals
            .accept_language
            .as_deref()
            .and_then(first_accept_language_tag),
    ];
    for tag in candidates.into_iter().flatten() {
        if tag.trim().is_empty() {
            continue;
        }
        return if is_zh_tag(&tag) { Language::Zh } else { Language::En };
    }
    Language::En
}

// ── Candidate generation ──────────────────────────────────────────

/// Strip a trailing `-en`/`-zh` suffix (case-insensitive).
pub fn strip_lang_suffix(id: &str) -> &str {
    let lower = id.to_lowercase();
    if lower.ends_with("-zh") || lower.ends_with("-en") {
        &id[..id.len() - 3]
    } else {
        id
    }
}

fn has_suffix(id: &str, lang: Language) -> bool {
    id.to_lowercase().ends_with(&format!("-{}", lang.as_str()))
}

/// Candidate ids for a requested id and inferred language, most specific
/// first. An id that already carries a language suffix keeps the requested
/// language variant ahead of the authored one.
fn candidate_ids_for(requested: &str, lang: Language) -> Vec<String> {
    let base = strip_lang_suffix(requested).to_string();
    if has_suffix(requested, Language::Zh) {
        return match lang {
            Language::En => vec![format!("{base}-en"), requested.to_string(), base],
            Language::Zh => vec![requested.to_string(), format!("{base}-en"), base],
        };
    }
    if has_suffix(requested, Language::En) {
        return match lang {
            Language::Zh => vec![format!("{base}-zh"), requested.to_string(), base],
            Language::En => vec![requested.to_string(), base],
        };
    }
    match lang {
        Language::Zh => vec![format!("{base}-zh"), format!("{base}-en"), base],
        Language::En => vec![format!("{base}-en"), format!("{base}-zh"), base],
    }
}

// ── Language gating ───────────────────────────────────────────────

/// Evaluate one `preferenceMode` condition with the inferred language in
/// place of the routing mode. Content reuses `preferenceMode` as a
/// language flag, so only `eq`/`neq`/`in`/`exists` make sense here.
fn language_condition_passes(lang: Language, condition: &Condition) -> bool {
    let lang_value = Value::String(lang.as_str().to_string());
    match condition.op {
        ConditionOp::Exists => true,
        ConditionOp::Eq => condition.value.as_ref() == Some(&lang_value),
        ConditionOp::Neq => condition.value.as_ref() != Some(&lang_value),
        ConditionOp::In => condition
            .value
            .as_ref()
            .and_then(Value::as_array)
            .map(|list| list.contains(&lang_value))
            .unwrap_or(false),
        _ => false,
    }
}

fn preference_mode_conditions(triggers: &TriggerSet) -> bool {
    triggers.conditions().any(|c| c.key == "preferenceMode")
}

/// Whether a card's triggers admit the given language. Cards without a
/// `preferenceMode` gate admit every language.
fn card_allows_language(card: &TechniqueCard, lang: Language) -> bool {
    if !preference_mode_conditions(&card.triggers) {
        return true;
    }
    let only_mode = |conditions: &[Condition]| -> Vec<Condition> {
        conditions
            .iter()
            .filter(|c| c.key == "preferenceMode")
            .cloned()
            .collect()
    };
    let all = only_mode(&card.triggers.all);
    let any = only_mode(&card.triggers.any);
    let none = only_mode(&card.triggers.none);

    if !all.is_empty() && !all.iter().all(|c| language_condition_passes(lang, c)) {
        return false;
    }
    if !any.is_empty() && !any.iter().any(|c| language_condition_passes(lang, c)) {
        return false;
    }
    if !none.is_empty() && none.iter().any(|c| language_condition_passes(lang, c)) {
        return false;
    }
    true
}

// ── Resolution ────────────────────────────────────────────────────

/// Outcome of resolving a technique id against a KB and locale signals.
#[derive(Debug)]
pub struct LanguageResolution<'a> {
    pub inferred_language: Language,
    pub used_fallback_language: bool,
    pub resolved_id: Option<String>,
    pub tried_ids: Vec<String>,
    pub card: Option<&'a TechniqueCard>,
}

/// Resolve a requested technique id to the correctly-localized card.
pub fn resolve_for_language<'a>(
    id: &str,
    kb: &'a TechniqueKb,
    signals: &LocaleSignals,
) -> LanguageResolution<'a> {
    let inferred = infer_language(signals);
    let tried_ids = candidate_ids_for(id, inferred);
    let candidates: Vec<&TechniqueCard> = tried_ids
        .iter()
        .filter_map(|cid| kb.get(cid))
        .collect();

    if let Some(card) = candidates
        .iter()
        .copied()
        .find(|c| card_allows_language(c, inferred))
    {
        // A language-suffixed card in the other language is a fallback even
        // when its gate admits the request.
        let used_fallback_language = has_suffix(&card.id, inferred.other());
        return LanguageResolution {
            inferred_language: inferred,
            used_fallback_language,
            resolved_id: Some(card.id.clone()),
            tried_ids,
            card: Some(card),
        };
    }

    // Chinese requests get a second pass against English content.
    if inferred == Language::Zh
        && let Some(card) = candidates
            .iter()
            .copied()
            .find(|c| card_allows_language(c, Language::En))
    {
        return LanguageResolution {
            inferred_language: inferred,
            used_fallback_language: true,
            resolved_id: Some(card.id.clone()),
            tried_ids,
            card: Some(card),
        };
    }

    LanguageResolution {
        inferred_language: inferred,
        used_fallback_language: false,
        resolved_id: None,
        tried_ids,
        card: None,
    }
}
