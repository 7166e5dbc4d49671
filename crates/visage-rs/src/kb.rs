//! Technique knowledge base: loading, validation, and indexing.
//!
//! A [`TechniqueKb`] is the loaded card set for one (market, overlay)
//! combination. The canonical content set always loads first; when the
//! starter overlay is enabled, overlay cards are added only for ids the
//! canonical set does not already define — canonical content is never
//! shadowed. Content is static per deployment, so a loaded KB is immutable
//! and safe to share across concurrent requests.
//!
//! Loading fails fast: a schema-invalid card, a card declaring a different
//! market than the set it was loaded into, or a duplicate id within one
//! load are configuration errors, not recoverable per-request conditions.
//!
//! Caching is explicit: a [`KbCache`] is a constructed, passed-in handle,
//! so tests can build isolated KBs without cache bleed between overlay-on
//! and overlay-off runs.

pub mod resolver;
pub mod selector;

use crate::conditions::TriggerSet;
use crate::inputs::{ImpactArea, Market};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

// ── Card types ────────────────────────────────────────────────────

/// The user-facing action content of a technique card. Steps may contain
/// `{{variable}}` placeholders expanded at render time.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ActionTemplate {
    pub title: String,
    pub steps: Vec<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// An immutable, addressable content unit describing concrete steps for
/// one region. Bilingual cards share a base id with a `-en`/`-zh` suffix.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TechniqueCard {
    pub market: Market,
    pub id: String,
    pub area: ImpactArea,
    #[serde(default)]
    pub difficulty: f64,
    #[serde(default)]
    pub triggers: TriggerSet,
    pub action_template: ActionTemplate,
    #[serde(default)]
    pub rationale_template: Vec<String>,
    #[serde(default)]
    pub product_role_hints: Vec<String>,
    #[serde(default)]
    pub safety_notes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ── Embedded content ──────────────────────────────────────────────

const US_TECHNIQUES: &str = include_str!("../content/us/techniques.json");
const US_TECHNIQUES_STARTER: &str = include_str!("../content/us/techniques_starter.json");
const JP_TECHNIQUES: &str = include_str!("../content/jp/techniques.json");
const JP_TECHNIQUES_STARTER: &str = include_str!("../content/jp/techniques_starter.json");

fn builtin_sources(market: Market) -> (&'static str, &'static str) {
    match market {
        Market::Us => (US_TECHNIQUES, US_TECHNIQUES_STARTER),
        Market::Jp => (JP_TECHNIQUES, JP_TECHNIQUES_STARTER),
    }
}

// ── Knowledge base ────────────────────────────────────────────────

/// The loaded, indexed card set for one (market, overlay) combination.
#[derive(Debug)]
pub struct TechniqueKb {
    market: Market,
    overlay_enabled: bool,
    list: Vec<TechniqueCard>,
    by_index: HashMap<String, usize>,
}

impl TechniqueKb {
    /// Build a KB from parsed card sets. The overlay, when present, only
    /// contributes ids absent from the canonical set.
    pub fn from_sets(
        market: Market,
        canonical: Vec<TechniqueCard>,
        overlay: Option<Vec<TechniqueCard>>,
    ) -> Result<Self, String> {
        let mut kb = Self {
            market,
            overlay_enabled: overlay.is_some(),
            list: Vec::new(),
            by_index: HashMap::new(),
        };

        for card in canonical {
            validate_card(&card, market)?;
            if kb.by_index.contains_key(&card.id) {
                return Err(format!(
                    "duplicate technique id '{}' in canonical {market} content",
                    card.id
                ));
            }
            kb.by_index.insert(card.id.clone(), kb.list.len());
            kb.list.push(card);
        }

        if let Some(overlay) = overlay {
            let mut seen_overlay = std::collections::HashSet::new();
            for card in overlay {
                validate_card(&card, market)?;
                if !seen_overlay.insert(card.id.clone()) {
                    return Err(format!(
                        "duplicate technique id '{}' in starter {market} content",
                        card.id
                    ));
                }
                if kb.by_index.contains_key(&card.id) {
                    debug!("starter card '{}' shadowed by canonical content, skipped", card.id);
                    continue;
                }
                kb.by_index.insert(card.id.clone(), kb.list.len());
                kb.list.push(card);
            }
        }

        debug!(
            "Loaded {} KB: {} cards (overlay {})",
            market,
            kb.list.len(),
            if kb.overlay_enabled { "on" } else { "off" },
        );
        Ok(kb)
    }

    /// Load the content shipped inside the crate.
    pub fn builtin(market: Market, overlay_enabled: bool) -> Result<Self, String> {
        let (canonical_src, starter_src) = builtin_sources(market);
        let canonical = parse_cards(canonical_src, "builtin canonical")?;
        let overlay = if overlay_enabled {
            Some(parse_cards(starter_src, "builtin starter")?)
        } else {
            None
        };
        Self::from_sets(market, canonical, overlay)
    }

    /// Load content from a directory containing `techniques.json` and,
    /// optionally, `techniques_starter.json`. A missing starter file with
    /// the overlay enabled is not an error — the overlay is simply empty.
    pub fn load_dir(market: Market, dir: &Path, overlay_enabled: bool) -> Result<Self, String> {
        let canonical_path = dir.join("techniques.json");
        let canonical_src = std::fs::read_to_string(&canonical_path)
            .map_err(|e| format!("failed to read {}: {e}", canonical_path.display()))?;
        let canonical = parse_cards(&canonical_src, &canonical_path.display().to_string())?;

        let overlay = if overlay_enabled {
            let starter_path = dir.join("techniques_starter.json");
            if starter_path.exists() {
                let starter_src = std::fs::read_to_string(&starter_path)
                    .map_err(|e| format!("failed to read {}: {e}", starter_path.display()))?;
                Some(parse_cards(&starter_src, &starter_path.display().to_string())?)
            } else {
                Some(Vec::new())
            }
        } else {
            None
        };
        Self::from_sets(market, canonical, overlay)
    }

    /// The market this KB was loaded for.
    pub fn market(&self) -> Market {
        self.market
    }

    /// Whether the starter overlay was part of this load.
    pub fn overlay_enabled(&self) -> bool {
        self.overlay_enabled
    }

    /// Look up a card by exact id.
    pub fn get(&self, id: &str) -> Option<&TechniqueCard> {
        self.by_index.get(id).map(|&i| &self.list[i])
    }

    /// All cards in load order (canonical first, then overlay additions).
    pub fn list(&self) -> &[TechniqueCard] {
        &self.list
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

/// Parse a JSON array of cards, attributing errors to the source.
pub fn parse_cards(src: &str, source: &str) -> Result<Vec<TechniqueCard>, String> {
    serde_json::from_str(src).map_err(|e| format!("invalid technique content in {source}: {e}"))
}

fn validate_card(card: &TechniqueCard, market: Market) -> Result<(), String> {
    if card.id.trim().is_empty() {
        return Err(format!("technique card with empty id in {market} content"));
    }
    if card.market != market {
        return Err(format!(
            "technique card '{}' declares market {} but was loaded into {market}",
            card.id, card.market
        ));
    }
    if card.action_template.title.trim().is_empty() {
        return Err(format!("technique card '{}' has an empty title", card.id));
    }
    if card.action_template.steps.iter().all(|s| s.trim().is_empty()) {
        return Err(format!("technique card '{}' has no usable steps", card.id));
    }
    Ok(())
}

// ── Cache handle ──────────────────────────────────────────────────

/// Explicitly constructed cache of loaded KBs, keyed by (market, overlay).
/// Populated lazily, read-only after population; the `Arc`s it hands out
/// stay valid for the process lifetime. Share one per process (or one per
/// test) — there is deliberately no global instance.
#[derive(Debug, Default)]
pub struct KbCache {
    entries: Mutex<HashMap<(Market, bool), Arc<TechniqueKb>>>,
}

impl KbCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the builtin KB for a (market, overlay) pair, loading it on
    /// first use.
    pub fn get_or_load(&self, market: Market, overlay_enabled: bool) -> Result<Arc<TechniqueKb>, String> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| "KB cache lock poisoned".to_string())?;
        if let Some(kb) = entries.get(&(market, overlay_enabled)) {
            return Ok(Arc::clone(kb));
        }
        let kb = Arc::new(TechniqueKb::builtin(market, overlay_enabled)?);
        entries.insert((market, overlay_enabled), Arc::clone(&kb));
        Ok(kb)
    }

    /// Seed the cache with a pre-built KB (custom content, tests). The KB's
    /// own market/overlay identity keys the entry.
    pub fn insert(&self, kb: TechniqueKb) -> Result<Arc<TechniqueKb>, String> {
        let key = (kb.market(), kb.overlay_enabled());
        let kb = Arc::new(kb);
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| "KB cache lock poisoned".to_string())?;
        entries.insert(key, Arc::clone(&kb));
        Ok(kb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: &str, market: Market, area: ImpactArea) -> TechniqueCard {
        TechniqueCard {
            market,
            id: id.to_string(),
            area,
            difficulty: 0.2,
            triggers: TriggerSet::default(),
            action_template: ActionTemplate {
                title: format!("{id} title"),
                steps: vec![format!("{id} step one.")],
                variables: HashMap::new(),
            },
            rationale_template: Vec::new(),
            product_role_hints: Vec::new(),
            safety_notes: Vec::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn canonical_loads_and_indexes() {
        let kb = TechniqueKb::from_sets(
            Market::Us,
            vec![card("T_A", Market::Us, ImpactArea::Base)],
            None,
        )
        .unwrap();
        assert_eq!(kb.len(), 1);
        assert!(kb.get("T_A").is_some());
        assert!(kb.get("T_B").is_none());
    }

    #[test]
    fn duplicate_canonical_id_fails_fast() {
        let err = TechniqueKb::from_sets(
            Market::Us,
            vec![
                card("T_A", Market::Us, ImpactArea::Base),
                card("T_A", Market::Us, ImpactArea::Base),
            ],
            None,
        )
        .unwrap_err();
        assert!(err.contains("duplicate technique id 'T_A'"));
    }

    #[test]
    fn market_mismatch_fails_fast() {
        let err = TechniqueKb::from_sets(
            Market::Us,
            vec![card("T_A", Market::Jp, ImpactArea::Base)],
            None,
        )
        .unwrap_err();
        assert!(err.contains("declares market JP"));
    }

    #[test]
    fn overlay_never_shadows_canonical() {
        let mut canonical = card("T_A", Market::Us, ImpactArea::Base);
        canonical.action_template.title = "canonical".to_string();
        let mut overlay = card("T_A", Market::Us, ImpactArea::Base);
        overlay.action_template.title = "starter".to_string();

        let kb = TechniqueKb::from_sets(
            Market::Us,
            vec![canonical],
            Some(vec![overlay, card("T_B", Market::Us, ImpactArea::Eye)]),
        )
        .unwrap();
        assert_eq!(kb.len(), 2);
        assert_eq!(kb.get("T_A").unwrap().action_template.title, "canonical");
        assert!(kb.get("T_B").is_some());
    }

    #[test]
    fn builtin_us_content_is_valid() {
        let kb = TechniqueKb::builtin(Market::Us, true).unwrap();
        assert!(!kb.is_empty());
        // Overlay-off load is a strict subset.
        let bare = TechniqueKb::builtin(Market::Us, false).unwrap();
        assert!(bare.len() <= kb.len());
        for card in bare.list() {
            assert!(kb.get(&card.id).is_some());
        }
    }

    #[test]
    fn builtin_bilingual_pairing_holds() {
        // Every -en id has a -zh twin and vice versa, in both markets and
        // both content sets.
        for market in [Market::Us, Market::Jp] {
            let kb = TechniqueKb::builtin(market, true).unwrap();
            for card in kb.list() {
                if let Some(base) = card.id.strip_suffix("-en") {
                    assert!(
                        kb.get(&format!("{base}-zh")).is_some(),
                        "missing zh pair for {}",
                        card.id
                    );
                } else if let Some(base) = card.id.strip_suffix("-zh") {
                    assert!(
                        kb.get(&format!("{base}-en")).is_some(),
                        "missing en pair for {}",
                        card.id
                    );
                }
            }
        }
    }

    #[test]
    fn load_dir_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cards = vec![card("T_A", Market::Us, ImpactArea::Base)];
        std::fs::write(
            dir.path().join("techniques.json"),
            serde_json::to_string(&cards).unwrap(),
        )
        .unwrap();
        // Overlay enabled but no starter file: empty overlay, not an error.
        let kb = TechniqueKb::load_dir(Market::Us, dir.path(), true).unwrap();
        assert_eq!(kb.len(), 1);
        assert!(kb.overlay_enabled());
    }

    #[test]
    fn cache_is_keyed_by_market_and_overlay() {
        let cache = KbCache::new();
        let with_overlay = cache.get_or_load(Market::Us, true).unwrap();
        let without = cache.get_or_load(Market::Us, false).unwrap();
        assert!(with_overlay.len() >= without.len());
        // Repeated gets return the same instance.
        let again = cache.get_or_load(Market::Us, true).unwrap();
        assert!(Arc::ptr_eq(&with_overlay, &again));
    }
}
