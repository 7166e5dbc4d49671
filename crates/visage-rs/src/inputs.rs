//! Typed inputs from upstream collaborators.
//!
//! The engine consumes a look specification, an optional pair of face
//! profiles, and an optional similarity report. All three are produced and
//! schema-validated elsewhere — this module only types them for serde so
//! rules can read them and the condition evaluator can walk their
//! serialized form. Field names serialize in camelCase because evidence
//! keys and condition paths are authored against the wire shape
//! (e.g. `userFaceProfile.geometry.eyeTiltDeg`).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Shared enums ──────────────────────────────────────────────────

/// Deployment market for content addressing.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Market {
    #[default]
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "JP")]
    Jp,
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Market::Us => write!(f, "US"),
            Market::Jp => write!(f, "JP"),
        }
    }
}

/// One of the seven face regions. `base`, `eye`, and `lip` are canonical
/// (always produced); the rest are extended (config-gated additions).
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ImpactArea {
    Base,
    Eye,
    Lip,
    Prep,
    Contour,
    Brow,
    Blush,
}

impl ImpactArea {
    /// The canonical regions, in output order.
    pub const CANONICAL: [ImpactArea; 3] = [ImpactArea::Base, ImpactArea::Eye, ImpactArea::Lip];

    /// The extended regions, in output order.
    pub const EXTENDED: [ImpactArea; 4] = [
        ImpactArea::Prep,
        ImpactArea::Contour,
        ImpactArea::Brow,
        ImpactArea::Blush,
    ];

    pub fn is_canonical(&self) -> bool {
        Self::CANONICAL.contains(self)
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactArea::Base => "base",
            ImpactArea::Eye => "eye",
            ImpactArea::Lip => "lip",
            ImpactArea::Prep => "prep",
            ImpactArea::Contour => "contour",
            ImpactArea::Brow => "brow",
            ImpactArea::Blush => "blush",
        }
    }
}

impl std::fmt::Display for ImpactArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Confidence attached to a skeleton or adjustment.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// The user's routing mode. Doubles as a generic routing knob in technique
/// triggers, where content may also gate on it as a language flag.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceMode {
    #[default]
    Structure,
    Vibe,
    Ease,
}

impl PreferenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceMode::Structure => "structure",
            PreferenceMode::Vibe => "vibe",
            PreferenceMode::Ease => "ease",
        }
    }
}

impl std::fmt::Display for PreferenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Look specification ────────────────────────────────────────────

/// Liner direction extracted from the reference eye look.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinerDirection {
    Down,
    Straight,
    Up,
    #[default]
    Unknown,
}

/// Per-region intent extracted from the reference image.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RegionSpec {
    pub intent: String,
    pub finish: String,
    pub coverage: String,
    pub key_notes: Vec<String>,
    pub evidence: Vec<String>,
}

/// Eye region intent, with the liner-direction sub-field.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EyeRegionSpec {
    pub intent: String,
    pub finish: String,
    pub coverage: String,
    pub liner_direction: LinerDirection,
    pub key_notes: Vec<String>,
    pub evidence: Vec<String>,
}

/// Per-region breakdown of the reference look.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LookBreakdown {
    pub base: RegionSpec,
    pub eye: EyeRegionSpec,
    pub lip: RegionSpec,
}

/// The reference look description, consumed as an opaque, already-validated
/// value.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LookSpec {
    pub breakdown: LookBreakdown,
    pub key_notes: Vec<String>,
    pub evidence: Vec<String>,
}

// ── Face profiles ─────────────────────────────────────────────────

/// Capture quality for a face profile. A profile below `MIN_QUALITY_SCORE`
/// (or with `valid = false`) forces low confidence on every skeleton.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileQuality {
    pub valid: bool,
    pub score: f64,
}

/// Minimum quality score for a profile to count as reliable.
pub const MIN_QUALITY_SCORE: f64 = 70.0;

/// Numeric face geometry signals.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FaceGeometry {
    pub eye_tilt_deg: f64,
    pub eye_openness_ratio: f64,
    pub lip_fullness_ratio: f64,
    pub face_length_ratio: f64,
}

/// Categorical face attributes and declared user signals.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FaceCategorical {
    pub face_shape: Option<String>,
    pub eye_shape: Option<String>,
    pub lip_type: Option<String>,
    /// Declared preference signal, not a derived trait.
    pub needs_oil_control: Option<bool>,
}

/// A face profile (user selfie or reference), consumed as an opaque,
/// already-validated value.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FaceProfile {
    pub quality: ProfileQuality,
    pub geometry: FaceGeometry,
    pub categorical: FaceCategorical,
}

impl FaceProfile {
    /// Whether this profile is good enough to support medium confidence.
    pub fn is_reliable(&self) -> bool {
        self.quality.valid && self.quality.score >= MIN_QUALITY_SCORE
    }
}

// ── Similarity report ─────────────────────────────────────────────

/// One entry in the similarity report's top-delta list. Carries its own
/// severity and evidence pointers, which rules prefer over recomputing a
/// raw geometric difference.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TopDelta {
    pub key: String,
    pub severity: f64,
    pub explanation_key: String,
    pub evidence: Vec<String>,
}

/// Per-region look-difference flag from the similarity report.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LookDiffField {
    pub user: String,
    pub target: String,
    pub needs_change: bool,
}

/// The similarity report, consumed as an opaque, already-validated value.
/// `look_diff` is keyed by extended-region name (`contour`, `brow`, ...).
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SimilarityReport {
    pub fit_score: f64,
    pub top_deltas: Vec<TopDelta>,
    pub look_diff: BTreeMap<String, LookDiffField>,
}

impl SimilarityReport {
    /// The first top-delta whose key ends with the given suffix.
    pub fn top_delta_for(&self, key_suffix: &str) -> Option<&TopDelta> {
        self.top_deltas.iter().find(|d| d.key.ends_with(key_suffix))
    }

    /// Whether the report flags the given extended region as needing a
    /// change.
    pub fn needs_change(&self, area: ImpactArea) -> bool {
        self.look_diff
            .get(area.as_str())
            .map(|d| d.needs_change)
            .unwrap_or(false)
    }
}

// ── Locale signals ────────────────────────────────────────────────

/// Locale hints used by the language/market card resolver, in ascending
/// priority order from bottom to top.
#[derive(Clone, Debug, Default)]
pub struct LocaleSignals {
    /// Explicit per-user language override. Highest priority.
    pub user_language: Option<String>,
    /// Application-level language selection.
    pub app_language: Option<String>,
    /// Request locale (e.g. `zh-CN`, `en-US`, `ja`).
    pub locale: Option<String>,
    /// Raw `Accept-Language`-style header. Lowest priority.
    pub accept_language: Option<String>,
}

impl LocaleSignals {
    /// Signals carrying only a locale string.
    pub fn from_locale(locale: impl Into<String>) -> Self {
        Self {
            locale: Some(locale.into()),
            ..Default::default()
        }
    }
}
