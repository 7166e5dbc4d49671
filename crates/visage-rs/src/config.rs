//! Engine configuration.
//!
//! Every optional behavior in the engine is gated by an explicit
//! [`EngineConfig`] passed into the rule and render entry points — the
//! engine never reads the environment on its own. Deployments that still
//! configure through environment variables can call
//! [`EngineConfig::from_env()`] once at startup and hand the resulting
//! struct around.
//!
//! Defaults are conservative: everything is off except the starter content
//! overlay, which is on outside of production mode.

// ── Per-region activity slots ─────────────────────────────────────

/// Enable flags for the optional "activity" skeleton in each extended
/// region. When a slot is on (and extended regions are enabled), at most
/// one extra `choose_one` skeleton is appended for that region per request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivitySlots {
    pub prep: bool,
    pub contour: bool,
    pub brow: bool,
    pub blush: bool,
}

impl ActivitySlots {
    /// All slots enabled.
    pub fn all() -> Self {
        Self {
            prep: true,
            contour: true,
            brow: true,
            blush: true,
        }
    }

    /// Whether any slot is enabled.
    pub fn any(&self) -> bool {
        self.prep || self.contour || self.brow || self.blush
    }
}

// ── Engine config ─────────────────────────────────────────────────

/// Configuration for a personalization run.
///
/// Construct with [`Default`] and chain `with_*` builders, or use struct
/// update syntax for the less common fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Load the starter technique overlay on top of the canonical set.
    /// Overlay cards never shadow canonical ids. Default: `true`.
    pub starter_overlay: bool,
    /// Produce skeletons for the extended regions (prep, contour, brow,
    /// blush) in addition to the canonical three. Default: `false`.
    pub extended_regions: bool,
    /// Per-region activity-slot flags. Only consulted when
    /// `extended_regions` is on. Default: all off.
    pub activity_slots: ActivitySlots,
    /// Use trigger-based scoring to resolve `choose_one` candidate sets.
    /// When off, `choose_one` always resolves to the first declared
    /// candidate. Default: `false`.
    pub trigger_matching: bool,
    /// Emit per-candidate trigger-selection diagnostics at debug level.
    /// Default: `false`.
    pub debug_logging: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starter_overlay: true,
            extended_regions: false,
            activity_slots: ActivitySlots::default(),
            trigger_matching: false,
            debug_logging: false,
        }
    }
}

impl EngineConfig {
    /// Enable or disable the starter content overlay.
    pub fn with_starter_overlay(mut self, on: bool) -> Self {
        self.starter_overlay = on;
        self
    }

    /// Enable or disable extended-region output.
    pub fn with_extended_regions(mut self, on: bool) -> Self {
        self.extended_regions = on;
        self
    }

    /// Set the per-region activity slots.
    pub fn with_activity_slots(mut self, slots: ActivitySlots) -> Self {
        self.activity_slots = slots;
        self
    }

    /// Enable or disable trigger-based `choose_one` selection.
    pub fn with_trigger_matching(mut self, on: bool) -> Self {
        self.trigger_matching = on;
        self
    }

    /// Enable or disable trigger-selection diagnostics.
    pub fn with_debug_logging(mut self, on: bool) -> Self {
        self.debug_logging = on;
        self
    }

    /// Read the configuration from environment variables.
    ///
    /// `VISAGE_ENV=production` flips the starter-overlay default to off;
    /// `VISAGE_STARTER_KB` overrides it explicitly either way. The other
    /// flags (`VISAGE_EXTENDED_REGIONS`, `VISAGE_ACTIVITY_SLOTS`,
    /// `VISAGE_TRIGGER_MATCHING`, `VISAGE_DEBUG_TRIGGERS`) default to off.
    /// `VISAGE_ACTIVITY_SLOTS` enables all four slots at once.
    pub fn from_env() -> Self {
        let production = std::env::var("VISAGE_ENV")
            .map(|v| v.trim().eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let overlay_default = !production;
        let activity = env_flag("VISAGE_ACTIVITY_SLOTS").unwrap_or(false);

        Self {
            starter_overlay: env_flag("VISAGE_STARTER_KB").unwrap_or(overlay_default),
            extended_regions: env_flag("VISAGE_EXTENDED_REGIONS").unwrap_or(false),
            activity_slots: if activity {
                ActivitySlots::all()
            } else {
                ActivitySlots::default()
            },
            trigger_matching: env_flag("VISAGE_TRIGGER_MATCHING").unwrap_or(false),
            debug_logging: env_flag("VISAGE_DEBUG_TRIGGERS").unwrap_or(false),
        }
    }
}

/// Parse a boolean environment flag. Accepts `1/0`, `true/false`, `on/off`
/// (case-insensitive). Unset or unrecognized values return `None` so the
/// caller's default applies.
fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
