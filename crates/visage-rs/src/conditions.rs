//! Typed boolean-condition language for content triggers.
//!
//! Conditions are authored into technique cards and evaluated against a
//! read-only [`EvalContext`] of four JSON roots plus the routing mode.
//! Evaluation is pure, deterministic, and closed-world: anything the
//! evaluator does not understand — an unknown operator, an unresolvable
//! key, a non-numeric operand to a numeric comparison — is simply `false`,
//! never an error.

use crate::inputs::{FaceProfile, LookSpec, SimilarityReport};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Condition DSL ─────────────────────────────────────────────────

/// Comparison operator for a [`Condition`]. Operators added to content
/// before this crate learns about them deserialize as [`ConditionOp::Unknown`]
/// and evaluate to `false`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    In,
    Between,
    Exists,
    #[serde(other)]
    Unknown,
}

/// A single authored condition: a dot-path key, an operator, and the
/// operator's operands. `value` serves `eq`/`neq`/`in` and the numeric
/// comparisons; `min`/`max` serve `between`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Condition {
    pub key: String,
    pub op: ConditionOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl Condition {
    /// A condition with only a key and operator (for `exists`).
    pub fn new(key: impl Into<String>, op: ConditionOp) -> Self {
        Self {
            key: key.into(),
            op,
            value: None,
            min: None,
            max: None,
        }
    }

    /// A condition comparing the key against a value.
    pub fn with_value(key: impl Into<String>, op: ConditionOp, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            op,
            value: Some(value.into()),
            min: None,
            max: None,
        }
    }
}

/// The `all`/`any`/`none` condition group gating a card or rule. An absent
/// clause is vacuously satisfied.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TriggerSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub none: Vec<Condition>,
}

impl TriggerSet {
    /// Total number of authored conditions across all clauses.
    pub fn condition_count(&self) -> usize {
        self.all.len() + self.any.len() + self.none.len()
    }

    /// Iterate every condition regardless of clause.
    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.all.iter().chain(self.any.iter()).chain(self.none.iter())
    }
}

// ── Evaluation context ────────────────────────────────────────────

/// Read-only context a condition's key resolves against. The four roots
/// are serialized snapshots of the request inputs; absent inputs resolve
/// as `null` so `exists` behaves as expected.
#[derive(Clone, Debug)]
pub struct EvalContext {
    look_spec: Value,
    user_face_profile: Value,
    ref_face_profile: Value,
    similarity_report: Value,
    preference_mode: Option<String>,
}

impl EvalContext {
    /// Snapshot the typed inputs into an evaluation context.
    pub fn new(
        look_spec: &LookSpec,
        user_face_profile: Option<&FaceProfile>,
        ref_face_profile: Option<&FaceProfile>,
        similarity_report: Option<&SimilarityReport>,
        preference_mode: Option<&str>,
    ) -> Result<Self, String> {
        let snapshot = |name: &str, v: Result<Value, serde_json::Error>| {
            v.map_err(|e| format!("failed to snapshot {name}: {e}"))
        };
        Ok(Self {
            look_spec: snapshot("lookSpec", serde_json::to_value(look_spec))?,
            user_face_profile: match user_face_profile {
                Some(p) => snapshot("userFaceProfile", serde_json::to_value(p))?,
                None => Value::Null,
            },
            ref_face_profile: match ref_face_profile {
                Some(p) => snapshot("refFaceProfile", serde_json::to_value(p))?,
                None => Value::Null,
            },
            similarity_report: match similarity_report {
                Some(r) => snapshot("similarityReport", serde_json::to_value(r))?,
                None => Value::Null,
            },
            preference_mode: preference_mode.map(|s| s.to_string()),
        })
    }

    /// Context with raw JSON roots. Used for routing contexts where the
    /// caller already holds serialized values.
    pub fn from_values(
        look_spec: Value,
        user_face_profile: Value,
        ref_face_profile: Value,
        similarity_report: Value,
        preference_mode: Option<String>,
    ) -> Self {
        Self {
            look_spec,
            user_face_profile,
            ref_face_profile,
            similarity_report,
            preference_mode,
        }
    }

    /// Resolve a condition key to a value.
    ///
    /// `preferenceMode` defaults to `"structure"` when the context carries
    /// none, so trigger matching never silently degrades to "nothing
    /// matched" on call sites that omit it.
    pub fn resolve_key(&self, key: &str) -> Option<Value> {
        if key == "preferenceMode" {
            let mode = self.preference_mode.as_deref().unwrap_or("structure");
            return Some(Value::String(mode.to_string()));
        }
        let (root, rest) = match key.split_once('.') {
            Some(parts) => parts,
            None => return None,
        };
        let root = match root {
            "lookSpec" => &self.look_spec,
            "userFaceProfile" => &self.user_face_profile,
            "refFaceProfile" => &self.ref_face_profile,
            "similarityReport" => &self.similarity_report,
            _ => return None,
        };
        get_by_path(root, rest).cloned()
    }
}

/// Walk a dot-path into a JSON value. Empty segments are skipped.
fn get_by_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in path.split('.').map(str::trim).filter(|p| !p.is_empty()) {
        current = current.get(part)?;
    }
    Some(current)
}

// ── Evaluation ────────────────────────────────────────────────────

/// Coerce a JSON value to a finite number. Strings parse; everything else
/// (and non-finite results) is `None`.
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Evaluate one condition against the context.
pub fn evaluate(ctx: &EvalContext, condition: &Condition) -> bool {
    let got = ctx.resolve_key(&condition.key);

    match condition.op {
        ConditionOp::Exists => matches!(got, Some(v) if !v.is_null()),
        ConditionOp::Lt | ConditionOp::Lte | ConditionOp::Gt | ConditionOp::Gte => {
            let left = got.as_ref().and_then(as_number);
            let right = condition.value.as_ref().and_then(as_number);
            match (left, right) {
                (Some(l), Some(r)) => match condition.op {
                    ConditionOp::Lt => l < r,
                    ConditionOp::Lte => l <= r,
                    ConditionOp::Gt => l > r,
                    ConditionOp::Gte => l >= r,
                    _ => unreachable!(),
                },
                _ => false,
            }
        }
        ConditionOp::Between => {
            let n = match got.as_ref().and_then(as_number) {
                Some(n) => n,
                None => return false,
            };
            match (condition.min, condition.max) {
                (Some(min), Some(max)) if min.is_finite() && max.is_finite() => {
                    n >= min && n <= max
                }
                _ => false,
            }
        }
        ConditionOp::Eq => match (&got, &condition.value) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        },
        ConditionOp::Neq => match (&got, &condition.value) {
            (Some(l), Some(r)) => l != r,
            // A missing key is not equal to any authored value.
            (None, Some(_)) => true,
            _ => false,
        },
        ConditionOp::In => {
            let list = match condition.value.as_ref().and_then(Value::as_array) {
                Some(list) => list,
                None => return false,
            };
            match got {
                Some(Value::Array(items)) => items.iter().any(|item| list.contains(item)),
                Some(ref scalar) => list.contains(scalar),
                None => false,
            }
        }
        ConditionOp::Unknown => false,
    }
}

/// Evaluate a trigger set: (`all` empty or every condition true) AND
/// (`any` empty or at least one true) AND (`none` empty or no condition
/// true).
pub fn trigger_set_passes(ctx: &EvalContext, triggers: &TriggerSet) -> bool {
    if !triggers.all.is_empty() && !triggers.all.iter().all(|c| evaluate(ctx, c)) {
        return false;
    }
    if !triggers.any.is_empty() && !triggers.any.iter().any(|c| evaluate(ctx, c)) {
        return false;
    }
    if !triggers.none.is_empty() && triggers.none.iter().any(|c| evaluate(ctx, c)) {
        return false;
    }
    true
}
