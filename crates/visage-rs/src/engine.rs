//! The personalization engine: rules → KB → render → rephrase.
//!
//! [`PersonalizationEngine`] owns the loaded-content cache, the engine
//! configuration, and (optionally) an LLM client for the rephrasing pass.
//! The pipeline is deterministic end to end; the LLM only restyles final
//! text, and only for the canonical regions. Extended-region adjustments
//! always ship with their deterministic wording.

use crate::conditions::EvalContext;
use crate::config::EngineConfig;
use crate::inputs::{
    FaceProfile, LocaleSignals, LookSpec, Market, PreferenceMode, SimilarityReport,
};
use crate::kb::KbCache;
use crate::llm::LlmClient;
use crate::render::render;
use crate::rephrase::{Adjustment, adjustment_from_skeleton, rephrase_adjustments};
use crate::rules::{RenderedSkeleton, RuleContext, select_skeletons};
use std::sync::Arc;
use tracing::{debug, info};

/// One personalization request: the reference look, the user's signals, and
/// whatever similarity analysis is available. Optional inputs degrade
/// confidence, never fail the request.
#[derive(Clone, Debug, Default)]
pub struct PersonalizeRequest {
    pub market: Market,
    pub signals: LocaleSignals,
    pub preference_mode: PreferenceMode,
    pub look_spec: LookSpec,
    pub user_face: Option<FaceProfile>,
    pub ref_face: Option<FaceProfile>,
    pub similarity: Option<SimilarityReport>,
}

/// The engine's final output.
#[derive(Debug)]
pub struct PersonalizationOutput {
    /// Canonical-region adjustments (base, eye, lip), possibly rephrased.
    pub adjustments: Vec<Adjustment>,
    /// Extended-region adjustments, always deterministic.
    pub extended: Vec<Adjustment>,
    /// Every rendered skeleton, for callers that want the structured form.
    pub skeletons: Vec<RenderedSkeleton>,
    pub warnings: Vec<String>,
    /// True when any region fell back to its safe steps or a rephrasing
    /// pass was rejected.
    pub used_fallback: bool,
}

/// The engine. Cheap to share behind an `Arc`; all per-request state lives
/// in the request.
pub struct PersonalizationEngine {
    kb_cache: Arc<KbCache>,
    config: EngineConfig,
    client: Option<LlmClient>,
}

impl PersonalizationEngine {
    pub fn new(kb_cache: Arc<KbCache>, config: EngineConfig) -> Self {
        Self {
            kb_cache,
            config,
            client: None,
        }
    }

    /// Attach an LLM client for the rephrasing pass. Without one, output
    /// ships with deterministic wording.
    pub fn with_client(mut self, client: LlmClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Attach a client from `OPENROUTER_KEY` if the variable is set.
    pub fn with_env_client(mut self) -> Self {
        match LlmClient::from_env() {
            Ok(client) => self.client = Some(client),
            Err(e) => info!("rephrasing disabled: {e}"),
        }
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the deterministic pipeline: rule selection, content resolution,
    /// rendering, and adjustment assembly. No LLM involvement.
    pub fn personalize_deterministic(
        &self,
        request: &PersonalizeRequest,
    ) -> Result<PersonalizationOutput, String> {
        let kb = self
            .kb_cache
            .get_or_load(request.market, self.config.starter_overlay)?;

        let rule_ctx = RuleContext {
            market: request.market,
            look_spec: &request.look_spec,
            user_face: request.user_face.as_ref(),
            ref_face: request.ref_face.as_ref(),
            similarity: request.similarity.as_ref(),
            preference_mode: request.preference_mode,
        };
        let drafts = select_skeletons(&rule_ctx, &self.config);
        debug!(
            "selected {} skeletons for {} ({})",
            drafts.len(),
            request.market,
            request.preference_mode.as_str(),
        );

        let eval_ctx = EvalContext::new(
            &request.look_spec,
            request.user_face.as_ref(),
            request.ref_face.as_ref(),
            request.similarity.as_ref(),
            Some(request.preference_mode.as_str()),
        )?;
        let rendered = render(&drafts, &kb, &eval_ctx, &request.signals, &self.config);

        let adjustments = rendered
            .skeletons
            .iter()
            .map(adjustment_from_skeleton)
            .collect();
        let extended = rendered
            .all_skeletons
            .iter()
            .filter(|s| !s.impact_area.is_canonical())
            .map(adjustment_from_skeleton)
            .collect();

        Ok(PersonalizationOutput {
            adjustments,
            extended,
            skeletons: rendered.all_skeletons,
            warnings: rendered.warnings,
            used_fallback: rendered.used_fallback,
        })
    }

    /// Run the full pipeline, including the LLM rephrasing pass when a
    /// client is attached. A rejected or failed rephrase falls back to the
    /// deterministic wording with a warning.
    pub async fn personalize(
        &self,
        request: &PersonalizeRequest,
    ) -> Result<PersonalizationOutput, String> {
        let mut output = self.personalize_deterministic(request)?;

        if let Some(client) = &self.client {
            let outcome = rephrase_adjustments(
                client,
                std::mem::take(&mut output.adjustments),
                &request.signals,
            )
            .await;
            output.adjustments = outcome.adjustments;
            output.warnings.extend(outcome.warnings);
            output.used_fallback |= outcome.used_fallback;
        }
        Ok(output)
    }
}
