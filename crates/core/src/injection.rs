//! Per-request parameter injection.
//!
//! Injection happens in two steps so that a broken template is rejected
//! before anything touches the network:
//!
//! 1. [`ParameterInjector::resolve`] locates every required slot by title
//!    (and the optional sampler by kind), failing with
//!    [`CoreError::IncompleteTemplate`] naming every missing slot.
//! 2. [`ParameterInjector::inject`] writes the uploaded image reference,
//!    the prompt texts and a fresh random seed into the resolved nodes.

use std::fmt;

use rand::Rng;
use serde::Serialize;

use crate::error::CoreError;
use crate::resolver::{find_by_kind, find_by_title};
use crate::workflow::WorkflowGraph;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Input field holding the image reference on the image slot.
pub const IMAGE_FIELD: &str = "image";

/// Input field holding the prompt text on both prompt slots.
pub const TEXT_FIELD: &str = "text";

/// Input field holding the sampler seed.
pub const SEED_FIELD: &str = "seed";

/// Upper bound (inclusive) for injected seeds.
pub const MAX_SEED: u64 = 999_999_999_999_999;

/// Default node kind of the randomness-control slot.
pub const DEFAULT_SAMPLER_KIND: &str = "KSampler";

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// A required, title-addressed slot in the workflow template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Slot {
    Image,
    PositivePrompt,
    NegativePrompt,
    Output,
}

impl Slot {
    /// All required slots, in the order they are reported.
    pub const REQUIRED: [Slot; 4] = [
        Slot::Image,
        Slot::PositivePrompt,
        Slot::NegativePrompt,
        Slot::Output,
    ];

    /// Stable label used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            Slot::Image => "image",
            Slot::PositivePrompt => "positive-prompt",
            Slot::NegativePrompt => "negative-prompt",
            Slot::Output => "output",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Titles (and sampler kind) used to locate slots in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTitles {
    pub image: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub output: String,
    /// Located by kind rather than title since its label varies.
    pub sampler_kind: String,
}

impl Default for SlotTitles {
    fn default() -> Self {
        Self {
            image: "load_image".to_string(),
            positive_prompt: "positive_prompt".to_string(),
            negative_prompt: "negative_prompt".to_string(),
            output: "output_paths".to_string(),
            sampler_kind: DEFAULT_SAMPLER_KIND.to_string(),
        }
    }
}

impl SlotTitles {
    pub fn title(&self, slot: Slot) -> &str {
        match slot {
            Slot::Image => &self.image,
            Slot::PositivePrompt => &self.positive_prompt,
            Slot::NegativePrompt => &self.negative_prompt,
            Slot::Output => &self.output,
        }
    }
}

/// Node IDs of every slot found in one graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSlots {
    pub image: String,
    pub positive_prompt: String,
    pub negative_prompt: String,
    /// The node whose `executed` output carries the artifact path.
    pub output: String,
    pub sampler: Option<String>,
}

/// Values written into the graph for one request.
#[derive(Debug, Clone, Copy)]
pub struct InjectionParams<'a> {
    /// Reference name returned by the engine's upload endpoint.
    pub image_ref: &'a str,
    pub positive_prompt: &'a str,
    pub negative_prompt: &'a str,
}

// ---------------------------------------------------------------------------
// Injector
// ---------------------------------------------------------------------------

/// Resolves slots and writes per-request parameters into a graph.
#[derive(Debug, Clone, Default)]
pub struct ParameterInjector {
    titles: SlotTitles,
}

impl ParameterInjector {
    pub fn new(titles: SlotTitles) -> Self {
        Self { titles }
    }

    pub fn titles(&self) -> &SlotTitles {
        &self.titles
    }

    /// Locate every slot. Never partially succeeds: if any required slot
    /// is absent, all of the absent ones are reported together.
    pub fn resolve(&self, graph: &WorkflowGraph) -> Result<ResolvedSlots, CoreError> {
        let found = Slot::REQUIRED.map(|slot| find_by_title(graph, self.titles.title(slot)));

        let missing: Vec<Slot> = Slot::REQUIRED
            .iter()
            .zip(&found)
            .filter(|(_, id)| id.is_none())
            .map(|(slot, _)| *slot)
            .collect();

        let [Some(image), Some(positive_prompt), Some(negative_prompt), Some(output)] = found
        else {
            return Err(CoreError::IncompleteTemplate { missing });
        };

        let slots = ResolvedSlots {
            image,
            positive_prompt,
            negative_prompt,
            output,
            sampler: find_by_kind(graph, &self.titles.sampler_kind),
        };

        if slots.sampler.is_none() {
            tracing::warn!(
                kind = %self.titles.sampler_kind,
                "Sampler node not found; seed will not be randomized and results may be cached",
            );
        }

        Ok(slots)
    }

    /// Write the request parameters into `graph` using the thread RNG.
    ///
    /// Returns the injected seed, or `None` when the template has no
    /// sampler node.
    pub fn inject(
        &self,
        graph: &mut WorkflowGraph,
        slots: &ResolvedSlots,
        params: InjectionParams<'_>,
    ) -> Result<Option<u64>, CoreError> {
        self.inject_with_rng(graph, slots, params, &mut rand::rng())
    }

    /// Same as [`inject`](Self::inject) with a caller-supplied RNG.
    pub fn inject_with_rng<R: Rng + ?Sized>(
        &self,
        graph: &mut WorkflowGraph,
        slots: &ResolvedSlots,
        params: InjectionParams<'_>,
        rng: &mut R,
    ) -> Result<Option<u64>, CoreError> {
        graph.set_input(&slots.image, IMAGE_FIELD, params.image_ref)?;
        graph.set_input(&slots.positive_prompt, TEXT_FIELD, params.positive_prompt)?;
        graph.set_input(&slots.negative_prompt, TEXT_FIELD, params.negative_prompt)?;

        let Some(sampler) = slots.sampler.as_deref() else {
            return Ok(None);
        };

        // Identical graphs with an identical seed are memoized by the
        // engine and would return a stale artifact.
        let seed = rng.random_range(0..=MAX_SEED);
        graph.set_input(sampler, SEED_FIELD, seed)?;
        tracing::debug!(node_id = %sampler, seed, "Randomized sampler seed");

        Ok(Some(seed))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
