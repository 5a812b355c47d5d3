//! Prompt strategy selection.
//!
//! Each strategy contributes a preamble; the transcript rendering is shared.
//! Strategies are keyed by intent name through [`STRATEGY_TABLE`]. Anything
//! not in the table, including an absent intent, uses [`PromptStrategy::Default`].

use parley_core::types::{Intent, Turn};

use crate::dialog::build_dialog;
use crate::error::ChatError;

const DEFAULT_PREAMBLE: &str = "This is a conversation between a user and a climate change denier. His beliefs are:

Climate change is a hoax.
All members of the green party are stupid.
All scientists are liars.

";

const HOSTILE_PREAMBLE: &str = "This is a conversation between a user and a climate change denier. The climate change denier is very angry and insults the user. His beliefs are:

    Climate change is a hoax.
    All members of the green party are stupid.
    All scientists are liars.

";

/// The closed set of prompt strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptStrategy {
    /// Used when the intent is absent or unmapped.
    Default,
    /// The user asserts the scientific consensus; the persona escalates.
    Hostile,
}

/// Intent name to strategy. Lookup is exact and case-sensitive.
pub const STRATEGY_TABLE: &[(&str, PromptStrategy)] = &[(
    "climate_change_is_a_scientific_fact",
    PromptStrategy::Hostile,
)];

impl PromptStrategy {
    /// Select the strategy for an intent, falling back to `Default`.
    pub fn for_intent(intent: Option<&Intent>) -> Self {
        intent
            .and_then(|i| {
                STRATEGY_TABLE
                    .iter()
                    .find(|(name, _)| *name == i.name)
                    .map(|(_, strategy)| *strategy)
            })
            .unwrap_or(PromptStrategy::Default)
    }

    pub fn preamble(self) -> &'static str {
        match self {
            PromptStrategy::Default => DEFAULT_PREAMBLE,
            PromptStrategy::Hostile => HOSTILE_PREAMBLE,
        }
    }
}

/// Build the final prompt for an exchange.
///
/// `session_id` is accepted so strategies can vary per session; none of the
/// current strategies use it. Fails only on an empty transcript.
pub fn build_prompt(
    turns: &[Turn],
    intent: Option<&Intent>,
    session_id: &str,
) -> Result<String, ChatError> {
    let strategy = PromptStrategy::for_intent(intent);
    tracing::debug!(?strategy, session_id, "Prompt strategy selected");

    let mut prompt = strategy.preamble().to_string();
    prompt.push_str(&build_dialog(turns)?);
    Ok(prompt)
}
