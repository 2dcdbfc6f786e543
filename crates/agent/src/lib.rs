//! Call Turn Runtime - classification and turn orchestration for inbound calls
//!
//! This crate is the part of parley that talks to the language model and drives a call:
//! - Classifies caller replies into structured judgments (`classifier`)
//! - Reaches hosted or local models over HTTP (`llm`)
//! - Serializes turns per caller (`locks`)
//! - Runs one turn end to end against the call store (`runtime`)
//!
//! # Turn loop
//!
//! 1. **Lookup** - find the caller's conversation pending clarification, if any
//! 2. **Judge** - ask the classifier whether the reply accepts, declines or is unclear
//! 3. **Decide** - apply the call flow transition from `parley_core::flows`
//! 4. **Record** - insert or amend exactly one call record and answer with one prompt
//!
//! # Safety Principle
//!
//! The model only labels utterances. Dispositions, retry policy and scripts are decided
//! deterministically by the flow and the configured offer.

pub mod classifier;
pub mod llm;
pub mod locks;
pub mod runtime;

pub use classifier::{
    CallClassifier, ConfirmationJudgment, InitialIntentJudgment, LlmClassifier,
    CONFIRMATION_CONFIDENCE_FLOOR,
};
pub use llm::{HttpLlmClient, LlmClient};
pub use runtime::{CallTurnRuntime, TurnError, TurnInput, TurnOutcome, TurnResponse, TurnSettings};
