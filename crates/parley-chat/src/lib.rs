//! Conversational exchange pipeline for Parley.
//!
//! Classifies the latest turn, selects a prompt strategy, streams the
//! generated reply back to the caller and records each exchange in an
//! append-only log.

pub mod classifier;
pub mod decoder;
pub mod dialog;
pub mod error;
pub mod generation;
pub mod log_writer;
pub mod orchestrator;
pub mod pipeline;
pub mod strategy;

pub use classifier::{IntentClassifier, RasaClassifier};
pub use decoder::{collect_reply, TokenDecoder};
pub use dialog::build_dialog;
pub use error::{
    ChatError, ClassificationError, ConnectionError, DecodeError, LogWriteError, StreamError,
};
pub use generation::{ChunkStream, GenerationBackend, HttpGenerationClient};
pub use log_writer::{ExchangeLog, ExchangeSink};
pub use orchestrator::ChatBot;
pub use pipeline::{PipelineState, ResponseStream, StreamingPipeline};
pub use strategy::{build_prompt, PromptStrategy};
