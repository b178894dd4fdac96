// src/synthesis/mod.rs
pub mod extractor;
pub mod pipeline;
pub mod queue;
pub mod types;

pub use extractor::{ExtractorProvider, HttpExtractorProvider, LlmExtractor};
pub use pipeline::SynthesisPipeline;
pub use queue::{QueueEvent, SynthesisQueue};
pub use types::{
    Contradiction, ContradictionResolution, ExtractedFact, ExtractionResult, JobPriority,
    JobStatus, SynthesisJob, SynthesisResult,
};
