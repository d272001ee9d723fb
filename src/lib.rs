pub mod alignment;
pub mod config;
pub mod corpus;
pub mod error;
pub mod pipeline;
pub mod types;

pub use alignment::kaldi::{ExportedAlignment, JobMap, KaldiBridge};
pub use alignment::records::{AlignmentRecord, PosteriorFormat, RecordFormat};
pub use alignment::report::BatchReport;
pub use config::{AlignConfig, FailurePolicy, FrameConfig};
pub use corpus::{Lexicon, PhoneTable, Transcripts};
pub use error::AlignmentError;
pub use pipeline::builder::AlignmentPipelineBuilder;
pub use pipeline::runtime::{AlignmentPipeline, BatchInput, BatchOutput};
pub use pipeline::traits::{SequenceAligner, WordLabeler};
pub use types::{AlignedSegment, AlignmentLevel, FrameRun, Utterance, WordBoundaryTag, WordSegment};
