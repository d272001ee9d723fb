use std::collections::HashSet;

use crate::alignment::grouping::{GreedyOutcome, WordLabels};
use crate::corpus::Lexicon;
use crate::error::AlignmentError;

/// First-pass word labeling over the phone sequence of one utterance.
pub trait WordLabeler: Send + Sync {
    fn label_words(
        &self,
        phones: &[&str],
        words: &[String],
        lexicon: &Lexicon,
        silences: &HashSet<String>,
    ) -> GreedyOutcome;
}

/// Fallback labeling used when the first pass cannot place every word.
/// Runs on the worker pool, one utterance per call.
pub trait SequenceAligner: Send + Sync {
    fn align_words(
        &self,
        utterance_id: &str,
        phones: &[&str],
        words: &[String],
        lexicon: &Lexicon,
        silences: &HashSet<String>,
    ) -> Result<WordLabels, AlignmentError>;
}
