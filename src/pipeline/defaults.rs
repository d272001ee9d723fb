use std::collections::HashSet;

use crate::alignment::dtw::label_words_dtw;
use crate::alignment::grouping::{label_words_greedy, GreedyOutcome, WordLabels};
use crate::corpus::Lexicon;
use crate::error::AlignmentError;
use crate::pipeline::traits::{SequenceAligner, WordLabeler};

pub struct GreedyWordLabeler;

impl WordLabeler for GreedyWordLabeler {
    fn label_words(
        &self,
        phones: &[&str],
        words: &[String],
        lexicon: &Lexicon,
        silences: &HashSet<String>,
    ) -> GreedyOutcome {
        label_words_greedy(phones, words, lexicon, silences)
    }
}

pub struct EditDistanceAligner;

impl SequenceAligner for EditDistanceAligner {
    fn align_words(
        &self,
        utterance_id: &str,
        phones: &[&str],
        words: &[String],
        lexicon: &Lexicon,
        silences: &HashSet<String>,
    ) -> Result<WordLabels, AlignmentError> {
        label_words_dtw(utterance_id, phones, words, lexicon, silences)
    }
}
