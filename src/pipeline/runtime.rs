use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::alignment::grouping::{
    apply_word_labels, group_into_words, ExpectedPhones, GreedyOutcome, WordLabels,
};
use crate::alignment::kaldi::{ExportedAlignment, KaldiBridge};
use crate::alignment::posterior::attach_posteriors;
use crate::alignment::records::AlignmentRecord;
use crate::alignment::report::BatchReport;
use crate::config::{AlignConfig, FailurePolicy};
use crate::corpus::{Lexicon, Transcripts};
use crate::error::AlignmentError;
use crate::pipeline::traits::{SequenceAligner, WordLabeler};
use crate::types::{Utterance, WordSegment};

/// One parsed alignment archive plus its optional posterior archive.
#[derive(Debug, Clone, Default)]
pub struct BatchInput {
    pub source_name: String,
    pub records: Vec<AlignmentRecord>,
    pub posteriors: Option<HashMap<String, Vec<f64>>>,
}

#[derive(Debug, Clone)]
pub struct BatchOutput {
    /// Converted utterances in input order, failed ones removed.
    pub utterances: Vec<Utterance>,
    pub words: Vec<WordSegment>,
    pub report: BatchReport,
}

pub struct AlignmentPipeline {
    config: AlignConfig,
    bridge: KaldiBridge,
    lexicon: Option<Lexicon>,
    transcripts: Option<Transcripts>,
    silences: HashSet<String>,
    word_labeler: Box<dyn WordLabeler>,
    sequence_aligner: Box<dyn SequenceAligner>,
    pool: ThreadPool,
}

pub(crate) struct AlignmentPipelineParts {
    pub config: AlignConfig,
    pub bridge: KaldiBridge,
    pub lexicon: Option<Lexicon>,
    pub transcripts: Option<Transcripts>,
    pub silences: HashSet<String>,
    pub word_labeler: Box<dyn WordLabeler>,
    pub sequence_aligner: Box<dyn SequenceAligner>,
    pub pool: ThreadPool,
}

impl AlignmentPipeline {
    pub(crate) fn from_parts(parts: AlignmentPipelineParts) -> Self {
        Self {
            config: parts.config,
            bridge: parts.bridge,
            lexicon: parts.lexicon,
            transcripts: parts.transcripts,
            silences: parts.silences,
            word_labeler: parts.word_labeler,
            sequence_aligner: parts.sequence_aligner,
            pool: parts.pool,
        }
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    pub fn silences(&self) -> &HashSet<String> {
        &self.silences
    }

    /// Import, time-stamp and word-label one alignment archive.
    pub fn process(&self, input: BatchInput) -> Result<BatchOutput, AlignmentError> {
        let mut report = BatchReport::new(
            self.config.level,
            self.config.jobs,
            self.config.failure_policy,
        );
        report.meta.sources.push(input.source_name.clone());
        report.counts.utterances_in = input.records.len();

        if self.config.with_posteriors && input.posteriors.is_none() {
            return Err(AlignmentError::invalid_input(format!(
                "{}: posteriors were requested but none were given",
                input.source_name
            )));
        }

        let mut utterances = Vec::with_capacity(input.records.len());
        for record in &input.records {
            match self.import_one(record, input.posteriors.as_ref()) {
                Ok(utterance) => utterances.push(utterance),
                Err(err) => self.handle_failure(&mut report, &record.utterance_id, err)?,
            }
        }

        let mut words = Vec::new();
        if self.config.level.needs_words() {
            if let (Some(lexicon), Some(transcripts)) = (&self.lexicon, &self.transcripts) {
                utterances = self.label_words(utterances, lexicon, transcripts, &mut report)?;
                for utterance in &utterances {
                    words.extend(group_into_words(utterance, &self.silences));
                }
            }
        }

        report.counts.utterances_out = utterances.len();
        report.counts.segments = utterances.iter().map(|u| u.segments.len()).sum();
        report.counts.words = words.len();

        tracing::info!(
            source = %input.source_name,
            utterances = utterances.len(),
            skipped = report.skipped.len(),
            dtw_fallbacks = report.dtw_fallbacks.len(),
            "alignment batch done"
        );

        Ok(BatchOutput {
            utterances,
            words,
            report,
        })
    }

    /// Convert canonical utterances back into per-frame phone codes.
    pub fn export(&self, utterances: &[Utterance]) -> Result<Vec<ExportedAlignment>, AlignmentError> {
        let mut exported = Vec::with_capacity(utterances.len());
        for utterance in utterances {
            match self.bridge.export(utterance) {
                Ok(alignment) => exported.push(alignment),
                Err(err) => {
                    if self.config.failure_policy == FailurePolicy::Abort {
                        return Err(err);
                    }
                    tracing::warn!(utterance = %utterance.id, error = %err, "skipping utterance at export");
                }
            }
        }
        Ok(exported)
    }

    fn import_one(
        &self,
        record: &AlignmentRecord,
        posteriors: Option<&HashMap<String, Vec<f64>>>,
    ) -> Result<Utterance, AlignmentError> {
        let mut utterance = self.bridge.import_record(record)?;
        if let Some(posteriors) = posteriors {
            let frame_posteriors = posteriors.get(&utterance.id).ok_or_else(|| {
                AlignmentError::consistency(&utterance.id, "no posteriors for utterance")
            })?;
            attach_posteriors(&utterance.id, &mut utterance.segments, frame_posteriors)?;
        }
        Ok(utterance)
    }

    fn handle_failure(
        &self,
        report: &mut BatchReport,
        utt_id: &str,
        err: AlignmentError,
    ) -> Result<(), AlignmentError> {
        match self.config.failure_policy {
            FailurePolicy::Abort => Err(err),
            FailurePolicy::Skip => {
                tracing::warn!(utterance = utt_id, error = %err, "skipping utterance");
                report.record_skip(utt_id, err.to_string());
                Ok(())
            }
        }
    }

    fn label_words(
        &self,
        mut utterances: Vec<Utterance>,
        lexicon: &Lexicon,
        transcripts: &Transcripts,
        report: &mut BatchReport,
    ) -> Result<Vec<Utterance>, AlignmentError> {
        let mut fallback = Vec::new();

        for (idx, utterance) in utterances.iter_mut().enumerate() {
            let Some(words) = transcripts.words(&utterance.id) else {
                tracing::debug!(utterance = %utterance.id, "no transcript; phones left unlabeled");
                report.counts.without_transcript += 1;
                continue;
            };
            let words = words.to_vec();

            let expected = ExpectedPhones::expand(&words, lexicon);
            if !expected.out_of_lexicon.is_empty() {
                let missing: Vec<&str> = expected
                    .out_of_lexicon
                    .iter()
                    .map(|&i| words[i].as_str())
                    .collect();
                tracing::debug!(utterance = %utterance.id, words = ?missing, "out-of-lexicon words");
                report.record_out_of_lexicon(missing);
            }

            let phones: Vec<&str> = utterance.segments.iter().map(|s| s.phone.as_str()).collect();
            match self
                .word_labeler
                .label_words(&phones, &words, lexicon, &self.silences)
            {
                GreedyOutcome::Labeled(labels) => {
                    apply_word_labels(&mut utterance.segments, &labels, &words);
                }
                GreedyOutcome::Overrun { words_completed } => {
                    tracing::debug!(
                        utterance = %utterance.id,
                        words_completed,
                        words = words.len(),
                        "greedy word labeling overran; falling back to edit distance"
                    );
                    fallback.push(idx);
                }
            }
            utterance.words = Some(words);
        }

        let results = self.run_fallback(&utterances, &fallback, lexicon);

        let mut failed = HashSet::new();
        for (idx, result) in fallback.into_iter().zip(results) {
            let utterance = &mut utterances[idx];
            report.dtw_fallbacks.push(utterance.id.clone());
            match result {
                Ok(labels) => {
                    let words = utterance.words.clone().unwrap_or_default();
                    apply_word_labels(&mut utterance.segments, &labels, &words);
                }
                Err(err) => {
                    self.handle_failure(report, &utterance.id, err)?;
                    failed.insert(idx);
                }
            }
        }

        if !report.dtw_fallbacks.is_empty() {
            tracing::info!(
                utterances = report.dtw_fallbacks.len(),
                "word boundaries recovered with edit-distance alignment"
            );
        }
        // One run-wide warning comes from the merged report.
        if !report.out_of_lexicon.is_empty() {
            tracing::debug!(
                distinct = report.out_of_lexicon.len(),
                occurrences = report.out_of_lexicon_total(),
                "out-of-lexicon words in this archive"
            );
        }

        Ok(utterances
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| !failed.contains(idx))
            .map(|(_, utterance)| utterance)
            .collect())
    }

    fn run_fallback(
        &self,
        utterances: &[Utterance],
        fallback: &[usize],
        lexicon: &Lexicon,
    ) -> Vec<Result<WordLabels, AlignmentError>> {
        if fallback.is_empty() {
            return Vec::new();
        }
        let aligner = self.sequence_aligner.as_ref();
        let silences = &self.silences;
        self.pool.install(|| {
            fallback
                .par_iter()
                .map(|&idx| {
                    let utterance = &utterances[idx];
                    let phones: Vec<&str> =
                        utterance.segments.iter().map(|s| s.phone.as_str()).collect();
                    let words = utterance.words.as_deref().unwrap_or_default();
                    aligner.align_words(&utterance.id, &phones, words, lexicon, silences)
                })
                .collect()
        })
    }
}
