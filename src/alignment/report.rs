use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::FailurePolicy;
use crate::types::AlignmentLevel;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Summary of one batch run, written next to the alignment output.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub schema_version: u32,
    pub meta: ReportMeta,
    pub counts: BatchCounts,
    pub dtw_fallbacks: Vec<String>,
    pub skipped: Vec<SkippedUtterance>,
    /// Out-of-lexicon words and how many times each was met.
    pub out_of_lexicon: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub generated_at: String,
    pub level: AlignmentLevel,
    pub jobs: usize,
    pub failure_policy: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    pub utterances_in: usize,
    pub utterances_out: usize,
    pub segments: usize,
    pub words: usize,
    pub without_transcript: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedUtterance {
    pub utterance: String,
    pub reason: String,
}

impl BatchReport {
    pub fn new(level: AlignmentLevel, jobs: usize, failure_policy: FailurePolicy) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            meta: ReportMeta {
                generated_at: chrono::Utc::now().to_rfc3339(),
                level,
                jobs,
                failure_policy: failure_policy.as_str().to_string(),
                sources: Vec::new(),
            },
            counts: BatchCounts::default(),
            dtw_fallbacks: Vec::new(),
            skipped: Vec::new(),
            out_of_lexicon: BTreeMap::new(),
        }
    }

    pub fn record_skip(&mut self, utterance: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedUtterance {
            utterance: utterance.into(),
            reason: reason.into(),
        });
    }

    pub fn record_out_of_lexicon<'a>(&mut self, words: impl IntoIterator<Item = &'a str>) {
        for word in words {
            *self.out_of_lexicon.entry(word.to_string()).or_default() += 1;
        }
    }

    pub fn out_of_lexicon_total(&self) -> usize {
        self.out_of_lexicon.values().sum()
    }

    /// Emit the single out-of-lexicon warning for a whole run. Returns whether
    /// anything was reported.
    pub fn log_out_of_lexicon_summary(&self) -> bool {
        if self.out_of_lexicon.is_empty() {
            return false;
        }
        tracing::warn!(
            distinct = self.out_of_lexicon.len(),
            occurrences = self.out_of_lexicon_total(),
            "transcript words missing from the lexicon were left unlabeled"
        );
        true
    }

    /// Fold another partial report (another input shard) into this one.
    pub fn merge(&mut self, other: BatchReport) {
        self.meta.sources.extend(other.meta.sources);
        self.counts.utterances_in += other.counts.utterances_in;
        self.counts.utterances_out += other.counts.utterances_out;
        self.counts.segments += other.counts.segments;
        self.counts.words += other.counts.words;
        self.counts.without_transcript += other.counts.without_transcript;
        self.dtw_fallbacks.extend(other.dtw_fallbacks);
        self.skipped.extend(other.skipped);
        for (word, count) in other.out_of_lexicon {
            *self.out_of_lexicon.entry(word).or_default() += count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_lexicon_words_are_counted_once_each() {
        let mut report = BatchReport::new(AlignmentLevel::Both, 2, FailurePolicy::Skip);
        report.record_out_of_lexicon(["zebra", "okapi", "zebra"]);
        assert_eq!(report.out_of_lexicon["zebra"], 2);
        assert_eq!(report.out_of_lexicon.len(), 2);
        assert_eq!(report.out_of_lexicon_total(), 3);
    }

    #[test]
    fn merge_accumulates_counts_and_lists() {
        let mut a = BatchReport::new(AlignmentLevel::Phones, 1, FailurePolicy::Abort);
        a.counts.utterances_in = 2;
        a.dtw_fallbacks.push("u1".to_string());
        a.record_out_of_lexicon(["zebra"]);

        let mut b = BatchReport::new(AlignmentLevel::Phones, 1, FailurePolicy::Abort);
        b.counts.utterances_in = 3;
        b.record_skip("u7", "bad line");
        b.record_out_of_lexicon(["zebra"]);
        b.meta.sources.push("ali.2.txt".to_string());

        a.merge(b);
        assert_eq!(a.counts.utterances_in, 5);
        assert_eq!(a.dtw_fallbacks, vec!["u1"]);
        assert_eq!(a.skipped.len(), 1);
        assert_eq!(a.out_of_lexicon["zebra"], 2);
        assert_eq!(a.meta.sources, vec!["ali.2.txt"]);
    }

    #[test]
    fn out_of_lexicon_summary_covers_merged_shards() {
        let mut merged = BatchReport::new(AlignmentLevel::Both, 1, FailurePolicy::Abort);
        assert!(!merged.log_out_of_lexicon_summary());

        for shard_words in [["zebra"], ["okapi"], ["zebra"]] {
            let mut shard = BatchReport::new(AlignmentLevel::Both, 1, FailurePolicy::Abort);
            shard.record_out_of_lexicon(shard_words);
            merged.merge(shard);
        }
        assert_eq!(merged.out_of_lexicon.len(), 2);
        assert_eq!(merged.out_of_lexicon_total(), 3);
        assert!(merged.log_out_of_lexicon_summary());
    }

    #[test]
    fn serializes_to_json() {
        let mut report = BatchReport::new(AlignmentLevel::Words, 4, FailurePolicy::Skip);
        report.record_skip("u3", "unknown phone code");
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["meta"]["level"], "words");
        assert_eq!(value["meta"]["failure_policy"], "skip");
        assert_eq!(value["skipped"][0]["utterance"], "u3");
        assert!(value["meta"]["generated_at"].as_str().is_some());
    }
}
