use std::collections::HashSet;
use std::ops::Range;

use crate::corpus::Lexicon;
use crate::types::{AlignedSegment, Utterance, WordSegment};

/// Lexicon expansion of a transcript: the phones the aligner should have
/// produced, each tagged with the index of the transcript word it comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedPhones<'a> {
    pub phones: Vec<&'a str>,
    pub word_index: Vec<usize>,
    /// Transcript indices of out-of-lexicon words, in order.
    pub out_of_lexicon: Vec<usize>,
}

impl<'a> ExpectedPhones<'a> {
    pub fn expand(words: &'a [String], lexicon: &'a Lexicon) -> Self {
        let mut expected = Self::default();
        for (idx, word) in words.iter().enumerate() {
            match lexicon.pronunciation(word) {
                Some(phones) => {
                    expected.phones.extend(phones.iter().map(String::as_str));
                    expected
                        .word_index
                        .extend(std::iter::repeat(idx).take(phones.len()));
                }
                None => expected.out_of_lexicon.push(idx),
            }
        }
        expected
    }
}

/// Per-segment word labels: `Some(i)` marks the first phone of transcript word `i`.
pub type WordLabels = Vec<Option<usize>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GreedyOutcome {
    Labeled(WordLabels),
    /// The segments ran out before every word was consumed.
    Overrun { words_completed: usize },
}

/// Walk the transcript in order and consume each word's phone count from the
/// segment list, letting silence segments through unlabeled.
///
/// Only phone counts are compared, so this succeeds whenever the non-silence
/// phones are at least as many as the lexicon expects. Out-of-lexicon words
/// are skipped.
pub fn label_words_greedy(
    phones: &[&str],
    words: &[String],
    lexicon: &Lexicon,
    silences: &HashSet<String>,
) -> GreedyOutcome {
    let mut labels = vec![None; phones.len()];
    let mut idx = 0usize;

    for (word_idx, word) in words.iter().enumerate() {
        let Some(pronunciation) = lexicon.pronunciation(word) else {
            continue;
        };
        let mut remaining = pronunciation.len();
        let mut begin = true;
        while remaining > 0 {
            let Some(phone) = phones.get(idx) else {
                return GreedyOutcome::Overrun {
                    words_completed: word_idx,
                };
            };
            if !silences.contains(*phone) {
                if begin {
                    labels[idx] = Some(word_idx);
                    begin = false;
                }
                remaining -= 1;
            }
            idx += 1;
        }
    }
    GreedyOutcome::Labeled(labels)
}

/// Copy word labels onto the segments. Previous labels are cleared.
pub fn apply_word_labels(segments: &mut [AlignedSegment], labels: &[Option<usize>], words: &[String]) {
    for (segment, label) in segments.iter_mut().zip(labels) {
        segment.word = label.and_then(|i| words.get(i).cloned());
    }
}

/// Index ranges of the words in a labeled phone alignment.
///
/// A word opens on its labeled segment and runs up to the next labeled
/// segment, across any silence in between. Silences after its last
/// non-silence phone are left out, so a span always ends on a phone of the
/// word. Segments before the first label belong to no word.
pub fn word_spans(segments: &[AlignedSegment], silences: &HashSet<String>) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut open: Option<Range<usize>> = None;

    for (idx, segment) in segments.iter().enumerate() {
        if segment.word.is_some() {
            spans.extend(open.take());
            open = Some(idx..idx + 1);
        } else if !silences.contains(&segment.phone) {
            if let Some(span) = open.as_mut() {
                span.end = idx + 1;
            }
        }
    }
    spans.extend(open);
    spans
}

/// Collapse a labeled phone alignment into word intervals.
pub fn group_into_words(utterance: &Utterance, silences: &HashSet<String>) -> Vec<WordSegment> {
    word_spans(&utterance.segments, silences)
        .into_iter()
        .filter_map(|span| {
            let first = &utterance.segments[span.start];
            let last = &utterance.segments[span.end - 1];
            Some(WordSegment {
                utterance_id: utterance.id.clone(),
                start_s: first.start_s,
                stop_s: last.stop_s,
                word: first.word.clone()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexicon() -> Lexicon {
        Lexicon::from_entries([
            ("the", vec!["dh", "ah"]),
            ("cat", vec!["k", "ae", "t"]),
            ("a", vec!["ah"]),
        ])
    }

    fn silences() -> HashSet<String> {
        HashSet::from(["SIL".to_string()])
    }

    fn words(ws: &[&str]) -> Vec<String> {
        ws.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn expected_phones_track_word_positions() {
        let lex = lexicon();
        let transcript = words(&["the", "dog", "cat"]);
        let expected = ExpectedPhones::expand(&transcript, &lex);
        assert_eq!(expected.phones, vec!["dh", "ah", "k", "ae", "t"]);
        assert_eq!(expected.word_index, vec![0, 0, 2, 2, 2]);
        assert_eq!(expected.out_of_lexicon, vec![1]);
    }

    #[test]
    fn greedy_labels_first_phone_and_skips_silence() {
        let phones = ["SIL", "dh", "ah", "SIL", "k", "ae", "t", "SIL"];
        let outcome =
            label_words_greedy(&phones, &words(&["the", "cat"]), &lexicon(), &silences());
        assert_eq!(
            outcome,
            GreedyOutcome::Labeled(vec![
                None,
                Some(0),
                None,
                None,
                Some(1),
                None,
                None,
                None
            ])
        );
    }

    #[test]
    fn greedy_skips_out_of_lexicon_words() {
        let phones = ["dh", "ah", "k", "ae", "t"];
        let outcome = label_words_greedy(
            &phones,
            &words(&["the", "zebra", "cat"]),
            &lexicon(),
            &silences(),
        );
        assert_eq!(
            outcome,
            GreedyOutcome::Labeled(vec![Some(0), None, Some(2), None, None])
        );
    }

    #[test]
    fn greedy_reports_overrun_on_deleted_phones() {
        let phones = ["dh", "ah", "k", "t"];
        let outcome =
            label_words_greedy(&phones, &words(&["the", "cat"]), &lexicon(), &silences());
        assert_eq!(outcome, GreedyOutcome::Overrun { words_completed: 1 });
    }

    #[test]
    fn greedy_on_empty_inputs() {
        assert_eq!(
            label_words_greedy(&[], &[], &lexicon(), &silences()),
            GreedyOutcome::Labeled(vec![])
        );
        assert_eq!(
            label_words_greedy(&["SIL"], &[], &lexicon(), &silences()),
            GreedyOutcome::Labeled(vec![None])
        );
    }

    #[test]
    fn words_collapse_up_to_next_label() {
        let mk = |start: f64, stop: f64, phone: &str, word: Option<&str>| {
            let mut s = AlignedSegment::new(start, stop, phone);
            s.word = word.map(str::to_string);
            s
        };
        let utt = Utterance::new(
            "u1",
            vec![
                mk(0.0, 0.1, "SIL", None),
                mk(0.1, 0.2, "dh", Some("the")),
                mk(0.2, 0.3, "ah", None),
                mk(0.3, 0.4, "k", Some("cat")),
                mk(0.4, 0.5, "ae", None),
                mk(0.5, 0.6, "t", None),
                mk(0.6, 0.7, "SIL", None),
            ],
        );
        let grouped = group_into_words(&utt, &silences());
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].word, "the");
        assert_eq!((grouped[0].start_s, grouped[0].stop_s), (0.1, 0.3));
        assert_eq!(grouped[1].word, "cat");
        assert_eq!((grouped[1].start_s, grouped[1].stop_s), (0.3, 0.6));
        assert!(grouped.iter().all(|w| w.utterance_id == "u1"));
    }

    #[test]
    fn spans_skip_leading_unlabeled_phones() {
        let mut segments = vec![
            AlignedSegment::new(0.0, 0.1, "ah"),
            AlignedSegment::new(0.1, 0.2, "k"),
            AlignedSegment::new(0.2, 0.3, "ae"),
            AlignedSegment::new(0.3, 0.4, "SIL"),
            AlignedSegment::new(0.4, 0.5, "ah"),
        ];
        segments[1].word = Some("cat".to_string());
        segments[4].word = Some("a".to_string());
        assert_eq!(word_spans(&segments, &silences()), vec![1..3, 4..5]);
    }

    #[test]
    fn word_runs_across_inner_silence() {
        let mut segments = vec![
            AlignedSegment::new(0.0, 0.1, "k"),
            AlignedSegment::new(0.1, 0.2, "SIL"),
            AlignedSegment::new(0.2, 0.3, "ae"),
            AlignedSegment::new(0.3, 0.4, "t"),
            AlignedSegment::new(0.4, 0.5, "SIL"),
        ];
        segments[0].word = Some("cat".to_string());
        assert_eq!(word_spans(&segments, &silences()), vec![0..4]);

        let grouped = group_into_words(&Utterance::new("u1", segments), &silences());
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].word, "cat");
        assert_eq!((grouped[0].start_s, grouped[0].stop_s), (0.0, 0.4));
    }

    #[test]
    fn apply_labels_sets_word_strings() {
        let mut segments = vec![
            AlignedSegment::new(0.0, 0.1, "ah"),
            AlignedSegment::new(0.1, 0.2, "ah"),
        ];
        apply_word_labels(&mut segments, &[Some(1), None], &words(&["the", "a"]));
        assert_eq!(segments[0].word.as_deref(), Some("a"));
        assert_eq!(segments[1].word, None);
    }
}
