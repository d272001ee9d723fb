use std::collections::HashSet;

use crate::alignment::grouping::word_spans;
use crate::types::{AlignedSegment, WordBoundaryTag};

/// Relabel a word-labeled phone alignment with word-position-dependent phones.
///
/// Words are recovered with [`word_spans`]; the non-silence phones of a word
/// get the `_B`/`_I`/`_E` suffix for their position, or `_S` when the word
/// has a single phone. Silences, inside a word or not, and phones outside any
/// word are copied unchanged. Times, frame counts, posteriors and word labels
/// are kept.
pub fn to_position_dependent(
    segments: &[AlignedSegment],
    silences: &HashSet<String>,
) -> Vec<AlignedSegment> {
    let mut tagged = segments.to_vec();
    for span in word_spans(segments, silences) {
        let mut phones: Vec<&mut AlignedSegment> = tagged[span]
            .iter_mut()
            .filter(|s| !silences.contains(&s.phone))
            .collect();
        let word_len = phones.len();
        for (offset, segment) in phones.iter_mut().enumerate() {
            let tag = WordBoundaryTag::for_position(offset, word_len);
            segment.phone.push_str(tag.suffix());
        }
    }
    tagged
}

/// Drop position suffixes from every phone, the inverse of [`to_position_dependent`].
pub fn to_position_independent(segments: &mut [AlignedSegment]) {
    for segment in segments {
        let (base, tag) = WordBoundaryTag::strip(&segment.phone);
        if tag.is_some() {
            segment.phone = base.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silences() -> HashSet<String> {
        HashSet::from(["SIL".to_string()])
    }

    fn seg(start: f64, phone: &str, word: Option<&str>) -> AlignedSegment {
        let mut s = AlignedSegment::new(start, start + 0.1, phone);
        s.word = word.map(str::to_string);
        s
    }

    fn phones(segments: &[AlignedSegment]) -> Vec<&str> {
        segments.iter().map(|s| s.phone.as_str()).collect()
    }

    #[test]
    fn three_phone_word_gets_begin_intermediate_end() {
        let segments = vec![
            seg(0.0, "p1", Some("w")),
            seg(0.1, "p2", None),
            seg(0.2, "p3", None),
        ];
        let tagged = to_position_dependent(&segments, &silences());
        assert_eq!(phones(&tagged), vec!["p1_B", "p2_I", "p3_E"]);
    }

    #[test]
    fn single_phone_word_gets_single() {
        let segments = vec![seg(0.0, "p1", Some("w"))];
        let tagged = to_position_dependent(&segments, &silences());
        assert_eq!(phones(&tagged), vec!["p1_S"]);
    }

    #[test]
    fn silences_stay_untagged_and_metadata_survives() {
        let mut segments = vec![
            seg(0.0, "SIL", None),
            seg(0.1, "dh", Some("the")),
            seg(0.2, "ah", None),
            seg(0.3, "SIL", None),
            seg(0.4, "ah", Some("a")),
        ];
        segments[2].posterior = Some(0.75);
        segments[2].frames = Some(10);

        let tagged = to_position_dependent(&segments, &silences());
        assert_eq!(phones(&tagged), vec!["SIL", "dh_B", "ah_E", "SIL", "ah_S"]);
        for (before, after) in segments.iter().zip(&tagged) {
            assert_eq!(before.start_s, after.start_s);
            assert_eq!(before.stop_s, after.stop_s);
            assert_eq!(before.posterior, after.posterior);
            assert_eq!(before.frames, after.frames);
            assert_eq!(before.word, after.word);
        }
    }

    #[test]
    fn silence_inside_word_is_skipped_when_tagging() {
        let segments = vec![
            seg(0.0, "k", Some("cat")),
            seg(0.1, "SIL", None),
            seg(0.2, "ae", None),
            seg(0.3, "t", None),
        ];
        let tagged = to_position_dependent(&segments, &silences());
        assert_eq!(phones(&tagged), vec!["k_B", "SIL", "ae_I", "t_E"]);
    }

    #[test]
    fn stripping_restores_base_phones() {
        let segments = vec![
            seg(0.0, "p1", Some("w")),
            seg(0.1, "p2", None),
            seg(0.2, "SIL", None),
        ];
        let mut tagged = to_position_dependent(&segments, &silences());
        to_position_independent(&mut tagged);
        assert_eq!(phones(&tagged), vec!["p1", "p2", "SIL"]);
    }
}
