use std::collections::HashSet;

use crate::alignment::grouping::{ExpectedPhones, WordLabels};
use crate::corpus::Lexicon;
use crate::error::AlignmentError;

/// Cost of a cell no path reaches. Saturating adds keep it absorbing.
const UNREACHABLE: usize = usize::MAX;

const STEP_UP: u8 = 0;
const STEP_LEFT: u8 = 1;
const STEP_DIAG: u8 = 2;

/// Edit-distance alignment of `observed` against `expected`.
///
/// Returns, for each observed position, the expected position it is matched
/// to: the leftmost column the optimal path visits on that row. The first row
/// and column are unreachable except for the origin, which is free. Ties in
/// the backtrace go to the first of up, left, diagonal.
pub fn edit_distance_path(observed: &[&str], expected: &[&str]) -> Vec<usize> {
    let n = observed.len();
    let m = expected.len();
    if n == 0 || m == 0 {
        return Vec::new();
    }

    let mut prev = vec![UNREACHABLE; m];
    let mut curr = vec![UNREACHABLE; m];
    let mut bp = vec![STEP_UP; n * m];
    prev[0] = 0;

    for i in 1..n {
        curr[0] = UNREACHABLE;
        let row = i * m;
        for j in 1..m {
            let cost = usize::from(observed[i] != expected[j]);
            let (best, step) = best_predecessor(prev[j], curr[j - 1], prev[j - 1]);
            curr[j] = best.saturating_add(cost);
            bp[row + j] = step;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let mut matched = vec![0usize; n];
    let (mut i, mut j) = (n - 1, m - 1);
    matched[i] = j;
    while i > 0 || j > 0 {
        let step = if i == 0 {
            STEP_LEFT
        } else if j == 0 {
            STEP_UP
        } else {
            bp[i * m + j]
        };
        match step {
            STEP_UP => i -= 1,
            STEP_LEFT => j -= 1,
            _ => {
                i -= 1;
                j -= 1;
            }
        }
        matched[i] = j;
    }
    matched
}

#[inline(always)]
fn best_predecessor(up: usize, left: usize, diag: usize) -> (usize, u8) {
    let mut best = up;
    let mut step = STEP_UP;
    if left < best {
        best = left;
        step = STEP_LEFT;
    }
    if diag < best {
        best = diag;
        step = STEP_DIAG;
    }
    (best, step)
}

/// Recover word labels by aligning the observed non-silence phones to the
/// lexicon expansion of the transcript.
///
/// Each observed phone inherits the word of the expected phone it is matched
/// to; only the first phone of each run of equal words gets the label.
/// Silence phones never carry a label.
pub fn label_words_dtw(
    utterance_id: &str,
    phones: &[&str],
    words: &[String],
    lexicon: &Lexicon,
    silences: &HashSet<String>,
) -> Result<WordLabels, AlignmentError> {
    let mut labels = vec![None; phones.len()];

    let positions: Vec<usize> = phones
        .iter()
        .enumerate()
        .filter(|(_, p)| !silences.contains(**p))
        .map(|(idx, _)| idx)
        .collect();
    let observed: Vec<&str> = positions.iter().map(|&idx| phones[idx]).collect();
    let expected = ExpectedPhones::expand(words, lexicon);
    if observed.is_empty() || expected.phones.is_empty() {
        return Ok(labels);
    }

    let matched = edit_distance_path(&observed, &expected.phones);
    labels_from_path(
        utterance_id,
        &mut labels,
        &positions,
        &matched,
        &expected.word_index,
    )?;
    Ok(labels)
}

/// Label the first phone of each run of equal words along a DTW path.
///
/// `positions[k]` is the segment index of observed phone `k` and `matched[k]`
/// the expected column it was aligned to.
fn labels_from_path(
    utterance_id: &str,
    labels: &mut [Option<usize>],
    positions: &[usize],
    matched: &[usize],
    word_index: &[usize],
) -> Result<(), AlignmentError> {
    if matched.len() != positions.len() {
        return Err(AlignmentError::consistency(
            utterance_id,
            format!(
                "DTW matched {} of {} observed phones",
                matched.len(),
                positions.len()
            ),
        ));
    }

    let mut previous: Option<usize> = None;
    for (&position, &column) in positions.iter().zip(matched) {
        let word = *word_index.get(column).ok_or_else(|| {
            AlignmentError::consistency(
                utterance_id,
                format!(
                    "DTW column {column} is past the {} expected phones",
                    word_index.len()
                ),
            )
        })?;
        let label_count = labels.len();
        let slot = labels.get_mut(position).ok_or_else(|| {
            AlignmentError::consistency(
                utterance_id,
                format!("observed phone {position} is past the {} segments", label_count),
            )
        })?;
        if previous != Some(word) {
            *slot = Some(word);
            previous = Some(word);
        }
    }
    Ok(())
}
