use serde::Serialize;

use crate::error::AlignmentError;
use crate::types::{AlignedSegment, Utterance};

/// Set each segment's posterior to the mean of the frame posteriors it covers.
///
/// Frames are consumed from the front of `frame_posteriors` in segment order,
/// so every segment must know its frame count and the counts must add up to
/// the number of posteriors exactly.
pub fn attach_posteriors(
    utterance_id: &str,
    segments: &mut [AlignedSegment],
    frame_posteriors: &[f64],
) -> Result<(), AlignmentError> {
    let mut counts = Vec::with_capacity(segments.len());
    for (idx, segment) in segments.iter().enumerate() {
        let frames = segment.frames.ok_or_else(|| {
            AlignmentError::consistency(
                utterance_id,
                format!("segment {idx} ('{}') has no frame count", segment.phone),
            )
        })?;
        counts.push(frames as usize);
    }

    let total: usize = counts.iter().sum();
    if total != frame_posteriors.len() {
        return Err(AlignmentError::consistency(
            utterance_id,
            format!(
                "segments cover {total} frames but {} posteriors were given",
                frame_posteriors.len()
            ),
        ));
    }

    let mut rest = frame_posteriors;
    for (segment, n) in segments.iter_mut().zip(counts) {
        let (covered, tail) = rest.split_at(n);
        segment.posterior = Some(covered.iter().sum::<f64>() / n as f64);
        rest = tail;
    }
    Ok(())
}

/// How segment posteriors are folded into one utterance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreFunction {
    #[default]
    Product,
    Mean,
}

impl ScoreFunction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Mean => "mean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UtteranceScore {
    pub utterance_id: String,
    pub score: f64,
    pub segment_count: usize,
}

/// Score an utterance from its segment posteriors.
pub fn score_utterance(
    utterance: &Utterance,
    function: ScoreFunction,
) -> Result<UtteranceScore, AlignmentError> {
    let posteriors = utterance
        .segments
        .iter()
        .enumerate()
        .map(|(idx, s)| {
            s.posterior.ok_or_else(|| {
                AlignmentError::consistency(
                    &utterance.id,
                    format!("segment {idx} ('{}') carries no posterior", s.phone),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let score = match function {
        ScoreFunction::Product => posteriors.iter().product(),
        ScoreFunction::Mean if posteriors.is_empty() => 0.0,
        ScoreFunction::Mean => posteriors.iter().sum::<f64>() / posteriors.len() as f64,
    };
    Ok(UtteranceScore {
        utterance_id: utterance.id.clone(),
        score,
        segment_count: posteriors.len(),
    })
}
