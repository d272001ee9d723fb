use std::collections::HashMap;

use crate::config::FrameConfig;
use crate::error::AlignmentError;
use crate::types::{AlignedSegment, FrameRun};

/// Convert consecutive run lengths into `(start, stop)` intervals in seconds.
///
/// Interior boundaries sit halfway between the center of the last frame of a
/// run and the center of the first frame of the next one. The first interval
/// opens at the leading edge of the first analysis window and the last one
/// closes at the trailing edge of the last window.
pub fn frame_intervals(frame_counts: &[u32], frame: &FrameConfig) -> Vec<(f64, f64)> {
    let mut intervals = Vec::with_capacity(frame_counts.len());
    let Some((&last, interior)) = frame_counts.split_last() else {
        return intervals;
    };

    let half_width = frame.frame_width_s / 2.0;
    let spacing = frame.frame_spacing_s;
    let mut start = frame.first_frame_center_s - half_width;
    let mut center = frame.first_frame_center_s;

    for &nframes in interior {
        let stop = center + spacing * (nframes as f64 - 0.5);
        center = stop + 0.5 * spacing;
        intervals.push((start, stop));
        start = stop;
    }

    let stop = center + spacing * (last as f64 - 1.0) + half_width;
    intervals.push((start, stop));
    intervals
}

/// Time-stamp the frame runs of one utterance, mapping codes to phone symbols.
pub fn runs_to_segments(
    runs: &[FrameRun],
    code_to_phone: &HashMap<String, String>,
    frame: &FrameConfig,
) -> Result<Vec<AlignedSegment>, AlignmentError> {
    let counts: Vec<u32> = runs.iter().map(|r| r.frames).collect();
    runs.iter()
        .zip(frame_intervals(&counts, frame))
        .map(|(run, (start, stop))| {
            let phone =
                code_to_phone
                    .get(&run.code)
                    .ok_or_else(|| AlignmentError::UnknownPhoneCode {
                        code: run.code.clone(),
                    })?;
            let mut segment = AlignedSegment::new(start, stop, phone.clone());
            segment.frames = Some(run.frames);
            Ok(segment)
        })
        .collect()
}
