//! Parsing of the toolkit's textual alignment and posterior archives.
//!
//! Two alignment shapes are understood:
//! - run-length records, as written by `ali-to-phones --write-lengths`:
//!   `utt code nframes ; code nframes ; ...`
//! - per-frame records, as written by `ali-to-phones --per-frame` or by
//!   [`crate::alignment::kaldi::export_alignment`]: `utt code code code ...`
//!
//! A record may be split over several consecutive lines sharing the same
//! utterance id; those lines are joined in order.

use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use crate::corpus::content_lines;
use crate::error::AlignmentError;
use crate::types::FrameRun;

/// Posterior values this far outside [0, 1] are rounding noise and get clamped.
const POSTERIOR_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
    #[default]
    Runs,
    PerFrame,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRecord {
    pub utterance_id: String,
    pub runs: Vec<FrameRun>,
}

impl AlignmentRecord {
    pub fn total_frames(&self) -> u64 {
        self.runs.iter().map(|r| r.frames as u64).sum()
    }
}

/// Whitespace tokens of a record body with bracket and semicolon delimiters removed.
fn body_tokens(body: &str) -> Vec<&str> {
    body.split(|c: char| c.is_whitespace() || c == '[' || c == ']' || c == ';')
        .filter(|t| !t.is_empty())
        .collect()
}

fn split_utterance_id(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    let end = line.find(char::is_whitespace).unwrap_or(line.len());
    let (id, rest) = line.split_at(end);
    if id.is_empty() || id.starts_with('[') {
        None
    } else {
        Some((id, rest))
    }
}

fn parse_runs(tokens: &[&str], source_name: &str) -> Result<Vec<FrameRun>, AlignmentError> {
    if tokens.len() % 2 != 0 {
        return Err(AlignmentError::format(
            source_name,
            format!(
                "expected (code, nframes) pairs, got an odd number of tokens ({})",
                tokens.len()
            ),
        ));
    }
    tokens
        .chunks_exact(2)
        .map(|pair| {
            let frames: u32 = pair[1].parse().map_err(|_| {
                AlignmentError::format(
                    source_name,
                    format!("frame count '{}' is not a non-negative integer", pair[1]),
                )
            })?;
            if frames == 0 {
                return Err(AlignmentError::format(
                    source_name,
                    format!("phone code '{}' has a zero frame count", pair[0]),
                ));
            }
            Ok(FrameRun::new(pair[0], frames))
        })
        .collect()
}

/// Parse a single alignment line into its utterance id and frame runs.
pub fn parse_alignment_line(
    line: &str,
    format: RecordFormat,
    source_name: &str,
) -> Result<(String, Vec<FrameRun>), AlignmentError> {
    let (utt_id, body) = split_utterance_id(line)
        .ok_or_else(|| AlignmentError::format(source_name, "missing utterance id"))?;
    let tokens = body_tokens(body);
    let runs = match format {
        RecordFormat::Runs => parse_runs(&tokens, source_name),
        RecordFormat::PerFrame => Ok(FrameRun::from_frames(&tokens)),
    }
    .map_err(|e| e.for_utterance(utt_id))?;
    Ok((utt_id.to_string(), runs))
}

/// Read every alignment record, regrouping consecutive lines of one utterance.
///
/// An utterance id showing up again after another utterance is rejected:
/// the toolkit never interleaves utterances inside one archive.
pub fn read_alignment_records<R: BufRead>(
    reader: R,
    format: RecordFormat,
    source_name: &str,
) -> Result<Vec<AlignmentRecord>, AlignmentError> {
    let mut records: Vec<AlignmentRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for line in content_lines(reader, "read alignment") {
        let (line_no, line) = line?;
        let (utt_id, runs) =
            parse_alignment_line(&line, format, source_name).map_err(|e| e.at_line(line_no))?;

        if let Some(last) = records.last_mut() {
            if last.utterance_id == utt_id {
                append_runs(&mut last.runs, runs, format);
                continue;
            }
        }
        if seen.contains(&utt_id) {
            return Err(AlignmentError::format(
                source_name,
                "utterance appears in two separate blocks",
            )
            .at_line(line_no)
            .for_utterance(&utt_id));
        }
        seen.insert(utt_id.clone());
        records.push(AlignmentRecord {
            utterance_id: utt_id,
            runs,
        });
    }
    Ok(records)
}

fn append_runs(existing: &mut Vec<FrameRun>, runs: Vec<FrameRun>, format: RecordFormat) {
    let mut runs = runs.into_iter();
    // A per-frame record split mid-run continues the previous run.
    if format == RecordFormat::PerFrame {
        if let Some(first) = runs.next() {
            match existing.last_mut() {
                Some(last) if last.code == first.code => last.frames += first.frames,
                _ => existing.push(first),
            }
        }
    }
    existing.extend(runs);
}

/// Shape of the lines in a posterior archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PosteriorFormat {
    /// Decide from the first line that only fits one shape.
    #[default]
    Auto,
    /// `utt [ p p p ... ]`, as written by `get-post-on-ali`.
    Vector,
    /// `utt [ code p ] [ code p ] ...`, one block per frame.
    Pairs,
}

impl PosteriorFormat {
    /// The shape a record body commits to, or `None` when both fit.
    fn detect(body: &str) -> Option<Self> {
        let blocks = bracket_blocks(body);
        if blocks.is_empty() || blocks.iter().any(|b| b.len() != 2) {
            return Some(Self::Vector);
        }
        if blocks.len() > 1 {
            return Some(Self::Pairs);
        }
        // One two-token block: a first token that is no probability is a code.
        let first_is_probability = blocks[0][0]
            .parse::<f64>()
            .map(|v| (-POSTERIOR_TOLERANCE..=1.0 + POSTERIOR_TOLERANCE).contains(&v))
            .unwrap_or(false);
        (!first_is_probability).then_some(Self::Pairs)
    }

    fn resolve(self, body: &str) -> Self {
        match self {
            Self::Auto => Self::detect(body).unwrap_or(Self::Vector),
            format => format,
        }
    }
}

/// Parse a posterior line into its utterance id and per-frame probabilities.
///
/// With [`PosteriorFormat::Auto`] the line is judged on its own and a lone
/// `[ a b ]` block reads as a two-frame vector unless `a` cannot be a
/// probability. Archive readers should prefer [`read_posterior_records`],
/// which settles the shape once for every line.
pub fn parse_posterior_line(
    line: &str,
    format: PosteriorFormat,
    source_name: &str,
) -> Result<(String, Vec<f64>), AlignmentError> {
    let (utt_id, body) = split_utterance_id(line)
        .ok_or_else(|| AlignmentError::format(source_name, "missing utterance id"))?;

    let posteriors = posterior_values(body, format.resolve(body), source_name)
        .map_err(|e| e.for_utterance(utt_id))?;
    Ok((utt_id.to_string(), posteriors))
}

fn posterior_values(
    body: &str,
    format: PosteriorFormat,
    source_name: &str,
) -> Result<Vec<f64>, AlignmentError> {
    match format {
        PosteriorFormat::Pairs => bracket_blocks(body)
            .iter()
            .map(|block| match block.as_slice() {
                [_, p] => parse_probability(p, source_name),
                _ => Err(AlignmentError::format(
                    source_name,
                    format!("expected a [ code prob ] block, got {} tokens", block.len()),
                )),
            })
            .collect(),
        _ => body_tokens(body)
            .iter()
            .map(|v| parse_probability(v, source_name))
            .collect(),
    }
}

/// Token groups between `[` and `]`, in order.
fn bracket_blocks(body: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut rest = body;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else { break };
        blocks.push(after[..close].split_whitespace().collect());
        rest = &after[close + 1..];
    }
    blocks
}

fn parse_probability(value: &str, source_name: &str) -> Result<f64, AlignmentError> {
    let p: f64 = value.parse().map_err(|_| {
        AlignmentError::format(source_name, format!("posterior '{value}' is not a number"))
    })?;
    if !p.is_finite() || p < -POSTERIOR_TOLERANCE || p > 1.0 + POSTERIOR_TOLERANCE {
        return Err(AlignmentError::format(
            source_name,
            format!("posterior {p} outside [0, 1]"),
        ));
    }
    Ok(p.clamp(0.0, 1.0))
}

#[derive(Default)]
struct PosteriorArchive {
    posteriors: HashMap<String, Vec<f64>>,
    last_id: Option<String>,
}

impl PosteriorArchive {
    fn push(
        &mut self,
        line_no: usize,
        line: &str,
        format: PosteriorFormat,
        source_name: &str,
    ) -> Result<(), AlignmentError> {
        let (utt_id, values) =
            parse_posterior_line(line, format, source_name).map_err(|e| e.at_line(line_no))?;
        let continues = self.last_id.as_deref() == Some(utt_id.as_str());
        if !continues && self.posteriors.contains_key(&utt_id) {
            return Err(AlignmentError::format(
                source_name,
                "utterance appears in two separate blocks",
            )
            .at_line(line_no)
            .for_utterance(&utt_id));
        }
        self.posteriors.entry(utt_id.clone()).or_default().extend(values);
        self.last_id = Some(utt_id);
        Ok(())
    }
}

/// Read a posterior archive into a map keyed by utterance id.
///
/// Every line of one archive is read with the same shape. Under
/// [`PosteriorFormat::Auto`] it is taken from the first line that fits only
/// one shape; an archive where every line fits both is read as vectors.
pub fn read_posterior_records<R: BufRead>(
    reader: R,
    format: PosteriorFormat,
    source_name: &str,
) -> Result<HashMap<String, Vec<f64>>, AlignmentError> {
    let mut archive = PosteriorArchive::default();
    let mut resolved = (format != PosteriorFormat::Auto).then_some(format);
    let mut undecided: Vec<(usize, String)> = Vec::new();

    for line in content_lines(reader, "read posteriors") {
        let (line_no, line) = line?;
        let format = match resolved {
            Some(format) => format,
            None => {
                let body = split_utterance_id(&line).map_or("", |(_, body)| body);
                let Some(format) = PosteriorFormat::detect(body) else {
                    undecided.push((line_no, line));
                    continue;
                };
                tracing::debug!(source = source_name, ?format, "posterior archive shape");
                for (no, held) in undecided.drain(..) {
                    archive.push(no, &held, format, source_name)?;
                }
                resolved = Some(format);
                format
            }
        };
        archive.push(line_no, &line, format, source_name)?;
    }
    for (no, held) in undecided {
        archive.push(no, &held, PosteriorFormat::Vector, source_name)?;
    }
    Ok(archive.posteriors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_semicolon_delimited_runs() {
        let (utt, runs) =
            parse_alignment_line("utt1 5 2 ; 7 3 ; 5 4", RecordFormat::Runs, "ali").unwrap();
        assert_eq!(utt, "utt1");
        assert_eq!(
            runs,
            vec![
                FrameRun::new("5", 2),
                FrameRun::new("7", 3),
                FrameRun::new("5", 4)
            ]
        );
    }

    #[test]
    fn parses_tokenized_variant_without_semicolons() {
        let (_, runs) = parse_alignment_line("utt1 5 2 7 3", RecordFormat::Runs, "ali").unwrap();
        assert_eq!(runs, vec![FrameRun::new("5", 2), FrameRun::new("7", 3)]);
    }

    #[test]
    fn strips_brackets_before_tokenizing() {
        let (_, runs) =
            parse_alignment_line("utt1 [ 5 2 ] [ 7 3 ]", RecordFormat::Runs, "ali").unwrap();
        assert_eq!(runs, vec![FrameRun::new("5", 2), FrameRun::new("7", 3)]);
    }

    #[test]
    fn odd_token_count_is_format_error_with_utterance() {
        let err = parse_alignment_line("uttX 5 2 ; 7", RecordFormat::Runs, "ali.1").unwrap_err();
        assert_eq!(err.utterance(), Some("uttX"));
        assert!(matches!(err, AlignmentError::Format { .. }));
    }

    #[test]
    fn non_numeric_and_zero_frame_counts_rejected() {
        assert!(parse_alignment_line("u 5 x", RecordFormat::Runs, "ali").is_err());
        assert!(parse_alignment_line("u 5 0", RecordFormat::Runs, "ali").is_err());
    }

    #[test]
    fn per_frame_records_are_run_length_encoded() {
        let (_, runs) =
            parse_alignment_line("u 5 5 7 7 7", RecordFormat::PerFrame, "ali").unwrap();
        assert_eq!(runs, vec![FrameRun::new("5", 2), FrameRun::new("7", 3)]);
    }

    #[test]
    fn regroups_consecutive_lines_of_one_utterance() {
        let data = "u1 5 2 ; 7 3\nu1 5 4\nu2 7 1\n";
        let records = read_alignment_records(data.as_bytes(), RecordFormat::Runs, "ali").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].utterance_id, "u1");
        assert_eq!(records[0].runs.len(), 3);
        assert_eq!(records[0].total_frames(), 9);
        assert_eq!(records[1].utterance_id, "u2");
    }

    #[test]
    fn per_frame_continuation_merges_split_run() {
        let data = "u1 5 5\nu1 5 7\n";
        let records =
            read_alignment_records(data.as_bytes(), RecordFormat::PerFrame, "ali").unwrap();
        assert_eq!(
            records[0].runs,
            vec![FrameRun::new("5", 3), FrameRun::new("7", 1)]
        );
    }

    #[test]
    fn interleaved_utterance_is_rejected_with_line() {
        let data = "u1 5 2\nu2 5 2\nu1 7 1\n";
        let err =
            read_alignment_records(data.as_bytes(), RecordFormat::Runs, "ali.txt").unwrap_err();
        assert!(err.to_string().starts_with("ali.txt:3"));
    }

    #[test]
    fn posterior_vector_format() {
        let (utt, post) =
            parse_posterior_line("u1  [ 0.5 1 0.25 ]", PosteriorFormat::Auto, "post").unwrap();
        assert_eq!(utt, "u1");
        assert_eq!(post, vec![0.5, 1.0, 0.25]);
    }

    #[test]
    fn posterior_pair_blocks_keep_probability() {
        let (_, post) =
            parse_posterior_line("u1 [ 5 0.9 ] [ 5 0.8 ] [ 7 1 ]", PosteriorFormat::Auto, "post")
                .unwrap();
        assert_eq!(post, vec![0.9, 0.8, 1.0]);
    }

    #[test]
    fn single_frame_pair_line() {
        let (_, post) = parse_posterior_line("u1 [ 5 0.9 ]", PosteriorFormat::Auto, "post").unwrap();
        assert_eq!(post, vec![0.9]);
        let (_, post) =
            parse_posterior_line("u1 [ 1 0.9 ]", PosteriorFormat::Pairs, "post").unwrap();
        assert_eq!(post, vec![0.9]);
        let (_, post) =
            parse_posterior_line("u1 [ 1 0.9 ]", PosteriorFormat::Vector, "post").unwrap();
        assert_eq!(post, vec![1.0, 0.9]);
    }

    #[test]
    fn pair_format_rejects_other_block_sizes() {
        let err = parse_posterior_line("u1 [ 5 0.9 0.1 ]", PosteriorFormat::Pairs, "post")
            .unwrap_err();
        assert_eq!(err.utterance(), Some("u1"));
    }

    #[test]
    fn posterior_out_of_range_rejected() {
        assert!(parse_posterior_line("u1 [ 1.5 ]", PosteriorFormat::Auto, "post").is_err());
        let (_, post) =
            parse_posterior_line("u1 [ 1.0000001 ]", PosteriorFormat::Auto, "post").unwrap();
        assert_eq!(post, vec![1.0]);
    }

    #[test]
    fn posterior_records_concatenate_continuations() {
        let data = "u1 [ 0.5 0.5 ]\nu1 [ 1 ]\nu2 [ 0.1 ]\n";
        let map = read_posterior_records(data.as_bytes(), PosteriorFormat::Auto, "post").unwrap();
        assert_eq!(map["u1"], vec![0.5, 0.5, 1.0]);
        assert_eq!(map["u2"], vec![0.1]);
    }

    #[test]
    fn pair_archive_shape_applies_to_single_block_lines() {
        // The first two lines fit both shapes until the third settles it.
        let data = "u0 [ 1 0.25 ]\nu1 [ 1 0.5 ]\nu1 [ 1 0.75 ] [ 2 0.5 ]\nu1 [ 2 1 ]\n";
        let map = read_posterior_records(data.as_bytes(), PosteriorFormat::Auto, "post").unwrap();
        assert_eq!(map["u0"], vec![0.25]);
        assert_eq!(map["u1"], vec![0.5, 0.75, 0.5, 1.0]);
    }

    #[test]
    fn undecided_archive_reads_as_vectors_unless_told() {
        let data = "u1 [ 1 0.5 ]\n";
        let auto = read_posterior_records(data.as_bytes(), PosteriorFormat::Auto, "post").unwrap();
        assert_eq!(auto["u1"], vec![1.0, 0.5]);
        let pairs =
            read_posterior_records(data.as_bytes(), PosteriorFormat::Pairs, "post").unwrap();
        assert_eq!(pairs["u1"], vec![0.5]);
    }
}
