//! Canonical human-readable alignment files.
//!
//! Phone level, one line per segment:
//! `utt start stop phone [posterior] [word]`. The posterior column is present
//! on every line when the file carries posteriors; the word column only on the
//! first phone of a word.
//!
//! Word level, one line per word: `utt start stop word`.

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::Path;

use crate::corpus::{content_lines, open_reader};
use crate::error::AlignmentError;
use crate::types::{AlignedSegment, Utterance, WordSegment};

const TIME_DECIMALS: usize = 4;
const POSTERIOR_DECIMALS: usize = 4;

pub fn phone_line(
    utt_id: &str,
    segment: &AlignedSegment,
    with_posteriors: bool,
) -> Result<String, AlignmentError> {
    let mut line = format!(
        "{utt_id} {:.prec$} {:.prec$} {}",
        segment.start_s,
        segment.stop_s,
        segment.phone,
        prec = TIME_DECIMALS
    );
    if with_posteriors {
        let posterior = segment.posterior.ok_or_else(|| {
            AlignmentError::consistency(
                utt_id,
                format!("segment '{}' has no posterior to write", segment.phone),
            )
        })?;
        line.push_str(&format!(" {posterior:.prec$}", prec = POSTERIOR_DECIMALS));
    }
    if let Some(word) = &segment.word {
        line.push(' ');
        line.push_str(word);
    }
    Ok(line)
}

pub fn word_line(word: &WordSegment) -> String {
    format!(
        "{} {:.prec$} {:.prec$} {}",
        word.utterance_id,
        word.start_s,
        word.stop_s,
        word.word,
        prec = TIME_DECIMALS
    )
}

pub fn write_phone_alignment<W: Write>(
    mut writer: W,
    utterances: &[Utterance],
    with_posteriors: bool,
) -> Result<(), AlignmentError> {
    for utterance in utterances {
        for segment in &utterance.segments {
            let line = phone_line(&utterance.id, segment, with_posteriors)?;
            writeln!(writer, "{line}").map_err(|e| AlignmentError::io("write alignment", e))?;
        }
    }
    writer
        .flush()
        .map_err(|e| AlignmentError::io("flush alignment", e))
}

pub fn write_word_alignment<W: Write>(
    mut writer: W,
    words: &[WordSegment],
) -> Result<(), AlignmentError> {
    for word in words {
        writeln!(writer, "{}", word_line(word))
            .map_err(|e| AlignmentError::io("write word alignment", e))?;
    }
    writer
        .flush()
        .map_err(|e| AlignmentError::io("flush word alignment", e))
}

fn parse_time(value: &str, what: &str, source_name: &str) -> Result<f64, AlignmentError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| {
            AlignmentError::format(source_name, format!("{what} time '{value}' is not a number"))
        })
}

fn parse_phone_line(
    line: &str,
    with_posteriors: bool,
    source_name: &str,
) -> Result<(String, AlignedSegment), AlignmentError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let min_fields = if with_posteriors { 5 } else { 4 };
    if fields.len() < min_fields || fields.len() > min_fields + 1 {
        return Err(AlignmentError::format(
            source_name,
            format!(
                "expected {min_fields} or {} columns, got {}",
                min_fields + 1,
                fields.len()
            ),
        ));
    }
    let utt_id = fields[0];
    let start_s = parse_time(fields[1], "start", source_name).map_err(|e| e.for_utterance(utt_id))?;
    let stop_s = parse_time(fields[2], "stop", source_name).map_err(|e| e.for_utterance(utt_id))?;
    if stop_s < start_s {
        return Err(AlignmentError::format(
            source_name,
            format!("segment stops at {stop_s} before it starts at {start_s}"),
        )
        .for_utterance(utt_id));
    }

    let mut segment = AlignedSegment::new(start_s, stop_s, fields[3]);
    if with_posteriors {
        let posterior: f64 = fields[4].parse().map_err(|_| {
            AlignmentError::format(
                source_name,
                format!("posterior '{}' is not a number", fields[4]),
            )
            .for_utterance(utt_id)
        })?;
        segment.posterior = Some(posterior);
    }
    segment.word = fields.get(min_fields).map(|w| w.to_string());
    Ok((utt_id.to_string(), segment))
}

/// Read a phone-level canonical alignment back into utterances.
pub fn read_phone_alignment<R: BufRead>(
    reader: R,
    with_posteriors: bool,
    source_name: &str,
) -> Result<Vec<Utterance>, AlignmentError> {
    let mut utterances: Vec<Utterance> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for line in content_lines(reader, "read alignment") {
        let (line_no, line) = line?;
        let (utt_id, segment) =
            parse_phone_line(&line, with_posteriors, source_name).map_err(|e| e.at_line(line_no))?;

        if let Some(last) = utterances.last_mut() {
            if last.id == utt_id {
                last.segments.push(segment);
                continue;
            }
        }
        if !seen.insert(utt_id.clone()) {
            return Err(AlignmentError::format(
                source_name,
                "utterance appears in two separate blocks",
            )
            .at_line(line_no)
            .for_utterance(&utt_id));
        }
        utterances.push(Utterance::new(utt_id, vec![segment]));
    }
    Ok(utterances)
}

pub fn load_phone_alignment(
    path: &Path,
    with_posteriors: bool,
) -> Result<Vec<Utterance>, AlignmentError> {
    let reader = open_reader(path, "open alignment")?;
    read_phone_alignment(reader, with_posteriors, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, stop: f64, phone: &str) -> AlignedSegment {
        AlignedSegment::new(start, stop, phone)
    }

    #[test]
    fn phone_lines_place_optional_columns() {
        let mut seg = segment(0.0, 0.0275, "a");
        assert_eq!(phone_line("u1", &seg, false).unwrap(), "u1 0.0000 0.0275 a");

        seg.word = Some("cat".to_string());
        assert_eq!(phone_line("u1", &seg, false).unwrap(), "u1 0.0000 0.0275 a cat");

        seg.posterior = Some(0.75);
        assert_eq!(
            phone_line("u1", &seg, true).unwrap(),
            "u1 0.0000 0.0275 a 0.7500 cat"
        );
    }

    #[test]
    fn missing_posterior_cannot_be_written() {
        let seg = segment(0.0, 0.1, "a");
        let err = phone_line("u1", &seg, true).unwrap_err();
        assert!(matches!(err, AlignmentError::Consistency { .. }));
    }

    #[test]
    fn written_alignment_reads_back() {
        let mut first = segment(0.0, 0.0275, "dh");
        first.word = Some("the".to_string());
        let utts = vec![
            Utterance::new("u1", vec![first, segment(0.0275, 0.0575, "ah")]),
            Utterance::new("u2", vec![segment(0.0, 0.105, "SIL")]),
        ];
        let mut out = Vec::new();
        write_phone_alignment(&mut out, &utts, false).unwrap();

        let restored = read_phone_alignment(out.as_slice(), false, "ali").unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].segments.len(), 2);
        assert_eq!(restored[0].segments[0].word.as_deref(), Some("the"));
        assert_eq!(restored[0].segments[1].word, None);
        assert!((restored[0].segments[1].stop_s - 0.0575).abs() < 1e-9);
        assert_eq!(restored[1].segments[0].phone, "SIL");
    }

    #[test]
    fn posterior_column_is_read_when_requested() {
        let text = "u1 0.0 0.1 a 0.9 cat\nu1 0.1 0.2 b 0.5\n";
        let utts = read_phone_alignment(text.as_bytes(), true, "ali").unwrap();
        let segs = &utts[0].segments;
        assert_eq!(segs[0].posterior, Some(0.9));
        assert_eq!(segs[0].word.as_deref(), Some("cat"));
        assert_eq!(segs[1].posterior, Some(0.5));
        assert_eq!(segs[1].word, None);
    }

    #[test]
    fn malformed_lines_report_position() {
        let err = read_phone_alignment("u1 0.0 0.1 a\nu1 0.2 x b\n".as_bytes(), false, "ali.txt")
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ali.txt:2"), "{msg}");
        assert!(msg.contains("u1"), "{msg}");

        let err = read_phone_alignment("u1 0.2 0.1 a\n".as_bytes(), false, "ali.txt").unwrap_err();
        assert!(matches!(err, AlignmentError::Format { .. }));

        let err = read_phone_alignment("u1 0.0 0.1\n".as_bytes(), false, "ali.txt").unwrap_err();
        assert!(matches!(err, AlignmentError::Format { line: Some(1), .. }));
    }

    #[test]
    fn word_lines() {
        let word = WordSegment {
            utterance_id: "u1".to_string(),
            start_s: 0.0275,
            stop_s: 0.105,
            word: "cat".to_string(),
        };
        assert_eq!(word_line(&word), "u1 0.0275 0.1050 cat");
    }
}
