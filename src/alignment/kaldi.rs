//! Conversion between canonical alignments and the toolkit's integer-coded
//! frame alignments.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{BufRead, Write};
use std::path::Path;

use crate::alignment::position::to_position_dependent;
use crate::alignment::records::{read_alignment_records, AlignmentRecord, RecordFormat};
use crate::alignment::timing::runs_to_segments;
use crate::config::FrameConfig;
use crate::corpus::{content_lines, open_reader, PhoneTable};
use crate::error::AlignmentError;
use crate::types::Utterance;

/// Phone map lookups plus framing, shared by import and export.
#[derive(Debug, Clone)]
pub struct KaldiBridge {
    code_to_phone: HashMap<String, String>,
    phone_to_code: HashMap<String, String>,
    frame: FrameConfig,
    word_position_dependent: bool,
    silences: HashSet<String>,
}

impl KaldiBridge {
    pub fn new(table: &PhoneTable, word_position_dependent: bool, frame: FrameConfig) -> Self {
        Self {
            code_to_phone: table.code_to_phone(word_position_dependent),
            phone_to_code: table.phone_to_code(),
            frame,
            word_position_dependent,
            silences: HashSet::new(),
        }
    }

    /// Silence phones, used to find word extents before position tagging.
    pub fn with_silences(mut self, silences: HashSet<String>) -> Self {
        self.silences = silences;
        self
    }

    pub fn frame(&self) -> &FrameConfig {
        &self.frame
    }

    /// Time-stamp one toolkit record into a canonical utterance.
    pub fn import_record(&self, record: &AlignmentRecord) -> Result<Utterance, AlignmentError> {
        let segments = runs_to_segments(&record.runs, &self.code_to_phone, &self.frame)?;
        Ok(Utterance::new(record.utterance_id.clone(), segments))
    }

    /// Read and import a whole alignment archive, failing on the first bad record.
    pub fn import<R: BufRead>(
        &self,
        reader: R,
        format: RecordFormat,
        source_name: &str,
    ) -> Result<Vec<Utterance>, AlignmentError> {
        read_alignment_records(reader, format, source_name)?
            .iter()
            .map(|record| self.import_record(record))
            .collect()
    }

    /// Expand a canonical utterance back into one phone code per frame.
    ///
    /// With a word-position-dependent model, utterances carrying word labels
    /// are tagged first so their phones match the target table.
    pub fn export(&self, utterance: &Utterance) -> Result<ExportedAlignment, AlignmentError> {
        let has_words = utterance.segments.iter().any(|s| s.word.is_some());
        if self.word_position_dependent && has_words {
            let tagged = Utterance::new(
                utterance.id.clone(),
                to_position_dependent(&utterance.segments, &self.silences),
            );
            return export_alignment(&tagged, &self.phone_to_code, &self.frame);
        }
        export_alignment(utterance, &self.phone_to_code, &self.frame)
    }
}

/// Per-frame phone codes of one utterance, ready to feed back to the toolkit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedAlignment {
    pub utterance_id: String,
    pub codes: Vec<String>,
}

impl ExportedAlignment {
    /// `utt code code code ...`
    pub fn to_line(&self) -> String {
        let mut line = self.utterance_id.clone();
        for code in &self.codes {
            line.push(' ');
            line.push_str(code);
        }
        line
    }
}

/// Convert each segment into `round((stop - start) / spacing)` repetitions of
/// its phone code. Phone symbols are looked up verbatim.
pub fn export_alignment(
    utterance: &Utterance,
    phone_to_code: &HashMap<String, String>,
    frame: &FrameConfig,
) -> Result<ExportedAlignment, AlignmentError> {
    let mut codes = Vec::new();
    for segment in &utterance.segments {
        let code = phone_to_code
            .get(&segment.phone)
            .ok_or_else(|| AlignmentError::UnknownPhone {
                symbol: segment.phone.clone(),
            })?;
        let nframes = (segment.duration_s() / frame.frame_spacing_s).round().max(0.0) as usize;
        codes.extend(std::iter::repeat(code.clone()).take(nframes));
    }
    Ok(ExportedAlignment {
        utterance_id: utterance.id.clone(),
        codes,
    })
}

pub fn write_exported<W: Write>(
    mut writer: W,
    alignments: &[ExportedAlignment],
) -> Result<(), AlignmentError> {
    for alignment in alignments {
        writeln!(writer, "{}", alignment.to_line())
            .map_err(|e| AlignmentError::io("write exported alignment", e))?;
    }
    writer
        .flush()
        .map_err(|e| AlignmentError::io("flush exported alignment", e))
}

/// Utterance to job assignment (`utt job` per line, `utt2spk` layout).
#[derive(Debug, Clone, Default)]
pub struct JobMap {
    jobs: HashMap<String, String>,
}

impl JobMap {
    pub fn from_entries<I, U, J>(entries: I) -> Self
    where
        I: IntoIterator<Item = (U, J)>,
        U: Into<String>,
        J: Into<String>,
    {
        Self {
            jobs: entries
                .into_iter()
                .map(|(u, j)| (u.into(), j.into()))
                .collect(),
        }
    }

    pub fn read<R: BufRead>(reader: R, source_name: &str) -> Result<Self, AlignmentError> {
        let mut jobs = HashMap::new();
        for line in content_lines(reader, "read job map") {
            let (line_no, line) = line?;
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (Some(utt), Some(job), None) => {
                    jobs.insert(utt.to_string(), job.to_string());
                }
                _ => {
                    return Err(AlignmentError::format(
                        source_name,
                        format!("expected 'utterance job', got '{line}'"),
                    )
                    .at_line(line_no))
                }
            }
        }
        Ok(Self { jobs })
    }

    pub fn load(path: &Path) -> Result<Self, AlignmentError> {
        let reader = open_reader(path, "open job map")?;
        Self::read(reader, &path.display().to_string())
    }

    pub fn job(&self, utt_id: &str) -> Option<&str> {
        self.jobs.get(utt_id).map(String::as_str)
    }
}

/// Shard exported alignments by job, keeping input order inside each shard.
/// Utterances the map does not mention are dropped.
pub fn split_by_jobs(
    alignments: Vec<ExportedAlignment>,
    job_map: &JobMap,
) -> BTreeMap<String, Vec<ExportedAlignment>> {
    let mut shards: BTreeMap<String, Vec<ExportedAlignment>> = BTreeMap::new();
    let mut dropped = 0usize;
    for alignment in alignments {
        match job_map.job(&alignment.utterance_id) {
            Some(job) => shards.entry(job.to_string()).or_default().push(alignment),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        tracing::debug!(dropped, "utterances without a job assignment were left out");
    }
    shards
}
