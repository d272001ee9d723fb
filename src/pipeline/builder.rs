use std::collections::HashSet;
use std::path::PathBuf;

use crate::alignment::kaldi::KaldiBridge;
use crate::config::AlignConfig;
use crate::corpus::{load_silences, Lexicon, PhoneTable, Transcripts};
use crate::error::AlignmentError;
use crate::pipeline::defaults::{EditDistanceAligner, GreedyWordLabeler};
use crate::pipeline::runtime::{AlignmentPipeline, AlignmentPipelineParts};
use crate::pipeline::traits::{SequenceAligner, WordLabeler};

/// Either an already loaded resource or the file to load it from at build time.
enum Source<T> {
    Loaded(T),
    File(PathBuf),
}

impl<T> Source<T> {
    fn resolve(
        self,
        load: impl FnOnce(&std::path::Path) -> Result<T, AlignmentError>,
    ) -> Result<T, AlignmentError> {
        match self {
            Source::Loaded(value) => Ok(value),
            Source::File(path) => load(&path),
        }
    }
}

pub struct AlignmentPipelineBuilder {
    config: AlignConfig,
    phone_table: Option<Source<PhoneTable>>,
    lexicon: Option<Source<Lexicon>>,
    transcripts: Option<Source<Transcripts>>,
    silences: Option<Source<HashSet<String>>>,
    word_labeler: Option<Box<dyn WordLabeler>>,
    sequence_aligner: Option<Box<dyn SequenceAligner>>,
}

impl AlignmentPipelineBuilder {
    pub fn new(config: AlignConfig) -> Self {
        Self {
            config,
            phone_table: None,
            lexicon: None,
            transcripts: None,
            silences: None,
            word_labeler: None,
            sequence_aligner: None,
        }
    }

    pub fn with_phone_table(mut self, table: PhoneTable) -> Self {
        self.phone_table = Some(Source::Loaded(table));
        self
    }

    pub fn with_phone_table_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.phone_table = Some(Source::File(path.into()));
        self
    }

    pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = Some(Source::Loaded(lexicon));
        self
    }

    pub fn with_lexicon_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lexicon = Some(Source::File(path.into()));
        self
    }

    pub fn with_transcripts(mut self, transcripts: Transcripts) -> Self {
        self.transcripts = Some(Source::Loaded(transcripts));
        self
    }

    pub fn with_transcripts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.transcripts = Some(Source::File(path.into()));
        self
    }

    /// Overrides the silence phones listed in the config.
    pub fn with_silences(mut self, silences: HashSet<String>) -> Self {
        self.silences = Some(Source::Loaded(silences));
        self
    }

    pub fn with_silences_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.silences = Some(Source::File(path.into()));
        self
    }

    pub fn with_word_labeler(mut self, word_labeler: Box<dyn WordLabeler>) -> Self {
        self.word_labeler = Some(word_labeler);
        self
    }

    pub fn with_sequence_aligner(mut self, sequence_aligner: Box<dyn SequenceAligner>) -> Self {
        self.sequence_aligner = Some(sequence_aligner);
        self
    }

    pub fn build(self) -> Result<AlignmentPipeline, AlignmentError> {
        self.config.validate()?;

        let phone_table = self
            .phone_table
            .ok_or_else(|| AlignmentError::invalid_input("a phone table is required"))?
            .resolve(PhoneTable::load)?;
        if phone_table.is_empty() {
            return Err(AlignmentError::invalid_input("phone table is empty"));
        }

        let lexicon = self.lexicon.map(|s| s.resolve(Lexicon::load)).transpose()?;
        let transcripts = self
            .transcripts
            .map(|s| s.resolve(Transcripts::load))
            .transpose()?;
        if self.config.level.needs_words() && (lexicon.is_none() || transcripts.is_none()) {
            return Err(AlignmentError::invalid_input(format!(
                "alignment level '{}' needs both a lexicon and a transcript",
                self.config.level.as_str()
            )));
        }

        let silences = match self.silences {
            Some(source) => source.resolve(load_silences)?,
            None => self.config.silences.iter().cloned().collect(),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .build()
            .map_err(|e| AlignmentError::invalid_input(format!("worker pool: {e}")))?;

        tracing::debug!(
            phones = phone_table.len(),
            lexicon = lexicon.as_ref().map_or(0, Lexicon::len),
            transcripts = transcripts.as_ref().map_or(0, Transcripts::len),
            silences = silences.len(),
            jobs = self.config.jobs,
            "alignment pipeline ready"
        );

        let bridge = KaldiBridge::new(
            &phone_table,
            self.config.word_position_dependent,
            self.config.frame,
        )
        .with_silences(silences.clone());

        Ok(AlignmentPipeline::from_parts(AlignmentPipelineParts {
            config: self.config,
            bridge,
            lexicon,
            transcripts,
            silences,
            word_labeler: self
                .word_labeler
                .unwrap_or_else(|| Box::new(GreedyWordLabeler)),
            sequence_aligner: self
                .sequence_aligner
                .unwrap_or_else(|| Box::new(EditDistanceAligner)),
            pool,
        }))
    }
}
