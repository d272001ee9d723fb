use serde::{Deserialize, Serialize};

/// A contiguous run of identical phone codes at the frame level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRun {
    /// Toolkit phone code, kept as text: it is only ever a lookup key.
    pub code: String,
    pub frames: u32,
}

impl FrameRun {
    pub fn new(code: impl Into<String>, frames: u32) -> Self {
        Self {
            code: code.into(),
            frames,
        }
    }

    /// Run-length encode a per-frame code list. Adjacent identical codes merge.
    pub fn from_frames<S: AsRef<str>>(codes: &[S]) -> Vec<FrameRun> {
        let mut runs: Vec<FrameRun> = Vec::new();
        for code in codes {
            let code = code.as_ref();
            match runs.last_mut() {
                Some(run) if run.code == code => run.frames += 1,
                _ => runs.push(FrameRun::new(code, 1)),
            }
        }
        runs
    }
}

/// One time-stamped phone of an utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSegment {
    pub start_s: f64,
    pub stop_s: f64,
    pub phone: String,
    /// Number of toolkit frames the segment covers, when known.
    pub frames: Option<u32>,
    /// Mean per-frame posterior over the segment, in [0, 1].
    pub posterior: Option<f64>,
    /// Set on the first phone of a transcript word only.
    pub word: Option<String>,
}

impl AlignedSegment {
    pub fn new(start_s: f64, stop_s: f64, phone: impl Into<String>) -> Self {
        Self {
            start_s,
            stop_s,
            phone: phone.into(),
            frames: None,
            posterior: None,
            word: None,
        }
    }

    pub fn duration_s(&self) -> f64 {
        self.stop_s - self.start_s
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: String,
    pub segments: Vec<AlignedSegment>,
    /// Transcript words, when a transcript was available for the utterance.
    pub words: Option<Vec<String>>,
}

impl Utterance {
    pub fn new(id: impl Into<String>, segments: Vec<AlignedSegment>) -> Self {
        Self {
            id: id.into(),
            segments,
            words: None,
        }
    }

    pub fn total_frames(&self) -> Option<u32> {
        self.segments.iter().map(|s| s.frames).sum()
    }
}

/// Word-level interval collapsed from a labeled phone alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct WordSegment {
    pub utterance_id: String,
    pub start_s: f64,
    pub stop_s: f64,
    pub word: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordBoundaryTag {
    Begin,
    Intermediate,
    End,
    Single,
}

impl WordBoundaryTag {
    pub const ALL: [WordBoundaryTag; 4] = [
        WordBoundaryTag::Begin,
        WordBoundaryTag::Intermediate,
        WordBoundaryTag::End,
        WordBoundaryTag::Single,
    ];

    /// Tag of the phone at `index` within a word of `word_len` phones.
    pub fn for_position(index: usize, word_len: usize) -> Self {
        if word_len == 1 {
            Self::Single
        } else if index == 0 {
            Self::Begin
        } else if index + 1 == word_len {
            Self::End
        } else {
            Self::Intermediate
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Begin => "_B",
            Self::Intermediate => "_I",
            Self::End => "_E",
            Self::Single => "_S",
        }
    }

    /// Split a position-dependent phone symbol into its base phone and tag.
    pub fn strip(phone: &str) -> (&str, Option<Self>) {
        for tag in Self::ALL {
            if let Some(base) = phone.strip_suffix(tag.suffix()) {
                if !base.is_empty() {
                    return (base, Some(tag));
                }
            }
        }
        (phone, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentLevel {
    Phones,
    Words,
    #[default]
    Both,
}

impl AlignmentLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phones => "phones",
            Self::Words => "words",
            Self::Both => "both",
        }
    }

    pub fn needs_words(self) -> bool {
        !matches!(self, Self::Phones)
    }
}
