//! Readers for the flat text files the alignment post-processing consumes:
//! toolkit phone symbol tables, lexicons, transcripts and silence lists.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::AlignmentError;
use crate::types::WordBoundaryTag;

pub(crate) fn open_reader(
    path: &Path,
    context: &'static str,
) -> Result<BufReader<File>, AlignmentError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| AlignmentError::io(context, e))
}

/// Iterate `(line_no, trimmed_line)` over non-empty lines, 1-based.
pub(crate) fn content_lines<R: BufRead>(
    reader: R,
    context: &'static str,
) -> impl Iterator<Item = Result<(usize, String), AlignmentError>> {
    reader
        .lines()
        .enumerate()
        .filter_map(move |(idx, line)| match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Ok((idx + 1, trimmed.to_string())))
                }
            }
            Err(e) => Some(Err(AlignmentError::io(context, e))),
        })
}

/// Toolkit phone symbol table (`phones.txt`): one `symbol code` pair per line.
#[derive(Debug, Clone, Default)]
pub struct PhoneTable {
    entries: Vec<(String, String)>,
}

impl PhoneTable {
    pub fn from_entries<I, S, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, C)>,
        S: Into<String>,
        C: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(s, c)| (s.into(), c.into()))
                .collect(),
        }
    }

    pub fn read<R: BufRead>(reader: R, source_name: &str) -> Result<Self, AlignmentError> {
        let mut entries = Vec::new();
        for line in content_lines(reader, "read phone table") {
            let (line_no, line) = line?;
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (Some(symbol), Some(code), None) => {
                    entries.push((symbol.to_string(), code.to_string()))
                }
                _ => {
                    return Err(AlignmentError::format(
                        source_name,
                        format!("expected 'symbol code', got '{line}'"),
                    )
                    .at_line(line_no))
                }
            }
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, AlignmentError> {
        let reader = open_reader(path, "open phone table")?;
        Self::read(reader, &path.display().to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Code to phone map used at import. Position markers are removed when
    /// the acoustic model used word-position-dependent phones.
    pub fn code_to_phone(&self, word_position_dependent: bool) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|(symbol, code)| {
                let phone = if word_position_dependent {
                    WordBoundaryTag::strip(symbol).0
                } else {
                    symbol.as_str()
                };
                (code.clone(), phone.to_string())
            })
            .collect()
    }

    /// Phone to code map used at export. Symbols are kept verbatim.
    pub fn phone_to_code(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|(symbol, code)| (symbol.clone(), code.clone()))
            .collect()
    }
}

/// Pronunciation lexicon: word to phone sequence.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    entries: HashMap<String, Vec<String>>,
}

impl Lexicon {
    pub fn from_entries<I, W, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (W, Vec<P>)>,
        W: Into<String>,
        P: Into<String>,
    {
        let mut lexicon = Self::default();
        for (word, phones) in entries {
            lexicon
                .entries
                .entry(word.into())
                .or_insert_with(|| phones.into_iter().map(Into::into).collect());
        }
        lexicon
    }

    /// Alternative pronunciations after the first are ignored.
    pub fn read<R: BufRead>(reader: R, source_name: &str) -> Result<Self, AlignmentError> {
        let mut entries: HashMap<String, Vec<String>> = HashMap::new();
        for line in content_lines(reader, "read lexicon") {
            let (line_no, line) = line?;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else { continue };
            let phones: Vec<String> = fields.map(str::to_string).collect();
            if phones.is_empty() {
                return Err(AlignmentError::format(
                    source_name,
                    format!("lexicon entry '{word}' has no phones"),
                )
                .at_line(line_no));
            }
            if entries.contains_key(word) {
                tracing::debug!(word, line = line_no, "lexicon: keeping first pronunciation");
                continue;
            }
            entries.insert(word.to_string(), phones);
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, AlignmentError> {
        let reader = open_reader(path, "open lexicon")?;
        Self::read(reader, &path.display().to_string())
    }

    pub fn pronunciation(&self, word: &str) -> Option<&[String]> {
        self.entries.get(word).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Utterance id to ordered transcript words.
#[derive(Debug, Clone, Default)]
pub struct Transcripts {
    by_utterance: HashMap<String, Vec<String>>,
}

impl Transcripts {
    pub fn from_entries<I, U, W>(entries: I) -> Self
    where
        I: IntoIterator<Item = (U, Vec<W>)>,
        U: Into<String>,
        W: Into<String>,
    {
        Self {
            by_utterance: entries
                .into_iter()
                .map(|(u, ws)| (u.into(), ws.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    pub fn read<R: BufRead>(reader: R, source_name: &str) -> Result<Self, AlignmentError> {
        let mut by_utterance = HashMap::new();
        for line in content_lines(reader, "read transcript") {
            let (line_no, line) = line?;
            let mut fields = line.split_whitespace();
            let Some(utt_id) = fields.next() else { continue };
            let words: Vec<String> = fields.map(str::to_string).collect();
            if by_utterance.insert(utt_id.to_string(), words).is_some() {
                return Err(AlignmentError::format(
                    source_name,
                    format!("duplicate utterance id '{utt_id}'"),
                )
                .at_line(line_no));
            }
        }
        Ok(Self { by_utterance })
    }

    pub fn load(path: &Path) -> Result<Self, AlignmentError> {
        let reader = open_reader(path, "open transcript")?;
        Self::read(reader, &path.display().to_string())
    }

    pub fn words(&self, utt_id: &str) -> Option<&[String]> {
        self.by_utterance.get(utt_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.by_utterance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_utterance.is_empty()
    }
}

/// Silence phone list: the first column of each line.
pub fn read_silences<R: BufRead>(reader: R) -> Result<HashSet<String>, AlignmentError> {
    let mut silences = HashSet::new();
    for line in content_lines(reader, "read silences") {
        let (_, line) = line?;
        if let Some(phone) = line.split_whitespace().next() {
            silences.insert(phone.to_string());
        }
    }
    Ok(silences)
}

pub fn load_silences(path: &Path) -> Result<HashSet<String>, AlignmentError> {
    read_silences(open_reader(path, "open silences")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_table_strips_position_markers() {
        let data = "<eps> 0\nSIL 1\nSIL_B 2\na_B 3\na_E 4\nb_I 5\n";
        let table = PhoneTable::read(data.as_bytes(), "phones.txt").unwrap();
        assert_eq!(table.len(), 6);

        let dependent = table.code_to_phone(true);
        assert_eq!(dependent["2"], "SIL");
        assert_eq!(dependent["3"], "a");
        assert_eq!(dependent["5"], "b");
        assert_eq!(dependent["0"], "<eps>");

        let verbatim = table.code_to_phone(false);
        assert_eq!(verbatim["3"], "a_B");

        let reverse = table.phone_to_code();
        assert_eq!(reverse["a_E"], "4");
    }

    #[test]
    fn phone_table_rejects_bad_line_with_line_number() {
        let data = "a 1\n\nb 2 extra\n";
        let err = PhoneTable::read(data.as_bytes(), "phones.txt").unwrap_err();
        match err {
            AlignmentError::Format { line, .. } => assert_eq!(line, Some(3)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lexicon_keeps_first_pronunciation() {
        let data = "hello h e l o\nworld w o r l d\nhello h a l o\n";
        let lexicon = Lexicon::read(data.as_bytes(), "lexicon.txt").unwrap();
        assert_eq!(lexicon.len(), 2);
        assert_eq!(
            lexicon.pronunciation("hello").unwrap(),
            &["h", "e", "l", "o"].map(String::from)
        );
        assert!(lexicon.pronunciation("missing").is_none());
    }

    #[test]
    fn lexicon_rejects_word_without_phones() {
        let err = Lexicon::read("hello\n".as_bytes(), "lexicon.txt").unwrap_err();
        assert!(err.to_string().contains("lexicon.txt:1"));
    }

    #[test]
    fn transcripts_reject_duplicates() {
        let data = "u1 a b\nu2 c\n";
        let text = Transcripts::read(data.as_bytes(), "text").unwrap();
        assert_eq!(text.words("u1").unwrap(), &["a", "b"].map(String::from));
        assert_eq!(text.len(), 2);

        let err = Transcripts::read("u1 a\nu1 b\n".as_bytes(), "text").unwrap_err();
        assert!(err.to_string().contains("duplicate utterance id"));
    }

    #[test]
    fn silences_first_column() {
        let silences = read_silences("SIL\nSPN noise\n\n".as_bytes()).unwrap();
        assert!(silences.contains("SIL"));
        assert!(silences.contains("SPN"));
        assert_eq!(silences.len(), 2);
    }
}
