use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// Malformed input line. `line` is 1-based when known.
    #[error("{source_name}{}{}: {message}", line_suffix(.line), utterance_suffix(.utterance))]
    Format {
        source_name: String,
        line: Option<usize>,
        utterance: Option<String>,
        message: String,
    },
    #[error("phone code '{code}' has no entry in the phone map")]
    UnknownPhoneCode { code: String },
    #[error("phone symbol '{symbol}' has no entry in the target phone map")]
    UnknownPhone { symbol: String },
    #[error("utterance '{utterance}': {message}")]
    Consistency { utterance: String, message: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(":{l}")).unwrap_or_default()
}

fn utterance_suffix(utterance: &Option<String>) -> String {
    utterance
        .as_ref()
        .map(|u| format!(" (utterance '{u}')"))
        .unwrap_or_default()
}

impl AlignmentError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn format(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Format {
            source_name: source_name.into(),
            line: None,
            utterance: None,
            message: message.into(),
        }
    }

    pub(crate) fn consistency(utterance: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consistency {
            utterance: utterance.into(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Attach a line number to a format error; other variants pass through.
    pub(crate) fn at_line(self, line_no: usize) -> Self {
        match self {
            Self::Format {
                source_name,
                utterance,
                message,
                ..
            } => Self::Format {
                source_name,
                line: Some(line_no),
                utterance,
                message,
            },
            other => other,
        }
    }

    pub(crate) fn for_utterance(self, utt_id: &str) -> Self {
        match self {
            Self::Format {
                source_name,
                line,
                message,
                ..
            } => Self::Format {
                source_name,
                line,
                utterance: Some(utt_id.to_string()),
                message,
            },
            other => other,
        }
    }

    /// Utterance the error is attributed to, if any.
    pub fn utterance(&self) -> Option<&str> {
        match self {
            Self::Format { utterance, .. } => utterance.as_deref(),
            Self::Consistency { utterance, .. } => Some(utterance),
            _ => None,
        }
    }
}
