use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("text exposition parse error at line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
