use std::fmt::Display;

use cursor::Line;
use itertools::Itertools;

/// A diagnostic as shown to the user: `[line N] Error{at}: message`.
///
/// `at` is either empty, ` at end` or ` at 'lexeme'`.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
#[error("[line {line}] Error{at}: {message}")]
pub struct LoxError {
    pub line: Line,
    pub at: String,
    pub message: String,
}

impl LoxError {
    pub fn new(line: Line, at: impl Into<String>, message: impl ToString) -> Self {
        Self { line, at: at.into(), message: message.to_string() }
    }
}

/// Location suffix for an error reported at `lexeme`; an empty lexeme means end of input.
pub fn location(lexeme: &str) -> String {
    if lexeme.is_empty() {
        " at end".to_string()
    } else {
        format!(" at '{lexeme}'")
    }
}

#[derive(thiserror::Error, Debug, Default, PartialEq, derive_more::Deref, derive_more::DerefMut)]
pub struct LoxErrors(pub Vec<LoxError>);

impl From<LoxError> for LoxErrors {
    fn from(e: LoxError) -> Self {
        Self(vec![e])
    }
}

impl<E: Into<LoxError>> FromIterator<E> for LoxErrors {
    fn from_iter<T: IntoIterator<Item = E>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<E: Into<LoxError>> Extend<E> for LoxErrors {
    fn extend<T: IntoIterator<Item = E>>(&mut self, iter: T) {
        self.0.extend(iter.into_iter().map(Into::into))
    }
}

impl Display for LoxErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join("\n"))
    }
}
