// Re-export shared types
pub use lapidary_types::{Diagnostic, Location, Severity};

/// Errors that abort the compilation of a document
#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("{loc}: unexpected end of input")]
    UnexpectedEndOfInput { loc: Location },

    #[error("{loc}: unbalanced '}}'")]
    UnbalancedBlock { loc: Location },

    #[error("{loc}: cannot open required file '{path}': {reason}")]
    RequireFailed {
        loc: Location,
        path: String,
        reason: String,
    },

    #[error("{loc}: include nesting too deep while opening '{path}'")]
    IncludeDepth { loc: Location, path: String },

    #[error("{loc}: 'try' without matching 'pass' in selector '{test}'")]
    UnterminatedTry { loc: Location, test: String },

    #[error("{loc}: malformed filter escape: {message}")]
    MalformedFilter { loc: Location, message: String },
}

impl DocError {
    /// Location the error was raised at
    pub fn location(&self) -> &Location {
        match self {
            DocError::UnexpectedEndOfInput { loc } => loc,
            DocError::UnbalancedBlock { loc } => loc,
            DocError::RequireFailed { loc, .. } => loc,
            DocError::IncludeDepth { loc, .. } => loc,
            DocError::UnterminatedTry { loc, .. } => loc,
            DocError::MalformedFilter { loc, .. } => loc,
        }
    }
}

pub type Result<T> = std::result::Result<T, DocError>;

/// Sink for recoverable problems found during a compile
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Record a warning; front ends decide how to show it
    pub fn warn(&mut self, location: Location, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{}: {}", location, message);
        self.entries.push(Diagnostic::warning(message, location));
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_carries_location() {
        let err = DocError::UnexpectedEndOfInput {
            loc: Location::new("intro.lp", 7),
        };
        assert_eq!(err.to_string(), "intro.lp:7: unexpected end of input");
        assert_eq!(err.location().line, 7);
    }

    #[test]
    fn test_unbalanced_message_escapes_brace() {
        let err = DocError::UnbalancedBlock {
            loc: Location::new("a", 1),
        };
        assert_eq!(err.to_string(), "a:1: unbalanced '}'");
    }

    #[test]
    fn test_diagnostics_collect_warnings() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.warn(Location::new("a", 3), "unknown command 'zap'");
        assert_eq!(diagnostics.entries().len(), 1);
        assert_eq!(diagnostics.entries()[0].severity, Severity::Warning);
        assert_eq!(diagnostics.take().len(), 1);
        assert!(diagnostics.is_empty());
    }
}
