//! Error types for template rendering.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while populating variables or rendering a template.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template file '{}' not found or not readable.", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read template file '{}': {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Execution(#[from] ExecutionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TemplateError {
    /// Returns the execution details when this is a template execution failure.
    pub fn as_execution(&self) -> Option<&ExecutionError> {
        match self {
            TemplateError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

/// Where an execution fault happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// The source unit that was executed (the scratch file in development mode)
    pub file: PathBuf,
    /// 1-based line number inside that unit
    pub line: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on line {}", self.file.display(), self.line)
    }
}

/// A fault raised while compiling or running directive code.
///
/// Development-mode renders carry the template name and a [`SourceLocation`];
/// deployment-mode renders only carry the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionError {
    template: Option<String>,
    message: String,
    location: Option<SourceLocation>,
}

impl ExecutionError {
    /// Fault without location details.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            template: None,
            message: message.into(),
            location: None,
        }
    }

    /// Fault attributed to a line of an executed source unit.
    pub fn located(
        template: impl Into<String>,
        message: impl Into<String>,
        file: &Path,
        line: usize,
    ) -> Self {
        Self {
            template: Some(template.into()),
            message: message.into(),
            location: Some(SourceLocation {
                file: file.to_path_buf(),
                line,
            }),
        }
    }

    /// The underlying fault message.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    /// Name of the template being rendered, when known.
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.template, &self.location) {
            (Some(template), Some(location)) => write!(
                f,
                "Error in template '{}': {} in {}",
                template, self.message, location
            ),
            _ => write!(f, "Error in template: {}", self.message),
        }
    }
}

impl std::error::Error for ExecutionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_display() {
        let plain = ExecutionError::new("Division by zero");
        assert_eq!(plain.to_string(), "Error in template: Division by zero");
        assert!(plain.location().is_none());

        let located = ExecutionError::located(
            "page.tpl",
            "Undefined variable $name",
            Path::new("/tmp/tpl_abc.tpl"),
            3,
        );
        assert_eq!(
            located.to_string(),
            "Error in template 'page.tpl': Undefined variable $name in /tmp/tpl_abc.tpl on line 3"
        );
        assert_eq!(located.location().map(|l| l.line), Some(3));
    }

    #[test]
    fn test_not_found_names_path() {
        let err = TemplateError::NotFound(PathBuf::from("missing.tpl"));
        assert!(err.to_string().contains("missing.tpl"));
    }
}
