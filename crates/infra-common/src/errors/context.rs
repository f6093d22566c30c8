use std::fmt;

use super::types::Error;

/// Context information for an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Component where the error occurred
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Additional context information
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        ErrorContext {
            component: component.into(),
            operation: operation.into(),
            details: None,
        }
    }

    /// Add details to the context
    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in component '{}' during operation '{}'", self.component, self.operation)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Extension trait for adding context to errors
pub trait ErrorExt {
    /// Add context to an error
    fn context(self, ctx: ErrorContext) -> Error;

    /// Add simple context with component and operation
    fn with_context<S: Into<String>, T: Into<String>>(self, component: S, operation: T) -> Error;
}

impl ErrorExt for Error {
    fn context(self, ctx: ErrorContext) -> Error {
        Error::Context {
            message: self.to_string(),
            context: ctx,
        }
    }

    fn with_context<S: Into<String>, T: Into<String>>(self, component: S, operation: T) -> Error {
        self.context(ErrorContext::new(component, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let err = Error::config("buffer too small")
            .context(ErrorContext::new("session", "load").with_details("rplay.toml"));
        assert_eq!(
            err.to_string(),
            "Configuration error: buffer too small [in component 'session' during operation 'load' (rplay.toml)]"
        );
    }

    #[test]
    fn test_with_context_keeps_message() {
        let err = Error::Logging("already set".into()).with_context("cli", "startup");
        match err {
            Error::Context { message, context } => {
                assert_eq!(message, "Logging setup failed: already set");
                assert_eq!(context.component, "cli");
                assert_eq!(context.details, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
