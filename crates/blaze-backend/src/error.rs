use thiserror::Error;

/// Error reported by a backend operation or listener.
///
/// Mirrors the `{code, message}` shape the hosted backends use, where
/// `code` is namespaced by service (`auth/wrong-password`,
/// `database/invalid-path`). `blaze-core` never inspects the code -- it
/// forwards the error unchanged on the stream tied to the failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct BackendError {
    /// Namespaced error code, e.g. `"auth/user-not-found"`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl BackendError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an `auth/<code>` error.
    pub fn auth(code: &str, message: impl Into<String>) -> Self {
        Self::new(format!("auth/{code}"), message)
    }

    /// Shorthand for a `database/<code>` error.
    pub fn database(code: &str, message: impl Into<String>) -> Self {
        Self::new(format!("database/{code}"), message)
    }

    /// Returns `true` for errors raised by the session service.
    pub fn is_auth(&self) -> bool {
        self.code.starts_with("auth/")
    }

    /// Returns `true` for errors raised by the data store.
    pub fn is_database(&self) -> bool {
        self.code.starts_with("database/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = BackendError::auth("wrong-password", "The password is invalid.");
        assert_eq!(err.to_string(), "auth/wrong-password: The password is invalid.");
        assert!(err.is_auth());
        assert!(!err.is_database());
    }

    #[test]
    fn database_namespace() {
        let err = BackendError::database("invalid-path", "bad");
        assert_eq!(err.code, "database/invalid-path");
        assert!(err.is_database());
    }
}
