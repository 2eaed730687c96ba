//! # Vault Errors
//!
//! [`VaultError`] separates integrity failures from storage failures so callers can
//! tell "tampered or wrong key" apart from "disk hiccup, try again":
//!
//! * [`VaultError::AuthenticationFailure`] and [`VaultError::ContainerFormat`] are final.
//!   Re-reading a corrupted container cannot succeed.
//! * [`VaultError::SourceRead`], [`VaultError::DestinationWrite`] and [`VaultError::Io`]
//!   report `is_retryable() == true`.
//! * [`VaultError::KeyStoreUnavailable`] is fatal for both directions; there is no
//!   fallback key.

use std::borrow::Cow;

/// A specialized [`VaultError`] enum for vault-related failures.
#[wmp_derive::wmp_error]
pub enum VaultError {
    /// The secure key store could not be reached, or its record for the alias is corrupt.
    #[error("Key store unavailable{}: {message}", format_context(.context))]
    KeyStoreUnavailable { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Reading plaintext from the encode source failed.
    #[retryable]
    #[error("Source read error{}: {source}", format_context(.context))]
    SourceRead { source: std::io::Error, context: Option<Cow<'static, str>> },

    /// Writing the container failed (disk full, permissions, ...).
    #[retryable]
    #[error("Destination write error{}: {source}", format_context(.context))]
    DestinationWrite { source: std::io::Error, context: Option<Cow<'static, str>> },

    /// The authentication tag did not match.
    ///
    /// The container was modified, truncated, or the key is not the one it was
    /// sealed with.
    #[error("Authentication failure{}: {message}", format_context(.context))]
    AuthenticationFailure { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The file is too short or too long to be a vault container.
    #[error("Container format error{}: {message}", format_context(.context))]
    ContainerFormat { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// I/O failure while reading a container during decode.
    #[retryable]
    #[error("Container I/O error{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    /// The requested byte range lies outside the plaintext, or the source is not open.
    #[error("Invalid range{}: {message}", format_context(.context))]
    InvalidRange { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The operation was cancelled at a chunk boundary.
    #[error("Operation cancelled{}: {message}", format_context(.context))]
    Cancelled { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal vault error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl VaultError {
    pub(crate) fn source_read(source: std::io::Error, context: impl Into<Cow<'static, str>>) -> Self {
        Self::SourceRead { source, context: Some(context.into()) }
    }

    pub(crate) fn destination_write(
        source: std::io::Error,
        context: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::DestinationWrite { source, context: Some(context.into()) }
    }

    pub(crate) fn io(source: std::io::Error, context: impl Into<Cow<'static, str>>) -> Self {
        Self::Io { source, context: Some(context.into()) }
    }

    pub(crate) fn key_store(
        message: impl Into<Cow<'static, str>>,
        context: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::KeyStoreUnavailable { message: message.into(), context: Some(context.into()) }
    }

    pub(crate) fn format(message: impl Into<Cow<'static, str>>) -> Self {
        Self::ContainerFormat { message: message.into(), context: None }
    }

    /// Returns `true` for integrity failures: the container is tampered, foreign, or
    /// sealed under a different key.
    #[must_use]
    pub const fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailure { .. } | Self::ContainerFormat { .. })
    }
}

impl From<VaultError> for std::io::Error {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::SourceRead { source, .. }
            | VaultError::DestinationWrite { source, .. }
            | VaultError::Io { source, .. } => source,
            VaultError::AuthenticationFailure { .. } | VaultError::ContainerFormat { .. } => {
                Self::new(std::io::ErrorKind::InvalidData, err)
            },
            VaultError::InvalidRange { .. } => Self::new(std::io::ErrorKind::InvalidInput, err),
            VaultError::Cancelled { .. } => Self::new(std::io::ErrorKind::Interrupted, err),
            VaultError::KeyStoreUnavailable { .. } | VaultError::Internal { .. } => {
                Self::other(err)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_variants_are_retryable_and_integrity_is_not() {
        let io = VaultError::io(std::io::Error::other("eio"), "reading block");
        assert!(io.is_retryable());
        assert!(!io.is_integrity_failure());

        let auth = VaultError::AuthenticationFailure { message: "tag".into(), context: None };
        assert!(!auth.is_retryable());
        assert!(auth.is_integrity_failure());

        let key = VaultError::key_store("locked", "alias");
        assert!(!key.is_retryable());
    }

    #[test]
    fn context_is_rendered() {
        let err: Result<(), VaultError> =
            Err(VaultError::format("file shorter than header")).context("opening a.wmv");
        assert_eq!(
            err.unwrap_err().to_string(),
            "Container format error (opening a.wmv): file shorter than header"
        );
    }

    #[test]
    fn maps_to_io_error_kinds() {
        let auth = VaultError::AuthenticationFailure { message: "tag".into(), context: None };
        assert_eq!(std::io::Error::from(auth).kind(), std::io::ErrorKind::InvalidData);

        let io = VaultError::io(std::io::Error::from(std::io::ErrorKind::NotFound), "open");
        assert_eq!(std::io::Error::from(io).kind(), std::io::ErrorKind::NotFound);
    }
}
