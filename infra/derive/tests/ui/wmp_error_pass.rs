use std::borrow::Cow;
use wmp_derive::wmp_error;

#[wmp_error]
pub enum DemoError {
    #[retryable]
    #[error("IO error{}: {source}", format_context(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },

    #[error("Tampered{}: {message}", format_context(.context))]
    Tampered { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn read() -> Result<(), DemoError> {
    Err(std::io::Error::other("disk")).context("reading header")
}

fn main() {
    let err = read().unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.to_string(), "IO error (reading header): disk");

    let tampered = DemoError::Tampered { message: "tag".into(), context: None };
    assert!(!tampered.is_retryable());

    let internal: DemoError = "boom".into();
    assert!(matches!(internal, DemoError::Internal { .. }));
}
