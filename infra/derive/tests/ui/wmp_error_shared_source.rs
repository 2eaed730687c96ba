use std::borrow::Cow;
use wmp_derive::wmp_error;

// Both variants wrap `std::io::Error`, so no `From<std::io::Error>` is generated.
#[wmp_error]
pub enum DemoError {
    #[retryable]
    #[error("Read failed{}: {source}", format_context(.context))]
    Read { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[retryable]
    #[error("Write failed{}: {source}", format_context(.context))]
    Write { source: std::io::Error, context: Option<Cow<'static, str>> },
}

fn main() {
    let err = DemoError::Write { source: std::io::Error::other("full"), context: None };
    assert!(err.is_retryable());
}
