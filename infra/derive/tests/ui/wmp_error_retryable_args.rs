#[allow(unused_imports)] use std::borrow::Cow;
use wmp_derive::wmp_error;

#[wmp_error]
pub enum DemoError {
    #[retryable(times = 3)]
    #[error("Busy{}: {message}", format_context(.context))]
    Busy { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn main() {}
