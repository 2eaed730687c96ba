#![allow(unreachable_pub)]
#![allow(clippy::needless_pass_by_value)]

//! # Macros
//!
//! Procedural macros for the media vault workspace.
//!
//! ## Usage
//! Add the crate as a regular dependency next to `thiserror`:
//! ```toml
//! [dependencies]
//! wmp-derive.workspace = true
//! thiserror.workspace = true
//! ```
//!
//! Examples are `ignore`d to avoid compiling in this crate; the `tests/ui` cases show
//! complete consumers.

mod macros;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Attribute macro for defining domain-specific error enums.
///
/// Turns a plain enum into a fully wired error type:
///
/// * **Automatic Derives**: Injects `#[derive(Debug, thiserror::Error)]` unless present.
/// * **Context Support**: Generates a companion `...Ext` trait that adds `.context()`
///   to `Result<T, Self>` and to results of every wrapped source error.
/// * **Conversions**: Implements `From<T>` for a variant holding a `source: T` field,
///   as long as no other variant wraps the same source type. When several variants wrap
///   the same type (for example `std::io::Error` on both the read and the write side),
///   no conversion is generated and the caller must pick the variant explicitly.
/// * **Internal Fallback**: `From<&'static str>` and `From<String>` when an `Internal`
///   variant is present.
/// * **Retry Classification**: Variants marked `#[retryable]` make
///   `is_retryable()` return `true`; every other variant returns `false`.
///
/// # Requirements
///
/// 1. The macro must be applied to an **enum** with named-field variants.
/// 2. Variants with a source must include `context: Option<Cow<'static, str>>`.
///
/// # Example
///
/// ```rust,ignore
/// use std::borrow::Cow;
///
/// #[wmp_derive::wmp_error]
/// pub enum CodecError {
///     #[retryable]
///     #[error("Read failed{}: {source}", format_context(.context))]
///     Read { source: std::io::Error, context: Option<Cow<'static, str>> },
///
///     #[error("Tag mismatch{}: {message}", format_context(.context))]
///     Tampered { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
///
/// fn load(path: &str) -> Result<Vec<u8>, CodecError> {
///     std::fs::read(path).context("Reading container")
/// }
/// ```
#[proc_macro_attribute]
pub fn wmp_error(_args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    macros::error::expand_derive(input).into()
}
