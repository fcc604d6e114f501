//! Derive macros for relorm
//!
//! Provides `#[derive(FromRow)]` and `#[derive(Model)]` macros.

use proc_macro::TokenStream;
use syn::punctuated::Punctuated;
use syn::token::Comma;
use syn::{Data, DeriveInput, Field, Fields, parse_macro_input};

mod attrs;
mod common;
mod from_row;
mod model;

/// Derive `FromRow` trait for a struct.
///
/// # Example
///
/// ```ignore
/// use relorm::FromRow;
///
/// #[derive(FromRow)]
/// struct Book {
///     id: i64,
///     #[orm(column = "title_text")]
///     title: String,
///     #[orm(scope = "author")]
///     author: Author,
///     #[orm(scope = "editor")]
///     editor: Option<Person>,
///     #[orm(prefetched = "reviews")]
///     reviews: Vec<Review>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[orm(column = "name")]` - Map field to a different column name
/// - `#[orm(scope = "key")]` - Decode the record joined under `key`; an `Option` field is
///   `None` when an optional join matched nothing
/// - `#[orm(prefetched = "key")]` - Decode the eagerly loaded group under `key` into a `Vec`
#[proc_macro_derive(FromRow, attributes(orm))]
pub fn derive_from_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    from_row::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

/// Derive `TableRecord` and table metadata for a struct.
///
/// # Example
///
/// ```ignore
/// use relorm::Model;
///
/// #[derive(Model)]
/// #[orm(table = "author")]
/// struct Author {
///     id: i64,
///     name: String,
/// }
/// ```
///
/// # Generated
///
/// - `impl TableRecord` (`all()`, `find(key)`, association constructors)
/// - `TABLE`, `COLUMNS` and one `COL_*` constant per column field
/// - `fn select_all()` - a request selecting only the model's columns
#[proc_macro_derive(Model, attributes(orm))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    model::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

pub(crate) fn named_fields<'a>(input: &'a DeriveInput, derive: &str) -> syn::Result<&'a Punctuated<Field, Comma>> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(&fields.named),
            _ => Err(syn::Error::new_spanned(
                input,
                format!("{derive} can only be derived for structs with named fields"),
            )),
        },
        _ => Err(syn::Error::new_spanned(
            input,
            format!("{derive} can only be derived for structs"),
        )),
    }
}
