//! Model derive macro implementation

use crate::attrs::{field_source, table_name};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{DeriveInput, Result};

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let fields = crate::named_fields(&input, "Model")?;
    let table = table_name(&input.attrs)?.ok_or_else(|| {
        syn::Error::new_spanned(&input.ident, "Model requires #[orm(table = \"...\")]")
    })?;

    let mut columns = Vec::with_capacity(fields.len());
    let mut column_consts = Vec::with_capacity(fields.len());
    for field in fields {
        let source = field_source(field)?;
        let Some(column) = source.column() else {
            continue;
        };
        let ident = field.ident.as_ref().map(ToString::to_string).unwrap_or_default();
        let const_name = format_ident!("COL_{}", ident.trim_start_matches("r#").to_uppercase());
        column_consts.push(quote! {
            pub const #const_name: &'static str = #column;
        });
        columns.push(column.to_string());
    }

    Ok(quote! {
        impl #impl_generics #name #ty_generics #where_clause {
            pub const TABLE: &'static str = #table;
            /// Columns read by the derived `FromRow`, in field order.
            pub const COLUMNS: &'static [&'static str] = &[#(#columns),*];
            #(#column_consts)*

            /// All rows of the table, selecting only the model's columns.
            pub fn select_all() -> relorm::QueryRequest<Self> {
                <relorm::QueryRequest<Self> as relorm::DerivableRelation>::select(
                    relorm::QueryRequest::new(relorm::Relation::table(#table)),
                    Self::COLUMNS.iter().copied(),
                )
            }
        }

        impl #impl_generics relorm::TableRecord for #name #ty_generics #where_clause {
            const TABLE_NAME: &'static str = #table;
        }
    })
}
