//! FromRow derive macro implementation

use crate::attrs::{FieldSource, field_source};
use crate::common::syn_types::{option_inner, vec_inner};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Result};

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let fields = crate::named_fields(&input, "FromRow")?;

    let mut field_extracts = Vec::with_capacity(fields.len());
    for field in fields {
        let field_name = &field.ident;
        let ty = &field.ty;
        let extract = match field_source(field)? {
            FieldSource::Column(column) => quote! {
                row.try_get_column(#column)?
            },
            FieldSource::Scope(key) => match option_inner(ty) {
                Some(inner) => quote! {
                    match row.scope_opt(#key)? {
                        Some(scope) => Some(<#inner as relorm::FromRow>::from_row(scope)?),
                        None => None,
                    }
                },
                None => quote! {
                    <#ty as relorm::FromRow>::from_row(row.scope(#key)?)?
                },
            },
            FieldSource::Prefetched(key) => {
                let Some(inner) = vec_inner(ty) else {
                    return Err(syn::Error::new_spanned(
                        ty,
                        "`prefetched` fields must be a Vec of records",
                    ));
                };
                quote! {
                    row.prefetched::<#inner>(#key)?
                }
            }
        };
        field_extracts.push(quote! { #field_name: #extract });
    }

    Ok(quote! {
        impl #impl_generics relorm::FromRow for #name #ty_generics #where_clause {
            fn from_row(row: &relorm::Row) -> relorm::OrmResult<Self> {
                use relorm::RowExt;
                Ok(Self {
                    #(#field_extracts),*
                })
            }
        }
    })
}
