//! Type helper utilities for syn type analysis.

/// The single generic argument of a path type whose last segment is `wrapper`.
fn generic_inner<'a>(ty: &'a syn::Type, wrapper: &str) -> Option<&'a syn::Type> {
    let syn::Type::Path(type_path) = ty else {
        return None;
    };
    let seg = type_path.path.segments.last()?;
    if seg.ident != wrapper {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &seg.arguments else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    let syn::GenericArgument::Type(inner) = args.args.first()? else {
        return None;
    };
    Some(inner)
}

/// Extract the inner type T from Option<T>, or return None if not an Option type.
pub fn option_inner(ty: &syn::Type) -> Option<&syn::Type> {
    generic_inner(ty, "Option")
}

/// Extract the inner type T from Vec<T>, or return None if not a Vec type.
pub fn vec_inner(ty: &syn::Type) -> Option<&syn::Type> {
    generic_inner(ty, "Vec")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_option_and_vec() {
        let ty: syn::Type = syn::parse_quote!(Option<Author>);
        assert!(option_inner(&ty).is_some());
        assert!(vec_inner(&ty).is_none());

        let ty: syn::Type = syn::parse_quote!(std::vec::Vec<Book>);
        assert!(vec_inner(&ty).is_some());
    }
}
