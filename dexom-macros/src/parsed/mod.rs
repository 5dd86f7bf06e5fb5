#[allow(unused_imports)]
use super::*;

mod entity;
mod field;
mod marker;
mod serde_attr;

pub(crate) use entity::ParsedEntity;
use field::{IdKind, ParsedField};
use marker::ParsedMarker;
use serde_attr::{SerdeContainer, SerdeField};

/// Strip `Option`, `Vec` and `Box` wrappers: `Vec<Option<Inner>>` yields `Inner`.
fn innermost_type(ty: &Type) -> &Type {
    match wrapped_type(ty) {
        Some(inner) => innermost_type(inner),
        None => ty,
    }
}

fn wrapped_type(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if !matches!(segment.ident.to_string().as_str(), "Option" | "Vec" | "Box") {
        return None;
    }
    match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) => args.args.first().and_then(|arg| match arg {
            syn::GenericArgument::Type(inner) => Some(inner),
            _ => None,
        }),
        _ => None,
    }
}

fn last_ident_str(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|seg| seg.ident.to_string()),
        _ => None,
    }
}
