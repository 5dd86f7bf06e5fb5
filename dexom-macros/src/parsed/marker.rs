#[allow(unused_imports)]
use super::*;

#[derive(Clone, Copy, PartialEq)]
enum MarkerKind {
    Index,
    Unindex,
}

/// `index`, `unindex`, or either with `(when = EXPR, priority = N)`.
pub(crate) struct ParsedMarker {
    kind: MarkerKind,
    condition: Option<Expr>,
    priority: u8,
}

impl ParsedMarker {
    /// Parse the marker at `meta` if its path is `index` or `unindex`.
    pub(crate) fn parse(meta: &ParseNestedMeta) -> Result<Option<Self>> {
        let kind = if meta.path.is_ident("index") {
            MarkerKind::Index
        } else if meta.path.is_ident("unindex") {
            MarkerKind::Unindex
        } else {
            return Ok(None);
        };

        let mut condition = None;
        let mut priority = 0u8;
        if meta.input.peek(syn::token::Paren) {
            meta.parse_nested_meta(|option| {
                if option.path.is_ident("when") {
                    if condition.is_some() {
                        return Err(option.error("`when` given more than once"));
                    }
                    condition = Some(option.value()?.parse::<Expr>()?);
                } else if option.path.is_ident("priority") {
                    let value: LitInt = option.value()?.parse()?;
                    priority = value.base10_parse()?;
                } else {
                    return Err(option.error("expected `when = ...` or `priority = N`"));
                }
                Ok(())
            })?;
        }

        Ok(Some(Self {
            kind,
            condition,
            priority,
        }))
    }

    pub(crate) fn emit(&self) -> TokenStream2 {
        let priority = self.priority;
        let constructor = match (self.kind, &self.condition) {
            (MarkerKind::Index, None) => quote! { ::dexom::schema::IndexMarker::index() },
            (MarkerKind::Unindex, None) => quote! { ::dexom::schema::IndexMarker::unindex() },
            (kind, Some(expr)) => {
                let condition = emit_condition(expr);
                match kind {
                    MarkerKind::Index => quote! { ::dexom::schema::IndexMarker::index_when(#condition) },
                    MarkerKind::Unindex => quote! { ::dexom::schema::IndexMarker::unindex_when(#condition) },
                }
            }
        };
        quote! { #constructor.with_priority(#priority) }
    }
}

/// The condition expression may implement `ValueIf` or `PojoIf<Self>`; autoref dispatch
/// picks the matching `Condition` variant.
fn emit_condition(expr: &Expr) -> TokenStream2 {
    quote! {
        {
            use ::dexom::condition::dispatch::{PojoKind as _, ValueKind as _};
            let condition = #expr;
            let shape = (&&::dexom::condition::dispatch::Probe::<Self, _>::new(&condition)).condition_shape();
            shape.into_condition::<Self, _>(condition)
        }
    }
}
