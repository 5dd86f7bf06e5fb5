#[allow(unused_imports)]
use super::*;

/// Supported id field types.
#[derive(Clone, Copy)]
pub(crate) enum IdKind {
    /// `Option<i64>`: `None` until the datastore allocates an id.
    OptionalNumeric,
    /// `i64`: zero means unassigned.
    Numeric,
    /// `String`: empty means unassigned.
    Name,
}

pub(crate) struct ParsedField {
    pub(crate) ident: Ident,
    /// Serialized name, after serde renames.
    pub(crate) name: String,
    pub(crate) skipped: bool,
    optional: bool,
    pub(crate) id: Option<IdKind>,
    pub(crate) embedded: Option<Type>,
    pub(crate) markers: Vec<ParsedMarker>,
}

impl ParsedField {
    pub(crate) fn from_field(field: &Field, container: &SerdeContainer) -> Result<Self> {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| Error::new(field.span(), "Entity requires named fields"))?;
        let serde = SerdeField::from_field(field, &ident, container)?;

        let mut parsed = Self {
            ident,
            name: serde.name,
            skipped: serde.skipped,
            optional: serde.optional,
            id: None,
            embedded: None,
            markers: Vec::new(),
        };

        for attr in &field.attrs {
            if attr.path().is_ident("dexom") {
                parsed.parse_field_attr(attr, &field.ty)?;
            }
        }

        if parsed.id.is_some() && (!parsed.markers.is_empty() || parsed.embedded.is_some()) {
            return Err(Error::new(
                field.span(),
                "#[dexom(id)] fields are the entity key and cannot carry index markers",
            ));
        }

        if parsed.skipped && (parsed.id.is_some() || !parsed.markers.is_empty() || parsed.embedded.is_some()) {
            return Err(Error::new(
                field.span(),
                "fields skipped by serde are never stored and cannot carry dexom options",
            ));
        }

        Ok(parsed)
    }

    fn parse_field_attr(&mut self, attr: &Attribute, ty: &Type) -> Result<()> {
        attr.parse_nested_meta(|meta| {
            if let Some(marker) = ParsedMarker::parse(&meta)? {
                self.markers.push(marker);
            } else if meta.path.is_ident("id") {
                if self.id.is_some() {
                    return Err(meta.error("field already marked as #[dexom(id)]"));
                }
                self.id = Some(classify_id(ty).ok_or_else(|| {
                    meta.error("#[dexom(id)] requires a field of type Option<i64>, i64 or String")
                })?);
            } else if meta.path.is_ident("embedded") {
                if self.embedded.is_some() {
                    return Err(meta.error("field already marked as #[dexom(embedded)]"));
                }
                self.embedded = Some(innermost_type(ty).clone());
            } else {
                let option = meta.path.to_token_stream().to_string();
                return Err(meta.error(format!(
                    "unknown dexom field option `{option}`, expected `id`, `embedded`, `index` or `unindex`"
                )));
            }
            Ok(())
        })
    }

    pub(crate) fn emit_declaration(&self) -> TokenStream2 {
        let name = LitStr::new(&self.name, self.ident.span());
        let markers = self.markers.iter().map(|marker| {
            let marker = marker.emit();
            quote! { .marker(#marker) }
        });
        let embedded = self.embedded.as_ref().map(|ty| {
            quote! { .embedded(::dexom::schema::Embedded::of::<#ty>()) }
        });
        let optional = self.optional.then(|| quote! { .optional() });
        quote! {
            ::dexom::schema::FieldDeclaration::new(#name)
                #(#markers)*
                #embedded
                #optional
        }
    }
}

fn classify_id(ty: &Type) -> Option<IdKind> {
    if let Some(inner) = wrapped_type(ty) {
        return match (last_ident_str(ty).as_deref(), last_ident_str(inner).as_deref()) {
            (Some("Option"), Some("i64")) => Some(IdKind::OptionalNumeric),
            _ => None,
        };
    }
    match last_ident_str(ty).as_deref() {
        Some("i64") => Some(IdKind::Numeric),
        Some("String") => Some(IdKind::Name),
        _ => None,
    }
}
