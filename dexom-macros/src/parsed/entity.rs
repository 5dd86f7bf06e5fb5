#[allow(unused_imports)]
use super::*;

pub(crate) struct ParsedEntity {
    input: DeriveInput,
    kind: String,
    markers: Vec<ParsedMarker>,
    id_field: Ident,
    id_name: String,
    id_kind: IdKind,
    fields: Vec<ParsedField>,
}

impl ParsedEntity {
    pub(crate) fn from_input(input: &DeriveInput) -> Result<Self> {
        let mut kind = None;
        let mut markers = Vec::new();

        for attr in &input.attrs {
            if attr.path().is_ident("dexom") {
                Self::parse_container_attr(attr, &mut kind, &mut markers)?;
            }
        }

        let container = SerdeContainer::from_attrs(&input.attrs)?;
        let fields = match &input.data {
            Data::Struct(data) => match &data.fields {
                Fields::Named(named) => {
                    let mut parsed = Vec::new();
                    for field in &named.named {
                        parsed.push(ParsedField::from_field(field, &container)?);
                    }
                    parsed
                }
                _ => return Err(Error::new(input.ident.span(), "Entity requires named fields")),
            },
            _ => return Err(Error::new(input.ident.span(), "Entity can only be derived for structs")),
        };

        let mut id: Option<(Ident, String, IdKind)> = None;
        for field in &fields {
            if let Some(id_kind) = field.id {
                if id.is_some() {
                    return Err(Error::new(
                        field.ident.span(),
                        "Entity allows exactly one #[dexom(id)] field",
                    ));
                }
                id = Some((field.ident.clone(), field.name.clone(), id_kind));
            }
        }

        let (id_field, id_name, id_kind) = id.ok_or_else(|| {
            Error::new(input.ident.span(), "Entity requires a field annotated with #[dexom(id)]")
        })?;

        Ok(Self {
            input: input.clone(),
            kind: kind.unwrap_or_else(|| input.ident.to_string()),
            markers,
            id_field,
            id_name,
            id_kind,
            fields,
        })
    }

    fn parse_container_attr(attr: &Attribute, kind: &mut Option<String>, markers: &mut Vec<ParsedMarker>) -> Result<()> {
        attr.parse_nested_meta(|meta| {
            if let Some(marker) = ParsedMarker::parse(&meta)? {
                markers.push(marker);
            } else if meta.path.is_ident("kind") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().is_empty() {
                    return Err(Error::new(value.span(), "kind must not be empty"));
                }
                *kind = Some(value.value());
            } else {
                let option = meta.path.to_token_stream().to_string();
                return Err(meta.error(format!(
                    "unknown dexom option `{option}`, expected `kind`, `index` or `unindex`"
                )));
            }
            Ok(())
        })
    }

    pub(crate) fn emit(&self) -> TokenStream2 {
        let name = &self.input.ident;
        let (impl_generics, ty_generics, where_clause) = self.input.generics.split_for_impl();
        let kind = LitStr::new(&self.kind, name.span());
        let id_ident = &self.id_field;
        let id_field_lit = LitStr::new(&self.id_name, self.id_field.span());

        let entity_markers = self.markers.iter().map(|marker| {
            let marker = marker.emit();
            quote! { .marker(#marker) }
        });
        let field_declarations = self
            .fields
            .iter()
            .filter(|field| field.id.is_none() && !field.skipped)
            .map(|field| {
                let declaration = field.emit_declaration();
                quote! { .field(#declaration) }
            });

        let (entity_id, assign_id) = match self.id_kind {
            IdKind::OptionalNumeric => (
                quote! { self.#id_ident.map(::dexom::datastore::KeyId::Id) },
                quote! { self.#id_ident = ::core::option::Option::Some(id); },
            ),
            IdKind::Numeric => (
                quote! {
                    if self.#id_ident == 0 {
                        ::core::option::Option::None
                    } else {
                        ::core::option::Option::Some(::dexom::datastore::KeyId::Id(self.#id_ident))
                    }
                },
                quote! { self.#id_ident = id; },
            ),
            IdKind::Name => (
                quote! {
                    if self.#id_ident.is_empty() {
                        ::core::option::Option::None
                    } else {
                        ::core::option::Option::Some(::dexom::datastore::KeyId::Name(self.#id_ident.clone()))
                    }
                },
                quote! { self.#id_ident = id.to_string(); },
            ),
        };

        quote! {
            impl #impl_generics ::dexom::types::Entity for #name #ty_generics #where_clause {
                const KIND: &'static str = #kind;
                const ID_FIELD: &'static str = #id_field_lit;

                fn declaration() -> ::dexom::schema::EntityDeclaration<Self> {
                    ::dexom::schema::EntityDeclaration::new(
                        <Self as ::dexom::types::Entity>::KIND,
                        <Self as ::dexom::types::Entity>::ID_FIELD,
                    )
                    #(#entity_markers)*
                    #(#field_declarations)*
                }

                fn entity_id(&self) -> ::core::option::Option<::dexom::datastore::KeyId> {
                    #entity_id
                }

                fn assign_id(&mut self, id: i64) {
                    #assign_id
                }
            }
        }
    }
}
