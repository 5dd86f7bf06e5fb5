#[allow(unused_imports)]
use super::*;

use syn::ext::IdentExt;

/// `rename_all` casing, applied to snake_case field names the way serde applies it.
#[derive(Clone, Copy)]
pub(crate) enum RenameRule {
    Lower,
    Upper,
    Pascal,
    Camel,
    Snake,
    ScreamingSnake,
    Kebab,
    ScreamingKebab,
}

impl RenameRule {
    fn from_lit(lit: &LitStr) -> Result<Self> {
        Ok(match lit.value().as_str() {
            "lowercase" => Self::Lower,
            "UPPERCASE" => Self::Upper,
            "PascalCase" => Self::Pascal,
            "camelCase" => Self::Camel,
            "snake_case" => Self::Snake,
            "SCREAMING_SNAKE_CASE" => Self::ScreamingSnake,
            "kebab-case" => Self::Kebab,
            "SCREAMING-KEBAB-CASE" => Self::ScreamingKebab,
            other => return Err(Error::new(lit.span(), format!("unknown rename_all rule `{other}`"))),
        })
    }

    pub(crate) fn apply(self, field: &str) -> String {
        match self {
            Self::Lower | Self::Snake => field.to_string(),
            Self::Upper | Self::ScreamingSnake => field.to_ascii_uppercase(),
            Self::Pascal => {
                let mut pascal = String::with_capacity(field.len());
                let mut capitalize = true;
                for ch in field.chars() {
                    if ch == '_' {
                        capitalize = true;
                    } else if capitalize {
                        pascal.push(ch.to_ascii_uppercase());
                        capitalize = false;
                    } else {
                        pascal.push(ch);
                    }
                }
                pascal
            }
            Self::Camel => {
                let pascal = Self::Pascal.apply(field);
                let mut chars = pascal.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                    None => pascal,
                }
            }
            Self::Kebab => field.replace('_', "-"),
            Self::ScreamingKebab => field.to_ascii_uppercase().replace('_', "-"),
        }
    }
}

/// Serde options that change the serialized shape of a struct.
#[derive(Default)]
pub(crate) struct SerdeContainer {
    pub(crate) rename_all: Option<RenameRule>,
}

impl SerdeContainer {
    pub(crate) fn from_attrs(attrs: &[Attribute]) -> Result<Self> {
        let mut container = Self::default();
        for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename_all") {
                    let rule = serialized_rule(&meta)?;
                    container.rename_all = Some(rule);
                } else {
                    skip_meta_value(&meta)?;
                }
                Ok(())
            })?;
        }
        Ok(container)
    }
}

/// Serde options that change how one field appears in the serialized object.
pub(crate) struct SerdeField {
    /// Key the field is written under.
    pub(crate) name: String,
    /// `skip` or `skip_serializing`: the field never appears.
    pub(crate) skipped: bool,
    /// `skip_serializing_if`: the field may be absent.
    pub(crate) optional: bool,
}

impl SerdeField {
    pub(crate) fn from_field(field: &Field, ident: &Ident, container: &SerdeContainer) -> Result<Self> {
        let plain = ident.unraw().to_string();
        let mut rename = None;
        let mut skipped = false;
        let mut optional = false;

        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    rename = Some(serialized_name(&meta)?);
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                    skipped = true;
                } else if meta.path.is_ident("skip_serializing_if") {
                    optional = true;
                    skip_meta_value(&meta)?;
                } else if meta.path.is_ident("flatten") {
                    return Err(meta.error("Entity does not support #[serde(flatten)] fields"));
                } else {
                    skip_meta_value(&meta)?;
                }
                Ok(())
            })?;
        }

        let name = match (rename, container.rename_all) {
            (Some(name), _) => name,
            (None, Some(rule)) => rule.apply(&plain),
            (None, None) => plain,
        };

        Ok(Self {
            name,
            skipped,
            optional,
        })
    }
}

/// `rename = "x"` or `rename(serialize = "x", deserialize = "x")`.
fn serialized_name(meta: &ParseNestedMeta) -> Result<String> {
    if meta.input.peek(Token![=]) {
        let lit: LitStr = meta.value()?.parse()?;
        return Ok(lit.value());
    }
    let (serialize, deserialize) = split_lits(meta)?;
    match (serialize, deserialize) {
        (Some(ser), Some(de)) if ser.value() != de.value() => Err(Error::new(
            de.span(),
            "Entity fields must serialize and deserialize under the same name",
        )),
        (Some(ser), _) => Ok(ser.value()),
        _ => Err(meta.error("Entity fields renamed for deserialization only are not supported")),
    }
}

fn serialized_rule(meta: &ParseNestedMeta) -> Result<RenameRule> {
    if meta.input.peek(Token![=]) {
        let lit: LitStr = meta.value()?.parse()?;
        return RenameRule::from_lit(&lit);
    }
    let (serialize, deserialize) = split_lits(meta)?;
    match (serialize, deserialize) {
        (Some(ser), Some(de)) if ser.value() != de.value() => Err(Error::new(
            de.span(),
            "Entity requires the same rename_all rule for serialization and deserialization",
        )),
        (Some(ser), _) => RenameRule::from_lit(&ser),
        _ => Err(meta.error("Entity requires rename_all to cover serialization")),
    }
}

fn split_lits(meta: &ParseNestedMeta) -> Result<(Option<LitStr>, Option<LitStr>)> {
    let mut serialize = None;
    let mut deserialize = None;
    meta.parse_nested_meta(|inner| {
        let lit: LitStr = inner.value()?.parse()?;
        if inner.path.is_ident("serialize") {
            serialize = Some(lit);
        } else if inner.path.is_ident("deserialize") {
            deserialize = Some(lit);
        }
        Ok(())
    })?;
    Ok((serialize, deserialize))
}

/// Consume `= value` or `(...)` after an option dexom does not interpret.
fn skip_meta_value(meta: &ParseNestedMeta) -> Result<()> {
    if meta.input.peek(Token![=]) {
        let _: Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        let _: proc_macro2::TokenTree = meta.input.parse()?;
    }
    Ok(())
}
