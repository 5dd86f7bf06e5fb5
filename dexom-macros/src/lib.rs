use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, quote};
use syn::{
    Attribute, Data, DeriveInput, Error, Expr, Field, Fields, Ident, LitInt, LitStr, Result, Token, Type,
    meta::ParseNestedMeta, parse_macro_input, spanned::Spanned,
};

mod parsed;

use parsed::ParsedEntity;

/// Derive `dexom::Entity`.
///
/// ```text
/// #[derive(Entity, Serialize, Deserialize)]
/// #[dexom(kind = "Thing", index)]
/// struct Thing {
///     #[dexom(id)]
///     id: Option<i64>,
///     #[dexom(unindex(when = IfFalse))]
///     foo: bool,
///     #[dexom(index(when = IfIndexBar, priority = 1))]
///     bar: String,
///     #[dexom(embedded, unindex)]
///     inner: Option<Inner>,
/// }
/// ```
///
/// Fields are declared under their serialized names, so `#[serde(rename)]` and
/// `#[serde(rename_all)]` are honoured. `#[serde(flatten)]` is rejected.
#[proc_macro_derive(Entity, attributes(dexom))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match ParsedEntity::from_input(&input) {
        Ok(parsed) => parsed.emit().into(),
        Err(err) => err.to_compile_error().into(),
    }
}
