//! Compile-fail test: #[serde(flatten)] fields.

use dexom::Entity;
use serde::Serialize;

#[derive(Serialize)]
pub struct Extra {
    pub note: String,
}

#[derive(Entity, Serialize)]
pub struct Flattened {
    #[dexom(id)]
    pub id: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

fn main() {}
