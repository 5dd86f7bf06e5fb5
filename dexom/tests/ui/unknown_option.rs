//! Compile-fail test: misspelled field option.

use dexom::Entity;

#[derive(Entity)]
pub struct Unknown {
    #[dexom(id)]
    pub id: Option<i64>,
    #[dexom(indexed)]
    pub name: String,
}

fn main() {}
