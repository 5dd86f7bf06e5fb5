//! Compile-fail test: no #[dexom(id)] field.

use dexom::Entity;

#[derive(Entity)]
pub struct NoId {
    pub foo: bool,
}

fn main() {}
