//! Compile-fail test: #[dexom(id)] on an unsupported type.

use dexom::Entity;

#[derive(Entity)]
pub struct BadId {
    #[dexom(id)]
    pub id: u32,
}

fn main() {}
