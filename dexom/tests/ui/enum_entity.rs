//! Compile-fail test: Entity on an enum.

use dexom::Entity;

#[derive(Entity)]
pub enum Shape {
    Circle,
}

fn main() {}
