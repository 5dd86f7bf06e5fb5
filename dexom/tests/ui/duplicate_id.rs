//! Compile-fail test: two #[dexom(id)] fields.

use dexom::Entity;

#[derive(Entity)]
pub struct TwoIds {
    #[dexom(id)]
    pub id: Option<i64>,
    #[dexom(id)]
    pub other: Option<i64>,
}

fn main() {}
