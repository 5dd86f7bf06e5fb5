use redis::Script;
use std::sync::LazyLock;

pub const ENTITY_PUT_SCRIPT_BODY: &str = include_str!("../../lua/entity_put.lua");
pub const ENTITY_DELETE_SCRIPT_BODY: &str = include_str!("../../lua/entity_delete.lua");

pub static ENTITY_PUT_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(ENTITY_PUT_SCRIPT_BODY));
pub static ENTITY_DELETE_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(ENTITY_DELETE_SCRIPT_BODY));
