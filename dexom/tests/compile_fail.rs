//! Compile-fail tests for `#[derive(Entity)]`.
//!
//! Covers: missing or duplicate id, unsupported id types, unknown options, enums, and
//! `#[serde(flatten)]` fields.

#[test]
fn compile_fail_tests() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/ui/*.rs");
}
