//! dexom core library.
//!
//! Document mapper whose fields are indexed, or not, per save: every field resolves to
//! one indexing directive when its type is registered, and the directive is evaluated
//! against the live instance each time it is saved. Embedded entities carry their own
//! directives, and an unindexed container excludes everything inside it.

extern crate self as dexom;

pub mod client;
pub mod condition;
pub mod datastore;
pub mod errors;
pub mod indexing;
pub mod keys;
pub mod registry;
pub mod schema;
pub mod testing;
pub mod types;

pub use client::{Client, QueryBuilder};
pub use condition::{Condition, PojoIf, ValueIf};
pub use datastore::{
    Datastore, EmbeddedEntity, FlatProperty, Key, KeyId, LocalDatastore, Property, PropertyFilter, PropertyMap, Query,
    RedisDatastore, StoredEntity, Value,
};
pub use dexom_macros::Entity;
pub use errors::*;
pub use registry::Registry;
pub use schema::{
    Directive, Embedded, EntityDeclaration, EntitySchema, FieldDeclaration, FieldSchema, IndexMarker, SchemaBuilder,
};
pub use types::Entity;

// Re-export redis types so users don't need to depend on a specific redis version
pub use redis;
pub use redis::aio::ConnectionManager;
