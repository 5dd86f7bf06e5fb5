//! Index declarations and the immutable schemas resolved from them.
//!
//! An [`EntityDeclaration`] lists the raw markers: entity-level defaults and per-field
//! `index` / `unindex` markers, optionally conditional. [`SchemaBuilder`] resolves them
//! into exactly one [`Directive`] per field, once, when the type is registered.
//!
//! # Precedence
//!
//! 1. Field markers beat entity markers.
//! 2. Within a level, the highest `priority` wins (markers default to 0).
//! 3. Markers left tied must be identical and unconditional, otherwise registration
//!    fails with [`RepoError::AmbiguousDirective`].
//! 4. With no marker at either level a field is unindexed.

use std::{any::type_name, collections::HashSet, fmt, sync::Arc};

use log::debug;
use serde_json::Value as JsonValue;

use crate::{
    condition::Condition,
    errors::{ConditionError, RepoError},
    indexing::NestedSchema,
    types::Entity,
};

/// Embedded entities may nest at most this deep.
const MAX_EMBED_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Index,
    Unindex,
}

/// Where a marker was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerSource {
    Entity,
    Field,
}

/// A single `index` / `unindex` declaration, optionally guarded by a condition.
pub struct IndexMarker<T> {
    kind: MarkerKind,
    condition: Option<Condition<T>>,
    priority: u8,
    source: MarkerSource,
}

impl<T> IndexMarker<T> {
    fn new(kind: MarkerKind, condition: Option<Condition<T>>) -> Self {
        Self {
            kind,
            condition,
            priority: 0,
            source: MarkerSource::Field,
        }
    }

    pub fn index() -> Self {
        Self::new(MarkerKind::Index, None)
    }

    pub fn unindex() -> Self {
        Self::new(MarkerKind::Unindex, None)
    }

    /// Index only when `condition` matches.
    pub fn index_when(condition: Condition<T>) -> Self {
        Self::new(MarkerKind::Index, Some(condition))
    }

    /// Unindex only when `condition` matches; indexed otherwise.
    pub fn unindex_when(condition: Condition<T>) -> Self {
        Self::new(MarkerKind::Unindex, Some(condition))
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn kind(&self) -> MarkerKind {
        self.kind
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn source(&self) -> MarkerSource {
        self.source
    }

    fn directive(&self) -> Directive<T> {
        match (self.kind, &self.condition) {
            (MarkerKind::Index, None) => Directive::AlwaysIndexed,
            (MarkerKind::Unindex, None) => Directive::AlwaysUnindexed,
            (MarkerKind::Index, Some(condition)) => Directive::ConditionallyIndexed(condition.clone()),
            (MarkerKind::Unindex, Some(condition)) => Directive::ConditionallyUnindexed(condition.clone()),
        }
    }

    fn describe(&self) -> String {
        let kind = match self.kind {
            MarkerKind::Index => "index",
            MarkerKind::Unindex => "unindex",
        };
        match &self.condition {
            Some(condition) => format!("{kind}(when = {}, priority = {})", condition.name(), self.priority),
            None => format!("{kind}(priority = {})", self.priority),
        }
    }
}

impl<T> fmt::Debug for IndexMarker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// The effective indexing rule for one field.
pub enum Directive<T> {
    AlwaysIndexed,
    AlwaysUnindexed,
    ConditionallyIndexed(Condition<T>),
    ConditionallyUnindexed(Condition<T>),
}

impl<T> Directive<T> {
    /// Whether the field's value is excluded from indexes for this save.
    pub fn evaluate(&self, owner: &T, value: &JsonValue) -> Result<bool, ConditionError> {
        match self {
            Directive::AlwaysIndexed => Ok(false),
            Directive::AlwaysUnindexed => Ok(true),
            Directive::ConditionallyIndexed(condition) => Ok(!condition.evaluate(owner, value)?),
            Directive::ConditionallyUnindexed(condition) => condition.evaluate(owner, value),
        }
    }

    /// True when the field can never appear in an index.
    pub fn is_never_indexed(&self) -> bool {
        matches!(self, Directive::AlwaysUnindexed)
    }
}

impl<T> Clone for Directive<T> {
    fn clone(&self) -> Self {
        match self {
            Directive::AlwaysIndexed => Directive::AlwaysIndexed,
            Directive::AlwaysUnindexed => Directive::AlwaysUnindexed,
            Directive::ConditionallyIndexed(condition) => Directive::ConditionallyIndexed(condition.clone()),
            Directive::ConditionallyUnindexed(condition) => Directive::ConditionallyUnindexed(condition.clone()),
        }
    }
}

impl<T> fmt::Debug for Directive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::AlwaysIndexed => f.write_str("AlwaysIndexed"),
            Directive::AlwaysUnindexed => f.write_str("AlwaysUnindexed"),
            Directive::ConditionallyIndexed(condition) => write!(f, "ConditionallyIndexed({condition:?})"),
            Directive::ConditionallyUnindexed(condition) => write!(f, "ConditionallyUnindexed({condition:?})"),
        }
    }
}

/// Marks a field as holding an embedded entity (`E`, `Option<E>` or `Vec<E>`).
pub struct Embedded {
    type_name: &'static str,
    build: fn(usize) -> Result<Arc<dyn NestedSchema>, RepoError>,
}

impl Embedded {
    pub fn of<E: Entity>() -> Self {
        Self {
            type_name: type_name::<E>(),
            build: build_nested::<E>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

fn build_nested<E: Entity>(depth: usize) -> Result<Arc<dyn NestedSchema>, RepoError> {
    let schema: Arc<dyn NestedSchema> = Arc::new(SchemaBuilder::build_at_depth::<E>(depth)?);
    Ok(schema)
}

/// One field, declared under its serialized name.
pub struct FieldDeclaration<T> {
    name: &'static str,
    markers: Vec<IndexMarker<T>>,
    embedded: Option<Embedded>,
    optional: bool,
}

impl<T> FieldDeclaration<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            markers: Vec::new(),
            embedded: None,
            optional: false,
        }
    }

    /// The field may be missing from the serialized entity (`skip_serializing_if`).
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn marker(mut self, mut marker: IndexMarker<T>) -> Self {
        marker.source = MarkerSource::Field;
        self.markers.push(marker);
        self
    }

    pub fn embedded(mut self, embedded: Embedded) -> Self {
        self.embedded = Some(embedded);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn markers(&self) -> &[IndexMarker<T>] {
        &self.markers
    }
}

/// Everything declared about an entity type, before resolution.
pub struct EntityDeclaration<T> {
    kind: &'static str,
    id_field: &'static str,
    markers: Vec<IndexMarker<T>>,
    fields: Vec<FieldDeclaration<T>>,
}

impl<T> EntityDeclaration<T> {
    pub fn new(kind: &'static str, id_field: &'static str) -> Self {
        Self {
            kind,
            id_field,
            markers: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Entity-level default, applied to fields without markers of their own.
    pub fn marker(mut self, mut marker: IndexMarker<T>) -> Self {
        marker.source = MarkerSource::Entity;
        self.markers.push(marker);
        self
    }

    pub fn field(mut self, field: FieldDeclaration<T>) -> Self {
        self.fields.push(field);
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Entity-level markers.
    pub fn markers(&self) -> &[IndexMarker<T>] {
        &self.markers
    }

    pub fn fields(&self) -> &[FieldDeclaration<T>] {
        &self.fields
    }
}

/// Resolved rule for one field.
pub struct FieldSchema<T> {
    name: &'static str,
    directive: Directive<T>,
    nested: Option<Arc<dyn NestedSchema>>,
    optional: bool,
}

impl<T> FieldSchema<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn directive(&self) -> &Directive<T> {
        &self.directive
    }

    pub fn is_embedded(&self) -> bool {
        self.nested.is_some()
    }

    /// Whether the serialized entity may omit this field.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Kind of the embedded entity, if the field holds one.
    pub fn embedded_kind(&self) -> Option<&'static str> {
        self.nested.as_ref().map(|nested| nested.kind())
    }

    pub(crate) fn nested(&self) -> Option<&dyn NestedSchema> {
        self.nested.as_deref()
    }
}

impl<T> fmt::Debug for FieldSchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSchema")
            .field("name", &self.name)
            .field("directive", &self.directive)
            .field("embedded", &self.embedded_kind())
            .finish()
    }
}

/// Immutable, resolved indexing schema of an entity type.
pub struct EntitySchema<T> {
    kind: &'static str,
    id_field: &'static str,
    default_directive: Directive<T>,
    fields: Vec<FieldSchema<T>>,
}

impl<T> EntitySchema<T> {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn id_field(&self) -> &'static str {
        self.id_field
    }

    /// Directive for serialized keys that have no field declaration.
    pub fn default_directive(&self) -> &Directive<T> {
        &self.default_directive
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldSchema<T>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema<T>> {
        self.fields.iter().find(|field| field.name == name)
    }
}

impl<T> fmt::Debug for EntitySchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("kind", &self.kind)
            .field("id_field", &self.id_field)
            .field("default_directive", &self.default_directive)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Resolves declarations into schemas.
pub struct SchemaBuilder;

impl SchemaBuilder {
    /// Build the schema of `T`, including the schemas of its embedded fields.
    pub fn build<T: Entity>() -> Result<EntitySchema<T>, RepoError> {
        Self::build_at_depth::<T>(0)
    }

    pub(crate) fn build_at_depth<T: Entity>(depth: usize) -> Result<EntitySchema<T>, RepoError> {
        if depth > MAX_EMBED_DEPTH {
            return Err(RepoError::InvalidSchema {
                message: format!(
                    "{} embeds entities more than {MAX_EMBED_DEPTH} levels deep; recursive embedding is not supported",
                    T::KIND
                ),
            });
        }
        Self::from_declaration(T::declaration(), depth)
    }

    pub fn from_declaration<T>(declaration: EntityDeclaration<T>, depth: usize) -> Result<EntitySchema<T>, RepoError> {
        let EntityDeclaration {
            kind,
            id_field,
            markers,
            fields,
        } = declaration;

        let default_directive =
            Self::resolve_level(kind, "*", &markers)?.unwrap_or(Directive::AlwaysUnindexed);

        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(fields.len());
        for field in fields {
            if field.name == id_field {
                return Err(RepoError::InvalidSchema {
                    message: format!("{kind}.{id_field} is the id field and cannot carry index markers"),
                });
            }
            if !seen.insert(field.name) {
                return Err(RepoError::InvalidSchema {
                    message: format!("{kind}.{} is declared more than once", field.name),
                });
            }

            let directive = Self::resolve_directive(kind, &field, &markers)?;
            let nested = match &field.embedded {
                Some(embedded) => Some((embedded.build)(depth + 1)?),
                None => None,
            };
            debug!("{kind}.{} resolved to {directive:?}", field.name);
            resolved.push(FieldSchema {
                name: field.name,
                directive,
                nested,
                optional: field.optional,
            });
        }

        Ok(EntitySchema {
            kind,
            id_field,
            default_directive,
            fields: resolved,
        })
    }

    /// Pick the directive for one field: field markers first, then entity markers,
    /// then the unindexed default.
    pub fn resolve_directive<T>(
        kind: &str,
        field: &FieldDeclaration<T>,
        entity_markers: &[IndexMarker<T>],
    ) -> Result<Directive<T>, RepoError> {
        if let Some(directive) = Self::resolve_level(kind, field.name, &field.markers)? {
            return Ok(directive);
        }
        Ok(Self::resolve_level(kind, field.name, entity_markers)?.unwrap_or(Directive::AlwaysUnindexed))
    }

    fn resolve_level<T>(kind: &str, field: &str, markers: &[IndexMarker<T>]) -> Result<Option<Directive<T>>, RepoError> {
        let Some(top) = markers.iter().map(|marker| marker.priority).max() else {
            return Ok(None);
        };
        let winners: Vec<&IndexMarker<T>> = markers.iter().filter(|marker| marker.priority == top).collect();

        let first = winners[0];
        let agree = winners
            .iter()
            .all(|marker| marker.condition.is_none() && marker.kind == first.kind);
        if winners.len() == 1 || agree {
            return Ok(Some(first.directive()));
        }

        Err(RepoError::AmbiguousDirective {
            kind: kind.to_string(),
            field: field.to_string(),
            markers: winners.iter().map(|marker| marker.describe()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{IfFalse, IfTrue};
    use serde_json::json;

    struct Owner;

    fn resolve(field: FieldDeclaration<Owner>, entity: Vec<IndexMarker<Owner>>) -> Result<Directive<Owner>, RepoError> {
        let mut declaration = EntityDeclaration::new("Owner", "id");
        for marker in entity {
            declaration = declaration.marker(marker);
        }
        SchemaBuilder::resolve_directive("Owner", &field, declaration.markers())
    }

    #[test]
    fn unmarked_fields_default_to_unindexed() {
        let directive = resolve(FieldDeclaration::new("foo"), vec![]).unwrap();
        assert!(matches!(directive, Directive::AlwaysUnindexed));
    }

    #[test]
    fn entity_marker_applies_to_unmarked_fields() {
        let directive = resolve(FieldDeclaration::new("foo"), vec![IndexMarker::index()]).unwrap();
        assert!(matches!(directive, Directive::AlwaysIndexed));
    }

    #[test]
    fn field_marker_beats_entity_marker() {
        let field = FieldDeclaration::new("foo").marker(IndexMarker::unindex_when(Condition::value(IfFalse)));
        let directive = resolve(field, vec![IndexMarker::index().with_priority(9)]).unwrap();
        assert!(matches!(directive, Directive::ConditionallyUnindexed(_)));
    }

    #[test]
    fn conflicting_field_markers_are_ambiguous() {
        let field = FieldDeclaration::new("foo")
            .marker(IndexMarker::index())
            .marker(IndexMarker::unindex());
        let err = resolve(field, vec![]).unwrap_err();
        match err {
            RepoError::AmbiguousDirective { kind, field, markers } => {
                assert_eq!(kind, "Owner");
                assert_eq!(field, "foo");
                assert_eq!(markers, vec!["index(priority = 0)", "unindex(priority = 0)"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn two_conditional_markers_are_ambiguous_even_if_same_kind() {
        let field = FieldDeclaration::new("foo")
            .marker(IndexMarker::index_when(Condition::value(IfTrue)))
            .marker(IndexMarker::index_when(Condition::value(IfFalse)));
        assert!(matches!(resolve(field, vec![]), Err(RepoError::AmbiguousDirective { .. })));
    }

    #[test]
    fn priority_breaks_ties() {
        let field = FieldDeclaration::new("foo")
            .marker(IndexMarker::index())
            .marker(IndexMarker::unindex_when(Condition::value(IfFalse)).with_priority(1));
        let directive = resolve(field, vec![]).unwrap();
        assert!(matches!(directive, Directive::ConditionallyUnindexed(_)));
    }

    #[test]
    fn duplicate_identical_markers_collapse() {
        let field = FieldDeclaration::new("foo")
            .marker(IndexMarker::index())
            .marker(IndexMarker::index());
        assert!(matches!(resolve(field, vec![]).unwrap(), Directive::AlwaysIndexed));
    }

    #[test]
    fn directive_evaluation_table() {
        let value = json!(false);
        assert!(!Directive::<Owner>::AlwaysIndexed.evaluate(&Owner, &value).unwrap());
        assert!(Directive::<Owner>::AlwaysUnindexed.evaluate(&Owner, &value).unwrap());
        let indexed_if_false = Directive::ConditionallyIndexed(Condition::<Owner>::value(IfFalse));
        assert!(!indexed_if_false.evaluate(&Owner, &value).unwrap());
        assert!(indexed_if_false.evaluate(&Owner, &json!(true)).unwrap());
        let unindexed_if_false = Directive::ConditionallyUnindexed(Condition::<Owner>::value(IfFalse));
        assert!(unindexed_if_false.evaluate(&Owner, &value).unwrap());
        assert!(!unindexed_if_false.evaluate(&Owner, &json!(true)).unwrap());
    }

    #[test]
    fn id_field_and_duplicates_are_rejected() {
        let declaration = EntityDeclaration::<Owner>::new("Owner", "id").field(FieldDeclaration::new("id"));
        assert!(matches!(
            SchemaBuilder::from_declaration(declaration, 0),
            Err(RepoError::InvalidSchema { .. })
        ));

        let declaration = EntityDeclaration::<Owner>::new("Owner", "id")
            .field(FieldDeclaration::new("foo"))
            .field(FieldDeclaration::new("foo"));
        assert!(matches!(
            SchemaBuilder::from_declaration(declaration, 0),
            Err(RepoError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn schema_keeps_declaration_order() {
        let declaration = EntityDeclaration::<Owner>::new("Owner", "id")
            .marker(IndexMarker::index())
            .field(FieldDeclaration::new("b"))
            .field(FieldDeclaration::new("a").marker(IndexMarker::unindex()));
        let schema = SchemaBuilder::from_declaration(declaration, 0).unwrap();
        let names: Vec<&str> = schema.fields().iter().map(|field| field.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(matches!(schema.default_directive(), Directive::AlwaysIndexed));
        assert!(schema.field("a").unwrap().directive().is_never_indexed());
        assert!(!schema.field("b").unwrap().is_embedded());
    }
}
