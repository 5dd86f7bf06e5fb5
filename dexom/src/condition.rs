//! Indexing conditions.
//!
//! A condition decides, at save time, whether a conditional index marker applies. It
//! comes in two shapes:
//!
//! * [`ValueIf`] looks only at the serialized value of the field it is attached to.
//! * [`PojoIf`] looks at the whole owning entity, so it can depend on sibling fields.
//!
//! Both are wrapped in [`Condition`], and the shape is fixed when the schema is built.
//!
//! ```
//! use dexom::condition::{Condition, IfFalse, PojoIf};
//! use dexom::ConditionError;
//!
//! struct Flagged {
//!     index_bar: bool,
//! }
//!
//! struct IfIndexBar;
//!
//! impl PojoIf<Flagged> for IfIndexBar {
//!     fn matches_pojo(&self, pojo: &Flagged) -> Result<bool, ConditionError> {
//!         Ok(pojo.index_bar)
//!     }
//! }
//!
//! let by_value: Condition<Flagged> = Condition::value(IfFalse);
//! let by_owner: Condition<Flagged> = Condition::pojo(IfIndexBar);
//! let owner = Flagged { index_bar: true };
//! assert!(!by_value.evaluate(&owner, &serde_json::json!(true)).unwrap());
//! assert!(by_owner.evaluate(&owner, &serde_json::json!(true)).unwrap());
//! ```

use std::{any::type_name, fmt, sync::Arc};

use serde_json::Value as JsonValue;

use crate::errors::ConditionError;

/// Condition over the serialized value of a single field.
pub trait ValueIf: Send + Sync + 'static {
    fn matches_value(&self, value: &JsonValue) -> Result<bool, ConditionError>;

    fn name(&self) -> &'static str {
        short_type_name(type_name::<Self>())
    }
}

/// Condition over the entity that owns the field.
pub trait PojoIf<T>: Send + Sync {
    fn matches_pojo(&self, pojo: &T) -> Result<bool, ConditionError>;

    fn name(&self) -> &'static str {
        short_type_name(type_name::<Self>())
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    match full.find('<') {
        Some(generic) => full[..generic].rsplit("::").next().unwrap_or(full),
        None => full.rsplit("::").next().unwrap_or(full),
    }
}

/// A condition of either shape.
pub enum Condition<T> {
    Value(Arc<dyn ValueIf>),
    Pojo(Arc<dyn PojoIf<T>>),
}

impl<T> Condition<T> {
    pub fn value(condition: impl ValueIf) -> Self {
        Condition::Value(Arc::new(condition))
    }

    pub fn pojo(condition: impl PojoIf<T> + 'static) -> Self {
        Condition::Pojo(Arc::new(condition))
    }

    /// Whole-entity condition from a closure.
    pub fn pojo_fn<F>(condition: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::try_pojo_fn(move |pojo: &T| Ok(condition(pojo)))
    }

    /// Fallible whole-entity condition from a closure.
    pub fn try_pojo_fn<F>(condition: F) -> Self
    where
        F: Fn(&T) -> Result<bool, ConditionError> + Send + Sync + 'static,
    {
        Condition::Pojo(Arc::new(PojoFn(condition)))
    }

    /// Evaluate against the owning entity and the field's serialized value.
    pub fn evaluate(&self, owner: &T, value: &JsonValue) -> Result<bool, ConditionError> {
        match self {
            Condition::Value(condition) => condition.matches_value(value),
            Condition::Pojo(condition) => condition.matches_pojo(owner),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Condition::Value(condition) => condition.name(),
            Condition::Pojo(condition) => condition.name(),
        }
    }
}

impl<T> Clone for Condition<T> {
    fn clone(&self) -> Self {
        match self {
            Condition::Value(condition) => Condition::Value(Arc::clone(condition)),
            Condition::Pojo(condition) => Condition::Pojo(Arc::clone(condition)),
        }
    }
}

impl<T> fmt::Debug for Condition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Value(condition) => write!(f, "Value({})", condition.name()),
            Condition::Pojo(condition) => write!(f, "Pojo({})", condition.name()),
        }
    }
}

struct PojoFn<F>(F);

impl<T, F> PojoIf<T> for PojoFn<F>
where
    F: Fn(&T) -> Result<bool, ConditionError> + Send + Sync + 'static,
{
    fn matches_pojo(&self, pojo: &T) -> Result<bool, ConditionError> {
        (self.0)(pojo)
    }

    fn name(&self) -> &'static str {
        "closure"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Built-in value conditions
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! value_condition {
    ($(#[$doc:meta])* $name:ident, |$value:ident| $body:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl ValueIf for $name {
            fn matches_value(&self, $value: &JsonValue) -> Result<bool, ConditionError> {
                Ok($body)
            }
        }
    };
}

value_condition!(
    /// Always matches.
    Always,
    |_value| true
);

value_condition!(
    /// Never matches.
    Never,
    |_value| false
);

value_condition!(IfTrue, |value| value.as_bool() == Some(true));

value_condition!(IfFalse, |value| value.as_bool() == Some(false));

value_condition!(IfNull, |value| value.is_null());

value_condition!(IfNotNull, |value| !value.is_null());

value_condition!(IfZero, |value| value.as_f64() == Some(0.0));

value_condition!(IfNotZero, |value| value.as_f64().is_some_and(|number| number != 0.0));

value_condition!(
    /// Null, an empty string, an empty array or an empty object.
    IfEmpty,
    |value| is_empty(value)
);

value_condition!(IfNotEmpty, |value| !is_empty(value));

value_condition!(
    /// The value a field holds after `Default::default()`: null, `false`, zero, or empty.
    IfDefault,
    |value| is_default(value)
);

value_condition!(IfNotDefault, |value| !is_default(value));

fn is_empty(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(string) => string.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        JsonValue::Bool(_) | JsonValue::Number(_) => false,
    }
}

fn is_default(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(flag) => !flag,
        JsonValue::Number(number) => number.as_f64() == Some(0.0),
        other => is_empty(other),
    }
}

/// Shape selection used by `#[derive(Entity)]`.
///
/// The derive sees only a condition expression, not which trait its type implements.
/// Method resolution on `&&Probe` prefers [`ValueKind`] (implemented for `&Probe`) and
/// falls back to [`PojoKind`] (implemented for `Probe`) through auto-deref.
#[doc(hidden)]
pub mod dispatch {
    use std::marker::PhantomData;

    use super::{Condition, PojoIf, ValueIf};

    pub struct Probe<'a, T, C> {
        _condition: &'a C,
        _owner: PhantomData<fn(&T)>,
    }

    impl<'a, T, C> Probe<'a, T, C> {
        pub fn new(condition: &'a C) -> Self {
            Self {
                _condition: condition,
                _owner: PhantomData,
            }
        }
    }

    pub struct ValueShape;

    pub struct PojoShape;

    pub trait ValueKind {
        fn condition_shape(&self) -> ValueShape {
            ValueShape
        }
    }

    impl<T, C: ValueIf> ValueKind for &Probe<'_, T, C> {}

    pub trait PojoKind {
        fn condition_shape(&self) -> PojoShape {
            PojoShape
        }
    }

    impl<T, C: PojoIf<T>> PojoKind for Probe<'_, T, C> {}

    impl ValueShape {
        pub fn into_condition<T, C: ValueIf>(self, condition: C) -> Condition<T> {
            Condition::value(condition)
        }
    }

    impl PojoShape {
        pub fn into_condition<T, C: PojoIf<T> + 'static>(self, condition: C) -> Condition<T> {
            Condition::pojo(condition)
        }
    }
}
