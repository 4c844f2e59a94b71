//! Entity trait - common interface for all entity types

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{Type, Value};
use rusqlite::Row;
use serde::{de::DeserializeOwned, Serialize};

use crate::core::error::ResourceResult;
use crate::core::identity::{EntityId, EntityKind, EntityRef};
use crate::core::links::Association;
use crate::entities::{Address, CarPark, Node, OpenHours, ParkingSpot, UserExtra};

/// Common trait for all stored entities
///
/// Rows are read as `id` followed by [`Entity::COLUMNS`] in order, and
/// [`Entity::to_row`] produces values for exactly those columns.
pub trait Entity: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Stored columns after `id`, back-reference columns included
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> &EntityId;

    /// Mark the entity as stored under `id`
    fn assign_id(&mut self, id: i64);

    fn to_row(&self) -> Vec<Value>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Overwrite every scalar field present in `patch`, leaving the rest untouched
    fn merge(&mut self, patch: Self);

    /// Check mandatory fields before anything reaches a store
    fn validate(&self) -> ResourceResult<()> {
        Ok(())
    }

    /// Values for [`EntityKind::search_fields`], in the same order
    fn search_values(&self) -> Vec<String>;

    /// Parent id held by this entity for an association it is the child of
    fn back_reference(&self, _association: &Association) -> Option<i64> {
        None
    }

    fn set_back_reference(&mut self, _association: &Association, _parent: Option<i64>) {}

    fn into_node(self) -> Node;

    fn from_node(node: &Node) -> Option<&Self>;
}

/// Run generic code for an entity kind known only at runtime
pub trait KindVisitor {
    type Output;

    fn visit<E: Entity>(self) -> Self::Output;
}

pub fn dispatch<V: KindVisitor>(kind: EntityKind, visitor: V) -> V::Output {
    match kind {
        EntityKind::Address => visitor.visit::<Address>(),
        EntityKind::CarPark => visitor.visit::<CarPark>(),
        EntityKind::OpenHours => visitor.visit::<OpenHours>(),
        EntityKind::ParkingSpot => visitor.visit::<ParkingSpot>(),
        EntityKind::UserExtra => visitor.visit::<UserExtra>(),
    }
}

// =========================================================================
// Column conversions
// =========================================================================

pub(crate) fn text(value: &Option<String>) -> Value {
    value.clone().map(Value::Text).unwrap_or(Value::Null)
}

pub(crate) fn integer(value: Option<i64>) -> Value {
    value.map(Value::Integer).unwrap_or(Value::Null)
}

pub(crate) fn boolean(value: Option<bool>) -> Value {
    value.map(|b| Value::Integer(b as i64)).unwrap_or(Value::Null)
}

pub(crate) fn reference(value: &Option<EntityRef>) -> Value {
    integer(value.map(|r| r.id))
}

pub(crate) fn display<T: fmt::Display>(value: &Option<T>) -> Value {
    value
        .as_ref()
        .map(|v| Value::Text(v.to_string()))
        .unwrap_or(Value::Null)
}

pub(crate) fn read_ref(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<EntityRef>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(EntityRef::new))
}

/// Read a text column holding a value in its `Display` form
pub(crate) fn read_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

/// Search index value for an optional field (empty when absent)
pub(crate) fn search_value<T: fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}
