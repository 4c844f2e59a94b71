//! Entity identity: kinds, identifiers and references
//!
//! Identifiers are tagged: an entity is either `Unsaved` (carrying a
//! process-local token) or `Saved` (carrying the store-assigned id).
//! Equality follows from the tag, so unsaved entities are only ever
//! equal to themselves.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The five entity types managed by the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Address,
    CarPark,
    OpenHours,
    ParkingSpot,
    UserExtra,
}

impl EntityKind {
    /// All entity kinds, parents before children
    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Address,
            EntityKind::CarPark,
            EntityKind::OpenHours,
            EntityKind::ParkingSpot,
            EntityKind::UserExtra,
        ]
    }

    /// Entity name as used in error payloads and alert headers (e.g. "carPark")
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Address => "address",
            EntityKind::CarPark => "carPark",
            EntityKind::OpenHours => "openHours",
            EntityKind::ParkingSpot => "parkingSpot",
            EntityKind::UserExtra => "userExtra",
        }
    }

    /// REST collection segment (e.g. "car-parks")
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Address => "addresses",
            EntityKind::CarPark => "car-parks",
            EntityKind::OpenHours => "open-hours",
            EntityKind::ParkingSpot => "parking-spots",
            EntityKind::UserExtra => "user-extras",
        }
    }

    /// Primary store table name
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Address => "address",
            EntityKind::CarPark => "car_park",
            EntityKind::OpenHours => "open_hours",
            EntityKind::ParkingSpot => "parking_spot",
            EntityKind::UserExtra => "user_extra",
        }
    }

    /// Search index name
    pub fn index_name(&self) -> &'static str {
        match self {
            EntityKind::Address => "address",
            EntityKind::CarPark => "carpark",
            EntityKind::OpenHours => "openhours",
            EntityKind::ParkingSpot => "parkingspot",
            EntityKind::UserExtra => "userextra",
        }
    }

    /// Fields indexed for full-text search, in index column order
    pub fn search_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Address => &["street_address", "postal_code", "city"],
            EntityKind::CarPark => &["name", "owner"],
            EntityKind::OpenHours => &["weekday", "opening_hour", "closing_hour", "date"],
            EntityKind::ParkingSpot => &["accessable_parking", "available", "floor"],
            EntityKind::UserExtra => &["current_parking_spot", "time_of_parking"],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = IdParseError;

    /// Accepts the collection segment, the entity name, or the table name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        EntityKind::all()
            .iter()
            .copied()
            .find(|kind| {
                lower == kind.collection()
                    || lower == kind.as_str().to_lowercase()
                    || lower == kind.table()
            })
            .ok_or_else(|| IdParseError::InvalidKind(s.to_string()))
    }
}

/// Process-local identity of an entity that has not been stored yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalToken(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

impl LocalToken {
    fn next() -> Self {
        LocalToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifier of an entity: either unsaved (local token) or saved (store id)
///
/// Cloning keeps the token, so a clone of an unsaved entity is the same
/// logical instance. Deserializing a payload without an id always yields
/// a fresh token.
#[derive(Debug, Clone, Copy)]
pub enum EntityId {
    Unsaved(LocalToken),
    Saved(i64),
}

impl EntityId {
    /// A fresh unsaved identity
    pub fn unsaved() -> Self {
        EntityId::Unsaved(LocalToken::next())
    }

    pub fn saved(id: i64) -> Self {
        EntityId::Saved(id)
    }

    /// The store-assigned id, if any
    pub fn get(&self) -> Option<i64> {
        match self {
            EntityId::Saved(id) => Some(*id),
            EntityId::Unsaved(_) => None,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, EntityId::Saved(_))
    }
}

impl Default for EntityId {
    fn default() -> Self {
        EntityId::unsaved()
    }
}

impl PartialEq for EntityId {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EntityId::Saved(a), EntityId::Saved(b)) => a == b,
            (EntityId::Unsaved(a), EntityId::Unsaved(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for EntityId {}

impl Hash for EntityId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            EntityId::Saved(id) => {
                0u8.hash(state);
                id.hash(state);
            }
            EntityId::Unsaved(token) => {
                1u8.hash(state);
                token.hash(state);
            }
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Saved(id) => write!(f, "{}", id),
            EntityId::Unsaved(token) => write!(f, "unsaved#{}", token.0),
        }
    }
}

impl Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            EntityId::Saved(id) => serializer.serialize_i64(*id),
            EntityId::Unsaved(_) => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match Option::<i64>::deserialize(deserializer)? {
            Some(id) => EntityId::Saved(id),
            None => EntityId::unsaved(),
        })
    }
}

/// A back-reference to a stored entity, serialized as `{"id": n}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: i64,
}

impl EntityRef {
    pub fn new(id: i64) -> Self {
        Self { id }
    }
}

impl From<i64> for EntityRef {
    fn from(id: i64) -> Self {
        Self { id }
    }
}

/// Errors that can occur when parsing kinds and identifiers
#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("unknown entity type: '{0}' (valid: addresses, car-parks, open-hours, parking-spots, user-extras)")]
    InvalidKind(String),

    #[error("invalid identifier '{0}': expected a positive integer")]
    InvalidId(String),
}

/// Parse a numeric identifier from user input
pub fn parse_id(s: &str) -> Result<i64, IdParseError> {
    s.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| IdParseError::InvalidId(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_saved_ids_equal_by_value() {
        assert_eq!(EntityId::saved(7), EntityId::saved(7));
        assert_ne!(EntityId::saved(7), EntityId::saved(8));
    }

    #[test]
    fn test_unsaved_ids_never_equal_each_other() {
        let a = EntityId::unsaved();
        let b = EntityId::unsaved();
        assert_ne!(a, b);
        assert_eq!(a, a);
        assert_ne!(a, EntityId::saved(1));
    }

    #[test]
    fn test_hash_agrees_with_equality() {
        let mut set = HashSet::new();
        set.insert(EntityId::saved(3));
        set.insert(EntityId::saved(3));
        set.insert(EntityId::unsaved());
        set.insert(EntityId::unsaved());
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_serde_null_is_unsaved() {
        let id: EntityId = serde_json::from_str("null").unwrap();
        assert!(!id.is_saved());
        assert_eq!(serde_json::to_string(&EntityId::saved(42)).unwrap(), "42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "null");
    }

    #[test]
    fn test_kind_parses_collection_and_name() {
        assert_eq!("car-parks".parse::<EntityKind>().unwrap(), EntityKind::CarPark);
        assert_eq!("carPark".parse::<EntityKind>().unwrap(), EntityKind::CarPark);
        assert_eq!("user_extra".parse::<EntityKind>().unwrap(), EntityKind::UserExtra);
        assert!(matches!(
            "garages".parse::<EntityKind>(),
            Err(IdParseError::InvalidKind(_))
        ));
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert_eq!(parse_id("12").unwrap(), 12);
        assert!(parse_id("0").is_err());
        assert!(parse_id("abc").is_err());
    }
}
