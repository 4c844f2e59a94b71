//! Entity type definitions
//!
//! Smart Parking manages the following entity types:
//!
//! - [`Address`] - Street address; parent of car parks
//! - [`CarPark`] - A car park; parent of open hours and parking spots
//! - [`OpenHours`] - One opening window of a car park
//! - [`ParkingSpot`] - A single spot in a car park
//! - [`UserExtra`] - Per-user parking session, paired one-to-one with a spot
//!
//! Equality and hashing of every entity use the identifier only.

use serde::Serialize;

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityKind};
use crate::core::links::Association;

/// Implement identifier-only `PartialEq`, `Eq` and `Hash` for an entity
macro_rules! impl_identity {
    ($ty:ty) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl Eq for $ty {}

        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }
    };
}

pub mod address;
pub mod car_park;
pub mod open_hours;
pub mod parking_spot;
pub mod user_extra;

pub use address::Address;
pub use car_park::CarPark;
pub use open_hours::OpenHours;
pub use parking_spot::ParkingSpot;
pub use user_extra::UserExtra;

/// Any entity, as held by the in-memory graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Address(Address),
    CarPark(CarPark),
    OpenHours(OpenHours),
    ParkingSpot(ParkingSpot),
    UserExtra(UserExtra),
}

impl Node {
    pub fn kind(&self) -> EntityKind {
        match self {
            Node::Address(_) => EntityKind::Address,
            Node::CarPark(_) => EntityKind::CarPark,
            Node::OpenHours(_) => EntityKind::OpenHours,
            Node::ParkingSpot(_) => EntityKind::ParkingSpot,
            Node::UserExtra(_) => EntityKind::UserExtra,
        }
    }

    pub fn id(&self) -> &EntityId {
        match self {
            Node::Address(e) => e.id(),
            Node::CarPark(e) => e.id(),
            Node::OpenHours(e) => e.id(),
            Node::ParkingSpot(e) => e.id(),
            Node::UserExtra(e) => e.id(),
        }
    }

    pub fn back_reference(&self, association: &Association) -> Option<i64> {
        match self {
            Node::Address(e) => e.back_reference(association),
            Node::CarPark(e) => e.back_reference(association),
            Node::OpenHours(e) => e.back_reference(association),
            Node::ParkingSpot(e) => e.back_reference(association),
            Node::UserExtra(e) => e.back_reference(association),
        }
    }

    pub fn set_back_reference(&mut self, association: &Association, parent: Option<i64>) {
        match self {
            Node::Address(e) => e.set_back_reference(association, parent),
            Node::CarPark(e) => e.set_back_reference(association, parent),
            Node::OpenHours(e) => e.set_back_reference(association, parent),
            Node::ParkingSpot(e) => e.set_back_reference(association, parent),
            Node::UserExtra(e) => e.set_back_reference(association, parent),
        }
    }
}
