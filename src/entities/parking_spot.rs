//! ParkingSpot entity type

use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::core::entity::{boolean, integer, read_ref, reference, search_value, Entity};
use crate::core::error::{ErrorKey, ResourceError, ResourceResult};
use crate::core::identity::{EntityId, EntityKind, EntityRef};
use crate::core::links::{Association, CAR_PARK_PARKING_SPOTS};
use crate::entities::Node;

/// A single parking spot in a car park
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingSpot {
    #[serde(default)]
    pub id: EntityId,

    /// Reserved for accessible parking
    #[serde(default, rename = "accessableParking")]
    pub accessible_parking: Option<bool>,

    /// Whether the spot is free (required)
    #[serde(default)]
    pub available: Option<bool>,

    #[serde(default)]
    pub floor: Option<i64>,

    #[serde(default)]
    pub car_park: Option<EntityRef>,
}

impl_identity!(ParkingSpot);

impl ParkingSpot {
    pub fn new(available: bool) -> Self {
        Self {
            available: Some(available),
            ..Self::default()
        }
    }

    pub fn floor(mut self, floor: i64) -> Self {
        self.floor = Some(floor);
        self
    }

    pub fn accessible(mut self, accessible: bool) -> Self {
        self.accessible_parking = Some(accessible);
        self
    }

    pub fn car_park(mut self, car_park: i64) -> Self {
        self.car_park = Some(EntityRef::new(car_park));
        self
    }
}

impl Entity for ParkingSpot {
    const KIND: EntityKind = EntityKind::ParkingSpot;
    const COLUMNS: &'static [&'static str] =
        &["accessible_parking", "available", "floor", "car_park_id"];

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = EntityId::saved(id);
    }

    fn to_row(&self) -> Vec<Value> {
        vec![
            boolean(self.accessible_parking),
            boolean(self.available),
            integer(self.floor),
            reference(&self.car_park),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: EntityId::saved(row.get(0)?),
            accessible_parking: row.get(1)?,
            available: row.get(2)?,
            floor: row.get(3)?,
            car_park: read_ref(row, 4)?,
        })
    }

    fn merge(&mut self, patch: Self) {
        if patch.accessible_parking.is_some() {
            self.accessible_parking = patch.accessible_parking;
        }
        if patch.available.is_some() {
            self.available = patch.available;
        }
        if patch.floor.is_some() {
            self.floor = patch.floor;
        }
    }

    fn validate(&self) -> ResourceResult<()> {
        if self.available.is_none() {
            return Err(ResourceError::invalid(
                Self::KIND,
                ErrorKey::Validation,
                "available must not be null",
            ));
        }
        Ok(())
    }

    fn search_values(&self) -> Vec<String> {
        vec![
            search_value(&self.accessible_parking),
            search_value(&self.available),
            search_value(&self.floor),
        ]
    }

    fn back_reference(&self, association: &Association) -> Option<i64> {
        if *association == CAR_PARK_PARKING_SPOTS {
            self.car_park.map(|r| r.id)
        } else {
            None
        }
    }

    fn set_back_reference(&mut self, association: &Association, parent: Option<i64>) {
        if *association == CAR_PARK_PARKING_SPOTS {
            self.car_park = parent.map(EntityRef::new);
        }
    }

    fn into_node(self) -> Node {
        Node::ParkingSpot(self)
    }

    fn from_node(node: &Node) -> Option<&Self> {
        match node {
            Node::ParkingSpot(e) => Some(e),
            _ => None,
        }
    }
}
