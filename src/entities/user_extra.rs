//! UserExtra entity type - a user's current parking session

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::core::entity::{read_ref, reference, search_value, text, Entity};
use crate::core::identity::{EntityId, EntityKind, EntityRef};
use crate::core::links::{Association, PARKING_SPOT_USER_EXTRA};
use crate::entities::Node;

/// Parking state attached to an external user account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserExtra {
    #[serde(default)]
    pub id: EntityId,

    /// Label of the spot the user is parked in
    #[serde(default)]
    pub current_parking_spot: Option<String>,

    #[serde(default)]
    pub time_of_parking: Option<DateTime<Utc>>,

    /// One-to-one with a parking spot
    #[serde(default)]
    pub parking_spot: Option<EntityRef>,

    /// The user account, owned by the identity service
    #[serde(default)]
    pub user: Option<EntityRef>,
}

impl_identity!(UserExtra);

impl UserExtra {
    pub fn new(current_parking_spot: impl Into<String>, time_of_parking: DateTime<Utc>) -> Self {
        Self {
            current_parking_spot: Some(current_parking_spot.into()),
            time_of_parking: Some(time_of_parking),
            ..Self::default()
        }
    }

    pub fn parking_spot(mut self, parking_spot: i64) -> Self {
        self.parking_spot = Some(EntityRef::new(parking_spot));
        self
    }

    pub fn user(mut self, user: i64) -> Self {
        self.user = Some(EntityRef::new(user));
        self
    }
}

impl Entity for UserExtra {
    const KIND: EntityKind = EntityKind::UserExtra;
    const COLUMNS: &'static [&'static str] = &[
        "current_parking_spot",
        "time_of_parking",
        "parking_spot_id",
        "user_id",
    ];

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = EntityId::saved(id);
    }

    fn to_row(&self) -> Vec<Value> {
        vec![
            text(&self.current_parking_spot),
            self.time_of_parking
                .map(|t| Value::Text(t.to_rfc3339()))
                .unwrap_or(Value::Null),
            reference(&self.parking_spot),
            reference(&self.user),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let time_of_parking = match row.get::<_, Option<String>>(2)? {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            id: EntityId::saved(row.get(0)?),
            current_parking_spot: row.get(1)?,
            time_of_parking,
            parking_spot: read_ref(row, 3)?,
            user: read_ref(row, 4)?,
        })
    }

    fn merge(&mut self, patch: Self) {
        if patch.current_parking_spot.is_some() {
            self.current_parking_spot = patch.current_parking_spot;
        }
        if patch.time_of_parking.is_some() {
            self.time_of_parking = patch.time_of_parking;
        }
    }

    fn search_values(&self) -> Vec<String> {
        vec![
            search_value(&self.current_parking_spot),
            self.time_of_parking
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        ]
    }

    fn back_reference(&self, association: &Association) -> Option<i64> {
        if *association == PARKING_SPOT_USER_EXTRA {
            self.parking_spot.map(|r| r.id)
        } else {
            None
        }
    }

    fn set_back_reference(&mut self, association: &Association, parent: Option<i64>) {
        if *association == PARKING_SPOT_USER_EXTRA {
            self.parking_spot = parent.map(EntityRef::new);
        }
    }

    fn into_node(self) -> Node {
        Node::UserExtra(self)
    }

    fn from_node(node: &Node) -> Option<&Self> {
        match node {
            Node::UserExtra(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_user_extra_wire_format() {
        let parked = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let extra = UserExtra::new("B-12", parked).parking_spot(4).user(1);
        let json = serde_json::to_value(&extra).unwrap();
        assert_eq!(json["currentParkingSpot"], "B-12");
        assert_eq!(json["parkingSpot"]["id"], 4);
        assert_eq!(json["user"]["id"], 1);
    }

    #[test]
    fn test_merge_keeps_relations() {
        let parked = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let mut stored = UserExtra::new("B-12", parked).parking_spot(4);
        stored.merge(UserExtra {
            current_parking_spot: Some("C-1".into()),
            ..UserExtra::default()
        });
        assert_eq!(stored.current_parking_spot.as_deref(), Some("C-1"));
        assert_eq!(stored.time_of_parking, Some(parked));
        assert_eq!(stored.parking_spot, Some(EntityRef::new(4)));
    }
}
