//! Parent/child associations between entity types
//!
//! Each association is owned by the child side: the child's table holds
//! the parent id in `column`, and the parent's collection is whatever
//! children currently point at it.

use serde::Serialize;

use crate::core::identity::EntityKind;

/// How many children a parent may hold in one association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Many,
    One,
}

/// Static description of one bidirectional association
#[derive(Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    /// Stable name, e.g. "carPark.openHours"
    pub name: &'static str,
    pub parent: EntityKind,
    pub child: EntityKind,
    /// Column on the child's table holding the parent id
    pub column: &'static str,
    pub cardinality: Cardinality,
    /// Path segment below the parent resource, e.g. "open-hours"
    pub segment: &'static str,
}

pub static ADDRESS_CAR_PARKS: Association = Association {
    name: "address.carParks",
    parent: EntityKind::Address,
    child: EntityKind::CarPark,
    column: "address_id",
    cardinality: Cardinality::Many,
    segment: "car-parks",
};

pub static CAR_PARK_OPEN_HOURS: Association = Association {
    name: "carPark.openHours",
    parent: EntityKind::CarPark,
    child: EntityKind::OpenHours,
    column: "car_park_id",
    cardinality: Cardinality::Many,
    segment: "open-hours",
};

pub static CAR_PARK_PARKING_SPOTS: Association = Association {
    name: "carPark.parkingSpots",
    parent: EntityKind::CarPark,
    child: EntityKind::ParkingSpot,
    column: "car_park_id",
    cardinality: Cardinality::Many,
    segment: "parking-spots",
};

pub static PARKING_SPOT_USER_EXTRA: Association = Association {
    name: "parkingSpot.userExtra",
    parent: EntityKind::ParkingSpot,
    child: EntityKind::UserExtra,
    column: "parking_spot_id",
    cardinality: Cardinality::One,
    segment: "user-extra",
};

/// Every association, parents before children
pub fn all() -> [&'static Association; 4] {
    [
        &ADDRESS_CAR_PARKS,
        &CAR_PARK_OPEN_HOURS,
        &CAR_PARK_PARKING_SPOTS,
        &PARKING_SPOT_USER_EXTRA,
    ]
}

/// Associations in which `kind` is the parent
pub fn children_of(kind: EntityKind) -> impl Iterator<Item = &'static Association> {
    all().into_iter().filter(move |a| a.parent == kind)
}

/// Associations in which `kind` is the child (holds the back-reference)
pub fn owned_by(kind: EntityKind) -> impl Iterator<Item = &'static Association> {
    all().into_iter().filter(move |a| a.child == kind)
}

/// Look up an association by parent kind and path segment
pub fn find(parent: EntityKind, segment: &str) -> Option<&'static Association> {
    children_of(parent).find(|a| a.segment == segment)
}

/// Position of an association in [`all`]
pub(crate) fn position(association: &Association) -> usize {
    all()
        .iter()
        .position(|a| a.name == association.name)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_car_park_has_two_child_associations() {
        let names: Vec<_> = children_of(EntityKind::CarPark).map(|a| a.name).collect();
        assert_eq!(names, vec!["carPark.openHours", "carPark.parkingSpots"]);
    }

    #[test]
    fn test_user_extra_owns_one_to_one() {
        let owned: Vec<_> = owned_by(EntityKind::UserExtra).collect();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].cardinality, Cardinality::One);
    }

    #[test]
    fn test_find_by_segment() {
        assert_eq!(
            find(EntityKind::Address, "car-parks").map(|a| a.name),
            Some("address.carParks")
        );
        assert!(find(EntityKind::Address, "open-hours").is_none());
    }

    #[test]
    fn test_positions_are_distinct() {
        let positions: Vec<_> = all().iter().map(|a| position(a)).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }
}
