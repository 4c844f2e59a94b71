//! OpenHours entity type

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::core::entity::{display, read_parsed, read_ref, reference, search_value, text, Entity};
use crate::core::identity::{EntityId, EntityKind, EntityRef};
use crate::core::links::{Association, CAR_PARK_OPEN_HOURS};
use crate::entities::Node;

/// One opening window of a car park
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHours {
    #[serde(default)]
    pub id: EntityId,

    #[serde(default)]
    pub weekday: Option<String>,

    /// Opening time, e.g. "08:00"
    #[serde(default)]
    pub opening_hour: Option<String>,

    /// Closing time, e.g. "18:00"
    #[serde(default)]
    pub closing_hour: Option<String>,

    /// Date from which this window applies
    #[serde(default)]
    pub date: Option<NaiveDate>,

    #[serde(default)]
    pub car_park: Option<EntityRef>,
}

impl_identity!(OpenHours);

impl OpenHours {
    pub fn new(
        weekday: impl Into<String>,
        opening_hour: impl Into<String>,
        closing_hour: impl Into<String>,
    ) -> Self {
        Self {
            weekday: Some(weekday.into()),
            opening_hour: Some(opening_hour.into()),
            closing_hour: Some(closing_hour.into()),
            ..Self::default()
        }
    }

    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn car_park(mut self, car_park: i64) -> Self {
        self.car_park = Some(EntityRef::new(car_park));
        self
    }
}

impl Entity for OpenHours {
    const KIND: EntityKind = EntityKind::OpenHours;
    const COLUMNS: &'static [&'static str] = &[
        "weekday",
        "opening_hour",
        "closing_hour",
        "date",
        "car_park_id",
    ];

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = EntityId::saved(id);
    }

    fn to_row(&self) -> Vec<Value> {
        vec![
            text(&self.weekday),
            text(&self.opening_hour),
            text(&self.closing_hour),
            display(&self.date),
            reference(&self.car_park),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: EntityId::saved(row.get(0)?),
            weekday: row.get(1)?,
            opening_hour: row.get(2)?,
            closing_hour: row.get(3)?,
            date: read_parsed(row, 4)?,
            car_park: read_ref(row, 5)?,
        })
    }

    fn merge(&mut self, patch: Self) {
        if patch.weekday.is_some() {
            self.weekday = patch.weekday;
        }
        if patch.opening_hour.is_some() {
            self.opening_hour = patch.opening_hour;
        }
        if patch.closing_hour.is_some() {
            self.closing_hour = patch.closing_hour;
        }
        if patch.date.is_some() {
            self.date = patch.date;
        }
    }

    fn search_values(&self) -> Vec<String> {
        vec![
            search_value(&self.weekday),
            search_value(&self.opening_hour),
            search_value(&self.closing_hour),
            search_value(&self.date),
        ]
    }

    fn back_reference(&self, association: &Association) -> Option<i64> {
        if *association == CAR_PARK_OPEN_HOURS {
            self.car_park.map(|r| r.id)
        } else {
            None
        }
    }

    fn set_back_reference(&mut self, association: &Association, parent: Option<i64>) {
        if *association == CAR_PARK_OPEN_HOURS {
            self.car_park = parent.map(EntityRef::new);
        }
    }

    fn into_node(self) -> Node {
        Node::OpenHours(self)
    }

    fn from_node(node: &Node) -> Option<&Self> {
        match node {
            Node::OpenHours(e) => Some(e),
            _ => None,
        }
    }
}
