//! CarPark entity type

use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::core::entity::{read_ref, reference, search_value, text, Entity};
use crate::core::identity::{EntityId, EntityKind, EntityRef};
use crate::core::links::{Association, ADDRESS_CAR_PARKS};
use crate::entities::Node;

/// A car park; parent of open hours and parking spots, child of an address
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarPark {
    #[serde(default)]
    pub id: EntityId,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub owner: Option<String>,

    /// Back-reference to the owning address
    #[serde(default)]
    pub address: Option<EntityRef>,
}

impl_identity!(CarPark);

impl CarPark {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            owner: Some(owner.into()),
            ..Self::default()
        }
    }

    pub fn address(mut self, address: i64) -> Self {
        self.address = Some(EntityRef::new(address));
        self
    }
}

impl Entity for CarPark {
    const KIND: EntityKind = EntityKind::CarPark;
    const COLUMNS: &'static [&'static str] = &["name", "owner", "address_id"];

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = EntityId::saved(id);
    }

    fn to_row(&self) -> Vec<Value> {
        vec![text(&self.name), text(&self.owner), reference(&self.address)]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: EntityId::saved(row.get(0)?),
            name: row.get(1)?,
            owner: row.get(2)?,
            address: read_ref(row, 3)?,
        })
    }

    fn merge(&mut self, patch: Self) {
        if patch.name.is_some() {
            self.name = patch.name;
        }
        if patch.owner.is_some() {
            self.owner = patch.owner;
        }
    }

    fn search_values(&self) -> Vec<String> {
        vec![search_value(&self.name), search_value(&self.owner)]
    }

    fn back_reference(&self, association: &Association) -> Option<i64> {
        if *association == ADDRESS_CAR_PARKS {
            self.address.map(|r| r.id)
        } else {
            None
        }
    }

    fn set_back_reference(&mut self, association: &Association, parent: Option<i64>) {
        if *association == ADDRESS_CAR_PARKS {
            self.address = parent.map(EntityRef::new);
        }
    }

    fn into_node(self) -> Node {
        Node::CarPark(self)
    }

    fn from_node(node: &Node) -> Option<&Self> {
        match node {
            Node::CarPark(e) => Some(e),
            _ => None,
        }
    }
}
