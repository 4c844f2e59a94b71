//! Address entity type

use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::core::entity::{search_value, text, Entity};
use crate::core::error::{ErrorKey, ResourceError, ResourceResult};
use crate::core::identity::{EntityId, EntityKind};
use crate::entities::Node;

/// A street address; car parks point back at it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub id: EntityId,

    /// Street address (required)
    #[serde(default)]
    pub street_address: Option<String>,

    #[serde(default)]
    pub postal_code: Option<String>,

    #[serde(default)]
    pub city: Option<String>,
}

impl_identity!(Address);

impl Address {
    pub fn new(street_address: impl Into<String>) -> Self {
        Self {
            street_address: Some(street_address.into()),
            ..Self::default()
        }
    }

    pub fn postal_code(mut self, postal_code: impl Into<String>) -> Self {
        self.postal_code = Some(postal_code.into());
        self
    }

    pub fn city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }
}

impl Entity for Address {
    const KIND: EntityKind = EntityKind::Address;
    const COLUMNS: &'static [&'static str] = &["street_address", "postal_code", "city"];

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = EntityId::saved(id);
    }

    fn to_row(&self) -> Vec<Value> {
        vec![
            text(&self.street_address),
            text(&self.postal_code),
            text(&self.city),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: EntityId::saved(row.get(0)?),
            street_address: row.get(1)?,
            postal_code: row.get(2)?,
            city: row.get(3)?,
        })
    }

    fn merge(&mut self, patch: Self) {
        if patch.street_address.is_some() {
            self.street_address = patch.street_address;
        }
        if patch.postal_code.is_some() {
            self.postal_code = patch.postal_code;
        }
        if patch.city.is_some() {
            self.city = patch.city;
        }
    }

    fn validate(&self) -> ResourceResult<()> {
        if self.street_address.is_none() {
            return Err(ResourceError::invalid(
                Self::KIND,
                ErrorKey::Validation,
                "streetAddress must not be null",
            ));
        }
        Ok(())
    }

    fn search_values(&self) -> Vec<String> {
        vec![
            search_value(&self.street_address),
            search_value(&self.postal_code),
            search_value(&self.city),
        ]
    }

    fn into_node(self) -> Node {
        Node::Address(self)
    }

    fn from_node(node: &Node) -> Option<&Self> {
        match node {
            Node::Address(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_requires_street() {
        let err = Address::default().validate().unwrap_err();
        assert_eq!(err.key(), ErrorKey::Validation);
        assert!(Address::new("1 Main St").validate().is_ok());
    }

    #[test]
    fn test_address_wire_names() {
        let address = Address::new("1 Main St").postal_code("0150").city("Oslo");
        let json = serde_json::to_value(&address).unwrap();
        assert_eq!(json["streetAddress"], "1 Main St");
        assert_eq!(json["postalCode"], "0150");
        assert!(json["id"].is_null());
    }

    #[test]
    fn test_address_merge_keeps_absent_fields() {
        let mut stored = Address::new("1 Main St").city("Oslo");
        stored.merge(Address {
            city: Some("Bergen".into()),
            ..Address::default()
        });
        assert_eq!(stored.street_address.as_deref(), Some("1 Main St"));
        assert_eq!(stored.city.as_deref(), Some("Bergen"));
    }
}
