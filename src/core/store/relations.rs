//! Association mutations and eager graph loads

use rusqlite::{Connection, OptionalExtension, Transaction};

use super::{
    begin, parent_pairs, primary, row_exists, select, write_relinks, PrimaryStore, RowFilter,
};
use crate::core::entity::{dispatch, Entity, KindVisitor};
use crate::core::error::{ErrorKey, ResourceError, ResourceResult};
use crate::core::graph::{AssociationIndex, EntityGraph, GraphError, Relink};
use crate::core::identity::EntityKind;
use crate::core::links::{self, Association};
use crate::entities::Node;

impl PrimaryStore {
    /// Replace the children of `parent` in one transaction
    pub fn set_children(
        &self,
        association: &'static Association,
        parent: i64,
        children: &[i64],
        actor: &str,
    ) -> ResourceResult<Vec<Relink>> {
        self.mutate(association, parent, children, actor, |index| {
            index.set_children(parent, children.iter().copied())
        })
    }

    pub fn add_child(
        &self,
        association: &'static Association,
        parent: i64,
        child: i64,
        actor: &str,
    ) -> ResourceResult<Vec<Relink>> {
        self.mutate(association, parent, &[child], actor, |index| {
            Ok(index.add_child(parent, child))
        })
    }

    pub fn remove_child(
        &self,
        association: &'static Association,
        parent: i64,
        child: i64,
        actor: &str,
    ) -> ResourceResult<Vec<Relink>> {
        self.mutate(association, parent, &[child], actor, |index| {
            Ok(index.remove_child(parent, child))
        })
    }

    /// Point `child` at `parent`, or detach it
    pub fn set_back_reference(
        &self,
        association: &'static Association,
        child: i64,
        parent: Option<i64>,
        actor: &str,
    ) -> ResourceResult<Vec<Relink>> {
        match parent {
            Some(parent) => self.add_child(association, parent, child, actor),
            None => {
                let mut conn = self.connect(association.child)?;
                let tx = begin(&mut conn, association.child)?;
                let current = child_parent(&tx, association, child)?;
                let mut index = AssociationIndex::load(association, [(child, current)]);
                let relinks = index.set_back_reference(child, None);
                write_relinks(&tx, &relinks, actor)?;
                tx.commit().map_err(primary(association.child))?;
                Ok(relinks)
            }
        }
    }

    /// Load the parent's current links plus the named children into an
    /// index, apply `op`, and write back whatever moved
    fn mutate<F>(
        &self,
        association: &'static Association,
        parent: i64,
        children: &[i64],
        actor: &str,
        op: F,
    ) -> ResourceResult<Vec<Relink>>
    where
        F: FnOnce(&mut AssociationIndex) -> Result<Vec<Relink>, GraphError>,
    {
        let mut conn = self.connect(association.parent)?;
        let tx = begin(&mut conn, association.parent)?;

        if !row_exists(&tx, association.parent, parent).map_err(primary(association.parent))? {
            return Err(ResourceError::not_found(
                association.parent,
                ErrorKey::NotFound,
                format!("{} {} not found", association.parent, parent),
            ));
        }

        let mut pairs = parent_pairs(&tx, association, parent).map_err(primary(association.child))?;
        for child in children {
            pairs.push((*child, child_parent(&tx, association, *child)?));
        }

        let mut index = AssociationIndex::load(association, pairs);
        let relinks = op(&mut index).map_err(|e| graph_error(association.child, e))?;
        write_relinks(&tx, &relinks, actor)?;
        tx.commit().map_err(primary(association.parent))?;

        Ok(relinks)
    }

    /// The entity with its direct children, or `None` if it does not exist
    pub fn load_with_children(
        &self,
        kind: EntityKind,
        id: i64,
    ) -> ResourceResult<Option<EntityGraph>> {
        let conn = self.connect(kind)?;
        let graph = EntityGraph::new();

        if dispatch(kind, LoadRows::new(&conn, &graph, RowFilter::Id(id)))? == 0 {
            return Ok(None);
        }
        for association in links::children_of(kind) {
            dispatch(
                association.child,
                LoadRows::new(&conn, &graph, RowFilter::Column(association.column, id)),
            )?;
        }
        Ok(Some(graph))
    }

    /// The parent `child` points at through `association`
    pub fn load_parent_only(
        &self,
        association: &'static Association,
        child: i64,
    ) -> ResourceResult<Option<Node>> {
        let conn = self.connect(association.child)?;
        let parent = match child_parent_of(&conn, association, child)? {
            Some(parent) => parent,
            None => return Ok(None),
        };

        let graph = EntityGraph::new();
        dispatch(
            association.parent,
            LoadRows::new(&conn, &graph, RowFilter::Id(parent)),
        )?;
        Ok(graph.node(association.parent, parent))
    }

    /// Every stored entity
    pub fn load_graph(&self) -> ResourceResult<EntityGraph> {
        let graph = EntityGraph::new();
        for kind in EntityKind::all() {
            let conn = self.connect(*kind)?;
            dispatch(*kind, LoadRows::new(&conn, &graph, RowFilter::All))?;
        }
        Ok(graph)
    }
}

/// Current back-reference of an existing child; a missing child is a bad reference
fn child_parent(
    tx: &Transaction<'_>,
    association: &Association,
    child: i64,
) -> ResourceResult<Option<i64>> {
    lookup_parent(tx, association, child)?.ok_or_else(|| {
        ResourceError::invalid(
            association.child,
            ErrorKey::RelationNotFound,
            format!("{} {} does not exist", association.child, child),
        )
    })
}

/// Like [`child_parent`], but a missing child is reported as not found
fn child_parent_of(
    conn: &Connection,
    association: &Association,
    child: i64,
) -> ResourceResult<Option<i64>> {
    lookup_parent(conn, association, child)?.ok_or_else(|| {
        ResourceError::not_found(
            association.child,
            ErrorKey::NotFound,
            format!("{} {} not found", association.child, child),
        )
    })
}

fn lookup_parent(
    conn: &Connection,
    association: &Association,
    child: i64,
) -> ResourceResult<Option<Option<i64>>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM {} WHERE id = ?1",
            association.column,
            association.child.table()
        ),
        [child],
        |row| row.get::<_, Option<i64>>(0),
    )
    .optional()
    .map_err(primary(association.child))
}

fn graph_error(kind: EntityKind, err: GraphError) -> ResourceError {
    match err {
        GraphError::CardinalityExceeded { .. } => {
            ResourceError::invalid(kind, ErrorKey::Validation, err.to_string())
        }
        GraphError::NotSaved { .. } => ResourceError::invalid(kind, ErrorKey::IdNull, err.to_string()),
        GraphError::Missing { .. } => {
            ResourceError::invalid(kind, ErrorKey::RelationNotFound, err.to_string())
        }
    }
}

/// Read rows of one kind into a graph, counting them
struct LoadRows<'a> {
    conn: &'a Connection,
    graph: &'a EntityGraph,
    filter: RowFilter,
}

impl<'a> LoadRows<'a> {
    fn new(conn: &'a Connection, graph: &'a EntityGraph, filter: RowFilter) -> Self {
        Self {
            conn,
            graph,
            filter,
        }
    }
}

impl KindVisitor for LoadRows<'_> {
    type Output = ResourceResult<usize>;

    fn visit<E: Entity>(self) -> Self::Output {
        let rows = select::<E>(self.conn, self.filter).map_err(primary(E::KIND))?;
        let count = rows.len();
        for entity in rows {
            self.graph
                .insert(entity)
                .map_err(|e| graph_error(E::KIND, e))?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::links::{
        ADDRESS_CAR_PARKS, CAR_PARK_OPEN_HOURS, CAR_PARK_PARKING_SPOTS, PARKING_SPOT_USER_EXTRA,
    };
    use crate::entities::{Address, CarPark, OpenHours, ParkingSpot, UserExtra};
    use tempfile::TempDir;

    fn store() -> (TempDir, PrimaryStore) {
        let tmp = TempDir::new().unwrap();
        let store = PrimaryStore::open(tmp.path().join("parking.db")).unwrap();
        (tmp, store)
    }

    fn seed_hours(store: &PrimaryStore, n: usize) {
        store.create(CarPark::new("A", "O"), "t").unwrap();
        store.create(CarPark::new("B", "P"), "t").unwrap();
        for _ in 0..n {
            store
                .create(OpenHours::new("Mon", "08:00", "18:00"), "t")
                .unwrap();
        }
    }

    #[test]
    fn test_set_children_in_storage() {
        let (_tmp, store) = store();
        seed_hours(&store, 3);

        store.set_children(&CAR_PARK_OPEN_HOURS, 1, &[1, 2], "t").unwrap();
        let relinks = store.set_children(&CAR_PARK_OPEN_HOURS, 1, &[2, 3], "t").unwrap();
        assert_eq!(relinks.len(), 2);

        let dropped: OpenHours = store.find_by_id(1).unwrap().unwrap();
        let kept: OpenHours = store.find_by_id(2).unwrap().unwrap();
        let added: OpenHours = store.find_by_id(3).unwrap().unwrap();
        assert!(dropped.car_park.is_none());
        assert_eq!(kept.car_park.map(|r| r.id), Some(1));
        assert_eq!(added.car_park.map(|r| r.id), Some(1));
    }

    #[test]
    fn test_add_child_moves_from_other_parent() {
        let (_tmp, store) = store();
        seed_hours(&store, 1);
        store.add_child(&CAR_PARK_OPEN_HOURS, 1, 1, "t").unwrap();
        let relinks = store.add_child(&CAR_PARK_OPEN_HOURS, 2, 1, "t").unwrap();

        assert_eq!(relinks[0].before, Some(1));
        assert_eq!(relinks[0].after, Some(2));
        let graph = store.load_with_children(EntityKind::CarPark, 1).unwrap().unwrap();
        assert!(graph.children_of(&CAR_PARK_OPEN_HOURS, 1).is_empty());
    }

    #[test]
    fn test_missing_child_is_relation_not_found() {
        let (_tmp, store) = store();
        seed_hours(&store, 0);
        let err = store
            .set_children(&CAR_PARK_OPEN_HOURS, 1, &[77], "t")
            .unwrap_err();
        assert_eq!(err.key(), ErrorKey::RelationNotFound);
    }

    #[test]
    fn test_missing_parent_is_not_found() {
        let (_tmp, store) = store();
        seed_hours(&store, 1);
        let err = store.add_child(&CAR_PARK_OPEN_HOURS, 9, 1, "t").unwrap_err();
        assert!(matches!(err, ResourceError::NotFound { .. }));
    }

    #[test]
    fn test_one_to_one_set_children_rejects_two() {
        let (_tmp, store) = store();
        store.create(ParkingSpot::new(true), "t").unwrap();
        store.create(UserExtra::default(), "t").unwrap();
        store.create(UserExtra::default(), "t").unwrap();

        let err = store
            .set_children(&PARKING_SPOT_USER_EXTRA, 1, &[1, 2], "t")
            .unwrap_err();
        assert_eq!(err.key(), ErrorKey::Validation);
    }

    #[test]
    fn test_load_with_children() {
        let (_tmp, store) = store();
        store.create(CarPark::new("A", "O"), "t").unwrap();
        store
            .create(ParkingSpot::new(true).car_park(1), "t")
            .unwrap();
        store
            .create(OpenHours::new("Mon", "08:00", "18:00").car_park(1), "t")
            .unwrap();

        let graph = store.load_with_children(EntityKind::CarPark, 1).unwrap().unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.children_of(&CAR_PARK_PARKING_SPOTS, 1), vec![1]);
        assert!(store
            .load_with_children(EntityKind::CarPark, 2)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_load_parent_only() {
        let (_tmp, store) = store();
        store.create(Address::new("1 Main St"), "t").unwrap();
        store.create(CarPark::new("A", "O").address(1), "t").unwrap();
        store.create(CarPark::new("B", "P"), "t").unwrap();

        let parent = store.load_parent_only(&ADDRESS_CAR_PARKS, 1).unwrap();
        assert!(matches!(parent, Some(Node::Address(_))));
        assert!(store.load_parent_only(&ADDRESS_CAR_PARKS, 2).unwrap().is_none());
        assert!(store.load_parent_only(&ADDRESS_CAR_PARKS, 3).is_err());
    }

    #[test]
    fn test_load_graph_links_everything() {
        let (_tmp, store) = store();
        store.create(Address::new("1 Main St"), "t").unwrap();
        store.create(CarPark::new("A", "O").address(1), "t").unwrap();
        store.create(ParkingSpot::new(false).car_park(1), "t").unwrap();

        let graph = store.load_graph().unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.back_reference_of(&ADDRESS_CAR_PARKS, 1), Some(1));
        assert_eq!(graph.count(EntityKind::ParkingSpot), 1);
    }

    #[test]
    fn test_set_back_reference_detaches() {
        let (_tmp, store) = store();
        seed_hours(&store, 1);
        store.add_child(&CAR_PARK_OPEN_HOURS, 1, 1, "t").unwrap();
        let relinks = store
            .set_back_reference(&CAR_PARK_OPEN_HOURS, 1, None, "t")
            .unwrap();
        assert_eq!(relinks.len(), 1);
        let hours: OpenHours = store.find_by_id(1).unwrap().unwrap();
        assert!(hours.car_park.is_none());
    }
}
