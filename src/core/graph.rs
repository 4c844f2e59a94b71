//! Arena-and-index entity graph
//!
//! Entities live in a map keyed by `(kind, id)`; associations are kept as
//! explicit index sets, one [`AssociationIndex`] per association. Every
//! change to an association goes through [`AssociationIndex::relink`],
//! which moves a child between parents on both sides in one step, and the
//! graph applies the resulting [`Relink`]s to the stored entities under a
//! single write lock so readers never see a half-moved child.
//!
//! The same index type is used by the primary store to compute which rows
//! must change inside a transaction.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use miette::Diagnostic;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;

use crate::core::entity::Entity;
use crate::core::identity::EntityKind;
use crate::core::links::{self, Association, Cardinality};
use crate::entities::Node;

/// One child moving from one parent (or none) to another (or none)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relink {
    #[serde(serialize_with = "association_name")]
    pub association: &'static Association,
    pub child: i64,
    pub before: Option<i64>,
    pub after: Option<i64>,
}

fn association_name<S: serde::Serializer>(
    association: &&'static Association,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(association.name)
}

/// Errors raised by graph mutations
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("{kind} has not been saved and cannot take part in an association")]
    #[diagnostic(code(spk::graph::not_saved))]
    NotSaved { kind: EntityKind },

    #[error("{kind} {id} is not loaded in the graph")]
    #[diagnostic(code(spk::graph::missing))]
    Missing { kind: EntityKind, id: i64 },

    #[error("{association} holds at most one child, got {count}")]
    #[diagnostic(code(spk::graph::cardinality))]
    CardinalityExceeded {
        association: &'static str,
        count: usize,
    },
}

/// Both directions of one association: parent → children and child → parent
#[derive(Debug, Clone)]
pub struct AssociationIndex {
    association: &'static Association,
    children: HashMap<i64, BTreeSet<i64>>,
    parents: HashMap<i64, i64>,
}

impl AssociationIndex {
    pub fn new(association: &'static Association) -> Self {
        Self {
            association,
            children: HashMap::new(),
            parents: HashMap::new(),
        }
    }

    /// Build an index from `(child, parent)` pairs as read from storage
    ///
    /// For a one-to-one association only the first child seen per parent
    /// is kept.
    pub fn load(
        association: &'static Association,
        pairs: impl IntoIterator<Item = (i64, Option<i64>)>,
    ) -> Self {
        let mut index = Self::new(association);
        for (child, parent) in pairs {
            match parent {
                Some(parent)
                    if association.cardinality == Cardinality::One
                        && index.children.get(&parent).is_some_and(|s| !s.is_empty()) => {}
                Some(parent) => {
                    index.parents.insert(child, parent);
                    index.children.entry(parent).or_default().insert(child);
                }
                None => {}
            }
        }
        index
    }

    pub fn association(&self) -> &'static Association {
        self.association
    }

    pub fn back_reference_of(&self, child: i64) -> Option<i64> {
        self.parents.get(&child).copied()
    }

    /// Children of `parent`, ascending by id
    pub fn children_of(&self, parent: i64) -> Vec<i64> {
        self.children
            .get(&parent)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Move `child` under `after`, updating both directions together
    ///
    /// For a one-to-one association the parent's current child is detached
    /// first; that relink is recorded before the child's own.
    fn relink(&mut self, child: i64, after: Option<i64>, out: &mut Vec<Relink>) {
        let before = self.back_reference_of(child);
        if before == after {
            return;
        }

        if let Some(parent) = after {
            if self.association.cardinality == Cardinality::One {
                let holders: Vec<i64> = self
                    .children_of(parent)
                    .into_iter()
                    .filter(|c| *c != child)
                    .collect();
                for holder in holders {
                    self.relink(holder, None, out);
                }
            }
        }

        if let Some(old) = before {
            if let Some(set) = self.children.get_mut(&old) {
                set.remove(&child);
                if set.is_empty() {
                    self.children.remove(&old);
                }
            }
        }
        match after {
            Some(parent) => {
                self.parents.insert(child, parent);
                self.children.entry(parent).or_default().insert(child);
            }
            None => {
                self.parents.remove(&child);
            }
        }

        out.push(Relink {
            association: self.association,
            child,
            before,
            after,
        });
    }

    /// Point `child` at `parent` (or at nothing)
    pub fn set_back_reference(&mut self, child: i64, parent: Option<i64>) -> Vec<Relink> {
        let mut out = Vec::new();
        self.relink(child, parent, &mut out);
        out
    }

    pub fn add_child(&mut self, parent: i64, child: i64) -> Vec<Relink> {
        self.set_back_reference(child, Some(parent))
    }

    /// Detach `child` if it currently belongs to `parent`
    pub fn remove_child(&mut self, parent: i64, child: i64) -> Vec<Relink> {
        if self.back_reference_of(child) == Some(parent) {
            self.set_back_reference(child, None)
        } else {
            Vec::new()
        }
    }

    /// Replace the whole child set of `parent`
    ///
    /// Members leaving the set are detached before new members are
    /// attached; members present in both sets are not touched.
    pub fn set_children(
        &mut self,
        parent: i64,
        children: impl IntoIterator<Item = i64>,
    ) -> Result<Vec<Relink>, GraphError> {
        let wanted: BTreeSet<i64> = children.into_iter().collect();
        if self.association.cardinality == Cardinality::One && wanted.len() > 1 {
            return Err(GraphError::CardinalityExceeded {
                association: self.association.name,
                count: wanted.len(),
            });
        }

        let mut out = Vec::new();
        for old in self.children_of(parent) {
            if !wanted.contains(&old) {
                self.relink(old, None, &mut out);
            }
        }
        for child in wanted {
            self.relink(child, Some(parent), &mut out);
        }
        Ok(out)
    }

    /// Detach every child of a parent that is going away
    pub fn forget_parent(&mut self, parent: i64) -> Vec<Relink> {
        let mut out = Vec::new();
        for child in self.children_of(parent) {
            self.relink(child, None, &mut out);
        }
        out
    }

    /// Drop a child that is going away, without recording a relink
    pub fn forget_child(&mut self, child: i64) {
        if let Some(parent) = self.parents.remove(&child) {
            if let Some(set) = self.children.get_mut(&parent) {
                set.remove(&child);
                if set.is_empty() {
                    self.children.remove(&parent);
                }
            }
        }
    }
}

/// An entity with its direct children grouped by association
#[derive(Debug, Clone, Serialize)]
pub struct Aggregate {
    pub entity: Node,
    pub children: BTreeMap<&'static str, Vec<Node>>,
}

struct GraphState {
    nodes: BTreeMap<(EntityKind, i64), Node>,
    indexes: Vec<AssociationIndex>,
}

impl GraphState {
    fn index_mut(&mut self, association: &Association) -> &mut AssociationIndex {
        &mut self.indexes[links::position(association)]
    }

    fn index(&self, association: &Association) -> &AssociationIndex {
        &self.indexes[links::position(association)]
    }

    fn require(&self, kind: EntityKind, id: i64) -> Result<(), GraphError> {
        if self.nodes.contains_key(&(kind, id)) {
            Ok(())
        } else {
            Err(GraphError::Missing { kind, id })
        }
    }

    fn apply(&mut self, relinks: &[Relink]) {
        for relink in relinks {
            if let Some(node) = self.nodes.get_mut(&(relink.association.child, relink.child)) {
                node.set_back_reference(relink.association, relink.after);
            }
        }
    }
}

/// In-memory graph of loaded entities
///
/// Children must be loaded before they can be linked; parents may be
/// referenced by id alone.
pub struct EntityGraph {
    state: RwLock<GraphState>,
}

impl Default for EntityGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityGraph {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState {
                nodes: BTreeMap::new(),
                indexes: links::all()
                    .into_iter()
                    .map(AssociationIndex::new)
                    .collect(),
            }),
        }
    }

    /// Insert or replace a saved entity, indexing its back-references
    ///
    /// Returns the relinks caused by the insert, including the eviction of
    /// a previous holder of a one-to-one parent.
    pub fn insert<E: Entity>(&self, entity: E) -> Result<Vec<Relink>, GraphError> {
        let id = entity
            .id()
            .get()
            .ok_or(GraphError::NotSaved { kind: E::KIND })?;

        let mut state = self.state.write();
        let mut relinks = Vec::new();
        for association in links::owned_by(E::KIND) {
            let parent = entity.back_reference(association);
            relinks.extend(state.index_mut(association).set_back_reference(id, parent));
        }
        state.nodes.insert((E::KIND, id), entity.into_node());
        state.apply(&relinks);
        Ok(relinks)
    }

    pub fn get<E: Entity>(&self, id: i64) -> Option<E> {
        let state = self.state.read();
        state
            .nodes
            .get(&(E::KIND, id))
            .and_then(E::from_node)
            .cloned()
    }

    pub fn node(&self, kind: EntityKind, id: i64) -> Option<Node> {
        self.state.read().nodes.get(&(kind, id)).cloned()
    }

    pub fn contains(&self, kind: EntityKind, id: i64) -> bool {
        self.state.read().nodes.contains_key(&(kind, id))
    }

    /// Remove an entity, detaching any children that pointed at it
    pub fn remove(&self, kind: EntityKind, id: i64) -> (Option<Node>, Vec<Relink>) {
        let mut state = self.state.write();
        let removed = state.nodes.remove(&(kind, id));

        for association in links::owned_by(kind) {
            state.index_mut(association).forget_child(id);
        }
        let mut relinks = Vec::new();
        for association in links::children_of(kind) {
            relinks.extend(state.index_mut(association).forget_parent(id));
        }
        state.apply(&relinks);
        (removed, relinks)
    }

    /// Replace the child collection of `parent` as one step
    pub fn set_children(
        &self,
        association: &'static Association,
        parent: i64,
        children: &[i64],
    ) -> Result<Vec<Relink>, GraphError> {
        let mut state = self.state.write();
        for child in children {
            state.require(association.child, *child)?;
        }
        let relinks = state
            .index_mut(association)
            .set_children(parent, children.iter().copied())?;
        state.apply(&relinks);
        Ok(relinks)
    }

    pub fn set_back_reference(
        &self,
        association: &'static Association,
        child: i64,
        parent: Option<i64>,
    ) -> Result<Vec<Relink>, GraphError> {
        let mut state = self.state.write();
        state.require(association.child, child)?;
        let relinks = state.index_mut(association).set_back_reference(child, parent);
        state.apply(&relinks);
        Ok(relinks)
    }

    pub fn add_child(
        &self,
        association: &'static Association,
        parent: i64,
        child: i64,
    ) -> Result<Vec<Relink>, GraphError> {
        self.set_back_reference(association, child, Some(parent))
    }

    pub fn remove_child(
        &self,
        association: &'static Association,
        parent: i64,
        child: i64,
    ) -> Result<Vec<Relink>, GraphError> {
        let mut state = self.state.write();
        state.require(association.child, child)?;
        let relinks = state.index_mut(association).remove_child(parent, child);
        state.apply(&relinks);
        Ok(relinks)
    }

    pub fn back_reference_of(&self, association: &Association, child: i64) -> Option<i64> {
        self.state.read().index(association).back_reference_of(child)
    }

    pub fn children_of(&self, association: &Association, parent: i64) -> Vec<i64> {
        self.state.read().index(association).children_of(parent)
    }

    /// Loaded children of `parent`, as entities
    pub fn children<E: Entity>(&self, association: &Association, parent: i64) -> Vec<E> {
        let state = self.state.read();
        state
            .index(association)
            .children_of(parent)
            .into_iter()
            .filter_map(|id| state.nodes.get(&(E::KIND, id)))
            .filter_map(E::from_node)
            .cloned()
            .collect()
    }

    /// The entity with all of its loaded direct children
    pub fn aggregate(&self, kind: EntityKind, id: i64) -> Option<Aggregate> {
        let state = self.state.read();
        let entity = state.nodes.get(&(kind, id))?.clone();

        let mut children = BTreeMap::new();
        for association in links::children_of(kind) {
            let field = association
                .name
                .rsplit('.')
                .next()
                .unwrap_or(association.name);
            let members = state
                .index(association)
                .children_of(id)
                .into_iter()
                .filter_map(|child| state.nodes.get(&(association.child, child)).cloned())
                .collect();
            children.insert(field, members);
        }

        Some(Aggregate { entity, children })
    }

    pub fn len(&self) -> usize {
        self.state.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.state
            .read()
            .nodes
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Snapshot of every loaded entity, grouped by kind then id
    pub fn nodes(&self) -> Vec<Node> {
        self.state.read().nodes.values().cloned().collect()
    }
}
