//! Resource synchronization service
//!
//! One logical write per request, applied to both stores in a fixed
//! order: identifier checks first, then the primary store, then the
//! search index mirror. The mirror is only touched after the primary write
//! succeeded, and a mirror failure is logged but never fails the request.
//! Between the two writes the mirror may be stale; [`ResourceService::reindex`]
//! brings it back in line with the primary store.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::audit::{AuditRecord, Auditor};
use crate::core::entity::{dispatch, Entity, KindVisitor};
use crate::core::error::{ErrorKey, ResourceError, ResourceResult};
use crate::core::graph::{EntityGraph, Relink};
use crate::core::identity::EntityKind;
use crate::core::links::Association;
use crate::core::search::{SearchHits, SearchIndex, SqliteSearchIndex};
use crate::core::store::{check_identity, PrimaryStore};
use crate::entities::Node;

/// Statistics from rebuilding the search index
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexStats {
    pub indexed: Vec<(EntityKind, usize)>,
    pub failed: usize,
    pub duration_ms: u64,
}

impl ReindexStats {
    pub fn total(&self) -> usize {
        self.indexed.iter().map(|(_, n)| n).sum()
    }
}

/// CRUD, search and association operations across both stores
pub struct ResourceService<I: SearchIndex = SqliteSearchIndex> {
    store: PrimaryStore,
    index: I,
    auditor: Arc<dyn Auditor>,
}

impl<I: SearchIndex> ResourceService<I> {
    pub fn new(store: PrimaryStore, index: I, auditor: Arc<dyn Auditor>) -> Self {
        Self {
            store,
            index,
            auditor,
        }
    }

    pub fn store(&self) -> &PrimaryStore {
        &self.store
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    fn actor(&self) -> String {
        self.auditor.current_auditor()
    }

    /// Store a new entity; the caller must not propose an identifier
    pub fn create<E: Entity>(&self, entity: E) -> ResourceResult<E> {
        debug!(entity = %E::KIND, "request to save");
        if entity.id().is_saved() {
            return Err(ResourceError::invalid(
                E::KIND,
                ErrorKey::IdExists,
                format!("A new {} cannot already have an ID", E::KIND),
            ));
        }
        entity.validate()?;

        let written = self.store.create(entity, &self.actor())?;
        self.mirror(&written.entity);
        self.mirror_relinks(&written.relinked);
        Ok(written.entity)
    }

    /// Replace the stored record `id` with `entity`
    pub fn update<E: Entity>(&self, id: i64, entity: E) -> ResourceResult<E> {
        debug!(entity = %E::KIND, id, "request to update");
        check_identity(id, &entity)?;
        entity.validate()?;

        let written = self.store.update(id, entity, &self.actor())?;
        self.mirror(&written.entity);
        self.mirror_relinks(&written.relinked);
        Ok(written.entity)
    }

    /// Overwrite only the fields present in `patch` and return the merged record
    pub fn partial_update<E: Entity>(&self, id: i64, patch: E) -> ResourceResult<E> {
        debug!(entity = %E::KIND, id, "request to partially update");
        check_identity(id, &patch)?;

        let merged = self.store.partial_update(id, patch, &self.actor())?;
        self.mirror(&merged);
        Ok(merged)
    }

    pub fn find_all<E: Entity>(&self) -> ResourceResult<Vec<E>> {
        debug!(entity = %E::KIND, "request to get all");
        self.store.find_all()
    }

    /// Look up one record; absence is `Ok(None)`
    pub fn find_one<E: Entity>(&self, id: i64) -> ResourceResult<Option<E>> {
        debug!(entity = %E::KIND, id, "request to get");
        self.store.find_by_id(id)
    }

    /// Like [`ResourceService::find_one`], but absence is an error
    pub fn get<E: Entity>(&self, id: i64) -> ResourceResult<E> {
        self.find_one(id)?.ok_or_else(|| {
            ResourceError::not_found(E::KIND, ErrorKey::NotFound, format!("{} {} not found", E::KIND, id))
        })
    }

    /// Delete from the primary store, then from the mirror
    ///
    /// The mirror delete runs whether or not the primary held the record.
    pub fn delete(&self, kind: EntityKind, id: i64) -> ResourceResult<()> {
        debug!(entity = %kind, id, "request to delete");
        let deleted = self.store.delete(kind, id, &self.actor())?;
        if let Err(e) = self.index.delete_by_id(kind, id) {
            warn!(entity = %kind, id, error = %e, "search index delete failed");
        }
        self.mirror_relinks(&deleted.relinked);
        Ok(())
    }

    /// Forward a query expression to the mirror
    pub fn search<E: Entity>(&self, query: &str) -> ResourceResult<SearchHits<E>> {
        debug!(entity = %E::KIND, query, "request to search");
        self.index.search(query)
    }

    pub fn set_children(
        &self,
        association: &'static Association,
        parent: i64,
        children: &[i64],
    ) -> ResourceResult<Vec<Relink>> {
        debug!(association = association.name, parent, ?children, "request to set children");
        let relinks = self
            .store
            .set_children(association, parent, children, &self.actor())?;
        self.mirror_relinks(&relinks);
        Ok(relinks)
    }

    pub fn add_child(
        &self,
        association: &'static Association,
        parent: i64,
        child: i64,
    ) -> ResourceResult<Vec<Relink>> {
        debug!(association = association.name, parent, child, "request to add child");
        let relinks = self
            .store
            .add_child(association, parent, child, &self.actor())?;
        self.mirror_relinks(&relinks);
        Ok(relinks)
    }

    pub fn remove_child(
        &self,
        association: &'static Association,
        parent: i64,
        child: i64,
    ) -> ResourceResult<Vec<Relink>> {
        debug!(association = association.name, parent, child, "request to remove child");
        let relinks = self
            .store
            .remove_child(association, parent, child, &self.actor())?;
        self.mirror_relinks(&relinks);
        Ok(relinks)
    }

    /// Current children of `parent`, ascending by id
    pub fn children(&self, association: &'static Association, parent: i64) -> ResourceResult<Vec<Node>> {
        let graph = self
            .store
            .load_with_children(association.parent, parent)?
            .ok_or_else(|| {
                ResourceError::not_found(
                    association.parent,
                    ErrorKey::NotFound,
                    format!("{} {} not found", association.parent, parent),
                )
            })?;
        Ok(graph
            .children_of(association, parent)
            .into_iter()
            .filter_map(|child| graph.node(association.child, child))
            .collect())
    }

    pub fn load_with_children(&self, kind: EntityKind, id: i64) -> ResourceResult<Option<EntityGraph>> {
        self.store.load_with_children(kind, id)
    }

    pub fn load_parent_only(
        &self,
        association: &'static Association,
        child: i64,
    ) -> ResourceResult<Option<Node>> {
        self.store.load_parent_only(association, child)
    }

    pub fn audit_of(&self, kind: EntityKind, id: i64) -> ResourceResult<Option<AuditRecord>> {
        self.store.audit_of(kind, id)
    }

    /// Rebuild the mirror from the primary store
    pub fn reindex(&self) -> ResourceResult<ReindexStats> {
        let start = Instant::now();
        let mut stats = ReindexStats::default();

        for kind in EntityKind::all() {
            self.index.clear(*kind)?;
            let (indexed, failed) = dispatch(*kind, Reindex { service: self })?;
            stats.indexed.push((*kind, indexed));
            stats.failed += failed;
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            indexed = stats.total(),
            failed = stats.failed,
            duration_ms = stats.duration_ms,
            "search index rebuilt"
        );
        Ok(stats)
    }

    /// Best-effort upsert into the mirror
    fn mirror<E: Entity>(&self, entity: &E) -> bool {
        match self.index.save(entity) {
            Ok(()) => true,
            Err(e) => {
                warn!(entity = %E::KIND, id = %entity.id(), error = %e, "search index update failed");
                false
            }
        }
    }

    /// Re-mirror every child whose back-reference moved
    fn mirror_relinks(&self, relinks: &[Relink]) {
        let moved: BTreeSet<(EntityKind, i64)> = relinks
            .iter()
            .map(|r| (r.association.child, r.child))
            .collect();
        for (kind, id) in moved {
            dispatch(kind, Remirror { service: self, id });
        }
    }
}

/// Reload one entity from the primary store and mirror it
struct Remirror<'a, I: SearchIndex> {
    service: &'a ResourceService<I>,
    id: i64,
}

impl<I: SearchIndex> KindVisitor for Remirror<'_, I> {
    type Output = ();

    fn visit<E: Entity>(self) {
        match self.service.store.find_by_id::<E>(self.id) {
            Ok(Some(entity)) => {
                self.service.mirror(&entity);
            }
            Ok(None) => {
                if let Err(e) = self.service.index.delete_by_id(E::KIND, self.id) {
                    warn!(entity = %E::KIND, id = self.id, error = %e, "search index delete failed");
                }
            }
            Err(e) => warn!(entity = %E::KIND, id = self.id, error = %e, "could not reload relinked entity"),
        }
    }
}

/// Copy every entity of one kind into the mirror
struct Reindex<'a, I: SearchIndex> {
    service: &'a ResourceService<I>,
}

impl<I: SearchIndex> KindVisitor for Reindex<'_, I> {
    type Output = ResourceResult<(usize, usize)>;

    fn visit<E: Entity>(self) -> Self::Output {
        let mut indexed = 0;
        let mut failed = 0;
        for entity in self.service.store.find_all::<E>()? {
            if self.service.mirror(&entity) {
                indexed += 1;
            } else {
                failed += 1;
            }
        }
        Ok((indexed, failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit::FixedAuditor;
    use crate::core::links::{CAR_PARK_PARKING_SPOTS, PARKING_SPOT_USER_EXTRA};
    use crate::entities::{CarPark, OpenHours, ParkingSpot, UserExtra};
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Save(EntityKind, serde_json::Value),
        Delete(EntityKind, i64),
    }

    /// Records every call; optionally fails all of them
    #[derive(Default)]
    struct RecordingIndex {
        calls: Mutex<Vec<Call>>,
        fail: bool,
    }

    impl RecordingIndex {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn outcome(&self) -> ResourceResult<()> {
            if self.fail {
                Err(ResourceError::from_sqlite(
                    EntityKind::Address,
                    crate::core::error::StoreRole::Mirror,
                    rusqlite::Error::InvalidQuery,
                ))
            } else {
                Ok(())
            }
        }
    }

    impl SearchIndex for RecordingIndex {
        fn save<E: Entity>(&self, entity: &E) -> ResourceResult<()> {
            self.calls
                .lock()
                .push(Call::Save(E::KIND, serde_json::to_value(entity).unwrap()));
            self.outcome()
        }

        fn delete_by_id(&self, kind: EntityKind, id: i64) -> ResourceResult<()> {
            self.calls.lock().push(Call::Delete(kind, id));
            self.outcome()
        }

        fn search<E: Entity>(&self, _query: &str) -> ResourceResult<SearchHits<E>> {
            Ok(SearchHits::new(Vec::new()))
        }

        fn clear(&self, _kind: EntityKind) -> ResourceResult<()> {
            self.outcome()
        }
    }

    fn service_with(index: RecordingIndex) -> (TempDir, ResourceService<RecordingIndex>) {
        let tmp = TempDir::new().unwrap();
        let store = PrimaryStore::open(tmp.path().join("parking.db")).unwrap();
        let service = ResourceService::new(store, index, Arc::new(FixedAuditor::new("tester")));
        (tmp, service)
    }

    fn service() -> (TempDir, ResourceService<RecordingIndex>) {
        service_with(RecordingIndex::default())
    }

    #[test]
    fn test_create_rejects_preassigned_id() {
        let (_tmp, service) = service();
        let mut park = CarPark::new("A", "O");
        park.assign_id(5);

        let err = service.create(park).unwrap_err();
        assert_eq!(err.key(), ErrorKey::IdExists);
        assert_eq!(err.entity(), EntityKind::CarPark);
        assert_eq!(service.store().count(EntityKind::CarPark).unwrap(), 0);
        assert!(service.index().calls().is_empty());
    }

    #[test]
    fn test_create_mirrors_stored_entity() {
        let (_tmp, service) = service();
        let park = service.create(CarPark::new("A", "O")).unwrap();

        assert_eq!(park.id().get(), Some(1));
        let calls = service.index().calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], Call::Save(EntityKind::CarPark, doc) if doc["id"] == 1));
    }

    #[test]
    fn test_full_update_round_trip() {
        let (_tmp, service) = service();
        service.create(CarPark::new("A", "O")).unwrap();
        let before = service.index().calls().len();

        let mut replacement = CarPark::new("B", "P");
        replacement.assign_id(1);
        let updated = service.update(1, replacement).unwrap();

        let stored: CarPark = service.get(1).unwrap();
        assert_eq!(stored.name.as_deref(), Some("B"));
        assert_eq!(stored.owner.as_deref(), Some("P"));

        let calls = service.index().calls();
        assert_eq!(calls.len() - before, 1);
        assert_eq!(
            calls[before],
            Call::Save(EntityKind::CarPark, serde_json::to_value(&updated).unwrap())
        );
    }

    #[test]
    fn test_update_checks_run_before_store() {
        let (_tmp, service) = service();
        let err = service.update(1, CarPark::new("B", "P")).unwrap_err();
        assert_eq!(err.key(), ErrorKey::IdNull);

        let mut other = CarPark::new("B", "P");
        other.assign_id(2);
        assert_eq!(service.update(1, other).unwrap_err().key(), ErrorKey::IdInvalid);

        let mut missing = CarPark::new("B", "P");
        missing.assign_id(1);
        assert_eq!(service.update(1, missing).unwrap_err().key(), ErrorKey::IdNotFound);
        assert!(service.index().calls().is_empty());
    }

    #[test]
    fn test_partial_update_preserves_untouched_fields() {
        let (_tmp, service) = service();
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        service
            .create(OpenHours::new("Mon", "08:00", "18:00").date(date))
            .unwrap();

        let mut patch = OpenHours {
            closing_hour: Some("20:00".into()),
            ..OpenHours::default()
        };
        patch.assign_id(1);
        let merged = service.partial_update(1, patch).unwrap();

        assert_eq!(merged.weekday.as_deref(), Some("Mon"));
        assert_eq!(merged.opening_hour.as_deref(), Some("08:00"));
        assert_eq!(merged.closing_hour.as_deref(), Some("20:00"));
        assert_eq!(merged.date, Some(date));
        assert!(matches!(
            service.index().calls().last(),
            Some(Call::Save(EntityKind::OpenHours, doc)) if doc["closingHour"] == "20:00"
        ));
    }

    #[test]
    fn test_partial_update_of_missing_record() {
        let (_tmp, service) = service();
        let mut patch = OpenHours::default();
        patch.assign_id(4);
        let err = service.partial_update(4, patch).unwrap_err();
        assert!(matches!(err, ResourceError::NotFound { .. }));
        assert!(service.index().calls().is_empty());
    }

    #[test]
    fn test_delete_is_idempotent_and_always_mirrors() {
        let (_tmp, service) = service();
        service.create(CarPark::new("A", "O")).unwrap();

        service.delete(EntityKind::CarPark, 1).unwrap();
        service.delete(EntityKind::CarPark, 1).unwrap();

        let deletes: Vec<_> = service
            .index()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Delete(..)))
            .collect();
        assert_eq!(
            deletes,
            vec![
                Call::Delete(EntityKind::CarPark, 1),
                Call::Delete(EntityKind::CarPark, 1)
            ]
        );
        assert!(service.find_one::<CarPark>(1).unwrap().is_none());
    }

    #[test]
    fn test_missing_available_rejected_before_store() {
        let (_tmp, service) = service();
        let err = service.create(ParkingSpot::default()).unwrap_err();
        assert_eq!(err.key(), ErrorKey::Validation);
        assert_eq!(service.store().count(EntityKind::ParkingSpot).unwrap(), 0);
        assert!(service.index().calls().is_empty());
    }

    #[test]
    fn test_mirror_failure_does_not_fail_request() {
        let (_tmp, service) = service_with(RecordingIndex::failing());
        let park = service.create(CarPark::new("A", "O")).unwrap();
        assert_eq!(park.id().get(), Some(1));
        service.delete(EntityKind::CarPark, 1).unwrap();
        assert_eq!(service.store().count(EntityKind::CarPark).unwrap(), 0);
    }

    #[test]
    fn test_primary_failure_leaves_mirror_untouched() {
        let (_tmp, service) = service();
        let err = service
            .create(ParkingSpot::new(true).car_park(99))
            .unwrap_err();
        assert_eq!(err.key(), ErrorKey::RelationNotFound);
        assert!(service.index().calls().is_empty());
    }

    #[test]
    fn test_association_changes_are_mirrored() {
        let (_tmp, service) = service();
        service.create(CarPark::new("A", "O")).unwrap();
        service.create(ParkingSpot::new(true)).unwrap();
        service.create(ParkingSpot::new(false)).unwrap();
        let before = service.index().calls().len();

        service
            .set_children(&CAR_PARK_PARKING_SPOTS, 1, &[1, 2])
            .unwrap();

        let calls = service.index().calls();
        assert_eq!(calls.len() - before, 2);
        let children = service.children(&CAR_PARK_PARKING_SPOTS, 1).unwrap();
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_claiming_spot_remirrors_previous_holder() {
        let (_tmp, service) = service();
        service.create(ParkingSpot::new(true)).unwrap();
        service.create(UserExtra::default().parking_spot(1)).unwrap();
        service.create(UserExtra::default().parking_spot(1)).unwrap();

        let calls = service.index().calls();
        assert!(matches!(
            calls.last(),
            Some(Call::Save(EntityKind::UserExtra, doc)) if doc["id"] == 1 && doc["parkingSpot"].is_null()
        ));
        let parent = service.load_parent_only(&PARKING_SPOT_USER_EXTRA, 2).unwrap();
        assert!(matches!(parent, Some(Node::ParkingSpot(_))));
    }

    #[test]
    fn test_reindex_copies_primary() {
        let (_tmp, service) = service();
        service.create(CarPark::new("A", "O")).unwrap();
        service.create(CarPark::new("B", "P")).unwrap();
        service.create(ParkingSpot::new(true)).unwrap();

        let stats = service.reindex().unwrap();
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.failed, 0);
    }
}
