//! End-to-end refinement sessions against the in-memory service.
//!
//! After every step the store must mirror the service: live undeleted cells
//! equal the service's active set and flagged cells equal its deleted set.

use std::collections::BTreeSet;
use std::sync::Arc;

use grid_topology::{
  CellKey, CellSet, GridError, GridRequest, GridResponse, GridTopologyStore, GridWorker,
  MemoryTopologyService, PatchMeta, ProjectionRegistry, SharedGridStore, StoreConfig,
  TopologyService,
};

fn meta() -> PatchMeta {
  PatchMeta {
    name: "workflow".into(),
    epsg: 4326,
    subdivide_rules: vec![[2, 2], [2, 2]],
    bounds: [113.8, 22.1, 114.5, 22.6],
  }
}

fn store_on(service: &Arc<MemoryTopologyService>) -> GridTopologyStore {
  let context = meta().to_context().unwrap();
  GridTopologyStore::new(
    &context,
    &ProjectionRegistry::new(),
    Arc::clone(service),
    &StoreConfig::with_max_cell_count(256),
  )
  .unwrap()
}

fn key_set(cells: &CellSet) -> BTreeSet<CellKey> {
  cells.keys().collect()
}

fn assert_mirrors(store: &GridTopologyStore, service: &MemoryTopologyService) {
  let mut active = BTreeSet::new();
  let mut deleted = BTreeSet::new();
  for storage_id in 0..store.next_storage_id() {
    let key = store.cell_info(storage_id).unwrap();
    assert_eq!(store.storage_id_of(key), Some(storage_id));
    if store.is_cell_deleted(storage_id).unwrap() {
      deleted.insert(key);
    } else {
      active.insert(key);
    }
  }
  assert_eq!(active, key_set(&service.activate_info().unwrap()));
  assert_eq!(deleted, key_set(&service.deleted_info().unwrap()));
}

fn slot(store: &GridTopologyStore, level: u8, global_id: u32) -> u32 {
  store.storage_id_of(CellKey::new(level, global_id)).unwrap()
}

/// Subdivide, then drop the parent locally, as an editing client does.
fn refine(store: &mut GridTopologyStore, storage_id: u32) {
  let targets = store.cells_for(&[storage_id]).unwrap();
  store.subdivide_cells(&targets).unwrap();
  store.delete_cells_locally(&[storage_id]).unwrap();
}

#[test]
fn test_refine_merge_delete_recover_session() {
  let service = Arc::new(MemoryTopologyService::new(meta()));
  let mut store = store_on(&service);

  store.init().unwrap();
  assert_mirrors(&store, &service);

  refine(&mut store, 0);
  assert_eq!(store.len(), 4);
  assert_mirrors(&store, &service);

  let west = slot(&store, 1, 0);
  refine(&mut store, west);
  assert_eq!(store.len(), 7);
  assert_mirrors(&store, &service);

  // Merging any one grandchild brings back its parent.
  let merge = store.merge_cells(&[slot(&store, 2, 5)]).unwrap();
  assert_eq!(merge.parents.global_ids, vec![0]);
  assert_eq!(merge.child_storage_ids.len(), 4);
  store.apply_merge(merge).unwrap();
  assert_eq!(store.len(), 4);
  assert_mirrors(&store, &service);

  let target = slot(&store, 1, 2);
  store.delete_cells(&[target]).unwrap();
  assert!(service.is_deleted(CellKey::new(1, 2)));
  assert_mirrors(&store, &service);

  store.recover_cells(&[target]).unwrap();
  assert_mirrors(&store, &service);

  // A fresh client sees the same topology.
  let mut fresh = store_on(&service);
  fresh.init().unwrap();
  assert_eq!(fresh.len(), store.len());
  assert_mirrors(&fresh, &service);
}

#[test]
fn test_deleted_cells_survive_reinit() {
  let service = Arc::new(MemoryTopologyService::with_full_level(meta(), 2).unwrap());
  let mut store = store_on(&service);
  store.init().unwrap();

  let doomed: Vec<u32> = [3, 7, 11].iter().map(|&gid| slot(&store, 2, gid)).collect();
  store.delete_cells(&doomed).unwrap();

  let mut fresh = store_on(&service);
  let batch = fresh.init().unwrap();
  assert_eq!(batch.len(), 16);
  // Deleted cells come last.
  assert_eq!(&batch.deleted[13..], &[1, 1, 1]);
  assert_mirrors(&fresh, &service);

  let by_key = CellSet::from_keys([CellKey::new(2, 7)]);
  fresh.recover_cells_by_key(&by_key).unwrap();
  assert!(service.is_active(CellKey::new(2, 7)));
  assert_mirrors(&fresh, &service);
}

#[test]
fn test_failed_service_call_changes_nothing() {
  let service = Arc::new(MemoryTopologyService::new(meta()));
  let mut store = store_on(&service);
  store.init().unwrap();
  refine(&mut store, 0);

  service.fail_on(Some(grid_topology::transport::ServiceOp::Merge));
  let before: Vec<_> = (0..store.next_storage_id())
    .map(|id| store.cell_info(id))
    .collect();
  let err = store.merge_cells(&[0, 1]).unwrap_err();
  assert!(matches!(err, GridError::Transport { operation: "merge", .. }));

  let after: Vec<_> = (0..store.next_storage_id())
    .map(|id| store.cell_info(id))
    .collect();
  assert_eq!(before, after);
  service.fail_on(None);
  assert_mirrors(&store, &service);
}

#[test]
fn test_worker_results_feed_the_store() {
  let service = Arc::new(MemoryTopologyService::new(meta()));
  let mut store = store_on(&service);
  store.init().unwrap();

  let mut worker = GridWorker::with_render_context(
    Arc::clone(store.render_context()),
    service.clone(),
    &StoreConfig::default(),
  )
  .unwrap();
  let targets = store.cells_for(&[0]).unwrap();
  let GridResponse::Subdivided(children) = worker.run(GridRequest::SubdivideGrids(targets)).unwrap()
  else {
    panic!("expected subdivided cells");
  };

  store.delete_cells_locally(&[0]).unwrap();
  let batch = store.add_cells(&children.cells()).unwrap();
  assert_eq!(batch.vertices, children.vertices);
  assert_eq!(batch.vertices_low, children.vertices_low);
  assert_mirrors(&store, &service);
}

#[test]
fn test_shared_store_serves_clones() {
  let service = Arc::new(MemoryTopologyService::new(meta()));
  let shared = SharedGridStore::new(store_on(&service));
  let other = shared.clone();

  shared.init().unwrap();
  let targets = other.with(|store| store.cells_for(&[0])).unwrap().unwrap();
  other.subdivide_cells(&targets).unwrap();
  shared.delete_cells_locally(&[0]).unwrap();

  assert_eq!(other.next_storage_id().unwrap(), 4);
  assert!(!shared.is_busy());
  shared.with(|store| assert_mirrors(store, &service)).unwrap();
}
