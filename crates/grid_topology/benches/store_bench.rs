//! Store benchmarks against the in-memory service.
//!
//! - **render**: vertex batches for a full level (parallel)
//! - **subdivide**: root-to-level-2 refinement with the children appended
//! - **compaction**: local delete of every other cell

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use grid_topology::{
  CellKey, CellSet, GridTopologyStore, MemoryTopologyService, PatchMeta, ProjectionRegistry,
  RenderContext, StoreConfig,
};

fn meta() -> PatchMeta {
  PatchMeta {
    name: "bench".into(),
    epsg: 3857,
    subdivide_rules: vec![[8, 8], [8, 8], [4, 4]],
    bounds: [12_600_000.0, 2_550_000.0, 12_750_000.0, 2_650_000.0],
  }
}

fn store_with(service: MemoryTopologyService) -> GridTopologyStore {
  let meta = meta();
  let context = meta.to_context().unwrap();
  GridTopologyStore::new(
    &context,
    &ProjectionRegistry::new(),
    service,
    &StoreConfig::with_max_cell_count(1 << 16),
  )
  .unwrap()
}

fn bench_render(c: &mut Criterion) {
  let context = meta().to_context().unwrap();
  let render = RenderContext::new(&context, &ProjectionRegistry::new()).unwrap();

  let mut group = c.benchmark_group("render_vertices");
  for level in [1u8, 2] {
    let count = render.levels().info(level).unwrap().cell_count() as u32;
    let cells = CellSet::from_keys((0..count).map(|global_id| CellKey::new(level, global_id)));
    group.throughput(Throughput::Elements(count as u64));
    group.bench_with_input(BenchmarkId::new("level", level), &cells, |b, cells| {
      b.iter(|| black_box(render.render_info(cells).unwrap()));
    });
  }
  group.finish();
}

fn bench_subdivide(c: &mut Criterion) {
  c.bench_function("subdivide_root_to_level_2", |b| {
    b.iter(|| {
      let mut store = store_with(MemoryTopologyService::new(meta()));
      store.init().unwrap();
      let root = store.cells_for(&[0]).unwrap();
      let level_1 = store.subdivide_cells(&root).unwrap();
      store.delete_cells_locally(&[0]).unwrap();
      let ids: Vec<u32> = (0..level_1.len() as u32).collect();
      let targets = store.cells_for(&ids).unwrap();
      black_box(store.subdivide_cells(&targets).unwrap())
    });
  });
}

fn bench_compaction(c: &mut Criterion) {
  let mut group = c.benchmark_group("delete_cells_locally");
  group.sample_size(20);
  let mut store = store_with(MemoryTopologyService::with_full_level(meta(), 2).unwrap());
  let total = store.init().unwrap().len() as u32;
  let every_other: Vec<u32> = (0..total).step_by(2).collect();
  group.throughput(Throughput::Elements(every_other.len() as u64));
  group.bench_function("every_other", |b| {
    b.iter(|| {
      store.init().unwrap();
      black_box(store.delete_cells_locally(&every_other).unwrap())
    });
  });
  group.finish();
}

criterion_group!(benches, bench_render, bench_subdivide, bench_compaction);
criterion_main!(benches);
