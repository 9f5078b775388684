//! Grid topology client.
//!
//! Drives a `GridTopologyStore` against a remote topology service, or against
//! the in-memory service with `--offline`.
//!
//! Subcommands:
//! - info: per-level cell counts of the current topology
//! - subdivide / delete / recover: edit cells given by level and global ids
//! - pick: cells selected by a feature file
//! - save: persist the service's topology
//! - bench-local: refine an offline patch level by level and report timings

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;
use web_time::Instant;

use config::Config;
use grid_topology::{
	CellKey, CellSet, GridContext, GridTopologyStore, HttpTopologyService, MemoryTopologyService,
	ProjectionRegistry, StoreOp, TopologyService,
};

/// Command-line client for the grid topology service.
#[derive(Parser, Debug)]
#[command(name = "gridctl")]
#[command(about = "Inspects and edits a multi-resolution grid topology")]
struct Args {
	/// Path to configuration TOML file.
	#[arg(short, long, default_value = "grid.toml")]
	config: PathBuf,

	/// Use the in-memory service with the config's [patch].
	#[arg(long)]
	offline: bool,

	/// Verbosity (-v info, -vv debug, -vvv trace).
	#[arg(short, long, action = clap::ArgAction::Count)]
	verbose: u8,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print per-level cell counts.
	Info,
	/// Subdivide cells and replace them with their children.
	Subdivide {
		#[arg(short, long)]
		level: u8,
		/// Global ids at `level`.
		#[arg(required = true)]
		ids: Vec<u32>,
	},
	/// Mark cells deleted.
	Delete {
		#[arg(short, long)]
		level: u8,
		#[arg(required = true)]
		ids: Vec<u32>,
	},
	/// Reactivate deleted cells.
	Recover {
		#[arg(short, long)]
		level: u8,
		#[arg(required = true)]
		ids: Vec<u32>,
	},
	/// List the cells a feature file selects.
	Pick { feature_dir: String },
	/// Persist the current topology.
	Save,
	/// Refine an offline patch level by level and report store timings.
	BenchLocal {
		/// Deepest level to refine to (default: finest).
		#[arg(short, long)]
		depth: Option<u8>,
	},
}

fn main() -> Result<()> {
	let args = Args::parse();

	let subscriber = FmtSubscriber::builder()
		.with_max_level(match args.verbose {
			0 => tracing::Level::WARN,
			1 => tracing::Level::INFO,
			2 => tracing::Level::DEBUG,
			_ => tracing::Level::TRACE,
		})
		.finish();
	tracing::subscriber::set_global_default(subscriber)
		.context("Setting default tracing subscriber failed")?;

	let config = Config::load(&args.config)?;
	let offline = args.offline || matches!(args.command, Command::BenchLocal { .. });
	let (context, service) = connect(&config, offline)?;
	info!(src_epsg = %context.src_epsg, levels = context.rules.len() + 1, "patch loaded");

	let mut store = GridTopologyStore::new(&context, &ProjectionRegistry::new(), service, &config.store)
		.context("Creating grid store")?;
	let initial = store.init().context("Loading topology")?;
	println!("Loaded {} cells", initial.len());

	match args.command {
		Command::Info => print_info(&store),
		Command::Subdivide { level, ids } => {
			let slots = storage_ids(&store, level, &ids)?;
			let targets = store.cells_for(&slots)?;
			let children = store.subdivide_cells(&targets).context("Subdividing")?;
			let moved = store.delete_cells_locally(&slots)?;
			println!(
				"Subdivided {} cells into {} children ({} slots relocated)",
				slots.len(),
				children.len(),
				moved.len()
			);
			print_info(&store);
		}
		Command::Delete { level, ids } => {
			let slots = storage_ids(&store, level, &ids)?;
			store.delete_cells(&slots).context("Deleting")?;
			println!("Marked {} cells deleted", slots.len());
		}
		Command::Recover { level, ids } => {
			let keys = ids.iter().map(|&id| CellKey::new(level, id));
			let appended = store
				.recover_cells_by_key(&CellSet::from_keys(keys))
				.context("Recovering")?;
			println!("Recovered {} cells ({} newly tracked)", ids.len(), appended.len());
		}
		Command::Pick { feature_dir } => {
			let picked = store.cells_by_feature(&feature_dir).context("Picking")?;
			let tracked: Vec<u32> = picked.iter().flatten().copied().collect();
			println!("{} cells selected, {} tracked", picked.len(), tracked.len());
			for storage_id in tracked {
				let cell = store.check_cell(storage_id)?;
				println!(
					"  #{:<8} level {} global {} local {}{}",
					cell.storage_id,
					cell.level,
					cell.global_id,
					cell.local_id,
					if cell.deleted { " (deleted)" } else { "" }
				);
			}
		}
		Command::Save => {
			let saved = store.save().context("Saving")?;
			if !saved.success {
				anyhow::bail!("Service refused to save: {}", saved.message);
			}
			println!("{}", saved.message);
		}
		Command::BenchLocal { depth } => bench_local(&mut store, depth)?,
	}

	Ok(())
}

/// Build the service and the patch's grid context.
fn connect(config: &Config, offline: bool) -> Result<(GridContext, Arc<dyn TopologyService + Sync>)> {
	if offline {
		let context = config.offline_context()?;
		let patch = config.patch.clone().context("--offline needs a [patch] section")?;
		let service = MemoryTopologyService::new(patch);
		for feature in &config.features {
			service.register_feature(&feature.dir, feature.cell_set())?;
		}
		return Ok((context, Arc::new(service)));
	}

	let endpoint = config
		.service
		.as_ref()
		.context("No [service] section; pass --offline to use [patch]")?;
	let service = HttpTopologyService::with_timeout(
		&endpoint.base_url,
		Duration::from_secs(endpoint.timeout_secs),
	)?;
	let meta = service
		.meta()
		.with_context(|| format!("Fetching patch meta from {}", endpoint.base_url))?;
	let context = meta
		.to_context()
		.with_context(|| format!("Invalid patch meta for '{}'", meta.name))?;
	Ok((context, Arc::new(service)))
}

/// Storage ids of `(level, id)` cells; every cell must be tracked.
fn storage_ids(store: &GridTopologyStore, level: u8, ids: &[u32]) -> Result<Vec<u32>> {
	ids.iter()
		.map(|&global_id| {
			let key = CellKey::new(level, global_id);
			store
				.storage_id_of(key)
				.with_context(|| format!("Cell {} is not in the topology", key.uuid()))
		})
		.collect()
}

fn print_info(store: &GridTopologyStore) {
	let mut per_level: BTreeMap<u8, (usize, usize)> = BTreeMap::new();
	for storage_id in 0..store.next_storage_id() {
		let Ok(cell) = store.check_cell(storage_id) else {
			continue;
		};
		let entry = per_level.entry(cell.level).or_default();
		if cell.deleted {
			entry.1 += 1;
		} else {
			entry.0 += 1;
		}
	}

	let center = store.render_context().center();
	println!("Center (high/low): [{}, {}] [{}, {}]", center[0], center[2], center[1], center[3]);
	println!("{:>5} {:>10} {:>10}", "level", "active", "deleted");
	for (level, (active, deleted)) in per_level {
		println!("{:>5} {:>10} {:>10}", level, active, deleted);
	}
	println!("{} cells total", store.len());
}

/// Refine every active cell one level at a time down to `depth`.
fn bench_local(store: &mut GridTopologyStore, depth: Option<u8>) -> Result<()> {
	let finest = (store.level_hierarchy().level_count() - 1) as u8;
	let depth = depth.unwrap_or(finest).min(finest);
	let started = Instant::now();

	for level in 0..depth {
		let slots: Vec<u32> = (0..store.next_storage_id())
			.filter(|&id| store.cell_info(id).is_some_and(|key| key.level == level))
			.collect();
		if slots.is_empty() {
			warn!(level, "no cells to refine");
			break;
		}
		let targets = store.cells_for(&slots)?;
		let level_started = Instant::now();
		let children = store
			.subdivide_cells(&targets)
			.with_context(|| format!("Refining level {}", level))?;
		let moved = store.delete_cells_locally(&slots)?;
		println!(
			"level {} -> {}: {} children, {} relocated, {:.2?}",
			level,
			level + 1,
			children.len(),
			moved.len(),
			level_started.elapsed()
		);
	}

	println!("Refined to level {} in {:.2?}", depth, started.elapsed());
	let metrics = store.metrics();
	for op in [StoreOp::Init, StoreOp::Subdivide] {
		println!(
			"  {:<10} avg {:>10.1}us  last {:>8}us",
			op.name(),
			metrics.avg_timing_us(op),
			metrics.last_timing_us(op)
		);
	}
	println!(
		"  added {}  removed {}  relocated {}",
		metrics.cells_added, metrics.cells_removed, metrics.slots_relocated
	);
	Ok(())
}
