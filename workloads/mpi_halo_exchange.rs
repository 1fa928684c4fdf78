//! Halo Exchange Example for MPI Communication Profiling
//!
//! This example runs a toy time-stepping solver over a 1-D domain split across
//! MPI ranks and traces every message it sends with `commprof`. Each time step
//! has two phases:
//!
//! - **haloExchange**: non-blocking sends of the boundary cells to both ring
//!   neighbours
//! - **pressureSolve**: an iterative smoother whose sweeps exchange residuals
//!   with scheduled sends and reduce them with an all-reduce
//!
//! Only the first sweep of every solve is traced; later sweeps are assumed to
//! communicate the same way.
//!
//! ## Usage
//!
//! ```bash
//! # Run 4 ranks for 5 time steps
//! mpirun -n 4 cargo run --example mpi_halo_exchange -- --steps 5
//!
//! # Summarize the per-rank reports
//! commprof summarize CommProfiling/processor*.comm
//! commprof stats CommProfiling/processor0.stats.json
//! ```

use commprof::{BoundaryAddressing, CommProfiler, ReportSink, SendKind, SinkConfig, TransportMode};
use mpi::collective::SystemOperation;
use mpi::traits::*;
use std::env;
use std::time::Instant;

/// Cells owned by each rank
const LOCAL_CELLS: usize = 4096;

/// Cells sent to each neighbour per halo exchange
const HALO_WIDTH: usize = 64;

/// Smoother sweeps per pressure solve
const SWEEPS: usize = 5;

const DEFAULT_STEPS: usize = 3;
const DELTA_T: f64 = 1.0e-3;

/// Ring neighbours of this rank
#[derive(Debug)]
struct Neighbours {
    rank: i32,
    prev: i32,
    next: i32,
}

impl Neighbours {
    fn new(rank: i32, world_size: i32) -> Self {
        Self {
            rank,
            prev: (rank + world_size - 1) % world_size,
            next: (rank + 1) % world_size,
        }
    }

    /// Face cells on the two processor boundaries
    fn boundary_addressing(&self) -> BoundaryAddressing {
        let last = LOCAL_CELLS as i64 - 1;
        BoundaryAddressing((0..HALO_WIDTH as i64).chain(last - HALO_WIDTH as i64 + 1..=last).collect())
    }
}

/// Record a send, run it, and stamp its duration
fn profiled_send(
    profiler: &mut CommProfiler,
    src: i32,
    dst: i32,
    bytes: usize,
    mode: TransportMode,
    send: impl FnOnce(),
) {
    let handle = profiler.comm_record(src as i64, dst as i64, bytes as i64, mode);
    let started = Instant::now();
    send();
    profiler.send_record(mode.into(), started.elapsed().as_secs_f64());
    if let Some(handle) = handle {
        profiler.complete_record(&handle);
    }
}

fn halo_exchange<C: Communicator>(
    world: &C,
    ring: &Neighbours,
    field: &mut [f64],
    profiler: &mut CommProfiler,
) {
    profiler.enter_sec("haloExchange");

    let left: Vec<f64> = field[..HALO_WIDTH].to_vec();
    let right: Vec<f64> = field[field.len() - HALO_WIDTH..].to_vec();
    let bytes = HALO_WIDTH * std::mem::size_of::<f64>();

    mpi::request::scope(|scope| {
        let mut requests = Vec::with_capacity(2);
        profiled_send(profiler, ring.rank, ring.prev, bytes, TransportMode::NonBlocking, || {
            requests.push(world.process_at_rank(ring.prev).immediate_send(scope, &left[..]));
        });
        profiled_send(profiler, ring.rank, ring.next, bytes, TransportMode::NonBlocking, || {
            requests.push(world.process_at_rank(ring.next).immediate_send(scope, &right[..]));
        });

        let (from_next, _) = world.process_at_rank(ring.next).receive_vec::<f64>();
        let (from_prev, _) = world.process_at_rank(ring.prev).receive_vec::<f64>();

        for request in requests {
            request.wait();
        }

        let n = field.len();
        for i in 0..HALO_WIDTH {
            field[i] = 0.5 * (field[i] + from_prev[i]);
            field[n - HALO_WIDTH + i] = 0.5 * (field[n - HALO_WIDTH + i] + from_next[i]);
        }
    });

    profiler.leave_sec("haloExchange");
}

fn pressure_solve<C: Communicator>(
    world: &C,
    ring: &Neighbours,
    field: &mut [f64],
    profiler: &mut CommProfiler,
) -> f64 {
    profiler.enter_sec("pressureSolve");
    let ticket = profiler.enter_iter_sec();
    let mut global_residual = 0.0;

    for _ in 0..SWEEPS {
        for i in 1..field.len() - 1 {
            field[i] = (field[i - 1] + field[i] + field[i + 1]) / 3.0;
        }
        let local_residual: f64 = field.iter().map(|v| v.abs()).sum::<f64>() / field.len() as f64;

        // Even ranks send first so blocking sends around the ring cannot deadlock
        let payload = [local_residual];
        let bytes = std::mem::size_of::<f64>();
        let send_residual = |profiler: &mut CommProfiler| {
            profiled_send(profiler, ring.rank, ring.next, bytes, TransportMode::Scheduled, || {
                world.process_at_rank(ring.next).send(&payload[..]);
            });
        };
        if ring.rank % 2 == 0 {
            send_residual(profiler);
            let _ = world.process_at_rank(ring.prev).receive_vec::<f64>();
        } else {
            let _ = world.process_at_rank(ring.prev).receive_vec::<f64>();
            send_residual(profiler);
        }

        let started = Instant::now();
        world.all_reduce_into(&local_residual, &mut global_residual, SystemOperation::sum());
        profiler.send_record(SendKind::Allreduce, started.elapsed().as_secs_f64());

        profiler.end_single_iter();
    }

    profiler.leave_iter_sec(ticket);
    profiler.leave_sec("pressureSolve");
    global_residual
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // Initialize MPI
    let universe = mpi::initialize().ok_or_else(|| anyhow::anyhow!("Failed to initialize MPI"))?;
    let world = universe.world();
    let rank = world.rank();
    let world_size = world.size();

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let steps = if args.len() > 2 && args[1] == "--steps" {
        args[2].parse().unwrap_or(DEFAULT_STEPS)
    } else {
        DEFAULT_STEPS
    };

    if world_size < 2 {
        anyhow::bail!("Run with at least 2 ranks, e.g. mpirun -n 4");
    }

    let ring = Neighbours::new(rank, world_size);
    let mut field: Vec<f64> = (0..LOCAL_CELLS)
        .map(|i| ((i as f64) + rank as f64 * LOCAL_CELLS as f64).sin())
        .collect();

    let mut profiler = CommProfiler::new();
    let mut sink = ReportSink::create(SinkConfig::new(env::current_dir()?, rank))?;

    if rank == 0 {
        println!("=== MPI Halo Exchange Example ===");
        println!("World size: {} processes, {} time steps", world_size, steps);
        println!();
    }

    for step in 1..=steps {
        let time = step as f64 * DELTA_T;
        profiler.enter_time_step(&format!("{}", time));
        profiler.attach_boundary_addressing(ring.boundary_addressing());

        halo_exchange(&world, &ring, &mut field, &mut profiler);
        let residual = pressure_solve(&world, &ring, &mut field, &mut profiler);

        if rank == 0 {
            println!("[Rank 0] t = {:.4}  residual = {:.6e}", time, residual);
        }

        sink.flush_finished(&mut profiler)?;
    }

    world.barrier();
    let report = sink.finish(&mut profiler)?;
    println!("[Rank {}] Communication report written to {}", rank, report.display());

    Ok(())
}
