#[cfg(feature = "mimalloc-global")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

use rand::RngCore;
use rand::SeedableRng;
use std::time::Instant;
use torus_stencil::rules::ElementaryRule;
use torus_stencil::{RunConfig, ToroidalField};
use tracing_subscriber::EnvFilter;

fn bench_field(
    size: usize,
    threads: usize,
    generations: u64,
) -> torus_stencil::Result<(f64, usize)> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED_1234_ABCD_EF01);
    let cells: Vec<bool> = (0..size).map(|_| rng.next_u64() & 1 == 1).collect();
    let mut field = ToroidalField::from_cells(cells)?;
    let rule = ElementaryRule::new(30);
    let config = RunConfig::default().thread_count(threads);

    let start = Instant::now();
    field.run_with(|l, c, r| rule.apply(l, c, r), generations, &config)?;
    let duration = start.elapsed();

    let total_ms = duration.as_secs_f64() * 1000.0;
    let pop = field.iter().filter(|&&alive| alive).count();
    Ok((total_ms, pop))
}

fn main() -> torus_stencil::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let scales: &[(usize, u64)] = &[
        (4_096, 2_000),     // barrier-dominated
        (65_536, 1_000),
        (1_048_576, 200),   // ~1M cells
        (16_777_216, 20),   // compute-dominated
    ];
    let max_threads = num_cpus::get().max(1);
    let thread_counts: Vec<usize> = [1usize, 2, 4, 8, 16]
        .into_iter()
        .filter(|&t| t <= max_threads)
        .collect();

    println!(
        "{:<12} {:>8} {:>10} {:>12} {:>12}",
        "Cells", "Threads", "Gens", "Total(ms)", "Avg(us)"
    );
    println!("{}", "-".repeat(58));

    for &(size, generations) in scales {
        for &threads in &thread_counts {
            let (total_ms, _pop) = bench_field(size, threads, generations)?;
            let avg_us = total_ms * 1000.0 / generations as f64;
            println!(
                "{:<12} {:>8} {:>10} {:>12.1} {:>12.3}",
                size, threads, generations, total_ms, avg_us
            );
        }
    }
    Ok(())
}
