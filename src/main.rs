#[cfg(feature = "mimalloc-global")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

use rand::RngCore;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use torus_stencil::reference::SequentialRing;
use torus_stencil::rules::ElementaryRule;
use torus_stencil::{RunConfig, ToroidalField};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_SIZE: usize = 1 << 20;
const DEFAULT_RULE: u8 = 110;
const LIVE_DENSITY: f64 = 0.5;
const TOTAL_GENERATIONS: u64 = 2000;
const CHECK_INTERVAL: u64 = 500;

struct MainArgs {
    config: RunConfig,
    size: usize,
    rule: u8,
    generations: u64,
    unchecked: bool,
}

fn parse_args() -> MainArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = MainArgs {
        config: RunConfig::default(),
        size: DEFAULT_SIZE,
        rule: DEFAULT_RULE,
        generations: TOTAL_GENERATIONS,
        unchecked: false,
    };
    let next_arg = |i: usize, flag: &str| -> &str {
        args.get(i)
            .map(String::as_str)
            .unwrap_or_else(|| panic!("{flag} requires a value"))
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--threads" => {
                i += 1;
                let n: usize = next_arg(i, "--threads")
                    .parse()
                    .expect("--threads requires a positive integer");
                parsed.config = parsed.config.thread_count(n);
            }
            "--ghost" => {
                i += 1;
                let g: usize = next_arg(i, "--ghost")
                    .parse()
                    .expect("--ghost requires a positive integer");
                parsed.config = parsed.config.ghost_width(g);
            }
            "--strict-ghost" => {
                parsed.config = parsed.config.strict_ghost_width(true);
            }
            "--size" => {
                i += 1;
                parsed.size = next_arg(i, "--size")
                    .parse()
                    .expect("--size requires a positive integer");
            }
            "--rule" => {
                i += 1;
                parsed.rule = next_arg(i, "--rule")
                    .parse()
                    .expect("--rule requires an integer in 0..=255");
            }
            "--generations" => {
                i += 1;
                parsed.generations = next_arg(i, "--generations")
                    .parse()
                    .expect("--generations requires a non-negative integer");
            }
            "--unchecked" => {
                parsed.unchecked = true;
            }
            other => panic!(
                "unknown argument: {other}\nusage: torus-stencil [--threads N] [--ghost G] [--strict-ghost] [--size N] [--rule R] [--generations G] [--unchecked]"
            ),
        }
        i += 1;
    }
    parsed
}

fn seed_random_cells(size: usize) -> Vec<bool> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED_1234_ABCD_EF01);
    let threshold = (u64::MAX as f64 * LIVE_DENSITY) as u64;
    (0..size).map(|_| rng.next_u64() <= threshold).collect()
}

fn population(cells: &[bool]) -> usize {
    cells.iter().filter(|&&alive| alive).count()
}

fn run_checked(args: &MainArgs) -> torus_stencil::Result<()> {
    let rule = ElementaryRule::new(args.rule);
    let transition = |l, c, r| rule.apply(l, c, r);
    let cells = seed_random_cells(args.size);
    let mut oracle = SequentialRing::new(cells.clone());
    let mut field = ToroidalField::from_cells(cells)?;

    let plan = field.plan(&args.config)?;
    info!(
        size = args.size,
        rule = args.rule,
        workers = plan.worker_count(),
        ghost_width = plan.ghost_width,
        "checked run"
    );

    let mut oracle_total = Duration::ZERO;
    let mut field_total = Duration::ZERO;
    let mut done = 0u64;
    while done < args.generations {
        let chunk = CHECK_INTERVAL.min(args.generations - done);
        done += chunk;

        let start = Instant::now();
        oracle.step_n(&transition, chunk);
        let oracle_phase = start.elapsed();
        oracle_total += oracle_phase;

        let start = Instant::now();
        field.run_with(transition, chunk, &args.config)?;
        let field_phase = start.elapsed();
        field_total += field_phase;

        let oracle_pop = population(oracle.cells());
        let field_pop = population(field.as_slice());
        let match_status = if oracle.cells() == field.as_slice() {
            "MATCH"
        } else {
            "MISMATCH"
        };
        println!(
            "Generation {done}: sequential pop = {oracle_pop}, parallel pop = {field_pop} [{match_status}]"
        );
        println!(
            "  Sequential: {:.3} ms | Parallel: {:.3} ms",
            oracle_phase.as_secs_f64() * 1000.0,
            field_phase.as_secs_f64() * 1000.0
        );
    }

    let oracle_ms = oracle_total.as_secs_f64() * 1000.0;
    let field_ms = field_total.as_secs_f64() * 1000.0;
    let generations = args.generations.max(1) as f64;
    println!("\n--- Summary ({} generations) ---", args.generations);
    println!(
        "Sequential: {oracle_ms:.3} ms total, {:.6} ms/gen",
        oracle_ms / generations
    );
    println!(
        "Parallel:   {field_ms:.3} ms total, {:.6} ms/gen",
        field_ms / generations
    );
    if field_ms > 0.0 {
        println!("Speedup (sequential / parallel): {:.2}x", oracle_ms / field_ms);
    }
    Ok(())
}

fn run_unchecked(args: &MainArgs) -> torus_stencil::Result<()> {
    let rule = ElementaryRule::new(args.rule);
    let mut field = ToroidalField::from_cells(seed_random_cells(args.size))?;
    let start = Instant::now();
    field.run_with(|l, c, r| rule.apply(l, c, r), args.generations, &args.config)?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    println!(
        "{} generations in {elapsed_ms:.3} ms, population {}",
        args.generations,
        population(field.as_slice())
    );
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = parse_args();
    let outcome = if args.unchecked {
        run_unchecked(&args)
    } else {
        run_checked(&args)
    };
    if let Err(err) = outcome {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
