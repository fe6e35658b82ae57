mod algorithm;
mod common;
mod config;
mod map;
mod scenario;
mod solver;
mod stat;

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::Deadline;
use config::{Cli, Config};
use scenario::Problem;
use solver::{MatchingSolver, UNBOUNDED};
use stat::Stats;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::new(&cli)?;
    config.validate()?;

    let problem = match &config.scen_path {
        Some(scen_path) => Problem::from_files(&config.map_path, scen_path)?,
        None => {
            let mut rng = StdRng::seed_from_u64(config.seed);
            let problem = Problem::generate_random(
                &config.map_path,
                config.num_agents,
                config.num_teams,
                &mut rng,
            )?;
            if let Some(dump_path) = &config.scen_dump_path {
                problem
                    .write_scenario_yaml(dump_path)
                    .with_context(|| format!("failed to dump scenario to '{dump_path}'"))?;
            }
            problem
        }
    };
    info!(
        "solving {} agents on a {}x{} map in {:?} mode",
        problem.starts.len(),
        problem.width,
        problem.height,
        config.heuristic_mode
    );

    let deadline = Deadline::new();
    let watchdog = deadline.clone();
    let timeout = Duration::from_secs(config.timeout_secs);
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        watchdog.cancel();
    });

    let solve_config = config.clone();
    let solve_start_time = Instant::now();
    let (solution, mut stats) = tokio::task::spawn_blocking(move || {
        let mut stats = Stats::default();
        let solver = MatchingSolver::new(
            &problem,
            solve_config.heuristic_mode,
            solve_config.enable_sorting,
            solve_config.enable_matching_id,
            solve_config.assignment_heuristic,
        );
        let solution = solver.solve(
            solve_config.enable_cat,
            solve_config.max_cost.unwrap_or(UNBOUNDED),
            &deadline,
            &mut stats,
        );
        (solution, stats)
    })
    .await?;

    stats.time_ms = solve_start_time.elapsed().as_millis() as usize;

    match solution {
        Some(solution) => {
            stats.costs = solution.total_cost();
            info!(
                "solved with total cost {} in {} ms ({} nodes popped)",
                stats.costs, stats.time_ms, stats.od_popped_nodes
            );
            if let Some(solution_path) = &config.solution_path {
                solution
                    .write_json(solution_path)
                    .with_context(|| format!("failed to write solution to '{solution_path}'"))?;
            }
        }
        None => {
            warn!("no solution found in {} ms", stats.time_ms);
        }
    }
    stats.print(&config);
    Ok(())
}
