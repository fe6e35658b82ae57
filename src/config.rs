use anyhow::anyhow;
use clap::Parser;

use crate::map::HeuristicMode;

#[derive(Parser, Debug)]
#[command(
    name = "Rust MAPFM",
    about = "A*+OD+ID solver for multi-agent path finding with matching.",
    version = "1.0"
)]
pub struct Cli {
    #[arg(long, help = "Path to the map file", default_value = "map_file/test/test.map")]
    pub map_path: String,

    #[arg(long, help = "Path to the YAML scenario with colored starts and goals")]
    pub scen_path: Option<String>,

    #[arg(long, help = "Write the solved paths to this file as JSON")]
    pub solution_path: Option<String>,

    #[arg(long, help = "Append a CSV stats line to this file")]
    pub output_path: Option<String>,

    #[arg(
        long,
        help = "Matching policy: color (implicit) or exhaustive (enumerated)",
        default_value = "exhaustive"
    )]
    pub heuristic_mode: String,

    #[arg(long, help = "Seed outer groups by color class", default_value_t = false)]
    pub enable_matching_id: bool,

    #[arg(
        long,
        help = "Priority-ordered matching enumeration",
        default_value_t = false
    )]
    pub enable_sorting: bool,

    #[arg(long, help = "Disable the CAT tie-breaker", default_value_t = false)]
    pub disable_cat: bool,

    #[arg(
        long,
        help = "Min-cost colored-assignment heuristic (color mode)",
        default_value_t = false
    )]
    pub assignment_heuristic: bool,

    #[arg(long, help = "Upper bound on the total solution cost")]
    pub max_cost: Option<usize>,

    #[arg(long, help = "Timeout seconds", default_value = "60")]
    pub timeout_secs: u64,

    #[arg(
        long,
        help = "Number of agents for a random scenario (no --scen-path)",
        default_value_t = 10
    )]
    pub num_agents: usize,

    #[arg(
        long,
        help = "Number of teams for a random scenario",
        default_value_t = 2
    )]
    pub num_teams: usize,

    #[arg(
        long,
        help = "Seed for the random number generator",
        default_value_t = 0
    )]
    pub seed: u64,

    #[arg(long, help = "Dump a generated scenario to this YAML file")]
    pub scen_dump_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub map_path: String,
    pub scen_path: Option<String>,
    pub solution_path: Option<String>,
    pub output_path: Option<String>,
    pub heuristic_mode: HeuristicMode,
    pub enable_matching_id: bool,
    pub enable_sorting: bool,
    pub enable_cat: bool,
    pub assignment_heuristic: bool,
    pub max_cost: Option<usize>,
    pub timeout_secs: u64,
    pub num_agents: usize,
    pub num_teams: usize,
    pub seed: u64,
    pub scen_dump_path: Option<String>,
}

impl Config {
    pub fn new(cli: &Cli) -> anyhow::Result<Self> {
        let heuristic_mode = match cli.heuristic_mode.as_str() {
            "color" => HeuristicMode::Color,
            "exhaustive" => HeuristicMode::Exhaustive,
            other => {
                return Err(anyhow!(
                    "unknown heuristic mode '{other}', expected 'color' or 'exhaustive'"
                ))
            }
        };
        Ok(Self {
            map_path: cli.map_path.clone(),
            scen_path: cli.scen_path.clone(),
            solution_path: cli.solution_path.clone(),
            output_path: cli.output_path.clone(),
            heuristic_mode,
            enable_matching_id: cli.enable_matching_id,
            enable_sorting: cli.enable_sorting,
            enable_cat: !cli.disable_cat,
            assignment_heuristic: cli.assignment_heuristic,
            max_cost: cli.max_cost,
            timeout_secs: cli.timeout_secs,
            num_agents: cli.num_agents,
            num_teams: cli.num_teams,
            seed: cli.seed,
            scen_dump_path: cli.scen_dump_path.clone(),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.enable_sorting && self.heuristic_mode != HeuristicMode::Exhaustive {
            return Err(anyhow!(
                "--enable-sorting orders matching enumeration and needs exhaustive mode"
            ));
        }
        if self.assignment_heuristic && self.heuristic_mode != HeuristicMode::Color {
            return Err(anyhow!(
                "--assignment-heuristic replaces the nearest-goal sum and needs color mode"
            ));
        }
        if self.scen_path.is_none() && self.num_agents == 0 {
            return Err(anyhow!("random scenarios need at least one agent"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout must be positive"));
        }
        Ok(())
    }
}
