use crate::lacam::SolverOptions;
use anyhow::{anyhow, Result};
use clap::Parser;

/// Command-line surface, exactly the flags the driver exposes. Grounded in
/// the teacher's `Cli`/`clap::Parser` idiom; flag names follow the
/// single-letter convention the reference `main.cpp` uses rather than the
/// teacher's own long-only flag set.
#[derive(Parser, Debug)]
#[command(
    name = "mapf_rust",
    about = "LaCAM*/PIBT multi-agent pathfinding solver",
    version
)]
pub struct Cli {
    #[arg(short = 'm', long = "map", help = "Path to the map file")]
    pub map_path: String,

    #[arg(short = 'i', long = "scen", help = "Path to the scenario file")]
    pub scen_path: Option<String>,

    #[arg(short = 'N', long = "agents", help = "Number of agents")]
    pub num_agents: usize,

    #[arg(short = 's', long = "seed", default_value_t = 0, help = "Random seed")]
    pub seed: u64,

    #[arg(
        short = 't',
        long = "time-limit",
        default_value_t = 3.0,
        help = "Time limit in seconds"
    )]
    pub time_limit_secs: f64,

    #[arg(short = 'v', long = "verbose", default_value_t = 0, help = "Verbosity level")]
    pub verbose: u8,

    #[arg(short = 'o', long = "output", help = "Plan output path")]
    pub output_path: Option<String>,

    #[arg(long = "anytime", default_value_t = false, help = "Enable anytime refinement")]
    pub anytime: bool,

    #[arg(
        long = "no_dist_table_init",
        default_value_t = false,
        help = "Force lazy distance oracle instead of eager parallel init"
    )]
    pub no_dist_table_init: bool,

    #[arg(long = "no_pibt_swap", default_value_t = false, help = "Disable the swap rule")]
    pub no_pibt_swap: bool,

    #[arg(
        long = "no_pibt_hindrance",
        default_value_t = false,
        help = "Disable the hindrance heuristic"
    )]
    pub no_pibt_hindrance: bool,
}

/// Runtime configuration derived from `Cli`, with tuning constants carried
/// as plain fields rather than process-wide statics (the reference keeps
/// them as global constants set once before `solve`; threading them
/// through a constructed value instead lets a process run two solvers with
/// different settings without any shared mutable state).
#[derive(Debug, Clone)]
pub struct Config {
    pub map_path: String,
    pub scen_path: Option<String>,
    pub num_agents: usize,
    pub seed: u64,
    pub time_limit_secs: f64,
    pub verbose: u8,
    pub output_path: Option<String>,
    pub solver_options: SolverOptions,
}

impl Config {
    pub fn new(cli: &Cli) -> Self {
        Config {
            map_path: cli.map_path.clone(),
            scen_path: cli.scen_path.clone(),
            num_agents: cli.num_agents,
            seed: cli.seed,
            time_limit_secs: cli.time_limit_secs,
            verbose: cli.verbose,
            output_path: cli.output_path.clone(),
            solver_options: SolverOptions {
                anytime: cli.anytime,
                random_insert_prob1: 0.001,
                random_insert_prob2: 0.001,
                swap: !cli.no_pibt_swap,
                hindrance: !cli.no_pibt_hindrance,
                multi_thread_dist_init: !cli.no_dist_table_init,
                verbose: cli.verbose,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_agents == 0 {
            return Err(anyhow!("number of agents must be at least 1"));
        }
        if self.time_limit_secs <= 0.0 {
            return Err(anyhow!(
                "time limit must be positive, got {}",
                self.time_limit_secs
            ));
        }
        if self.map_path.trim().is_empty() {
            return Err(anyhow!("map path must not be empty"));
        }
        Ok(())
    }
}
