use clap::Parser;
use mapf_rust::config::{Cli, Config};
use mapf_rust::deadline::Deadline;
use mapf_rust::instance::Instance;
use mapf_rust::lacam::{self, SolveReport};
use mapf_rust::report::{is_feasible_solution, Report};
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .try_init();
}

fn write_plan(
    instance: &Instance,
    report: &SolveReport,
    metrics: &Report,
    path: &str,
) -> anyhow::Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "agents={}", instance.n)?;
    writeln!(file, "solver=lacam_star")?;
    writeln!(file, "solved={}", metrics.solved)?;
    writeln!(file, "loop_cnt={}", report.loop_cnt)?;
    if let Some(g) = report.g_star {
        writeln!(file, "g_star={g}")?;
    }
    writeln!(file, "soc={}", metrics.sum_of_costs)?;
    writeln!(file, "soc_lb={}", metrics.sum_of_costs_lb)?;
    writeln!(file, "makespan={}", metrics.makespan)?;
    writeln!(file, "makespan_lb={}", metrics.makespan_lb)?;
    writeln!(file, "sum_of_loss={}", metrics.sum_of_loss)?;
    writeln!(file, "comp_time={}", metrics.comp_time_ms)?;
    writeln!(file, "seed={}", metrics.seed)?;
    write!(file, "starts=")?;
    for &s in &instance.starts {
        let v = &instance.graph.vertices[s];
        write!(file, "({},{}),", v.x, v.y)?;
    }
    writeln!(file)?;
    write!(file, "goals=")?;
    for &g in &instance.goals {
        let v = &instance.graph.vertices[g];
        write!(file, "({},{}),", v.x, v.y)?;
    }
    writeln!(file)?;
    writeln!(file, "solution=")?;
    for (t, config) in report.solution.iter().enumerate() {
        write!(file, "{t}:")?;
        for &v in config {
            let vx = &instance.graph.vertices[v];
            write!(file, "({},{}),", vx.x, vx.y)?;
        }
        writeln!(file)?;
    }
    Ok(())
}

fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();
    let config = Config::new(&cli);
    init_tracing(config.verbose);
    config.validate()?;

    let Some(scen_path) = config.scen_path.as_deref() else {
        anyhow::bail!("a scenario file (-i) is required on the command line");
    };
    let instance = Instance::from_files(&config.map_path, scen_path, config.num_agents)?;

    let deadline = Deadline::new(config.time_limit_secs * 1000.0);
    let report = lacam::solve(&instance, &deadline, config.seed, &config.solver_options);

    if !is_feasible_solution(&instance, &report.solution) {
        error!("produced plan failed the feasibility check -- this is a solver bug");
        return Ok(false);
    }

    if report.solution.is_empty() {
        info!("unsolvable within the time limit, or infeasible instance geometry");
    } else if deadline.is_expired() {
        info!("reach time limit");
    }

    let mut dist_for_metrics =
        mapf_rust::dist_table::DistTable::new(&instance.graph, &instance.goals, true);
    let metrics = Report::new(
        &instance,
        &report.solution,
        &mut dist_for_metrics,
        deadline.elapsed_ms(),
        report.loop_cnt,
        config.seed,
    );
    metrics.log();
    let _ = metrics.append_csv(
        Path::new("experimental_results.csv"),
        &config.map_path,
        scen_path,
        instance.n,
    );

    let output_path = config
        .output_path
        .clone()
        .unwrap_or_else(|| "plan.log".to_string());
    write_plan(&instance, &report, &metrics, &output_path)?;

    Ok(true)
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::from(0),
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
