mod fixture;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use stepchain_core::{
    check_scenario, is_static_scenario, resolve_scenario, resolve_static, ChosenSteps,
    FlattenedPlan, Registry, StepKind, StoreSet,
};
use stepchain_engine::{Clock, ManualClock, RunStatus, ScenarioRunner};

use fixture::Fixture;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Behavior-driven scenario toolchain.
#[derive(Parser)]
#[command(name = "stepchain", version, about = "Behavior-driven scenario toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configuration check on a scenario fixture
    Validate {
        /// Path to the scenario fixture JSON file
        fixture: PathBuf,
    },

    /// Resolve a fixture into its flattened execution plan
    Plan {
        /// Path to the scenario fixture JSON file
        fixture: PathBuf,
    },

    /// Validate, resolve and execute a scenario fixture
    Run {
        /// Path to the scenario fixture JSON file
        fixture: PathBuf,
        /// Simulated milliseconds between ticks
        #[arg(long, default_value = "16")]
        tick_ms: u64,
        /// Abort the run after this many ticks
        #[arg(long, default_value = "100000")]
        max_ticks: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { fixture } => cmd_validate(&fixture, cli.output, cli.quiet),
        Commands::Plan { fixture } => cmd_plan(&fixture, cli.output, cli.quiet),
        Commands::Run {
            fixture,
            tick_ms,
            max_ticks,
        } => cmd_run(&fixture, tick_ms, max_ticks, cli.output, cli.quiet),
    }
}

fn report_error(message: &str, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Json => {
            let json = serde_json::json!({ "error": message });
            eprintln!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
        OutputFormat::Text => {
            if !quiet {
                eprintln!("{}", message);
            }
        }
    }
}

/// Load a fixture and build its registry; exits with code 2 on any load
/// problem, since nothing was validated or executed yet.
fn load_or_exit(path: &Path, output: OutputFormat, quiet: bool) -> (Fixture, Registry) {
    let fixture = match fixture::load(path) {
        Ok(fixture) => fixture,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(2);
        }
    };
    let registry = match fixture::build_registry(&fixture) {
        Ok(registry) => registry,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(2);
        }
    };
    (fixture, registry)
}

fn cmd_validate(path: &Path, output: OutputFormat, quiet: bool) {
    let (fixture, registry) = load_or_exit(path, output, quiet);
    let chosen = fixture::chosen_steps(&fixture);
    let errors = check_scenario(&registry, &chosen, &StoreSet::new());

    if errors.is_empty() {
        if !quiet {
            match output {
                OutputFormat::Text => println!("valid"),
                OutputFormat::Json => println!("{{\"valid\": true}}"),
            }
        }
        return;
    }

    match output {
        OutputFormat::Text => {
            if !quiet {
                eprintln!("Errors detected in configuration. Please, fix them before running the scenario.");
                for error in &errors {
                    eprintln!("  - {}", error);
                }
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({ "valid": false, "errors": errors });
            eprintln!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
    }
    process::exit(1);
}

/// Resolve the fixture's plan with values bound, or exit.
fn resolve_or_exit(
    fixture: &Fixture,
    registry: &Registry,
    output: OutputFormat,
    quiet: bool,
) -> FlattenedPlan {
    let result = if is_static_scenario(registry) {
        resolve_static(registry)
    } else {
        let chosen: ChosenSteps = fixture::chosen_steps(fixture);
        resolve_scenario(registry, &chosen, &StoreSet::new())
    };
    let mut plan = match result {
        Ok(plan) => plan,
        Err(errors) => {
            match output {
                OutputFormat::Text => {
                    if !quiet {
                        for error in &errors {
                            eprintln!("{}", error);
                        }
                    }
                }
                OutputFormat::Json => {
                    let json = serde_json::json!({ "errors": errors });
                    eprintln!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
                }
            }
            process::exit(1);
        }
    };

    let mut stores = StoreSet::new();
    if let Err(e) = fixture::bind_values(&mut plan, &mut stores, fixture) {
        report_error(&e.to_string(), output, quiet);
        process::exit(2);
    }
    plan
}

fn kind_bracket(kind: StepKind) -> &'static str {
    match kind {
        StepKind::Given => "[Given]",
        StepKind::When => "[ When]",
        StepKind::Then => "[ Then]",
    }
}

fn cmd_plan(path: &Path, output: OutputFormat, quiet: bool) {
    let (fixture, registry) = load_or_exit(path, output, quiet);
    let plan = resolve_or_exit(&fixture, &registry, output, quiet);

    match output {
        OutputFormat::Json => {
            let pretty = serde_json::to_string_pretty(&plan)
                .unwrap_or_else(|e| format!("serialization error: {}", e));
            println!("{}", pretty);
        }
        OutputFormat::Text => {
            if quiet {
                return;
            }
            for (index, node) in plan.nodes.iter().enumerate() {
                let indent = "   ".repeat(plan.depth(index));
                println!(
                    "{:>3} {} {}{} [Delay= {} Timeout= {}]  {}",
                    index,
                    kind_bracket(node.step.kind),
                    indent,
                    node.step.full_name(),
                    node.delay_ms,
                    node.timeout_ms,
                    node.sentence_with_values()
                );
            }
        }
    }
}

fn cmd_run(path: &Path, tick_ms: u64, max_ticks: u64, output: OutputFormat, quiet: bool) {
    let (fixture, mut registry) = load_or_exit(path, output, quiet);

    let chosen = fixture::chosen_steps(&fixture);
    let errors = check_scenario(&registry, &chosen, &StoreSet::new());
    if !errors.is_empty() {
        match output {
            OutputFormat::Text => {
                if !quiet {
                    eprintln!("Errors detected in configuration. Please, fix them before running the scenario.");
                    for error in &errors {
                        eprintln!("  - {}", error);
                    }
                }
            }
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": "invalid", "errors": errors });
                eprintln!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
            }
        }
        process::exit(1);
    }

    let plan = resolve_or_exit(&fixture, &registry, output, quiet);
    let nodes = plan.len();
    let clock = ManualClock::new();
    let mut runner = ScenarioRunner::new(plan);

    let mut ticks = 0u64;
    let status = loop {
        let status = runner.tick(&mut registry, clock.now_ms());
        ticks += 1;
        if status.is_terminal() {
            break status;
        }
        if ticks >= max_ticks {
            report_error(
                &format!("scenario still running after {} ticks", max_ticks),
                output,
                quiet,
            );
            process::exit(1);
        }
        clock.advance(tick_ms);
    };

    match status {
        RunStatus::Succeeded => {
            if !quiet {
                match output {
                    OutputFormat::Text => {
                        println!("scenario succeeded: {} nodes in {} ticks", nodes, ticks);
                    }
                    OutputFormat::Json => {
                        let json = serde_json::json!({
                            "status": "succeeded",
                            "nodes": nodes,
                            "ticks": ticks,
                        });
                        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
                    }
                }
            }
        }
        RunStatus::Failed(report) => {
            match output {
                OutputFormat::Text => {
                    if !quiet {
                        eprintln!("scenario failed: {}", report.message);
                        eprintln!("{}", report.scenario_trace);
                        eprintln!("{}", report.location_trace);
                    }
                }
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&RunStatus::Failed(report))
                        .unwrap_or_default();
                    eprintln!("{}", json);
                }
            }
            process::exit(1);
        }
        RunStatus::Running => unreachable!("loop exits only on terminal status"),
    }
}
