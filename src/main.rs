use std::path::PathBuf;

use clap::Parser;

use cyclepilot_lib::agent_engine::state::Status;
use cyclepilot_lib::{init_tracing, run, RunOptions};

#[derive(Parser, Debug)]
#[command(
    name = "cyclepilot",
    version,
    about = "Perceive, plan, act and evaluate inside a web application until a task is done"
)]
struct Args {
    /// Name of the application, shown to the planner.
    #[arg(long, default_value = "Youtube")]
    app_name: String,

    /// What the agent should accomplish.
    #[arg(
        long,
        default_value = "Youtube app already open, find trending show, and play the first video that pop up"
    )]
    task: String,

    /// Location opened before the first cycle.
    #[arg(long, default_value = "https://www.youtube.com/")]
    url: String,

    /// Path to config.toml (default: next to the executable, then the working directory).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Args::parse();
    let options = RunOptions {
        app_name: args.app_name,
        task: args.task,
        location: args.url,
        config_path: args.config,
    };

    match run(options).await {
        Ok(report) => {
            println!("Final status: {}", report.outcome.status());
            println!("State saved to {}", report.snapshot_path.display());
            println!("Run log: {}", report.log_path.display());
            if report.outcome.status() != Status::Done {
                std::process::exit(2);
            }
        }
        Err(e) => {
            eprintln!("run aborted ({}): {e}", e.kind());
            std::process::exit(1);
        }
    }
}
