// src/main.rs

use planrunner::errors::PlanRunnerError;
use planrunner::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("planrunner error: {err}");
            std::process::exit(exit_code_for_error(&err));
        }
    }
}

async fn run_main() -> planrunner::errors::Result<i32> {
    let args = cli::parse();
    logging::init_logging(args.log_level).map_err(PlanRunnerError::Other)?;
    run(args).await
}

fn exit_code_for_error(err: &PlanRunnerError) -> i32 {
    match err {
        PlanRunnerError::Plan(_) => 2,
        _ => 1,
    }
}
