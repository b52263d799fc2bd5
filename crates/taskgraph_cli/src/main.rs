//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `taskgraph_core` linkage and the configured database.
//! - Keep output deterministic for quick local sanity checks.

use log::info;
use std::process::ExitCode;
use taskgraph_core::db::migrations::{latest_version, schema_version};
use taskgraph_core::CoreConfig;

fn main() -> ExitCode {
    println!("taskgraph_core ping={}", taskgraph_core::ping());
    println!("taskgraph_core version={}", taskgraph_core::core_version());

    match check_database() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("taskgraph smoke check failed: {message}");
            ExitCode::FAILURE
        }
    }
}

fn check_database() -> Result<(), String> {
    let config = CoreConfig::from_env().map_err(|err| err.to_string())?;
    if taskgraph_core::init_from_config(&config)? {
        info!("event=cli_smoke_check module=cli status=start");
    }

    let conn = taskgraph_core::open_db_with(&config.database_path, &config.db_options())
        .map_err(|err| err.to_string())?;
    let version = schema_version(&conn).map_err(|err| err.to_string())?;

    println!("database path={}", config.database_path.display());
    println!(
        "database schema_version={} latest_supported={}",
        version,
        latest_version()
    );
    Ok(())
}
