//! Config validation CLI tool
//!
//! Validates a playtimed configuration file and reports any errors.

use playtime_api::Tier;
use playtime_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a playtimed configuration file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match playtime_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", playtime_config::CURRENT_CONFIG_VERSION);
            for tier in Tier::PRIORITY {
                let secs = policy.max_budget_seconds(tier);
                println!(
                    "  {} budget: {}",
                    tier.as_str(),
                    format_duration(Duration::from_secs(secs))
                );
            }
            println!(
                "  Cadence: budget every {}s, feedback every {}s / {}s",
                policy.cadence.budget_check.as_secs(),
                policy.cadence.short_feedback.as_secs(),
                policy.cadence.persistent_feedback.as_secs()
            );
            match &policy.live_gate.check_url {
                Some(url) => println!("  Live gate: {}", url),
                None => println!("  Live gate: not configured (privileged users will be denied)"),
            }
            println!("  Grants: {}", policy.grant_count());

            if !policy.warnings.is_empty() {
                println!();
                println!("Warnings ({}):", policy.warnings.len());
                for warning in &policy.warnings {
                    println!("  - {}", warning);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                playtime_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                playtime_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                playtime_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                playtime_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        playtime_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
