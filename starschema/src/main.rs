use anyhow::Context;
use clap::{Arg, Command};
use common::config::Settings;
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn transform(config_path: &str) -> anyhow::Result<bool> {
    let settings = Settings::new(config_path)
        .with_context(|| format!("failed to load settings from {}", config_path))?;
    info!(
        input = %settings.transform.input_root,
        output = %settings.transform.output_root,
        "Loaded settings"
    );

    let result = starschema::run_transform(&settings).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.is_success())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let matches = Command::new("starschema-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Builds song-play star-schema tables from raw catalog and event logs")
        .subcommand_required(true)
        .subcommand(
            Command::new("transform")
                .about("Run one transform from the configured input to the output root")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .default_value("config/starschema.toml")
                        .help("Sets the settings file"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("transform", transform_matches)) => {
            let config_path = transform_matches
                .get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/starschema.toml");

            match transform(config_path).await {
                Ok(true) => {}
                Ok(false) => process::exit(1),
                Err(e) => {
                    eprintln!("Transform error: {:#}", e);
                    process::exit(2);
                }
            }
        }
        _ => {
            eprintln!("No subcommand specified. Use --help for usage information.");
            process::exit(1);
        }
    }
}
