use agent_server::train_and_persist;
use clap::{App, Arg};
use orchestrator::TrainingConfig;
use std::{path::Path, process};

fn main() {
    let matches = App::new("Agent Trainer")
        .about("Trains one agent, started by the server for every training request")
        .arg(
            Arg::with_name("config")
                .long("config")
                .help("Training configuration written by the server")
                .required(true)
                .takes_value(true),
        )
        .get_matches();

    let mut builder = env_logger::Builder::from_default_env();
    builder.format_timestamp_micros().init();

    let file = matches.value_of("config").unwrap_or_default();
    let config = match TrainingConfig::from_file(Path::new(file)) {
        Ok(config) => config,
        Err(err) => {
            log::error!("Cannot read training configuration {}: {}", file, err);
            process::exit(1);
        }
    };
    if let Err(err) = train_and_persist(&config) {
        log::error!("Training failed: {}", err);
        process::exit(1);
    }
}
