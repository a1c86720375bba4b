use agent_server::{
    grpc::{self, agent_router_server::AgentRouterServer},
    Loader,
};
use clap::{App, Arg};
use orchestrator::{Builder, Config};
use std::{
    env,
    error::Error,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use tonic::transport::Server;

// the trainer is installed next to the server unless configured otherwise
fn default_trainer() -> Option<PathBuf> {
    let trainer = env::current_exe().ok()?.with_file_name("trainer");
    if trainer.exists() {
        Some(trainer)
    } else {
        None
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let matches = App::new("Agent Router Server")
        .about("Serves intent parsing for trainable agents")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .help("JSON configuration file, command line flags override its values")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("path")
                .short("p")
                .long("path")
                .help("Directory holding one sub-directory per agent")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("emulate")
                .short("e")
                .long("emulate")
                .help("Answer in the convention of another service: watson, wit, luis or api")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("response_log")
                .short("l")
                .long("response_log")
                .help("Directory the query log is written to")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("token")
                .short("t")
                .long("token")
                .help("Shared secret clients must send in their `token` metadata")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("trainer")
                .long("trainer")
                .help("Training executable started for every training request")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("address")
                .short("a")
                .long("address")
                .default_value("127.0.0.1:5000")
                .takes_value(true),
        )
        .get_matches();

    let mut builder = env_logger::Builder::from_default_env();
    builder.format_timestamp_micros().init();

    let mut config = match matches.value_of("config") {
        Some(file) => Config::from_file(Path::new(file))?,
        None => Config::default(),
    };
    if let Some(path) = matches.value_of("path") {
        config.path = PathBuf::from(path);
    }
    if let Some(emulate) = matches.value_of("emulate") {
        config.emulate = Some(emulate.to_string());
    }
    if let Some(dir) = matches.value_of("response_log") {
        config.response_log = Some(PathBuf::from(dir));
    }
    if let Some(token) = matches.value_of("token") {
        config.token = Some(token.to_string());
    }
    match matches.value_of("trainer") {
        Some(trainer) => config.trainer = PathBuf::from(trainer),
        None => {
            if config.trainer == Config::default().trainer {
                if let Some(trainer) = default_trainer() {
                    config.trainer = trainer;
                }
            }
        }
    }
    let address: SocketAddr = matches.value_of("address").unwrap_or_default().parse()?;

    let token = config.token.clone();
    let router = Builder::new()
        .config(config)
        .model_loader(Arc::new(Loader))
        .build()?;
    let service = grpc::Service::new(router.clone());
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("Cannot listen for shutdown signal: {}", err);
        }
        log::info!("Shutting down");
    };
    log::info!("service is ready on {}", address);
    let mut server = Server::builder();
    match token {
        Some(token) => {
            let interceptor = grpc::token_interceptor(token);
            server
                .add_service(AgentRouterServer::with_interceptor(service, interceptor))
                .serve_with_shutdown(address, shutdown)
                .await?
        }
        None => {
            server
                .add_service(AgentRouterServer::new(service))
                .serve_with_shutdown(address, shutdown)
                .await?
        }
    }
    router.shutdown();
    Ok(())
}
