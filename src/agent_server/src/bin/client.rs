use agent_server::grpc::{
    agent_router_client::AgentRouterClient, Code, ParseRequest, StatusRequest, TrainRequest,
};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use lz4_flex::compress_prepend_size;
use serde_json::{json, Map, Value};
use std::{error::Error, fs};
use tonic::{metadata::MetadataValue, Request};

fn request<T>(message: T, token: Option<&str>) -> Result<Request<T>, Box<dyn Error>> {
    let mut request = Request::new(message);
    if let Some(token) = token {
        request
            .metadata_mut()
            .insert("token", MetadataValue::from_str(token)?);
    }
    Ok(request)
}

fn code_name(code: i32) -> String {
    match Code::from_i32(code) {
        Some(code) => format!("{:?}", code),
        None => format!("unknown code {}", code),
    }
}

fn train_config(matches: &ArgMatches) -> Result<String, Box<dyn Error>> {
    let mut overrides = match matches.value_of("config") {
        Some(file) => serde_json::from_slice::<Map<String, Value>>(&fs::read(file)?)?,
        None => Map::new(),
    };
    if let Some(name) = matches.value_of("name") {
        overrides.insert("name".to_string(), json!(name));
    }
    Ok(Value::Object(overrides).to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let matches = App::new("Agent Router Client")
        .about("Sends parse, train and status requests to an agent router server")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("address")
                .short("a")
                .long("address")
                .default_value("127.0.0.1:5000")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("token")
                .short("t")
                .long("token")
                .takes_value(true),
        )
        .subcommand(
            SubCommand::with_name("parse")
                .about("Interpret a text")
                .arg(Arg::with_name("text").required(true))
                .arg(Arg::with_name("agent").short("n").long("agent").takes_value(true))
                .arg(Arg::with_name("model").short("m").long("model").takes_value(true)),
        )
        .subcommand(
            SubCommand::with_name("train")
                .about("Start training an agent")
                .arg(
                    Arg::with_name("data")
                        .help("Training data file")
                        .required(true),
                )
                .arg(Arg::with_name("name").short("n").long("name").takes_value(true))
                .arg(
                    Arg::with_name("config")
                        .short("c")
                        .long("config")
                        .help("JSON file with configuration overrides")
                        .takes_value(true),
                ),
        )
        .subcommand(SubCommand::with_name("status").about("Show agents and running jobs"))
        .get_matches();

    let address = format!("http://{}", matches.value_of("address").unwrap_or_default());
    let token = matches.value_of("token");
    let mut client = AgentRouterClient::connect(address).await?;

    match matches.subcommand() {
        ("parse", Some(args)) => {
            let body = json!({
                "text": args.value_of("text").unwrap_or_default(),
                "agent": args.value_of("agent"),
                "model": args.value_of("model"),
            });
            let response = client
                .parse(request(ParseRequest { body: body.to_string() }, token)?)
                .await?
                .into_inner();
            if response.code == Code::Ok as i32 {
                let body: Value = serde_json::from_str(&response.body)?;
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("{}: {}", code_name(response.code), response.message);
            }
        }
        ("train", Some(args)) => {
            let data = fs::read(args.value_of("data").unwrap_or_default())?;
            let message = TrainRequest {
                compressed_data: compress_prepend_size(&data),
                config: train_config(args)?,
            };
            let response = client.train(request(message, token)?).await?.into_inner();
            if response.code == Code::Ok as i32 {
                println!(
                    "training '{}' in process {}",
                    response.name, response.job_id
                );
            } else {
                println!("{}: {}", code_name(response.code), response.message);
            }
        }
        ("status", Some(_)) => {
            let status = client
                .status(request(StatusRequest {}, token)?)
                .await?
                .into_inner();
            let mut names: Vec<_> = status.available_agents.keys().cloned().collect();
            names.sort();
            for name in names {
                let agent = &status.available_agents[&name];
                println!(
                    "{}\t{}\tmodels: {:?}\tlast training: {}",
                    name, agent.status, agent.models, agent.last_training
                );
            }
            println!(
                "{} training(s) under this process {:?}",
                status.trainings_under_this_process, status.training_process_ids
            );
        }
        _ => {}
    }
    Ok(())
}
