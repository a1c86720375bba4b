//! gRPC front API of the agent router.

tonic::include_proto!("api");

use orchestrator::{status, Error, ErrorKind, RequestRouter};
use serde_json::{Map, Value};
use tonic::{Request, Response};

/// Wire code of an error kind.
pub fn code_of(kind: ErrorKind) -> Code {
    match kind {
        ErrorKind::NotFound => Code::NotFound,
        ErrorKind::InvalidModel => Code::InvalidModel,
        ErrorKind::AlreadyTraining => Code::AlreadyTraining,
        ErrorKind::BadRequest => Code::BadRequest,
        ErrorKind::Internal => Code::Internal,
    }
}

/// Rejects requests that do not carry `token` in their `token` metadata.
pub fn token_interceptor(
    token: String,
) -> impl Fn(Request<()>) -> Result<Request<()>, tonic::Status> + Send + Sync + 'static {
    move |request: Request<()>| {
        let presented = request
            .metadata()
            .get("token")
            .and_then(|value| value.to_str().ok());
        if presented == Some(token.as_str()) {
            Ok(request)
        } else {
            Err(tonic::Status::unauthenticated("invalid token"))
        }
    }
}

/// Training overrides sent along the training data, an empty string is none.
pub fn parse_overrides(config: &str) -> Result<Map<String, Value>, Error> {
    if config.trim().is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_str(config)
        .map_err(|e| Error::BadRequest(format!("training config is not a JSON object: {}", e)))
}

fn agent_info(agent: status::AgentStatus) -> AgentInfo {
    let timestamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339()).unwrap_or_default()
    };
    AgentInfo {
        status: match agent.status {
            orchestrator::registry::TrainingStatus::Idle => "idle".to_string(),
            orchestrator::registry::TrainingStatus::Training => "training".to_string(),
        },
        loaded_at: timestamp(agent.loaded_at),
        models: agent.available_models,
        last_training: match agent.last_training {
            None => String::new(),
            Some(orchestrator::JobOutcome::Succeeded) => "succeeded".to_string(),
            Some(orchestrator::JobOutcome::Failed(reason)) => format!("failed: {}", reason),
        },
        training_since: timestamp(agent.training_since),
    }
}

/// The agent router's gRPC service
pub struct Service {
    router: RequestRouter,
}

impl Service {
    /// Create a Service
    pub fn new(router: RequestRouter) -> Self {
        Service { router }
    }
}

// Router calls may load models from disk, keep them off the async workers.
async fn blocking<F, T>(f: F) -> Result<T, tonic::Status>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| tonic::Status::internal(e.to_string()))
}

#[tonic::async_trait]
impl agent_router_server::AgentRouter for Service {
    async fn parse(
        &self,
        request: Request<ParseRequest>,
    ) -> Result<Response<ParseResponse>, tonic::Status> {
        let body = request.into_inner().body;
        let router = self.router.clone();
        let result = blocking(move || {
            let data: Value = serde_json::from_str(&body)
                .map_err(|e| Error::BadRequest(format!("body is not JSON: {}", e)))?;
            router.route_request(&data)
        })
        .await?;
        let response = match result {
            Ok(value) => ParseResponse {
                code: Code::Ok as i32,
                message: String::new(),
                body: value.to_string(),
            },
            Err(err) => {
                log::debug!("Parse request failed: {}", err);
                ParseResponse {
                    code: code_of(err.kind()) as i32,
                    message: err.to_string(),
                    body: String::new(),
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn train(
        &self,
        request: Request<TrainRequest>,
    ) -> Result<Response<TrainResponse>, tonic::Status> {
        let TrainRequest {
            compressed_data,
            config,
        } = request.into_inner();
        let router = self.router.clone();
        let result = blocking(move || {
            let payload = lz4_flex::decompress_size_prepended(&compressed_data).map_err(|e| {
                Error::BadRequest(format!("training data is not lz4 compressed: {:?}", e))
            })?;
            let overrides = parse_overrides(&config)?;
            router.route_train(&payload, &overrides)
        })
        .await?;
        let response = match result {
            Ok(job) => TrainResponse {
                code: Code::Ok as i32,
                message: format!("Training of agent '{}' started", job.name),
                job_id: job.id,
                name: job.name,
            },
            Err(err) => {
                log::info!("Training request rejected: {}", err);
                TrainResponse {
                    code: code_of(err.kind()) as i32,
                    message: err.to_string(),
                    job_id: 0,
                    name: String::new(),
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn status(
        &self,
        _request: Request<StatusRequest>,
    ) -> Result<Response<StatusResponse>, tonic::Status> {
        let router = self.router.clone();
        let status = blocking(move || router.route_status()).await?;
        Ok(Response::new(StatusResponse {
            available_agents: status
                .available_agents
                .into_iter()
                .map(|(name, agent)| (name, agent_info(agent)))
                .collect(),
            trainings_under_this_process: status.trainings_under_this_process as u32,
            training_process_ids: status.training_process_ids,
        }))
    }
}
