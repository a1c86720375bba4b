//! Request routing: inference, training and status on top of the registry and
//! the job supervisor.

use crate::{
    agent::DEFAULT_AGENT_NAME,
    config::Config,
    error::{Error, Result},
    query_log::QueryLogger,
    registry::ModelRegistry,
    status::{self, Status},
    supervisor::{FinishedJob, JobHandle, JobOutcome, TrainingJobSupervisor},
};
use emulators::Emulator;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;

struct Inner {
    config: Config,
    registry: ModelRegistry,
    supervisor: TrainingJobSupervisor,
    emulator: Box<dyn Emulator>,
    query_log: Option<QueryLogger>,
    reap_lock: Mutex<()>,
}

/// Entry point of every request. Cloning is cheap; all clones share state.
#[derive(Clone)]
pub struct RequestRouter {
    inner: Arc<Inner>,
}

impl RequestRouter {
    pub(crate) fn new(
        config: Config,
        registry: ModelRegistry,
        supervisor: TrainingJobSupervisor,
        emulator: Box<dyn Emulator>,
        query_log: Option<QueryLogger>,
    ) -> Self {
        RequestRouter {
            inner: Arc::new(Inner {
                config,
                registry,
                supervisor,
                emulator,
                query_log,
                reap_lock: Mutex::new(()),
            }),
        }
    }

    /// Service configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The agents.
    pub fn registry(&self) -> &ModelRegistry {
        &self.inner.registry
    }

    /// Name of the configured emulator.
    pub fn emulator(&self) -> &'static str {
        self.inner.emulator.name()
    }

    /// Answer a raw parse request in the configured client convention.
    pub fn route_request(&self, data: &Value) -> Result<Value> {
        let query = self.inner.emulator.normalise_request(data)?;
        self.route_infer(
            query.agent.as_deref(),
            &query.text,
            query.time.as_deref(),
            query.model.as_deref(),
        )
    }

    /// Interpret `text` with the agent `agent`, or the default agent.
    pub fn route_infer(
        &self,
        agent: Option<&str>,
        text: &str,
        time: Option<&str>,
        model: Option<&str>,
    ) -> Result<Value> {
        self.reap();
        let name = agent
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_AGENT_NAME);
        let handle = self.inner.registry.resolve(name)?;
        let result = handle.parse(text, time, model)?;
        let response = self.inner.emulator.normalise_response(&result);
        if let Some(query_log) = &self.inner.query_log {
            query_log.log(text, &response, name);
        }
        Ok(response)
    }

    /// Accept a training job for the agent named in `overrides`. Returns as
    /// soon as the job runs.
    pub fn route_train(&self, payload: &[u8], overrides: &Map<String, Value>) -> Result<JobHandle> {
        let name = self
            .inner
            .supervisor
            .target_name(overrides)
            .ok_or_else(|| Error::invalid_model("No agent name given for training."))?;
        // no reap may run between accepting the job and binding it to the entry
        let _reaping = self.inner.reap_lock.lock();
        self.reap_locked();
        self.inner.registry.mark_training(&name)?;
        match self.inner.supervisor.start(&name, payload, overrides) {
            Ok(job) => {
                self.inner.registry.attach_job(&name, job.id);
                Ok(job)
            }
            Err(err) => {
                log::warn!("Failed to start training for agent '{}': {}", name, err);
                self.inner.registry.abort_training(&name);
                Err(err)
            }
        }
    }

    /// Agents and running jobs.
    pub fn route_status(&self) -> Status {
        let active = self.reap();
        status::report(self.inner.registry.snapshot(), &active)
    }

    /// Kill running jobs.
    pub fn shutdown(&self) {
        self.inner.supervisor.shutdown();
    }

    // Reaped outcomes reach the registry before anyone else sees the job gone.
    fn reap(&self) -> Vec<JobHandle> {
        let _reaping = self.inner.reap_lock.lock();
        self.reap_locked()
    }

    fn reap_locked(&self) -> Vec<JobHandle> {
        let poll = self.inner.supervisor.poll_active();
        for finished in poll.finished {
            self.apply(finished);
        }
        poll.active
    }

    fn apply(&self, finished: FinishedJob) {
        let registry = &self.inner.registry;
        let name = finished.job.name.as_str();
        let (artifact, outcome) = match finished.outcome {
            JobOutcome::Succeeded => match registry.load_agent(name) {
                Ok(agent) => {
                    log::info!("Agent '{}' reloaded after training", name);
                    (Some(agent), JobOutcome::Succeeded)
                }
                Err(err) => {
                    log::warn!("Trained agent '{}' cannot be loaded: {}", name, err);
                    let reason = format!("trained model cannot be loaded: {}", err);
                    (None, JobOutcome::Failed(reason))
                }
            },
            outcome => {
                log::warn!("Training of agent '{}' failed: {:?}", name, outcome);
                (None, outcome)
            }
        };
        if !registry.complete_training(name, finished.job.id, artifact, outcome) {
            log::warn!(
                "Training process {} no longer owns agent '{}'",
                finished.job.id,
                name
            );
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        agent::fake::*,
        builder::Builder,
        error::ErrorKind,
        registry::TrainingStatus,
        supervisor::{fake::FakeLauncher, JobOutcome},
        RequestRouter,
    };
    use serde_json::{json, Map, Value};
    use std::{
        path::Path,
        sync::{Arc, Barrier},
        thread,
    };

    fn router(root: &Path, launcher: Arc<FakeLauncher>) -> RequestRouter {
        Builder::new()
            .path(root.to_path_buf())
            .model_loader(Arc::new(FakeLoader::default()))
            .launcher(launcher)
            .build()
            .unwrap()
    }

    fn train(name: &str) -> Map<String, Value> {
        json!({ "name": name }).as_object().unwrap().clone()
    }

    #[test]
    fn test_train_and_parse_scenario() {
        let root = tempfile::tempdir().unwrap();
        let launcher = Arc::new(FakeLauncher::default());
        let router = router(root.path(), launcher.clone());

        let status = router.route_status();
        assert_eq!(status.available_agents.len(), 1);
        assert_eq!(status.available_agents["default"].status, TrainingStatus::Idle);
        assert_eq!(status.trainings_under_this_process, 0);

        let job = router.route_train(b"{}", &train("greeter")).unwrap();
        let status = router.route_status();
        assert_eq!(status.trainings_under_this_process, 1);
        assert_eq!(status.training_process_ids, vec![job.id]);
        assert_eq!(
            status.available_agents["greeter"].status,
            TrainingStatus::Training
        );
        // not trained yet, but known
        let result = router.route_infer(Some("greeter"), "hi", None, None).unwrap();
        assert!(result["intent"].is_null());

        let err = router.route_train(b"{}", &train("greeter")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyTraining);

        publish(root.path(), "greeter", "model_20240101-000000", "greet");
        launcher.finish("greeter", JobOutcome::Succeeded);
        let status = router.route_status();
        assert_eq!(status.trainings_under_this_process, 0);
        let greeter = &status.available_agents["greeter"];
        assert_eq!(greeter.status, TrainingStatus::Idle);
        assert_eq!(greeter.available_models, vec!["model_20240101-000000"]);
        assert_eq!(greeter.last_training, Some(JobOutcome::Succeeded));

        let result = router
            .route_request(&json!({"text": "hi", "agent": "greeter"}))
            .unwrap();
        assert_eq!(result["intent"]["name"], "greet");
    }

    #[test]
    fn test_concurrent_train_accepts_one() {
        let root = tempfile::tempdir().unwrap();
        let router = router(root.path(), Arc::new(FakeLauncher::default()));
        let barrier = Arc::new(Barrier::new(12));
        let threads: Vec<_> = (0..12)
            .map(|_| {
                let router = router.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    router.route_train(b"{}", &train("x"))
                })
            })
            .collect();
        let results: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|err| err.kind() == ErrorKind::AlreadyTraining));
        assert_eq!(router.route_status().trainings_under_this_process, 1);
    }

    #[test]
    fn test_retrain_racing_completion_accepts_one() {
        let root = tempfile::tempdir().unwrap();
        let launcher = Arc::new(FakeLauncher::default());
        let router = router(root.path(), launcher.clone());
        router.route_train(b"{}", &train("x")).unwrap();
        publish(root.path(), "x", "model_1", "first");
        launcher.finish("x", JobOutcome::Succeeded);

        // the finished job is reaped by whichever request comes first
        let barrier = Arc::new(Barrier::new(12));
        let threads: Vec<_> = (0..12)
            .map(|i| {
                let router = router.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    if i % 2 == 0 {
                        router.route_status();
                        None
                    } else {
                        Some(router.route_train(b"{}", &train("x")))
                    }
                })
            })
            .collect();
        let results: Vec<_> = threads
            .into_iter()
            .filter_map(|t| t.join().unwrap())
            .collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

        let status = router.route_status();
        assert_eq!(status.trainings_under_this_process, 1);
        assert_eq!(status.available_agents["x"].status, TrainingStatus::Training);
        assert_eq!(status.available_agents["x"].last_training, Some(JobOutcome::Succeeded));
        let err = router.route_train(b"{}", &train("x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyTraining);
        let result = router.route_infer(Some("x"), "hi", None, None).unwrap();
        assert_eq!(result["intent"]["name"], "first");
    }

    #[test]
    fn test_inference_during_training_uses_old_artifact() {
        let root = tempfile::tempdir().unwrap();
        publish(root.path(), "greeter", "model_1", "old");
        let launcher = Arc::new(FakeLauncher::default());
        let router = router(root.path(), launcher.clone());

        router.route_train(b"{}", &train("greeter")).unwrap();
        publish(root.path(), "greeter", "model_2", "new");
        let result = router.route_infer(Some("greeter"), "hi", None, None).unwrap();
        assert_eq!(result["intent"]["name"], "old");

        launcher.finish("greeter", JobOutcome::Succeeded);
        let result = router.route_infer(Some("greeter"), "hi", None, None).unwrap();
        assert_eq!(result["intent"]["name"], "new");
        let result = router
            .route_infer(Some("greeter"), "hi", None, Some("model_1"))
            .unwrap();
        assert_eq!(result["intent"]["name"], "old");
    }

    #[test]
    fn test_failed_job_keeps_artifact_and_unlocks() {
        let root = tempfile::tempdir().unwrap();
        publish(root.path(), "greeter", "model_1", "old");
        let launcher = Arc::new(FakeLauncher::default());
        let router = router(root.path(), launcher.clone());

        router.route_train(b"{}", &train("greeter")).unwrap();
        launcher.finish("greeter", JobOutcome::Failed("out of memory".to_string()));
        let status = router.route_status();
        let greeter = &status.available_agents["greeter"];
        assert_eq!(greeter.status, TrainingStatus::Idle);
        assert_eq!(
            greeter.last_training,
            Some(JobOutcome::Failed("out of memory".to_string()))
        );
        let result = router.route_infer(Some("greeter"), "hi", None, None).unwrap();
        assert_eq!(result["intent"]["name"], "old");

        // a killed job is reaped the same way
        router.route_train(b"{}", &train("greeter")).unwrap();
        launcher.crash("greeter");
        router.route_train(b"{}", &train("greeter")).unwrap();
    }

    #[test]
    fn test_succeeded_job_without_loadable_model_is_failure() {
        let root = tempfile::tempdir().unwrap();
        let launcher = Arc::new(FakeLauncher::default());
        let router = router(root.path(), launcher.clone());
        router.route_train(b"{}", &train("greeter")).unwrap();
        publish_broken(root.path(), "greeter", "model_1");
        launcher.finish("greeter", JobOutcome::Succeeded);
        let status = router.route_status();
        assert!(matches!(
            status.available_agents["greeter"].last_training,
            Some(JobOutcome::Failed(_))
        ));
        assert_eq!(
            status.available_agents["greeter"].status,
            TrainingStatus::Idle
        );
    }

    #[test]
    fn test_unknown_agent_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let router = router(root.path(), Arc::new(FakeLauncher::default()));
        let before = router.route_status();
        let err = router
            .route_infer(Some("nobody"), "hi", None, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(router.route_status(), before);
    }

    #[test]
    fn test_train_without_name() {
        let root = tempfile::tempdir().unwrap();
        let router = router(root.path(), Arc::new(FakeLauncher::default()));
        let err = router.route_train(b"{}", &Map::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidModel);
        let err = router.route_train(b"{}", &train("../x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidModel);
        assert_eq!(router.route_status().available_agents.len(), 1);
    }

    #[test]
    fn test_launch_failure_rolls_back() {
        let root = tempfile::tempdir().unwrap();
        let launcher = Arc::new(FakeLauncher::default());
        let router = router(root.path(), launcher.clone());
        launcher.fail_next_launch();
        let err = router.route_train(b"{}", &train("greeter")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!router.registry().contains("greeter"));
        router.route_train(b"{}", &train("greeter")).unwrap();
    }

    #[test]
    fn test_emulated_requests_and_query_log() {
        let root = tempfile::tempdir().unwrap();
        let logs = tempfile::tempdir().unwrap();
        publish(root.path(), "default", "model_1", "greet");
        let router = Builder::new()
            .path(root.path().to_path_buf())
            .emulate(Some("watson".to_string()))
            .response_log(Some(logs.path().to_path_buf()))
            .model_loader(Arc::new(FakeLoader::default()))
            .launcher(Arc::new(FakeLauncher::default()))
            .build()
            .unwrap();
        assert_eq!(router.emulator(), "watson");

        let result = router
            .route_request(&json!({"input": {"text": "hi"}}))
            .unwrap();
        assert_eq!(result["intents"][0]["intent"], "greet");
        let err = router.route_request(&json!({"text": "hi"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        drop(router);

        let log_file = std::fs::read_dir(logs.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let content = std::fs::read_to_string(log_file).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("\"model\":\"default\""));
    }
}
