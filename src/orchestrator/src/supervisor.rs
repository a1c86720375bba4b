//! Training jobs run as isolated units of execution. The supervisor only ever
//! looks at their liveness and exit status, never at their memory.

use crate::{
    agent::valid_agent_name,
    config::{Config, TrainingConfig},
    error::{Error, Result},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::Arc,
};
use tempfile::TempPath;

/// How a training job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The job published a new artifact.
    Succeeded,
    /// The job crashed, was killed, or exited with an error.
    Failed(String),
}

/// Identity of an accepted training job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobHandle {
    /// Execution identity, the OS process id for process jobs.
    pub id: u32,
    /// Agent being trained.
    pub name: String,
    /// When the job was launched.
    pub started_at: DateTime<Utc>,
}

/// A job observed to have terminated.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedJob {
    /// The job.
    pub job: JobHandle,
    /// How it ended.
    pub outcome: JobOutcome,
}

/// Result of one poll: jobs still alive, and jobs reaped by this very poll.
#[derive(Debug, Default)]
pub struct Poll {
    /// Jobs still running, oldest first.
    pub active: Vec<JobHandle>,
    /// Jobs that terminated since the previous poll. Each is reported once.
    pub finished: Vec<FinishedJob>,
}

/// A running unit of execution.
pub trait Execution: Send {
    /// Opaque identity.
    fn id(&self) -> u32;
    /// Non-blocking liveness check, `Some` once the unit terminated.
    fn try_wait(&mut self) -> io::Result<Option<JobOutcome>>;
    /// Terminate the unit.
    fn kill(&mut self) -> io::Result<()>;
}

/// Starts units of execution for training jobs.
pub trait Launcher: Send + Sync {
    /// Start training with the given configuration; returns as soon as the
    /// unit runs.
    fn launch(&self, config: &TrainingConfig) -> io::Result<Box<dyn Execution>>;
}

/// Launches `<program> --config <file>` as a separate OS process.
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    /// Launcher for the given training executable.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessLauncher {
            program: program.as_ref().to_path_buf(),
        }
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, config: &TrainingConfig) -> io::Result<Box<dyn Execution>> {
        let config_file = tempfile::Builder::new()
            .prefix("train-")
            .suffix("_config.json")
            .tempfile()?;
        serde_json::to_writer(config_file.as_file(), config)?;
        let config_path = config_file.into_temp_path();
        let child = Command::new(&self.program)
            .arg("--config")
            .arg(&config_path)
            .stdin(Stdio::null())
            .spawn()?;
        Ok(Box::new(TrainingProcess {
            child,
            _config: config_path,
        }))
    }
}

struct TrainingProcess {
    child: Child,
    _config: TempPath,
}

fn outcome_of(status: ExitStatus) -> JobOutcome {
    if status.success() {
        return JobOutcome::Succeeded;
    }
    match status.code() {
        Some(code) => JobOutcome::Failed(format!("trainer exited with code {}", code)),
        None => JobOutcome::Failed("trainer was terminated by a signal".to_string()),
    }
}

impl Execution for TrainingProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<JobOutcome>> {
        Ok(self.child.try_wait()?.map(outcome_of))
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()?;
        self.child.wait().map(|_| ())
    }
}

struct Job {
    handle: JobHandle,
    execution: Box<dyn Execution>,
    // training data lives until the job is reaped
    _data: TempPath,
}

/// Launches training jobs and reaps the ones that terminated.
pub struct TrainingJobSupervisor {
    base: Config,
    launcher: Arc<dyn Launcher>,
    jobs: Mutex<Vec<Job>>,
}

impl TrainingJobSupervisor {
    /// Supervisor merging job overrides onto `base`.
    pub fn new(base: Config, launcher: Arc<dyn Launcher>) -> Self {
        TrainingJobSupervisor {
            base,
            launcher,
            jobs: Mutex::new(vec![]),
        }
    }

    /// Target agent of a training request, after merging its overrides.
    pub fn target_name(&self, overrides: &Map<String, Value>) -> Option<String> {
        self.base.merge(overrides).name().map(str::to_string)
    }

    /// Persist `payload` to a temporary file and launch a job training `name`
    /// on it. Returns once the job runs, never waits for it.
    pub fn start(
        &self,
        name: &str,
        payload: &[u8],
        overrides: &Map<String, Value>,
    ) -> Result<JobHandle> {
        let mut config = self.base.merge(overrides);
        if !valid_agent_name(name) {
            return Err(Error::invalid_model(format!(
                "No agent found with name '{}'",
                name
            )));
        }
        config.set("name", name);

        let mut data = tempfile::Builder::new()
            .prefix("train-")
            .suffix("_training_data.json")
            .tempfile()?;
        data.as_file_mut().write_all(payload)?;
        let data = data.into_temp_path();
        config.set("data", data.to_string_lossy().into_owned());

        let execution = self.launcher.launch(&config)?;
        let handle = JobHandle {
            id: execution.id(),
            name: name.to_string(),
            started_at: Utc::now(),
        };
        log::info!(
            "Training process {} started for agent '{}'",
            handle.id,
            handle.name
        );
        self.jobs.lock().push(Job {
            handle: handle.clone(),
            execution,
            _data: data,
        });
        Ok(handle)
    }

    /// Reap terminated jobs and list the ones still alive.
    pub fn poll_active(&self) -> Poll {
        let mut jobs = self.jobs.lock();
        let mut poll = Poll::default();
        let mut i = 0;
        while i < jobs.len() {
            let outcome = match jobs[i].execution.try_wait() {
                Ok(None) => {
                    poll.active.push(jobs[i].handle.clone());
                    i += 1;
                    continue;
                }
                Ok(Some(outcome)) => outcome,
                Err(err) => {
                    log::warn!(
                        "Lost track of training process {}: {}",
                        jobs[i].handle.id,
                        err
                    );
                    JobOutcome::Failed(format!("lost track of the training process: {}", err))
                }
            };
            let job = jobs.remove(i);
            log::info!(
                "Training process {} for agent '{}' finished: {:?}",
                job.handle.id,
                job.handle.name,
                outcome
            );
            poll.finished.push(FinishedJob {
                job: job.handle,
                outcome,
            });
        }
        poll
    }

    /// Kill every job still running.
    pub fn shutdown(&self) {
        let mut jobs = self.jobs.lock();
        for job in jobs.iter_mut() {
            if let Err(err) = job.execution.kill() {
                log::warn!("Failed to kill training process {}: {}", job.handle.id, err);
            }
        }
        jobs.clear();
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crossbeam::channel;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicBool, AtomicU32, Ordering},
    };

    /// Jobs run until the test decides how they end.
    #[derive(Default)]
    pub(crate) struct FakeLauncher {
        next_id: AtomicU32,
        fail_launch: AtomicBool,
        running: parking_lot::Mutex<HashMap<String, channel::Sender<JobOutcome>>>,
        configs: parking_lot::Mutex<Vec<TrainingConfig>>,
    }

    impl FakeLauncher {
        pub(crate) fn finish(&self, name: &str, outcome: JobOutcome) {
            let tx = self.running.lock().remove(name).expect("no running job");
            tx.send(outcome).unwrap();
        }

        /// Dropping the sender looks like the unit vanished.
        pub(crate) fn crash(&self, name: &str) {
            self.running.lock().remove(name).expect("no running job");
        }

        pub(crate) fn fail_next_launch(&self) {
            self.fail_launch.store(true, Ordering::SeqCst);
        }

        pub(crate) fn configs(&self) -> Vec<TrainingConfig> {
            self.configs.lock().clone()
        }
    }

    impl Launcher for FakeLauncher {
        fn launch(&self, config: &TrainingConfig) -> io::Result<Box<dyn Execution>> {
            if self.fail_launch.swap(false, Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no trainer"));
            }
            let (tx, rx) = channel::bounded(1);
            let name = config.name().unwrap_or_default().to_string();
            self.running.lock().insert(name, tx);
            self.configs.lock().push(config.clone());
            Ok(Box::new(FakeExecution {
                id: 1000 + self.next_id.fetch_add(1, Ordering::SeqCst),
                rx,
            }))
        }
    }

    struct FakeExecution {
        id: u32,
        rx: channel::Receiver<JobOutcome>,
    }

    impl Execution for FakeExecution {
        fn id(&self) -> u32 {
            self.id
        }

        fn try_wait(&mut self) -> io::Result<Option<JobOutcome>> {
            match self.rx.try_recv() {
                Ok(outcome) => Ok(Some(outcome)),
                Err(channel::TryRecvError::Empty) => Ok(None),
                Err(channel::TryRecvError::Disconnected) => {
                    Ok(Some(JobOutcome::Failed("killed".to_string())))
                }
            }
        }

        fn kill(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
