//! The registry owns every loaded agent. Callers only ever hold entries; the
//! artifact behind an entry is swapped whole, never mutated in place.

use crate::{
    agent::{list_agents, valid_agent_name, Agent, ModelLoader, DEFAULT_AGENT_NAME},
    error::{Error, Result},
    supervisor::JobOutcome,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Training flag of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    /// No job running.
    Idle,
    /// A job was accepted and has not been reaped yet.
    Training,
}

struct EntryState {
    artifact: Option<Arc<Agent>>,
    status: TrainingStatus,
    training_since: Option<DateTime<Utc>>,
    loaded_at: Option<DateTime<Utc>>,
    last_outcome: Option<JobOutcome>,
    // the job the flag belongs to, once launched
    job: Option<u32>,
    // created by mark_training, only lives as long as that job
    provisional: bool,
}

impl EntryState {
    fn idle() -> Self {
        EntryState {
            artifact: None,
            status: TrainingStatus::Idle,
            training_since: None,
            loaded_at: None,
            last_outcome: None,
            job: None,
            provisional: false,
        }
    }

    fn install(&mut self, agent: Agent) {
        self.artifact = Some(Arc::new(agent));
        self.loaded_at = Some(Utc::now());
    }
}

/// One registry entry.
pub struct AgentHandle {
    name: String,
    state: Mutex<EntryState>,
    load_lock: Mutex<()>,
}

impl AgentHandle {
    fn new(name: &str, state: EntryState) -> Arc<Self> {
        Arc::new(AgentHandle {
            name: name.to_string(),
            state: Mutex::new(state),
            load_lock: Mutex::new(()),
        })
    }

    /// Agent name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current training flag.
    pub fn status(&self) -> TrainingStatus {
        self.state.lock().status
    }

    fn is_loaded(&self) -> bool {
        self.state.lock().artifact.is_some()
    }

    /// The artifact as of now. Readers keep it alive across a replacement.
    pub fn artifact(&self) -> Option<Arc<Agent>> {
        self.state.lock().artifact.clone()
    }

    /// Run inference on the current artifact; the entry is not locked while
    /// the model works.
    pub fn parse(&self, text: &str, time: Option<&str>, model: Option<&str>) -> Result<Value> {
        let artifact = self
            .artifact()
            .ok_or_else(|| Error::NotFound(self.name.clone()))?;
        artifact.parse(text, time, model)
    }
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSnapshot {
    /// Agent name.
    pub name: String,
    /// Training flag.
    pub status: TrainingStatus,
    /// Start of the running job.
    pub training_since: Option<DateTime<Utc>>,
    /// Last time an artifact was installed.
    pub loaded_at: Option<DateTime<Utc>>,
    /// Model versions of the loaded artifact.
    pub models: Vec<String>,
    /// How the last reaped job ended.
    pub last_outcome: Option<JobOutcome>,
}

/// Agents known to the service, keyed by name, lazily loaded from `root`.
pub struct ModelRegistry {
    root: PathBuf,
    loader: Arc<dyn ModelLoader>,
    entries: Mutex<HashMap<String, Arc<AgentHandle>>>,
}

impl ModelRegistry {
    /// Empty registry over the durable storage at `root`.
    pub fn new(root: impl AsRef<Path>, loader: Arc<dyn ModelLoader>) -> Self {
        ModelRegistry {
            root: root.as_ref().to_path_buf(),
            loader,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Durable storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the registry holds no entry.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether an entry exists for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    /// The entry for `name`, loading it from durable storage on first use.
    /// Concurrent callers for the same name share a single load.
    pub fn resolve(&self, name: &str) -> Result<Arc<AgentHandle>> {
        let handle = {
            let mut entries = self.entries.lock();
            match entries.get(name) {
                Some(handle) => handle.clone(),
                None => {
                    if !valid_agent_name(name) || !self.root.join(name).is_dir() {
                        return Err(Error::NotFound(name.to_string()));
                    }
                    let handle = AgentHandle::new(name, EntryState::idle());
                    entries.insert(name.to_string(), handle.clone());
                    handle
                }
            }
        };
        if handle.is_loaded() {
            return Ok(handle);
        }

        {
            let _loading = handle.load_lock.lock();
            if !handle.is_loaded() {
                match self.load_agent(name) {
                    Ok(agent) => {
                        handle.state.lock().install(agent);
                        log::info!("Agent '{}' loaded", name);
                    }
                    Err(err) => {
                        self.discard(&handle);
                        return Err(err);
                    }
                }
            }
        }
        Ok(handle)
    }

    // Drop an entry that never got an artifact, unless a job owns it.
    fn discard(&self, handle: &Arc<AgentHandle>) {
        let mut entries = self.entries.lock();
        let owned = match entries.get(&handle.name) {
            Some(current) => Arc::ptr_eq(current, handle),
            None => false,
        };
        if !owned {
            return;
        }
        let state = handle.state.lock();
        if state.artifact.is_none() && state.status == TrainingStatus::Idle {
            drop(state);
            entries.remove(&handle.name);
        }
    }

    /// Read the current artifact of `name` from durable storage, without
    /// touching the registry.
    pub fn load_agent(&self, name: &str) -> Result<Agent> {
        Agent::load(&self.root, name, &*self.loader).map_err(|err| match err {
            Error::Io(ref e) if e.kind() == io::ErrorKind::NotFound => {
                Error::NotFound(name.to_string())
            }
            err => err,
        })
    }

    /// Load what durable storage holds; a registry still empty afterwards gets
    /// the placeholder default agent.
    pub fn ensure_default(&self) {
        match list_agents(&self.root) {
            Ok(names) => {
                for name in names {
                    if let Err(err) = self.resolve(&name) {
                        log::warn!("Skipping agent '{}': {}", name, err);
                    }
                }
            }
            Err(err) => log::warn!("Cannot read model directory {:?}: {}", self.root, err),
        }

        let mut entries = self.entries.lock();
        if entries.is_empty() {
            let mut state = EntryState::idle();
            state.install(Agent::empty());
            entries.insert(
                DEFAULT_AGENT_NAME.to_string(),
                AgentHandle::new(DEFAULT_AGENT_NAME, state),
            );
            log::info!("No agents found, created placeholder '{}'", DEFAULT_AGENT_NAME);
        }
    }

    /// Flip the flag of `name` to training, creating the entry when the agent
    /// is new. Fails when a job for `name` is already running.
    pub fn mark_training(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        if let Some(handle) = entries.get(name) {
            let mut state = handle.state.lock();
            if state.status == TrainingStatus::Training {
                return Err(Error::AlreadyTraining(name.to_string()));
            }
            state.status = TrainingStatus::Training;
            state.training_since = Some(Utc::now());
            state.job = None;
            return Ok(());
        }

        if !valid_agent_name(name) {
            return Err(Error::invalid_model(format!(
                "No agent found with name '{}'",
                name
            )));
        }
        let mut state = EntryState::idle();
        // an agent on disk is loaded on demand, a new one answers "not trained"
        if !self.root.join(name).is_dir() {
            state.install(Agent::empty());
        }
        state.status = TrainingStatus::Training;
        state.training_since = Some(Utc::now());
        state.provisional = true;
        entries.insert(name.to_string(), AgentHandle::new(name, state));
        Ok(())
    }

    /// Undo [`mark_training`](Self::mark_training) for a job that never started.
    pub fn abort_training(&self, name: &str) {
        let mut entries = self.entries.lock();
        let provisional = match entries.get(name) {
            Some(handle) => {
                let mut state = handle.state.lock();
                state.status = TrainingStatus::Idle;
                state.training_since = None;
                state.job = None;
                state.provisional
            }
            None => return,
        };
        if provisional {
            entries.remove(name);
        }
    }

    /// Bind the job launched for the current training of `name` to its entry.
    pub fn attach_job(&self, name: &str, job: u32) {
        if let Some(handle) = self.entries.lock().get(name) {
            let mut state = handle.state.lock();
            if state.status == TrainingStatus::Training {
                state.job = Some(job);
            }
        }
    }

    /// Apply the outcome of the reaped job `job` in one step: install the
    /// artifact it published, record the outcome and clear the flag. Only the
    /// job the entry is training for clears the flag; returns whether it did.
    pub fn complete_training(
        &self,
        name: &str,
        job: u32,
        artifact: Option<Agent>,
        outcome: JobOutcome,
    ) -> bool {
        let entries = self.entries.lock();
        let handle = match entries.get(name) {
            Some(handle) => handle,
            None => return false,
        };
        let mut state = handle.state.lock();
        if let Some(agent) = artifact {
            state.install(agent);
        }
        if state.status != TrainingStatus::Training || state.job != Some(job) {
            return false;
        }
        state.status = TrainingStatus::Idle;
        state.training_since = None;
        state.job = None;
        state.provisional = false;
        state.last_outcome = Some(outcome);
        true
    }

    /// Swap the artifact of `name` and clear its flag. Readers holding the
    /// previous artifact finish on it.
    pub fn replace_artifact(&self, name: &str, agent: Agent) {
        let mut entries = self.entries.lock();
        let handle = entries
            .entry(name.to_string())
            .or_insert_with(|| AgentHandle::new(name, EntryState::idle()));
        let mut state = handle.state.lock();
        state.install(agent);
        state.status = TrainingStatus::Idle;
        state.training_since = None;
        state.job = None;
        state.provisional = false;
    }

    /// Consistent view of all entries, sorted by name.
    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        let entries = self.entries.lock();
        let mut snapshot: Vec<AgentSnapshot> = entries
            .values()
            .filter_map(|handle| {
                let state = handle.state.lock();
                // entry of a lazy load in flight
                if state.artifact.is_none()
                    && state.status == TrainingStatus::Idle
                    && state.last_outcome.is_none()
                {
                    return None;
                }
                Some(AgentSnapshot {
                    name: handle.name.clone(),
                    status: state.status,
                    training_since: state.training_since,
                    loaded_at: state.loaded_at,
                    models: state
                        .artifact
                        .as_ref()
                        .map(|agent| agent.models())
                        .unwrap_or_default(),
                    last_outcome: state.last_outcome.clone(),
                })
            })
            .collect();
        snapshot.sort_by(|a, b| a.name.cmp(&b.name));
        snapshot
    }
}
