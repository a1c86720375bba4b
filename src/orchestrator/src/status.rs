//! Aggregate service status.

use crate::{
    registry::{AgentSnapshot, TrainingStatus},
    supervisor::{JobHandle, JobOutcome},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Status of one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStatus {
    /// Training flag.
    pub status: TrainingStatus,
    /// Start of the running job.
    pub training_since: Option<DateTime<Utc>>,
    /// Last artifact installation.
    pub loaded_at: Option<DateTime<Utc>>,
    /// Model versions that can be queried.
    pub available_models: Vec<String>,
    /// Outcome of the last training job.
    pub last_training: Option<JobOutcome>,
}

/// What the status endpoint answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    /// Agents by name.
    pub available_agents: BTreeMap<String, AgentStatus>,
    /// Number of jobs alive.
    pub trainings_under_this_process: usize,
    /// Identities of the jobs alive.
    pub training_process_ids: Vec<u32>,
}

/// Combine a registry snapshot with the jobs still running.
pub fn report(snapshot: Vec<AgentSnapshot>, active: &[JobHandle]) -> Status {
    let available_agents = snapshot
        .into_iter()
        .map(|agent| {
            (
                agent.name,
                AgentStatus {
                    status: agent.status,
                    training_since: agent.training_since,
                    loaded_at: agent.loaded_at,
                    available_models: agent.models,
                    last_training: agent.last_outcome,
                },
            )
        })
        .collect();
    Status {
        available_agents,
        trainings_under_this_process: active.len(),
        training_process_ids: active.iter().map(|job| job.id).collect(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_serializes() {
        let snapshot = vec![AgentSnapshot {
            name: "greeter".to_string(),
            status: TrainingStatus::Training,
            training_since: None,
            loaded_at: None,
            models: vec!["model_1".to_string()],
            last_outcome: Some(JobOutcome::Failed("boom".to_string())),
        }];
        let active = vec![JobHandle {
            id: 42,
            name: "greeter".to_string(),
            started_at: Utc::now(),
        }];
        let status = report(snapshot, &active);
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({
                "available_agents": {
                    "greeter": {
                        "status": "training",
                        "training_since": null,
                        "loaded_at": null,
                        "available_models": ["model_1"],
                        "last_training": {"result": "failed", "reason": "boom"},
                    }
                },
                "trainings_under_this_process": 1,
                "training_process_ids": [42],
            })
        );
    }
}
