//! Process-level registry of jobs

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tracing::debug;
use uuid::Uuid;

use super::job::Job;
use super::types::{JobId, JobState};
use crate::errors::{JobError, JobResult};

/// Collaborator that learns about every job when it is built
pub trait JobRegistry: Send + Sync {
    fn register(&self, job: Arc<Job>);
}

/// Registry keyed by instance id
///
/// Name and command lookups are case-insensitive. Results are ordered by
/// session id so listings are stable.
#[derive(Debug, Default)]
pub struct InMemoryJobRegistry {
    jobs: RwLock<HashMap<Uuid, Arc<Job>>>,
}

impl InMemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Arc<Job>>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn matching(&self, predicate: impl Fn(&Job) -> bool) -> Vec<Arc<Job>> {
        let mut jobs: Vec<Arc<Job>> = self
            .read()
            .values()
            .filter(|job| predicate(job))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.id());
        jobs
    }

    pub fn jobs(&self) -> Vec<Arc<Job>> {
        self.matching(|_| true)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn by_name(&self, name: &str) -> Vec<Arc<Job>> {
        self.matching(|job| job.name().eq_ignore_ascii_case(name))
    }

    pub fn by_command(&self, command: &str) -> Vec<Arc<Job>> {
        self.matching(|job| job.command().eq_ignore_ascii_case(command))
    }

    pub fn by_state(&self, state: JobState) -> Vec<Arc<Job>> {
        self.matching(|job| job.state() == state)
    }

    pub fn by_instance_id(&self, instance_id: Uuid) -> Option<Arc<Job>> {
        self.read().get(&instance_id).cloned()
    }

    pub fn by_session_id(&self, id: JobId) -> Option<Arc<Job>> {
        self.read().values().find(|job| job.id() == id).cloned()
    }

    /// Arbitrary property filters are not supported
    pub fn by_filter(&self, _filter: &HashMap<String, Value>) -> JobResult<Vec<Arc<Job>>> {
        Err(JobError::NotSupported {
            operation: "filter lookup",
        })
    }

    /// Stop the job and forget it; false if it was not registered
    pub fn remove(&self, job: &Job) -> bool {
        let Some(registered) = self.by_instance_id(job.instance_id()) else {
            return false;
        };
        registered.stop();

        let removed = self
            .jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job.instance_id())
            .is_some();
        if removed {
            debug!(job_id = %job.id(), job_name = %job.name(), "Removed job from registry");
        }
        removed
    }
}

impl JobRegistry for InMemoryJobRegistry {
    fn register(&self, job: Arc<Job>) {
        debug!(job_id = %job.id(), job_name = %job.name(), "Registered job");
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job.instance_id())
            .or_insert(job);
    }
}
