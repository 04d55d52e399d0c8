//! Test doubles for the command handlers

use async_trait::async_trait;
use jobctl_core::domain::job::{JobDetails, JobHandle, JobState};
use jobctl_core::{Error, Result};
use jobctl_scheduler::{JobQuery, Scheduler, Submission, Tool};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::prompt::Prompter;

/// One recorded scheduler request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Submit(PathBuf),
    ListJobs(JobQuery),
    JobDetails(String),
    Cancel(String),
    CancelUserJobs(String),
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    jobs: Vec<JobHandle>,
    details: Vec<JobDetails>,
    missing: Vec<Tool>,
    failing_cancels: Vec<String>,
}

/// In-memory scheduler that records every call
///
/// Clones share state, so a test keeps one clone to inspect calls made
/// through another.
#[derive(Debug, Clone, Default)]
pub struct FakeScheduler {
    state: Arc<Mutex<State>>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(self, jobs: Vec<JobHandle>) -> Self {
        self.state.lock().unwrap().jobs = jobs;
        self
    }

    pub fn with_details(self, details: JobDetails) -> Self {
        self.state.lock().unwrap().details.push(details);
        self
    }

    pub fn without_tool(self, tool: Tool) -> Self {
        self.state.lock().unwrap().missing.push(tool);
        self
    }

    pub fn failing_cancel(self, job_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_cancels
            .push(job_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn submit_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Submit(_)))
            .count()
    }

    /// Ids passed to single-job cancel, in call order
    pub fn cancelled(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Cancel(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn bulk_cancels(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::CancelUserJobs(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl Scheduler for FakeScheduler {
    fn ensure_available(&self, tool: Tool) -> Result<()> {
        if self.state.lock().unwrap().missing.contains(&tool) {
            return Err(Error::Environment(format!("{:?} client not found", tool)));
        }
        Ok(())
    }

    async fn submit(&self, descriptor: &Path) -> Result<Submission> {
        self.record(Call::Submit(descriptor.to_path_buf()));
        Ok(Submission {
            job_id: Some("4242".to_string()),
            message: "Submitted batch job 4242".to_string(),
        })
    }

    async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<JobHandle>> {
        self.record(Call::ListJobs(query.clone()));
        let state = self.state.lock().unwrap();
        Ok(state
            .jobs
            .iter()
            .filter(|j| query.user.as_ref().is_none_or(|u| &j.user == u))
            .filter(|j| query.name.as_ref().is_none_or(|n| &j.name == n))
            .filter(|j| {
                query
                    .states
                    .as_ref()
                    .is_none_or(|states| states.contains(&j.state))
            })
            .cloned()
            .collect())
    }

    async fn job_details(&self, job_id: &str) -> Result<Option<JobDetails>> {
        self.record(Call::JobDetails(job_id.to_string()));
        let state = self.state.lock().unwrap();
        Ok(state.details.iter().find(|d| d.id == job_id).cloned())
    }

    async fn cancel(&self, job_id: &str) -> Result<()> {
        self.record(Call::Cancel(job_id.to_string()));
        if self
            .state
            .lock()
            .unwrap()
            .failing_cancels
            .iter()
            .any(|id| id == job_id)
        {
            return Err(Error::external(
                format!("scancel {}", job_id),
                1,
                "Invalid job id specified",
            ));
        }
        Ok(())
    }

    async fn cancel_user_jobs(&self, user: &str) -> Result<()> {
        self.record(Call::CancelUserJobs(user.to_string()));
        Ok(())
    }
}

/// Job handle with the fields the handlers look at
pub fn job(id: &str, name: &str, user: &str, state: JobState, node: &str) -> JobHandle {
    JobHandle {
        id: id.to_string(),
        name: name.to_string(),
        state,
        node: node.to_string(),
        partition: "gpu".to_string(),
        user: user.to_string(),
        elapsed: "1:02".to_string(),
        time_limit: "4:00:00".to_string(),
        node_count: "1".to_string(),
        reason: if node.is_empty() {
            "(Priority)".to_string()
        } else {
            node.to_string()
        },
    }
}

/// Scheduler record with the given fields
pub fn details(id: &str, fields: &[(&str, &str)]) -> JobDetails {
    let mut all = vec![("JobId".to_string(), id.to_string())];
    all.extend(fields.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    JobDetails {
        id: id.to_string(),
        fields: all,
    }
}

/// Prompter with a fixed answer that records each question
#[derive(Debug, Clone)]
pub struct ScriptedPrompter {
    answer: bool,
    questions: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            questions: Arc::default(),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, question: &str) -> bool {
        self.questions.lock().unwrap().push(question.to_string());
        self.answer
    }
}
