//! In-process worker with scripted behaviour.
//!
//! Used by `docket run --simulate` and by tests. Each `start` creates a task
//! that replays a sequence of poll results; the last result repeats once the
//! sequence is exhausted, so a script ending in `running` never terminates.
//! Without a script, a task reports a few running steps and then completes
//! with generated outputs (section drafts for the outline phase).

use async_trait::async_trait;
use docket_common::{PhaseFailure, PhaseWorker, StatusResponse, TaskId};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One scripted answer to a status call.
pub type ScriptedPoll = Result<StatusResponse, PhaseFailure>;

#[derive(Debug)]
struct TaskRun {
    phase_id: String,
    polls: VecDeque<ScriptedPoll>,
    last: Option<ScriptedPoll>,
}

#[derive(Debug, Default)]
struct PhaseScript {
    start_failures: VecDeque<PhaseFailure>,
    runs: VecDeque<Vec<ScriptedPoll>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    scripts: HashMap<String, PhaseScript>,
    tasks: HashMap<TaskId, TaskRun>,
    next_task: u64,
    starts: Vec<(String, String)>,
    status_calls: HashMap<String, usize>,
    cancels: Vec<TaskId>,
}

#[derive(Debug)]
pub struct ScriptedWorker {
    steps: u8,
    state: Mutex<ScriptState>,
}

impl Default for ScriptedWorker {
    fn default() -> Self {
        Self::new(3)
    }
}

fn lock_failed() -> PhaseFailure {
    PhaseFailure::worker("scripted worker state poisoned")
}

impl ScriptedWorker {
    /// A worker whose unscripted tasks report `steps` running polls before completing.
    pub fn new(steps: u8) -> Self {
        Self {
            steps,
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// The next `start` of `phase_id` fails with `failure`.
    pub fn fail_start(&self, phase_id: &str, failure: PhaseFailure) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state
                .scripts
                .entry(phase_id.to_string())
                .or_default()
                .start_failures
                .push_back(failure);
        }
        self
    }

    /// The next task started for `phase_id` replays `polls`.
    pub fn script_run(&self, phase_id: &str, polls: Vec<ScriptedPoll>) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state
                .scripts
                .entry(phase_id.to_string())
                .or_default()
                .runs
                .push_back(polls);
        }
        self
    }

    /// Number of `start` calls made for a phase.
    pub fn start_count(&self, phase_id: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.starts.iter().filter(|(p, _)| p == phase_id).count())
            .unwrap_or(0)
    }

    /// Number of `status` calls made for a phase.
    pub fn status_count(&self, phase_id: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.status_calls.get(phase_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Task ids that received a cancel request.
    pub fn cancelled_tasks(&self) -> Vec<TaskId> {
        self.state.lock().map(|s| s.cancels.clone()).unwrap_or_default()
    }

    fn default_run(&self, phase_id: &str, config: &Value) -> Vec<ScriptedPoll> {
        let steps = self.steps.max(1) as u32;
        let mut polls: Vec<ScriptedPoll> = (1..=steps)
            .map(|i| {
                let progress = (i * 100 / (steps + 1)) as u8;
                Ok(StatusResponse::running(progress).with_message(format!("{} in progress", phase_id)))
            })
            .collect();
        polls.push(Ok(StatusResponse::completed(simulated_outputs(phase_id, config))));
        polls
    }
}

/// Outputs a simulated phase produces: drafts for every planned section, or
/// a summary for phases without a plan.
pub fn simulated_outputs(phase_id: &str, config: &Value) -> Value {
    let Some(sections) = config.get("sections").and_then(Value::as_array) else {
        return json!({ "summary": format!("{} completed", phase_id) });
    };
    let drafts: Vec<Value> = sections
        .iter()
        .filter_map(|section| {
            let section_id = section.get("sectionId")?.as_str()?;
            let title = section.get("title").and_then(Value::as_str).unwrap_or(section_id);
            let target = section.get("wordTarget").and_then(Value::as_u64).unwrap_or(100) as usize;
            let words: Vec<&str> = title.split_whitespace().collect();
            let text = if words.is_empty() {
                vec!["text"; target].join(" ")
            } else {
                words.iter().cycle().take(target).copied().collect::<Vec<_>>().join(" ")
            };
            let citations = section.get("authorities").cloned().unwrap_or_else(|| json!([]));
            Some(json!({ "sectionId": section_id, "text": text, "citations": citations }))
        })
        .collect();
    json!({ "drafts": drafts })
}

#[async_trait]
impl PhaseWorker for ScriptedWorker {
    async fn start(&self, phase_id: &str, case_id: &str, config: &Value) -> Result<TaskId, PhaseFailure> {
        let default_run = self.default_run(phase_id, config);
        let mut state = self.state.lock().map_err(|_| lock_failed())?;
        state.starts.push((phase_id.to_string(), case_id.to_string()));

        let script = state.scripts.entry(phase_id.to_string()).or_default();
        if let Some(failure) = script.start_failures.pop_front() {
            return Err(failure);
        }
        let polls = script.runs.pop_front().unwrap_or(default_run);

        state.next_task += 1;
        let task_id = format!("{}-task-{}", phase_id, state.next_task);
        state.tasks.insert(
            task_id.clone(),
            TaskRun {
                phase_id: phase_id.to_string(),
                polls: polls.into(),
                last: None,
            },
        );
        Ok(task_id)
    }

    async fn status(&self, phase_id: &str, task_id: &str) -> Result<StatusResponse, PhaseFailure> {
        let mut state = self.state.lock().map_err(|_| lock_failed())?;
        *state.status_calls.entry(phase_id.to_string()).or_default() += 1;

        let task = state
            .tasks
            .get_mut(task_id)
            .filter(|t| t.phase_id == phase_id)
            .ok_or_else(|| PhaseFailure::worker(format!("unknown task {}", task_id)))?;

        if let Some(next) = task.polls.pop_front() {
            task.last = Some(next.clone());
            return next;
        }
        task.last
            .clone()
            .unwrap_or_else(|| Ok(StatusResponse::running(0)))
    }

    async fn cancel(&self, _phase_id: &str, task_id: &str) -> Result<bool, PhaseFailure> {
        let mut state = self.state.lock().map_err(|_| lock_failed())?;
        state.cancels.push(task_id.to_string());
        Ok(state.tasks.contains_key(task_id))
    }
}
