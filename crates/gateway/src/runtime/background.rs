//! Background task runner (C14).
//!
//! Executes a delegated task on a sub-agent without blocking the caller:
//! starts the child turn via [`super::run_turn`], races it against the
//! task's estimated timeout (C10), and on completion persists the result,
//! records lifecycle/metric feedback, and announces it on the intercom
//! (C3) so the primary loop can surface it on the user's next turn (C17).
//!
//! Tasks on one sub-agent serialize through [`SessionQueue`] keyed
//! `"bg:"+agentId`, matching §5's concurrency model; tasks across
//! sub-agents run fully in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sa_delegation::{Intercom, OutboundMessage, Priority, SessionQueue, Source, Topic};
use sa_domain::config::ToolPolicy;
use sa_domain::error::{Error, Result};
use sa_store::background::BackgroundTask;
use sa_store::SubAgentStatus;

use crate::state::AppState;

use super::agent::AgentContext;
use super::{run_turn, TurnEvent, TurnInput, MAX_TOOL_LOOPS};

/// Per-user cap on simultaneously `running` background tasks (§5).
pub const MAX_CONCURRENT_PER_USER: usize = 3;

/// Grace period to keep draining turn events after issuing a cancel, so
/// the runner can still report the partial content/iteration count a
/// timed-out turn produced before it noticed cancellation.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Tracks in-flight background tasks for cancellation, and owns the
/// primitives C14 composes: the per-agent serialization queue and the
/// intercom it announces completions on.
pub struct BackgroundRunner {
    queue: Arc<SessionQueue>,
    intercom: Arc<Intercom>,
    /// task_id -> session_key, so `cancel(task_id)` can reach the right
    /// `CancelMap` entry without the caller needing to know our naming.
    active: Mutex<HashMap<String, String>>,
}

impl Default for BackgroundRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundRunner {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(SessionQueue::new()),
            intercom: Intercom::new(),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn intercom(&self) -> &Arc<Intercom> {
        &self.intercom
    }

    /// Start a task on `agent_id`. Returns the new task's id once it has
    /// been persisted as `running`; the turn itself continues in the
    /// background after this returns.
    pub async fn start(
        self: &Arc<Self>,
        state: AppState,
        user_id: String,
        agent_id: String,
        task_description: String,
        auto_create_template: bool,
    ) -> Result<BackgroundTask> {
        if state.store.count_running_tasks(&user_id)? >= MAX_CONCURRENT_PER_USER {
            return Err(Error::Capacity(format!(
                "background task concurrency cap reached ({MAX_CONCURRENT_PER_USER} per user)"
            )));
        }

        let record = state
            .agent_lifecycle
            .get(&agent_id)?
            .ok_or_else(|| Error::Validation(format!("sub-agent '{agent_id}' not found")))?;
        if record.status != SubAgentStatus::Active {
            return Err(Error::Validation(format!(
                "sub-agent '{agent_id}' is not active"
            )));
        }

        let task_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();
        let task = state.store.create_background_task(
            task_id.clone(),
            user_id.clone(),
            agent_id.clone(),
            task_description.clone(),
            now,
        )?;

        let session_key = format!("bg:{task_id}");
        self.active.lock().insert(task_id.clone(), session_key.clone());
        self.intercom.emit(
            Topic::TaskQueued,
            user_id.clone(),
            serde_json::json!({ "taskId": task_id, "agentId": agent_id }),
            now,
        );

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            runner
                .run_one(state, task_id, session_key, user_id, agent_id, task_description, auto_create_template)
                .await;
        });

        Ok(task)
    }

    /// Best-effort cancel: signals the turn's cancel token. The task still
    /// runs to completion on the runner's side (it observes cancellation
    /// at its next suspension point) — callers should not assume the task
    /// is done the moment this returns.
    pub fn cancel(&self, state: &AppState, task_id: &str) -> bool {
        let session_key = self.active.lock().get(task_id).cloned();
        match session_key {
            Some(session_key) => state.cancel_map.cancel(&session_key),
            None => false,
        }
    }

    /// Drain every active task's cancel token. Used at shutdown before C1
    /// is closed.
    pub fn cancel_all(&self, state: &AppState) {
        for session_key in self.active.lock().values() {
            state.cancel_map.cancel(session_key);
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_one(
        self: Arc<Self>,
        state: AppState,
        task_id: String,
        session_key: String,
        user_id: String,
        agent_id: String,
        task_description: String,
        auto_create_template: bool,
    ) {
        let result = self
            .queue
            .enqueue(&format!("bg:{agent_id}"), || {
                self.execute(&state, &task_id, &session_key, &user_id, &agent_id, &task_description)
            })
            .await;

        self.active.lock().remove(&task_id);

        let now = chrono::Utc::now().timestamp_millis();
        let (success, message) = match &result {
            Ok(text) => (true, text.clone()),
            Err(text) => (false, text.clone()),
        };

        if let Err(e) = state
            .store
            .complete_background_task(&task_id, success, message.clone(), now)
        {
            tracing::warn!(task_id, error = %e, "failed to persist background task completion");
        }

        if let Err(e) = state.agent_lifecycle.record_task_result(&agent_id, success, now) {
            tracing::warn!(agent_id, error = %e, "failed to record sub-agent task result");
        }

        match state.store.running_tasks_for_agent(&agent_id) {
            Ok(0) => {
                if let Err(e) = state.agent_lifecycle.suspend(&agent_id, now) {
                    tracing::warn!(agent_id, error = %e, "failed to auto-suspend idle sub-agent");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(agent_id, error = %e, "failed to count running tasks for agent"),
        }

        let topic = if success { Topic::TaskCompleted } else { Topic::TaskFailed };
        self.intercom.emit(
            topic,
            user_id.clone(),
            serde_json::json!({ "taskId": task_id, "agentId": agent_id, "result": message }),
            now,
        );

        // Optional out-of-band delivery (C4): if the user's channel has a
        // registered sender, push the result proactively instead of making
        // them wait for their next turn to see it via `getUndelivered`.
        // Best-effort — a missing sender or transport failure here must
        // never fail the task that already completed.
        let outbound = OutboundMessage::new(message.clone(), Priority::Normal, Source::BackgroundTask);
        let send_result = state.outbound_gateway.send(&user_id, &outbound).await;
        if !send_result.success {
            tracing::debug!(
                user_id,
                task_id,
                error = ?send_result.error,
                "background task result not delivered out-of-band, will surface on next turn"
            );
        }

        if auto_create_template && success {
            self.maybe_auto_create_template(&state, &user_id, &agent_id, &task_description, now);
        }
    }

    /// Create a `RoleTemplate` from this task's description the first time
    /// a sub-agent with no template of its own succeeds, unless a close
    /// enough template already exists. Failures here (cap reached, store
    /// error) are logged and swallowed — they must never fail the task
    /// that triggered them.
    fn maybe_auto_create_template(
        &self,
        state: &AppState,
        user_id: &str,
        agent_id: &str,
        task_description: &str,
        now: i64,
    ) {
        let record = match state.agent_lifecycle.get(agent_id) {
            Ok(Some(r)) => r,
            _ => return,
        };
        if record.template_id.is_some() {
            return;
        }
        match state.templates.find_best_match(user_id, task_description) {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(agent_id, error = %e, "template match lookup failed, skipping auto-create");
                return;
            }
        }

        let mut tags: Vec<String> = task_description
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 3)
            .map(|t| t.to_lowercase())
            .collect();
        tags.sort();
        tags.dedup();
        tags.truncate(10);

        let id = uuid::Uuid::new_v4().to_string();
        if let Err(e) = state.templates.create(
            id,
            user_id,
            &record.role,
            task_description,
            record.tools_granted.clone(),
            record.tier_preference.clone(),
            now,
        ) {
            tracing::info!(agent_id, error = %e, "auto-create role template skipped");
        }
    }

    /// Run the child turn to completion (or timeout), returning `Ok(text)`
    /// on success and `Err(text)` on failure — both already formatted as
    /// the result string persisted on the `BackgroundTask`.
    async fn execute(
        &self,
        state: &AppState,
        task_id: &str,
        session_key: &str,
        user_id: &str,
        agent_id: &str,
        task_description: &str,
    ) -> std::result::Result<String, String> {
        let record = match state.agent_lifecycle.get(agent_id) {
            Ok(Some(r)) => r,
            Ok(None) => return Err(format!("sub-agent '{agent_id}' vanished before execution")),
            Err(e) => return Err(e.to_string()),
        };

        let tier = record
            .tier_preference
            .as_deref()
            .and_then(parse_tier)
            .unwrap_or_else(|| {
                sa_providers::classify_query(task_description, &state.config.classifier).tier
            });

        let estimate = match state.timeout_estimator.estimate(task_description, tier) {
            Ok(e) => e,
            Err(e) => return Err(e.to_string()),
        };

        let agent_ctx = AgentContext {
            agent_id: agent_id.to_string(),
            workspace: state.workspace.clone(),
            skills: state.skills.clone(),
            tool_policy: ToolPolicy {
                allow: record.tools_granted.clone(),
                deny: vec![],
            },
            models: HashMap::new(),
            cancel_group: None,
            system_prompt_override: Some(record.system_prompt.clone()),
        };

        let input = TurnInput {
            session_key: session_key.to_string(),
            session_id: task_id.to_string(),
            user_message: task_description.to_string(),
            model: None,
            response_format: None,
            agent: Some(agent_ctx),
        };

        let started = std::time::Instant::now();
        let (_run_id, mut rx) = run_turn(state.clone(), input);

        // Mutable budget so adaptive extension (C10 `should_extend`) can
        // push it out between iterations instead of the single fixed
        // deadline a plain `tokio::time::timeout` around the whole drain
        // would impose.
        let mut budget = Duration::from_millis(estimate.timeout_ms);
        let mut iterations: u32 = 0;
        let mut extensions_so_far: u32 = 0;
        let mut text = String::new();
        let mut errored = false;
        let mut timed_out = false;

        loop {
            let remaining = budget.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                timed_out = true;
                break;
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(event)) => match event {
                    TurnEvent::ToolCallEvent { .. } => {
                        iterations += 1;
                        let elapsed_ms = started.elapsed().as_millis() as u64;
                        let extension = state.timeout_estimator.should_extend(
                            iterations,
                            MAX_TOOL_LOOPS as u32,
                            elapsed_ms,
                            budget.as_millis() as u64,
                            extensions_so_far,
                        );
                        if extension.extend {
                            extensions_so_far += 1;
                            let added_ms = if extension.extra_ms > 0 {
                                extension.extra_ms
                            } else {
                                // Iteration-pressure grants more rounds, not
                                // a time delta directly; translate it into
                                // wall-clock using this run's own observed
                                // per-iteration cost so the extra rounds
                                // have time to actually run.
                                let per_iteration_ms = elapsed_ms / iterations as u64;
                                extension.extra_iterations as u64 * per_iteration_ms
                            };
                            budget += Duration::from_millis(added_ms);
                            tracing::debug!(
                                task_id,
                                extensions_so_far,
                                added_ms,
                                "adaptive timeout extension granted"
                            );
                        }
                    }
                    TurnEvent::Final { content } => text = content,
                    TurnEvent::Stopped { content } => {
                        text = if content.is_empty() { "[sub-agent stopped]".into() } else { content };
                    }
                    TurnEvent::Error { message } => {
                        text = message;
                        errored = true;
                    }
                    _ => {}
                },
                Ok(None) => break,
                Err(_elapsed) => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            // Timed out: signal cancellation, then keep draining (with
            // a bounded grace period) so the runner observes the
            // pending LLM request actually stop before returning.
            state.cancel_map.cancel(session_key);
            let _ = tokio::time::timeout(CANCEL_GRACE, async {
                while rx.recv().await.is_some() {}
            })
            .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let _ = state.timeout_estimator.record(
                user_id,
                &estimate.task_type,
                tier,
                elapsed_ms,
                iterations,
                false,
                chrono::Utc::now().timestamp_millis(),
            );
            return Err("Sub-agent timed out.".to_string());
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let _ = state.timeout_estimator.record(
            user_id,
            &estimate.task_type,
            tier,
            elapsed_ms,
            iterations,
            !errored,
            chrono::Utc::now().timestamp_millis(),
        );

        if errored {
            Err(text)
        } else {
            Ok(text)
        }
    }
}

fn parse_tier(s: &str) -> Option<sa_domain::tier::Tier> {
    use sa_domain::tier::Tier;
    match s {
        "simple" => Some(Tier::Simple),
        "moderate" => Some(Tier::Moderate),
        "complex" => Some(Tier::Complex),
        "reasoning" => Some(Tier::Reasoning),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tier_round_trips_known_names() {
        assert_eq!(parse_tier("simple"), Some(sa_domain::tier::Tier::Simple));
        assert_eq!(parse_tier("reasoning"), Some(sa_domain::tier::Tier::Reasoning));
        assert_eq!(parse_tier("bogus"), None);
    }
}
