use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use sa_delegation::{
    LifecycleManager as AgentLifecycleManager, OutboundGateway, TemplateManager, TimeoutEstimator,
};
use sa_domain::config::Config;
use sa_memory::provider::SerialMemoryProvider;
use sa_providers::registry::ProviderRegistry;
use sa_sessions::{IdentityResolver, LifecycleManager, SessionStore, TranscriptWriter};
use sa_skills::registry::SkillsRegistry;
use sa_tools::ProcessManager;

use crate::api::inbound::DedupeStore;
use sa_shield::{ShellPermissionEngine, ShieldEngine};
use sa_store::Store;

use crate::runtime::agent::AgentManager;
use crate::runtime::approval::ApprovalStore;
use crate::runtime::background::BackgroundRunner;
use crate::runtime::cancel::CancelMap;
use crate::runtime::deliveries::DeliveryStore;
use crate::runtime::quota::QuotaTracker;
use crate::runtime::runs::RunStore;
use crate::runtime::schedules::ScheduleStore;
use crate::runtime::session_lock::SessionLockMap;
use crate::runtime::tasks::{TaskRunner, TaskStore};
use crate::skills::SkillEngine;
use crate::workspace::bootstrap::BootstrapTracker;
use crate::workspace::files::WorkspaceReader;

/// Cached user facts with a TTL.
#[derive(Clone)]
pub struct CachedUserFacts {
    pub content: String,
    pub fetched_at: Instant,
}

/// Cached tool definitions keyed on (node generation, policy fingerprint).
#[derive(Clone)]
pub struct CachedToolDefs {
    pub defs: Arc<Vec<sa_domain::tool::ToolDefinition>>,
    pub generation: u64,
    pub policy_key: String,
}

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, memory, LLM providers
/// - **Session management** — sessions, identity, lifecycle, transcripts
/// - **Context & skills** — workspace, skills, bootstrap, skill engine
/// - **Runtime** — runs, schedules, deliveries, agents, processes, cancel map
/// - **Security & caching** — token hashes, command deny list, caches
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub memory: Arc<dyn SerialMemoryProvider>,
    pub llm: Arc<ProviderRegistry>,
    /// Embedding-classifier model router. `None` when `[llm.router]` is
    /// absent or disabled.
    pub smart_router: Option<Arc<sa_providers::SmartRouter>>,

    // ── Session management ────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,
    pub identity: Arc<IdentityResolver>,
    pub lifecycle: Arc<LifecycleManager>,
    pub transcripts: Arc<TranscriptWriter>,
    pub session_locks: Arc<SessionLockMap>,

    // ── Context & skills ──────────────────────────────────────────────
    pub skills: Arc<SkillsRegistry>,
    pub workspace: Arc<WorkspaceReader>,
    pub bootstrap: Arc<BootstrapTracker>,
    /// Callable skill engine (web.fetch, etc.).
    pub skill_engine: Arc<SkillEngine>,

    // ── Runtime ───────────────────────────────────────────────────────
    /// Run execution tracker.
    pub run_store: Arc<RunStore>,
    /// Schedule store (cron jobs).
    pub schedule_store: Arc<ScheduleStore>,
    /// Delivery store (inbox notifications from scheduled runs).
    pub delivery_store: Arc<DeliveryStore>,
    /// Sub-agent manager. `None` if no agents are configured.
    pub agents: Option<Arc<AgentManager>>,
    /// Dynamic sub-agent lifecycle — create/suspend/revive/soft-delete (C12).
    pub agent_lifecycle: Arc<AgentLifecycleManager>,
    /// Reusable role template matching and bookkeeping (C13).
    pub templates: Arc<TemplateManager>,
    /// Adaptive task timeout estimation (C10).
    pub timeout_estimator: Arc<TimeoutEstimator>,
    pub processes: Arc<ProcessManager>,
    pub cancel_map: Arc<CancelMap>,
    /// Per-agent daily usage quota tracker.
    pub quota_tracker: Arc<QuotaTracker>,
    /// Background task store + runner (the `tasks.*` API surface).
    pub task_store: Arc<TaskStore>,
    pub task_runner: Arc<TaskRunner>,
    /// Sub-agent delegation task runner — dispatches a task onto a
    /// sub-agent's own turn loop, serialized per agent (C14).
    pub background_runner: Arc<BackgroundRunner>,
    /// Prefix-routed outbound channel dispatcher (C4). Channel senders for
    /// concrete transports register themselves at startup; with none
    /// registered every `send` simply reports a missing-sender error.
    pub outbound_gateway: Arc<OutboundGateway>,

    // ── Inbound ───────────────────────────────────────────────────────
    /// Idempotency store for inbound event deduplication.
    pub dedupe: Arc<DedupeStore>,

    // ── Admin ─────────────────────────────────────────────────────────
    /// Path to the config file this instance was loaded from (admin `/reload`).
    pub config_path: PathBuf,
    /// Notified to trigger a graceful shutdown from an admin endpoint.
    pub shutdown_tx: Arc<tokio::sync::Notify>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
    /// SHA-256 hash of the admin bearer token (read once at startup).
    /// `None` = dev mode (admin endpoints accessible without auth).
    pub admin_token_hash: Option<Vec<u8>>,
    /// Pending exec approvals awaiting human decision.
    pub approval_store: Arc<ApprovalStore>,
    /// Embedded relational store (sub-agents, templates, background tasks,
    /// compaction records, episodic memory, shell approvals).
    pub store: Arc<Store>,
    /// Threat-feed evaluator (C8).
    pub shield: Arc<ShieldEngine>,
    /// Shell command permission evaluator (C9).
    pub shell_permissions: Arc<ShellPermissionEngine>,

    // ── Caches ────────────────────────────────────────────────────────
    /// Per-user TTL cache for user facts (avoids network calls every turn).
    pub user_facts_cache: Arc<RwLock<HashMap<String, CachedUserFacts>>>,
    /// Cached tool definitions keyed on policy fingerprint; invalidated by
    /// node registry generation counter.
    pub tool_defs_cache: Arc<RwLock<HashMap<String, CachedToolDefs>>>,
}
