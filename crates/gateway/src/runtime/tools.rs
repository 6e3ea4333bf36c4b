//! Tool registry for the runtime — builds tool definitions for the LLM and
//! dispatches tool calls to local handlers, connected nodes, or stubs.

use serde_json::Value;

use sa_domain::config::ToolPolicy;
use sa_domain::tool::ToolDefinition;
use sa_shield::{DecisionAction, PolicyEvent, ShellDecision};
use sa_tools::exec::{self, ExecRequest};
use sa_tools::file_ops::{
    self, FileAppendRequest, FileDeleteRequest, FileListRequest, FileMoveRequest,
    FileReadRequest, FileWriteRequest,
};
use sa_tools::process::{self, ProcessRequest};

use crate::runtime::agent::AgentContext;
use crate::runtime::approval::{ApprovalDecision, PendingApproval};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the set of tool definitions exposed to the LLM.
///
/// When `tool_policy` is `Some`, definitions are filtered through it so that
/// sub-agents only see tools their config permits.
pub fn build_tool_definitions(
    state: &AppState,
    tool_policy: Option<&ToolPolicy>,
) -> Vec<ToolDefinition> {
    let mut defs = Vec::new();

    // ── Built-in local tools ──────────────────────────────────────
    defs.push(ToolDefinition {
        name: "exec".into(),
        description: "Run a shell command. Returns output or a background session ID.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to execute" },
                "background": { "type": "boolean", "description": "Run in background" },
                "workdir": { "type": "string", "description": "Working directory" },
                "timeout_sec": { "type": "integer", "description": "Hard timeout in seconds" }
            },
            "required": ["command"]
        }),
    });

    defs.push(ToolDefinition {
        name: "process".into(),
        description: "Manage background processes: list, poll, log, write, kill, remove.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["list", "poll", "log", "write", "kill", "clear", "remove"],
                    "description": "Action to perform"
                },
                "session_id": { "type": "string", "description": "Process session ID" },
                "data": { "type": "string", "description": "Data to write to stdin" }
            },
            "required": ["action"]
        }),
    });

    // ── File tools (workspace-scoped) ────────────────────────────
    defs.push(ToolDefinition {
        name: "file.read".into(),
        description: "Read a file within the workspace, optionally by line offset/limit.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "offset": { "type": "integer", "description": "0-indexed line to start from" },
                "limit": { "type": "integer", "description": "Maximum number of lines to return" }
            },
            "required": ["path"]
        }),
    });

    defs.push(ToolDefinition {
        name: "file.write".into(),
        description: "Write (create or overwrite) a file within the workspace.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "content": { "type": "string", "description": "File content" }
            },
            "required": ["path", "content"]
        }),
    });

    defs.push(ToolDefinition {
        name: "file.append".into(),
        description: "Append content to a file within the workspace, creating it if absent.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "content": { "type": "string", "description": "Content to append" }
            },
            "required": ["path", "content"]
        }),
    });

    defs.push(ToolDefinition {
        name: "file.move".into(),
        description: "Move or rename a file within the workspace.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "source": { "type": "string", "description": "Current path relative to the workspace root" },
                "destination": { "type": "string", "description": "New path relative to the workspace root" }
            },
            "required": ["source", "destination"]
        }),
    });

    defs.push(ToolDefinition {
        name: "file.delete".into(),
        description: "Delete a file or empty directory within the workspace.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" }
            },
            "required": ["path"]
        }),
    });

    defs.push(ToolDefinition {
        name: "file.list".into(),
        description: "List directory contents within the workspace.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory path relative to the workspace root (default '.')" }
            },
            "required": []
        }),
    });

    // ── Skill tools ───────────────────────────────────────────────
    defs.push(ToolDefinition {
        name: "skill.read_doc".into(),
        description: "Read the full documentation (SKILL.md) for a skill.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Skill name (e.g. 'apple-notes')" }
            },
            "required": ["name"]
        }),
    });

    defs.push(ToolDefinition {
        name: "skill.read_resource".into(),
        description: "Read a bundled resource from a skill (references/, scripts/, assets/).".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Skill name" },
                "path": { "type": "string", "description": "Resource path (e.g. 'references/api.md')" }
            },
            "required": ["name", "path"]
        }),
    });

    // ── SerialMemory tools ────────────────────────────────────────
    defs.push(ToolDefinition {
        name: "memory.search".into(),
        description: "Search long-term memory for relevant facts, notes, and session history.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "limit": { "type": "integer", "description": "Max results (default 10)" }
            },
            "required": ["query"]
        }),
    });

    defs.push(ToolDefinition {
        name: "memory.ingest".into(),
        description: "Store a fact or note in long-term memory.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Content to store" },
                "source": { "type": "string", "description": "Source label (e.g. 'user', 'agent')" }
            },
            "required": ["content"]
        }),
    });

    // ── Stub tools (common aliases that aren't wired yet) ─────────
    defs.push(ToolDefinition {
        name: "web.search".into(),
        description: "Search the web (SERP). Currently unavailable — returns an error with alternatives.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        }),
    });

    defs.push(ToolDefinition {
        name: "http.request".into(),
        description: "Make an HTTP request. Currently unavailable — returns an error with alternatives.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "URL to fetch" },
                "method": { "type": "string", "description": "HTTP method (GET, POST, etc.)" }
            },
            "required": ["url"]
        }),
    });

    // ── Agent delegation tools ──────────────────────────────────────
    // Only expose these if agents are configured.
    if let Some(ref agents) = state.agents {
        if !agents.is_empty() {
            defs.push(ToolDefinition {
                name: "agent.run".into(),
                description: "Delegate a task to a specialist sub-agent. The sub-agent runs in its own session with scoped tools and skills. Returns the agent's final answer.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "agent_id": { "type": "string", "description": "ID of the agent to run (from agent.list)" },
                        "task": { "type": "string", "description": "The task or question to give the agent" },
                        "model": { "type": "string", "description": "Optional model override (e.g. 'openai/gpt-4o')" }
                    },
                    "required": ["agent_id", "task"]
                }),
            });

            defs.push(ToolDefinition {
                name: "agent.list".into(),
                description: "List all available sub-agents and their capabilities.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {}
                }),
            });
        }
    }

    // ── Apply tool policy filter ─────────────────────────────────
    if let Some(policy) = tool_policy {
        defs.retain(|d| policy.allows(&d.name));
    }

    defs
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Dispatch a single tool call. Returns (result_content, is_error).
///
/// `agent` is `Some` when the call originates from a sub-agent turn; this
/// tightens the Shield Engine's (C8) verdict and disables shell-approval
/// prompts that a sub-agent has no way to resolve interactively.
pub async fn dispatch_tool(
    state: &AppState,
    tool_name: &str,
    arguments: &Value,
    session_key: Option<&str>,
    agent: Option<&AgentContext>,
) -> (String, bool) {
    // Every tool call passes through the Shield Engine (C8) first, whatever
    // its destination (built-in, node, or stub).
    let is_subagent = agent.is_some();
    let now = chrono::Utc::now().timestamp();
    let shield_event = PolicyEvent::ToolCall {
        tool_name: tool_name.to_string(),
        tool_args: arguments.clone(),
    };
    let shield_decision = state.shield.evaluate(&shield_event, now, is_subagent);
    match shield_decision.action {
        DecisionAction::Block => {
            tracing::warn!(
                tool = %tool_name,
                threat_id = ?shield_decision.threat_id,
                reason = %shield_decision.reason,
                "tool call blocked by shield"
            );
            return (
                format!("Error: blocked by security policy: {}", shield_decision.reason),
                true,
            );
        }
        DecisionAction::RequireApproval => {
            // The shield already downgrades sub-agent RequireApproval to
            // Block, so this can only fire for a primary-session call.
            if let Err(msg) = await_approval(
                state,
                &format!("{tool_name} {arguments}"),
                session_key,
            )
            .await
            {
                return (format!("Error: {msg}"), true);
            }
        }
        DecisionAction::Log => {
            tracing::debug!(tool = %tool_name, "shield: {}", shield_decision.reason);
        }
    }

    // Handle our built-in tools first.
    match tool_name {
        "exec" => dispatch_exec(state, arguments, session_key, is_subagent).await,
        "process" => dispatch_process(state, arguments).await,
        "file.read" => dispatch_file_read(state, arguments).await,
        "file.write" => dispatch_file_write(state, arguments).await,
        "file.append" => dispatch_file_append(state, arguments).await,
        "file.move" => dispatch_file_move(state, arguments).await,
        "file.delete" => dispatch_file_delete(state, arguments).await,
        "file.list" => dispatch_file_list(state, arguments).await,
        "skill.read_doc" => dispatch_skill_read_doc(state, arguments),
        "skill.read_resource" => dispatch_skill_read_resource(state, arguments),
        "memory.search" => dispatch_memory_search(state, arguments).await,
        "memory.ingest" => dispatch_memory_ingest(state, arguments).await,
        "agent.run" => dispatch_agent_run(state, arguments, session_key).await,
        "agent.list" => dispatch_agent_list(state),
        "web.search" => stub_tool("web.search", "Web search is not yet configured. Use exec with curl or a search CLI tool as an alternative."),
        "http.request" => stub_tool("http.request", "HTTP requests are not yet configured. Use exec with curl as an alternative."),
        _ => (
            serde_json::json!({
                "error": format!("Unknown tool: '{tool_name}'"),
                "message": "This tool is not registered. Check available tools.",
            })
            .to_string(),
            true,
        ),
    }
}

/// Wait for a human to approve or deny a dangerous action via the
/// `/v1/tools/exec/approve/:id` / `/deny/:id` admin endpoints.
///
/// Returns `Ok(())` on approval, `Err(message)` on denial or timeout.
async fn await_approval(
    state: &AppState,
    label: &str,
    session_key: Option<&str>,
) -> Result<(), String> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let pending = PendingApproval {
        id: uuid::Uuid::new_v4(),
        command: label.to_string(),
        session_key: session_key.unwrap_or("unknown").to_string(),
        created_at: chrono::Utc::now(),
        respond: tx,
    };
    let id = pending.id;
    let info = state.approval_store.insert(pending);
    tracing::info!(id = %info.id, label = %label, "awaiting human approval");

    let timeout = state.approval_store.timeout();
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(ApprovalDecision::Approved)) => Ok(()),
        Ok(Ok(ApprovalDecision::Denied { reason })) => Err(format!(
            "denied by reviewer{}",
            reason.map(|r| format!(": {r}")).unwrap_or_default()
        )),
        Ok(Err(_)) => Err("approval channel closed unexpectedly".into()),
        Err(_) => {
            state.approval_store.remove_expired(&id);
            Err(format!(
                "approval timed out after {}s",
                timeout.as_secs()
            ))
        }
    }
}

async fn dispatch_exec(
    state: &AppState,
    arguments: &Value,
    session_key: Option<&str>,
    is_subagent: bool,
) -> (String, bool) {
    let req: ExecRequest = match serde_json::from_value(arguments.clone()) {
        Ok(r) => r,
        Err(e) => return (format!("invalid exec arguments: {e}"), true),
    };

    // Shell permission engine (C9) — command-specific deny/allow/approval.
    let now = chrono::Utc::now().timestamp();
    let shell_result = state.shell_permissions.evaluate(&req.command, now);
    match shell_result.decision {
        ShellDecision::Deny => {
            tracing::warn!(
                command = %req.command,
                rule = ?shell_result.matched_rule,
                "exec denied by shell permission engine"
            );
            return (
                format!(
                    "Error: denied: {}",
                    shell_result.reason.as_deref().unwrap_or("command denied")
                ),
                true,
            );
        }
        ShellDecision::RequireApproval => {
            if is_subagent {
                tracing::warn!(
                    command = %req.command,
                    "exec requiring approval auto-denied for sub-agent"
                );
                return (
                    "Error: denied: sub-agents cannot request shell command approval".into(),
                    true,
                );
            }
            if let Err(msg) = await_approval(state, &req.command, session_key).await {
                return (format!("Error: {msg}"), true);
            }
            // Remember the approval for the rest of this process's lifetime
            // so a follow-up call to the same command doesn't re-prompt.
            let _ = state.shell_permissions.approve(&req.command, false, now);
        }
        ShellDecision::Allow => {}
    }

    let resp = exec::exec(&state.processes, req).await;
    let json = serde_json::to_string_pretty(&resp).unwrap_or_default();
    (json, false)
}

async fn dispatch_process(state: &AppState, arguments: &Value) -> (String, bool) {
    let req: ProcessRequest = match serde_json::from_value(arguments.clone()) {
        Ok(r) => r,
        Err(e) => return (format!("invalid process arguments: {e}"), true),
    };
    let resp = process::handle_process(&state.processes, req).await;
    let json = serde_json::to_string_pretty(&resp).unwrap_or_default();
    (json, false)
}

async fn dispatch_file_read(state: &AppState, arguments: &Value) -> (String, bool) {
    let req: FileReadRequest = match serde_json::from_value(arguments.clone()) {
        Ok(r) => r,
        Err(e) => return (format!("invalid file.read arguments: {e}"), true),
    };
    match file_ops::file_read(state.workspace.root(), req).await {
        Ok(v) => (v.to_string(), false),
        Err(e) => (format!("Error: {e}"), true),
    }
}

async fn dispatch_file_write(state: &AppState, arguments: &Value) -> (String, bool) {
    let req: FileWriteRequest = match serde_json::from_value(arguments.clone()) {
        Ok(r) => r,
        Err(e) => return (format!("invalid file.write arguments: {e}"), true),
    };
    match file_ops::file_write(state.workspace.root(), req).await {
        Ok(v) => (v.to_string(), false),
        Err(e) => (format!("Error: {e}"), true),
    }
}

async fn dispatch_file_append(state: &AppState, arguments: &Value) -> (String, bool) {
    let req: FileAppendRequest = match serde_json::from_value(arguments.clone()) {
        Ok(r) => r,
        Err(e) => return (format!("invalid file.append arguments: {e}"), true),
    };
    match file_ops::file_append(state.workspace.root(), req).await {
        Ok(v) => (v.to_string(), false),
        Err(e) => (format!("Error: {e}"), true),
    }
}

async fn dispatch_file_move(state: &AppState, arguments: &Value) -> (String, bool) {
    let req: FileMoveRequest = match serde_json::from_value(arguments.clone()) {
        Ok(r) => r,
        Err(e) => return (format!("invalid file.move arguments: {e}"), true),
    };
    match file_ops::file_move(state.workspace.root(), req).await {
        Ok(v) => (v.to_string(), false),
        Err(e) => (format!("Error: {e}"), true),
    }
}

async fn dispatch_file_delete(state: &AppState, arguments: &Value) -> (String, bool) {
    let req: FileDeleteRequest = match serde_json::from_value(arguments.clone()) {
        Ok(r) => r,
        Err(e) => return (format!("invalid file.delete arguments: {e}"), true),
    };
    match file_ops::file_delete(state.workspace.root(), req).await {
        Ok(v) => (v.to_string(), false),
        Err(e) => (format!("Error: {e}"), true),
    }
}

async fn dispatch_file_list(state: &AppState, arguments: &Value) -> (String, bool) {
    let req: FileListRequest = match serde_json::from_value(arguments.clone()) {
        Ok(r) => r,
        Err(e) => return (format!("invalid file.list arguments: {e}"), true),
    };
    match file_ops::file_list(state.workspace.root(), req).await {
        Ok(v) => (v.to_string(), false),
        Err(e) => (format!("Error: {e}"), true),
    }
}

fn dispatch_skill_read_doc(state: &AppState, arguments: &Value) -> (String, bool) {
    let name = arguments
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    match state.skills.read_doc(name) {
        Ok(doc) => (doc, false),
        Err(e) => (format!("skill doc error: {e}"), true),
    }
}

fn dispatch_skill_read_resource(state: &AppState, arguments: &Value) -> (String, bool) {
    let name = arguments
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let path = arguments
        .get("path")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    match state.skills.read_resource(name, path) {
        Ok(content) => (content, false),
        Err(e) => (format!("resource error: {e}"), true),
    }
}

async fn dispatch_memory_search(state: &AppState, arguments: &Value) -> (String, bool) {
    let query = arguments
        .get("query")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let limit = arguments
        .get("limit")
        .and_then(|v| v.as_u64())
        .map(|v| v as u32);

    let req = sa_memory::RagSearchRequest { query, limit };

    match state.memory.search(req).await {
        Ok(results) => {
            let json = serde_json::to_string_pretty(&results).unwrap_or_default();
            (json, false)
        }
        Err(e) => (format!("memory search error: {e}"), true),
    }
}

async fn dispatch_memory_ingest(state: &AppState, arguments: &Value) -> (String, bool) {
    let content = arguments
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let source = arguments
        .get("source")
        .and_then(|v| v.as_str())
        .map(String::from);

    let req = sa_memory::MemoryIngestRequest {
        content,
        source,
        session_id: None,
        metadata: None,
        extract_entities: None,
    };

    match state.memory.ingest(req).await {
        Ok(resp) => {
            let json = serde_json::to_string_pretty(&resp).unwrap_or_default();
            (json, false)
        }
        Err(e) => (format!("memory ingest error: {e}"), true),
    }
}

async fn dispatch_agent_run(
    state: &AppState,
    arguments: &Value,
    session_key: Option<&str>,
) -> (String, bool) {
    let agent_id = match arguments.get("agent_id").and_then(|v| v.as_str()) {
        Some(id) => id,
        None => return ("missing required argument: agent_id".into(), true),
    };
    let task = match arguments.get("task").and_then(|v| v.as_str()) {
        Some(t) => t,
        None => return ("missing required argument: task".into(), true),
    };
    let model = arguments
        .get("model")
        .and_then(|v| v.as_str())
        .map(String::from);

    let parent_key = session_key.unwrap_or("anonymous");

    super::agent::run_agent(state, agent_id, task, model, parent_key).await
}

fn dispatch_agent_list(state: &AppState) -> (String, bool) {
    let manager = match &state.agents {
        Some(m) => m,
        None => {
            return (
                serde_json::json!({ "agents": [], "count": 0 }).to_string(),
                false,
            );
        }
    };

    let agents: Vec<_> = manager
        .list()
        .into_iter()
        .map(|id| {
            let runtime = manager.get(&id);
            match runtime {
                Some(r) => serde_json::json!({
                    "id": id,
                    "tools_allow": r.config.tool_policy.allow,
                    "tools_deny": r.config.tool_policy.deny,
                    "models": r.config.models,
                    "memory_mode": r.config.memory_mode,
                }),
                None => serde_json::json!({ "id": id }),
            }
        })
        .collect();

    (
        serde_json::json!({
            "agents": agents,
            "count": agents.len(),
        })
        .to_string(),
        false,
    )
}

fn stub_tool(name: &str, message: &str) -> (String, bool) {
    (
        serde_json::json!({
            "error": format!("Tool '{name}' is not available"),
            "message": message,
            "suggestion": "Use the 'exec' tool with appropriate CLI commands as a workaround."
        })
        .to_string(),
        true,
    )
}

