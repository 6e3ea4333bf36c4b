/// Shared error taxonomy used across all `tinyclaw` crates.
///
/// Carries the teacher codebase's original variants (`Http`, `SerialMemory`,
/// `Config`, `Auth`) forward unchanged since the gateway, providers, and
/// client crates already match on them, and adds the kinds the distilled
/// spec introduces (`Capacity`, `Security`, `Validation`, `Store`) for the
/// delegation, shield, and shell subsystems. Recovery policy lives at the
/// call site, not in this enum: tool boundaries, the runner, and the
/// background runner translate these into result strings rather than
/// propagating them across the model/runner boundary.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    /// C11/C14 exhaustion, or any transport-level deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Provider returned a non-2xx, non-auth response.
    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// Network-level failure reaching the provider.
    #[error("transport error contacting {provider}: {message}")]
    Transport { provider: String, message: String },

    #[error("SerialMemory: {0}")]
    SerialMemory(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("config: {0}")]
    Config(String),

    /// Provider rejected credentials, a path-traversal attempt was
    /// blocked, or any other authentication/authorization refusal.
    #[error("auth: {0}")]
    Auth(String),

    /// Template or concurrency cap hit. Returned verbatim to the agent as
    /// the tool result.
    #[error("{0}")]
    Capacity(String),

    /// Shield block or shell deny. Returned to the agent/model as a
    /// tool-result string so the model can react.
    #[error("{0}")]
    Security(String),

    /// Config schema violation. The `set` is refused; no partial writes.
    #[error("validation: {0}")]
    Validation(String),

    /// Persistence failure. Fatal to the affected request; the process
    /// continues.
    #[error("store: {0}")]
    Store(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// `true` for error kinds that are safe to retry once at a request
    /// boundary (provider/transport/timeout failures and 5xx-shaped HTTP).
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::Provider { .. } | Error::Transport { .. } | Error::Timeout(_) => true,
            Error::Http(message) => {
                message.contains("HTTP 500")
                    || message.contains("HTTP 502")
                    || message.contains("HTTP 503")
                    || message.contains("HTTP 504")
                    || message.contains("HTTP 529")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
