//! Client configuration, read from the environment.

/// Defaults applied when creating sessions and resolving the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Absolute `http(s)://` base, or a path prefix joined onto `origin`.
    /// Stored without a trailing slash.
    pub api_base_url: String,
    pub origin: String,
    pub workspace_id: String,
    pub base_commit_oid: String,
    pub worktree_path: String,
    /// SQLite file holding the identity overlay.
    pub state_db: String,
}

pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:3210";
pub const DEFAULT_WORKSPACE_ID: &str = "ws-web-ui";
pub const DEFAULT_BASE_COMMIT_OID: &str = "web-ui";
pub const DEFAULT_WORKTREE_PATH: &str = "/tmp";
pub const DEFAULT_STATE_DB: &str = "vmsync-state.db";

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_base_url: String::new(),
            origin: DEFAULT_ORIGIN.to_string(),
            workspace_id: DEFAULT_WORKSPACE_ID.to_string(),
            base_commit_oid: DEFAULT_BASE_COMMIT_OID.to_string(),
            worktree_path: DEFAULT_WORKTREE_PATH.to_string(),
            state_db: DEFAULT_STATE_DB.to_string(),
        }
    }
}

impl ClientConfig {
    /// Reads the `VMSYNC_*` client variables; blank values keep defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = ClientConfig::default();
        let var = |key: &str, fallback: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
        };
        ClientConfig {
            api_base_url: var("VMSYNC_API_BASE_URL", d.api_base_url)
                .trim_end_matches('/')
                .to_string(),
            origin: var("VMSYNC_ORIGIN", d.origin),
            workspace_id: var("VMSYNC_WORKSPACE_ID", d.workspace_id),
            base_commit_oid: var("VMSYNC_BASE_COMMIT_OID", d.base_commit_oid),
            worktree_path: var("VMSYNC_WORKTREE_PATH", d.worktree_path),
            state_db: var("VMSYNC_STATE_DB", d.state_db),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed_and_blanks_default() {
        let config = ClientConfig::from_lookup(|key| match key {
            "VMSYNC_API_BASE_URL" => Some("http://vm.local/".to_string()),
            "VMSYNC_WORKSPACE_ID" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "http://vm.local");
        assert_eq!(config.workspace_id, DEFAULT_WORKSPACE_ID);
        assert_eq!(config.worktree_path, "/tmp");
    }
}
