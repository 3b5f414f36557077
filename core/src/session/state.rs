//! Session state and stepping granularity

/// Where the debugger is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not debugging; all hooks are no-ops
    #[default]
    Disabled,
    /// Enabled, the runtime is executing
    Idle,
    /// Blocked in the command loop waiting for the front end
    Suspended,
}

impl SessionState {
    pub fn is_suspended(self) -> bool {
        self == SessionState::Suspended
    }
}

/// Granularity at which execution stops on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunLevel {
    /// Suspend after each graph execution
    #[default]
    Graph,
    /// Suspend after each node (or at a target node)
    Node,
}

impl RunLevel {
    /// Map a run command's level string
    ///
    /// `"node"` steps by node; any other value, including empty, by graph.
    pub fn from_command(level: &str) -> Self {
        if level == "node" {
            RunLevel::Node
        } else {
            RunLevel::Graph
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunLevel::Graph => "graph",
            RunLevel::Node => "node",
        }
    }
}

impl std::fmt::Display for RunLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
