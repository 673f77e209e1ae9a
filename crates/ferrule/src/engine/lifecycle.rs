//! Connection lifecycle state machine.

use ferrule_wire::ResponseError;

/// Where the connection is in the LSP lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifecycleState {
    /// Waiting for `initialize`.
    #[default]
    Uninitialized,
    /// `initialize` received, waiting for `initialized`.
    Initializing,
    /// Normal operation.
    Running,
    /// `shutdown` received, waiting for `exit`.
    ShuttingDown,
    /// The read loop has stopped.
    Closed,
}

/// How the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// `exit` arrived after `shutdown`.
    Clean,
    /// `exit` without `shutdown`, or the connection dropped.
    Unclean,
}

impl ExitStatus {
    /// Process exit code for this status.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Clean => 0,
            Self::Unclean => 1,
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Clean => Self::SUCCESS,
            ExitStatus::Unclean => Self::FAILURE,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    state: LifecycleState,
    shutdown_requested: bool,
}

impl Lifecycle {
    pub(crate) fn state(&self) -> LifecycleState {
        self.state
    }

    /// Decide whether a request may be dispatched in the current state.
    pub(crate) fn admit_request(&self, method: &str) -> Result<(), ResponseError> {
        match (self.state, method) {
            (LifecycleState::Uninitialized, "initialize") => Ok(()),
            (LifecycleState::Uninitialized, _) => Err(ResponseError::server_not_initialized()),
            (LifecycleState::Initializing | LifecycleState::Running, "initialize") => Err(
                ResponseError::invalid_request("server is already initialized"),
            ),
            (LifecycleState::Initializing | LifecycleState::Running, _) => Ok(()),
            (LifecycleState::ShuttingDown | LifecycleState::Closed, _) => {
                Err(ResponseError::invalid_request("server is shutting down"))
            }
        }
    }

    /// Whether a notification is processed in the current state.
    pub(crate) fn admit_notification(&self, method: &str) -> bool {
        match self.state {
            LifecycleState::Initializing | LifecycleState::Running => true,
            LifecycleState::Uninitialized | LifecycleState::ShuttingDown => method == "exit",
            LifecycleState::Closed => false,
        }
    }

    pub(crate) fn begin_initialize(&mut self) {
        self.state = LifecycleState::Initializing;
    }

    /// Undo a failed `initialize` so the client may retry.
    pub(crate) fn reset(&mut self) {
        self.state = LifecycleState::Uninitialized;
    }

    pub(crate) fn initialized(&mut self) {
        if self.state == LifecycleState::Initializing {
            self.state = LifecycleState::Running;
        }
    }

    pub(crate) fn begin_shutdown(&mut self) {
        self.state = LifecycleState::ShuttingDown;
        self.shutdown_requested = true;
    }

    pub(crate) fn close(&mut self) {
        self.state = LifecycleState::Closed;
    }

    pub(crate) fn exit_status(&self) -> ExitStatus {
        if self.shutdown_requested {
            ExitStatus::Clean
        } else {
            ExitStatus::Unclean
        }
    }
}
