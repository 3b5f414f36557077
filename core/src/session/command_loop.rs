//! Suspended state: wait for front end commands and apply them

use std::time::Duration;

use tensorwatch_shared::{Command, SetCommand, ViewCommand};

use super::{Debugger, RunLevel, SessionState};
use crate::watch::{NodeMatcher, WatchCondition};

/// Consecutive failed waits tolerated before shutting down
pub const MAX_WAIT_FAILURES: u32 = 5;

/// Backoff step; the n-th consecutive failure waits n times this
pub const RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// Exit code used for every fatal shutdown
const EXIT_FAILURE: i32 = 1;

impl Debugger {
    /// Block until the front end sends a run command
    pub(super) fn command_loop(&mut self) {
        if self.transport.is_none() {
            tracing::debug!("no transport, not suspending");
            return;
        }

        let metadata = self.metadata();
        self.state = SessionState::Suspended;
        let mut wait_failures: u32 = 0;

        loop {
            let Some(transport) = self.transport.as_mut() else {
                break;
            };
            let command = match transport.wait_for_command(&metadata) {
                Ok(command) => command,
                Err(e) => {
                    wait_failures += 1;
                    tracing::error!(error = %e, "wait for command failed");
                    if wait_failures > MAX_WAIT_FAILURES {
                        tracing::error!(
                            "maximum number of command wait retries reached, exiting; \
                             check the debugger host and port"
                        );
                        self.fatal_exit();
                        return;
                    }
                    let delay = RETRY_INTERVAL * wait_failures;
                    tracing::error!(
                        failures = wait_failures,
                        retry_ms = delay.as_millis() as u64,
                        "retrying command wait"
                    );
                    self.process.sleep(delay);
                    continue;
                }
            };

            match command {
                Command::Unknown => {
                    tracing::debug!("received unknown command");
                }
                Command::Exit => {
                    tracing::info!("received exit command");
                    self.fatal_exit();
                    return;
                }
                Command::Run(run) => {
                    self.run_level = RunLevel::from_command(&run.run_level);
                    self.target_node = run.node_name;
                    tracing::info!(
                        run_level = %self.run_level,
                        node = %self.target_node,
                        "received run command"
                    );
                    break;
                }
                Command::Set(set) => self.apply_set(set),
                Command::View(view) => self.send_view(&view),
            }
        }

        if self.enabled {
            self.state = SessionState::Idle;
        }
    }

    fn apply_set(&mut self, set: SetCommand) {
        tracing::info!(
            id = set.id,
            delete = set.delete,
            nodes = set.watch_nodes.len(),
            "received set command"
        );
        if set.delete {
            self.registry.remove(set.id);
            return;
        }

        match WatchCondition::try_from(set.condition) {
            Ok(condition) => {
                let matchers = set.watch_nodes.iter().map(NodeMatcher::from);
                self.registry.add_or_replace(set.id, condition, matchers);
            }
            Err(e) => {
                tracing::error!(id = set.id, error = %e, "ignoring watchpoint");
            }
        }
    }

    fn send_view(&mut self, view: &ViewCommand) {
        tracing::info!(tensors = view.tensors.len(), "received view command");
        for request in &view.tensors {
            tracing::debug!(
                node = %request.node_name,
                slot = request.slot,
                iter = %request.iter,
                truncate = request.truncate,
                "tensor requested"
            );
        }

        let chunks = self.codec.encode(&view.tensors, &self.loader);
        if let Some(transport) = self.transport.as_mut()
            && let Err(e) = transport.send_tensors(&chunks)
        {
            tracing::error!(error = %e, "failed to send tensors");
        }
    }

    /// Release runtime resources and terminate the process
    fn fatal_exit(&mut self) {
        self.runtime.release_resources();
        self.process.exit(EXIT_FAILURE);
        // Only reached when process control does not terminate
        self.disable();
    }
}
