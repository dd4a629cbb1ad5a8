//! Agent that runs a configured command once per input.
//!
//! The input is written to the child's stdin. Stdout lines become chat
//! output, stderr lines become warnings, and a non-zero exit is reported as
//! an error before the input is marked complete.

use std::{
    process::Stdio,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    switchboard_config::AgentConfig,
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        process::Command,
        sync::watch,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    Agent, Error, Result,
    event::{AgentEvent, ExecutionState, RequestId, SystemLevel},
    log::{EventCursor, EventLog, EventSubscription},
};

struct Inner {
    name: String,
    config: AgentConfig,
    log: EventLog,
    state: watch::Sender<ExecutionState>,
    current: Mutex<Option<RequestId>>,
    cancel: CancellationToken,
}

/// Local command agent.
pub struct ProcessAgent {
    inner: Arc<Inner>,
}

impl ProcessAgent {
    pub fn new(name: impl Into<String>, config: AgentConfig) -> Self {
        let (state, _) = watch::channel(ExecutionState::Idle);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                log: EventLog::new(),
                state,
                current: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    fn try_begin(&self) -> bool {
        self.inner.state.send_if_modified(|state| {
            if *state == ExecutionState::Idle {
                *state = ExecutionState::Running;
                true
            } else {
                false
            }
        })
    }
}

#[async_trait]
impl Agent for ProcessAgent {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn max_run_time(&self) -> Duration {
        self.inner.config.max_run_time()
    }

    fn state(&self) -> ExecutionState {
        *self.inner.state.borrow()
    }

    async fn wait_idle(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == ExecutionState::Idle).await;
    }

    fn cursor(&self) -> EventCursor {
        self.inner.log.cursor()
    }

    fn subscribe(&self, from: EventCursor) -> EventSubscription {
        self.inner.log.subscribe(from)
    }

    async fn submit(&self, input: &str) -> Result<RequestId> {
        if self.inner.cancel.is_cancelled() {
            return Err(Error::ShutDown);
        }
        if !self.try_begin() {
            let request_id = self
                .inner
                .current
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(Error::Busy { request_id });
        }

        let request_id = RequestId::new();
        *self
            .inner
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(request_id.clone());
        self.inner.log.append(AgentEvent::InputStarted {
            request_id: request_id.clone(),
        });

        let inner = Arc::clone(&self.inner);
        let input = input.to_string();
        let id = request_id.clone();
        tokio::spawn(async move {
            inner.run(&input).await;
            inner.log.append(AgentEvent::InputCompleted { request_id: id });
            *inner.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
            inner.state.send_replace(ExecutionState::Idle);
        });

        Ok(request_id)
    }

    async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.wait_idle().await;
        self.inner.log.close();
        info!(agent = %self.inner.name, "agent shut down");
    }
}

impl Inner {
    async fn run(&self, input: &str) {
        let command = &self.config.command;
        debug!(agent = %self.name, command, "running agent command");

        let mut cmd = Command::new(command);
        cmd.args(&self.config.args);
        if let Some(ref dir) = self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd.envs(&self.config.env);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(agent = %self.name, command, error = %e, "failed to start agent command");
                self.log.append(AgentEvent::system(
                    SystemLevel::Error,
                    format!("failed to start {command}: {e}"),
                ));
                return;
            },
        };

        if let Some(mut stdin) = child.stdin.take() {
            let input = input.as_bytes().to_vec();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    debug!(error = %e, "agent closed stdin early");
                }
                let _ = stdin.shutdown().await;
            });
        }

        let mut stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
        let mut stderr = child.stderr.take().map(|s| BufReader::new(s).lines());
        let mut wrote_chat = false;

        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    let _ = child.kill().await;
                    self.log.append(AgentEvent::system(SystemLevel::Warning, "agent stopped"));
                    return;
                },
                line = next_line(&mut stdout), if stdout.is_some() => match line {
                    Some(line) => {
                        let text = if wrote_chat { format!("\n{line}") } else { line };
                        wrote_chat = true;
                        self.log.append(AgentEvent::Chat(text));
                    },
                    None => stdout = None,
                },
                line = next_line(&mut stderr), if stderr.is_some() => match line {
                    Some(line) => self.log.append(AgentEvent::system(SystemLevel::Warning, line)),
                    None => stderr = None,
                },
            }
        }

        let status = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                let _ = child.kill().await;
                return;
            },
            status = child.wait() => status,
        };
        match status {
            Ok(status) if status.success() => {},
            Ok(status) => {
                let code = status.code().unwrap_or(-1);
                warn!(agent = %self.name, command, code, "agent command failed");
                self.log.append(AgentEvent::system(
                    SystemLevel::Error,
                    format!("{command} exited with status {code}"),
                ));
            },
            Err(e) => {
                self.log.append(AgentEvent::system(
                    SystemLevel::Error,
                    format!("failed to wait for {command}: {e}"),
                ));
            },
        }
    }
}

async fn next_line<R>(lines: &mut Option<tokio::io::Lines<R>>) -> Option<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn agent(command: &str, args: &[&str]) -> ProcessAgent {
        ProcessAgent::new(
            "test",
            AgentConfig {
                command: command.into(),
                args: args.iter().map(|a| a.to_string()).collect(),
                max_run_time_secs: 5,
                ..Default::default()
            },
        )
    }

    async fn collect_turn(agent: &ProcessAgent, input: &str) -> Vec<AgentEvent> {
        let mut sub = agent.subscribe(agent.cursor());
        let request_id = agent.submit(input).await.unwrap();
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), sub.next())
                .await
                .unwrap()
                .unwrap();
            let done = event == AgentEvent::InputCompleted {
                request_id: request_id.clone(),
            };
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[tokio::test]
    async fn stdout_lines_become_chat() {
        let agent = agent("cat", &[]);
        let events = collect_turn(&agent, "hello\nworld").await;
        let chat: String = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Chat(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(chat, "hello\nworld");
        assert!(matches!(events[0], AgentEvent::InputStarted { .. }));
        agent.wait_idle().await;
        assert_eq!(agent.state(), ExecutionState::Idle);
    }

    #[tokio::test]
    async fn stderr_and_exit_code_become_system_messages() {
        let agent = agent("sh", &["-c", "echo oops >&2; exit 3"]);
        let events = collect_turn(&agent, "").await;
        assert!(events.contains(&AgentEvent::system(SystemLevel::Warning, "oops")));
        assert!(events.contains(&AgentEvent::system(
            SystemLevel::Error,
            "sh exited with status 3"
        )));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_and_completes() {
        let agent = agent("/nonexistent/switchboard-agent", &[]);
        let events = collect_turn(&agent, "hi").await;
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::System {
                level: SystemLevel::Error,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn second_submit_while_running_is_busy() {
        let agent = agent("sleep", &["5"]);
        agent.submit("").await.unwrap();
        assert_eq!(agent.state(), ExecutionState::Running);
        assert!(matches!(
            agent.submit("").await,
            Err(Error::Busy { .. })
        ));

        tokio::time::timeout(Duration::from_secs(5), agent.shutdown())
            .await
            .unwrap();
        assert_eq!(agent.state(), ExecutionState::Idle);
        assert!(matches!(agent.submit("").await, Err(Error::ShutDown)));
    }
}
