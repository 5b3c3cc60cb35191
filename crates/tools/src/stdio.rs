//! Stdio provider connection — an MCP server running as a child process.
//!
//! The child speaks newline-delimited JSON-RPC 2.0 on its stdin/stdout.
//! `start()` spawns it, performs the `initialize` handshake, sends the
//! `notifications/initialized` notification and caches the result of
//! `tools/list`. Every request is bounded by the connection's timeout.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use stepwise_config::ConnectionConfig;
use stepwise_core::connection::{ConnectionState, ProviderConnection};
use stepwise_core::error::{ConnectionError, ToolError};
use stepwise_core::tool::ToolDescriptor;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// How long `stop()` waits for the child to exit after closing its stdin.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A provider reached over a child process' stdio.
pub struct StdioConnection {
    name: String,
    description: String,
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Duration,
    state: ConnectionState,
    session: Option<Session>,
    tools: Vec<ToolDescriptor>,
}

struct Session {
    child: Child,
    io: Mutex<SessionIo>,
}

struct SessionIo {
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl StdioConnection {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            program: program.into(),
            args,
            env: HashMap::new(),
            timeout: Duration::from_secs(60),
            state: ConnectionState::Uninitialized,
            session: None,
            tools: Vec::new(),
        }
    }

    /// A provider published as an npm package, run through `npx -y`.
    pub fn from_npx(
        name: impl Into<String>,
        package: impl Into<String>,
        suffix_args: Vec<String>,
    ) -> Self {
        let mut args = vec!["-y".to_string(), package.into()];
        args.extend(suffix_args);
        Self::new(name, "npx", args)
    }

    /// Build a connection from its `[providers.<alias>]` section.
    pub fn from_config(alias: &str, config: &ConnectionConfig) -> Self {
        let (program, args) = config.command_line();
        Self::new(alias, program, args)
            .with_description(config.description.clone())
            .with_env(config.env.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn protocol_error(&self, reason: impl Into<String>) -> ConnectionError {
        ConnectionError::Protocol {
            connection: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn io_error(&self, reason: impl std::fmt::Display) -> ConnectionError {
        ConnectionError::Io {
            connection: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn session(&self) -> Result<&Session, ConnectionError> {
        match (&self.state, &self.session) {
            (ConnectionState::Started, Some(session)) => Ok(session),
            (ConnectionState::Stopped, _) => Err(ConnectionError::Stopped(self.name.clone())),
            _ => Err(ConnectionError::NotStarted(self.name.clone())),
        }
    }

    async fn write_message(&self, io: &mut SessionIo, message: &Value) -> Result<(), ConnectionError> {
        let stdin = io
            .stdin
            .as_mut()
            .ok_or_else(|| self.io_error("stdin already closed"))?;
        let mut line = serde_json::to_string(message).map_err(|e| self.protocol_error(e.to_string()))?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await.map_err(|e| self.io_error(e))?;
        stdin.flush().await.map_err(|e| self.io_error(e))
    }

    /// Send a request and wait for the response carrying the same id.
    async fn request_on(
        &self,
        session: &Session,
        method: &str,
        params: Value,
    ) -> Result<Value, ConnectionError> {
        let mut io = session.io.lock().await;
        io.next_id += 1;
        let id = io.next_id;

        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(connection = %self.name, method, id, "Sending request");
        self.write_message(&mut io, &message).await?;

        let read = async {
            loop {
                let line = io
                    .stdout
                    .next_line()
                    .await
                    .map_err(|e| self.io_error(e))?
                    .ok_or_else(|| self.io_error("provider closed its stdout"))?;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let Ok(frame) = serde_json::from_str::<Value>(line) else {
                    // Some servers log to stdout
                    debug!(connection = %self.name, line, "Skipping non-JSON output");
                    continue;
                };

                if frame.get("id").and_then(Value::as_u64) != Some(id) || frame.get("method").is_some() {
                    trace!(connection = %self.name, "Skipping notification or unrelated frame");
                    continue;
                }

                if let Some(error) = frame.get("error") {
                    let message = error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error");
                    return Err(self.protocol_error(format!("{method} failed: {message}")));
                }

                return Ok(frame.get("result").cloned().unwrap_or(Value::Null));
            }
        };

        match tokio::time::timeout(self.timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout {
                connection: self.name.clone(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }

    async fn notify_on(&self, session: &Session, method: &str) -> Result<(), ConnectionError> {
        let mut io = session.io.lock().await;
        let message = json!({ "jsonrpc": "2.0", "method": method });
        self.write_message(&mut io, &message).await
    }

    async fn handshake(&self, session: &Session) -> Result<Vec<ToolDescriptor>, ConnectionError> {
        let init = self
            .request_on(
                session,
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "stepwise",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;
        debug!(
            connection = %self.name,
            server = %init["serverInfo"]["name"].as_str().unwrap_or("unknown"),
            "Initialize handshake complete"
        );

        self.notify_on(session, "notifications/initialized").await?;

        let listed = self.request_on(session, "tools/list", json!({})).await?;
        parse_tool_list(&listed).map_err(|reason| self.protocol_error(reason))
    }
}

fn parse_tool_list(result: &Value) -> Result<Vec<ToolDescriptor>, String> {
    let tools = result
        .get("tools")
        .cloned()
        .ok_or_else(|| "tools/list result has no 'tools' field".to_string())?;
    serde_json::from_value(tools).map_err(|e| format!("invalid tool descriptor: {e}"))
}

/// Join the text items of a `tools/call` result.
fn render_call_result(result: &Value) -> String {
    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return result.to_string();
    };
    content
        .iter()
        .filter_map(|item| match item.get("type").and_then(Value::as_str) {
            Some("text") => item.get("text").and_then(Value::as_str).map(str::to_string),
            Some(other) => Some(format!("[{other} content]")),
            None => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ProviderConnection for StdioConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn start(&mut self) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Uninitialized {
            return Err(ConnectionError::AlreadyStarted(self.name.clone()));
        }

        info!(connection = %self.name, program = %self.program, "Starting provider");

        let spawned = Command::new(&self.program)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.state = ConnectionState::Stopped;
                return Err(ConnectionError::StartFailed {
                    connection: self.name.clone(),
                    reason: format!("failed to spawn '{}': {e}", self.program),
                });
            }
        };

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill().await;
            self.state = ConnectionState::Stopped;
            return Err(ConnectionError::StartFailed {
                connection: self.name.clone(),
                reason: "child stdio was not captured".into(),
            });
        };

        let session = Session {
            child,
            io: Mutex::new(SessionIo {
                stdin: Some(stdin),
                stdout: BufReader::new(stdout).lines(),
                next_id: 0,
            }),
        };

        match self.handshake(&session).await {
            Ok(tools) => {
                info!(connection = %self.name, tools = tools.len(), "Provider started");
                self.tools = tools;
                self.session = Some(session);
                self.state = ConnectionState::Started;
                Ok(())
            }
            Err(e) => {
                let mut session = session;
                let _ = session.child.kill().await;
                self.state = ConnectionState::Stopped;
                Err(ConnectionError::StartFailed {
                    connection: self.name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn stop(&mut self) -> Result<(), ConnectionError> {
        self.state = ConnectionState::Stopped;
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        // Closing stdin asks a well-behaved server to exit
        session.io.get_mut().stdin.take();

        match tokio::time::timeout(SHUTDOWN_GRACE, session.child.wait()).await {
            Ok(Ok(status)) => {
                info!(connection = %self.name, %status, "Provider stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = session.child.kill().await;
                Err(self.io_error(e))
            }
            Err(_) => {
                warn!(connection = %self.name, "Provider did not exit, killing");
                session.child.kill().await.map_err(|e| self.io_error(e))
            }
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ConnectionError> {
        self.session()?;
        Ok(self.tools.clone())
    }

    async fn invoke(&self, tool_name: &str, arguments: Value) -> Result<String, ToolError> {
        let session = self.session()?;
        let result = self
            .request_on(
                session,
                "tools/call",
                json!({ "name": tool_name, "arguments": arguments }),
            )
            .await?;

        let text = render_call_result(&result);
        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            return Err(ToolError::ExecutionFailed {
                tool_name: tool_name.to_string(),
                reason: text,
            });
        }
        Ok(text)
    }
}
