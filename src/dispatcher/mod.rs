// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command dispatch for one endpoint.
//!
//! The [`Dispatcher`] is the single entry point for talking to a device. It
//!
//! 1. serializes commands: writes hold the endpoint's exclusive lock, reads
//!    the shared side, so reads never observe a half-applied write and writes
//!    complete in submission order;
//! 2. routes each command to HTTP when the endpoint has a web interface and
//!    the command exists there, otherwise to SSH;
//! 3. obtains a session, logging in again exactly once if the device rejects
//!    it mid-command;
//! 4. retries transient failures with exponential backoff;
//! 5. decodes the answer into [`CommandOutput`].
//!
//! Port writes answer with the port list read back from the device after the
//! write, never with a locally patched copy.

mod retry;

pub use retry::RetryPolicy;

use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::{json, shell};
use crate::command::{Command, CommandOutput, CommandResult};
use crate::endpoint::{Endpoint, EndpointId};
use crate::error::{AuthError, DecodeError, TransportError};
use crate::protocol::{HttpTransport, ShellTransport, SshTransport, WebRequest, WebTransport};
use crate::session::{KeepalivePolicy, SessionManager};

/// How a command is carried out over HTTP.
#[derive(Debug)]
enum WebPlan {
    Ports,
    Sensors,
    Write(WebRequest),
}

/// How a command is carried out over SSH.
#[derive(Debug)]
enum ShellPlan {
    Ports,
    Sensors,
    DeviceInfo,
    PortWrite(String),
    Write(String),
    Raw(String),
}

#[derive(Debug)]
enum Plan {
    Web(WebPlan),
    Shell(ShellPlan),
}

/// Failure of a single attempt, before classification.
#[derive(Debug)]
enum Failure {
    Auth(AuthError),
    Transport(TransportError),
    Decode(DecodeError),
}

impl From<AuthError> for Failure {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Transport(e) => Self::Transport(e),
            other => Self::Auth(other),
        }
    }
}

impl From<TransportError> for Failure {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<DecodeError> for Failure {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

/// What the retry loop does next.
enum Verdict {
    Done(CommandResult),
    Reauthenticate(String),
    Retry(String, Option<u16>),
}

impl Failure {
    fn classify(self) -> Verdict {
        match self {
            Self::Auth(AuthError::Expired) => Verdict::Reauthenticate("session expired".into()),
            Self::Auth(e) => Verdict::Done(CommandResult::AuthFailed(e.to_string())),
            Self::Transport(e) if e.is_auth_rejection() => Verdict::Reauthenticate(e.to_string()),
            Self::Transport(e @ TransportError::SshAuthRejected(_)) => {
                Verdict::Done(CommandResult::AuthFailed(e.to_string()))
            }
            Self::Transport(e) if e.is_transient() => {
                let status = e.status();
                Verdict::Retry(e.to_string(), status)
            }
            Self::Transport(e) => Verdict::Done(CommandResult::Fatal(e.to_string())),
            Self::Decode(e) => Verdict::Done(CommandResult::Fatal(format!("decode error: {e}"))),
        }
    }
}

struct WebRoute<W> {
    transport: Arc<W>,
    session: Arc<SessionManager<W>>,
}

/// Executes commands against one endpoint.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
///
/// # Examples
///
/// ```no_run
/// use mpower_lib::command::{Command, CommandResult};
/// use mpower_lib::dispatcher::Dispatcher;
/// use mpower_lib::endpoint::Endpoint;
///
/// # async fn example() -> mpower_lib::Result<()> {
/// let endpoint = Endpoint::builder("192.168.1.20")
///     .with_credentials("ubnt", "ubnt")
///     .build()?;
/// let dispatcher = Dispatcher::connect(endpoint)?;
///
/// if let CommandResult::Ok(output) = dispatcher.execute(&Command::ReadStatus).await {
///     println!("{output:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct Dispatcher<W = HttpTransport, S = SshTransport> {
    endpoint: Endpoint,
    web: Option<WebRoute<W>>,
    shell: Option<Arc<S>>,
    retry: RetryPolicy,
    lock: RwLock<()>,
}

impl<W, S> std::fmt::Debug for Dispatcher<W, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("endpoint", &self.endpoint.id())
            .field("host", &self.endpoint.host())
            .field("transports", &self.endpoint.transports())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with the real HTTP and SSH transports enabled on
    /// the endpoint. No connection is made until the first command.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the HTTP client cannot be built.
    pub fn connect(endpoint: Endpoint) -> Result<Self, TransportError> {
        let web = endpoint
            .web()
            .is_some()
            .then(|| HttpTransport::new(&endpoint))
            .transpose()?;
        let shell = endpoint
            .ssh()
            .is_some()
            .then(|| SshTransport::new(&endpoint))
            .transpose()?;
        Ok(Self::with_transports(endpoint, web, shell))
    }
}

impl<W: WebTransport, S: ShellTransport> Dispatcher<W, S> {
    /// Creates a dispatcher over the given transports.
    #[must_use]
    pub fn with_transports(endpoint: Endpoint, web: Option<W>, shell: Option<S>) -> Self {
        let web = web.map(|transport| {
            let transport = Arc::new(transport);
            let session = SessionManager::new(
                endpoint.id(),
                Arc::clone(&transport),
                endpoint.credentials().clone(),
            );
            WebRoute {
                transport,
                session: Arc::new(session),
            }
        });
        Self {
            endpoint,
            web,
            shell: shell.map(Arc::new),
            retry: RetryPolicy::default(),
            lock: RwLock::new(()),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the session keep-alive policy.
    #[must_use]
    pub fn with_keepalive(mut self, keepalive: KeepalivePolicy) -> Self {
        if let Some(web) = self.web.as_mut() {
            let session = SessionManager::new(
                self.endpoint.id(),
                Arc::clone(&web.transport),
                self.endpoint.credentials().clone(),
            )
            .with_keepalive(keepalive);
            web.session = Arc::new(session);
        }
        self
    }

    /// Returns the endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the endpoint id.
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.endpoint.id()
    }

    /// Returns the web session manager, if the endpoint has a web interface.
    #[must_use]
    pub fn session(&self) -> Option<&Arc<SessionManager<W>>> {
        self.web.as_ref().map(|web| &web.session)
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn plan(&self, command: &Command) -> Option<Plan> {
        let web = self.web.is_some();
        let shell = self.shell.is_some();

        match command {
            Command::ReadStatus if web => Some(Plan::Web(WebPlan::Ports)),
            Command::ReadSensors if web => Some(Plan::Web(WebPlan::Sensors)),
            Command::SetPortState { port, state } if web => {
                Some(Plan::Web(WebPlan::Write(json::encode_set_port(*port, *state))))
            }
            Command::SetPortLock { port, locked } if web => {
                Some(Plan::Web(WebPlan::Write(json::encode_set_lock(*port, *locked))))
            }
            _ if !shell => None,
            Command::ReadStatus => Some(Plan::Shell(ShellPlan::Ports)),
            Command::ReadSensors => Some(Plan::Shell(ShellPlan::Sensors)),
            Command::SetPortState { port, state } => Some(Plan::Shell(ShellPlan::PortWrite(
                shell::set_relay_command(*port, *state),
            ))),
            Command::SetPortLock { port, locked } => Some(Plan::Shell(ShellPlan::PortWrite(
                shell::set_lock_command(*port, *locked),
            ))),
            Command::SetLed(led) => Some(Plan::Shell(ShellPlan::Write(shell::set_led_command(*led)))),
            Command::ReadDeviceInfo => Some(Plan::Shell(ShellPlan::DeviceInfo)),
            Command::RawShellCommand(text) => Some(Plan::Shell(ShellPlan::Raw(text.clone()))),
        }
    }

    /// Executes a command.
    ///
    /// Never panics and never returns an untyped error: every outcome is a
    /// [`CommandResult`] variant.
    pub async fn execute(&self, command: &Command) -> CommandResult {
        self.dispatch(command, None).await
    }

    /// Executes a command, holding a permit of `limiter` for each transport
    /// attempt.
    ///
    /// The permit is released while the command backs off between attempts,
    /// so a failing device does not keep others sharing the limiter waiting.
    pub async fn execute_limited(&self, command: &Command, limiter: &Semaphore) -> CommandResult {
        self.dispatch(command, Some(limiter)).await
    }

    async fn dispatch(&self, command: &Command, limiter: Option<&Semaphore>) -> CommandResult {
        let Some(plan) = self.plan(command) else {
            return CommandResult::CapabilityUnsupported {
                command: command.name(),
                transport: self.endpoint.transports(),
            };
        };

        let result = if command.is_mutating() {
            let _guard = self.lock.write().await;
            self.run_with_retry(command, &plan, limiter).await
        } else {
            let _guard = self.lock.read().await;
            self.run_with_retry(command, &plan, limiter).await
        };

        match &result {
            CommandResult::Ok(_) => {
                tracing::debug!(endpoint = %self.endpoint.id(), command = %command, "Command succeeded");
            }
            failure => {
                tracing::warn!(endpoint = %self.endpoint.id(), command = %command, result = ?failure, "Command failed");
            }
        }
        result
    }

    async fn run_with_retry(
        &self,
        command: &Command,
        plan: &Plan,
        limiter: Option<&Semaphore>,
    ) -> CommandResult {
        let mut failures: u32 = 0;
        let mut reauthenticated = false;
        let mut last_status: Option<(u16, u32)> = None;

        loop {
            let mut token = None;
            let outcome = {
                let _permit = match limiter {
                    Some(limiter) => match limiter.acquire().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return CommandResult::Fatal("concurrency limiter closed".into()),
                    },
                    None => None,
                };
                self.attempt(plan, &mut token).await
            };

            let failure = match outcome {
                Ok(output) => {
                    if let Some(web) = &self.web {
                        if matches!(plan, Plan::Web(_)) {
                            web.session.touch();
                        }
                    }
                    return CommandResult::Ok(output);
                }
                Err(failure) => failure,
            };

            match failure.classify() {
                Verdict::Done(result) => return result,
                Verdict::Reauthenticate(reason) => {
                    if let (Some(web), Some(token)) = (&self.web, token.as_deref()) {
                        web.session.invalidate(token);
                    }
                    if reauthenticated {
                        return CommandResult::AuthFailed(format!(
                            "session rejected again after a fresh login: {reason}"
                        ));
                    }
                    tracing::debug!(endpoint = %self.endpoint.id(), command = %command, "Session rejected, logging in again");
                    reauthenticated = true;
                }
                Verdict::Retry(reason, status) => {
                    failures += 1;

                    if let Some(status) = status {
                        let count = match last_status {
                            Some((previous, count)) if previous == status => count + 1,
                            _ => 1,
                        };
                        last_status = Some((status, count));
                        if count >= self.retry.max_identical_rejections {
                            return CommandResult::Fatal(format!(
                                "device answered HTTP {status} {count} times in a row"
                            ));
                        }
                    } else {
                        last_status = None;
                    }

                    if !self.retry.should_retry(failures) {
                        return CommandResult::Transient(reason);
                    }

                    let delay = self.retry.delay_for_attempt(failures - 1);
                    tracing::warn!(
                        endpoint = %self.endpoint.id(),
                        command = %command,
                        attempt = failures,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %reason,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Runs one attempt. `token` receives the session token a web attempt
    /// used, so a rejection expires that session and no newer one.
    async fn attempt(&self, plan: &Plan, token: &mut Option<String>) -> Result<CommandOutput, Failure> {
        match plan {
            Plan::Web(plan) => self.attempt_web(plan, token).await,
            Plan::Shell(plan) => self.attempt_shell(plan).await,
        }
    }

    // ========================================================================
    // HTTP
    // ========================================================================

    async fn attempt_web(
        &self,
        plan: &WebPlan,
        used: &mut Option<String>,
    ) -> Result<CommandOutput, Failure> {
        let web = self
            .web
            .as_ref()
            .ok_or(TransportError::NotConfigured("HTTP"))?;
        let session = web.session.ensure_session().await?;
        let token = session.token();
        *used = token.map(ToString::to_string);

        match plan {
            WebPlan::Ports => Ok(CommandOutput::Ports(json::decode_status(
                &Self::read_sensors(web, token).await?,
            )?)),
            WebPlan::Sensors => Ok(CommandOutput::Sensors(json::decode_sensors(
                &Self::read_sensors(web, token).await?,
            )?)),
            WebPlan::Write(request) => {
                let body = web.transport.send(request, token).await?.into_body()?;
                json::decode_ack(&body)?;
                Ok(CommandOutput::Ports(json::decode_status(
                    &Self::read_sensors(web, token).await?,
                )?))
            }
        }
    }

    async fn read_sensors(web: &WebRoute<W>, token: Option<&str>) -> Result<Vec<u8>, TransportError> {
        let request = WebRequest::get(json::SENSORS_PATH);
        web.transport.send(&request, token).await?.into_body()
    }

    // ========================================================================
    // SSH
    // ========================================================================

    async fn attempt_shell(&self, plan: &ShellPlan) -> Result<CommandOutput, Failure> {
        let shell = self
            .shell
            .as_ref()
            .ok_or(TransportError::NotConfigured("SSH"))?;

        match plan {
            ShellPlan::Ports => Ok(CommandOutput::Ports(shell::decode_ports(
                &shell.run(&shell::read_ports_command()).await?,
            )?)),
            ShellPlan::Sensors => Ok(CommandOutput::Sensors(shell::decode_sensors(
                &shell.run(&shell::read_ports_command()).await?,
            )?)),
            ShellPlan::DeviceInfo => Ok(CommandOutput::DeviceInfo(shell::decode_device_info(
                &shell.run(&shell::read_device_info_command()).await?,
            )?)),
            ShellPlan::PortWrite(command) => {
                shell.run(command).await?;
                Ok(CommandOutput::Ports(shell::decode_ports(
                    &shell.run(&shell::read_ports_command()).await?,
                )?))
            }
            ShellPlan::Write(command) => {
                shell.run(command).await?;
                Ok(CommandOutput::Ack)
            }
            ShellPlan::Raw(command) => Ok(CommandOutput::Text(shell.run(command).await?)),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Logs out of the web session and closes the SSH connection.
    pub async fn close(&self) {
        let _guard = self.lock.write().await;
        if let Some(web) = &self.web {
            web.session.logout().await;
        }
        if let Some(shell) = &self.shell {
            shell.close().await;
        }
    }
}

impl<W: WebTransport + 'static, S: ShellTransport> Dispatcher<W, S> {
    /// Starts the web session keep-alive task, if the endpoint has a web
    /// interface.
    pub fn spawn_keepalive(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        self.web
            .as_ref()
            .map(|web| web.session.spawn_keepalive(cancel))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::codec::json::SENSORS_PATH;
    use crate::protocol::fake::{ScriptedShell, ScriptedWeb, SingleSessionWeb, Step};
    use crate::protocol::{LOGIN_PATH, WebMethod};
    use crate::types::{LedState, PortId, RelayState};

    const SENSORS_ON: &str = r#"{"sensors":[{"port":1,"output":1,"power":4.0},{"port":2,"output":1}],"status":"success"}"#;
    const SENSORS_OFF: &str = r#"{"sensors":[{"port":1,"output":1,"power":4.0},{"port":2,"output":0}],"status":"success"}"#;

    fn web_endpoint() -> Endpoint {
        Endpoint::builder("10.0.0.2")
            .with_credentials("ubnt", "ubnt")
            .build()
            .unwrap()
    }

    fn ssh_endpoint() -> Endpoint {
        Endpoint::builder("10.0.0.2")
            .with_credentials("ubnt", "ubnt")
            .without_web()
            .with_ssh()
            .build()
            .unwrap()
    }

    fn logged_in(web: ScriptedWeb) -> ScriptedWeb {
        web.on(LOGIN_PATH, [Step::redirect("/power")])
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(4)
            .with_initial_delay(Duration::from_millis(10))
            .with_max_identical_rejections(3)
    }

    fn web_dispatcher(web: ScriptedWeb) -> Dispatcher<ScriptedWeb, ScriptedShell> {
        Dispatcher::with_transports(web_endpoint(), Some(web), None).with_retry(fast_retry())
    }

    fn web_of(dispatcher: &Dispatcher<ScriptedWeb, ScriptedShell>) -> &ScriptedWeb {
        &dispatcher.web.as_ref().unwrap().transport
    }

    fn port_output(outputs: &str) -> String {
        let sep = crate::codec::shell::RECORD_SEPARATOR.to_string();
        ["port.0.label=Fan\n", "", "", "", "1.5\n0.0\n", "", outputs, "0\n0\n"].join(&sep)
    }

    #[tokio::test]
    async fn read_status_logs_in_once() {
        let dispatcher = web_dispatcher(logged_in(
            ScriptedWeb::new().on(SENSORS_PATH, [Step::json(200, SENSORS_ON)]),
        ));

        for _ in 0..3 {
            let ports = dispatcher
                .execute(&Command::ReadStatus)
                .await
                .into_result()
                .unwrap()
                .into_ports()
                .unwrap();
            assert_eq!(ports.len(), 2);
        }

        let web = web_of(&dispatcher);
        assert_eq!(web.count(LOGIN_PATH), 1);
        assert_eq!(web.count(SENSORS_PATH), 3);
        assert!(
            dispatcher
                .session()
                .unwrap()
                .session()
                .last_used()
                .is_some()
        );
    }

    #[tokio::test]
    async fn reads_are_idempotent() {
        let dispatcher = web_dispatcher(logged_in(
            ScriptedWeb::new().on(SENSORS_PATH, [Step::json(200, SENSORS_ON)]),
        ));

        let first = dispatcher.execute(&Command::ReadSensors).await;
        let second = dispatcher.execute(&Command::ReadSensors).await;
        let kinds = |r: CommandResult| {
            r.into_result()
                .unwrap()
                .into_sensors()
                .unwrap()
                .into_iter()
                .map(|s| (s.port, s.kind, s.value))
                .collect::<Vec<_>>()
        };
        assert_eq!(kinds(first), kinds(second));
    }

    #[tokio::test]
    async fn rejected_session_logs_in_again_once() {
        let dispatcher = web_dispatcher(logged_in(ScriptedWeb::new().on(
            SENSORS_PATH,
            [Step::json(401, ""), Step::json(200, SENSORS_ON)],
        )));

        assert!(dispatcher.execute(&Command::ReadStatus).await.is_ok());

        let web = web_of(&dispatcher);
        assert_eq!(web.count(LOGIN_PATH), 2);
        assert_eq!(web.count(SENSORS_PATH), 2);
    }

    #[tokio::test]
    async fn redirect_to_login_counts_as_rejection() {
        let dispatcher = web_dispatcher(logged_in(ScriptedWeb::new().on(
            SENSORS_PATH,
            [Step::redirect("/login.cgi?uri=/mfi/sensors.cgi"), Step::json(200, SENSORS_ON)],
        )));

        assert!(dispatcher.execute(&Command::ReadStatus).await.is_ok());
        assert_eq!(web_of(&dispatcher).count(LOGIN_PATH), 2);
    }

    #[tokio::test]
    async fn second_rejection_is_auth_failure() {
        let dispatcher = web_dispatcher(logged_in(
            ScriptedWeb::new().on(SENSORS_PATH, [Step::json(403, "")]),
        ));

        let result = dispatcher.execute(&Command::ReadStatus).await;
        assert!(matches!(result, CommandResult::AuthFailed(_)), "{result:?}");

        let web = web_of(&dispatcher);
        assert_eq!(web.count(LOGIN_PATH), 2);
        assert_eq!(web.count(SENSORS_PATH), 2);
    }

    #[tokio::test]
    async fn concurrent_rejections_share_one_login() {
        let dispatcher: Dispatcher<SingleSessionWeb, ScriptedShell> =
            Dispatcher::with_transports(web_endpoint(), Some(SingleSessionWeb::new(SENSORS_ON)), None)
                .with_retry(fast_retry());
        assert!(dispatcher.execute(&Command::ReadStatus).await.is_ok());

        dispatcher.web.as_ref().unwrap().transport.forget_sessions();
        let (a, b) = tokio::join!(
            dispatcher.execute(&Command::ReadStatus),
            dispatcher.execute(&Command::ReadStatus)
        );

        assert!(a.is_ok(), "{a:?}");
        assert!(b.is_ok(), "{b:?}");
        assert_eq!(dispatcher.web.as_ref().unwrap().transport.logins(), 2);
    }

    #[tokio::test]
    async fn bad_credentials_are_auth_failure() {
        let dispatcher = web_dispatcher(
            ScriptedWeb::new()
                .on(LOGIN_PATH, [Step::redirect("/login.cgi")])
                .on(SENSORS_PATH, [Step::json(200, SENSORS_ON)]),
        );

        let result = dispatcher.execute(&Command::ReadStatus).await;
        assert!(matches!(result, CommandResult::AuthFailed(_)), "{result:?}");
        assert_eq!(web_of(&dispatcher).count(SENSORS_PATH), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_below_cap_recover() {
        let dispatcher = web_dispatcher(logged_in(ScriptedWeb::new().on(
            SENSORS_PATH,
            [
                Step::Timeout,
                Step::Timeout,
                Step::Timeout,
                Step::json(200, SENSORS_ON),
            ],
        )));

        assert!(dispatcher.execute(&Command::ReadStatus).await.is_ok());
        assert_eq!(web_of(&dispatcher).count(SENSORS_PATH), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_at_cap_are_transient() {
        let dispatcher = web_dispatcher(logged_in(
            ScriptedWeb::new().on(SENSORS_PATH, [Step::Timeout]),
        ));

        let result = dispatcher.execute(&Command::ReadStatus).await;
        assert!(matches!(result, CommandResult::Transient(_)), "{result:?}");
        assert_eq!(web_of(&dispatcher).count(SENSORS_PATH), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn login_timeouts_are_retried() {
        let dispatcher = web_dispatcher(
            ScriptedWeb::new()
                .on(LOGIN_PATH, [Step::Timeout, Step::redirect("/power")])
                .on(SENSORS_PATH, [Step::json(200, SENSORS_ON)]),
        );

        assert!(dispatcher.execute(&Command::ReadStatus).await.is_ok());
        assert_eq!(web_of(&dispatcher).count(LOGIN_PATH), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn identical_rejections_escalate_to_fatal() {
        let dispatcher = web_dispatcher(logged_in(
            ScriptedWeb::new().on(SENSORS_PATH, [Step::json(503, "busy")]),
        ));

        let result = dispatcher.execute(&Command::ReadStatus).await;
        assert!(matches!(result, CommandResult::Fatal(_)), "{result:?}");
        assert_eq!(web_of(&dispatcher).count(SENSORS_PATH), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn differing_statuses_do_not_escalate() {
        let dispatcher = web_dispatcher(logged_in(ScriptedWeb::new().on(
            SENSORS_PATH,
            [
                Step::json(503, ""),
                Step::json(502, ""),
                Step::json(503, ""),
                Step::json(200, SENSORS_ON),
            ],
        )));

        assert!(dispatcher.execute(&Command::ReadStatus).await.is_ok());
    }

    #[tokio::test]
    async fn undecodable_answer_is_fatal() {
        let dispatcher = web_dispatcher(logged_in(
            ScriptedWeb::new().on(SENSORS_PATH, [Step::json(200, "<html>oops</html>")]),
        ));

        let result = dispatcher.execute(&Command::ReadStatus).await;
        assert!(matches!(result, CommandResult::Fatal(_)), "{result:?}");
        assert_eq!(web_of(&dispatcher).count(SENSORS_PATH), 1);
    }

    #[tokio::test]
    async fn web_write_returns_state_read_back() {
        let dispatcher = web_dispatcher(logged_in(
            ScriptedWeb::new()
                .on("/sensors/2", [Step::json(200, r#"{"status":"success"}"#)])
                .on(SENSORS_PATH, [Step::json(200, SENSORS_OFF)]),
        ));

        let ports = dispatcher
            .execute(&Command::SetPortState {
                port: PortId::new(2).unwrap(),
                state: RelayState::Off,
            })
            .await
            .into_result()
            .unwrap()
            .into_ports()
            .unwrap();
        assert_eq!(ports[1].relay, RelayState::Off);

        let requests = web_of(&dispatcher).requests();
        let paths: Vec<_> = requests.iter().map(|(r, _)| r.path.as_str()).collect();
        assert_eq!(paths, [LOGIN_PATH, "/sensors/2", SENSORS_PATH]);
        assert_eq!(requests[1].0.method, WebMethod::Put);
        assert_eq!(requests[1].0.form, [("output", "0".to_string())]);
        assert!(requests[1].1.is_some());
    }

    #[tokio::test]
    async fn refused_write_is_fatal() {
        let dispatcher = web_dispatcher(logged_in(
            ScriptedWeb::new().on("/sensors/1", [Step::json(200, r#"{"status":"error"}"#)]),
        ));

        let result = dispatcher
            .execute(&Command::SetPortLock {
                port: PortId::new(1).unwrap(),
                locked: true,
            })
            .await;
        assert!(matches!(result, CommandResult::Fatal(_)), "{result:?}");
        assert_eq!(web_of(&dispatcher).count(SENSORS_PATH), 0);
    }

    #[tokio::test]
    async fn writes_do_not_interleave() {
        let dispatcher = web_dispatcher(logged_in(
            ScriptedWeb::new()
                .on("/sensors/1", [Step::json(200, "")])
                .on("/sensors/2", [Step::json(200, "")])
                .on(SENSORS_PATH, [Step::json(200, SENSORS_ON)]),
        ));
        let on = |port| Command::SetPortState {
            port: PortId::new(port).unwrap(),
            state: RelayState::On,
        };

        let (first, second) = (on(1), on(2));
        let (a, b) = tokio::join!(dispatcher.execute(&first), dispatcher.execute(&second));
        assert!(a.is_ok() && b.is_ok());

        let paths: Vec<_> = web_of(&dispatcher)
            .requests()
            .into_iter()
            .map(|(r, _)| r.path)
            .filter(|p| p != LOGIN_PATH)
            .collect();
        assert_eq!(paths, ["/sensors/1", SENSORS_PATH, "/sensors/2", SENSORS_PATH]);
    }

    #[tokio::test]
    async fn shell_only_command_without_ssh_is_unsupported() {
        let dispatcher = web_dispatcher(ScriptedWeb::new());

        let result = dispatcher.execute(&Command::SetLed(LedState::Blue)).await;
        assert_eq!(
            result,
            CommandResult::CapabilityUnsupported {
                command: "SetLed",
                transport: "HTTP",
            }
        );
        assert!(web_of(&dispatcher).requests().is_empty());
    }

    #[tokio::test]
    async fn ssh_write_runs_echo_then_reads_back() {
        let shell = ScriptedShell::new()
            .on("echo 0 > /proc/power/relay2", "")
            .on("cd /tmp", &port_output("1\n0\n"));
        let dispatcher: Dispatcher<ScriptedWeb, ScriptedShell> =
            Dispatcher::with_transports(ssh_endpoint(), None, Some(shell));

        let ports = dispatcher
            .execute(&Command::SetPortState {
                port: PortId::new(2).unwrap(),
                state: RelayState::Off,
            })
            .await
            .into_result()
            .unwrap()
            .into_ports()
            .unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[1].relay, RelayState::Off);
        assert_eq!(ports[0].label.as_deref(), Some("Fan"));

        let commands = dispatcher.shell.as_ref().unwrap().commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], "echo 0 > /proc/power/relay2");
        assert!(commands[1].starts_with("cd /tmp"));
    }

    #[tokio::test]
    async fn ssh_led_and_raw_commands() {
        let shell = ScriptedShell::new()
            .on("echo 1 > /proc/led/status", "")
            .on("uptime", " 12:00:01 up 3 days\n");
        let dispatcher: Dispatcher<ScriptedWeb, ScriptedShell> =
            Dispatcher::with_transports(ssh_endpoint(), None, Some(shell));

        let led = dispatcher.execute(&Command::SetLed(LedState::Blue)).await;
        assert_eq!(led, CommandResult::Ok(CommandOutput::Ack));

        let raw = dispatcher
            .execute(&Command::RawShellCommand("uptime".into()))
            .await
            .into_result()
            .unwrap()
            .into_text()
            .unwrap();
        assert!(raw.contains("up 3 days"));
    }

    #[tokio::test]
    async fn failing_remote_command_is_fatal() {
        let dispatcher: Dispatcher<ScriptedWeb, ScriptedShell> =
            Dispatcher::with_transports(ssh_endpoint(), None, Some(ScriptedShell::new()));

        let result = dispatcher
            .execute(&Command::RawShellCommand("nonexistent".into()))
            .await;
        assert!(matches!(result, CommandResult::Fatal(_)), "{result:?}");
    }

    #[tokio::test]
    async fn web_preferred_when_both_configured() {
        let endpoint = Endpoint::builder("10.0.0.2")
            .with_credentials("ubnt", "ubnt")
            .with_ssh()
            .build()
            .unwrap();
        let dispatcher = Dispatcher::with_transports(
            endpoint,
            Some(logged_in(
                ScriptedWeb::new().on(SENSORS_PATH, [Step::json(200, SENSORS_ON)]),
            )),
            Some(ScriptedShell::new()),
        );

        assert!(dispatcher.execute(&Command::ReadStatus).await.is_ok());
        assert!(dispatcher.shell.as_ref().unwrap().commands().is_empty());
    }

    #[tokio::test]
    async fn close_logs_out() {
        let dispatcher = web_dispatcher(logged_in(
            ScriptedWeb::new()
                .on(SENSORS_PATH, [Step::json(200, SENSORS_ON)])
                .on(crate::protocol::LOGOUT_PATH, [Step::json(200, "")]),
        ));
        assert!(dispatcher.execute(&Command::ReadStatus).await.is_ok());

        dispatcher.close().await;
        assert_eq!(web_of(&dispatcher).count(crate::protocol::LOGOUT_PATH), 1);
    }
}
