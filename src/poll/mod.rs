// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic polling of many endpoints.
//!
//! Each endpoint runs its own schedule; results of all endpoints are merged
//! into one stream in completion order. A shared semaphore bounds how many
//! transport attempts are in flight at once; an endpoint backing off between
//! retries holds no permit.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use futures::StreamExt;
//! use mpower_lib::dispatcher::Dispatcher;
//! use mpower_lib::endpoint::Endpoint;
//! use mpower_lib::poll::{PollOptions, Poller};
//!
//! # async fn example() -> mpower_lib::Result<()> {
//! let endpoint = Endpoint::builder("192.168.1.20")
//!     .with_credentials("ubnt", "ubnt")
//!     .build()?;
//! let dispatchers = vec![Arc::new(Dispatcher::connect(endpoint)?)];
//!
//! let poller = Poller::new(PollOptions::default().with_interval(Duration::from_secs(5)));
//! let mut results = std::pin::pin!(poller.poll(&dispatchers));
//! while let Some(result) = results.next().await {
//!     println!("{}: {:?}", result.endpoint, result.result);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::Stream;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandResult};
use crate::dispatcher::Dispatcher;
use crate::endpoint::EndpointId;
use crate::protocol::{ShellTransport, WebTransport};

/// Polling configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    interval: Duration,
    max_concurrency: usize,
    sensors: bool,
}

impl PollOptions {
    /// Default time between two cycles of one endpoint.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
    /// Default number of commands in flight across all endpoints.
    pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

    /// Sets the time between two cycles of one endpoint (at least 1 ms).
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Sets the number of commands in flight across all endpoints (at least 1).
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Also issues `ReadSensors` every cycle.
    #[must_use]
    pub fn with_sensors(mut self, sensors: bool) -> Self {
        self.sensors = sensors;
        self
    }

    /// Returns the cycle interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the concurrency bound.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Returns whether sensors are read every cycle.
    #[must_use]
    pub fn sensors(&self) -> bool {
        self.sensors
    }

    fn commands(&self) -> Arc<[Command]> {
        if self.sensors {
            Arc::from([Command::ReadStatus, Command::ReadSensors])
        } else {
            Arc::from([Command::ReadStatus])
        }
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            max_concurrency: Self::DEFAULT_MAX_CONCURRENCY,
            sensors: false,
        }
    }
}

/// One polled command.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    /// The endpoint the command ran against.
    pub endpoint: EndpointId,
    /// The command.
    pub command: Command,
    /// Its outcome.
    pub result: CommandResult,
    /// When the command completed.
    pub polled_at: DateTime<Utc>,
}

/// Polls a set of endpoints until cancelled.
#[derive(Debug)]
pub struct Poller {
    options: PollOptions,
    cancel: parking_lot::Mutex<CancellationToken>,
}

impl Poller {
    /// Creates a poller.
    #[must_use]
    pub fn new(options: PollOptions) -> Self {
        Self {
            options,
            cancel: parking_lot::Mutex::new(CancellationToken::new()),
        }
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Starts polling and returns the merged result stream.
    ///
    /// The stream never ends on its own. After [`cancel`](Self::cancel) each
    /// endpoint finishes its current cycle and the stream then ends; calling
    /// `poll` again starts a new run.
    pub fn poll<W, S>(
        &self,
        dispatchers: &[Arc<Dispatcher<W, S>>],
    ) -> impl Stream<Item = PollResult> + Send + use<W, S>
    where
        W: WebTransport + 'static,
        S: ShellTransport + 'static,
    {
        let cancel = {
            let mut token = self.cancel.lock();
            if token.is_cancelled() {
                *token = CancellationToken::new();
            }
            token.clone()
        };
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency));
        let commands = self.options.commands();

        tracing::debug!(
            endpoints = dispatchers.len(),
            interval_ms = u64::try_from(self.options.interval.as_millis()).unwrap_or(u64::MAX),
            max_concurrency = self.options.max_concurrency,
            "Starting poll"
        );

        let streams = dispatchers.iter().map(|dispatcher| {
            Box::pin(endpoint_stream(
                Arc::clone(dispatcher),
                Arc::clone(&commands),
                self.options.interval,
                Arc::clone(&semaphore),
                cancel.clone(),
            ))
        });
        stream::select_all(streams)
    }

    /// Stops the current run between cycles.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Returns `true` if the current run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.lock().is_cancelled()
    }
}

fn endpoint_stream<W, S>(
    dispatcher: Arc<Dispatcher<W, S>>,
    commands: Arc<[Command]>,
    interval: Duration,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) -> impl Stream<Item = PollResult> + Send + use<W, S>
where
    W: WebTransport + 'static,
    S: ShellTransport + 'static,
{
    async_stream::stream! {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            for command in commands.iter() {
                let result = dispatcher.execute_limited(command, &semaphore).await;
                yield PollResult {
                    endpoint: dispatcher.id(),
                    command: command.clone(),
                    result,
                    polled_at: Utc::now(),
                };
            }
        }

        tracing::debug!(endpoint = %dispatcher.id(), "Polling stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::json::SENSORS_PATH;
    use crate::dispatcher::RetryPolicy;
    use crate::endpoint::Endpoint;
    use crate::protocol::LOGIN_PATH;
    use crate::protocol::fake::{InFlight, ScriptedShell, ScriptedWeb, SlowWeb, Step};

    const SENSORS: &str = r#"{"sensors":[{"port":1,"output":1}],"status":"success"}"#;

    fn dispatcher(steps: Vec<Step>) -> Arc<Dispatcher<ScriptedWeb, ScriptedShell>> {
        let endpoint = Endpoint::builder("10.0.0.9")
            .with_credentials("ubnt", "ubnt")
            .build()
            .unwrap();
        let web = ScriptedWeb::new()
            .on(LOGIN_PATH, [Step::redirect("/power")])
            .on(SENSORS_PATH, steps);
        Arc::new(Dispatcher::with_transports(endpoint, Some(web), None).with_retry(RetryPolicy::default()))
    }

    #[test]
    fn options_defaults_and_clamp() {
        let options = PollOptions::default();
        assert_eq!(options.interval(), PollOptions::DEFAULT_INTERVAL);
        assert!(!options.sensors());
        assert_eq!(options.clone().with_max_concurrency(0).max_concurrency(), 1);
        assert_eq!(options.with_interval(Duration::ZERO).interval(), Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_polls_without_panicking() {
        let healthy = dispatcher(vec![Step::json(200, SENSORS)]);
        let poller = Poller::new(PollOptions::default().with_interval(Duration::ZERO));

        let results: Vec<_> = poller
            .poll(std::slice::from_ref(&healthy))
            .take(3)
            .collect()
            .await;
        assert!(results.iter().all(|r| r.result.is_ok()));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_status_and_sensors_each_cycle() {
        let healthy = dispatcher(vec![Step::json(200, SENSORS)]);
        let poller = Poller::new(
            PollOptions::default()
                .with_interval(Duration::from_secs(1))
                .with_sensors(true),
        );

        let results: Vec<_> = poller
            .poll(std::slice::from_ref(&healthy))
            .take(4)
            .collect()
            .await;

        let commands: Vec<_> = results.iter().map(|r| r.command.clone()).collect();
        assert_eq!(
            commands,
            [
                Command::ReadStatus,
                Command::ReadSensors,
                Command::ReadStatus,
                Command::ReadSensors
            ]
        );
        assert!(results.iter().all(|r| r.result.is_ok() && r.endpoint == healthy.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_endpoint_does_not_delay_others() {
        let healthy = dispatcher(vec![Step::json(200, SENSORS)]);
        let failing = dispatcher(vec![Step::Timeout]);
        let poller = Poller::new(PollOptions::default().with_interval(Duration::from_secs(1)));

        let results: Vec<_> = poller
            .poll(&[Arc::clone(&failing), Arc::clone(&healthy)])
            .take(3)
            .collect()
            .await;

        // The failing endpoint backs off for 250 + 500 + 1000 ms before giving
        // up, so the healthy one reports twice first.
        assert_eq!(results[0].endpoint, healthy.id());
        assert_eq!(results[1].endpoint, healthy.id());
        assert_eq!(results[2].endpoint, failing.id());
        assert!(matches!(results[2].result, CommandResult::Transient(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_holds_no_permit() {
        let healthy = dispatcher(vec![Step::json(200, SENSORS)]);
        let failing = dispatcher(vec![Step::Timeout]);
        let poller = Poller::new(
            PollOptions::default()
                .with_interval(Duration::from_secs(1))
                .with_max_concurrency(1),
        );

        let started = tokio::time::Instant::now();
        let mut results = Box::pin(poller.poll(&[Arc::clone(&failing), Arc::clone(&healthy)]));

        let first = results.next().await.unwrap();
        assert_eq!(first.endpoint, healthy.id());
        assert!(started.elapsed() < Duration::from_millis(250));

        let second = results.next().await.unwrap();
        assert_eq!(second.endpoint, healthy.id());

        let third = results.next().await.unwrap();
        assert_eq!(third.endpoint, failing.id());
        assert!(matches!(third.result, CommandResult::Transient(_)));
    }

    fn slow_dispatcher(gauge: &Arc<InFlight>) -> Arc<Dispatcher<SlowWeb, ScriptedShell>> {
        let endpoint = Endpoint::builder("10.0.0.9")
            .with_credentials("ubnt", "ubnt")
            .build()
            .unwrap();
        let web = SlowWeb::new(SENSORS, Duration::from_millis(50), Arc::clone(gauge));
        Arc::new(Dispatcher::with_transports(endpoint, Some(web), None))
    }

    #[tokio::test(start_paused = true)]
    async fn max_concurrency_bounds_requests_in_flight() {
        for (limit, expected_peak) in [(1, 1), (3, 3)] {
            let gauge = Arc::new(InFlight::default());
            let dispatchers: Vec<_> = (0..3).map(|_| slow_dispatcher(&gauge)).collect();
            let poller = Poller::new(
                PollOptions::default()
                    .with_interval(Duration::from_secs(1))
                    .with_sensors(true)
                    .with_max_concurrency(limit),
            );

            let results: Vec<_> = poller.poll(&dispatchers).take(12).collect().await;

            assert!(results.iter().all(|r| r.result.is_ok()));
            assert_eq!(gauge.peak(), expected_peak, "max_concurrency {limit}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_ends_stream_and_poll_restarts() {
        let healthy = dispatcher(vec![Step::json(200, SENSORS)]);
        let poller = Poller::new(PollOptions::default().with_interval(Duration::from_secs(1)));

        let mut results = Box::pin(poller.poll(std::slice::from_ref(&healthy)));
        assert!(results.next().await.is_some());

        poller.cancel();
        assert!(poller.is_cancelled());
        while results.next().await.is_some() {}

        let mut restarted = Box::pin(poller.poll(std::slice::from_ref(&healthy)));
        assert!(!poller.is_cancelled());
        assert!(restarted.next().await.is_some());
    }

    #[tokio::test]
    async fn no_endpoints_yields_nothing() {
        let poller = Poller::new(PollOptions::default());
        let endpoints: Vec<Arc<Dispatcher<ScriptedWeb, ScriptedShell>>> = Vec::new();
        assert!(poller.poll(&endpoints).next().await.is_none());
    }
}
