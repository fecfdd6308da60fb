//! Timers and shutdown plumbing for
//! the interactive loops.

use std::time::Duration;

use tokio::time::{
  Instant,
  Interval,
  MissedTickBehavior
};
use tokio_util::sync::CancellationToken;
use tracing::{
  debug,
  error,
  warn
};

/// Periodic reminder clock. Starting
/// an already running timer keeps the
/// existing schedule, so at most one
/// timer is ever live.
#[derive(Debug)]
pub struct ReminderTimer {
  period:   Duration,
  interval: Option<Interval>
}

impl ReminderTimer {
  pub fn new(period: Duration) -> Self {
    Self {
      period:   period
        .max(Duration::from_millis(10)),
      interval: None
    }
  }

  pub fn period(&self) -> Duration {
    self.period
  }

  pub fn is_running(&self) -> bool {
    self.interval.is_some()
  }

  pub fn start(&mut self) {
    if self.interval.is_some() {
      debug!(
        "reminder timer already running"
      );
      return;
    }

    let mut interval =
      tokio::time::interval_at(
        Instant::now() + self.period,
        self.period
      );
    interval.set_missed_tick_behavior(
      MissedTickBehavior::Skip
    );
    self.interval = Some(interval);
    debug!(period = ?self.period, "reminder timer started");
  }

  pub fn stop(&mut self) {
    if self.interval.take().is_some() {
      debug!("reminder timer stopped");
    }
  }

  /// Completes on the next tick. A
  /// stopped timer never completes.
  pub async fn tick(
    &mut self
  ) -> Instant {
    match self.interval.as_mut() {
      | Some(interval) => {
        interval.tick().await
      }
      | None => {
        std::future::pending().await
      }
    }
  }
}

/// Holds the latest value until
/// `delay` passes with no newer one.
#[derive(Debug)]
pub struct Debouncer<T> {
  delay:   Duration,
  pending: Option<(T, Instant)>
}

impl<T> Debouncer<T> {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      pending: None
    }
  }

  pub fn push(&mut self, value: T) {
    self.pending = Some((
      value,
      Instant::now() + self.delay
    ));
  }

  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }

  pub fn cancel(&mut self) -> Option<T> {
    self
      .pending
      .take()
      .map(|(value, _)| value)
  }

  /// Waits out the quiet period and
  /// yields the value. Dropping the
  /// future early keeps the value
  /// pending.
  pub async fn ready(&mut self) -> T {
    let Some(deadline) = self
      .pending
      .as_ref()
      .map(|(_, at)| *at)
    else {
      return std::future::pending()
        .await;
    };

    tokio::time::sleep_until(deadline)
      .await;

    match self.pending.take() {
      | Some((value, _)) => value,
      | None => {
        std::future::pending().await
      }
    }
  }
}

/// Cancels `token` on SIGINT or
/// SIGTERM.
pub fn cancel_on_shutdown_signal(
  token: CancellationToken
) {
  tokio::spawn(async move {
    tokio::select! {
      _ = wait_for_shutdown_signal() => {
        warn!("received shutdown signal; stopping");
        token.cancel();
      }
      _ = token.cancelled() => {}
    }
  });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
  use tokio::signal::unix::{
    SignalKind,
    signal
  };

  let mut sigint = match signal(
    SignalKind::interrupt()
  ) {
    | Ok(stream) => stream,
    | Err(error) => {
      error!(
        %error,
        "failed to register SIGINT \
         handler; falling back to \
         ctrl_c"
      );
      let _ =
        tokio::signal::ctrl_c().await;
      return;
    }
  };

  let mut sigterm = match signal(
    SignalKind::terminate()
  ) {
    | Ok(stream) => stream,
    | Err(error) => {
      error!(
        %error,
        "failed to register SIGTERM \
         handler; falling back to \
         ctrl_c"
      );
      let _ =
        tokio::signal::ctrl_c().await;
      return;
    }
  };

  tokio::select! {
    _ = sigint.recv() => {}
    _ = sigterm.recv() => {}
  }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
  if let Err(error) =
    tokio::signal::ctrl_c().await
  {
    error!(
      %error,
      "failed waiting for ctrl_c \
       signal"
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn timer_ticks_after_each_period()
  {
    let mut timer = ReminderTimer::new(
      Duration::from_secs(1)
    );
    timer.start();
    let started = Instant::now();

    timer.tick().await;
    assert_eq!(
      started.elapsed(),
      Duration::from_secs(1)
    );
    timer.tick().await;
    assert_eq!(
      started.elapsed(),
      Duration::from_secs(2)
    );
  }

  #[tokio::test(start_paused = true)]
  async fn starting_twice_keeps_one_schedule()
  {
    let mut timer = ReminderTimer::new(
      Duration::from_secs(1)
    );
    timer.start();
    tokio::time::advance(
      Duration::from_millis(600)
    )
    .await;
    timer.start();

    let started = Instant::now();
    timer.tick().await;
    assert_eq!(
      started.elapsed(),
      Duration::from_millis(400)
    );
  }

  #[tokio::test(start_paused = true)]
  async fn stopped_timer_never_ticks() {
    let mut timer = ReminderTimer::new(
      Duration::from_secs(1)
    );
    timer.start();
    timer.stop();
    assert!(!timer.is_running());

    let outcome = tokio::time::timeout(
      Duration::from_secs(5),
      timer.tick()
    )
    .await;
    assert!(outcome.is_err());
  }

  #[tokio::test(start_paused = true)]
  async fn debouncer_yields_only_latest_value()
  {
    let mut debouncer = Debouncer::new(
      Duration::from_millis(90)
    );
    debouncer.push("r");
    tokio::time::advance(
      Duration::from_millis(50)
    )
    .await;
    debouncer.push("rep");

    let started = Instant::now();
    let value = debouncer.ready().await;
    assert_eq!(value, "rep");
    assert_eq!(
      started.elapsed(),
      Duration::from_millis(90)
    );
    assert!(!debouncer.is_pending());
  }

  #[tokio::test(start_paused = true)]
  async fn cancelled_debounce_never_fires()
  {
    let mut debouncer =
      Debouncer::new(Duration::from_millis(
        90
      ));
    debouncer.push(1);
    assert_eq!(debouncer.cancel(), Some(1));

    let outcome = tokio::time::timeout(
      Duration::from_secs(1),
      debouncer.ready()
    )
    .await;
    assert!(outcome.is_err());
  }
}
