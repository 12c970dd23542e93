//! Backoff strategies: how long to wait before the next attempt, or whether to stop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decision function behind [`BackoffStrategy::Adaptive`].
///
/// Receives the number of retries already made (0 on the first failure) and
/// the delay it returned on its previous invocation. Returning `None` stops
/// retrying.
pub type DecideFn = dyn Fn(u32, Option<Duration>) -> Option<Duration> + Send + Sync;

/// The backoff strategy consulted after every failed, non-final attempt.
///
/// Strategies are pure data: they never sleep and never keep state. The engine
/// remembers what an adaptive strategy returned last time and hands it back.
///
/// # Examples
///
/// ```rust
/// use steadfast::BackoffStrategy;
/// use std::time::Duration;
///
/// let fixed = BackoffStrategy::fixed_delay(Duration::from_millis(250));
/// assert_eq!(fixed.next_delay(0, None), Some(Duration::from_millis(250)));
///
/// // Grows by one second per retry, computed purely from its own history
/// let growing = BackoffStrategy::adaptive(|_, previous| {
///     Some(previous.unwrap_or_default() + Duration::from_secs(1))
/// });
/// assert_eq!(growing.next_delay(0, None), Some(Duration::from_secs(1)));
/// assert_eq!(
///     growing.next_delay(1, Some(Duration::from_secs(1))),
///     Some(Duration::from_secs(2))
/// );
/// ```
#[derive(Clone, Default)]
pub enum BackoffStrategy {
    /// Retry straight away.
    #[default]
    Immediate,
    /// Wait the same amount before every retry.
    FixedDelay(Duration),
    /// Ask a decision function for every delay; `None` means stop.
    Adaptive(Arc<DecideFn>),
}

impl BackoffStrategy {
    /// Retry without waiting.
    pub fn immediate() -> Self {
        Self::Immediate
    }

    /// Wait `delay` before every retry.
    pub fn fixed_delay(delay: Duration) -> Self {
        Self::FixedDelay(delay)
    }

    /// Wait `secs` seconds before every retry.
    ///
    /// Negative and NaN values are treated as zero, values too large for a
    /// `Duration` saturate.
    ///
    /// ```rust
    /// use steadfast::BackoffStrategy;
    /// use std::time::Duration;
    ///
    /// let strategy = BackoffStrategy::fixed_delay_secs(0.5);
    /// assert_eq!(strategy.next_delay(0, None), Some(Duration::from_millis(500)));
    ///
    /// let clamped = BackoffStrategy::fixed_delay_secs(-1.0);
    /// assert_eq!(clamped.next_delay(0, None), Some(Duration::ZERO));
    /// ```
    pub fn fixed_delay_secs(secs: f64) -> Self {
        Self::FixedDelay(secs_to_duration(secs))
    }

    /// Let `decide` pick every delay.
    ///
    /// `decide(attempt, previous)` gets the count of retries already made and
    /// the value it returned last time (`None` on the first call). Returning
    /// `None` vetoes further retries even when attempts remain.
    ///
    /// ```rust
    /// use steadfast::BackoffStrategy;
    /// use std::time::Duration;
    ///
    /// // Give up after the third attempt no matter what the budget says
    /// let strategy = BackoffStrategy::adaptive(|attempt, _| {
    ///     (attempt < 2).then_some(Duration::ZERO)
    /// });
    /// assert_eq!(strategy.next_delay(1, None), Some(Duration::ZERO));
    /// assert_eq!(strategy.next_delay(2, None), None);
    /// ```
    pub fn adaptive<F>(decide: F) -> Self
    where
        F: Fn(u32, Option<Duration>) -> Option<Duration> + Send + Sync + 'static,
    {
        Self::Adaptive(Arc::new(decide))
    }

    /// Compute the delay before the next retry.
    ///
    /// `attempt` is the number of retries already made and `previous` is the
    /// delay this strategy produced last time. Only [`BackoffStrategy::Adaptive`]
    /// looks at either, and only it can return `None`.
    pub fn next_delay(&self, attempt: u32, previous: Option<Duration>) -> Option<Duration> {
        match self {
            Self::Immediate => Some(Duration::ZERO),
            Self::FixedDelay(delay) => Some(*delay),
            Self::Adaptive(decide) => decide(attempt, previous),
        }
    }

    /// Returns true for strategies that never wait.
    pub fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate)
    }
}

impl fmt::Debug for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => f.write_str("Immediate"),
            Self::FixedDelay(delay) => f.debug_tuple("FixedDelay").field(delay).finish(),
            Self::Adaptive(_) => f.write_str("Adaptive(<fn>)"),
        }
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}
