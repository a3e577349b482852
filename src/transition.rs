//! Step transitions
//!
//! A step returns a [`Transition`] telling the engine what to do next:
//! run another step immediately, wait then run one, schedule one for a
//! wall-clock instant, or terminate the workflow.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default timeout applied to a step's own body (2 minutes).
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(120);

/// Ceiling on any user-supplied transition timeout (10 minutes).
pub const MAX_STEP_TIMEOUT: Duration = Duration::from_secs(600);

/// Named parameters forwarded between steps.
pub type Params = serde_json::Map<String, Value>;

/// Errors raised while constructing a [`Transition`].
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum TransitionError {
    /// The requested timeout exceeds [`MAX_STEP_TIMEOUT`].
    #[error("step timeout {requested:?} exceeds the {max:?} ceiling")]
    TimeoutTooLarge {
        requested: Duration,
        max: Duration,
    },
    /// The requested timeout is zero. Spec §3 requires a positive number.
    #[error("step timeout must be positive, got {requested:?}")]
    TimeoutNotPositive { requested: Duration },
}

/// What the engine does after a step returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transition {
    /// Terminate the workflow successfully with `result`.
    End { result: Value },

    /// Run `step` immediately with `params`, enforcing `timeout`.
    Next {
        step: String,
        params: Params,
        #[serde(with = "duration_secs")]
        timeout: Duration,
    },

    /// Sleep `wait` before running `step` with `params`, under `timeout`.
    WaitAndNext {
        #[serde(with = "duration_secs")]
        wait: Duration,
        step: String,
        params: Params,
        #[serde(with = "duration_secs")]
        timeout: Duration,
    },

    /// Sleep until `schedule_time` (no-op if already past) before running
    /// `step` with `params`, under `timeout`.
    Schedule {
        schedule_time: DateTime<Utc>,
        step: String,
        params: Params,
        #[serde(with = "duration_secs")]
        timeout: Duration,
    },
}

fn validate_timeout(timeout: Option<Duration>) -> Result<Duration, TransitionError> {
    match timeout {
        None => Ok(DEFAULT_STEP_TIMEOUT),
        Some(t) if t.is_zero() => Err(TransitionError::TimeoutNotPositive { requested: t }),
        Some(t) if t <= MAX_STEP_TIMEOUT => Ok(t),
        Some(t) => Err(TransitionError::TimeoutTooLarge {
            requested: t,
            max: MAX_STEP_TIMEOUT,
        }),
    }
}

impl Transition {
    /// Terminate the workflow successfully.
    pub fn end(result: Value) -> Self {
        Self::End { result }
    }

    /// Run `step` immediately.
    pub fn next(
        step: impl Into<String>,
        params: Params,
        timeout: Option<Duration>,
    ) -> Result<Self, TransitionError> {
        Ok(Self::Next {
            step: step.into(),
            params,
            timeout: validate_timeout(timeout)?,
        })
    }

    /// Sleep `wait` (clamped to non-negative) then run `step`.
    pub fn wait_and_next(
        wait: Duration,
        step: impl Into<String>,
        params: Params,
        timeout: Option<Duration>,
    ) -> Result<Self, TransitionError> {
        Ok(Self::WaitAndNext {
            wait,
            step: step.into(),
            params,
            timeout: validate_timeout(timeout)?,
        })
    }

    /// Sleep until `schedule_time` then run `step`. Past instants are a
    /// no-op wait, handled by the engine, not here.
    pub fn schedule(
        schedule_time: DateTime<Utc>,
        step: impl Into<String>,
        params: Params,
        timeout: Option<Duration>,
    ) -> Result<Self, TransitionError> {
        Ok(Self::Schedule {
            schedule_time,
            step: step.into(),
            params,
            timeout: validate_timeout(timeout)?,
        })
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> Params {
        match json!({"x": 1}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn next_defaults_timeout() {
        let t = Transition::next("step_b", params(), None).unwrap();
        match t {
            Transition::Next { timeout, .. } => assert_eq!(timeout, DEFAULT_STEP_TIMEOUT),
            _ => panic!("expected Next"),
        }
    }

    #[test]
    fn timeout_over_ceiling_is_rejected() {
        let err = Transition::next("step_b", params(), Some(Duration::from_secs(601)))
            .unwrap_err();
        assert!(matches!(err, TransitionError::TimeoutTooLarge { .. }));
    }

    #[test]
    fn timeout_at_ceiling_is_accepted() {
        let t = Transition::next("step_b", params(), Some(MAX_STEP_TIMEOUT)).unwrap();
        match t {
            Transition::Next { timeout, .. } => assert_eq!(timeout, MAX_STEP_TIMEOUT),
            _ => panic!("expected Next"),
        }
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Transition::next("step_b", params(), Some(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, TransitionError::TimeoutNotPositive { .. }));
    }

    #[test]
    fn end_carries_result() {
        let t = Transition::end(json!(42));
        assert_eq!(t, Transition::End { result: json!(42) });
    }

    #[test]
    fn transition_round_trips_through_json() {
        let t = Transition::wait_and_next(
            Duration::from_millis(100),
            "step_b",
            params(),
            None,
        )
        .unwrap();

        let encoded = serde_json::to_string(&t).unwrap();
        assert!(encoded.contains("\"type\":\"wait_and_next\""));

        let decoded: Transition = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, t);
    }
}
