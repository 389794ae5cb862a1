/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Error taxonomy shared by every component of the bus.
//!
//! The core never retries. Each failure is classified into one [`BusError`]
//! variant and surfaced with the structured fields a caller needs for logging
//! or alerting. Retry and circuit-breaking belong to enclosing filters.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::saga::RepositoryError;

/// A boxed, thread-safe error used as the cause of collaborator and activity faults.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the pipeline engine, the topology and scheduling protocols,
/// and the saga runtime.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// A required input was missing or malformed. Raised before any I/O.
    #[error("invalid argument `{argument}`: {reason}")]
    ArgumentInvalid {
        /// The name of the offending argument.
        argument: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A one-time setup failed. The failure is cached and every caller of the
    /// same setup on the same scope receives this error.
    #[error("one-time setup `{payload}` failed for scope `{scope}`")]
    SetupFailure {
        /// The scope (connection or context) the setup belongs to.
        scope: String,
        /// The payload type that keys the setup.
        payload: &'static str,
        /// The cached cause, shared by every waiter.
        #[source]
        source: Arc<BusError>,
    },

    /// The event is not valid for the saga's current state, or no instance
    /// correlates with a non-initiating event. The instance is untouched.
    #[error("saga `{saga}` rejected event `{event}` in state `{state}` for {correlation_id}: {reason}")]
    TransitionInvalid {
        /// The saga state machine name.
        saga: String,
        /// The correlation key the event resolved to.
        correlation_id: Uuid,
        /// The state the instance was in (`Initial` when none exists).
        state: String,
        /// The event name.
        event: String,
        /// Why the transition was rejected.
        reason: TransitionRejection,
    },

    /// An activity raised while executing a transition. Fault handlers have
    /// already run and nothing was persisted.
    #[error("saga `{saga}` faulted in `{activity}` handling `{event}` in state `{state}` for {correlation_id}")]
    TransitionFault {
        /// The saga state machine name.
        saga: String,
        /// The correlation key of the instance.
        correlation_id: Uuid,
        /// The state the instance was in before the transition.
        state: String,
        /// The event name.
        event: String,
        /// The activity that raised.
        activity: String,
        /// The fault raised by the activity.
        #[source]
        source: BoxError,
    },

    /// The saga repository failed after a successful transition. From the
    /// store's point of view the instance remains at its prior state.
    #[error("saga `{saga}` failed to {operation} instance {correlation_id}")]
    PersistenceFailure {
        /// The saga state machine name.
        saga: String,
        /// The correlation key of the instance.
        correlation_id: Uuid,
        /// The repository operation (`load`, `save`, `delete`, `lock`, `query`).
        operation: &'static str,
        /// The repository error.
        #[source]
        source: RepositoryError,
    },

    /// A broker, scheduler or publish collaborator call failed.
    #[error("{collaborator} failed during `{operation}`")]
    CollaboratorFailure {
        /// Which collaborator failed.
        collaborator: &'static str,
        /// The operation that was attempted.
        operation: String,
        /// The collaborator's error.
        #[source]
        source: BoxError,
    },

    /// The operation observed its cancellation token.
    #[error("`{operation}` was cancelled")]
    Cancelled {
        /// The operation that was cancelled.
        operation: String,
    },
}

impl BusError {
    /// Shorthand for [`BusError::ArgumentInvalid`].
    pub fn argument(argument: &'static str, reason: impl Into<String>) -> Self {
        Self::ArgumentInvalid {
            argument,
            reason: reason.into(),
        }
    }

    /// Shorthand for [`BusError::CollaboratorFailure`].
    pub fn collaborator(
        collaborator: &'static str,
        operation: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::CollaboratorFailure {
            collaborator,
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Shorthand for [`BusError::Cancelled`].
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Returns `true` for [`BusError::Cancelled`], including a cancellation
    /// cached inside a [`BusError::SetupFailure`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled { .. } => true,
            Self::SetupFailure { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Why a saga rejected an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRejection {
    /// No instance exists and the event does not initiate the saga.
    SagaNotFound,
    /// An instance exists but no transition is declared for its state and the event.
    UnhandledEvent,
}

impl fmt::Display for TransitionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SagaNotFound => write!(f, "saga instance not found"),
            Self::UnhandledEvent => write!(f, "event not accepted in this state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn setup_failure_exposes_the_cached_cause() {
        let cause = Arc::new(BusError::cancelled("configure topology"));
        let error = BusError::SetupFailure {
            scope: "client".to_string(),
            payload: "ConfigureTopology",
            source: cause,
        };
        assert!(error.is_cancelled());
        let source = error.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("`configure topology` was cancelled"));
    }

    #[test]
    fn transition_invalid_names_state_and_event() {
        let error = BusError::TransitionInvalid {
            saga: "orders".to_string(),
            correlation_id: Uuid::nil(),
            state: "Final".to_string(),
            event: "Updated".to_string(),
            reason: TransitionRejection::UnhandledEvent,
        };
        let text = error.to_string();
        assert!(text.contains("`Updated`"));
        assert!(text.contains("`Final`"));
        assert!(text.contains("not accepted"));
    }
}
