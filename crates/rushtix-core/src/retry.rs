//! Whole-session retry around the workflow.
//!
//! One attempt = one fresh session + one full workflow run. Any failure
//! tears the session down completely and starts over from the first stage
//! with a new session, bounded by `max_retries`. The controller is the sole
//! owner of the live session; it guarantees release on every exit path and
//! never has two sessions alive at once.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{RunConfig, Timings};
use crate::deadline::{Clock, DeadlineSynchronizer, SystemClock};
use crate::flow::{FlowError, RunReport, WorkflowController};
use crate::session::{AutomationSession, SessionConfig, SessionFactory};

/// Default attempt ceiling.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Terminal failure after the retry budget is spent.
#[derive(Error, Debug)]
pub enum RetryError {
    #[error("all {attempts} attempts failed, last error: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: FlowError,
    },
}

/// Owns session lifecycle across bounded workflow attempts.
pub struct SessionRetryController {
    factory: Box<dyn SessionFactory>,
    session_config: SessionConfig,
    run_config: RunConfig,
    timings: Timings,
    max_retries: usize,
    clock: Arc<dyn Clock>,
    /// Lead passed to the in-run deadline wait.
    lead: Duration,
}

impl SessionRetryController {
    pub fn new(
        factory: Box<dyn SessionFactory>,
        session_config: SessionConfig,
        run_config: RunConfig,
        timings: Timings,
    ) -> Self {
        Self {
            factory,
            session_config,
            run_config,
            timings,
            max_retries: DEFAULT_MAX_RETRIES,
            clock: Arc::new(SystemClock),
            lead: Duration::ZERO,
        }
    }

    /// Override the attempt ceiling.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Inject a clock for the deadline wait. Tests use a stepping clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run up to `max_retries` full attempts; first success wins.
    pub async fn run(&self) -> Result<RunReport, RetryError> {
        let mut last_error: Option<FlowError> = None;

        for attempt in 1..=self.max_retries {
            let run_id = Uuid::new_v4();
            info!(attempt, max = self.max_retries, %run_id, "starting attempt");

            let session = match self.factory.open(&self.session_config).await {
                Ok(session) => session,
                Err(e) => {
                    error!(attempt, error = %e, "session open failed");
                    last_error = Some(FlowError::Session(e));
                    continue;
                }
            };

            let result = self.run_workflow(session.as_ref()).await;

            // Scoped release: the session dies here no matter how the
            // attempt ended, before any new one can be opened.
            if let Err(e) = session.close().await {
                warn!(attempt, error = %e, "session close failed");
            }
            drop(session);

            match result {
                Ok(report) => {
                    info!(attempt, "attempt succeeded");
                    return Ok(report);
                }
                Err(e) => {
                    error!(attempt, error = %e, "attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(RetryError::Exhausted {
            attempts: self.max_retries,
            last: last_error.unwrap_or(FlowError::StageFailed {
                stage: "retry",
                reason: "no attempt was made".to_string(),
            }),
        })
    }

    async fn run_workflow(&self, session: &dyn AutomationSession) -> Result<RunReport, FlowError> {
        let deadline =
            DeadlineSynchronizer::new(Arc::clone(&self.clock), self.timings.poll_interval);
        let controller = WorkflowController::new(
            session,
            &self.run_config,
            self.timings,
            deadline,
            self.lead,
        );
        controller.run().await
    }
}
