//! Deterministic engine double.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{EngineError, ValidationEngine};
use crate::intake::CaseIntake;
use crate::outcome::ValidationOutcome;

type Scripted = Result<ValidationOutcome, EngineError>;

/// Answers from a script, then repeats a fallback.
///
/// Records every intake it is handed so callers can assert how often and
/// with what the workflow consulted it.
pub struct ScriptedEngine {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    delay: Duration,
    calls: AtomicUsize,
    evaluated: Mutex<Vec<CaseIntake>>,
}

impl ScriptedEngine {
    /// Play `script` in order, then answer `fallback` forever.
    pub fn with_script(script: Vec<Scripted>, fallback: Scripted) -> Self {
        ScriptedEngine {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            evaluated: Mutex::new(Vec::new()),
        }
    }

    pub fn always(outcome: ValidationOutcome) -> Self {
        Self::with_script(Vec::new(), Ok(outcome))
    }

    pub fn failing(err: EngineError) -> Self {
        Self::with_script(Vec::new(), Err(err))
    }

    /// Wait `delay` before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `evaluate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Intakes received, in call order.
    pub fn evaluated(&self) -> Vec<CaseIntake> {
        match self.evaluated.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn next_answer(&self) -> Scripted {
        let mut script = match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        script.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl ValidationEngine for ScriptedEngine {
    async fn evaluate(&self, intake: &CaseIntake) -> Result<ValidationOutcome, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut evaluated = match self.evaluated.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            evaluated.push(intake.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.next_answer()
    }

    fn engine_id(&self) -> &str {
        "scripted"
    }
}
