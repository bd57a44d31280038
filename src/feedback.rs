//! Turn completion hooks
//!
//! The receiver reports every completed turn, in order and exactly once, to
//! a [`TurnHook`]. [`KeywordEvaluator`] is the built-in hook: it grades the
//! user's transcribed answer and decides how to move the difficulty.

use parking_lot::Mutex;
use serde::Serialize;

/// A completed conversational turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnEvent {
    /// 1-based turn number within the session
    pub turn: u64,
    /// What the user said during the turn, if it was transcribed
    pub transcript: Option<String>,
}

/// Receives turn completions from the receiver task
///
/// Called on the session worker; implementations must not block for long.
pub trait TurnHook: Send + Sync {
    fn on_turn_complete(&self, event: &TurnEvent);
}

/// Forward turns to another thread
impl TurnHook for crossbeam_channel::Sender<TurnEvent> {
    fn on_turn_complete(&self, event: &TurnEvent) {
        if self.try_send(event.clone()).is_err() {
            tracing::warn!(
                turn = event.turn,
                "Turn listener unavailable, event dropped"
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyAdjustment {
    Increase,
    Decrease,
    Keep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub turn: u64,
    pub message: String,
    pub difficulty: DifficultyAdjustment,
}

/// Grades answers by keywords
#[derive(Debug, Default)]
pub struct KeywordEvaluator {
    last: Mutex<Option<Feedback>>,
}

impl KeywordEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grade one answer
    pub fn evaluate(transcript: Option<&str>) -> (String, DifficultyAdjustment) {
        let Some(text) = transcript.filter(|t| !t.trim().is_empty()) else {
            return (
                "No feedback available.".to_string(),
                DifficultyAdjustment::Keep,
            );
        };

        let text = text.to_lowercase();
        if text.contains("good") || text.contains("well") {
            (
                "Great response! Keep it up.".to_string(),
                DifficultyAdjustment::Increase,
            )
        } else if text.contains("bad") || text.contains("not") {
            (
                "Consider elaborating more on your answer.".to_string(),
                DifficultyAdjustment::Decrease,
            )
        } else {
            (
                "Good effort! Try to be more specific.".to_string(),
                DifficultyAdjustment::Keep,
            )
        }
    }

    /// Most recent feedback given
    pub fn last_feedback(&self) -> Option<Feedback> {
        self.last.lock().clone()
    }
}

impl TurnHook for KeywordEvaluator {
    fn on_turn_complete(&self, event: &TurnEvent) {
        let (message, difficulty) = Self::evaluate(event.transcript.as_deref());
        tracing::info!(turn = event.turn, "Feedback: {}", message);
        match difficulty {
            DifficultyAdjustment::Increase => {
                tracing::info!("Increasing difficulty for the next question")
            }
            DifficultyAdjustment::Decrease => {
                tracing::info!("Lowering difficulty for the next question")
            }
            DifficultyAdjustment::Keep => tracing::info!("Keeping difficulty the same"),
        }

        *self.last.lock() = Some(Feedback {
            turn: event.turn,
            message,
            difficulty,
        });
    }
}
