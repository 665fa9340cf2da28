//! The interview's decision function.
//!
//! `decide` is pure: it reads the session and returns what should happen next together with the
//! difficulty cursor for whatever comes next. Applying the result is the controller's job.

use serde::Serialize;

use crate::question::Difficulty;
use crate::session_state::{InterviewLimits, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Move on to the next primary question.
    Continue,
    /// Remediate the current primary question with a hint or an easier follow-up.
    Hint,
    /// Stop asking and produce the final summary.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub decision: Decision,
    pub difficulty: Difficulty,
}

/// Decides the next step after an answer has been evaluated.
///
/// The cursor moves at most once per primary question: a remediation dip counts as that move, so
/// advancing after a remediation cycle keeps the cursor where the dip left it. Until the first
/// remediation of the session the question-count schedule anchors the adjustment; afterwards the
/// cursor itself does.
pub fn decide(state: &SessionState, limits: &InterviewLimits) -> Transition {
    let cursor = state.current_difficulty;

    if state.question_count >= limits.max_questions {
        return Transition {
            decision: Decision::End,
            difficulty: cursor,
        };
    }

    let last_score = state.scores.last().copied();
    let remediating = state.hint_count > 0;

    if let Some(score) = last_score {
        if score < limits.low_score && state.hint_count < limits.max_hints {
            return Transition {
                decision: Decision::Hint,
                difficulty: if remediating { cursor } else { cursor.step_down() },
            };
        }
    }

    let difficulty = if remediating {
        cursor
    } else {
        let anchor = if state.remediated {
            cursor
        } else {
            Difficulty::for_question_count(state.question_count)
        };
        match last_score {
            Some(score) => anchor.adjusted_for(score, limits),
            None => anchor,
        }
    };

    Transition {
        decision: Decision::Continue,
        difficulty,
    }
}
