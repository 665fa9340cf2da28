pub mod judge;
pub mod offline_judge;
pub mod question;
pub mod question_source;
pub mod response;
pub mod scoring;
pub mod session_state;
pub mod transition;

use question::Question;
use response::Evaluation;
use scoring::Summary;

/// Represents commands that the core logic (`InterviewSession`) issues to the runtime.
///
/// The session never prints or reads input itself; the runtime renders these and feeds the
/// candidate's answers back through `InterviewSession::submit_answer`.
#[derive(Debug, Clone)]
pub enum Command {
    /// Present primary question `number` (1-based).
    AskQuestion { number: usize, question: Question },
    /// Present an easier follow-up in place of the current question.
    AskFollowUp(Question),
    /// Show a hint; the candidate answers the same question again.
    GiveHint(String),
    /// Show the grade for the answer just given.
    ShowEvaluation(Evaluation),
    /// The interview is over.
    SessionComplete(Summary),
}
