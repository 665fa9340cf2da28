use crate::{
    Command,
    judge::Judge,
    question::{Difficulty, Question, Topic},
    question_source::QuestionSource,
    response::{self, Evaluation, Remediation},
    scoring::{self, Summary},
    transition::{self, Decision},
};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;

pub const NO_ANSWER_FEEDBACK: &str = "No answer provided.";
pub const MALFORMED_EVALUATION_FEEDBACK: &str =
    "The answer could not be graded because the grader's response was not in the expected format.";
pub const UNAVAILABLE_EVALUATION_FEEDBACK: &str =
    "The answer could not be graded because the grader was unavailable.";
pub const GENERIC_HINT: &str = "Start from the core definition, then explain how it works and give a concrete example.";
pub const UNABLE_TO_SUMMARIZE: &str =
    "Unable to summarize the interview. Please review the per-question feedback above.";

/// Budgets and thresholds that drive the interview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterviewLimits {
    pub max_questions: usize,
    pub max_hints: u32,
    /// Scores below this trigger remediation and step the difficulty down.
    pub low_score: u8,
    /// Scores at or above this step the difficulty up.
    pub high_score: u8,
}

impl Default for InterviewLimits {
    fn default() -> Self {
        Self {
            max_questions: 5,
            max_hints: 1,
            low_score: 4,
            high_score: 7,
        }
    }
}

/// Whether a question is one of the counted interview questions or a remediation follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    Primary,
    FollowUp,
}

/// What the remediation step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationOutcome {
    Hint(String),
    FollowUp(Question),
    /// The hint budget for this question is spent; the interview moves on.
    Exhausted,
}

/// The record threaded through every step of one interview.
///
/// `answers`, `scores` and `feedbacks` are index-aligned with `questions`; the newest question has
/// no entry in them until it is answered. The follow-up vectors hold the latest remediation answer
/// for the primary question at the same index, or `None` where there was none.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub topic: Topic,
    pub question_count: usize,
    pub questions: Vec<Question>,
    pub answers: Vec<String>,
    pub scores: Vec<u8>,
    pub feedbacks: Vec<String>,
    pub follow_up_answers: Vec<Option<String>>,
    pub follow_up_scores: Vec<Option<u8>>,
    pub follow_up_feedbacks: Vec<Option<String>>,
    pub current_question: Option<Question>,
    pub current_answer: String,
    pub current_difficulty: Difficulty,
    pub is_follow_up: bool,
    pub hint_count: u32,
    /// Set once any remediation has happened in this session.
    pub remediated: bool,
    pub decision: Option<Decision>,
    pub used_questions: HashSet<String>,
    pub history: String,
}

impl SessionState {
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            question_count: 0,
            questions: vec![],
            answers: vec![],
            scores: vec![],
            feedbacks: vec![],
            follow_up_answers: vec![],
            follow_up_scores: vec![],
            follow_up_feedbacks: vec![],
            current_question: None,
            current_answer: String::new(),
            current_difficulty: Difficulty::Easy,
            is_follow_up: false,
            hint_count: 0,
            remediated: false,
            decision: None,
            used_questions: HashSet::new(),
            history: String::new(),
        }
    }

    /// True while the candidate is answering a hint or a follow-up for the current primary question.
    pub fn in_remediation(&self) -> bool {
        self.is_follow_up || self.hint_count > 0
    }

    /// The follow-up answer, score and feedback recorded for primary question `index`, if any.
    pub fn follow_up(&self, index: usize) -> Option<(&str, u8, &str)> {
        let answer = self.follow_up_answers.get(index)?.as_deref()?;
        let score = (*self.follow_up_scores.get(index)?)?;
        let feedback = self.follow_up_feedbacks.get(index)?.as_deref()?;
        Some((answer, score, feedback))
    }

    fn record_primary(&mut self, answer: String, evaluation: &Evaluation) {
        self.answers.push(answer);
        self.scores.push(evaluation.score);
        self.feedbacks.push(evaluation.feedback.clone());
    }

    fn record_follow_up(&mut self, answer: String, evaluation: &Evaluation) {
        let Some(index) = self.questions.len().checked_sub(1) else {
            return;
        };
        let len = index + 1;
        self.follow_up_answers.resize(len.max(self.follow_up_answers.len()), None);
        self.follow_up_scores.resize(len.max(self.follow_up_scores.len()), None);
        self.follow_up_feedbacks.resize(len.max(self.follow_up_feedbacks.len()), None);
        self.follow_up_answers[index] = Some(answer);
        self.follow_up_scores[index] = Some(evaluation.score);
        self.follow_up_feedbacks[index] = Some(evaluation.feedback.clone());
    }

    fn latest_feedback(&self) -> &str {
        if self.in_remediation() {
            if let Some(Some(feedback)) = self.follow_up_feedbacks.get(self.questions.len().wrapping_sub(1)) {
                return feedback;
            }
        }
        self.feedbacks.last().map(String::as_str).unwrap_or_default()
    }
}

/// Drives one interview. Owns the session record and its collaborators, and reports every step
/// to the runtime through `Command`s.
pub struct InterviewSession {
    state: SessionState,
    judge: Arc<dyn Judge>,
    source: Arc<dyn QuestionSource>,
    limits: InterviewLimits,
    command_tx: Sender<Command>,
    summary: Option<Summary>,
}

impl InterviewSession {
    pub fn new(
        topic: Topic,
        judge: Arc<dyn Judge>,
        source: Arc<dyn QuestionSource>,
        limits: InterviewLimits,
        command_tx: Sender<Command>,
    ) -> Self {
        Self {
            state: SessionState::new(topic),
            judge,
            source,
            limits,
            command_tx,
            summary: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn limits(&self) -> &InterviewLimits {
        &self.limits
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.summary.is_some()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .context("Failed to send command to the runtime")
    }

    /// Asks the first question.
    pub async fn begin(&mut self) -> Result<()> {
        tracing::info!("Starting interview on '{}'", self.state.topic);
        if self.limits.max_questions == 0 {
            return self.finish().await;
        }
        let difficulty = Difficulty::for_question_count(self.state.question_count);
        self.state.current_difficulty = difficulty;
        self.advance().await
    }

    /// Takes the candidate's answer to the current question and runs the interview forward until
    /// it needs the next answer or has finished.
    pub async fn submit_answer(&mut self, answer: &str) -> Result<Decision> {
        if self.is_complete() {
            anyhow::bail!("The interview has already finished");
        }
        if self.state.current_question.is_none() {
            anyhow::bail!("No question is awaiting an answer; call `begin` first");
        }
        self.state.current_answer = answer.trim().to_string();

        let evaluation = self.evaluate_answer().await;
        self.send(Command::ShowEvaluation(evaluation)).await?;

        let decision = self.transition();
        match decision {
            Decision::End => self.finish().await?,
            Decision::Hint => match self.generate_remediation().await {
                RemediationOutcome::Hint(hint) => self.send(Command::GiveHint(hint)).await?,
                RemediationOutcome::FollowUp(question) => {
                    self.send(Command::AskFollowUp(question)).await?
                }
                RemediationOutcome::Exhausted => self.advance().await?,
            },
            Decision::Continue => self.advance().await?,
        }
        Ok(decision)
    }

    async fn advance(&mut self) -> Result<()> {
        let difficulty = self.state.current_difficulty;
        let question = self.select_question(QuestionKind::Primary, difficulty).await;
        self.send(Command::AskQuestion {
            number: self.state.question_count,
            question,
        })
        .await
    }

    async fn finish(&mut self) -> Result<()> {
        let summary = self.finalize().await;
        self.send(Command::SessionComplete(summary)).await
    }

    /// Picks a question: question source first, then the judge, then a deterministic placeholder.
    /// Never returns a text already asked in this session.
    pub async fn select_question(&mut self, kind: QuestionKind, difficulty: Difficulty) -> Question {
        let topic = self.state.topic.as_str();
        let from_source = match self.source.lookup(topic, difficulty).await {
            Ok(Some(question)) if self.state.used_questions.contains(&question.text) => {
                tracing::debug!("Discarding already-asked question from source: {}", question.text);
                None
            }
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Question source lookup failed: {:?}", e);
                None
            }
        };

        let question = match from_source {
            Some(question) => question,
            None => match self.generate_question(difficulty).await {
                Some(question) => question,
                None => self.placeholder(difficulty),
            },
        };

        self.present(kind, question.clone());
        question
    }

    async fn generate_question(&self, difficulty: Difficulty) -> Option<Question> {
        let raw = match self
            .judge
            .generate_question(self.state.topic.as_str(), difficulty, &self.state.history)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Question generation failed: {:?}", e);
                return None;
            }
        };
        match response::parse_question(&raw, difficulty) {
            Ok(question) if self.state.used_questions.contains(&question.text) => {
                tracing::warn!("Generated question repeats an earlier one: {}", question.text);
                None
            }
            Ok(question) => Some(question),
            Err(e) => {
                tracing::warn!("Malformed generated question: {}", e);
                None
            }
        }
    }

    fn placeholder(&self, difficulty: Difficulty) -> Question {
        let mut question = Question::placeholder(&self.state.topic, difficulty);
        let mut ordinal = self.state.question_count + 1;
        while self.state.used_questions.contains(&question.text) {
            question.text = format!(
                "Explain another {difficulty} concept in {} (question {ordinal}).",
                self.state.topic
            );
            ordinal += 1;
        }
        question
    }

    /// Makes `question` the one awaiting an answer and records it.
    fn present(&mut self, kind: QuestionKind, question: Question) {
        self.state.used_questions.insert(question.text.clone());
        match kind {
            QuestionKind::Primary => {
                self.state.history.push_str(&format!("Question: {}\n", question.text));
                self.state.questions.push(question.clone());
                self.state.question_count += 1;
                self.state.hint_count = 0;
                self.state.is_follow_up = false;
                tracing::info!(
                    "Question {} ({}): {}",
                    self.state.question_count,
                    question.difficulty,
                    question.text
                );
            }
            QuestionKind::FollowUp => {
                self.state.history.push_str(&format!("Follow-up: {}\n", question.text));
                self.state.is_follow_up = true;
                tracing::info!("Follow-up question: {}", question.text);
            }
        }
        self.state.current_question = Some(question);
        self.state.current_answer.clear();
    }

    /// Grades `current_answer` against `current_question`. The only place scores are written.
    pub async fn evaluate_answer(&mut self) -> Evaluation {
        let answer = self.state.current_answer.trim().to_string();
        let Some(question) = self.state.current_question.clone() else {
            // Nothing to pair the answer with, so nothing is recorded.
            tracing::warn!("Answer submitted with no question pending");
            return Evaluation {
                score: 0,
                feedback: UNAVAILABLE_EVALUATION_FEEDBACK.to_string(),
            };
        };

        let evaluation = if answer.is_empty() {
            Evaluation {
                score: 0,
                feedback: NO_ANSWER_FEEDBACK.to_string(),
            }
        } else {
            match self
                .judge
                .evaluate(&question.text, &question.answer_key, &answer)
                .await
            {
                Ok(raw) => response::parse_evaluation(&raw).unwrap_or_else(|e| {
                    tracing::warn!("Malformed evaluation: {}", e);
                    Evaluation {
                        score: 0,
                        feedback: MALFORMED_EVALUATION_FEEDBACK.to_string(),
                    }
                }),
                Err(e) => {
                    tracing::warn!("Evaluation request failed: {:?}", e);
                    Evaluation {
                        score: 0,
                        feedback: UNAVAILABLE_EVALUATION_FEEDBACK.to_string(),
                    }
                }
            }
        };

        self.state.history.push_str(&format!(
            "Answer: {}\nScore: {}/10\n",
            answer, evaluation.score
        ));
        if self.state.in_remediation() {
            self.state.record_follow_up(answer, &evaluation);
        } else {
            self.state.record_primary(answer, &evaluation);
        }
        tracing::info!("Scored {}/10: {}", evaluation.score, evaluation.feedback);
        evaluation
    }

    /// Applies the decision function to the session.
    pub fn transition(&mut self) -> Decision {
        let next = transition::decide(&self.state, &self.limits);
        tracing::debug!(
            "Transition: {:?}, difficulty {} -> {}",
            next.decision,
            self.state.current_difficulty,
            next.difficulty
        );
        self.state.current_difficulty = next.difficulty;
        self.state.decision = Some(next.decision);
        if next.decision == Decision::Continue {
            self.state.hint_count = 0;
            self.state.is_follow_up = false;
        }
        next.decision
    }

    /// Offers a hint or an easier follow-up for the current primary question, within the hint budget.
    pub async fn generate_remediation(&mut self) -> RemediationOutcome {
        if self.state.hint_count >= self.limits.max_hints {
            tracing::info!("Hint budget spent; moving on");
            self.state.decision = Some(Decision::Continue);
            self.state.hint_count = 0;
            self.state.is_follow_up = false;
            self.state.current_answer.clear();
            return RemediationOutcome::Exhausted;
        }

        let Some(question) = self.state.current_question.clone() else {
            self.state.decision = Some(Decision::Continue);
            return RemediationOutcome::Exhausted;
        };
        let remediation = match self
            .judge
            .remediate(
                &question.text,
                &self.state.current_answer,
                self.state.latest_feedback(),
            )
            .await
        {
            Ok(raw) => response::parse_remediation(&raw).unwrap_or_else(|e| {
                tracing::warn!("Malformed remediation: {}", e);
                Remediation::Hint(GENERIC_HINT.to_string())
            }),
            Err(e) => {
                tracing::warn!("Remediation request failed: {:?}", e);
                Remediation::Hint(GENERIC_HINT.to_string())
            }
        };

        self.state.hint_count += 1;
        self.state.remediated = true;
        self.state.current_answer.clear();

        match remediation {
            Remediation::Hint(hint) => {
                tracing::info!("Hint: {}", hint);
                self.state.history.push_str(&format!("Hint: {hint}\n"));
                RemediationOutcome::Hint(hint)
            }
            Remediation::FollowUp {
                question: text,
                answer_key,
            } => {
                let follow_up = if self.state.used_questions.contains(&text) {
                    self.select_question(QuestionKind::FollowUp, Difficulty::Easy)
                        .await
                } else {
                    let follow_up = Question::new(
                        text,
                        answer_key.unwrap_or(question.answer_key),
                        Difficulty::Easy,
                    );
                    self.present(QuestionKind::FollowUp, follow_up.clone());
                    follow_up
                };
                RemediationOutcome::FollowUp(follow_up)
            }
        }
    }

    /// Weighs the primary questions, computes the weighted score, and writes the narrative.
    pub async fn finalize(&mut self) -> Summary {
        let count = self.state.questions.len();
        let topic = self.state.topic.as_str();

        let weights = if count == 0 {
            Vec::new()
        } else {
            let texts: Vec<String> = self.state.questions.iter().map(|q| q.text.clone()).collect();
            match self.judge.weigh(topic, &texts).await {
                Ok(raw) => response::parse_weights(&raw, count).unwrap_or_else(|e| {
                    tracing::warn!("Invalid question weights, using uniform: {}", e);
                    scoring::uniform_weights(count)
                }),
                Err(e) => {
                    tracing::warn!("Weighting request failed, using uniform: {:?}", e);
                    scoring::uniform_weights(count)
                }
            }
        };

        let final_score = scoring::weighted_score(&self.state.scores, &weights);
        let average_score = scoring::average_score(&self.state.scores);

        let narrative = match self
            .judge
            .summarize(topic, &self.state.scores, &self.state.feedbacks)
            .await
        {
            Ok(raw) => response::parse_summary(&raw).unwrap_or_else(|e| {
                tracing::warn!("Malformed summary: {}", e);
                UNABLE_TO_SUMMARIZE.to_string()
            }),
            Err(e) => {
                tracing::warn!("Summary request failed: {:?}", e);
                UNABLE_TO_SUMMARIZE.to_string()
            }
        };

        tracing::info!("Interview finished. Final score {:.1}/10", final_score);
        let summary = Summary {
            weights,
            final_score,
            average_score,
            narrative,
        };
        self.summary = Some(summary.clone());
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::MockJudge;
    use crate::offline_judge::OfflineJudge;
    use crate::question_source::{MockQuestionSource, QuestionBank};
    use mockall::Sequence;
    use tokio::sync::mpsc::{self, Receiver};

    fn topic() -> Topic {
        Topic::parse("Rust").unwrap()
    }

    fn evaluation_json(score: u8) -> String {
        format!(r#"{{"score": {score}, "feedback": "Scored {score}."}}"#)
    }

    fn question_json(n: usize) -> String {
        format!(r#"{{"question": "Generated question {n}?", "answer_key": "Key {n}."}}"#)
    }

    fn session_with(
        judge: MockJudge,
        source: MockQuestionSource,
    ) -> (InterviewSession, Receiver<Command>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let session = InterviewSession::new(
            topic(),
            Arc::new(judge),
            Arc::new(source),
            InterviewLimits::default(),
            command_tx,
        );
        (session, command_rx)
    }

    fn empty_source() -> MockQuestionSource {
        let mut source = MockQuestionSource::new();
        source.expect_lookup().returning(|_, _| Ok(None));
        source
    }

    fn drain(rx: &mut Receiver<Command>) -> Vec<Command> {
        let mut commands = vec![];
        while let Ok(command) = rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    fn assert_aligned(state: &SessionState) {
        assert_eq!(state.question_count, state.questions.len());
        assert_eq!(state.answers.len(), state.scores.len());
        assert_eq!(state.answers.len(), state.feedbacks.len());
        assert_eq!(state.answers.len(), state.questions.len());
        assert!(state.follow_up_answers.len() <= state.questions.len());
        assert_eq!(state.follow_up_answers.len(), state.follow_up_scores.len());
        assert_eq!(state.follow_up_answers.len(), state.follow_up_feedbacks.len());
    }

    #[tokio::test]
    async fn test_empty_answer_scores_zero_without_judge() {
        // No expectations: any judge call would panic.
        let judge = MockJudge::new();
        let (mut session, _rx) = session_with(judge, empty_source());
        session.state.current_question = Some(Question::new("Q?", "K.", Difficulty::Easy));
        session.state.current_answer = "   ".to_string();

        let evaluation = session.evaluate_answer().await;
        assert_eq!(evaluation.score, 0);
        assert_eq!(evaluation.feedback, NO_ANSWER_FEEDBACK);
        assert_eq!(session.state.scores, vec![0]);
    }

    #[tokio::test]
    async fn test_malformed_evaluation_falls_back_to_zero() {
        let mut judge = MockJudge::new();
        judge
            .expect_evaluate()
            .returning(|_, _, _| Ok("I think it was pretty good!".to_string()))
            .once();
        let (mut session, _rx) = session_with(judge, empty_source());
        session.state.current_question = Some(Question::new("Q?", "K.", Difficulty::Easy));
        session.state.current_answer = "an answer".to_string();

        let evaluation = session.evaluate_answer().await;
        assert_eq!(evaluation.score, 0);
        assert_eq!(evaluation.feedback, MALFORMED_EVALUATION_FEEDBACK);
    }

    #[tokio::test]
    async fn test_source_question_is_preferred() {
        let judge = MockJudge::new();
        let mut source = MockQuestionSource::new();
        source
            .expect_lookup()
            .withf(|topic, difficulty| topic.to_string() == "Rust" && *difficulty == Difficulty::Easy)
            .returning(|_, _| Ok(Some(Question::new("What is a crate?", "A compilation unit.", Difficulty::Easy))))
            .once();
        let (mut session, _rx) = session_with(judge, source);

        let q = session.select_question(QuestionKind::Primary, Difficulty::Easy).await;
        assert_eq!(q.text, "What is a crate?");
        assert_eq!(session.state.question_count, 1);
        assert!(session.state.used_questions.contains("What is a crate?"));
        assert!(session.state.history.contains("Question: What is a crate?"));
    }

    #[tokio::test]
    async fn test_used_source_question_falls_through_to_generation() {
        let mut judge = MockJudge::new();
        judge
            .expect_generate_question()
            .returning(|_, _, _| Ok(question_json(1)))
            .once();
        let mut source = MockQuestionSource::new();
        source
            .expect_lookup()
            .returning(|_, _| Ok(Some(Question::new("What is a crate?", "K.", Difficulty::Easy))));
        let (mut session, _rx) = session_with(judge, source);
        session.state.used_questions.insert("What is a crate?".to_string());

        let q = session.select_question(QuestionKind::Primary, Difficulty::Easy).await;
        assert_eq!(q.text, "Generated question 1?");
    }

    #[tokio::test]
    async fn test_repeated_or_malformed_generation_uses_placeholder() {
        let mut judge = MockJudge::new();
        let mut seq = Sequence::new();
        judge
            .expect_generate_question()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok("```json\nnot json\n```".to_string()));
        judge
            .expect_generate_question()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(anyhow::anyhow!("connection reset")));
        let (mut session, _rx) = session_with(judge, empty_source());

        let first = session.select_question(QuestionKind::Primary, Difficulty::Easy).await;
        assert_eq!(first.text, "Explain a easy concept in Rust.");
        let second = session.select_question(QuestionKind::Primary, Difficulty::Easy).await;
        assert_ne!(first.text, second.text, "placeholders must stay distinct");
        assert_eq!(session.state.used_questions.len(), 2);
    }

    #[tokio::test]
    async fn test_hint_remediation_keeps_question_and_routes_reanswer() {
        let mut judge = MockJudge::new();
        judge
            .expect_remediate()
            .returning(|_, _, _| Ok(r#"{"type": "hint", "content": "Think about lifetimes."}"#.to_string()))
            .once();
        judge.expect_evaluate().returning(|_, _, _| Ok(evaluation_json(2)));
        let (mut session, mut rx) = session_with(judge, empty_source());
        session.present(
            QuestionKind::Primary,
            Question::new("What is borrowing?", "Temporary access.", Difficulty::Easy),
        );

        assert_eq!(session.submit_answer("no idea").await.unwrap(), Decision::Hint);
        assert_eq!(session.state.hint_count, 1);
        assert!(!session.state.is_follow_up);
        assert!(session.state.current_answer.is_empty());
        assert_eq!(
            session.state.current_question.as_ref().unwrap().text,
            "What is borrowing?"
        );
        let commands = drain(&mut rx);
        assert!(matches!(commands.last(), Some(Command::GiveHint(h)) if h == "Think about lifetimes."));

        // The re-answer lands in the follow-up slot for question 1, not a new primary score.
        session.state.current_answer = "still unsure".to_string();
        session.evaluate_answer().await;
        assert_eq!(session.state.scores, vec![2]);
        assert_eq!(session.state.follow_up(0), Some(("still unsure", 2, "Scored 2.")));
        assert_aligned(&session.state);
    }

    #[tokio::test]
    async fn test_follow_up_remediation_replaces_current_question() {
        let mut judge = MockJudge::new();
        judge
            .expect_remediate()
            .returning(|_, _, _| {
                Ok(r#"{"type": "follow-up", "content": "What does & do?", "answer_key": "Borrows."}"#.to_string())
            })
            .once();
        let (mut session, _rx) = session_with(judge, empty_source());
        session.present(
            QuestionKind::Primary,
            Question::new("What is borrowing?", "Temporary access.", Difficulty::Medium),
        );
        session.state.current_answer = "dunno".to_string();

        let outcome = session.generate_remediation().await;
        let expected = Question::new("What does & do?", "Borrows.", Difficulty::Easy);
        assert_eq!(outcome, RemediationOutcome::FollowUp(expected.clone()));
        assert_eq!(session.state.current_question, Some(expected));
        assert!(session.state.is_follow_up);
        assert_eq!(session.state.question_count, 1);
        assert_eq!(session.state.questions.len(), 1);
        assert_eq!(session.state.hint_count, 1);
    }

    #[tokio::test]
    async fn test_repeated_follow_up_text_selects_fresh_easy_question() {
        let mut judge = MockJudge::new();
        judge
            .expect_remediate()
            .returning(|_, _, _| {
                Ok(r#"{"type": "follow_up", "content": "What is borrowing?"}"#.to_string())
            })
            .once();
        judge
            .expect_generate_question()
            .withf(|_, difficulty, _| *difficulty == Difficulty::Easy)
            .returning(|_, _, _| Err(anyhow::anyhow!("model unavailable")))
            .once();
        let (mut session, _rx) = session_with(judge, empty_source());
        session.present(
            QuestionKind::Primary,
            Question::new("What is borrowing?", "Temporary access.", Difficulty::Medium),
        );
        session.state.current_answer = "dunno".to_string();

        let RemediationOutcome::FollowUp(follow_up) = session.generate_remediation().await else {
            panic!("Expected a follow-up question");
        };
        assert_eq!(follow_up.text, "Explain a easy concept in Rust.");
        assert_eq!(follow_up.difficulty, Difficulty::Easy);
        assert_eq!(session.state.current_question, Some(follow_up));
        assert!(session.state.is_follow_up);
        assert_eq!(session.state.question_count, 1);
        assert_eq!(session.state.questions.len(), 1);
        assert_eq!(session.state.used_questions.len(), 2);
    }

    #[tokio::test]
    async fn test_answer_before_begin_is_rejected() {
        // No expectations: the judge must not be consulted.
        let judge = MockJudge::new();
        let (mut session, mut rx) = session_with(judge, empty_source());

        assert!(session.submit_answer("hello").await.is_err());
        assert!(session.submit_answer("x").await.is_err());
        assert!(session.state.answers.is_empty());
        assert!(session.state.scores.is_empty());
        assert!(session.state.history.is_empty());
        assert!(drain(&mut rx).is_empty());

        session.state.current_answer = "stray".to_string();
        let evaluation = session.evaluate_answer().await;
        assert_eq!(evaluation.feedback, UNAVAILABLE_EVALUATION_FEEDBACK);
        assert!(session.state.feedbacks.is_empty());
        assert_aligned(&session.state);
    }

    #[tokio::test]
    async fn test_answers_stay_paired_after_rejected_early_answer() {
        let mut judge = MockJudge::new();
        judge
            .expect_generate_question()
            .returning(|_, _, _| Ok(question_json(1)));
        judge
            .expect_evaluate()
            .withf(|question, _, answer| {
                question.to_string() == "Generated question 1?" && answer.to_string() == "real answer"
            })
            .returning(|_, _, _| Ok(evaluation_json(8)))
            .once();
        let (mut session, _rx) = session_with(judge, empty_source());

        assert!(session.submit_answer("too early").await.is_err());
        session.begin().await.unwrap();
        session.submit_answer("real answer").await.unwrap();

        assert_eq!(session.state.answers[0], "real answer");
        assert_eq!(session.state.scores[0], 8);
        assert_eq!(session.state.answers.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_remediation_defaults_to_generic_hint() {
        let mut judge = MockJudge::new();
        judge
            .expect_remediate()
            .returning(|_, _, _| Ok(r#"{"kind": "???"}"#.to_string()))
            .once();
        let (mut session, _rx) = session_with(judge, empty_source());
        session.present(
            QuestionKind::Primary,
            Question::new("Q?", "K.", Difficulty::Easy),
        );

        assert_eq!(
            session.generate_remediation().await,
            RemediationOutcome::Hint(GENERIC_HINT.to_string())
        );
    }

    #[tokio::test]
    async fn test_remediation_budget_exhausted_forces_continue() {
        let judge = MockJudge::new();
        let (mut session, _rx) = session_with(judge, empty_source());
        session.present(
            QuestionKind::Primary,
            Question::new("Q?", "K.", Difficulty::Easy),
        );
        session.state.hint_count = 1;
        session.state.is_follow_up = true;
        session.state.current_answer = "x".to_string();

        assert_eq!(session.generate_remediation().await, RemediationOutcome::Exhausted);
        assert_eq!(session.state.decision, Some(Decision::Continue));
        assert_eq!(session.state.hint_count, 0);
        assert!(!session.state.is_follow_up);
        assert!(session.state.current_answer.is_empty());
    }

    #[tokio::test]
    async fn test_finalize_falls_back_to_uniform_weights() {
        let mut judge = MockJudge::new();
        judge
            .expect_weigh()
            .returning(|_, _| Ok(r#"{"weights": [0.5, 0.5, 0.5, 0.5, 0.5]}"#.to_string()))
            .once();
        judge
            .expect_summarize()
            .returning(|_, _, _| Ok("no json here".to_string()))
            .once();
        let (mut session, _rx) = session_with(judge, empty_source());
        for (i, score) in [8u8, 7, 3, 9, 6].into_iter().enumerate() {
            session.present(
                QuestionKind::Primary,
                Question::new(format!("Q{i}"), "K", Difficulty::Easy),
            );
            session.state.record_primary(
                format!("A{i}"),
                &Evaluation {
                    score,
                    feedback: "fb".to_string(),
                },
            );
        }

        let summary = session.finalize().await;
        assert_eq!(summary.weights, vec![0.2, 0.2, 0.2, 0.2, 0.2]);
        assert!((summary.final_score - 6.6).abs() < 1e-9);
        assert_eq!(summary.narrative, UNABLE_TO_SUMMARIZE);
        assert!(session.is_complete());
    }

    #[tokio::test]
    async fn test_finalize_uses_valid_weights() {
        let mut judge = MockJudge::new();
        judge
            .expect_weigh()
            .withf(|topic, questions| topic.to_string() == "Rust" && questions.len() == 2)
            .returning(|_, _| Ok(r#"{"weights": [0.75, 0.25]}"#.to_string()))
            .once();
        judge
            .expect_summarize()
            .withf(|_, scores, _| scores.to_vec() == vec![10u8, 2])
            .returning(|_, _, _| Ok(r#"{"summary": "Strong start."}"#.to_string()))
            .once();
        let (mut session, _rx) = session_with(judge, empty_source());
        for (i, score) in [10u8, 2].into_iter().enumerate() {
            session.present(
                QuestionKind::Primary,
                Question::new(format!("Q{i}"), "K", Difficulty::Easy),
            );
            session.state.record_primary(
                "A".to_string(),
                &Evaluation {
                    score,
                    feedback: "fb".to_string(),
                },
            );
        }
        // Follow-up scores never enter the weighted total.
        session.state.follow_up_scores = vec![None, Some(10)];
        session.state.follow_up_answers = vec![None, Some("A".to_string())];
        session.state.follow_up_feedbacks = vec![None, Some("fb".to_string())];

        let summary = session.finalize().await;
        assert!((summary.final_score - 8.0).abs() < 1e-9);
        assert_eq!(summary.narrative, "Strong start.");
    }

    #[tokio::test]
    async fn test_full_interview_decision_and_difficulty_path() {
        let mut judge = MockJudge::new();
        let mut generated = 0usize;
        judge.expect_generate_question().returning(move |_, _, _| {
            generated += 1;
            Ok(question_json(generated))
        });
        // Primary scores 8, 7, 3, then 5 for the hint re-answer, then 9, 6.
        let mut scores = vec![8u8, 7, 3, 5, 9, 6].into_iter();
        judge
            .expect_evaluate()
            .times(6)
            .returning(move |_, _, _| Ok(evaluation_json(scores.next().unwrap())));
        judge
            .expect_remediate()
            .returning(|_, _, _| Ok(r#"{"type": "hint", "content": "Recall the basics."}"#.to_string()))
            .once();
        judge
            .expect_weigh()
            .returning(|_, _| Ok(r#"{"weights": [0.2, 0.2, 0.2, 0.2, 0.2]}"#.to_string()))
            .once();
        judge
            .expect_summarize()
            .returning(|_, _, _| Ok(r#"{"summary": "Good overall."}"#.to_string()))
            .once();
        let (mut session, mut rx) = session_with(judge, empty_source());

        session.begin().await.unwrap();
        let mut difficulties = vec![session.state.current_question.as_ref().unwrap().difficulty];
        let mut decisions = vec![];
        for answer in ["a1", "a2", "a3", "a3 again", "a4", "a5"] {
            let decision = session.submit_answer(answer).await.unwrap();
            decisions.push(decision);
            if decision == Decision::Continue {
                difficulties.push(session.state.current_difficulty);
            }
            assert!(session.state.hint_count <= session.limits().max_hints);
            assert!(session.state.question_count <= session.limits().max_questions);
        }

        assert_eq!(
            decisions,
            vec![
                Decision::Continue,
                Decision::Continue,
                Decision::Hint,
                Decision::Continue,
                Decision::Continue,
                Decision::End,
            ]
        );
        assert_eq!(
            difficulties,
            vec![
                Difficulty::Easy,
                Difficulty::Medium,
                Difficulty::Hard,
                Difficulty::Medium,
                Difficulty::Hard,
            ]
        );
        let asked_at: Vec<Difficulty> = session.state.questions.iter().map(|q| q.difficulty).collect();
        assert_eq!(asked_at, difficulties);
        assert_aligned(&session.state);
        assert_eq!(session.state.scores, vec![8, 7, 3, 9, 6]);
        assert_eq!(session.state.follow_up(2), Some(("a3 again", 5, "Scored 5.")));
        assert_eq!(session.state.follow_up_answers.len(), 3);

        let commands = drain(&mut rx);
        let asked = commands
            .iter()
            .filter(|c| matches!(c, Command::AskQuestion { .. }))
            .count();
        assert_eq!(asked, 5);
        match commands.last() {
            Some(Command::SessionComplete(summary)) => {
                assert!((summary.final_score - 6.6).abs() < 1e-9);
                assert_eq!(summary.narrative, "Good overall.");
            }
            other => panic!("Expected SessionComplete, got {other:?}"),
        }

        assert!(session.submit_answer("late").await.is_err());
    }

    #[tokio::test]
    async fn test_offline_interview_reaches_end() {
        let (command_tx, mut command_rx) = mpsc::channel(64);
        let mut session = InterviewSession::new(
            topic(),
            Arc::new(OfflineJudge),
            Arc::new(QuestionBank::empty()),
            InterviewLimits::default(),
            command_tx,
        );
        session.begin().await.unwrap();
        let mut rounds = 0;
        while !session.is_complete() {
            session.submit_answer("").await.unwrap();
            rounds += 1;
            assert!(rounds < 20, "interview should terminate");
        }
        assert_aligned(&session.state);
        assert_eq!(session.state.question_count, 5);
        let unique: HashSet<&str> = session.state.questions.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(unique.len(), 5);
        assert!(drain(&mut command_rx)
            .iter()
            .any(|c| matches!(c, Command::SessionComplete(_))));
    }
}
