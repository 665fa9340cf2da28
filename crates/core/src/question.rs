use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::session_state::InterviewLimits;

/// Topics shorter than this are rejected before a session starts.
pub const MIN_TOPIC_LEN: usize = 3;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("Topic must be at least {MIN_TOPIC_LEN} characters, got {0:?}")]
    TooShort(String),
}

/// The subject of an interview. Set once when the session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic(String);

impl Topic {
    pub fn parse(input: &str) -> Result<Self, TopicError> {
        let trimmed = input.trim();
        if trimmed.chars().count() < MIN_TOPIC_LEN {
            return Err(TopicError::TooShort(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Difficulty bands, ordered `Easy < Medium < Hard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn step_up(self) -> Self {
        match self {
            Difficulty::Easy => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Hard => Difficulty::Hard,
        }
    }

    pub fn step_down(self) -> Self {
        match self {
            Difficulty::Hard => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Easy => Difficulty::Easy,
        }
    }

    /// The scheduled band for the next primary question, before any score adjustment.
    pub fn for_question_count(question_count: usize) -> Self {
        match question_count {
            0 | 1 => Difficulty::Easy,
            2 | 3 => Difficulty::Medium,
            _ => Difficulty::Hard,
        }
    }

    /// Steps up on a strong score, down on a weak one, otherwise unchanged.
    pub fn adjusted_for(self, score: u8, limits: &InterviewLimits) -> Self {
        if score >= limits.high_score {
            self.step_up()
        } else if score < limits.low_score {
            self.step_down()
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub answer_key: String,
    pub difficulty: Difficulty,
}

impl Question {
    pub fn new(text: impl Into<String>, answer_key: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            text: text.into(),
            answer_key: answer_key.into(),
            difficulty,
        }
    }

    /// Deterministic stand-in used when neither the question source nor the judge
    /// produced a usable question.
    pub fn placeholder(topic: &Topic, difficulty: Difficulty) -> Self {
        Self {
            text: format!("Explain a {difficulty} concept in {topic}."),
            answer_key: format!(
                "A clear, accurate explanation of a {difficulty}-level concept in {topic}, \
                 with an example of where it applies."
            ),
            difficulty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_rejects_short_input() {
        assert_eq!(
            Topic::parse("  go "),
            Err(TopicError::TooShort("go".to_string()))
        );
        assert_eq!(Topic::parse(" Rust ").unwrap().as_str(), "Rust");
    }

    #[test]
    fn test_difficulty_steps_are_clamped() {
        assert_eq!(Difficulty::Easy.step_down(), Difficulty::Easy);
        assert_eq!(Difficulty::Easy.step_up(), Difficulty::Medium);
        assert_eq!(Difficulty::Hard.step_up(), Difficulty::Hard);
        assert_eq!(Difficulty::Hard.step_down(), Difficulty::Medium);
    }

    #[test]
    fn test_schedule_by_question_count() {
        let bands: Vec<Difficulty> = (0..6).map(Difficulty::for_question_count).collect();
        assert_eq!(
            bands,
            vec![
                Difficulty::Easy,
                Difficulty::Easy,
                Difficulty::Medium,
                Difficulty::Medium,
                Difficulty::Hard,
                Difficulty::Hard,
            ]
        );
    }

    #[test]
    fn test_adjusted_for_score() {
        let limits = InterviewLimits::default();
        assert_eq!(Difficulty::Medium.adjusted_for(7, &limits), Difficulty::Hard);
        assert_eq!(Difficulty::Medium.adjusted_for(6, &limits), Difficulty::Medium);
        assert_eq!(Difficulty::Medium.adjusted_for(4, &limits), Difficulty::Medium);
        assert_eq!(Difficulty::Medium.adjusted_for(3, &limits), Difficulty::Easy);
    }

    #[test]
    fn test_difficulty_parses_case_insensitively() {
        assert_eq!("HARD".parse::<Difficulty>(), Ok(Difficulty::Hard));
        assert_eq!(" easy ".parse::<Difficulty>(), Ok(Difficulty::Easy));
        assert!("extreme".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_placeholder_question_mentions_topic_and_band() {
        let topic = Topic::parse("Data Structures").unwrap();
        let q = Question::placeholder(&topic, Difficulty::Medium);
        assert_eq!(q.text, "Explain a medium concept in Data Structures.");
        assert_eq!(q.difficulty, Difficulty::Medium);
        assert!(!q.answer_key.is_empty());
    }
}
