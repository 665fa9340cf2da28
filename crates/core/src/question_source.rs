use anyhow::Result;
use async_trait::async_trait;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use std::path::Path;

use crate::question::{Difficulty, Question};

/// Minimum fuzzy score for a bank entry's topic to count as the requested topic.
const TOPIC_MATCH_THRESHOLD: i64 = 70;

/// A best-effort store of pre-authored questions, consulted before asking the judge to generate one.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn lookup(&self, topic: &str, difficulty: Difficulty) -> Result<Option<Question>>;
}

#[derive(Debug, thiserror::Error)]
pub enum QuestionBankError {
    #[error("Failed to read question bank {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Question bank {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One record of the bank file.
#[derive(Debug, Clone, Deserialize)]
pub struct BankEntry {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub topic: String,
    pub question: String,
    pub answer_key: String,
    pub difficulty: Difficulty,
}

/// An in-memory question bank with fuzzy similarity ranking.
pub struct QuestionBank {
    entries: Vec<BankEntry>,
    matcher: SkimMatcherV2,
}

impl QuestionBank {
    pub fn new(entries: Vec<BankEntry>) -> Self {
        Self {
            entries,
            matcher: SkimMatcherV2::default(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn load(path: &Path) -> Result<Self, QuestionBankError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| QuestionBankError::Read {
            path: display.clone(),
            source,
        })?;
        let entries: Vec<BankEntry> =
            serde_json::from_str(&raw).map_err(|source| QuestionBankError::Parse {
                path: display,
                source,
            })?;
        tracing::info!("Loaded {} questions from {}", entries.len(), path.display());
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn topic_matches(&self, entry_topic: &str, topic: &str) -> bool {
        entry_topic.eq_ignore_ascii_case(topic)
            || self
                .matcher
                .fuzzy_match(&entry_topic.to_lowercase(), &topic.to_lowercase())
                .unwrap_or(0)
                > TOPIC_MATCH_THRESHOLD
    }

    /// Returns the single closest entry for the topic and band (k = 1).
    pub fn best_match(&self, topic: &str, difficulty: Difficulty) -> Option<&BankEntry> {
        let query = format!("{topic} {difficulty} interview question").to_lowercase();
        self.entries
            .iter()
            .filter(|entry| entry.difficulty == difficulty)
            .filter(|entry| self.topic_matches(&entry.topic, topic))
            .map(|entry| {
                let text = entry.question.to_lowercase();
                // Score both directions; the query is usually longer than short questions.
                let score = self
                    .matcher
                    .fuzzy_match(&text, topic.to_lowercase().as_str())
                    .unwrap_or(0)
                    .max(self.matcher.fuzzy_match(&query, &text).unwrap_or(0));
                (score, entry)
            })
            // `max_by_key` keeps the last maximum; reverse so ties go to the earliest entry.
            .rev()
            .max_by_key(|(score, _)| *score)
            .map(|(_, entry)| entry)
    }
}

#[async_trait]
impl QuestionSource for QuestionBank {
    async fn lookup(&self, topic: &str, difficulty: Difficulty) -> Result<Option<Question>> {
        let found = self.best_match(topic, difficulty).map(|entry| Question {
            text: entry.question.clone(),
            answer_key: entry.answer_key.clone(),
            difficulty: entry.difficulty,
        });
        tracing::debug!(
            "Question bank lookup for '{}' ({}): {}",
            topic,
            difficulty,
            if found.is_some() { "hit" } else { "miss" }
        );
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn entry(topic: &str, question: &str, difficulty: Difficulty) -> BankEntry {
        BankEntry {
            id: None,
            topic: topic.to_string(),
            question: question.to_string(),
            answer_key: format!("Answer to: {question}"),
            difficulty,
        }
    }

    #[tokio::test]
    async fn test_lookup_filters_topic_and_difficulty() {
        let bank = QuestionBank::new(vec![
            entry("Python", "What is a list comprehension?", Difficulty::Easy),
            entry("Python", "Explain the GIL.", Difficulty::Hard),
            entry("Networking", "What is TCP?", Difficulty::Easy),
        ]);

        let q = bank.lookup("python", Difficulty::Hard).await.unwrap().unwrap();
        assert_eq!(q.text, "Explain the GIL.");
        assert_eq!(q.difficulty, Difficulty::Hard);
        assert_eq!(q.answer_key, "Answer to: Explain the GIL.");

        let q = bank.lookup("Networking", Difficulty::Easy).await.unwrap().unwrap();
        assert_eq!(q.text, "What is TCP?");

        assert!(bank.lookup("Networking", Difficulty::Hard).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_is_deterministic() {
        let bank = QuestionBank::new(vec![
            entry("Rust", "What is ownership?", Difficulty::Easy),
            entry("Rust", "What is a borrow?", Difficulty::Easy),
        ]);
        let first = bank.lookup("Rust", Difficulty::Easy).await.unwrap();
        let second = bank.lookup("Rust", Difficulty::Easy).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_bank_misses() {
        let bank = QuestionBank::empty();
        assert!(bank.is_empty());
        assert!(bank.lookup("Rust", Difficulty::Easy).await.unwrap().is_none());
    }

    #[test]
    fn test_load_from_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"[{{"id": 1, "topic": "SQL", "question": "What is a JOIN?", "answer_key": "Combines rows.", "difficulty": "easy"}}]"#
        )?;
        let bank = QuestionBank::load(file.path())?;
        assert_eq!(bank.len(), 1);
        Ok(())
    }

    #[test]
    fn test_load_rejects_invalid_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "{{ not a list")?;
        assert!(matches!(
            QuestionBank::load(file.path()),
            Err(QuestionBankError::Parse { .. })
        ));
        assert!(matches!(
            QuestionBank::load(Path::new("definitely/not/here.json")),
            Err(QuestionBankError::Read { .. })
        ));
        Ok(())
    }
}
