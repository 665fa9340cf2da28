use crate::judge::Judge;
use crate::question::Difficulty;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

/// A deterministic `Judge` that makes no API calls.
///
/// It produces plausible, templated responses so an interview can be run end to end without a
/// model provider: numbered questions, keyword-overlap grading against the answer key, a fixed
/// study hint, uniform weights, and a formulaic summary.
pub struct OfflineJudge;

/// Lowercased words of at least four letters; short words carry little signal.
fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4)
        .map(str::to_lowercase)
        .collect()
}

/// Share of the answer key's keywords present in the answer, scaled to 0..=10.
pub fn overlap_score(answer_key: &str, answer: &str) -> u8 {
    let expected = keywords(answer_key);
    if expected.is_empty() {
        return if answer.trim().is_empty() { 0 } else { 5 };
    }
    let given = keywords(answer);
    let hits = expected.intersection(&given).count();
    ((hits as f64 / expected.len() as f64) * 10.0).round() as u8
}

#[async_trait]
impl Judge for OfflineJudge {
    async fn generate_question(
        &self,
        topic: &str,
        difficulty: Difficulty,
        history: &str,
    ) -> Result<String> {
        // Number questions by how many have been asked so the text never repeats.
        let asked = history
            .lines()
            .filter(|l| l.starts_with("Question:") || l.starts_with("Follow-up:"))
            .count();
        let (question, answer_key) = match difficulty {
            Difficulty::Easy => (
                format!("Question {}: What is one basic building block of {topic}, and what is it used for?", asked + 1),
                format!("A correct definition of a fundamental {topic} concept and a typical use case."),
            ),
            Difficulty::Medium => (
                format!("Question {}: Describe how a core mechanism in {topic} works internally.", asked + 1),
                format!("A step-by-step explanation of a {topic} mechanism, including its inputs, outputs, and trade-offs."),
            ),
            Difficulty::Hard => (
                format!("Question {}: Walk through a difficult failure mode in {topic} and how you would diagnose it.", asked + 1),
                format!("A realistic {topic} failure scenario, the symptoms, the diagnosis steps, and the fix."),
            ),
        };
        Ok(serde_json::json!({
            "question": question,
            "answer_key": answer_key,
            "difficulty": difficulty,
        })
        .to_string())
    }

    async fn evaluate(&self, _question: &str, answer_key: &str, answer: &str) -> Result<String> {
        let score = overlap_score(answer_key, answer);
        let feedback = match score {
            0..=3 => "The answer misses most of the key points.",
            4..=6 => "The answer covers some of the key points but lacks depth.",
            _ => "The answer covers the key points well.",
        };
        Ok(serde_json::json!({ "score": score, "feedback": feedback }).to_string())
    }

    async fn remediate(&self, question: &str, answer: &str, _feedback: &str) -> Result<String> {
        // Simulate an easier restatement when nothing was attempted, a hint otherwise.
        let reply = if answer.trim().is_empty() {
            serde_json::json!({
                "type": "follow_up",
                "content": format!("In one sentence, what is the main idea behind this: {question}"),
            })
        } else {
            serde_json::json!({
                "type": "hint",
                "content": "Focus on the definition first, then give a concrete example.",
            })
        };
        Ok(reply.to_string())
    }

    async fn weigh(&self, _topic: &str, questions: &[String]) -> Result<String> {
        let weights = crate::scoring::uniform_weights(questions.len());
        Ok(serde_json::json!({ "weights": weights }).to_string())
    }

    async fn summarize(&self, topic: &str, scores: &[u8], _feedbacks: &[String]) -> Result<String> {
        let average = crate::scoring::average_score(scores);
        let verdict = if average >= 7.0 {
            "shows a solid command of the material"
        } else if average >= 4.0 {
            "shows a working understanding with gaps to close"
        } else {
            "needs more preparation on the fundamentals"
        };
        Ok(serde_json::json!({
            "summary": format!(
                "Across {} questions on {topic}, the candidate averaged {average:.1}/10 and {verdict}.",
                scores.len()
            )
        })
        .to_string())
    }
}
