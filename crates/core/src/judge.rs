use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

use crate::question::Difficulty;

pub const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: String,
}

// The `Judge` trait is the model-backed side of an interview: it writes questions, grades
// answers, proposes remediation, and weighs and summarizes the finished interview.
//
// Every method returns the model's raw text. Shape validation happens in `crate::response`,
// so a bad payload and a transport error degrade to the same fallback in the session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Judge: Send + Sync {
    async fn generate_question(
        &self,
        topic: &str,
        difficulty: Difficulty,
        history: &str,
    ) -> Result<String>;

    async fn evaluate(&self, question: &str, answer_key: &str, answer: &str) -> Result<String>;

    async fn remediate(&self, question: &str, answer: &str, feedback: &str) -> Result<String>;

    async fn weigh(&self, topic: &str, questions: &[String]) -> Result<String>;

    async fn summarize(&self, topic: &str, scores: &[u8], feedbacks: &[String]) -> Result<String>;
}

/// Prompt templates for each request kind. Placeholders are written as `{name}`.
#[derive(Debug, Clone)]
pub struct Prompts {
    pub generate_question: String,
    pub evaluate_answer: String,
    pub remediate: String,
    pub weigh_questions: String,
    pub summarize: String,
}

const GENERATE_QUESTION_PROMPT: &str = r#"You are a professional technical interviewer. Write one {difficulty} interview question about {topic}.
The question must be clear and concise and must test real technical understanding.
Do not repeat or closely paraphrase any question from the interview so far:
---
{history}
---
Respond STRICTLY as JSON:
{"question": "<question text>", "answer_key": "<expected answer in 2-3 sentences>", "difficulty": "{difficulty}"}"#;

const EVALUATE_ANSWER_PROMPT: &str = r#"You are a technical interviewer grading a candidate.
Question: "{question}"
Expected answer: "{answer_key}"
Candidate's answer: "{answer}"

Score the answer from 0 to 10 for accuracy, clarity, and depth, and explain the score in 2-3 sentences.
Respond STRICTLY as JSON:
{"score": <integer 0-10>, "feedback": "<feedback>"}"#;

const REMEDIATE_PROMPT: &str = r#"A candidate struggled with an interview question.
Question: "{question}"
Candidate's answer: "{answer}"
Grader feedback: "{feedback}"

Either give a short hint that nudges them toward the answer without revealing it, or ask an easier
follow-up question about the same concept. Respond STRICTLY as JSON, one of:
{"type": "hint", "content": "<hint>"}
{"type": "follow_up", "content": "<easier question>", "answer_key": "<expected answer>"}"#;

const WEIGH_QUESTIONS_PROMPT: &str = r#"You are designing the scoring for a technical interview on {topic}.
Assign each question below an importance weight. There are {count} questions; return exactly {count}
weights, in order, that sum to 1.0.
{questions}
Respond STRICTLY as JSON:
{"weights": [<float>, ...]}"#;

const SUMMARIZE_PROMPT: &str = r#"You are a technical interviewer writing final feedback for an interview on {topic}.
Scores per question (0-10): {scores}
Feedback per question: {feedbacks}

Summarize the candidate's performance in 3-5 sentences: strengths, and areas to improve.
Respond STRICTLY as JSON:
{"summary": "<summary>"}"#;

impl Default for Prompts {
    fn default() -> Self {
        Self {
            generate_question: GENERATE_QUESTION_PROMPT.to_string(),
            evaluate_answer: EVALUATE_ANSWER_PROMPT.to_string(),
            remediate: REMEDIATE_PROMPT.to_string(),
            weigh_questions: WEIGH_QUESTIONS_PROMPT.to_string(),
            summarize: SUMMARIZE_PROMPT.to_string(),
        }
    }
}

impl Prompts {
    /// Defaults, with any template present in `overrides` (keyed by field name) replacing its default.
    pub fn with_overrides(mut overrides: HashMap<String, String>) -> Self {
        let mut prompts = Self::default();
        for (key, slot) in [
            ("generate_question", &mut prompts.generate_question),
            ("evaluate_answer", &mut prompts.evaluate_answer),
            ("remediate", &mut prompts.remediate),
            ("weigh_questions", &mut prompts.weigh_questions),
            ("summarize", &mut prompts.summarize),
        ] {
            if let Some(template) = overrides.remove(key) {
                tracing::debug!("Using prompt override for '{}'", key);
                *slot = template;
            }
        }
        for unused in overrides.keys() {
            tracing::warn!("Ignoring unknown prompt template '{}'", unused);
        }
        prompts
    }
}

/// Substitutes `{name}` placeholders in a template.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

pub struct JudgeClient {
    client: Client,
    api_key: String,
    model: String,
    url: String,
    prompts: Prompts,
}

impl JudgeClient {
    pub fn new(api_key: String, model: String, prompts: Prompts) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            url: OPENAI_CHAT_COMPLETIONS_URL.to_string(),
            prompts,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn complete(&self, prompt: String, temperature: f32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "response_format": { "type": "json_object" },
            "temperature": temperature
        });

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<LlmResponse>()
            .await?;

        let answer = &resp
            .choices
            .first()
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?
            .message
            .content;
        tracing::trace!("LLM replied: {}", answer);
        Ok(answer.clone())
    }
}

#[async_trait]
impl Judge for JudgeClient {
    async fn generate_question(
        &self,
        topic: &str,
        difficulty: Difficulty,
        history: &str,
    ) -> Result<String> {
        let history = if history.trim().is_empty() {
            "(no questions yet)"
        } else {
            history
        };
        let prompt = render(
            &self.prompts.generate_question,
            &[
                ("topic", topic),
                ("difficulty", difficulty.as_str()),
                ("history", history),
            ],
        );
        self.complete(prompt, 0.7).await
    }

    async fn evaluate(&self, question: &str, answer_key: &str, answer: &str) -> Result<String> {
        let prompt = render(
            &self.prompts.evaluate_answer,
            &[
                ("question", question),
                ("answer_key", answer_key),
                ("answer", answer),
            ],
        );
        // Low temperature for consistent grading.
        self.complete(prompt, 0.1).await
    }

    async fn remediate(&self, question: &str, answer: &str, feedback: &str) -> Result<String> {
        let prompt = render(
            &self.prompts.remediate,
            &[
                ("question", question),
                ("answer", answer),
                ("feedback", feedback),
            ],
        );
        self.complete(prompt, 0.5).await
    }

    async fn weigh(&self, topic: &str, questions: &[String]) -> Result<String> {
        let listed = questions
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}. {}", i + 1, q))
            .collect::<Vec<_>>()
            .join("\n");
        let count = questions.len().to_string();
        let prompt = render(
            &self.prompts.weigh_questions,
            &[("topic", topic), ("count", &count), ("questions", &listed)],
        );
        self.complete(prompt, 0.0).await
    }

    async fn summarize(&self, topic: &str, scores: &[u8], feedbacks: &[String]) -> Result<String> {
        let scores = format!("{scores:?}");
        let feedbacks = serde_json::to_string(feedbacks)?;
        let prompt = render(
            &self.prompts.summarize,
            &[("topic", topic), ("scores", &scores), ("feedbacks", &feedbacks)],
        );
        self.complete(prompt, 0.3).await
    }
}
