use anyhow::{Context, Result};
use interview_core::scoring::Summary;
use interview_core::session_state::SessionState;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Renders a finished interview as markdown.
pub fn render_markdown(state: &SessionState, summary: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Interview: {}\n", state.topic);

    for (i, question) in state.questions.iter().enumerate() {
        let _ = writeln!(out, "## Question {}\n", i + 1);
        let _ = writeln!(out, "- **Question** ({}): {}", question.difficulty, question.text);
        let _ = writeln!(
            out,
            "- **Answer**: {}",
            state.answers.get(i).map(String::as_str).unwrap_or("(none)")
        );
        if let Some(score) = state.scores.get(i) {
            let _ = writeln!(out, "- **Score**: {score}/10");
        }
        if let Some(weight) = summary.weights.get(i) {
            let _ = writeln!(out, "- **Weight**: {weight:.2}");
        }
        if let Some(feedback) = state.feedbacks.get(i) {
            let _ = writeln!(out, "- **Feedback**: {feedback}");
        }
        if let Some((answer, score, feedback)) = state.follow_up(i) {
            let _ = writeln!(out, "- **Follow-up answer**: {answer}");
            let _ = writeln!(out, "- **Follow-up score**: {score}/10");
            let _ = writeln!(out, "- **Follow-up feedback**: {feedback}");
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## Result\n");
    let _ = writeln!(out, "**Final score**: {:.1}/10", summary.final_score);
    let _ = writeln!(out, "**Average score**: {:.1}/10\n", summary.average_score);
    let _ = writeln!(out, "**Summary**: {}", summary.narrative);
    out
}

/// Writes the transcript to `dir/interview_<timestamp>.md` and returns its path.
pub fn write_transcript(dir: &Path, state: &SessionState, summary: &Summary) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create transcript directory: {}", dir.display()))?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("interview_{timestamp}.md"));
    fs::write(&path, render_markdown(state, summary))
        .with_context(|| format!("Failed to write transcript: {}", path.display()))?;
    tracing::info!("Transcript written to {}", path.display());
    Ok(path)
}
