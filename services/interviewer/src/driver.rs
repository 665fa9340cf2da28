use anyhow::Result;
use interview_core::session_state::InterviewSession;
use std::future::Future;
use tokio::io::{AsyncBufRead, Lines};

/// How the answer loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Interrupted,
    InputClosed,
}

/// Feeds answer lines into `session` until it completes, input ends, or `shutdown` resolves.
///
/// `shutdown` is raced against both the wait for input and the processing of each answer, so an
/// interrupt during a slow judge call abandons the session instead of finishing it.
pub async fn run<R, S>(
    session: &mut InterviewSession,
    lines: &mut Lines<R>,
    shutdown: S,
) -> Result<Outcome>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    while !session.is_complete() {
        let answer = tokio::select! {
            line = lines.next_line() => match line? {
                Some(answer) => answer,
                None => {
                    tracing::info!("End of input, stopping the interview.");
                    return Ok(Outcome::InputClosed);
                }
            },
            _ = &mut shutdown => {
                tracing::info!("Received Ctrl-C, shutting down...");
                return Ok(Outcome::Interrupted);
            }
        };

        tokio::select! {
            result = session.submit_answer(&answer) => {
                result?;
            }
            _ = &mut shutdown => {
                tracing::info!("Received Ctrl-C while processing an answer, shutting down...");
                return Ok(Outcome::Interrupted);
            }
        }
    }

    Ok(Outcome::Completed)
}
