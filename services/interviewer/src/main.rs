use anyhow::{Context, Result};
use clap::Parser;
use interview_core::judge::{Judge, JudgeClient};
use interview_core::offline_judge::OfflineJudge;
use interview_core::question::{Question, Topic};
use interview_core::question_source::{QuestionBank, QuestionSource};
use interview_core::session_state::InterviewSession;
use interview_core::Command;
use interviewer_service::config::{Config, JudgeProvider};
use interviewer_service::driver::{self, Outcome};
use interviewer_service::{prompt_loader, transcript};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Adaptive technical interview in the terminal")]
struct Cli {
    /// The interview topic. Asked for interactively when omitted.
    topic: Option<String>,
    /// Question bank to draw from before asking the judge.
    #[arg(long)]
    bank: Option<PathBuf>,
    /// Directory of prompt template overrides.
    #[arg(long)]
    prompts: Option<PathBuf>,
    /// Directory the transcript is written to.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Skip writing the markdown transcript.
    #[arg(long)]
    no_transcript: bool,
}

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

fn print_question(label: &str, question: &Question) {
    println!("\n{label} [{}]\n{}", question.difficulty, question.text);
}

/// Renders one command from the interview to the terminal.
fn render(command: Command) {
    match command {
        Command::AskQuestion { number, question } => {
            print_question(&format!("Question {number}"), &question);
        }
        Command::AskFollowUp(question) => print_question("Follow-up", &question),
        Command::GiveHint(hint) => println!("\nHint: {hint}\nTry answering again."),
        Command::ShowEvaluation(evaluation) => {
            println!("Score: {}/10. {}", evaluation.score, evaluation.feedback);
        }
        Command::SessionComplete(summary) => {
            println!("\n=== Interview complete ===");
            println!("Final score: {:.1}/10", summary.final_score);
            println!("Average score: {:.1}/10", summary.average_score);
            println!("{}", summary.narrative);
        }
    }
}

/// Reads a topic from the terminal until a valid one is given. `None` at end of input.
async fn read_topic(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<Topic>> {
    loop {
        prompt("Interview topic: ");
        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        match Topic::parse(&line) {
            Ok(topic) => return Ok(Some(topic)),
            Err(e) => println!("{e}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Configuration loaded successfully. Starting interviewer...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();
    let bank_path = args.bank.unwrap_or(config.question_bank.clone());
    let prompts_dir = args.prompts.unwrap_or(config.prompts_dir.clone());
    let transcript_dir = args.output.unwrap_or(config.transcript_dir.clone());

    // --- 4. Load Prompts ---
    let prompts = prompt_loader::load_judge_prompts(&prompts_dir)
        .context("Failed to load judge prompts")?;

    // --- 5. Initialize the Judge and Question Source ---
    let judge: Arc<dyn Judge> = match config.provider {
        JudgeProvider::OpenAI => {
            let api_key = config
                .openai_api_key
                .clone()
                .context("OPENAI_API_KEY is required for the openai provider")?;
            tracing::info!("Using OpenAI judge with model {}", config.chat_model);
            Arc::new(JudgeClient::new(api_key, config.chat_model.clone(), prompts))
        }
        JudgeProvider::Offline => {
            tracing::info!("Using offline judge");
            Arc::new(OfflineJudge)
        }
    };

    let bank = match QuestionBank::load(&bank_path) {
        Ok(bank) => bank,
        Err(e) => {
            tracing::warn!("Question bank unavailable, relying on the judge: {e}");
            QuestionBank::empty()
        }
    };
    let source: Arc<dyn QuestionSource> = Arc::new(bank);

    // --- 6. Read the Topic ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let topic = match args.topic {
        Some(raw) => Topic::parse(&raw)?,
        None => match read_topic(&mut lines).await? {
            Some(topic) => topic,
            None => {
                tracing::info!("No topic given, exiting.");
                return Ok(());
            }
        },
    };

    // --- 7. Run the Interview ---
    // Create the command channel to decouple core logic from the runtime.
    let (command_tx, mut command_rx) = tokio::sync::mpsc::channel::<Command>(32);

    // This task renders commands from the core logic to the terminal.
    let command_handler = tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            tracing::debug!("COMMAND RECEIVED: {:?}", command);
            render(command);
        }
    });

    let mut session = InterviewSession::new(topic, judge, source, config.limits.clone(), command_tx);
    session.begin().await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {:?}", e);
            std::future::pending::<()>().await;
        }
    };
    let outcome = match driver::run(&mut session, &mut lines, shutdown).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::error!("Interview stopped: {:?}", e);
            None
        }
    };

    let finished = session
        .summary()
        .cloned()
        .filter(|_| outcome == Some(Outcome::Completed))
        .map(|summary| (session.state().clone(), summary));

    // Dropping the session closes the channel so the handler can flush and exit.
    drop(session);
    command_handler.await.context("Command handler task failed")?;

    // --- 8. Write the Transcript ---
    if let Some((state, summary)) = finished {
        if args.no_transcript {
            tracing::info!("Transcript disabled.");
        } else {
            let path = transcript::write_transcript(&transcript_dir, &state, &summary)?;
            println!("Transcript saved to {}", path.display());
        }
    }

    tracing::info!("Shutting down...");
    Ok(())
}
