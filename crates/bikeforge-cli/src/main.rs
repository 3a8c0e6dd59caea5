use anyhow::{Context, Result};
use base64::Engine;
use bikeforge_ai::llm_provider::MessageRole;
use bikeforge_api::{init_tracing, AppState};
use bikeforge_core::catalog::QuestionCatalog;
use bikeforge_core::config_manager::{BikeForgeConfig, ConfigManager};
use bikeforge_core::specification::BikeSpecification;
use bikeforge_dialogue::{
    interpret, ConversationState, Interpretation, QuestionInstance, QuestionOption,
    StructuredOracleReply, TurnResult,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

const FIRST_TURN: &str = "Hi";

#[derive(Parser)]
#[command(name = "bikeforge")]
#[command(about = "BikeForge CLI - Design a custom motorcycle through a guided conversation", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./.bikeforge.toml, then ~/.bikeforge/config.toml)
    #[arg(short, long, global = true, env = "BIKEFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Design a bike interactively
    Chat {
        /// Session ID to continue (a new one is generated otherwise)
        #[arg(short, long)]
        session: Option<String>,

        /// Render the finished bike to this PNG file
        #[arg(short, long)]
        render: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Destination of the configuration file
        #[arg(short, long, default_value = ".bikeforge.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the question catalog
    Catalog,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path, force } => handle_init(&path, force),
        Commands::Catalog => {
            print_catalog();
            Ok(())
        }
        Commands::Chat { session, render } => {
            let manager = match &cli.config {
                Some(path) => ConfigManager::load_from(path),
                None => ConfigManager::load(),
            }
            .context("failed to load configuration")?;
            let mut config = manager.config().clone();
            if cli.verbose {
                config.logging.level = "debug".to_string();
            } else if std::env::var("RUST_LOG").is_err() {
                config.logging.level = "warn".to_string();
            }
            init_tracing(&config.logging, "");
            handle_chat(&config, session, render).await
        }
    }
}

fn handle_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    ConfigManager::create_default_config(path)?;
    println!("{} Wrote {}", "✓".green(), path.display());
    println!("  Set OPENAI_API_KEY or edit the [llm] section before chatting.");
    Ok(())
}

fn print_catalog() {
    println!("{}", "BikeForge question catalog".bold());
    for (index, def) in QuestionCatalog::iter().enumerate() {
        println!();
        println!(
            "{} {} {}",
            format!("{:>2}.", index + 1).cyan(),
            def.prompt.bold(),
            format!("({})", def.id.as_str()).dimmed()
        );
        for (n, option) in def.options_with_custom().iter().enumerate() {
            println!("     {}. {}", n + 1, option.text);
        }
    }
}

async fn handle_chat(
    config: &BikeForgeConfig,
    session: Option<String>,
    render: Option<PathBuf>,
) -> Result<()> {
    let state = AppState::from_config(config)?;
    let session_id = session.unwrap_or_else(|| Uuid::new_v4().to_string());
    let conversation = state.dialogue.begin_or_resume(&session_id).await?;

    println!("{} {}", "Session:".bold(), session_id.cyan());

    let mut options: Vec<QuestionOption> = Vec::new();
    let mut pending = match opening(&conversation) {
        Opening::Greet => Some(FIRST_TURN.to_string()),
        Opening::Continue(question) => {
            println!("Continuing where you left off.");
            print_question(&question.question_text, &question);
            options = question.options;
            None
        }
        Opening::Replay => Some(String::new()),
    };
    let mut retry: Option<String> = None;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let specification = loop {
        if let Some(outgoing) = pending.take() {
            match state.dialogue.submit_turn(&session_id, &outgoing).await {
                Ok(TurnResult::Question { message, question }) => {
                    print_question(&message, &question);
                    options = question.options;
                }
                Ok(TurnResult::Completion {
                    message,
                    specification,
                }) => {
                    println!("\n{}", message.green());
                    break specification;
                }
                Ok(TurnResult::Error { message, .. }) => {
                    println!("\n{}", message.yellow());
                }
                Err(e) if e.is_unavailable() => {
                    eprintln!("{} {}", "Oracle unavailable:".red(), e);
                    eprintln!("Press Enter to retry, or type a different answer.");
                    retry = Some(outgoing);
                }
                Err(e) => return Err(e.into()),
            }
        }

        print!("{} ", ">".cyan().bold());
        std::io::Write::flush(&mut std::io::stdout())?;
        let Some(line) = stdin.next_line().await? else {
            println!("\nBye! Resume later with --session {}", session_id);
            return Ok(());
        };
        match next_turn(&line, &options, retry.as_deref()) {
            NextTurn::Send(message) => {
                retry = None;
                pending = Some(message);
            }
            NextTurn::Reprompt => {
                println!("{}", "(type an answer or an option number)".dimmed())
            }
        }
    };

    print_specification(&specification);

    if let Some(path) = render {
        println!("\nRendering your bike...");
        let rendered = state.render.render(&session_id, None, None).await?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(rendered.image_base64.as_bytes())
            .context("image oracle returned invalid base64")?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{} Saved {}", "✓".green(), path.display());
    }

    Ok(())
}

/// How a chat session starts.
#[derive(Debug, PartialEq)]
enum Opening {
    /// Fresh session: send the greeting turn.
    Greet,
    /// Re-show the pending question and wait for the user.
    Continue(QuestionInstance),
    /// Prior state without a readable question: let the driver pick up from
    /// an empty turn (complete sessions return their specification).
    Replay,
}

fn opening(conversation: &ConversationState) -> Opening {
    if conversation.is_complete() {
        return Opening::Replay;
    }
    let Some(last) = conversation
        .transcript
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Assistant)
    else {
        return Opening::Greet;
    };
    match interpret(&last.content) {
        Interpretation::Ok(StructuredOracleReply::Question { mut question, .. }) => {
            question.current_step = Some(conversation.current_step);
            question.total_steps = conversation.total_steps;
            Opening::Continue(question)
        }
        _ => Opening::Replay,
    }
}

#[derive(Debug, PartialEq)]
enum NextTurn {
    Send(String),
    Reprompt,
}

/// Decide what a line of input submits. An empty line only resends the
/// previous message when that message failed to reach the oracle.
fn next_turn(input: &str, options: &[QuestionOption], retry: Option<&str>) -> NextTurn {
    if !input.trim().is_empty() {
        return NextTurn::Send(resolve_answer(input, options));
    }
    match retry {
        Some(previous) => NextTurn::Send(previous.to_string()),
        None => NextTurn::Reprompt,
    }
}

/// A bare option number picks that option's text; anything else is sent as typed.
fn resolve_answer(input: &str, options: &[QuestionOption]) -> String {
    let trimmed = input.trim();
    trimmed
        .parse::<u32>()
        .ok()
        .and_then(|n| options.iter().find(|option| option.number == n))
        .map(|option| option.text.clone())
        .unwrap_or_else(|| trimmed.to_string())
}

fn print_question(message: &str, question: &QuestionInstance) {
    println!();
    println!(
        "{}",
        format!("[{}/{}]", question.current_step.unwrap_or(1), question.total_steps).dimmed()
    );
    if message != question.question_text {
        println!("{}", message);
    }
    println!("{}", question.question_text.bold());
    for option in &question.options {
        println!("  {}. {}", option.number, option.text);
    }
    if question.is_free_text() {
        println!("{}", "(type your answer)".dimmed());
    }
}

fn print_specification(spec: &BikeSpecification) {
    println!("\n{}", "Your bike".bold().underline());
    for (id, value) in spec.populated_fields() {
        println!("  {:<22} {}", format!("{}:", id.label()).cyan(), value);
    }
    for (name, value) in &spec.custom_fields {
        println!("  {:<22} {}", format!("{}:", name).magenta(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bikeforge_ai::llm_provider::Message;

    fn options() -> Vec<QuestionOption> {
        vec![
            QuestionOption {
                number: 1,
                text: "Cruiser".to_string(),
                value: "cruiser".to_string(),
            },
            QuestionOption {
                number: 2,
                text: "Custom (please specify)".to_string(),
                value: "custom".to_string(),
            },
        ]
    }

    #[test]
    fn test_number_selects_option_text() {
        assert_eq!(resolve_answer(" 1 ", &options()), "Cruiser");
        assert_eq!(resolve_answer("2", &options()), "Custom (please specify)");
    }

    #[test]
    fn test_other_input_is_sent_verbatim() {
        assert_eq!(resolve_answer("7", &options()), "7");
        assert_eq!(resolve_answer("matte black", &options()), "matte black");
        assert_eq!(resolve_answer("1200cc", &[]), "1200cc");
    }

    #[test]
    fn test_empty_line_reprompts_instead_of_resending() {
        assert_eq!(next_turn("   ", &options(), None), NextTurn::Reprompt);
        assert_eq!(
            next_turn("1", &options(), None),
            NextTurn::Send("Cruiser".to_string())
        );
    }

    #[test]
    fn test_empty_line_retries_unreached_message() {
        assert_eq!(
            next_turn("", &options(), Some("Cruiser")),
            NextTurn::Send("Cruiser".to_string())
        );
        assert_eq!(
            next_turn("matte black", &options(), Some("Cruiser")),
            NextTurn::Send("matte black".to_string())
        );
    }

    #[test]
    fn test_fresh_session_greets() {
        let conversation = ConversationState::new("s1", "rules");
        assert_eq!(opening(&conversation), Opening::Greet);
    }

    #[test]
    fn test_resumed_session_shows_pending_question() {
        let mut conversation = ConversationState::new("s1", "rules");
        conversation.transcript.push(Message::user("Hi"));
        conversation.transcript.push(Message::assistant(
            r#"{"type":"question","content":{"question_type":"engine","question_text":"Which engine?","options":[{"number":1,"text":"V-twin","value":"v_twin"}],"current_step":5},"message":"Which engine?"}"#,
        ));
        conversation.current_step = 5;

        match opening(&conversation) {
            Opening::Continue(question) => {
                assert_eq!(question.question_text, "Which engine?");
                assert_eq!(question.current_step, Some(5));
                assert_eq!(question.total_steps, 15);
                assert_eq!(question.options.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_last_reply_replays() {
        let mut conversation = ConversationState::new("s1", "rules");
        conversation.transcript.push(Message::user("Hi"));
        conversation.transcript.push(Message::assistant("Sure, which engine?"));
        assert_eq!(opening(&conversation), Opening::Replay);
    }

    #[test]
    fn test_cli_parses_chat_flags() {
        let cli = Cli::parse_from(["bikeforge", "chat", "--session", "abc", "--render", "bike.png"]);
        match cli.command {
            Commands::Chat { session, render } => {
                assert_eq!(session.as_deref(), Some("abc"));
                assert_eq!(render, Some(PathBuf::from("bike.png")));
            }
            _ => panic!("expected chat"),
        }
    }
}
