//! Terminal front-end for `CoCreate.AI`.
//!
//! Plain lines are sent to the AI; lines starting with `/` are commands
//! (`/help` lists them).

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use cocreate::config::CoCreateConfig;
use cocreate::controller::{AttachmentSource, BlobUrlRegistry, ConversationController, Notice};
use cocreate::history::{FileStorage, LocalHistoryStore, Role};
use cocreate::llm::{LlmGateway, PromptRefiner, RefineCredentials};
use cocreate::modes::Mode;

#[derive(Parser)]
#[command(name = "cocreate")]
#[command(about = "CoCreate.AI - co-create stories, ideas and lessons with AI")]
#[command(version)]
struct Cli {
    /// Persona to start in (story, idea, tutor)
    #[arg(short, long, default_value = "story")]
    mode: Mode,

    /// Directory holding the conversation history
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Delay between revealed words, in milliseconds (0 prints at once)
    #[arg(long, default_value_t = 30)]
    reveal_ms: u64,
}

/// A parsed input line.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Send(String),
    SendDraft,
    Mode(String),
    Attach(PathBuf),
    Detach(usize),
    Refine(Option<String>),
    History,
    Load(usize),
    Delete(usize),
    ClearHistory,
    Edit(Option<usize>),
    Export(Option<PathBuf>),
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Self::Send(line.to_string()));
        };

        let (name, arg) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(n, a)| (n, a.trim()));
        let arg_opt = (!arg.is_empty()).then(|| arg.to_string());
        let index = || arg.parse::<usize>().ok().filter(|n| *n > 0);

        let command = match name {
            "send" => Self::SendDraft,
            "mode" => Self::Mode(arg.to_string()),
            "attach" if !arg.is_empty() => Self::Attach(PathBuf::from(arg)),
            "detach" => index().map_or_else(|| Self::Unknown(line.to_string()), Self::Detach),
            "refine" => Self::Refine(arg_opt),
            "history" => Self::History,
            "load" => index().map_or_else(|| Self::Unknown(line.to_string()), Self::Load),
            "delete" => index().map_or_else(|| Self::Unknown(line.to_string()), Self::Delete),
            "clear-history" => Self::ClearHistory,
            "edit" => Self::Edit(index()),
            "export" => Self::Export(arg_opt.map(PathBuf::from)),
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        };
        Some(command)
    }
}

const HELP: &str = "\
Type text and press Enter to co-create. Commands:
  /mode <story|idea|tutor>  switch persona (clears the current session)
  /attach <path>            attach an image to the next message
  /detach <n>               remove pending attachment n
  /refine [text]            refine the draft (or the given text) into a better prompt
  /send                     send the current draft
  /history                  list saved conversations
  /load <n>                 restore saved conversation n
  /delete <n>               delete saved conversation n
  /clear-history            delete all saved conversations
  /edit [n]                 rewind to your n-th message (default: last) and edit it
  /export [dir]             save the transcript as a text file
  /help                     show this help
  /quit                     exit";

struct Repl {
    controller: ConversationController,
    refiner: PromptRefiner,
    credentials: RefineCredentials,
    reveal: Duration,
}

impl Repl {
    async fn send(&mut self) {
        let mut printed = 0;
        let result = self
            .controller
            .submit_revealing(self.reveal, |partial| {
                if printed == 0 {
                    print!("\nAI: ");
                }
                print!("{}", &partial[printed..]);
                let _ = std::io::stdout().flush();
                printed = partial.len();
            })
            .await;
        match result {
            Ok(_) => println!("\n"),
            Err(notice) => report(&notice),
        }
    }

    /// Returns `false` when the session should end.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Send(text) => {
                if let Err(notice) = self.controller.set_draft(text) {
                    report(&notice);
                } else {
                    self.send().await;
                }
            }
            Command::SendDraft => self.send().await,
            Command::Mode(name) => match name.parse::<Mode>() {
                Ok(mode) => {
                    self.controller.switch_mode(mode);
                    println!("Mode: {mode}");
                }
                Err(err) => eprintln!("{err}"),
            },
            Command::Attach(path) => match AttachmentSource::from_path(&path) {
                Ok(source) => match self.controller.attach(source) {
                    Ok(pending) => println!("Attached {}", pending.source.display_name),
                    Err(notice) => report(&notice),
                },
                Err(err) => eprintln!("Cannot read {}: {err}", path.display()),
            },
            Command::Detach(n) => match self.controller.remove_attachment(n - 1) {
                Some(source) => println!("Removed {}", source.display_name),
                None => eprintln!("No attachment {n}"),
            },
            Command::Refine(text) => self.refine(text).await,
            Command::History => self.list_history(),
            Command::Load(n) => self.load(n),
            Command::Delete(n) => {
                if let Some(conversation) = self.controller.history().get(n - 1) {
                    let remaining = self.controller.delete_history(conversation.id);
                    println!("Deleted. {} conversation(s) left.", remaining.len());
                } else {
                    eprintln!("No saved conversation {n}");
                }
            }
            Command::ClearHistory => {
                self.controller.clear_history();
                println!("History cleared.");
            }
            Command::Edit(n) => self.edit(n),
            Command::Export(dir) => {
                if let Err(err) = self.export(dir) {
                    eprintln!("Export failed: {err:#}");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
            Command::Unknown(line) => eprintln!("Unknown command: {line} (try /help)"),
        }
        true
    }

    async fn refine(&mut self, text: Option<String>) {
        if let Some(text) = text {
            if let Err(notice) = self.controller.set_draft(text) {
                report(&notice);
                return;
            }
        }
        match self
            .controller
            .refine_draft(&self.refiner, &self.credentials)
            .await
        {
            Ok(refined) => println!("Refined draft:\n{refined}\n(/send to submit)"),
            Err(notice) => report(&notice),
        }
    }

    fn list_history(&self) {
        let history = self.controller.history();
        if history.is_empty() {
            println!("No saved conversations.");
            return;
        }
        for (i, conversation) in history.iter().enumerate() {
            println!(
                "{:>2}. [{}] {} {}",
                i + 1,
                conversation.mode,
                conversation.created_at.format("%Y-%m-%d %H:%M"),
                conversation.preview_text
            );
        }
    }

    fn load(&mut self, n: usize) {
        let Some(conversation) = self.controller.history().into_iter().nth(n - 1) else {
            eprintln!("No saved conversation {n}");
            return;
        };
        if let Err(notice) = self.controller.restore(conversation.id) {
            report(&notice);
            return;
        }
        println!("Restored {} conversation:", self.controller.mode());
        for message in self.controller.messages() {
            let who = match message.role {
                Role::User => "You",
                Role::Ai => "AI",
            };
            println!("{who}: {}\n", message.content);
        }
    }

    fn edit(&mut self, n: Option<usize>) {
        let user_messages: Vec<_> = self
            .controller
            .messages()
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.id)
            .collect();
        let target = match n {
            Some(n) => user_messages.get(n - 1).copied(),
            None => user_messages.last().copied(),
        };
        let Some(id) = target else {
            eprintln!("Nothing to edit");
            return;
        };
        match self.controller.edit_message(id) {
            Ok(()) => println!(
                "Draft restored:\n{}\n(type a new message, /refine or /send)",
                self.controller.draft()
            ),
            Err(notice) => report(&notice),
        }
    }

    fn export(&self, dir: Option<PathBuf>) -> Result<()> {
        let transcript = self.controller.export_transcript();
        let path = dir.unwrap_or_default().join(&transcript.filename);
        std::fs::write(&path, transcript.contents)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Saved {}", path.display());
        Ok(())
    }
}

fn report(notice: &Notice) {
    eprintln!("{notice}");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = CoCreateConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }
    config.validate().context("invalid configuration")?;

    let gateway = LlmGateway::from_config(&config).context("building the LLM gateway")?;
    let refiner = PromptRefiner::from_config(&config).context("building the prompt refiner")?;
    let history = LocalHistoryStore::new(FileStorage::new(config.data_dir.clone()));
    let controller =
        ConversationController::new(history, Arc::new(gateway), Arc::new(BlobUrlRegistry::new()))
            .with_mode(cli.mode);

    let mut repl = Repl {
        controller,
        refiner,
        credentials: RefineCredentials::from_config(&config),
        reveal: Duration::from_millis(cli.reveal_ms),
    };

    println!("CoCreate.AI ({} mode). /help for commands.", repl.controller.mode());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if let Some(command) = Command::parse(&line) {
            if !repl.handle(command).await {
                break;
            }
        }
    }

    Ok(())
}
