//! Line-oriented interactive session
//!
//! Keeps its own generation log for `/history`.

use std::io::Write;

use anyhow::Result;
use crossterm::style::Stylize;
use sage_core::{constants, GenerationLog};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::commands::{self, AppContext};
use crate::render;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Question(String),
    History,
    /// `/persona` with an optional key or index
    Persona(Option<String>),
    Compare,
    Examples,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Question(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim().to_string())),
        None => (command, None),
    };
    match name {
        "history" => Input::History,
        "persona" => Input::Persona(arg.filter(|a| !a.is_empty())),
        "compare" => Input::Compare,
        "examples" => Input::Examples,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => Input::Unknown(other.to_string()),
    }
}

const HELP: &str = "\
Commands:
  /persona [KEY|N]  Show personas or switch to one
  /compare          Toggle comparison mode (all personas)
  /history          Show recent questions
  /examples         Show example questions
  /quit             Exit
Anything else is asked as a question.";

struct Session {
    persona: String,
    compare: bool,
    log: GenerationLog,
}

impl Session {
    fn prompt(&self) -> String {
        if self.compare {
            "比較模式 ❯ ".to_string()
        } else {
            format!("{} ❯ ", self.persona)
        }
    }
}

/// Run the loop until `/quit` or end of input
pub async fn run(ctx: &AppContext, persona: String) -> Result<()> {
    let mut session = Session {
        persona,
        compare: false,
        log: GenerationLog::new(),
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", "🏛️ 古代思想家 AI 思考生成器".bold());
    println!("{}", HELP.dark_grey());

    loop {
        println!();
        print!("{}", session.prompt().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        match parse_input(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Help => println!("{}", HELP),
            Input::Examples => commands::examples(ctx.registry())?,
            Input::History => println!(
                "{}",
                render::history_listing(&session.log, constants::pipeline::RECENT_HISTORY)
            ),
            Input::Compare => {
                session.compare = !session.compare;
                println!(
                    "比較模式：{}",
                    if session.compare { "開啟" } else { "關閉" }
                );
            }
            Input::Persona(None) => commands::personas(ctx.registry())?,
            Input::Persona(Some(selector)) => {
                let key = commands::resolve_persona(ctx.registry(), Some(&selector));
                match ctx.registry().lookup(&key) {
                    Ok(persona) => {
                        println!("已切換為 {}", persona.label());
                        session.persona = key;
                        session.compare = false;
                    }
                    Err(err) => eprintln!("{}", render::describe_error(&err)),
                }
            }
            Input::Unknown(name) => eprintln!("Unknown command: /{} (try /help)", name),
            Input::Question(question) => {
                let entry = if session.compare {
                    commands::compare(ctx, &question).await
                } else {
                    commands::ask(ctx, &question, &session.persona).await
                };
                if let Some(entry) = entry {
                    session.log.push(entry);
                }
            }
        }
    }

    info!("Interactive session ended after {} entries", session.log.len());
    Ok(())
}
