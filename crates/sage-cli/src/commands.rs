//! Command implementations shared by one-shot commands and the interactive loop

use std::cell::{Cell, RefCell};
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use anyhow::Result;
use crossterm::style::Stylize;
use sage_core::{
    pick_quote, ApiKey, Cancellation, CotError, CotOrchestrator, GenerationRequest,
    HistoryEntry, Persona, PersonaRegistry, Quote, Stage,
};
use tokio::task::JoinHandle;
use tracing::info;

use crate::render::{self, StreamPrinter};

/// Everything a command needs to run generations
pub struct AppContext {
    pub orchestrator: CotOrchestrator,
    /// Empty when no key is configured; upstream calls then fail with a hint
    pub credentials: ApiKey,
}

impl AppContext {
    pub fn registry(&self) -> &Arc<PersonaRegistry> {
        self.orchestrator.registry()
    }
}

/// Cancels its handle on Ctrl-C until dropped
pub struct InterruptGuard {
    cancel: Cancellation,
    listener: JoinHandle<()>,
}

impl InterruptGuard {
    pub fn new() -> Self {
        let cancel = Cancellation::new();
        let trigger = cancel.clone();
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, cancelling generation");
                trigger.cancel();
            }
        });
        Self { cancel, listener }
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Resolve `--persona`: a 1-based index into the registry or a key.
/// Defaults to the first persona.
pub fn resolve_persona(registry: &PersonaRegistry, selector: Option<&str>) -> String {
    let keys = registry.keys();
    match selector {
        None => keys.first().cloned().unwrap_or_default(),
        Some(s) => match s.trim().parse::<usize>() {
            Ok(n) if n >= 1 && n <= keys.len() => keys[n - 1].clone(),
            _ => s.to_string(),
        },
    }
}

fn print_quote(persona: &Persona) {
    if let Some(quote) = pick_quote(persona, &mut rand::thread_rng()) {
        println!("{}", styled_quote(persona, quote));
    }
}

/// Quote box in the persona's colors. Lines are styled one by one so the
/// background stops at the box edge.
fn styled_quote(persona: &Persona, quote: &Quote) -> String {
    let accent = render::accent(persona);
    let background = render::background(persona);
    render::quote_box(persona, quote, render::DEFAULT_WIDTH)
        .lines()
        .map(|line| {
            let styled = line.with(accent);
            match background {
                Some(bg) => styled.on(bg).to_string(),
                None => styled.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn print_error(err: &CotError) {
    eprintln!("{} {}", "✗".red(), render::describe_error(err));
}

/// Stream one persona's answer to stdout
pub async fn ask(ctx: &AppContext, question: &str, persona_key: &str) -> Option<HistoryEntry> {
    // Unknown keys and blank questions are reported before anything is printed
    if question.trim().is_empty() {
        print_error(&CotError::EmptyQuestion);
        return None;
    }
    let persona = match ctx.registry().lookup(persona_key) {
        Ok(persona) => persona,
        Err(err) => {
            print_error(&err);
            return None;
        }
    };

    print_quote(&persona);
    println!();
    println!("{}", render::response_title(&persona).bold());
    println!();
    println!("{}", render::stage_heading(Stage::Reasoning).bold());

    let stdout = io::stdout();
    let show_cursor = stdout.is_terminal();
    let printer = RefCell::new(StreamPrinter::new(stdout, show_cursor));
    let advice_started = Cell::new(false);

    let guard = InterruptGuard::new();
    let request = GenerationRequest::new(question, persona_key, ctx.credentials.clone());
    let result = ctx
        .orchestrator
        .run_streaming(
            &request,
            guard.cancellation(),
            |fragment| {
                let _ = printer.borrow_mut().fragment(fragment);
            },
            |fragment| {
                let mut printer = printer.borrow_mut();
                if !advice_started.replace(true) {
                    let _ = printer.finish();
                    println!();
                    println!("{}", render::stage_heading(Stage::Advice).bold());
                }
                let _ = printer.fragment(fragment);
            },
        )
        .await;
    let _ = printer.borrow_mut().finish();
    drop(guard);

    match result {
        Ok(result) => {
            println!();
            println!("{}", "✨ 生成完成！".green());
            Some(HistoryEntry::single(question, persona_key, result))
        }
        Err(err) => {
            print_error(&err);
            None
        }
    }
}

/// Run every persona on the same question and print each finished pair
pub async fn compare(ctx: &AppContext, question: &str) -> Option<HistoryEntry> {
    if question.trim().is_empty() {
        print_error(&CotError::EmptyQuestion);
        return None;
    }
    let registry = ctx.registry().clone();
    let keys = registry.keys();

    println!("{}", format!("🔥 {} 位思想家的智慧比較", keys.len()).bold());
    println!("問題：{}", question);
    eprintln!("{}", "🧠 正在思考中...".dark_grey());

    let guard = InterruptGuard::new();
    let results = ctx
        .orchestrator
        .run_comparison(question, &keys, &ctx.credentials, guard.cancellation())
        .await;
    drop(guard);

    let mut finished = Vec::new();
    for (key, result) in results {
        println!();
        println!("{}", "─".repeat(render::DEFAULT_WIDTH).dark_grey());
        if let Ok(persona) = registry.lookup(&key) {
            print_quote(&persona);
            println!("{}", render::response_title(&persona).bold());
        }
        match result {
            Ok(result) => {
                println!("{}", render::result_sections(&result));
                finished.push((key, result));
            }
            Err(err) => {
                if let Some(chain) = err.reasoning_chain() {
                    println!("{}", render::stage_heading(Stage::Reasoning).bold());
                    println!("{}", chain.trim_end());
                }
                print_error(&err);
            }
        }
    }

    if finished.is_empty() {
        None
    } else {
        Some(HistoryEntry::comparison(question, finished))
    }
}

/// Persona cards with one random quote each
pub fn personas(registry: &PersonaRegistry) -> Result<()> {
    let mut out = io::stdout().lock();
    let mut rng = rand::thread_rng();
    writeln!(out, "📖 思想家簡介 ({})", registry.len())?;
    writeln!(out)?;
    for (i, persona) in registry.all().iter().enumerate() {
        let card = render::persona_card(i + 1, persona, pick_quote(persona, &mut rng));
        writeln!(out, "{}", card.with(render::accent(persona)))?;
    }
    Ok(())
}

/// Numbered example questions
pub fn examples(registry: &PersonaRegistry) -> Result<()> {
    let mut out = io::stdout().lock();
    if registry.example_questions().is_empty() {
        writeln!(out, "No example questions defined.")?;
        return Ok(());
    }
    writeln!(out, "💡 範例問題：")?;
    for (i, question) in registry.example_questions().iter().enumerate() {
        writeln!(out, "  {}. {}", i + 1, question)?;
    }
    Ok(())
}
