//! Plain-text rendering for terminal output
//!
//! Everything here returns strings so it can be tested without a terminal.
//! Coloring is applied by the caller.

use std::io::{self, Write};

use crossterm::style::{Color, Stylize};
use sage_core::{
    persona::Persona, CotError, GenerationLog, GenerationResult, Quote, Stage, UpstreamError,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Width used for boxes and rules
pub const DEFAULT_WIDTH: usize = 60;

/// Cursor shown after the growing prefix while a stage streams
const CURSOR: &str = "▌";

/// Parse `#rrggbb` into a terminal color
pub fn parse_hex_color(hex: &str) -> Option<Color> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some(Color::Rgb {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}

/// Accent color of a persona, cyan when unset or malformed
pub fn accent(persona: &Persona) -> Color {
    parse_hex_color(&persona.color).unwrap_or(Color::Cyan)
}

/// Panel background of a persona, if it sets a valid one
pub fn background(persona: &Persona) -> Option<Color> {
    parse_hex_color(&persona.bg_color)
}

/// Greedy wrap by display width. Existing line breaks are kept.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for source_line in text.lines() {
        let mut line = String::new();
        let mut line_width = 0;
        for c in source_line.chars() {
            let w = c.width().unwrap_or(0);
            if line_width + w > width && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
                line_width = 0;
            }
            line.push(c);
            line_width += w;
        }
        lines.push(line);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn pad(line: &str, width: usize) -> String {
    let fill = width.saturating_sub(line.width());
    format!("{}{}", line, " ".repeat(fill))
}

/// Boxed quote followed by the persona's attribution line
pub fn quote_box(persona: &Persona, quote: &Quote, width: usize) -> String {
    let inner = width.saturating_sub(4).max(8);
    let mut body = wrap(&format!("📜 「{}」", quote.text()), inner);
    body.push(format!("—— {}", persona.display_name()));

    let mut out = String::new();
    out.push_str(&format!("┌{}┐\n", "─".repeat(inner + 2)));
    for line in &body {
        out.push_str(&format!("│ {} │\n", pad(line, inner)));
    }
    out.push_str(&format!("└{}┘", "─".repeat(inner + 2)));
    out
}

/// Section title for a persona's response
pub fn response_title(persona: &Persona) -> String {
    format!("{} {} 的智慧回應", persona.icon, persona.key)
}

/// Heading printed before each stage's text
pub fn stage_heading(stage: Stage) -> &'static str {
    match stage {
        Stage::Reasoning => "🧠 他是這樣想的...",
        Stage::Advice => "💬 給你的建議",
    }
}

/// Persona card for `sage personas`
pub fn persona_card(index: usize, persona: &Persona, quote: Option<&Quote>) -> String {
    let mut out = format!("{}. {}\n", index, persona.label());
    if !persona.short_desc.is_empty() {
        out.push_str(&format!("   {}\n", persona.short_desc));
    }
    if !persona.core_concepts.is_empty() {
        out.push_str(&format!("   核心觀念：{}\n", persona.core_concepts));
    }
    if let Some(quote) = quote {
        out.push_str(&format!("   📜 「{}」\n", quote.text()));
    }
    out
}

/// Both stages of a finished generation
pub fn result_sections(result: &GenerationResult) -> String {
    format!(
        "{}\n{}\n\n{}\n{}\n",
        stage_heading(Stage::Reasoning),
        result.reasoning_chain.trim_end(),
        stage_heading(Stage::Advice),
        result.advice.trim_end()
    )
}

/// First `max_chars` characters of `text`, with `...` when cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Recent history, newest first
pub fn history_listing(log: &GenerationLog, count: usize) -> String {
    if log.is_empty() {
        return "尚無歷史紀錄".to_string();
    }
    let mut out = String::from("📜 歷史紀錄\n");
    for entry in log.recent(count) {
        out.push_str(&format!(
            "  [{}] {} | Q: {}\n",
            entry.at.format("%H:%M:%S"),
            entry.subject_label(),
            truncate_chars(&entry.question, 20)
        ));
    }
    out
}

/// Human-readable failure, with a hint where one helps
pub fn describe_error(err: &CotError) -> String {
    let hint = match err.upstream() {
        Some(UpstreamError::MissingCredentials) => Some(
            "Set GROQ_API_KEY or add api_key to ~/.sage/config.toml (https://console.groq.com/keys)",
        ),
        Some(UpstreamError::Authentication(_)) => Some("Check that your Groq API key is valid"),
        Some(UpstreamError::Timeout(_)) => Some("Raise the limit with --timeout"),
        _ => None,
    };
    match (err, hint) {
        (CotError::UnknownPersona(_), _) => {
            format!("{} (run `sage personas` to list them)", err)
        }
        (_, Some(hint)) => format!("{}\n  {}", err, hint),
        (_, None) => err.to_string(),
    }
}

/// Incremental printer for one streaming stage.
///
/// Shows a cursor after the text while fragments arrive when `show_cursor`
/// is set; `finish` removes it.
pub struct StreamPrinter<W: Write> {
    out: W,
    show_cursor: bool,
    cursor_drawn: bool,
}

impl<W: Write> StreamPrinter<W> {
    pub fn new(out: W, show_cursor: bool) -> Self {
        Self {
            out,
            show_cursor,
            cursor_drawn: false,
        }
    }

    fn erase_cursor(&mut self) -> io::Result<()> {
        if self.cursor_drawn {
            // Cursor glyph is one column wide
            write!(self.out, "\x08 \x08")?;
            self.cursor_drawn = false;
        }
        Ok(())
    }

    pub fn fragment(&mut self, text: &str) -> io::Result<()> {
        self.erase_cursor()?;
        write!(self.out, "{}", text)?;
        if self.show_cursor && !text.ends_with('\n') {
            write!(self.out, "{}", CURSOR.dark_grey())?;
            self.cursor_drawn = true;
        }
        self.out.flush()
    }

    pub fn finish(&mut self) -> io::Result<()> {
        self.erase_cursor()?;
        writeln!(self.out)?;
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}
