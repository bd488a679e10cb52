//! Replays a stored transcript in the terminal.
//!
//! ```text
//! tether-replay <transcript.jsonl>
//! ```

#[macro_use]
extern crate tracing;

use std::env;
use std::fs;
use std::process::ExitCode;

use owo_colors::OwoColorize;
use tether::replay::{self, Line, LineKind};

const BAR_CHAR: &str = "▎";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: tether-replay <transcript.jsonl>");
        return ExitCode::FAILURE;
    };
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) => {
            error!("error reading {path}: {err}");
            eprintln!("cannot read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let entries = match replay::parse_jsonl(&text) {
        Ok(entries) => entries,
        Err(err) => {
            eprintln!("{path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    debug!("loaded {} entries", entries.len());

    for entry in replay::canonical(&entries) {
        print_line(&replay::describe(&entry));
    }
    ExitCode::SUCCESS
}

fn print_line(line: &Line) {
    let Line {
        kind,
        label,
        detail,
    } = line;
    match kind {
        LineKind::Prompt => {
            println!("{}> {}", BAR_CHAR.bright_green(), detail.bold());
        }
        LineKind::Reply => {
            println!("{}🤖 {}", BAR_CHAR.bright_cyan(), detail.bright_white());
        }
        LineKind::ToolUse => {
            let bar = BAR_CHAR.bright_yellow();
            println!("{bar}⚙️  {} {}", label.bright_white().bold(), detail);
        }
        LineKind::ToolResult => {
            println!("{}  ↳ {}", BAR_CHAR.bright_yellow(), detail.dimmed());
        }
        LineKind::ToolError => {
            println!("{}  ↳ {}", BAR_CHAR.bright_yellow(), detail.red());
        }
        LineKind::Hook => {
            let text = format!("{label} {detail}");
            println!("{}    {}", BAR_CHAR.bright_black(), text.dimmed());
        }
        LineKind::ApiError => {
            println!("{}⚠️  {} {}", BAR_CHAR.red(), label.red(), detail);
        }
        LineKind::System => {
            let text = format!("{label} {detail}");
            println!("{}{}", BAR_CHAR.bright_black(), text.bright_black());
        }
    }
}
