//! Line-oriented front end for the dashboard.
//!
//! Each input line becomes one dashboard event and the returned view is
//! printed. Row numbers refer to the last table printed.

use crate::render;
use nutrient_core::{Dashboard, Event, Result, View};
use std::io::{BufRead, Write};

const HELP: &str = "\
Commands:
  user NAME          load and save exclusions for NAME
  nutrients [TERM]   search nutrients by name
  exclude ROW        exclude the nutrient in ROW of the last nutrient table
  remove NBR         drop the exclusion for nutrient number NBR
  foods [TERM]       search foods, hiding those with excluded nutrients
  show ROW           nutrient breakdown of ROW of the last food table
  bubble             fact counts per nutrient
  help               this text
  quit               leave the shell";

#[derive(Debug, PartialEq)]
pub(crate) enum ShellCommand {
    Event(Event),
    Bubble,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub(crate) fn parse_line(line: &str) -> std::result::Result<Option<ShellCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_lowercase().as_str() {
        "user" => ShellCommand::Event(Event::UserNameEntered(rest.to_string())),
        "nutrients" => ShellCommand::Event(Event::NutrientSearchChanged(rest.to_string())),
        "foods" => ShellCommand::Event(Event::FoodSearchSubmitted(rest.to_string())),
        "exclude" => ShellCommand::Event(Event::NutrientRowClicked(parse_number(word, rest)?)),
        "show" => ShellCommand::Event(Event::FoodRowClicked(parse_number(word, rest)?)),
        "remove" => ShellCommand::Event(Event::RemoveExclusionClicked(parse_number(word, rest)?)),
        "bubble" => ShellCommand::Bubble,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(format!("Unknown command '{}' (try 'help')", other)),
    };
    Ok(Some(command))
}

fn parse_number<T: std::str::FromStr>(word: &str, rest: &str) -> std::result::Result<T, String> {
    rest.parse()
        .map_err(|_| format!("'{}' needs a number, got '{}'", word, rest))
}

/// Run the shell until `quit` or end of input
pub fn run(mut dashboard: Dashboard, input: impl BufRead, json: bool) -> Result<()> {
    if !json {
        println!("{}", HELP);
    }

    prompt(json)?;
    for line in input.lines() {
        let line = line?;
        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(ShellCommand::Quit)) => break,
            Ok(Some(ShellCommand::Help)) => println!("{}", HELP),
            Ok(Some(ShellCommand::Bubble)) => show(dashboard.bubble_chart(), json)?,
            Ok(Some(ShellCommand::Event(event))) => show(dashboard.handle(event), json)?,
            Err(message) => eprintln!("{}", message),
        }
        prompt(json)?;
    }

    tracing::debug!("Shell closed");
    Ok(())
}

/// Render a handler result; query failures end this command, not the session
fn show(result: Result<View>, json: bool) -> Result<()> {
    match result {
        Ok(view) => render(&view, json),
        Err(e) => {
            eprintln!("Error: {}", e);
            Ok(())
        }
    }
}

fn prompt(json: bool) -> Result<()> {
    if !json {
        print!("> ");
        std::io::stdout().flush()?;
    }
    Ok(())
}
