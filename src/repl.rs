//! Interactive REPL.

use colored::Colorize;
use replchan_client::{Channel, Client};
use replchan_protocol::{Exec, Payload};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use serde_json::Value;
use std::io::Write;

const HELP_TEXT: &str = r#"
Lines are run as commands on the remote channel; their output is printed.

Local commands:
  :help                 Show this help
  :json <document>      Send a payload document and print the response frames
                        e.g. :json {"exec": {"args": ["ls", "-la"]}}
  :quit, :exit          Close the channel and exit
"#;

/// A parsed input line.
#[derive(Debug, PartialEq)]
enum Line {
    Run(Exec),
    Help,
    Quit,
    Json(Payload),
    Usage(&'static str),
    Unknown(String),
}

fn parse_line(line: &str) -> Result<Line, Box<dyn std::error::Error>> {
    let Some(local) = line.strip_prefix(':') else {
        return Ok(Line::Run(Exec::from_command_line(line)));
    };

    let (cmd, rest) = match local.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (local, ""),
    };

    match cmd.to_lowercase().as_str() {
        "help" | "?" => Ok(Line::Help),
        "quit" | "exit" | "q" => Ok(Line::Quit),
        "json" => {
            if rest.is_empty() {
                return Ok(Line::Usage("Usage: :json <document>"));
            }
            let document: Value = serde_json::from_str(rest)?;
            Ok(Line::Json(Payload::from_document(&document)?))
        }
        other => Ok(Line::Unknown(other.to_string())),
    }
}

pub async fn run(client: &Client, channel: &Channel) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "{} channel {} ({}/{})",
        "Connected:".green(),
        channel.id(),
        channel.service(),
        channel.name()
    );

    // Create readline editor
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    // Load history
    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".replchan_history"))
        .unwrap_or_else(|_| ".replchan_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type ':help' for local commands.\n");

    loop {
        let prompt = format!("{} ", "replchan>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_line(channel, line).await {
                    Ok(Some(output)) => {
                        print!("{}", output);
                        let _ = std::io::stdout().flush();
                    }
                    Ok(None) => break,
                    Err(e) => println!("{}: {}", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    // Close channels and disconnect
    if let Err(e) = client.close().await {
        println!("{}: {}", "Close failed".yellow(), e);
    }
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

/// Runs one line; `None` means exit.
async fn execute_line(
    channel: &Channel,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    match parse_line(line)? {
        Line::Run(exec) => Ok(Some(channel.get_output(exec).await?)),
        Line::Help => Ok(Some(HELP_TEXT.to_string())),
        Line::Quit => Ok(None),
        Line::Json(payload) => {
            let documents = channel.get_structured(payload).await?;
            let mut output = String::new();
            for document in &documents {
                output.push_str(&format_json(document));
                output.push('\n');
            }
            Ok(Some(output))
        }
        Line::Usage(usage) => Ok(Some(format!("{}\n", usage))),
        Line::Unknown(cmd) => Ok(Some(format!(
            "Unknown command ':{}'. Type ':help' for local commands.\n",
            cmd
        ))),
    }
}

fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line_runs_command() {
        assert_eq!(
            parse_line("ls  -la /tmp").unwrap(),
            Line::Run(Exec::new(["ls", "-la", "/tmp"]))
        );
    }

    #[test]
    fn test_local_commands() {
        assert_eq!(parse_line(":help").unwrap(), Line::Help);
        assert_eq!(parse_line(":QUIT").unwrap(), Line::Quit);
        assert_eq!(parse_line(":exit").unwrap(), Line::Quit);
        assert_eq!(
            parse_line(":frobnicate now").unwrap(),
            Line::Unknown("frobnicate".to_string())
        );
        assert!(matches!(parse_line(":json").unwrap(), Line::Usage(_)));
    }

    #[test]
    fn test_json_payload() {
        let line = parse_line(r#":json {"exec": {"args": ["echo", "hi"]}}"#).unwrap();
        assert_eq!(line, Line::Json(Payload::Exec(Exec::new(["echo", "hi"]))));

        let line = parse_line(r#":json {"input": "y\n"}"#).unwrap();
        assert_eq!(line, Line::Json(Payload::Input("y\n".to_string())));
    }

    #[test]
    fn test_json_rejects_bad_documents() {
        assert!(parse_line(":json {not json").is_err());
        assert!(parse_line(r#":json {"launch": {}}"#).is_err());
        assert!(parse_line(r#":json {"channel": 3}"#).is_err());
    }
}
