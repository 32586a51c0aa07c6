use super::{execute, ui};
use crate::AppCommand;
use crate::core::config::AppConfig;
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::io::{BufRead, Write};

#[derive(Parser)]
#[command(name = "valutatrade", no_binary_name = true, disable_help_subcommand = true)]
struct ShellLine {
    #[command(subcommand)]
    command: AppCommand,
}

/// Interactive loop over stdin until `exit`, `quit` or end of input.
pub async fn run(config: &AppConfig) -> Result<()> {
    let stdin = std::io::stdin();
    run_with(config, stdin.lock(), std::io::stdout()).await
}

pub async fn run_with<R: BufRead, W: Write>(config: &AppConfig, input: R, mut out: W) -> Result<()> {
    writeln!(
        out,
        "valutatrade shell. Type a command, 'help' for usage, 'exit' to leave."
    )?;

    let mut lines = input.lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;
        let Some(line) = lines.next() else {
            writeln!(out)?;
            break;
        };
        let line = line.context("Failed to read input")?;
        let line = line.trim();

        match line {
            "" => continue,
            "exit" | "quit" => break,
            "help" => {
                writeln!(out, "{}", ShellLine::command().render_help())?;
                continue;
            }
            _ => {}
        }

        match ShellLine::try_parse_from(line.split_whitespace()) {
            Ok(ShellLine {
                command: AppCommand::Shell,
            }) => writeln!(out, "Already in the shell.")?,
            Ok(parsed) => {
                if let Err(e) = execute(config, parsed.command).await {
                    writeln!(
                        out,
                        "{}",
                        ui::style_text(&format!("Error: {e:#}"), ui::StyleType::Error)
                    )?;
                }
            }
            Err(e) => writeln!(out, "{}", e.render())?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AccountStore;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_shell_runs_commands_until_exit() {
        let dir = tempdir().unwrap();
        let config = AppConfig {
            data_path: Some(dir.path().display().to_string()),
            ..AppConfig::default()
        };
        let input = "\
help
register --username alice --password secret
bogus

login --username alice --password nope
exit
register --username bob --password secret
";
        let mut out = Vec::new();
        run_with(&config, Cursor::new(input), &mut out).await.unwrap();
        let output = console::strip_ansi_codes(&String::from_utf8(out).unwrap()).to_string();

        assert!(output.contains("register"));
        assert!(output.contains("bogus"));
        assert!(output.contains("Error: Invalid password"));

        let users = AccountStore::in_dir(dir.path()).list_users().unwrap();
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_shell_stops_at_end_of_input() {
        let dir = tempdir().unwrap();
        let config = AppConfig {
            data_path: Some(dir.path().display().to_string()),
            ..AppConfig::default()
        };
        let mut out = Vec::new();
        run_with(&config, Cursor::new("shell\n"), &mut out).await.unwrap();
        assert!(String::from_utf8(out).unwrap().contains("Already in the shell."));
    }
}
