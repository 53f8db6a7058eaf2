use eyre::{Result, bail};

use super::scenario::{Gender, TrainingFocus};

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Quit,
    Clear,
    Config,
    History,
    Scenarios,
    Scenario(String),
    Language(String),
    Gender(Gender),
    Focus(TrainingFocus),
    Price { min: String, max: String },
    Discount { min: String, max: String },
    Product(Vec<String>),
    /// A finished recording to transcribe and answer.
    Audio(String),
    /// Typed text to answer.
    Ask(String),
}

impl Command {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            bail!("Nothing to send");
        }

        let Some(rest) = input.strip_prefix('/') else {
            return Ok(Command::Ask(input.to_string()));
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        let command = match name {
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "clear" | "reset" => Command::Clear,
            "config" => Command::Config,
            "history" => Command::History,
            "scenarios" => Command::Scenarios,
            "scenario" => Command::Scenario(required(name, args)?.to_string()),
            "language" => Command::Language(required(name, args)?.to_string()),
            "gender" => Command::Gender(required(name, args)?.parse().map_err(eyre::Report::msg)?),
            "focus" => Command::Focus(required(name, args)?.parse().map_err(eyre::Report::msg)?),
            "price" => {
                let (min, max) = range(name, args)?;
                Command::Price { min, max }
            }
            "discount" => {
                let (min, max) = range(name, args)?;
                Command::Discount { min, max }
            }
            "product" => Command::Product(
                required(name, args)?
                    .split(';')
                    .map(str::trim)
                    .filter(|feature| !feature.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            "audio" => Command::Audio(required(name, args)?.to_string()),
            _ => bail!("Unknown command: /{}. Type /help for the list of commands.", name),
        };

        Ok(command)
    }
}

fn required<'a>(name: &str, args: &'a str) -> Result<&'a str> {
    if args.is_empty() {
        bail!("/{} needs an argument", name);
    }
    Ok(args)
}

fn range(name: &str, args: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = args.split_whitespace().collect();
    match parts.as_slice() {
        [min, max] => Ok((min.to_string(), max.to_string())),
        _ => bail!("/{} expects two values: <min> <max>", name),
    }
}
