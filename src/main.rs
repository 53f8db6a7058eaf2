mod cli;
mod openai_client;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use eyre::{Result, eyre};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::cli::roleplay::RoleplayContext;
use crate::cli::roleplay::audio_io::{AudioSink, sanitize_path};
use crate::cli::roleplay::scenario::{
    Gender, Language, ScenarioConfig, TrainingFocus, curated_scenario, curated_scenarios,
};
use crate::openai_client::{DEFAULT_API_BASE, ModelConfig, OpenAiClient};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Text to send as a single turn
    #[arg(short, long)]
    input: Option<String>,

    /// Recording to transcribe and send as a single turn
    #[arg(short, long)]
    audio: Option<String>,

    #[command(flatten)]
    scenario: ScenarioArgs,

    #[command(flatten)]
    provider: ProviderArgs,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a roleplay session
    Roleplay {
        /// Text to send as a single turn
        #[arg(short, long)]
        input: Option<String>,

        /// Recording to transcribe and send as a single turn
        #[arg(short, long)]
        audio: Option<String>,
    },
    /// List the curated scenarios
    Scenarios,
}

#[derive(Args)]
struct ScenarioArgs {
    /// Curated scenario to start from (see `scenarios`)
    #[arg(long, conflicts_with = "scenario_file")]
    scenario: Option<String>,

    /// File holding a custom scenario text
    #[arg(long)]
    scenario_file: Option<String>,

    /// Language spoken in recordings: English, Hindi, Tamil or Telugu
    #[arg(long, default_value = "English")]
    language: String,

    /// Gender of the buyer persona
    #[arg(long, default_value = "Female")]
    gender: Gender,

    /// Training focus for the rep
    #[arg(long, default_value = "Overall")]
    focus: TrainingFocus,

    /// Minimum unit price in USD
    #[arg(long, default_value = "5")]
    min_price: String,

    /// Maximum unit price in USD
    #[arg(long, default_value = "500")]
    max_price: String,

    /// Minimum discount in %
    #[arg(long, default_value = "1")]
    min_discount: String,

    /// Maximum discount in %
    #[arg(long, default_value = "100")]
    max_discount: String,

    /// Product feature, repeat for several
    #[arg(long = "product")]
    product: Vec<String>,
}

#[derive(Args)]
struct ProviderArgs {
    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Chat completion model
    #[arg(long, default_value = "gpt-4o-mini")]
    chat_model: String,

    /// Transcription model
    #[arg(long, default_value = "whisper-1")]
    transcription_model: String,

    /// Speech synthesis model
    #[arg(long, default_value = "tts-1")]
    speech_model: String,

    /// Timeout for each provider request, in seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Directory where reply audio is written
    #[arg(long, default_value = "replies")]
    output_dir: String,
}

impl ScenarioArgs {
    async fn into_config(self) -> Result<ScenarioConfig> {
        let defaults = ScenarioConfig::default();

        let scenario = match (self.scenario, self.scenario_file) {
            (Some(name), _) => curated_scenario(&name)
                .ok_or_else(|| eyre!("Unknown scenario '{}'", name))?
                .to_string(),
            (None, Some(path)) => {
                let path = sanitize_path(&path);
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| eyre!("Failed to read scenario {}: {}", path.display(), e))?
            }
            (None, None) => defaults.scenario,
        };

        let product_info = if self.product.is_empty() {
            defaults.product_info
        } else {
            self.product.join("\n")
        };

        Ok(ScenarioConfig {
            scenario,
            max_price: self.max_price,
            min_price: self.min_price,
            max_discount: self.max_discount,
            min_discount: self.min_discount,
            training_focus: self.focus,
            product_info,
            gender: self.gender,
            language: Language::from_label(&self.language),
        })
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| eyre!("Failed to set tracing subscriber: {}", e))?;

    let (input, audio) = match cli.command {
        Some(Commands::Scenarios) => {
            for (name, text) in curated_scenarios() {
                println!("{}\n  {}\n", name, text);
            }
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Roleplay { input, audio }) => (input, audio),
        None => (cli.input, cli.audio),
    };

    let api_key = match OpenAiClient::api_key_from_env() {
        Ok(api_key) => api_key,
        Err(e) => {
            eprintln!("Failed to initialize OpenAI client: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    info!("Starting sales coaching roleplay");

    let config = cli.scenario.into_config().await?;
    let models = ModelConfig {
        chat: cli.provider.chat_model,
        transcription: cli.provider.transcription_model,
        speech: cli.provider.speech_model,
    };
    let client = OpenAiClient::new(
        api_key,
        &cli.provider.api_base,
        models,
        Duration::from_secs(cli.provider.timeout_secs),
    )?;
    info!("Using chat model {}", client.models().chat);

    let sink = AudioSink::create(&cli.provider.output_dir).await?;

    let mut context = RoleplayContext::new(
        Box::new(io::stdout()),
        Arc::new(client),
        config,
        sink,
        true,
    );
    context.run(input, audio).await
}
