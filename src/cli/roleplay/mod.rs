pub mod audio_io;
pub mod command;
pub mod conversation_state;
pub mod prompt;
pub mod scenario;
pub mod sentence;
pub mod streamer;
pub mod transcriber;

#[cfg(test)]
mod test_support;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use audio_io::{AudioSink, read_recording};
use color_print::cformat;
use command::Command;
use conversation_state::RoleplaySession;
use eyre::Result;
use futures::StreamExt;
use prompt::generate_prompt;
use rustyline::error::ReadlineError;
use scenario::{Language, ScenarioConfig, curated_scenario, curated_scenarios};
use streamer::{ResponseStreamer, StreamError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use transcriber::Transcriber;

use crate::openai_client::{AudioClip, SpeechProvider};

const WELCOME_TEXT: &str = "
Sales coaching roleplay. You are the rep; the AI plays the buyer.

Type what you would say, or record yourself and send the file with /audio <path>.
The buyer answers in text and speech. Press Ctrl-C during a turn to cut it off.

/help         Show the help dialogue
/quit         Quit the application
";

const HELP_TEXT: &str = "
Sales coaching roleplay

<text>                  Say something to the buyer
/audio <path>           Transcribe a recording and send it as your turn
/clear                  Reset the conversation
/history                Show the conversation so far

/scenarios              List curated scenarios
/scenario <name>        Use a curated scenario
/language <label>       English, Hindi, Tamil or Telugu
/gender <female|male>   Buyer persona (voice)
/focus <label>          Objection Handling, Negotiation, Product Knowledge, Overall
/price <min> <max>      Unit price range in USD
/discount <min> <max>   Discount range in %
/product <a; b; ...>    Product features
/config                 Show the current scenario settings

/help                   Show this help dialogue
/quit                   Quit the application

Scenario settings can only be changed before the first turn or after /clear.
Ctrl-C while a recording is transcribed or the buyer answers cancels that turn.
";

pub struct RoleplayContext {
    output: Box<dyn Write>,
    interactive: bool,
    session: RoleplaySession,
    transcriber: Transcriber,
    streamer: ResponseStreamer,
    sink: AudioSink,
    turns: usize,
}

impl RoleplayContext {
    pub fn new(
        output: Box<dyn Write>,
        provider: Arc<dyn SpeechProvider>,
        config: ScenarioConfig,
        sink: AudioSink,
        interactive: bool,
    ) -> Self {
        Self {
            output,
            interactive,
            session: RoleplaySession::new(config),
            transcriber: Transcriber::new(Arc::clone(&provider)),
            streamer: ResponseStreamer::new(provider),
            sink,
            turns: 0,
        }
    }

    /// Run one turn from `input`/`audio` if given, otherwise the REPL.
    pub async fn run(&mut self, input: Option<String>, audio: Option<String>) -> Result<ExitCode> {
        if self.interactive && input.is_none() && audio.is_none() {
            self.print_welcome()?;
        }
        self.report_config_warnings()?;

        if let Some(path) = audio {
            return Ok(if self.handle_audio(&path).await? {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }

        if let Some(text) = input {
            self.run_turn(text.trim()).await?;
            return Ok(ExitCode::SUCCESS);
        }

        if self.interactive {
            self.run_interactive().await?;
        }

        Ok(ExitCode::SUCCESS)
    }

    fn print_welcome(&mut self) -> Result<()> {
        writeln!(self.output, "{}", WELCOME_TEXT)?;
        let note = cformat!("<dim>Reply audio is saved to {}</dim>", self.sink.dir().display());
        writeln!(self.output, "{}\n", note)?;
        Ok(())
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;

        loop {
            let prompt_text = generate_prompt(self.session.config(), self.session.is_in_progress());
            let readline = rl.readline(&prompt_text);

            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line.as_str());

                    match self.handle_input(&line).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => writeln!(self.output, "Error: {}", e)?,
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        Ok(())
    }

    /// Returns `false` when the user asked to quit.
    async fn handle_input(&mut self, input: &str) -> Result<bool> {
        match Command::parse(input)? {
            Command::Quit => return Ok(false),
            Command::Help => writeln!(self.output, "{}", HELP_TEXT)?,
            Command::Clear => {
                self.session.clear();
                info!("Conversation reset");
                writeln!(self.output, "Conversation cleared.")?;
            }
            Command::History => self.print_history()?,
            Command::Config => self.print_config()?,
            Command::Scenarios => {
                for (name, text) in curated_scenarios() {
                    writeln!(self.output, "{}", cformat!("<bold>{}</bold>\n  {}\n", name, text))?;
                }
            }
            Command::Audio(path) => {
                self.handle_audio(&path).await?;
            }
            Command::Ask(text) => self.run_turn(&text).await?,
            setting => self.apply_setting(setting)?,
        }

        Ok(true)
    }

    fn apply_setting(&mut self, setting: Command) -> Result<()> {
        let Some(config) = self.session.config_mut() else {
            writeln!(
                self.output,
                "A conversation is in progress. Use /clear before changing the scenario."
            )?;
            return Ok(());
        };

        match setting {
            Command::Scenario(name) => match curated_scenario(&name) {
                Some(text) => config.scenario = text.to_string(),
                None => {
                    writeln!(self.output, "Unknown scenario '{}'. See /scenarios.", name)?;
                    return Ok(());
                }
            },
            Command::Language(label) => {
                config.language = Language::from_label(&label);
                if !config.language.label().eq_ignore_ascii_case(label.trim()) {
                    writeln!(self.output, "Unsupported language '{}', using English.", label)?;
                }
            }
            Command::Gender(gender) => config.gender = gender,
            Command::Focus(focus) => config.training_focus = focus,
            Command::Price { min, max } => {
                config.min_price = min;
                config.max_price = max;
            }
            Command::Discount { min, max } => {
                config.min_discount = min;
                config.max_discount = max;
            }
            Command::Product(features) => config.product_info = features.join("\n"),
            other => {
                warn!("Command {:?} is not a scenario setting", other);
                return Ok(());
            }
        }

        writeln!(self.output, "Updated.")?;
        self.report_config_warnings()
    }

    fn report_config_warnings(&mut self) -> Result<()> {
        for warning in self.session.config().validate() {
            warn!("Scenario config: {}", warning);
            writeln!(self.output, "{}", cformat!("<yellow>Warning:</yellow> {}", warning))?;
        }
        Ok(())
    }

    fn print_config(&mut self) -> Result<()> {
        let config = self.session.config().clone();
        let heading = cformat!("<bold>Scenario</bold>");
        writeln!(self.output, "{}\n  {}", heading, config.scenario_text())?;
        writeln!(self.output, "Language:       {} ({})", config.language, config.language.code())?;
        writeln!(self.output, "Buyer:          {}", config.gender)?;
        writeln!(self.output, "Training focus: {}", config.training_focus)?;
        writeln!(self.output, "Price (USD):    {} - {}", config.min_price, config.max_price)?;
        writeln!(self.output, "Discount (%):   {} - {}", config.min_discount, config.max_discount)?;
        writeln!(self.output, "Product:")?;
        for feature in config.product_info.lines().filter(|line| !line.trim().is_empty()) {
            writeln!(self.output, "  - {}", feature.trim())?;
        }
        self.report_config_warnings()
    }

    fn print_history(&mut self) -> Result<()> {
        if self.session.history().is_empty() {
            writeln!(self.output, "No conversation yet.")?;
            return Ok(());
        }

        let pairs = self.session.history().pairs().to_vec();
        for (user, assistant) in pairs {
            writeln!(self.output, "{}", cformat!("<green>You:</green>   {}", user))?;
            writeln!(self.output, "{}", cformat!("<cyan>Buyer:</cyan> {}", assistant))?;
        }
        Ok(())
    }

    /// Transcribe a recording and answer it. Returns `false` if the
    /// recording could not be loaded.
    async fn handle_audio(&mut self, path: &str) -> Result<bool> {
        let clip = match read_recording(path).await {
            Ok(clip) => clip,
            Err(e) => {
                error!("{}", e);
                writeln!(self.output, "{}", e)?;
                return Ok(false);
            }
        };

        let (cancel, interrupt) = interrupt_on_ctrl_c();
        let outcome = self.answer_recording(clip, cancel).await;
        interrupt.abort();

        outcome.map(|()| true)
    }

    async fn answer_recording(&mut self, clip: AudioClip, cancel: CancellationToken) -> Result<()> {
        let language = self.session.config().language;
        let transcribed = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            text = self.transcriber.transcribe(clip, language) => Some(text),
        };

        let Some(text) = transcribed else {
            info!("Transcription cancelled");
            writeln!(self.output, "Transcription cancelled.")?;
            return Ok(());
        };
        writeln!(self.output, "{}", cformat!("<green>You:</green> {}", text))?;

        self.answer(&text, cancel).await
    }

    async fn run_turn(&mut self, text: &str) -> Result<()> {
        let (cancel, interrupt) = interrupt_on_ctrl_c();
        let outcome = self.answer(text, cancel).await;
        interrupt.abort();
        outcome
    }

    async fn answer(&mut self, text: &str, cancel: CancellationToken) -> Result<()> {
        if text.is_empty() {
            writeln!(self.output, "Nothing to send.")?;
            return Ok(());
        }

        self.session.add_text(text);
        self.turns += 1;

        let stream = self.streamer.stream(
            self.session.history().clone(),
            self.session.conversation(),
            self.session.config().gender,
            cancel,
        );
        let mut stream = Box::pin(stream);

        writeln!(self.output, "{}", cformat!("<cyan>Buyer:</cyan>"))?;
        let mut shown = 0;
        let mut sentence = 0;

        let outcome = loop {
            match stream.next().await {
                Some(Ok(reply)) => {
                    let text = reply.history.last_assistant().unwrap_or_default();
                    write!(self.output, "{}", &text[shown.min(text.len())..])?;
                    self.output.flush()?;
                    shown = text.len();

                    if !reply.audio.is_empty() {
                        match self.sink.write(self.turns, sentence, &reply.audio).await {
                            Ok(path) => debug!("Spoke {:?} -> {}", reply.sentence, path.display()),
                            Err(e) => warn!("{}", e),
                        }
                        sentence += 1;
                    }

                    self.session.commit_history(reply.history);
                }
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            }
        };

        writeln!(self.output)?;

        if let Err(e) = outcome {
            match e {
                StreamError::Cancelled => {
                    info!("Turn {} cancelled", self.turns);
                    writeln!(self.output, "Response cancelled.")?;
                }
                StreamError::Provider(e) => {
                    error!("Turn {} aborted: {}", self.turns, e);
                    writeln!(self.output, "Response aborted: {}", e)?;
                }
            }
            self.session.abort_turn();
        }

        Ok(())
    }
}

/// Token cancelled by Ctrl-C until the returned watcher is aborted.
fn interrupt_on_ctrl_c() -> (CancellationToken, JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });
    (cancel, watcher)
}
