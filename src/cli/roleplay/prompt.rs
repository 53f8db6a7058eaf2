use rustyline::{Config, Editor, Result};

use super::scenario::ScenarioConfig;

/// REPL prompt showing the persona the rep is talking to.
pub fn generate_prompt(config: &ScenarioConfig, in_progress: bool) -> String {
    let marker = if in_progress { ">" } else { "+>" };
    format!("[{} buyer, {}] {} ", config.gender, config.language, marker)
}

pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(rustyline::CompletionType::List)
        .build();
    Editor::with_config(config)
}
