use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod deepseek;
mod handler;
mod memory;
mod provider;
mod session;
mod tui;
mod ui;

use app::App;
use config::Config;
use deepseek::DeepSeekClient;
use memory::{AgentIdentity, ConversationStore};
use session::ChatSession;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_init().unwrap_or_else(|_| Config::new());

    let data_dir = config::data_dir()?;
    fs::create_dir_all(&data_dir)?;
    init_tracing(&data_dir)?;

    let api_key = config.resolve_api_key();
    let client = DeepSeekClient::new(&config.base_url, api_key.as_deref().unwrap_or_default());

    let identity = AgentIdentity::new(&config.bot_name, &config.persona);
    let store = ConversationStore::load(&data_dir, &identity.name);
    let session = ChatSession::new(identity, store, client, config.model.clone());

    let mut app = App::new(session, &config, api_key.is_some());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    while !app.should_quit {
        terminal.draw(|frame| ui::draw(frame, &mut app))?;
        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event).await?,
            None => break,
        }
    }

    tui::restore()?;
    Ok(())
}

/// Logs go to a file in the data directory; stderr belongs to the TUI.
fn init_tracing(data_dir: &Path) -> Result<()> {
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join("memobot.log"))?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("memobot=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}
