use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use std::fs::{self, OpenOptions};
use std::io;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

mod config;
mod service;
mod storage;
mod tui;

use config::Config;
use service::NoteService;
use tui::app::App;

fn main() -> Result<()> {
    let config = Config::load()?;
    fs::create_dir_all(&config.root)
        .with_context(|| format!("Failed to create {}", config.root.display()))?;

    // The terminal belongs to the UI, so logs go to a file under the root
    let log_path = config.log_file();
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ZETTELBOX_LOG")
                .unwrap_or_else(|_| EnvFilter::new("zettelbox=info")),
        )
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();

    tracing::info!("Starting zettelbox in {}", config.root.display());

    let service = NoteService::new(config);
    service.initialize()?;
    let mut app = App::new(service)?;

    // Setup terminal
    enable_raw_mode().map_err(|e| anyhow::anyhow!("Failed to enable raw mode: {}. Make sure you're running in a terminal.", e))?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).map_err(|e| anyhow::anyhow!("Failed to enter alternate screen: {}. Make sure you're running in a terminal.", e))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).map_err(|e| anyhow::anyhow!("Failed to create terminal: {}. Make sure you're running in a terminal.", e))?;

    let result = run(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    if let Err(ref e) = result {
        tracing::error!("zettelbox exited with error: {:#}", e);
    }
    result
}

fn run<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|f| app.render(f))?;

        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                app.handle_key(key.code, key.modifiers)?;
            }
        }
    }
    Ok(())
}
