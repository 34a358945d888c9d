//! gridstate - a terminal browser for paginated, filterable tables
//!
//! The table's query lives in a shareable location string, the column layout
//! is saved per table, and rows can be exported to CSV or XLSX.

mod action;
mod app;
mod component;
mod components;
mod config;
mod controller;
mod error;
mod logging;
mod model;
mod services;
mod tui;

use crate::action::Action;
use crate::app::App;
use crate::component::Component;
use crate::config::Config;
use crate::controller::{TableController, TableOptions};
use crate::model::ColumnDef;
use crate::services::{
    DataSource, FetchStrategy, JsonFileBackend, LayoutBackend, Location, MemorySource,
    SelectionPolicy,
};
use crate::tui::Tui;
use anyhow::{anyhow, Result};
use clap::Parser;
use crossterm::event::Event;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "gridstate", version, about = "Browse a paginated table in the terminal")]
struct Args {
    /// JSON array of rows to browse; a generated sample is used otherwise
    #[arg(long)]
    data: Option<PathBuf>,

    /// Initial location, e.g. "?page=2&search=ada"
    #[arg(long, default_value = "")]
    location: String,

    /// Table identity for the saved column layout
    #[arg(long)]
    table: Option<String>,

    /// Directory for exported files
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Fetch on the UI thread instead of a worker
    #[arg(long)]
    sync_fetch: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = Config::logs_dir()
        .map(|dir| logging::init(&dir))
        .transpose()?;
    let config = Config::load();
    if !Config::exists() {
        // Write the defaults once so there is a file to edit
        if let Err(err) = config.save() {
            tracing::warn!(error = %err, "could not write default config");
        }
    }

    let controller = build_controller(&args, &config)?;

    // Setup terminal
    let mut tui = Tui::new()?.with_tick_rate(Duration::from_millis(50));
    tui.enter()?;

    let mut app = App::new(controller, config);
    app.init()?;

    let result = run_app(&mut tui, &mut app);

    tui.exit()?;

    if let Err(err) = result {
        tracing::error!(error = ?err, "exiting after error");
        eprintln!("Error: {:?}", err);
        std::process::exit(1);
    }

    // Print the final state so it can be reopened with --location
    let location = app.controller.shareable_location();
    if !location.is_empty() {
        println!("{}", location);
    }

    Ok(())
}

fn default_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", "Order", 10).pinned(),
        ColumnDef::new("name", "Customer", 20),
        ColumnDef::new("status", "Status", 12),
        ColumnDef::new("total", "Total", 10),
        ColumnDef::new("created_at", "Created", 22),
    ]
}

fn build_controller(args: &Args, config: &Config) -> Result<TableController<JsonFileBackend>> {
    let data_path = args
        .data
        .clone()
        .or_else(|| (!config.data_path.is_empty()).then(|| PathBuf::from(&config.data_path)));
    let source = match data_path {
        Some(path) => MemorySource::load(&path)?,
        None => MemorySource::sample(),
    };
    if source.is_empty() {
        tracing::warn!("dataset has no rows");
    }
    let rows = source.len();
    let source: Arc<dyn DataSource> = Arc::new(source);

    let table_id = args.table.clone().unwrap_or_else(|| config.table_id.clone());
    let mut options = TableOptions::new(&table_id, default_columns());
    options.quiet_period = Duration::from_millis(config.debounce_ms);
    options.strategy = if args.sync_fetch {
        FetchStrategy::Call
    } else {
        config.fetch_strategy
    };
    options.selection = SelectionPolicy {
        cascade_children: config.cascade_selection,
    };
    options.export_dir = args
        .export_dir
        .clone()
        .unwrap_or_else(|| config.export_dir());

    let layouts_dir =
        Config::layouts_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

    tracing::info!(
        table_id = %table_id,
        rows,
        strategy = ?options.strategy,
        location = %args.location,
        "mounting table"
    );
    let mut controller = TableController::mount(
        options,
        source,
        JsonFileBackend::new(layouts_dir),
        Location::parse(&args.location),
    )
    .with_identity(config.row_identity());
    if let Some(transform) = config.export_transform() {
        controller = controller.with_export_transform(transform);
    }
    Ok(controller)
}

/// Run the main application loop
fn run_app<B: LayoutBackend>(tui: &mut Tui, app: &mut App<B>) -> Result<()> {
    while !app.should_quit {
        tui.draw(|frame| {
            if let Err(e) = app.draw(frame, frame.area()) {
                tracing::error!(error = %e, "draw failed");
            }
        })?;

        if let Some(event) = tui.next_event()? {
            let action = match event {
                Event::Key(key) => app.handle_key_event(key)?,
                Event::Resize(w, h) => Some(Action::Resize(w, h)),
                _ => None,
            };

            // Action might produce a follow-up action
            let mut current_action = action;
            while let Some(a) = current_action {
                current_action = app.update(a)?;
            }
        } else {
            // No event - tick for fetch results and debounced writes
            app.update(Action::Tick)?;
        }
    }

    Ok(())
}
