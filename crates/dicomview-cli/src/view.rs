//! Line-oriented study browser.
//!
//! Prints the study header and series list, then steps through slices of the
//! selected series in response to short commands on stdin.

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, Context, Result};

use dicomview_core::models::StudyManifest;
use dicomview_core::viewer::{NavDirection, ViewerState, ZoomDirection, DEFAULT_PREFETCH_RADIUS};
use dicomview_core::AuthSession;

const HELP: &str = "n next | p prev | s <idx> series | + zoom in | - zoom out | i invert | a annotations | q quit";

#[derive(Debug, PartialEq)]
enum Command {
    Next,
    Prev,
    Series(usize),
    ZoomIn,
    ZoomOut,
    Invert,
    Annotations,
    Quit,
    Help,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let command = match parts.next()? {
        "n" | "next" => Command::Next,
        "p" | "prev" => Command::Prev,
        "s" | "series" => Command::Series(parts.next()?.parse().ok()?),
        "+" => Command::ZoomIn,
        "-" => Command::ZoomOut,
        "i" => Command::Invert,
        "a" => Command::Annotations,
        "q" | "quit" => Command::Quit,
        "h" | "?" | "help" => Command::Help,
        _ => return None,
    };
    Some(command)
}

/// Where `view` reads the study manifest from.
#[derive(Debug, PartialEq)]
pub enum ManifestSource {
    File(String),
    Api(String),
}

impl ManifestSource {
    /// `<manifest.json>` or `--api <endpoint>`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        match args {
            [flag, endpoint, ..] if flag == "--api" => Ok(Self::Api(endpoint.clone())),
            [flag] if flag == "--api" => Err(anyhow!("--api requires an endpoint, e.g. /api/studies/1")),
            [path, ..] => Ok(Self::File(path.clone())),
            [] => Err(anyhow!("view requires a manifest file or --api <endpoint>")),
        }
    }
}

async fn load_manifest(api: &AuthSession, source: &ManifestSource) -> Result<StudyManifest> {
    match source {
        ManifestSource::Api(endpoint) => api
            .get(endpoint)
            .await
            .with_context(|| format!("Failed to fetch manifest from {}", endpoint)),
        ManifestSource::File(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path))?;
            serde_json::from_str(&contents).context("Failed to parse study manifest")
        }
    }
}

fn print_study(state: &ViewerState) {
    let manifest = state.manifest();
    let study = &manifest.study;
    println!("{}", study.patient_name);
    let subtitle = study.subtitle();
    if !subtitle.is_empty() {
        println!("{}", subtitle);
    }
    println!(
        "{}{} Series, {} Images\n",
        study.modality.as_deref().map(|m| format!("[{}] ", m)).unwrap_or_default(),
        study.number_of_series,
        study.number_of_instances
    );

    for (idx, series) in manifest.series.iter().enumerate() {
        let marker = if state.selected_series_index() == Some(idx) { '>' } else { ' ' };
        println!(
            "{} {:>2}  {:<12} {:<30} {:>4} {} images",
            marker,
            idx,
            series.title(idx),
            series.description_display(),
            series.modality.as_deref().unwrap_or(""),
            series.image_count()
        );
    }
    println!();
}

fn print_position(state: &ViewerState) {
    match (state.current_image_id(), state.position_label()) {
        (Some(id), Some(position)) => {
            let settings = state.settings();
            println!(
                "Image {}  zoom {}{}{}",
                position,
                state.zoom_percent(),
                if settings.invert { "  inverted" } else { "" },
                if settings.annotations { "" } else { "  no overlay" },
            );
            println!("  {}", id);
            let neighbours = state.prefetch_ids(DEFAULT_PREFETCH_RADIUS);
            if !neighbours.is_empty() {
                println!("  prefetch: {}", neighbours.len());
            }
        }
        _ => println!("Select a series (s <idx>)"),
    }
}

fn apply(state: &mut ViewerState, command: Command) -> Result<bool> {
    match command {
        Command::Next => state.navigate(NavDirection::Next),
        Command::Prev => state.navigate(NavDirection::Prev),
        Command::Series(idx) => {
            state.select_series(idx)?;
            print_study(state);
        }
        Command::ZoomIn => state.zoom(ZoomDirection::In),
        Command::ZoomOut => state.zoom(ZoomDirection::Out),
        Command::Invert => state.toggle_invert(),
        Command::Annotations => state.toggle_annotations(),
        Command::Help => println!("{}", HELP),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

pub async fn run(api: &AuthSession, source: &ManifestSource) -> Result<()> {
    let manifest = load_manifest(api, source).await?;
    let mut state = ViewerState::new(manifest);

    print_study(&state);
    println!("{}\n", HELP);
    print_position(&state);

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let Some(command) = parse_command(&line) else {
            println!("{}", HELP);
            continue;
        };
        match apply(&mut state, command) {
            Ok(true) => print_position(&state),
            Ok(false) => break,
            Err(e) => println!("{}", e),
        }
    }
    Ok(())
}
