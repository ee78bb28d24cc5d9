use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use findflix_core::{bootstrap, CommitStatus, CoreRuntime, SEARCH_CACHE_FILE, TOP_SHOWS_FILE};
use output::{OutputFormat, RenderOptions, Renderer};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "findflix",
    version,
    about = "Find TV shows by approximate title and browse their episodes from the shell."
)]
struct Cli {
    /// Preferred renderer for command output.
    #[arg(long, global = true, value_enum, default_value = "markdown")]
    format: OutputFormat,
    /// Settings file (TOML). Defaults to `findflix.toml` in the config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the directory holding the persisted caches.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    /// Disable ANSI colors in CLI output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Suppress non-critical CLI output.
    #[arg(long, global = true)]
    quiet: bool,
    /// Disable progress indicators for long-running tasks.
    #[arg(long, global = true)]
    no_progress: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand, Clone)]
enum Command {
    /// Resolve a (possibly misspelled) title to one show and list its episodes.
    Search {
        query: String,
        /// First season to list.
        #[arg(long)]
        from: Option<u32>,
        /// Last season to list.
        #[arg(long)]
        to: Option<u32>,
    },
    /// Rank title suggestions for a partially typed query.
    Suggest { query: String },
    /// Show the default listing of top rated shows.
    Top,
    /// Feed search box states from stdin, one per line, through a live session.
    Watch {
        #[arg(long)]
        from: Option<u32>,
        #[arg(long)]
        to: Option<u32>,
    },
    /// Inspect or reset the persisted caches.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand, Clone)]
enum CacheCommand {
    /// Report cache location, entry counts and hit rates.
    Status,
    /// Drop the search cache, the stored listing and in-memory responses.
    Clear,
}

#[derive(Clone, Debug, Serialize)]
struct CacheStatusReport {
    provider: String,
    path: String,
    persisted: bool,
    search_entries: usize,
    search_capacity: usize,
    search_file: bool,
    listing_stored: bool,
    listing_file: bool,
    search_storage_failures: usize,
    response_hit_rate: f64,
}

impl Cli {
    fn progress_enabled(&self) -> bool {
        !self.quiet && !self.no_progress
    }

    fn season_bounds(&self) -> (Option<u32>, Option<u32>) {
        match self.command {
            Command::Search { from, to, .. } | Command::Watch { from, to } => (from, to),
            _ => (None, None),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    if cli.no_color {
        std::env::set_var("NO_COLOR", "1");
    }

    if let Command::Completions { shell } = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(*shell, &mut command, "findflix", &mut std::io::stdout());
        return Ok(());
    }

    let settings = settings::load(cli.config.as_deref(), cli.cache_dir.clone())?;
    let (from, to) = cli.season_bounds();
    let renderer = Arc::new(Renderer::new(RenderOptions {
        format: cli.format,
        quiet: cli.quiet,
        progress: cli.progress_enabled(),
        from,
        to,
    }));
    let runtime = bootstrap(settings.core_config(), renderer.clone()).await?;

    match &cli.command {
        Command::Search { query, .. } => handle_search(&runtime, query).await,
        Command::Suggest { query } => {
            runtime.session().suggest(query).await;
            Ok(())
        }
        Command::Top => {
            runtime.session().load_default_listing().await;
            Ok(())
        }
        Command::Watch { .. } => handle_watch(&runtime).await,
        Command::Cache { command } => handle_cache_command(command, &cli, &renderer, &runtime).await,
        Command::Completions { .. } => Ok(()),
    }
}

async fn handle_search(runtime: &CoreRuntime, query: &str) -> Result<()> {
    match runtime.session().commit_search(query).await {
        CommitStatus::Skipped => bail!("search query must not be empty"),
        CommitStatus::Superseded | CommitStatus::Applied(_) => Ok(()),
    }
}

async fn handle_watch(runtime: &CoreRuntime) -> Result<()> {
    let session = runtime.session();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        debug!(target: "findflix_cli", input = %line, "search box changed");
        session.on_input(&line);
    }

    // The last keystroke may still have a debounce, a suggestion fetch or
    // the fallback listing outstanding.
    session.settle().await;
    Ok(())
}

async fn handle_cache_command(
    command: &CacheCommand,
    cli: &Cli,
    renderer: &Renderer,
    runtime: &CoreRuntime,
) -> Result<()> {
    let session = runtime.session();
    match command {
        CacheCommand::Status => {
            if cli.quiet {
                return Ok(());
            }
            let path = runtime.cache_dir();
            let report = CacheStatusReport {
                provider: runtime.client().config().base_url.clone(),
                path: path.display().to_string(),
                persisted: runtime.config().persist,
                search_entries: session.cache().len().await,
                search_capacity: session.cache().capacity(),
                search_file: path.join(SEARCH_CACHE_FILE).exists(),
                listing_stored: session.catalog().cached().await.is_some(),
                listing_file: path.join(TOP_SHOWS_FILE).exists(),
                search_storage_failures: session.cache().stats().snapshot().persist_failures(),
                response_hit_rate: runtime.client().cache_stats().hit_rate(),
            };
            renderer.cache_status(&report)?;
        }
        CacheCommand::Clear => {
            runtime.clear_caches().await;
            info!(
                target: "findflix_cli",
                path = %runtime.cache_dir().display(),
                "caches cleared"
            );
            if cli.quiet {
                return Ok(());
            }
            renderer.cache_cleared()?;
        }
    }
    Ok(())
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,findflix_cli=info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .without_time()
        .with_ansi(!cli.no_color)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize logging: {error}"))
}

mod settings {
    use std::{
        path::{Path, PathBuf},
        time::Duration,
    };

    use anyhow::{Context, Result};
    use config::{Config, Environment, File};
    use directories::ProjectDirs;
    use findflix_client::{cache::DEFAULT_CAPACITY, ClientConfig, BASE_URL};
    use findflix_core::{catalog::CatalogConfig, ranking::Ranker, session::DEFAULT_DEBOUNCE, CoreConfig};
    use serde::Deserialize;

    const CONFIG_FILE_NAME: &str = "findflix.toml";
    const ENV_PREFIX: &str = "FINDFLIX";

    /// Layered settings: built-in defaults, then the TOML file, then
    /// `FINDFLIX_*` variables, then command-line flags.
    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(default)]
    pub struct Settings {
        pub cache_dir: Option<PathBuf>,
        pub cache_capacity: usize,
        pub debounce_ms: u64,
        pub persist: bool,
        pub base_url: String,
        pub timeout_secs: u64,
        pub response_ttl_secs: i64,
        pub ranking: Ranker,
        pub catalog: CatalogConfig,
    }

    impl Default for Settings {
        fn default() -> Self {
            let client = ClientConfig::default();
            Self {
                cache_dir: None,
                cache_capacity: DEFAULT_CAPACITY,
                debounce_ms: u64::try_from(DEFAULT_DEBOUNCE.as_millis()).unwrap_or(450),
                persist: true,
                base_url: BASE_URL.to_string(),
                timeout_secs: client.timeout.as_secs(),
                response_ttl_secs: client.response_ttl.whole_seconds(),
                ranking: Ranker::default(),
                catalog: CatalogConfig::default(),
            }
        }
    }

    impl Settings {
        pub fn core_config(&self) -> CoreConfig {
            CoreConfig {
                cache_dir: self.cache_dir.clone(),
                cache_capacity: self.cache_capacity.max(1),
                debounce: Duration::from_millis(self.debounce_ms),
                ranker: self.ranking,
                catalog: self.catalog,
                client: ClientConfig {
                    base_url: self.base_url.clone(),
                    timeout: Duration::from_secs(self.timeout_secs),
                    response_ttl: time::Duration::seconds(self.response_ttl_secs),
                    ..ClientConfig::default()
                },
                persist: self.persist,
            }
        }
    }

    fn default_config_file() -> Option<PathBuf> {
        ProjectDirs::from("io", "FindFlix", "findflix")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// An explicit `--config` must exist; the default location is optional.
    pub fn load(explicit: Option<&Path>, cache_dir: Option<PathBuf>) -> Result<Settings> {
        let mut builder = Config::builder();
        match explicit {
            Some(path) => builder = builder.add_source(File::from(path).required(true)),
            None => {
                if let Some(path) = default_config_file() {
                    builder = builder.add_source(File::from(path).required(false));
                }
            }
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = builder
            .build()
            .context("failed to read settings")?
            .try_deserialize()
            .context("invalid settings")?;
        if cache_dir.is_some() {
            settings.cache_dir = cache_dir;
        }
        Ok(settings)
    }

}

mod output {
    use std::{fmt::Write, sync::Mutex};

    use anyhow::Result;
    use clap::ValueEnum;
    use findflix_client::types::{Episode, Show};
    use findflix_core::{
        catalog::CatalogOutcome,
        episodes::{filter_episodes, EpisodeSummary, SeasonRange},
        session::Render,
        SearchOutcome, Suggestion,
    };
    use indicatif::ProgressBar;
    use scraper::Html;
    use serde_json::{self, json};
    use tracing::warn;

    use crate::progress::spinner;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
    pub enum OutputFormat {
        Json,
        Markdown,
        Table,
        Text,
    }

    #[derive(Copy, Clone, Debug)]
    pub struct RenderOptions {
        pub format: OutputFormat,
        pub quiet: bool,
        pub progress: bool,
        pub from: Option<u32>,
        pub to: Option<u32>,
    }

    /// Prints everything a session produces, in the selected format.
    pub struct Renderer {
        options: RenderOptions,
        spinner: Mutex<Option<ProgressBar>>,
    }

    impl Renderer {
        pub fn new(options: RenderOptions) -> Self {
            Self {
                options,
                spinner: Mutex::new(None),
            }
        }

        fn format(&self) -> OutputFormat {
            self.options.format
        }

        fn report(&self, what: &str, result: Result<()>) {
            if let Err(error) = result {
                warn!(target: "findflix_cli", %error, "failed to render {what}");
            }
        }

        fn suggestions(&self, items: &[Suggestion]) -> Result<()> {
            match self.format() {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&json!({ "suggestions": items }))?);
                }
                _ if items.is_empty() => println!("No suggestions."),
                OutputFormat::Markdown => {
                    println!("| Show | Premiered | Score |");
                    println!("| --- | --- | ---: |");
                    for item in items {
                        println!(
                            "| {} | {} | {:.3} |",
                            item.name,
                            item.premiere_year.as_deref().unwrap_or("n/a"),
                            item.score
                        );
                    }
                }
                OutputFormat::Table => {
                    let rows: Vec<Vec<String>> = items
                        .iter()
                        .map(|item| {
                            vec![
                                truncate(&item.name, 48),
                                item.premiere_year.clone().unwrap_or_else(|| "n/a".to_string()),
                                format!("{:.3}", item.score),
                            ]
                        })
                        .collect();
                    render_table(&["Show", "Premiered", "Score"], &rows);
                }
                OutputFormat::Text => {
                    for item in items {
                        match &item.premiere_year {
                            Some(year) => println!("• {} ({year})", item.name),
                            None => println!("• {}", item.name),
                        }
                    }
                }
            }
            Ok(())
        }

        fn result(&self, outcome: &SearchOutcome) -> Result<()> {
            let SearchOutcome::Found { show, .. } = outcome else {
                return self.miss(outcome);
            };
            let episodes = show.episodes();
            let range = SeasonRange::from_bounds(self.options.from, self.options.to, episodes);
            let shown = filter_episodes(episodes, range);
            let summary = EpisodeSummary::new(episodes, range);

            match self.format() {
                OutputFormat::Json => {
                    let payload = json!({
                        "status": "found",
                        "show": show_header(show),
                        "summary": summary,
                        "episodes": shown,
                    });
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                }
                OutputFormat::Markdown => {
                    println!("## {}", title_line(show));
                    println!();
                    if let Some(text) = show.summary.as_deref().map(strip_tags) {
                        println!("{text}");
                        println!();
                    }
                    if !show.genres.is_empty() {
                        println!("**Genres:** {}", show.genres.join(", "));
                    }
                    println!("**Rating:** {}", rating_label(show.rating.average));
                    println!();
                    println!("_{}_", summary.headline());
                    println!();
                    println!("| Episode | Name | Aired |");
                    println!("| --- | --- | --- |");
                    for episode in &shown {
                        println!(
                            "| {} | {} | {} |",
                            episode.label(),
                            episode.name,
                            episode.airdate.as_deref().unwrap_or("")
                        );
                    }
                }
                OutputFormat::Table => {
                    println!("{}", title_line(show));
                    println!("{}", summary.headline());
                    render_table(&["Episode", "Name", "Aired"], &episode_rows(&shown));
                }
                OutputFormat::Text => {
                    println!("{} — rated {}", title_line(show), rating_label(show.rating.average));
                    println!("{}", summary.headline());
                    for episode in &shown {
                        println!("  {:<8} {}", episode.label(), episode.name);
                    }
                }
            }
            Ok(())
        }

        fn miss(&self, outcome: &SearchOutcome) -> Result<()> {
            match (self.format(), outcome) {
                (OutputFormat::Json, _) => println!("{}", serde_json::to_string_pretty(outcome)?),
                (_, SearchOutcome::NotFound { query }) => {
                    println!("No show matches `{query}`. Try another spelling.");
                }
                (_, SearchOutcome::NetworkFailure { query, message }) => {
                    println!("Could not search for `{query}`: {message}");
                }
                (_, SearchOutcome::Found { .. }) => {}
            }
            Ok(())
        }

        fn catalog(&self, outcome: &CatalogOutcome) -> Result<()> {
            let shows = match (self.format(), outcome) {
                (OutputFormat::Json, _) => {
                    println!("{}", serde_json::to_string_pretty(outcome)?);
                    return Ok(());
                }
                (_, CatalogOutcome::Empty) => {
                    println!("No shows available right now.");
                    return Ok(());
                }
                (_, CatalogOutcome::NetworkFailure { message }) => {
                    println!("Could not load top shows: {message}");
                    return Ok(());
                }
                (_, CatalogOutcome::Listing { shows }) => shows,
            };

            match self.format() {
                OutputFormat::Markdown => {
                    println!("| # | Show | Rating | Episodes |");
                    println!("| ---: | --- | ---: | ---: |");
                    for (idx, show) in shows.iter().enumerate() {
                        println!(
                            "| {} | {} | {} | {} |",
                            idx + 1,
                            show.name,
                            rating_label(show.rating),
                            show.episodes.len()
                        );
                    }
                }
                OutputFormat::Table => {
                    let rows: Vec<Vec<String>> = shows
                        .iter()
                        .enumerate()
                        .map(|(idx, show)| {
                            vec![
                                (idx + 1).to_string(),
                                truncate(&show.name, 48),
                                rating_label(show.rating),
                                show.episodes.len().to_string(),
                            ]
                        })
                        .collect();
                    render_table(&["#", "Show", "Rating", "Episodes"], &rows);
                }
                OutputFormat::Text | OutputFormat::Json => {
                    for (idx, show) in shows.iter().enumerate() {
                        println!("{:>2}. {} ({})", idx + 1, show.name, rating_label(show.rating));
                    }
                }
            }
            Ok(())
        }

        pub fn cache_status(&self, report: &crate::CacheStatusReport) -> Result<()> {
            let rows = vec![
                vec!["Provider".to_string(), report.provider.clone()],
                vec!["Path".to_string(), report.path.clone()],
                vec!["Persisted".to_string(), report.persisted.to_string()],
                vec![
                    "Search Entries".to_string(),
                    format!("{}/{}", report.search_entries, report.search_capacity),
                ],
                vec!["Search File".to_string(), report.search_file.to_string()],
                vec!["Listing Stored".to_string(), report.listing_stored.to_string()],
                vec!["Listing File".to_string(), report.listing_file.to_string()],
                vec![
                    "Storage Failures".to_string(),
                    report.search_storage_failures.to_string(),
                ],
                vec![
                    "Response Hit Rate".to_string(),
                    format!("{:.1}%", report.response_hit_rate),
                ],
            ];
            match self.format() {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(report)?);
                }
                OutputFormat::Markdown => {
                    println!("| Property | Value |");
                    println!("| --- | --- |");
                    for row in &rows {
                        println!("| {} | {} |", row[0], row[1]);
                    }
                }
                OutputFormat::Table => render_table(&["Property", "Value"], &rows),
                OutputFormat::Text => {
                    for row in &rows {
                        println!("{}: {}", row[0], row[1]);
                    }
                }
            }
            Ok(())
        }

        pub fn cache_cleared(&self) -> Result<()> {
            match self.format() {
                OutputFormat::Json => {
                    let payload = json!({ "event": "clear_cache", "status": "success" });
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                }
                OutputFormat::Markdown | OutputFormat::Text => {
                    println!("Search cache and stored listing cleared.");
                }
                OutputFormat::Table => {
                    let rows = vec![vec!["Status".to_string(), "Cleared".to_string()]];
                    render_table(&["Field", "Value"], &rows);
                }
            }
            Ok(())
        }
    }

    impl Render for Renderer {
        fn show_suggestions(&self, items: &[Suggestion]) {
            if self.options.quiet {
                return;
            }
            self.report("suggestions", self.suggestions(items));
        }

        fn show_result(&self, outcome: &SearchOutcome) {
            self.report("search result", self.result(outcome));
        }

        fn show_catalog(&self, outcome: &CatalogOutcome) {
            self.report("top shows", self.catalog(outcome));
        }

        fn set_loading(&self, loading: bool) {
            let Ok(mut slot) = self.spinner.lock() else {
                return;
            };
            if loading {
                if slot.is_none() {
                    *slot = spinner(self.options.progress, "Searching TVmaze...");
                }
            } else if let Some(progress) = slot.take() {
                progress.finish_and_clear();
            }
        }
    }

    fn show_header(show: &Show) -> serde_json::Value {
        json!({
            "id": show.id,
            "name": show.name,
            "premiered": show.premiered,
            "rating": show.rating.average,
            "genres": show.genres,
            "image": show.image.as_ref().and_then(|image| image.best()),
            "summary": show.summary.as_deref().map(strip_tags),
        })
    }

    fn title_line(show: &Show) -> String {
        match show.premiere_year() {
            Some(year) => format!("{} ({year})", show.name),
            None => show.name.clone(),
        }
    }

    fn rating_label(rating: Option<f64>) -> String {
        rating.map_or_else(|| "n/a".to_string(), |value| format!("{value:.1}"))
    }

    fn episode_rows(episodes: &[&Episode]) -> Vec<Vec<String>> {
        episodes
            .iter()
            .map(|episode| {
                vec![
                    episode.label(),
                    truncate(&episode.name, 60),
                    episode.airdate.clone().unwrap_or_default(),
                ]
            })
            .collect()
    }

    fn render_table(headers: &[&str], rows: &[Vec<String>]) {
        let mut widths: Vec<usize> = headers.iter().map(|header| header.chars().count()).collect();
        for row in rows {
            for (idx, cell) in row.iter().enumerate() {
                widths[idx] = widths[idx].max(cell.chars().count());
            }
        }

        fn render_line(columns: &[&str], widths: &[usize]) -> String {
            let mut line = String::new();
            for (idx, value) in columns.iter().enumerate() {
                let width = widths[idx];
                let _ = write!(line, "| {value:width$} ");
            }
            line.push('|');
            line
        }

        println!("{}", render_line(headers, &widths));
        let separator: String = widths
            .iter()
            .map(|width| format!("|{:-^1$}", "", width + 2))
            .collect();
        println!("{separator}|");

        for row in rows {
            let cols: Vec<&str> = row.iter().map(String::as_str).collect();
            println!("{}", render_line(&cols, &widths));
        }
    }

    /// Provider summaries are small HTML fragments; block elements become
    /// word breaks and entities are decoded by the parser.
    pub(crate) fn strip_tags(value: &str) -> String {
        let fragment = Html::parse_fragment(value);
        let mut text = String::with_capacity(value.len());
        for node in fragment.root_element().descendants() {
            if let Some(chunk) = node.value().as_text() {
                text.push_str(chunk);
            } else if let Some(element) = node.value().as_element() {
                if matches!(element.name(), "p" | "br" | "li" | "div") {
                    text.push(' ');
                }
            }
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub(crate) fn truncate(value: &str, max: usize) -> String {
        if value.chars().count() <= max {
            value.to_string()
        } else {
            let mut truncated = value
                .chars()
                .take(max.saturating_sub(1))
                .collect::<String>();
            truncated.push('…');
            truncated
        }
    }

}

mod progress {
    use std::time::Duration;

    use indicatif::{ProgressBar, ProgressStyle};

    pub fn spinner(message_enabled: bool, message: impl Into<String>) -> Option<ProgressBar> {
        if !message_enabled {
            return None;
        }
        let progress = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        progress.set_style(style);
        progress.set_message(message.into());
        progress.enable_steady_tick(Duration::from_millis(80));
        Some(progress)
    }
}
