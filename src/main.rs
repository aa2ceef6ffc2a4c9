use animelon_dl::{
    Acquirer, AcquisitionConfig, AcquisitionEvent, EpisodeSelection, FsSink, HttpTransport,
    LanguageKey, LocatorOutcome, LocatorReport, QualityTier,
};
use animelon_dl::gate::TaskOutcome;
use clap::Parser;
use humansize::{DECIMAL, format_size};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Downloads videos and subtitles from animelon.com
#[derive(Parser, Debug)]
#[command(name = "animelon-dl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Series or video page URLs, e.g. https://animelon.com/series/Death%20Note
    /// or https://animelon.com/video/579b1be6c13aa2a6b28f1364
    #[arg(required = true, value_name = "URL")]
    locators: Vec<String>,

    /// Seconds to wait between launching downloads; also the retry backoff unit
    #[arg(short = 'd', long = "sleep-time", value_name = "SECONDS", default_value_t = 5.0)]
    sleep_time: f64,

    /// Directory to save into
    #[arg(short = 'f', long = "save-path", value_name = "DIR", default_value = ".")]
    save_path: PathBuf,

    /// Number of simultaneous downloads
    #[arg(long, value_name = "N", default_value_t = 1)]
    forks: usize,

    /// Attempts per lookup and per video
    #[arg(long = "max-tries", value_name = "N", default_value_t = 5)]
    max_tries: u32,

    /// Seconds to wait between series lookup attempts
    #[arg(long = "sleep-time-retry", value_name = "SECONDS", default_value_t = 5.0)]
    sleep_time_retry: f64,

    /// Subtitle variants to save (englishSub, romajiSub, hiraganaSub, japaneseSub, none)
    #[arg(
        long = "subtitles-type",
        value_name = "TYPE",
        num_args = 1..,
        value_delimiter = ',',
        default_values_t = ["englishSub", "romajiSub", "hiraganaSub", "japaneseSub"].map(String::from)
    )]
    subtitles_type: Vec<String>,

    /// Quality tiers to try, best first (ozez, stz, tsz)
    #[arg(
        long,
        value_name = "TIER",
        num_args = 1..,
        value_delimiter = ',',
        default_values_t = QualityTier::default_priority()
    )]
    quality: Vec<QualityTier>,

    /// Only save subtitles, skip the videos
    #[arg(long = "subtitles-only")]
    subtitles_only: bool,

    /// Only download these seasons of a series (repeatable)
    #[arg(long = "season", value_name = "SEASON")]
    seasons: Vec<u32>,

    /// Only download this episode, as SEASON:EPISODE with a 1-based episode (repeatable)
    #[arg(long = "episode", value_name = "SEASON:EPISODE", value_parser = parse_episode)]
    episodes: Vec<(u32, usize)>,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> Result<AcquisitionConfig, String> {
        Ok(AcquisitionConfig {
            output_root: self.save_path.clone(),
            max_concurrent: self.forks.max(1),
            max_tries: self.max_tries.max(1),
            sleep_time: seconds(self.sleep_time, "--sleep-time")?,
            retry_sleep: seconds(self.sleep_time_retry, "--sleep-time-retry")?,
            subtitle_languages: subtitle_languages(&self.subtitles_type),
            quality_priority: self.quality.clone(),
            subtitles_only: self.subtitles_only,
            ..AcquisitionConfig::default()
        })
    }

    fn selection(&self) -> EpisodeSelection {
        let episodes = (!self.episodes.is_empty()).then(|| {
            let mut by_season: HashMap<u32, Vec<usize>> = HashMap::new();
            for &(season, episode) in &self.episodes {
                by_season.entry(season).or_default().push(episode);
            }
            by_season
        });

        EpisodeSelection {
            seasons: (!self.seasons.is_empty()).then(|| self.seasons.clone()),
            episodes,
        }
    }
}

fn parse_episode(value: &str) -> Result<(u32, usize), String> {
    let (season, episode) = value
        .split_once(':')
        .ok_or_else(|| format!("expected SEASON:EPISODE, got \"{value}\""))?;
    let season = season
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid season \"{season}\""))?;
    let episode = episode
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|&episode| episode > 0)
        .ok_or_else(|| format!("invalid episode \"{episode}\" (episodes start at 1)"))?;
    Ok((season, episode))
}

fn seconds(value: f64, flag: &str) -> Result<Duration, String> {
    Duration::try_from_secs_f64(value).map_err(|_| format!("{flag} must be a non-negative number"))
}

/// `none` anywhere in the list disables subtitles
fn subtitle_languages(types: &[String]) -> Vec<LanguageKey> {
    if types.iter().any(|t| t.eq_ignore_ascii_case("none")) {
        return Vec::new();
    }
    types.iter().map(|t| LanguageKey::from(t.as_str())).collect()
}

/// Renders acquisition events as one progress bar per running download
struct CliProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn println(&self, line: impl AsRef<str>) {
        // Falls back to plain stdout when the bars are hidden
        if self.multi.println(line.as_ref()).is_err() {
            println!("{}", line.as_ref());
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{msg:30!} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
    }

    fn handle(&self, event: AcquisitionEvent) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);

        match event {
            AcquisitionEvent::SeriesResolved {
                title,
                season_count,
            } => {
                self.println(format!("Found {season_count} season(s) for '{title}'"));
            }
            AcquisitionEvent::LocatorRejected { locator, reason } => {
                self.println(format!("Skipping {locator}: {reason}"));
            }
            AcquisitionEvent::TaskScheduled { label, output } => match output {
                Some(path) => self.println(format!("Queued {label} -> {}", path.display())),
                None => self.println(format!("Queued {label}")),
            },
            AcquisitionEvent::RetryingMedia {
                label,
                attempt,
                max_tries,
                reason,
            } => {
                self.println(format!(
                    "{label}: attempt {attempt}/{max_tries} failed ({reason}), retrying..."
                ));
            }
            AcquisitionEvent::SubtitleSaved { path, .. } => {
                self.println(format!("Saved subtitle {}", path.display()));
            }
            AcquisitionEvent::DownloadStarted {
                label,
                tier,
                total_bytes,
                ..
            } => {
                let bar = self.multi.add(ProgressBar::new(total_bytes));
                bar.set_style(Self::bar_style());
                bar.set_message(format!("{label} [{tier}]"));
                bars.insert(label, bar);
            }
            AcquisitionEvent::DownloadProgress {
                label,
                downloaded,
                total,
            } => {
                if let Some(bar) = bars.get(&label) {
                    bar.set_length(total);
                    bar.set_position(downloaded);
                }
            }
            AcquisitionEvent::DownloadFinished { label, path, bytes } => {
                if let Some(bar) = bars.remove(&label) {
                    bar.finish_and_clear();
                }
                self.println(format!(
                    "Finished {} ({})",
                    path.display(),
                    format_size(bytes, DECIMAL)
                ));
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("animelon_dl={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints one line per task and returns the number of failures
fn print_summary(reports: &[LocatorReport]) -> usize {
    println!("\n=== Summary ===\n");

    for report in reports {
        println!("{}", report.locator);
        match &report.outcome {
            LocatorOutcome::Rejected(e) => println!("  Rejected: {e}"),
            LocatorOutcome::Failed(e) => println!("  Failed: {e}"),
            LocatorOutcome::Scheduled { tasks, unlaunched }
                if tasks.is_empty() && unlaunched.is_empty() =>
            {
                println!("  Nothing selected");
            }
            LocatorOutcome::Scheduled { tasks, unlaunched } => {
                for task in tasks {
                    match &task.outcome {
                        TaskOutcome::Succeeded(outcome) => match &outcome.video {
                            Some(video) => println!(
                                "  {}: {} ({}, {} subtitle(s))",
                                task.label,
                                video.display(),
                                format_size(outcome.bytes, DECIMAL),
                                outcome.subtitles.len()
                            ),
                            None => println!(
                                "  {}: {} subtitle(s)",
                                task.label,
                                outcome.subtitles.len()
                            ),
                        },
                        TaskOutcome::Failed(e) => println!("  {}: failed: {e}", task.label),
                        TaskOutcome::Panicked(message) => {
                            println!("  {}: crashed: {message}", task.label)
                        }
                    }
                }
                for failure in unlaunched {
                    println!("  {}: not started: {}", failure.label, failure.error);
                }
            }
        }
    }

    reports
        .iter()
        .map(|report| report.outcome.failure_count())
        .sum()
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let acquisition_config = match cli.config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    let transport = match HttpTransport::new(acquisition_config.user_agent.clone()) {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let sink = Arc::new(FsSink::new(acquisition_config.output_root.clone()));

    let progress = CliProgress::new();
    let acquirer = Acquirer::new(acquisition_config, transport, sink)
        .with_event_handler(move |event| progress.handle(event));

    let reports = acquirer.acquire_locators(&cli.locators, &cli.selection());

    let failures = print_summary(&reports);
    if failures > 0 {
        eprintln!("\n{failures} item(s) failed");
        process::exit(1);
    }
}
