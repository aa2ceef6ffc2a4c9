//! Acquisition orchestration
//!
//! Expands locators into per-video tasks, runs every task through one
//! [`ConcurrencyGate`] and collects what each of them produced.

use crate::AcquisitionError;
use crate::catalog::{CatalogRecord, CatalogResolver, QualityTier, SubtitleSet};
use crate::config::AcquisitionConfig;
use crate::file_naming::{episode_path, single_video_path};
use crate::gate::{ConcurrencyGate, TaskId, TaskReport};
use crate::link_selector::MediaLinkSelector;
use crate::locator::{Identifier, LocatorError, MediaRef, SeriesRef};
use crate::sink::Sink;
use crate::stream_downloader::{DownloadError, StreamDownloader};
use crate::subtitles::{PassthroughDecryptor, SubtitleDecryptor, SubtitleExtractor};
use crate::transport::Transport;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Progress event emitted during acquisition
///
/// Events of different tasks interleave; `label` tells them apart.
#[derive(Debug, Clone)]
pub enum AcquisitionEvent {
    /// A series was looked up
    SeriesResolved { title: String, season_count: usize },

    /// A locator could not be parsed and was skipped
    LocatorRejected { locator: String, reason: String },

    /// A task was handed to the gate
    TaskScheduled {
        label: String,
        output: Option<PathBuf>,
    },

    /// An attempt failed and the task will try again
    RetryingMedia {
        label: String,
        attempt: u32,
        max_tries: u32,
        reason: String,
    },

    /// A subtitle file was written
    SubtitleSaved { label: String, path: PathBuf },

    /// A working link was found and the video transfer begins
    DownloadStarted {
        label: String,
        path: PathBuf,
        tier: QualityTier,
        total_bytes: u64,
    },

    /// Bytes written so far
    DownloadProgress {
        label: String,
        downloaded: u64,
        total: u64,
    },

    /// The video is complete
    DownloadFinished {
        label: String,
        path: PathBuf,
        bytes: u64,
    },
}

/// Receiver of [`AcquisitionEvent`]s, shared by all tasks
pub type EventCallback = Arc<dyn Fn(AcquisitionEvent) + Send + Sync>;

/// Which seasons and episodes of a series to acquire.
///
/// `None` selects everything. Episode indices are 1-based; a season missing
/// from `episodes` has all of its episodes selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeSelection {
    pub seasons: Option<Vec<u32>>,
    pub episodes: Option<HashMap<u32, Vec<usize>>>,
}

impl EpisodeSelection {
    pub fn includes_season(&self, season: u32) -> bool {
        self.seasons
            .as_ref()
            .is_none_or(|seasons| seasons.contains(&season))
    }

    pub fn includes_episode(&self, season: u32, index: usize) -> bool {
        self.episodes
            .as_ref()
            .and_then(|episodes| episodes.get(&season))
            .is_none_or(|indices| indices.contains(&index))
    }
}

/// One video to acquire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionTask {
    pub media: MediaRef,
    /// Video path relative to the sink; `None` names the file after the
    /// media title once it is known
    pub output: Option<PathBuf>,
    /// Store the configured subtitle languages next to the video
    pub save_subtitles: bool,
    pub label: String,
}

impl AcquisitionTask {
    /// Episode `index` (1-based) of a season
    pub fn episode(series_title: &str, season: u32, index: usize, media: MediaRef) -> Self {
        Self {
            media,
            output: Some(episode_path(series_title, season, index)),
            save_subtitles: true,
            label: format!("{series_title} S{season}E{index}"),
        }
    }

    /// A video requested on its own
    pub fn single(media: MediaRef) -> Self {
        Self {
            label: media.id().to_string(),
            media,
            output: None,
            save_subtitles: true,
        }
    }

    pub fn with_subtitles(mut self, save_subtitles: bool) -> Self {
        self.save_subtitles = save_subtitles;
        self
    }
}

/// What a successful task produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaOutcome {
    /// Title reported by the catalog
    pub title: String,
    /// Stored video, `None` in subtitles-only mode
    pub video: Option<PathBuf>,
    pub bytes: u64,
    pub tier: Option<QualityTier>,
    pub subtitles: Vec<PathBuf>,
}

/// Report of one drained task
pub type MediaReport = TaskReport<MediaOutcome, AcquisitionError>;

/// A task that could not be started
#[derive(Debug)]
pub struct LaunchFailure {
    pub label: String,
    pub error: AcquisitionError,
}

/// Tasks started for a series, and the ones that could not be
#[derive(Debug, Default)]
pub struct SeriesLaunch {
    pub launched: Vec<TaskId>,
    pub unlaunched: Vec<LaunchFailure>,
}

/// What became of a locator
#[derive(Debug)]
pub enum LocatorOutcome {
    /// Not a series or video locator; nothing was started
    Rejected(LocatorError),
    /// The series could not be resolved or the video task not started
    Failed(AcquisitionError),
    /// Reports of every task the locator expanded to
    Scheduled {
        tasks: Vec<MediaReport>,
        unlaunched: Vec<LaunchFailure>,
    },
}

impl LocatorOutcome {
    /// Number of items that did not succeed
    pub fn failure_count(&self) -> usize {
        match self {
            LocatorOutcome::Rejected(_) | LocatorOutcome::Failed(_) => 1,
            LocatorOutcome::Scheduled { tasks, unlaunched } => {
                tasks.iter().filter(|task| !task.succeeded()).count() + unlaunched.len()
            }
        }
    }
}

#[derive(Debug)]
pub struct LocatorReport {
    pub locator: String,
    pub outcome: LocatorOutcome,
}

/// Builds the tasks for the selected episodes of a series, in catalog order.
pub fn plan_series(record: &CatalogRecord, selection: &EpisodeSelection) -> Vec<AcquisitionTask> {
    record
        .seasons
        .iter()
        .filter(|season| selection.includes_season(season.number))
        .flat_map(|season| {
            season
                .episodes
                .iter()
                .enumerate()
                .map(move |(i, media)| (season.number, i + 1, media))
        })
        .filter(|&(season, index, _)| selection.includes_episode(season, index))
        .map(|(season, index, media)| {
            AcquisitionTask::episode(&record.title, season, index, media.clone())
        })
        .collect()
}

/// Drives acquisitions: resolves locators, schedules tasks, collects outcomes.
///
/// Each task receives its own transport from [`Transport::isolated`], so a
/// task never shares client state with another.
pub struct Acquirer<T: Transport> {
    config: Arc<AcquisitionConfig>,
    transport: T,
    sink: Arc<dyn Sink>,
    decryptor: Arc<dyn SubtitleDecryptor>,
    events: EventCallback,
    gate: ConcurrencyGate<MediaOutcome, AcquisitionError>,
    launches: AtomicUsize,
}

impl<T: Transport> Acquirer<T> {
    /// Creates an acquirer with plaintext subtitles and no event handler.
    pub fn new(config: AcquisitionConfig, transport: T, sink: Arc<dyn Sink>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            sink,
            decryptor: Arc::new(PassthroughDecryptor),
            events: Arc::new(|_: AcquisitionEvent| {}),
            gate: ConcurrencyGate::new(),
            launches: AtomicUsize::new(0),
        }
    }

    pub fn with_decryptor(mut self, decryptor: Arc<dyn SubtitleDecryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(AcquisitionEvent) + Send + Sync + 'static,
    {
        self.events = Arc::new(handler);
        self
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Acquires everything the locators point at and waits for completion.
    ///
    /// Malformed locators are reported and skipped. All tasks share one gate,
    /// so `max_concurrent` bounds the whole run, not each locator.
    pub fn acquire_locators(
        &self,
        locators: &[String],
        selection: &EpisodeSelection,
    ) -> Vec<LocatorReport> {
        enum Planned {
            Done(LocatorOutcome),
            Tasks(SeriesLaunch),
        }

        let planned: Vec<(String, Planned)> = locators
            .iter()
            .map(|locator| {
                let planned = match Identifier::parse(locator) {
                    Err(e) => {
                        warn!(%locator, error = %e, "rejected locator");
                        self.emit(AcquisitionEvent::LocatorRejected {
                            locator: locator.clone(),
                            reason: e.to_string(),
                        });
                        Planned::Done(LocatorOutcome::Rejected(e))
                    }
                    Ok(Identifier::Series(series)) => match self.acquire_series(&series, selection) {
                        Ok(launch) => Planned::Tasks(launch),
                        Err(e) => Planned::Done(LocatorOutcome::Failed(e)),
                    },
                    Ok(Identifier::Media(media)) => match self.acquire_media(&media) {
                        Ok(id) => Planned::Tasks(SeriesLaunch {
                            launched: vec![id],
                            unlaunched: Vec::new(),
                        }),
                        Err(e) => Planned::Done(LocatorOutcome::Failed(e)),
                    },
                };
                (locator.clone(), planned)
            })
            .collect();

        let mut reports: HashMap<TaskId, MediaReport> = self
            .drain()
            .into_iter()
            .map(|report| (report.id, report))
            .collect();

        planned
            .into_iter()
            .map(|(locator, planned)| {
                let outcome = match planned {
                    Planned::Done(outcome) => outcome,
                    Planned::Tasks(launch) => LocatorOutcome::Scheduled {
                        tasks: launch
                            .launched
                            .iter()
                            .filter_map(|id| reports.remove(id))
                            .collect(),
                        unlaunched: launch.unlaunched,
                    },
                };
                LocatorReport { locator, outcome }
            })
            .collect()
    }

    /// Resolves a series and schedules its selected episodes.
    ///
    /// Returns once every task is launched; call [`drain`](Self::drain) to
    /// wait for them. Tasks that fail to launch are returned alongside.
    pub fn acquire_series(
        &self,
        series: &SeriesRef,
        selection: &EpisodeSelection,
    ) -> Result<SeriesLaunch, AcquisitionError> {
        let record = CatalogResolver::from_config(&self.transport, &self.config)
            .resolve_series(series)?;
        info!(title = %record.title, seasons = record.seasons.len(), "resolved series");
        self.emit(AcquisitionEvent::SeriesResolved {
            title: record.title.clone(),
            season_count: record.seasons.len(),
        });

        let mut launch = SeriesLaunch::default();
        for task in plan_series(&record, selection) {
            let label = task.label.clone();
            match self.schedule(task) {
                Ok(id) => launch.launched.push(id),
                Err(error) => {
                    warn!(task = %label, %error, "could not start task");
                    launch.unlaunched.push(LaunchFailure { label, error });
                }
            }
        }

        Ok(launch)
    }

    /// Schedules a single video, stored as `<title>.mp4` at the output root.
    pub fn acquire_media(&self, media: &MediaRef) -> Result<TaskId, AcquisitionError> {
        self.schedule(AcquisitionTask::single(media.clone()))
    }

    /// Waits for a free slot, then launches `task` on its own thread.
    ///
    /// Launches after the first are spaced `sleep_time` apart.
    pub fn schedule(&self, task: AcquisitionTask) -> Result<TaskId, AcquisitionError> {
        if self.launches.fetch_add(1, Ordering::Relaxed) > 0 {
            thread::sleep(self.config.sleep_time);
        }
        self.gate.admit(self.config.max_concurrent);

        let pipeline = MediaPipeline {
            config: Arc::clone(&self.config),
            transport: self.transport.isolated()?,
            sink: Arc::clone(&self.sink),
            decryptor: Arc::clone(&self.decryptor),
            events: Arc::clone(&self.events),
        };

        self.emit(AcquisitionEvent::TaskScheduled {
            label: task.label.clone(),
            output: task.output.as_deref().map(|path| self.sink.resolve(path)),
        });
        debug!(task = %task.label, media = %task.media, "scheduling");

        let id = self
            .gate
            .launch(task.label.clone(), move || pipeline.run(&task))?;
        Ok(id)
    }

    /// Waits for every scheduled task; reports come back in launch order.
    pub fn drain(&self) -> Vec<MediaReport> {
        self.gate.drain()
    }

    fn emit(&self, event: AcquisitionEvent) {
        (self.events)(event);
    }
}

/// Delay before attempt `attempt + 1`; saturates instead of overflowing
fn retry_backoff(unit: Duration, attempt: u32) -> Duration {
    unit.saturating_mul(attempt)
}

/// Everything a task needs, owned so it can move onto the task's thread
struct MediaPipeline<T> {
    config: Arc<AcquisitionConfig>,
    transport: T,
    sink: Arc<dyn Sink>,
    decryptor: Arc<dyn SubtitleDecryptor>,
    events: EventCallback,
}

impl<T: Transport> MediaPipeline<T> {
    /// Runs up to `max_tries` attempts.
    ///
    /// Failed lookups and missing links back off `sleep_time * attempt`;
    /// any other error ends the task. Subtitles are written at most once.
    fn run(&self, task: &AcquisitionTask) -> Result<MediaOutcome, AcquisitionError> {
        let resolver = CatalogResolver::from_config(&self.transport, &self.config);
        let max_tries = self.config.max_tries.max(1);
        let mut subtitles = None;
        let mut attempt = 1;

        loop {
            match self.attempt(&resolver, task, &mut subtitles) {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && attempt < max_tries => {
                    warn!(task = %task.label, attempt, max_tries, error = %e, "attempt failed, retrying");
                    self.emit(AcquisitionEvent::RetryingMedia {
                        label: task.label.clone(),
                        attempt,
                        max_tries,
                        reason: e.to_string(),
                    });
                    thread::sleep(retry_backoff(self.config.sleep_time, attempt));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn attempt(
        &self,
        resolver: &CatalogResolver<'_>,
        task: &AcquisitionTask,
        saved_subtitles: &mut Option<Vec<PathBuf>>,
    ) -> Result<MediaOutcome, AcquisitionError> {
        let record = resolver.resolve_media(&task.media)?;

        let video_path = task
            .output
            .clone()
            .unwrap_or_else(|| single_video_path(&record.title));
        let directory = video_path.parent().unwrap_or(Path::new(""));

        if task.save_subtitles && saved_subtitles.is_none() {
            let paths = self.save_subtitles(task, &record.subtitles, &video_path, directory)?;
            *saved_subtitles = Some(paths);
        }
        let subtitles = saved_subtitles.clone().unwrap_or_default();

        if self.config.subtitles_only {
            return Ok(MediaOutcome {
                title: record.title,
                video: None,
                bytes: 0,
                tier: None,
                subtitles,
            });
        }

        let selected = MediaLinkSelector::new(&self.transport)
            .select_working_link(&record.links, &self.config.quality_priority)?;
        let Some(total_bytes) = selected.response.content_length else {
            return Err(DownloadError::SizeUnknown { path: video_path }.into());
        };
        let resolved = self.sink.resolve(&video_path);

        self.emit(AcquisitionEvent::DownloadStarted {
            label: task.label.clone(),
            path: resolved.clone(),
            tier: selected.tier,
            total_bytes,
        });

        let bytes = StreamDownloader::new(self.sink.as_ref()).write_response(
            selected.response,
            &video_path,
            |downloaded, total| {
                self.emit(AcquisitionEvent::DownloadProgress {
                    label: task.label.clone(),
                    downloaded,
                    total,
                })
            },
        )?;

        info!(task = %task.label, path = %resolved.display(), bytes, tier = %selected.tier, "video stored");
        self.emit(AcquisitionEvent::DownloadFinished {
            label: task.label.clone(),
            path: resolved.clone(),
            bytes,
        });

        Ok(MediaOutcome {
            title: record.title,
            video: Some(resolved),
            bytes,
            tier: Some(selected.tier),
            subtitles,
        })
    }

    /// Subtitles are named after the video file, without its extension
    fn save_subtitles(
        &self,
        task: &AcquisitionTask,
        subtitles: &SubtitleSet,
        video_path: &Path,
        directory: &Path,
    ) -> Result<Vec<PathBuf>, AcquisitionError> {
        if self.config.subtitle_languages.is_empty() {
            return Ok(Vec::new());
        }

        let media_title = video_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let paths = SubtitleExtractor::new(self.decryptor.as_ref()).save_all(
            subtitles,
            &self.config.subtitle_languages,
            &media_title,
            directory,
            self.sink.as_ref(),
        )?;

        for path in &paths {
            self.emit(AcquisitionEvent::SubtitleSaved {
                label: task.label.clone(),
                path: path.clone(),
            });
        }
        Ok(paths)
    }

    fn emit(&self, event: AcquisitionEvent) {
        (self.events)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Season;
    use crate::gate::TaskOutcome;
    use crate::sink::testing::MemorySink;
    use crate::transport::testing::ScriptedTransport;
    use crate::transport::{HttpResponse, TransportError};
    use std::sync::Mutex;

    /// Scripted transport that can refuse isolation or drop `Content-Length`
    #[derive(Clone)]
    struct Degraded {
        inner: ScriptedTransport,
        refuse_isolation: bool,
        unsized_url: Option<String>,
    }

    impl Transport for Degraded {
        fn get(&self, url: &str, identity: Option<&str>) -> Result<HttpResponse, TransportError> {
            let mut response = self.inner.get(url, identity)?;
            if self.unsized_url.as_deref() == Some(url) {
                response.content_length = None;
            }
            Ok(response)
        }

        fn isolated(&self) -> Result<Self, TransportError> {
            if self.refuse_isolation {
                return Err(TransportError::ClientBuild("no sockets left".to_string()));
            }
            Ok(self.clone())
        }
    }

    fn recorded_events<T: Transport>(
        acquirer: Acquirer<T>,
    ) -> (Acquirer<T>, Arc<Mutex<Vec<AcquisitionEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let acquirer =
            acquirer.with_event_handler(move |event| sink.lock().unwrap().push(event));
        (acquirer, events)
    }

    const SERIES_BODY: &str = r#"{"resObj": {"_id": "Death Note", "seasons": [
        {"number": "1", "episodes": ["ep1", "ep2"]}
    ]}}"#;

    fn test_config() -> AcquisitionConfig {
        AcquisitionConfig {
            base_url: "https://animelon.test/".to_string(),
            max_concurrent: 2,
            max_tries: 3,
            sleep_time: Duration::ZERO,
            retry_sleep: Duration::ZERO,
            ..AcquisitionConfig::default()
        }
    }

    fn media_body(title: &str, cdn_url: &str) -> String {
        format!(
            r#"{{"resObj": {{
                "title": "{title}",
                "video": {{"videoURLsData": {{
                    "Agent/1=+(dot)+=0": {{"videoURLs": {{"ozez": "{cdn_url}"}}}}
                }}}},
                "subtitles": [{{"content": {{"englishSub": "1\n00:00:01,000 --> 00:00:02,000\nHi"}}}}]
            }}}}"#
        )
    }

    fn media_url(transport: &ScriptedTransport, id: &str) -> String {
        CatalogResolver::from_config(transport, &test_config()).media_api_url(&MediaRef::new(id))
    }

    fn series_url(transport: &ScriptedTransport, slug: &str) -> String {
        CatalogResolver::from_config(transport, &test_config()).series_api_url(slug)
    }

    fn acquirer(
        config: AcquisitionConfig,
        transport: &ScriptedTransport,
        sink: &MemorySink,
    ) -> Acquirer<ScriptedTransport> {
        Acquirer::new(config, transport.clone(), Arc::new(sink.clone()))
    }

    fn record(seasons: &[(u32, &[&str])]) -> CatalogRecord {
        CatalogRecord {
            title: "Death Note".to_string(),
            seasons: seasons
                .iter()
                .map(|(number, episodes)| Season {
                    number: *number,
                    episodes: episodes.iter().map(|id| MediaRef::new(*id)).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_plan_series_names_every_episode() {
        let tasks = plan_series(&record(&[(1, &["a", "b"])]), &EpisodeSelection::default());

        assert_eq!(
            tasks,
            vec![
                AcquisitionTask {
                    media: MediaRef::new("a"),
                    output: Some(PathBuf::from("Death Note/S01/Death Note S1E1.mp4")),
                    save_subtitles: true,
                    label: "Death Note S1E1".to_string(),
                },
                AcquisitionTask {
                    media: MediaRef::new("b"),
                    output: Some(PathBuf::from("Death Note/S01/Death Note S1E2.mp4")),
                    save_subtitles: true,
                    label: "Death Note S1E2".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_plan_series_honours_episode_filter() {
        let selection = EpisodeSelection {
            seasons: None,
            episodes: Some(HashMap::from([(1, vec![2])])),
        };

        let tasks = plan_series(&record(&[(1, &["a", "b"])]), &selection);

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].media, MediaRef::new("b"));
        assert_eq!(tasks[0].label, "Death Note S1E2");
    }

    #[test]
    fn test_plan_series_season_filter_and_missing_episode_key() {
        let selection = EpisodeSelection {
            seasons: Some(vec![2, 3]),
            episodes: Some(HashMap::from([(3, vec![1])])),
        };

        let tasks = plan_series(
            &record(&[(1, &["a"]), (2, &["b", "c"]), (3, &["d", "e"])]),
            &selection,
        );

        let labels: Vec<&str> = tasks.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, ["Death Note S2E1", "Death Note S2E2", "Death Note S3E1"]);
    }

    #[test]
    fn test_series_locator_downloads_every_episode() {
        let transport = ScriptedTransport::new();
        transport.respond(&series_url(&transport, "Death Note"), 200, SERIES_BODY);
        for id in ["ep1", "ep2"] {
            let cdn = format!("https://cdn.test/{id}");
            transport.respond(&media_url(&transport, id), 200, media_body(id, &cdn));
            transport.respond_to(&cdn, "Agent/1.0", 200, format!("video {id}"));
        }
        let sink = MemorySink::new();

        let reports = acquirer(test_config(), &transport, &sink).acquire_locators(
            &["https://animelon.com/series/Death%20Note".to_string()],
            &EpisodeSelection::default(),
        );

        assert_eq!(reports.len(), 1);
        let LocatorOutcome::Scheduled { tasks, unlaunched } = &reports[0].outcome else {
            panic!("series was not scheduled: {:?}", reports[0].outcome);
        };
        assert!(unlaunched.is_empty());
        assert_eq!(reports[0].outcome.failure_count(), 0);
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(TaskReport::succeeded));
        assert_eq!(
            sink.file("Death Note/S01/Death Note S1E1.mp4").unwrap(),
            b"video ep1"
        );
        assert_eq!(
            sink.file("Death Note/S01/Death Note S1E2.mp4").unwrap(),
            b"video ep2"
        );
        assert!(sink.file("Death Note/S01/en_Death Note S1E2.srt").is_some());
    }

    #[test]
    fn test_single_video_is_named_after_its_title() {
        let transport = ScriptedTransport::new();
        transport.respond(
            &media_url(&transport, "abc123"),
            200,
            media_body("Lone Episode", "https://cdn.test/lone"),
        );
        transport.respond_to("https://cdn.test/lone", "Agent/1.0", 200, "payload");
        let sink = MemorySink::new();

        let acquirer = acquirer(test_config(), &transport, &sink);
        acquirer.acquire_media(&MediaRef::new("abc123")).unwrap();
        let reports = acquirer.drain();

        let TaskOutcome::Succeeded(outcome) = &reports[0].outcome else {
            panic!("task failed: {:?}", reports[0].outcome);
        };
        assert_eq!(outcome.video, Some(PathBuf::from("Lone Episode.mp4")));
        assert_eq!(outcome.bytes, 7);
        assert_eq!(outcome.tier, Some(QualityTier::Ozez));
        assert_eq!(outcome.subtitles, vec![PathBuf::from("en_Lone Episode.srt")]);
        assert_eq!(sink.file("Lone Episode.mp4").unwrap(), b"payload");
    }

    #[test]
    fn test_subtitles_only_skips_the_video() {
        let transport = ScriptedTransport::new();
        transport.respond(
            &media_url(&transport, "abc123"),
            200,
            media_body("Lone Episode", "https://cdn.test/lone"),
        );
        let sink = MemorySink::new();
        let config = AcquisitionConfig {
            subtitles_only: true,
            ..test_config()
        };

        let acquirer = acquirer(config, &transport, &sink);
        acquirer.acquire_media(&MediaRef::new("abc123")).unwrap();
        let reports = acquirer.drain();

        assert!(reports[0].succeeded());
        assert_eq!(sink.paths(), vec![PathBuf::from("en_Lone Episode.srt")]);
        assert_eq!(transport.call_count("https://cdn.test/lone"), 0);
    }

    #[test]
    fn test_missing_link_is_retried_then_fails() {
        let transport = ScriptedTransport::new();
        let url = media_url(&transport, "abc123");
        transport.respond(&url, 200, media_body("Dead Link", "https://cdn.test/gone"));
        let sink = MemorySink::new();
        let events = Arc::new(Mutex::new(Vec::new()));

        let acquirer = {
            let events = Arc::clone(&events);
            acquirer(test_config(), &transport, &sink).with_event_handler(move |event| {
                if let AcquisitionEvent::RetryingMedia { attempt, .. } = event {
                    events.lock().unwrap().push(attempt);
                }
            })
        };
        acquirer.acquire_media(&MediaRef::new("abc123")).unwrap();
        let reports = acquirer.drain();

        assert!(matches!(
            reports[0].outcome,
            TaskOutcome::Failed(AcquisitionError::Link(_))
        ));
        assert_eq!(transport.call_count(&url), 3);
        assert_eq!(*events.lock().unwrap(), vec![1, 2]);
        // Written on the first attempt only
        assert_eq!(sink.paths(), vec![PathBuf::from("en_Dead Link.srt")]);
    }

    #[test]
    fn test_malformed_locator_starts_nothing() {
        let transport = ScriptedTransport::new();
        let sink = MemorySink::new();

        let reports = acquirer(test_config(), &transport, &sink).acquire_locators(
            &[
                "not a url".to_string(),
                "https://animelon.com/user/someone".to_string(),
            ],
            &EpisodeSelection::default(),
        );

        assert!(matches!(
            reports[0].outcome,
            LocatorOutcome::Rejected(LocatorError::Malformed(_))
        ));
        assert!(matches!(
            reports[1].outcome,
            LocatorOutcome::Rejected(LocatorError::UnknownKind { .. })
        ));
        assert!(transport.calls().is_empty());
        assert!(sink.paths().is_empty());
    }

    #[test]
    fn test_unresolvable_series_is_reported() {
        let transport = ScriptedTransport::new();
        let sink = MemorySink::new();

        let reports = acquirer(test_config(), &transport, &sink).acquire_locators(
            &["https://animelon.com/series/Nothing".to_string()],
            &EpisodeSelection::default(),
        );

        assert!(matches!(
            reports[0].outcome,
            LocatorOutcome::Failed(AcquisitionError::Catalog(_))
        ));
    }

    #[test]
    fn test_tasks_that_cannot_start_are_reported() {
        let scripted = ScriptedTransport::new();
        scripted.respond(&series_url(&scripted, "Death Note"), 200, SERIES_BODY);
        let transport = Degraded {
            inner: scripted,
            refuse_isolation: true,
            unsized_url: None,
        };
        let sink = MemorySink::new();

        let reports = Acquirer::new(test_config(), transport, Arc::new(sink.clone()))
            .acquire_locators(
                &["https://animelon.com/series/Death%20Note".to_string()],
                &EpisodeSelection::default(),
            );

        let LocatorOutcome::Scheduled { tasks, unlaunched } = &reports[0].outcome else {
            panic!("series was not scheduled: {:?}", reports[0].outcome);
        };
        assert!(tasks.is_empty());
        let labels: Vec<&str> = unlaunched.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, ["Death Note S1E1", "Death Note S1E2"]);
        assert!(matches!(
            unlaunched[0].error,
            AcquisitionError::Transport(TransportError::ClientBuild(_))
        ));
        assert_eq!(reports[0].outcome.failure_count(), 2);
        assert!(sink.paths().is_empty());
    }

    #[test]
    fn test_task_without_subtitle_flag_writes_only_the_video() {
        let transport = ScriptedTransport::new();
        transport.respond(
            &media_url(&transport, "abc123"),
            200,
            media_body("Lone Episode", "https://cdn.test/lone"),
        );
        transport.respond_to("https://cdn.test/lone", "Agent/1.0", 200, "payload");
        let sink = MemorySink::new();

        let acquirer = acquirer(test_config(), &transport, &sink);
        acquirer
            .schedule(AcquisitionTask::single(MediaRef::new("abc123")).with_subtitles(false))
            .unwrap();
        let reports = acquirer.drain();

        let TaskOutcome::Succeeded(outcome) = &reports[0].outcome else {
            panic!("task failed: {:?}", reports[0].outcome);
        };
        assert!(outcome.subtitles.is_empty());
        assert_eq!(sink.paths(), vec![PathBuf::from("Lone Episode.mp4")]);
    }

    #[test]
    fn test_unknown_size_fails_before_download_starts() {
        let scripted = ScriptedTransport::new();
        scripted.respond(
            &media_url(&scripted, "abc123"),
            200,
            media_body("Lone Episode", "https://cdn.test/lone"),
        );
        scripted.respond_to("https://cdn.test/lone", "Agent/1.0", 200, "payload");
        let transport = Degraded {
            inner: scripted,
            refuse_isolation: false,
            unsized_url: Some("https://cdn.test/lone".to_string()),
        };
        let sink = MemorySink::new();
        let config = AcquisitionConfig {
            subtitle_languages: Vec::new(),
            ..test_config()
        };

        let (acquirer, events) =
            recorded_events(Acquirer::new(config, transport, Arc::new(sink.clone())));
        acquirer.acquire_media(&MediaRef::new("abc123")).unwrap();
        let reports = acquirer.drain();

        assert!(matches!(
            reports[0].outcome,
            TaskOutcome::Failed(AcquisitionError::Download(DownloadError::SizeUnknown { .. }))
        ));
        assert!(
            !events
                .lock()
                .unwrap()
                .iter()
                .any(|event| matches!(event, AcquisitionEvent::DownloadStarted { .. }))
        );
        assert!(sink.paths().is_empty());
    }

    #[test]
    fn test_retry_backoff_grows_and_saturates() {
        assert_eq!(retry_backoff(Duration::from_secs(5), 1), Duration::from_secs(5));
        assert_eq!(retry_backoff(Duration::from_secs(5), 3), Duration::from_secs(15));
        assert_eq!(retry_backoff(Duration::ZERO, 4), Duration::ZERO);
        assert_eq!(retry_backoff(Duration::MAX, 2), Duration::MAX);
    }
}
