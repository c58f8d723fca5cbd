// ~/src/placeholder.rs
//
// Static stand-in for the active wallpaper, installed as the OS desktop
// background so the desktop still looks right while the host is not running.

use std::{
    io::Cursor,
    path::{Path, PathBuf},
    rc::Rc,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread,
    time::Duration,
};

use image::{ImageFormat, RgbaImage};
use twox_hash::XxHash64;

use crate::{
    data_loaders::project::{ProjectKind, WallpaperProject},
    errors::{HostError, Result},
    error, info, warn,
    state_store::{write_atomic, DesktopBackground, PLACEHOLDER_MARKER},
    DEBUG_NAME,
};

pub const PLACEHOLDER_EXTENSION: &str = "tiff";

/// Extracts a single still frame from a video file.
pub trait FrameDecoder: Send + Sync {
    fn decode_frame(&self, asset: &Path, at: Duration) -> Result<RgbaImage>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationToken(u64);

struct Completion {
    token: GenerationToken,
    result: Result<PathBuf>,
}

struct DecodeJob {
    token: GenerationToken,
    asset: PathBuf,
    output: PathBuf,
    frame_time: Duration,
}

/// `staticWP_<xxh64 of the directory path>.tiff`; stable across runs.
pub fn placeholder_file_name(wallpaper_dir: &Path) -> String {
    let hash = XxHash64::oneshot(0, wallpaper_dir.to_string_lossy().as_bytes());
    format!("{PLACEHOLDER_MARKER}_{hash:016x}.{PLACEHOLDER_EXTENSION}")
}

pub fn placeholder_path(caches_dir: &Path, wallpaper_dir: &Path) -> PathBuf {
    caches_dir.join(placeholder_file_name(wallpaper_dir))
}

pub struct PlaceholderGenerator {
    caches_dir: PathBuf,
    decoder: Arc<dyn FrameDecoder>,
    background: Rc<dyn DesktopBackground>,
    frame_time: Duration,
    enabled: bool,
    next_token: u64,
    current: Option<GenerationToken>,
    in_flight: usize,
    jobs: Option<Sender<DecodeJob>>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl PlaceholderGenerator {
    pub fn new(
        caches_dir: impl Into<PathBuf>,
        decoder: Arc<dyn FrameDecoder>,
        background: Rc<dyn DesktopBackground>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            caches_dir: caches_dir.into(),
            decoder,
            background,
            frame_time: Duration::from_secs(1),
            enabled: true,
            next_token: 0,
            current: None,
            in_flight: 0,
            jobs: None,
            tx,
            rx,
        }
    }

    pub fn set_frame_time(&mut self, frame_time: Duration) {
        self.frame_time = frame_time;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// The single decode thread, started on first use.
    fn worker(&mut self) -> Option<&Sender<DecodeJob>> {
        if self.jobs.is_none() {
            let (jobs_tx, jobs_rx) = mpsc::channel();
            let decoder = Arc::clone(&self.decoder);
            let completions = self.tx.clone();

            let spawned = thread::Builder::new()
                .name("placeholder-decode".to_string())
                .spawn(move || run_worker(decoder.as_ref(), jobs_rx, completions));

            match spawned {
                Ok(_) => self.jobs = Some(jobs_tx),
                Err(e) => {
                    error!("[{}][PLACEHOLDER] Failed to start decode thread: {}", DEBUG_NAME, e);
                    return None;
                }
            }
        }
        self.jobs.as_ref()
    }

    /// Starts placeholder generation for `project` and returns at once.
    ///
    /// Any earlier generation that has not been installed yet is superseded:
    /// its completion is discarded by [`poll_completions`](Self::poll_completions).
    pub fn generate(&mut self, project: &WallpaperProject) -> Option<GenerationToken> {
        self.current = None;

        if !self.enabled {
            info!("[{}][PLACEHOLDER] Disabled in config; skipping", DEBUG_NAME);
            return None;
        }

        if project.kind != ProjectKind::Video {
            info!(
                "[{}][PLACEHOLDER] No placeholder for '{}' wallpaper '{}'",
                DEBUG_NAME,
                project.kind.as_str(),
                project.display_name()
            );
            return None;
        }

        self.next_token += 1;
        let token = GenerationToken(self.next_token);

        let job = DecodeJob {
            token,
            asset: project.asset_path(),
            output: placeholder_path(&self.caches_dir, &project.directory),
            frame_time: self.frame_time,
        };

        info!(
            "[{}][PLACEHOLDER] Queueing frame at {:?} from '{}' -> '{}' ({} already queued)",
            DEBUG_NAME,
            job.frame_time,
            job.asset.display(),
            job.output.display(),
            self.in_flight
        );

        let queued = self.worker()?.send(job).is_ok();
        if !queued {
            error!("[{}][PLACEHOLDER] Decode thread has stopped; restarting on next request", DEBUG_NAME);
            self.jobs = None;
            return None;
        }

        self.current = Some(token);
        self.in_flight += 1;
        Some(token)
    }

    /// Delivers finished decodes on the calling (main) thread. Only the most
    /// recent generation is installed as the OS background.
    /// Returns the number of placeholders installed.
    pub fn poll_completions(&mut self) -> usize {
        let mut installed = 0;

        while let Ok(completion) = self.rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);

            if self.current != Some(completion.token) {
                info!(
                    "[{}][PLACEHOLDER] Discarding superseded generation {:?}",
                    DEBUG_NAME, completion.token
                );
                continue;
            }
            self.current = None;

            let path = match completion.result {
                Ok(path) => path,
                Err(e) => {
                    warn!("[{}][PLACEHOLDER] Generation failed: {}", DEBUG_NAME, e);
                    continue;
                }
            };

            match self.background.set(&path.to_string_lossy()) {
                Ok(()) => {
                    info!(
                        "[{}][PLACEHOLDER] Installed '{}' as desktop background",
                        DEBUG_NAME,
                        path.display()
                    );
                    installed += 1;
                }
                Err(e) => warn!(
                    "[{}][PLACEHOLDER] Failed to install '{}': {}",
                    DEBUG_NAME,
                    path.display(),
                    e
                ),
            }
        }

        installed
    }
}

/// Runs queued jobs one at a time. Jobs that were overtaken while waiting are
/// reported back without decoding; only the newest one can still be installed.
fn run_worker(decoder: &dyn FrameDecoder, jobs: Receiver<DecodeJob>, completions: Sender<Completion>) {
    while let Ok(mut job) = jobs.recv() {
        while let Ok(newer) = jobs.try_recv() {
            let skipped = Completion {
                token: job.token,
                result: Err(HostError::Decode("superseded before decoding".to_string())),
            };
            if completions.send(skipped).is_err() {
                return;
            }
            job = newer;
        }

        let result = render_placeholder(decoder, &job.asset, job.frame_time, &job.output);
        if completions.send(Completion { token: job.token, result }).is_err() {
            return;
        }
    }
}

fn render_placeholder(
    decoder: &dyn FrameDecoder,
    asset: &Path,
    at: Duration,
    output: &Path,
) -> Result<PathBuf> {
    if !asset.is_file() {
        return Err(HostError::Decode(format!("'{}' does not exist", asset.display())));
    }

    let frame = decoder.decode_frame(asset, at)?;
    let bytes = encode_tiff(&frame)?;
    write_atomic(output, &bytes)?;
    Ok(output.to_path_buf())
}

fn encode_tiff(frame: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    frame.write_to(&mut bytes, ImageFormat::Tiff)?;
    Ok(bytes.into_inner())
}
