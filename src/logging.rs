use std::{
    fs::OpenOptions,
    io::Write,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        mpsc::{self, Receiver, Sender},
        OnceLock,
    },
    thread,
    time::Duration,
};

use crate::utility::sentinel_root_dir;

/* =========================
   GLOBAL STATE
   ========================= */

static ENABLED: AtomicBool = AtomicBool::new(false);
static MIN_LEVEL: AtomicU8 = AtomicU8::new(LEVEL_WARN);
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_TX: OnceLock<Sender<LogMsg>> = OnceLock::new();

const LEVEL_ERROR: u8 = 0;
const LEVEL_WARN: u8 = 1;
const LEVEL_INFO: u8 = 2;
const LEVEL_DEBUG: u8 = 3;

enum LogMsg {
    Line(String),
    /// Acknowledged once every earlier line has been written.
    Flush(Sender<()>),
}

/* =========================
   PUBLIC API
   ========================= */

pub fn init(debug: bool, level: &str) {
    if LOG_TX.get().is_some() {
        return;
    }

    ENABLED.store(debug, Ordering::Relaxed);
    set_level(level);

    let path = log_path().clone();
    let (tx, rx) = mpsc::channel::<LogMsg>();
    if LOG_TX.set(tx).is_err() {
        return;
    }

    thread::spawn(move || {
        let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
            return;
        };
        run_writer(rx, file);
    });
}

/// Blocks until everything logged so far is on disk, or `timeout` passes.
/// Call before the process exits.
pub fn flush(timeout: Duration) -> bool {
    let Some(tx) = LOG_TX.get() else {
        return true;
    };
    let (ack_tx, ack_rx) = mpsc::channel();
    if tx.send(LogMsg::Flush(ack_tx)).is_err() {
        return false;
    }
    ack_rx.recv_timeout(timeout).is_ok()
}

/// Debug mode lets every level through regardless of the configured minimum.
pub fn set_debug(debug: bool) {
    ENABLED.store(debug, Ordering::Relaxed);
}

pub fn set_level(level: &str) {
    MIN_LEVEL.store(parse_level(level), Ordering::Relaxed);
}

#[inline]
pub fn should_log(level: &str) -> bool {
    if ENABLED.load(Ordering::Relaxed) {
        return true;
    }
    parse_level(level) <= MIN_LEVEL.load(Ordering::Relaxed)
}

/* =========================
   INTERNAL
   ========================= */

fn run_writer<W: Write>(rx: Receiver<LogMsg>, mut out: W) -> W {
    while let Ok(msg) = rx.recv() {
        match msg {
            LogMsg::Line(line) => {
                let _ = writeln!(out, "{line}");
                let _ = out.flush();
            }
            LogMsg::Flush(ack) => {
                let _ = out.flush();
                let _ = ack.send(());
            }
        }
    }
    out
}

fn parse_level(level: &str) -> u8 {
    match level.trim().to_ascii_lowercase().as_str() {
        "error" => LEVEL_ERROR,
        "info" => LEVEL_INFO,
        "debug" | "trace" => LEVEL_DEBUG,
        _ => LEVEL_WARN,
    }
}

#[inline]
pub fn enqueue(level: &str, msg: String) {
    if let Some(tx) = LOG_TX.get() {
        let ts = timestamp();
        let _ = tx.send(LogMsg::Line(format!("{ts} [{level}] {msg}")));
    }
}

fn timestamp() -> String {
    let now = chrono::Local::now();
    now.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/* =========================
   MACROS
   ========================= */

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        if $crate::logging::should_log("DEBUG") {
            $crate::logging::enqueue(
                "DEBUG",
                format!($($arg)*)
            );
        }
    }};
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if $crate::logging::should_log("INFO") {
            $crate::logging::enqueue(
                "INFO",
                format!($($arg)*)
            );
        }
    }};
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        if $crate::logging::should_log("WARN") {
            $crate::logging::enqueue(
                "WARN",
                format!($($arg)*)
            );
        }
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        $crate::logging::enqueue(
            "ERROR",
            format!($($arg)*)
        );
    }};
}

/* =========================
   PATH
   ========================= */

fn log_path() -> &'static PathBuf {
    LOG_PATH.get_or_init(|| sentinel_root_dir().join("sentinel.wallpaper-host.log"))
}
