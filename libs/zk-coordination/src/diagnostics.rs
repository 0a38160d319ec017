//! Dedicated log file for the coordination store's own diagnostics.
//!
//! Store backends log their internal warnings under
//! [`STORE_DIAGNOSTICS_TARGET`]. A [`DiagnosticsLog`] owns an append-mode file
//! and hands out a `tracing_subscriber` layer that writes those events, and
//! nothing else, into it. The layer writes through a shared sink, so closing
//! the log takes effect on a subscriber that is already installed.
//!
//! Processes that prefer a single well-known log can use [`init`] and
//! [`teardown`], which manage one process-wide `DiagnosticsLog`, together with
//! [`global_layer`].

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{Metadata, debug, error};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{DynFilterFn, LevelFilter, Targets};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

use crate::error::{CoordinationError, CoordinationResult};

/// Target under which store backends emit their internal diagnostics.
pub const STORE_DIAGNOSTICS_TARGET: &str = "zk_coordination::store";

/// Verbosity routed into the diagnostics file unless configured otherwise.
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::WARN;

#[cfg(unix)]
const LOG_FILE_MODE: u32 = 0o666;

type Sink = Arc<Mutex<Option<File>>>;

/// An open diagnostics log file.
#[derive(Debug, Clone)]
pub struct DiagnosticsLog {
    path: PathBuf,
    file: Sink,
    level: LevelFilter,
}

impl DiagnosticsLog {
    /// Open `log_dir/file_name` for appending, creating it if needed.
    pub fn open(log_dir: impl AsRef<Path>, file_name: &str) -> CoordinationResult<Self> {
        let log_dir = log_dir.as_ref();
        if log_dir.as_os_str().is_empty() || file_name.is_empty() {
            return Err(CoordinationError::param(
                "diagnostics log directory and file name must be non-empty",
            ));
        }
        let path = log_dir.join(file_name);

        let mut opts = OpenOptions::new();
        opts.create(true).append(true).read(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(LOG_FILE_MODE);
        }
        let file = opts.open(&path).map_err(|source| {
            error!(path = %path.display(), error = %source, "failed to open diagnostics log");
            CoordinationError::LogFile {
                path: path.clone(),
                source,
            }
        })?;
        debug!(path = %path.display(), "opened diagnostics log");

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(Some(file))),
            level: DEFAULT_LEVEL,
        })
    }

    /// Route events at `level` and above instead of the default.
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn is_open(&self) -> bool {
        self.file.lock().expect("diagnostics lock poisoned").is_some()
    }

    /// Flush and close the file. Later events are discarded.
    pub fn close(&self) {
        if let Some(mut file) = self.file.lock().expect("diagnostics lock poisoned").take() {
            let _ = file.flush();
        }
    }

    /// Layer writing store diagnostics at this log's level into the file.
    pub fn layer<S>(&self) -> impl Layer<S>
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        fmt::layer()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_filter(Targets::new().with_target(STORE_DIAGNOSTICS_TARGET, self.level))
    }
}

/// Writer handed to the fmt layer for each event.
#[derive(Debug)]
pub struct DiagnosticsWriter {
    file: Sink,
}

impl Write for DiagnosticsWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.lock().expect("diagnostics lock poisoned").as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.lock().expect("diagnostics lock poisoned").as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for DiagnosticsLog {
    type Writer = DiagnosticsWriter;

    fn make_writer(&'a self) -> Self::Writer {
        DiagnosticsWriter {
            file: Arc::clone(&self.file),
        }
    }
}

static GLOBAL: Mutex<Option<DiagnosticsLog>> = Mutex::new(None);

/// Open the process-wide diagnostics log at the default level, replacing
/// (and closing) any log opened by an earlier call.
pub fn init(log_dir: impl AsRef<Path>, file_name: &str) -> CoordinationResult<DiagnosticsLog> {
    Ok(install(DiagnosticsLog::open(log_dir, file_name)?))
}

/// Make `log` the process-wide diagnostics log, closing the previous one.
/// The global layer routes events at `log`'s own level.
pub fn install(log: DiagnosticsLog) -> DiagnosticsLog {
    let previous = GLOBAL
        .lock()
        .expect("diagnostics lock poisoned")
        .replace(log.clone());
    if let Some(previous) = previous {
        previous.close();
    }
    log
}

/// Close and forget the process-wide diagnostics log. Does nothing if
/// [`init`] was never called.
pub fn teardown() {
    let current = GLOBAL.lock().expect("diagnostics lock poisoned").take();
    if let Some(log) = current {
        log.close();
        debug!(path = %log.path().display(), "closed diagnostics log");
    }
}

/// The process-wide diagnostics log, if one is open.
pub fn global() -> Option<DiagnosticsLog> {
    GLOBAL.lock().expect("diagnostics lock poisoned").clone()
}

/// Writes to whichever log is current in the process-wide slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalWriter;

impl Write for GlobalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match global() {
            Some(log) => log.make_writer().write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match global() {
            Some(log) => log.make_writer().flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for GlobalWriter {
    type Writer = GlobalWriter;

    fn make_writer(&'a self) -> Self::Writer {
        *self
    }
}

/// Layer writing store diagnostics into the process-wide log, at the level of
/// whichever log is current. Installed once; follows later
/// [`init`]/[`install`]/[`teardown`] calls.
pub fn global_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    // evaluated per event, the level changes with the installed log
    let filter = DynFilterFn::new(|meta: &Metadata<'_>, _cx: &Context<'_, S>| {
        meta.target() == STORE_DIAGNOSTICS_TARGET
            && global().is_some_and(|log| *meta.level() <= log.level())
    });
    fmt::layer()
        .with_writer(GlobalWriter)
        .with_ansi(false)
        .with_filter(filter)
}
