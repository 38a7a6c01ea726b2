use std::any::Any;
use std::panic;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock, PoisonError};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::race_date::RaceDate;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static CURRENT_RACE_DATE: RaceDateSlot = RaceDateSlot::new();

/// Race date the running pass is working on, shared with the panic hook.
struct RaceDateSlot(Mutex<Option<RaceDate>>);

impl RaceDateSlot {
    const fn new() -> Self {
        Self(Mutex::new(None))
    }

    /// Store `value` and hand back what was there before.
    fn replace(&self, value: Option<RaceDate>) -> Option<RaceDate> {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, value)
    }

    /// Never blocks: the panic hook may run while another thread holds the lock.
    fn peek(&self) -> Option<RaceDate> {
        self.0.try_lock().ok().and_then(|slot| *slot)
    }
}

/// Marks a race date as in progress until dropped.
#[must_use = "the race date is cleared as soon as the scope is dropped"]
pub struct RaceDateScope {
    previous: Option<RaceDate>,
}

impl Drop for RaceDateScope {
    fn drop(&mut self) {
        CURRENT_RACE_DATE.replace(self.previous);
    }
}

/// Record `race_date` as the date being processed; panic events carry it.
pub fn enter_race_date(race_date: RaceDate) -> RaceDateScope {
    RaceDateScope {
        previous: CURRENT_RACE_DATE.replace(Some(race_date)),
    }
}

pub fn current_race_date() -> Option<RaceDate> {
    CURRENT_RACE_DATE.peek()
}

fn env_flag(value: Option<String>) -> bool {
    value.is_some_and(|v| {
        let v = v.trim();
        v == "1" || v.eq_ignore_ascii_case("true")
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}

/// Log panics as `error` events tagged with the run id and the race date in
/// progress, so an aborted pass shows where numbering stopped.
///
/// `TR_LOG_INCLUDE_BACKTRACE=1` chains to the previous hook as well.
pub fn install_tracing_panic_hook(app_name: &'static str) {
    static INSTALLED: OnceLock<()> = OnceLock::new();

    INSTALLED.get_or_init(|| {
        let previous_hook = panic::take_hook();
        let chain = env_flag(std::env::var("TR_LOG_INCLUDE_BACKTRACE").ok());

        panic::set_hook(Box::new(move |info| {
            let race_date = current_race_date()
                .map(|date| date.key())
                .unwrap_or_else(|| "none".into());
            let location = info
                .location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()))
                .unwrap_or_else(|| "unknown".into());

            tracing::error!(
                application = app_name,
                run_id = crate::run_id::get(),
                %race_date,
                %location,
                panic_message = %panic_message(info.payload()),
                "renumbering pass panicked"
            );

            if chain {
                previous_hook(info);
            }
        }));
    });
}

fn log_dir() -> Option<PathBuf> {
    std::env::var_os("TR_LOG_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}

/// Daily-rotated `<dir>/<app>.log`, or `None` to stay on stdout.
fn file_writer(app_name: &'static str) -> Option<BoxMakeWriter> {
    let dir = log_dir()?;
    if let Err(err) = std::fs::create_dir_all(&dir) {
        eprintln!("cannot create log dir {}: {err}; logging to stdout", dir.display());
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, format!("{app_name}.log"));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(BoxMakeWriter::new(writer))
}

/// Install the global subscriber. `RUST_LOG` filters (default `info`);
/// `TR_LOG_DIR` switches output from stdout to a rotating file.
pub fn init_tracing_subscriber(app_name: &'static str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    let _ = match file_writer(app_name) {
        Some(writer) => subscriber.with_ansi(false).with_writer(writer).try_init(),
        None => subscriber.try_init(),
    };
}
