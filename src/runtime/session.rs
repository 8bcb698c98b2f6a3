#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Per-submission state shared between the harness and the script engine.

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use rand::{SeedableRng, rngs::StdRng};
use rhai::Scope;

use super::environment::{Definition, Prelude};
use crate::{
    error::GradingError,
    grade::{TestCollection, TestFile},
    harness::ExecutionOptions,
    log::{AdmissionFilter, EventType, Log, LogEntry, shelve},
};

/// Flipped by an external watchdog to stop a running submission. The engine
/// aborts the current unit at its next progress check.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Writes grading events to a log file.
#[derive(Debug, Clone)]
pub struct LogRecorder {
    /// Log file location.
    pub path:   PathBuf,
    /// Filter applied when shelving.
    pub filter: Option<AdmissionFilter>,
}

impl LogRecorder {
    /// Appends an entry, warning instead of failing when the log cannot be
    /// written.
    pub fn record(&self, entry: &LogEntry) {
        if let Err(e) = entry.flush_to_file(&self.path) {
            tracing::warn!("Could not write to log {}: {e}", self.path.display());
        }
    }

    /// Records a check of `question` together with a shelf of `scope`. If the
    /// question already has a shelved entry, the log is compacted so that only
    /// the new entry keeps its shelf. An existing log that cannot be read is
    /// left untouched and the error returned.
    pub fn record_check(
        &self,
        question: &str,
        scope: &Scope,
        definitions: &[Definition],
        result: &TestFile,
    ) -> Result<(), GradingError> {
        let (shelf, not_shelved) = shelve(scope, definitions, self.filter.as_ref());
        if !not_shelved.is_empty() {
            tracing::debug!("Not shelved for {question}: {}", not_shelved.join(", "));
        }

        let entry = LogEntry::builder()
            .event_type(EventType::Check)
            .question(question.to_string())
            .shelf(serde_json::to_string(&shelf)?)
            .not_shelved(not_shelved)
            .results(result.clone())
            .build();

        if self.path.exists() && Log::from_file(&self.path)?.has_shelf_for(question) {
            Log::reshelve(&self.path, entry)
        } else {
            entry.flush_to_file(&self.path)
        }
    }
}

/// State for grading one submission.
#[derive(Debug)]
pub struct Session {
    /// Test files checks are run against.
    tests:        TestCollection,
    /// While set, administrative grader methods do nothing.
    headless:     AtomicBool,
    /// Imports and functions re-applied to every unit.
    prelude:      RwLock<Prelude>,
    /// Results of captured checks, in call order.
    captured:     Mutex<Vec<TestFile>>,
    /// Log writer, when logging is enabled.
    recorder:     Option<LogRecorder>,
    /// Source of all script randomness.
    rng:          Mutex<StdRng>,
    /// Output of `print` and `debug`.
    stdout:       Mutex<String>,
    /// Watchdog hook.
    cancellation: CancellationToken,
}

/// Locks a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Creates the session for one grading run.
    pub fn new(tests: TestCollection, options: &ExecutionOptions) -> Arc<Self> {
        let recorder = options.log_path.as_ref().map(|path| LogRecorder {
            path:   path.clone(),
            filter: options.admission_filter.clone(),
        });
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed as u64),
            None => StdRng::from_entropy(),
        };

        Arc::new(Self {
            tests,
            headless: AtomicBool::new(false),
            prelude: RwLock::new(Prelude::default()),
            captured: Mutex::new(Vec::new()),
            recorder,
            rng: Mutex::new(rng),
            stdout: Mutex::new(String::new()),
            cancellation: options.cancellation.clone(),
        })
    }

    /// The available test files.
    pub fn tests(&self) -> &TestCollection {
        &self.tests
    }

    /// Returns true while grading headlessly.
    pub fn is_headless(&self) -> bool {
        self.headless.load(Ordering::SeqCst)
    }

    /// Enters headless mode until the returned guard is dropped.
    pub fn headless(&self) -> HeadlessGuard<'_> {
        HeadlessGuard::new(self)
    }

    /// Shared access to the prelude.
    pub fn prelude(&self) -> RwLockReadGuard<'_, Prelude> {
        self.prelude.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access to the prelude. Must not be held while script code
    /// runs.
    pub fn prelude_mut(&self) -> RwLockWriteGuard<'_, Prelude> {
        self.prelude.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the result of a captured check.
    pub fn push_captured(&self, result: TestFile) {
        lock(&self.captured).push(result);
    }

    /// Removes and returns every captured result.
    pub fn take_captured(&self) -> Vec<TestFile> {
        std::mem::take(&mut *lock(&self.captured))
    }

    /// The log writer, if logging is enabled.
    pub fn recorder(&self) -> Option<&LogRecorder> {
        self.recorder.as_ref()
    }

    /// Restarts the random number generator from `seed`.
    pub fn reseed(&self, seed: i64) {
        *lock(&self.rng) = StdRng::seed_from_u64(seed as u64);
    }

    /// Runs `f` with the random number generator.
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        f(&mut lock(&self.rng))
    }

    /// Appends a line of script output.
    pub fn append_stdout(&self, text: &str) {
        let mut stdout = lock(&self.stdout);
        stdout.push_str(text);
        stdout.push('\n');
    }

    /// Removes and returns the script output so far.
    pub fn take_stdout(&self) -> String {
        std::mem::take(&mut *lock(&self.stdout))
    }

    /// The watchdog hook.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Keeps a session headless while alive and restores the previous mode when
/// dropped, including during unwinding.
pub struct HeadlessGuard<'a> {
    /// Guarded session.
    session:  &'a Session,
    /// Mode to restore.
    previous: bool,
}

impl<'a> HeadlessGuard<'a> {
    /// Switches `session` into headless mode.
    pub fn new(session: &'a Session) -> Self {
        let previous = session.headless.swap(true, Ordering::SeqCst);
        Self { session, previous }
    }
}

impl Drop for HeadlessGuard<'_> {
    fn drop(&mut self) {
        self.session.headless.store(self.previous, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_mode_is_restored_on_drop() {
        let session = Session::new(TestCollection::default(), &ExecutionOptions::default());
        assert!(!session.is_headless());
        {
            let _outer = session.headless();
            {
                let _inner = session.headless();
                assert!(session.is_headless());
            }
            assert!(session.is_headless());
        }
        assert!(!session.is_headless());
    }

    #[test]
    fn reseeding_repeats_the_sequence() {
        use rand::Rng;

        let session = Session::new(TestCollection::default(), &ExecutionOptions::default());
        session.reseed(7);
        let first: Vec<i64> = (0..3).map(|_| session.with_rng(|rng| rng.r#gen())).collect();
        session.reseed(7);
        let second: Vec<i64> = (0..3).map(|_| session.with_rng(|rng| rng.r#gen())).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn unreadable_logs_are_not_appended_to() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("grading.log");
        std::fs::write(&path, "not json\n").unwrap();

        let recorder = LogRecorder {
            path:   path.clone(),
            filter: None,
        };
        let mut scope = Scope::new();
        scope.push("a", 1_i64);
        let result = TestFile::new("q1", "q1.toml", Vec::new(), None, Default::default()).unwrap();

        let err = recorder.record_check("q1", &scope, &[], &result).unwrap_err();
        assert!(matches!(err, GradingError::Json(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json\n");
    }
}
