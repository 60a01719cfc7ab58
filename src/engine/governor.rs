//! DV-003: Timeout governor — wall-clock deadline around one execution.
//!
//! The attempt runs on a dedicated worker thread while the caller waits on a
//! channel with a timeout. On expiry the shared cancellation token is set, the
//! worker gets a bounded grace period, and is then detached with its output
//! discarded. Where no worker can be spawned the attempt runs inline.

use crate::core::types::{Diagnostic, DiagnosticKind, ExecutionPolicy, Relation};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Stack reserved for each execution worker.
const WORKER_STACK_BYTES: usize = 16 * 1024 * 1024;

/// Cooperative cancellation flag shared between the governor and one worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Returns true only for the call that flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Poll point for interpreters: error out once cancelled.
    pub fn check(&self) -> Result<(), Diagnostic> {
        if self.is_cancelled() {
            Err(Diagnostic::new(
                DiagnosticKind::TimeoutError,
                "execution cancelled",
            ))
        } else {
            Ok(())
        }
    }
}

type Outcome = (Result<Relation, Diagnostic>, Instant);

/// Deadline enforcement for a single execution attempt.
#[derive(Debug, Clone)]
pub struct Governor {
    timeout: Option<Duration>,
    grace: Duration,
}

impl Governor {
    /// `None` disables enforcement.
    pub fn new(timeout: Option<Duration>, grace: Duration) -> Self {
        Self { timeout, grace }
    }

    pub fn from_policy(policy: &ExecutionPolicy) -> Self {
        Self::new(policy.timeout(), policy.grace())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `task` under the deadline.
    pub fn run<F>(&self, task: F) -> Result<Relation, Diagnostic>
    where
        F: FnOnce(&CancelToken) -> Result<Relation, Diagnostic> + Send + 'static,
    {
        let token = CancelToken::new();
        let Some(limit) = self.timeout else {
            return run_guarded(task, &token);
        };
        if cfg!(target_family = "wasm") {
            eprintln!("WARN: no worker threads on this target; running without a time limit");
            return run_guarded(task, &token);
        }

        let slot = Arc::new(Mutex::new(Some(task)));
        let (tx, rx) = mpsc::channel::<Outcome>();
        let worker_slot = Arc::clone(&slot);
        let worker_token = token.clone();

        let spawned = thread::Builder::new()
            .name("dualverify-exec".to_string())
            .stack_size(WORKER_STACK_BYTES)
            .spawn(move || {
                let task = worker_slot.lock().ok().and_then(|mut guard| guard.take());
                if let Some(task) = task {
                    let result = run_guarded(task, &worker_token);
                    // Receiver may already be gone after a timeout.
                    let _ = tx.send((result, Instant::now()));
                }
            });

        if let Err(e) = spawned {
            eprintln!(
                "WARN: cannot spawn execution worker ({}); running without a time limit",
                e
            );
            let task = slot
                .lock()
                .map_err(|_| Diagnostic::runtime("execution task lock poisoned"))?
                .take();
            return match task {
                Some(task) => run_guarded(task, &token),
                None => Err(Diagnostic::runtime("execution task already consumed")),
            };
        }

        let expiry = Instant::now() + limit;
        match rx.recv_timeout(limit) {
            Ok((result, _)) => result,
            Err(RecvTimeoutError::Disconnected) => Err(Diagnostic::runtime(
                "execution worker exited without producing a result",
            )),
            Err(RecvTimeoutError::Timeout) => {
                token.cancel();
                match rx.recv_timeout(self.grace) {
                    // Finished before the deadline but was delivered late.
                    Ok((result, finished)) if finished <= expiry => result,
                    _ => Err(timeout_diagnostic(limit)),
                }
            }
        }
    }
}

fn timeout_diagnostic(limit: Duration) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::TimeoutError,
        format!(
            "execution exceeded {}s time limit",
            limit.as_secs_f64()
        ),
    )
}

/// Run a task on the current thread, turning a panic into `RuntimeError`.
fn run_guarded<F>(task: F, token: &CancelToken) -> Result<Relation, Diagnostic>
where
    F: FnOnce(&CancelToken) -> Result<Relation, Diagnostic>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| task(token))) {
        Ok(result) => result,
        Err(payload) => Err(Diagnostic::runtime(format!(
            "execution aborted: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Value;

    fn one() -> Result<Relation, Diagnostic> {
        Relation::new(vec!["x".into()], vec![vec![Value::Integer(1)]]).map_err(Diagnostic::runtime)
    }

    fn governor(ms: u64) -> Governor {
        Governor::new(Some(Duration::from_millis(ms)), Duration::from_millis(50))
    }

    #[test]
    fn test_dv003_fast_task_returns_output() {
        let out = governor(2000).run(|_| one()).unwrap();
        assert_eq!(out.shape(), (1, 1));
    }

    #[test]
    fn test_dv003_cooperative_loop_times_out() {
        let start = Instant::now();
        let err = governor(100)
            .run(|token| loop {
                token.check()?;
                thread::sleep(Duration::from_millis(1));
            })
            .unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::TimeoutError);
        assert!(err.message.contains("time limit"));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_dv003_uncooperative_worker_is_detached() {
        let start = Instant::now();
        let err = Governor::new(Some(Duration::from_millis(50)), Duration::from_millis(10))
            .run(|_| {
                thread::sleep(Duration::from_millis(400));
                one()
            })
            .unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::TimeoutError);
        assert!(start.elapsed() < Duration::from_millis(350));
    }

    #[test]
    fn test_dv003_early_diagnostic_wins() {
        let err = governor(2000)
            .run(|_| Err(Diagnostic::name("name 'df' is not defined")))
            .unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::NameError);
    }

    #[test]
    fn test_dv003_panic_becomes_runtime_error() {
        let err = governor(2000)
            .run(|_| -> Result<Relation, Diagnostic> { panic!("boom") })
            .unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::RuntimeError);
        assert!(err.message.contains("boom"));
    }

    #[test]
    fn test_dv003_disabled_timeout_runs_inline() {
        let caller = thread::current().id();
        let g = Governor::new(None, Duration::ZERO);
        let out = g
            .run(move |_| {
                assert_eq!(thread::current().id(), caller);
                one()
            })
            .unwrap();
        assert_eq!(out.row_count(), 1);
    }

    #[test]
    fn test_dv003_cancel_is_idempotent() {
        let t = CancelToken::new();
        assert!(t.check().is_ok());
        assert!(t.cancel());
        assert!(!t.cancel());
        assert!(t.is_cancelled());
        assert_eq!(t.check().unwrap_err().kind, DiagnosticKind::TimeoutError);
    }

    #[test]
    fn test_dv003_no_leakage_after_timeout() {
        let g = governor(50);
        let err = g
            .run(|token| loop {
                token.check()?;
                thread::sleep(Duration::from_millis(1));
            })
            .unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::TimeoutError);
        let out = g.run(|token| {
            token.check()?;
            one()
        });
        assert!(out.is_ok());
    }

    #[test]
    fn test_dv003_from_policy() {
        let g = Governor::from_policy(&ExecutionPolicy::default());
        assert_eq!(g.timeout(), Some(Duration::from_secs(5)));
    }
}
