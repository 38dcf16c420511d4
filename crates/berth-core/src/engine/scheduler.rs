use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::oneshot;
use tracing::{debug, error, trace};

use crate::domain::errors::BerthError;
use crate::domain::op::{Op, OpMode};

use super::completion::Completion;

type ProbePredicate = Box<dyn Fn(&Op) -> bool + Send + Sync>;
type ProbeCallback = Box<dyn Fn(&Op, &Result<(), BerthError>) + Send + Sync>;

struct Probe {
    predicate: ProbePredicate,
    callback: ProbeCallback,
}

/// Routes lifecycle work. Close operations run synchronously on the
/// calling thread; open operations are deferred to the runtime. Once the
/// scheduler is marked closing, newly submitted opens are skipped and
/// resolve as no-ops.
pub struct Scheduler {
    closing: AtomicBool,
    probes: Mutex<Vec<Probe>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            closing: AtomicBool::new(false),
            probes: Mutex::new(Vec::new()),
        }
    }

    pub fn mark_closing(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Registers a test/observation hook. Every submission whose op the
    /// predicate accepts is reported together with its outcome.
    pub fn add_probe<P, C>(&self, predicate: P, callback: C)
    where
        P: Fn(&Op) -> bool + Send + Sync + 'static,
        C: Fn(&Op, &Result<(), BerthError>) + Send + Sync + 'static,
    {
        let mut probes = self.probes.lock().unwrap_or_else(|e| e.into_inner());
        probes.push(Probe {
            predicate: Box::new(predicate),
            callback: Box::new(callback),
        });
    }

    fn notify(&self, op: &Op, result: &Result<(), BerthError>) {
        let probes = self.probes.lock().unwrap_or_else(|e| e.into_inner());
        for probe in probes.iter() {
            if (probe.predicate)(op) {
                (probe.callback)(op, result);
            }
        }
    }

    pub fn submit<F>(self: &Arc<Self>, op: Op, task: F) -> Completion
    where
        F: FnOnce() -> Result<(), BerthError> + Send + 'static,
    {
        match op.mode {
            OpMode::Close => {
                debug!(op = %op, "running close operation");
                let result = task();
                if let Err(err) = &result {
                    error!(op = %op, error = %err, "close operation failed");
                }
                self.notify(&op, &result);
                Completion::resolved(result)
            }
            OpMode::Open if self.is_closing() => {
                trace!(op = %op, "skipping open operation, scheduler is closing");
                let result = Ok(());
                self.notify(&op, &result);
                Completion::resolved(result)
            }
            OpMode::Open => {
                debug!(op = %op, "deferring open operation");
                let (tx, rx) = oneshot::channel();
                let scheduler = Arc::clone(self);
                tokio::spawn(async move {
                    let result = task();
                    if let Err(err) = &result {
                        error!(op = %op, error = %err, "open operation failed");
                    }
                    scheduler.notify(&op, &result);
                    let _ = tx.send(result);
                });
                Completion::pending(rx)
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use crate::domain::op::OpKind;

    use super::*;

    #[tokio::test]
    async fn close_runs_on_the_calling_thread() {
        let scheduler = Arc::new(Scheduler::new());
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let completion = scheduler.submit(Op::of(OpMode::Close, OpKind::Container, "m"), move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        // Resolved before we ever await.
        assert!(ran.load(Ordering::SeqCst));
        assert!(completion.now().is_some());
    }

    #[tokio::test]
    async fn open_is_deferred_and_resolves() {
        let scheduler = Arc::new(Scheduler::new());
        let completion = scheduler.submit(
            Op::of(OpMode::Open, OpKind::ContainerInit, "m"),
            || Ok(()),
        );
        assert!(completion.wait().await.is_ok());
    }

    #[tokio::test]
    async fn open_after_mark_closing_is_skipped() {
        let scheduler = Arc::new(Scheduler::new());
        scheduler.mark_closing();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let completion = scheduler.submit(
            Op::of(OpMode::Open, OpKind::Publication, "m"),
            move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
        );
        assert!(completion.wait().await.is_ok());
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn probes_observe_matching_submissions() {
        let scheduler = Arc::new(Scheduler::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        scheduler.add_probe(
            |op| op.kind == OpKind::Container,
            move |_, result| {
                assert!(result.is_ok());
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        scheduler
            .submit(Op::of(OpMode::Close, OpKind::Container, "m"), || Ok(()))
            .wait()
            .await
            .unwrap();
        scheduler
            .submit(Op::of(OpMode::Close, OpKind::Publication, "m"), || Ok(()))
            .wait()
            .await
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn probes_see_failures() {
        let scheduler = Arc::new(Scheduler::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        scheduler.add_probe(
            |_| true,
            move |_, result| {
                if result.is_err() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );
        let completion = scheduler.submit(
            Op::of(OpMode::Open, OpKind::ContainerBootstrap, "m"),
            || Err(BerthError::Other("boom".into())),
        );
        assert!(completion.wait().await.is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
