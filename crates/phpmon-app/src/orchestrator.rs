//! Busy-state orchestrator
//!
//! Runs one multi-step operation at a time. An operation is an async task
//! built from sequential `.await?` steps; the orchestrator wraps it with the
//! busy flag, applies the follow-up [`Behaviour`]s when it succeeds and hands
//! the typed result to a completion callback.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use phpmon_core::prelude::*;

use crate::events::{EventBus, NoticeKind, StateEvent};

/// Follow-up applied after a successful operation, in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    ReloadsPhpInstallation,
    ReloadsServices,
    NotifiesObservers,
}

/// What the behaviours act on
#[trait_variant::make(BehaviourTarget: Send)]
pub trait LocalBehaviourTarget {
    async fn reload_php_installation(&self) -> Result<()>;

    async fn reload_services(&self) -> Result<()>;

    async fn notify_observers(&self);
}

/// Serialises state-changing operations
#[derive(Debug)]
pub struct Orchestrator {
    busy: AtomicBool,
    bus: EventBus,
}

/// Clears the busy flag when dropped, whichever way the operation ended
struct BusyGuard<'a> {
    orchestrator: &'a Orchestrator,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.busy.store(false, Ordering::SeqCst);
        self.orchestrator
            .bus
            .publish(StateEvent::BusyChanged { busy: false });
    }
}

impl Orchestrator {
    pub fn new(bus: EventBus) -> Self {
        Self {
            busy: AtomicBool::new(false),
            bus,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        self.bus.publish(StateEvent::BusyChanged { busy: true });
        Some(BusyGuard { orchestrator: self })
    }

    /// Run `task` unless another operation is in flight
    ///
    /// `completion` is invoked exactly once with the final result, including
    /// when the operation is rejected with [`Error::Busy`]. The busy flag is
    /// already cleared when it runs.
    pub async fn execute<T, B, F, C>(
        &self,
        name: &str,
        behaviours: &[Behaviour],
        target: &B,
        task: F,
        completion: C,
    ) -> Result<T>
    where
        B: BehaviourTarget + Sync,
        F: Future<Output = Result<T>>,
        C: FnOnce(&Result<T>),
    {
        let result = match self.try_acquire() {
            Some(guard) => {
                debug!("Starting {}", name);
                let result = match task.await {
                    Ok(value) => {
                        apply_behaviours(name, behaviours, target).await;
                        Ok(value)
                    }
                    Err(e) => Err(e),
                };
                drop(guard);
                result
            }
            None => {
                warn!("Rejected {}: another operation is in progress", name);
                self.bus.publish(StateEvent::OperationRejected {
                    operation: name.to_string(),
                });
                Err(Error::Busy)
            }
        };

        if let Err(e) = &result {
            if !matches!(e, Error::Busy) {
                error!("{} failed: {}", name, e);
                self.bus.notice(
                    NoticeKind::HardFailure,
                    format!("{} failed: {}", name, e),
                    e.command().map(str::to_string),
                );
            }
        }

        completion(&result);
        result
    }

    /// [`Orchestrator::execute`] without a completion callback
    pub async fn run<T, B, F>(
        &self,
        name: &str,
        behaviours: &[Behaviour],
        target: &B,
        task: F,
    ) -> Result<T>
    where
        B: BehaviourTarget + Sync,
        F: Future<Output = Result<T>>,
    {
        self.execute(name, behaviours, target, task, |_| {}).await
    }
}

/// The operation itself already succeeded, so a failing behaviour only stops
/// the ones after it
async fn apply_behaviours<B>(name: &str, behaviours: &[Behaviour], target: &B)
where
    B: BehaviourTarget + Sync,
{
    for behaviour in behaviours {
        let outcome = match behaviour {
            Behaviour::ReloadsPhpInstallation => target.reload_php_installation().await,
            Behaviour::ReloadsServices => target.reload_services().await,
            Behaviour::NotifiesObservers => {
                target.notify_observers().await;
                Ok(())
            }
        };

        if let Err(e) = outcome {
            warn!("{}: {:?} failed after the operation: {}", name, behaviour, e);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Behaviour, BehaviourTarget, Orchestrator};
    use crate::events::{EventBus, NoticeKind, StateEvent};
    use phpmon_core::{Error, Result};
    use phpmon_env::{FakeShellOutput, TestableConfiguration};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
        fail_php: bool,
    }

    impl Recorder {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl BehaviourTarget for Recorder {
        async fn reload_php_installation(&self) -> Result<()> {
            self.calls.lock().unwrap().push("php");
            if self.fail_php {
                return Err(Error::version_not_found("8.1"));
            }
            Ok(())
        }

        async fn reload_services(&self) -> Result<()> {
            self.calls.lock().unwrap().push("services");
            Ok(())
        }

        async fn notify_observers(&self) {
            self.calls.lock().unwrap().push("notify");
        }
    }

    const ALL: &[Behaviour] = &[
        Behaviour::ReloadsPhpInstallation,
        Behaviour::ReloadsServices,
        Behaviour::NotifiesObservers,
    ];

    #[tokio::test]
    async fn test_success_applies_behaviours_in_order() {
        let orchestrator = Orchestrator::new(EventBus::default());
        let target = Recorder::default();
        let completions = AtomicUsize::new(0);

        let result = orchestrator
            .execute("switch", ALL, &target, async { Ok(42) }, |r| {
                assert!(matches!(r, Ok(42)));
                completions.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(target.calls(), vec!["php", "services", "notify"]);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_failure_clears_flag_and_completes_once() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let orchestrator = Orchestrator::new(bus);
        let target = Recorder::default();
        let completions = AtomicUsize::new(0);

        let result: Result<()> = orchestrator
            .execute(
                "switch",
                ALL,
                &target,
                async { Err(Error::command_failed("brew link php", "Error: conflict")) },
                |r| {
                    assert!(r.is_err());
                    completions.fetch_add(1, Ordering::SeqCst);
                },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert!(!orchestrator.is_busy());
        assert!(target.calls().is_empty());

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events[0], StateEvent::BusyChanged { busy: true }));
        assert!(matches!(events[1], StateEvent::BusyChanged { busy: false }));
        match &events[2] {
            StateEvent::Notice(notice) => {
                assert_eq!(notice.kind, NoticeKind::HardFailure);
                assert_eq!(notice.command.as_deref(), Some("brew link php"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failing_middle_step_stops_sequence() {
        let unlink = "/opt/homebrew/bin/brew unlink php@8.1";
        let link = "/opt/homebrew/bin/brew link php --overwrite --force";
        let restart = "sudo /opt/homebrew/bin/brew services restart nginx";
        let t = TestableConfiguration::empty()
            .with_shell(unlink, FakeShellOutput::instant("Unlinking php@8.1... 0 symlinks removed."))
            .with_shell(link, FakeShellOutput::failure("Error: Could not symlink bin/php"))
            .with_shell(restart, FakeShellOutput::instant("==> Successfully restarted `nginx`"))
            .into_environment();
        let orchestrator = Orchestrator::new(EventBus::default());
        let target = Recorder::default();
        let completions = AtomicUsize::new(0);
        let shell = t.env.shell.clone();

        let result = orchestrator
            .execute(
                "switch",
                ALL,
                &target,
                async {
                    shell.run_checked(unlink).await?;
                    shell.run_checked(link).await?;
                    shell.run_checked(restart).await?;
                    Ok::<(), Error>(())
                },
                |r| {
                    assert_eq!(r.as_ref().unwrap_err().command(), Some(link));
                    completions.fetch_add(1, Ordering::SeqCst);
                },
            )
            .await;

        assert_eq!(result.unwrap_err().command(), Some(link));
        assert_eq!(t.shell.history(), vec![unlink.to_string(), link.to_string()]);
        assert_eq!(t.shell.count(restart), 0);
        assert!(target.calls().is_empty());
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_rejects_while_busy() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let orchestrator = Orchestrator::new(bus);
        let target = Recorder::default();
        let (tx, release) = tokio::sync::oneshot::channel::<()>();
        let rejected = AtomicUsize::new(0);

        let first = orchestrator.run("first", &[], &target, async {
            release.await.ok();
            Ok(1)
        });
        let second = async {
            let result = orchestrator
                .execute("second", &[], &target, async { Ok(2) }, |r| {
                    assert!(matches!(r, Err(Error::Busy)));
                    rejected.fetch_add(1, Ordering::SeqCst);
                })
                .await;
            tx.send(()).ok();
            result
        };

        let (first, second) = tokio::join!(first, second);
        assert_eq!(first.unwrap(), 1);
        assert!(matches!(second, Err(Error::Busy)));
        assert_eq!(rejected.load(Ordering::SeqCst), 1);
        assert!(!orchestrator.is_busy());

        let mut saw_rejection = false;
        while let Ok(event) = rx.try_recv() {
            if let StateEvent::OperationRejected { operation } = event {
                assert_eq!(operation, "second");
                saw_rejection = true;
            }
        }
        assert!(saw_rejection);
    }

    #[tokio::test]
    async fn test_behaviour_failure_keeps_result() {
        let orchestrator = Orchestrator::new(EventBus::default());
        let target = Recorder {
            fail_php: true,
            ..Default::default()
        };

        let result = orchestrator.run("switch", ALL, &target, async { Ok("done") }).await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(target.calls(), vec!["php"]);
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_guard_released_for_next_operation() {
        let orchestrator = Orchestrator::new(EventBus::default());
        let target = Recorder::default();
        let _: Result<()> = orchestrator
            .run("first", &[], &target, async {
                Err(Error::service_not_found("mysql"))
            })
            .await;
        let second = orchestrator.run("second", &[], &target, async { Ok(2) }).await;
        assert_eq!(second.unwrap(), 2);
    }
}
