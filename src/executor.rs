//! Client-side fan-out over a set of locators.
//!
//! The executor takes an ordered locator list and a per-locator job factory,
//! dispatches local jobs in-process and remote jobs over the wire, and
//! delivers results in the caller's original order. One target's failure
//! never aborts or corrupts another's; every error stays attributed to the
//! locator it came from.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::backend::ContainerBackend;
use crate::dispatcher::{Dispatcher, JobHandle};
use crate::error::{CaskError, Result};
use crate::jobs::Job;
use crate::locator::Locator;
use crate::report::{CompletionReport, Reporter};
use crate::transport::Transport;

/// A failure attributed to the target it occurred on.
#[derive(Debug)]
pub struct TargetError {
    pub locator: Locator,
    pub error: CaskError,
}

impl std::fmt::Display for TargetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.locator, self.error)
    }
}

/// Result of a gather-mode fan-out: one output slot per locator, in caller
/// order, with `None` standing in for a failed target, plus the failures
/// themselves in target order.
pub struct Gathered {
    pub outputs: Vec<Option<String>>,
    pub errors: Vec<TargetError>,
}

/// In-process dispatch context for `Local` locators: the dispatcher jobs are
/// submitted to, and the readiness probe run once before any dispatch.
pub struct LocalDispatch {
    pub dispatcher: Arc<Dispatcher>,
    pub init: Arc<dyn ContainerBackend>,
}

/// Fans one job per locator out and collects the results.
pub struct Executor<F: FnMut(&Locator) -> Job> {
    on: Vec<Locator>,
    serial: F,
    local: Option<LocalDispatch>,
    transport: Transport,
}

impl<F: FnMut(&Locator) -> Job> Executor<F> {
    /// Build an executor over `on`, producing one job per locator with
    /// `serial`. The factory runs once per locator, in order.
    pub fn new(on: Vec<Locator>, serial: F) -> Result<Self> {
        Ok(Self {
            on,
            serial,
            local: None,
            transport: Transport::new()?,
        })
    }

    /// Attach the in-process dispatch context required for `Local` targets.
    pub fn with_local(mut self, local: LocalDispatch) -> Self {
        self.local = Some(local);
        self
    }

    /// Run the readiness precondition, then dispatch one job per locator in
    /// caller order. Submission rejections become per-target failures;
    /// only a failed precondition aborts the whole operation.
    async fn dispatch_all(&mut self) -> Result<Vec<(Locator, Result<JobHandle>)>> {
        if self.on.iter().any(Locator::is_local) {
            match &self.local {
                Some(local) => {
                    trace!("running local readiness check");
                    local.init.ready().await?;
                }
                None => {
                    return Err(CaskError::LocalInitFailure(
                        "no local dispatcher is available for local targets".to_string(),
                    ))
                }
            }
        }

        let targets = self.on.clone();
        let mut dispatched = Vec::with_capacity(targets.len());
        for locator in targets {
            let job = (self.serial)(&locator);
            debug!(target = %locator, kind = job.kind(), "dispatching job");
            // Local fan-out waits for lane capacity rather than treating
            // its own burst as overload; remote lanes keep reject semantics.
            let submitted = match (&locator, &self.local) {
                (Locator::Local { .. }, Some(local)) => local.dispatcher.submit_wait(job).await,
                (Locator::Local { .. }, None) => Err(CaskError::LocalInitFailure(
                    "no local dispatcher is available for local targets".to_string(),
                )),
                (Locator::Remote { host, port, .. }, _) => {
                    Ok(self.transport.dispatch(host, *port, &job))
                }
            };
            dispatched.push((locator, submitted));
        }
        Ok(dispatched)
    }

    /// Gather mode: buffer every target's output and return the ordered
    /// outputs alongside the ordered errors.
    pub async fn gather(mut self) -> Result<Gathered> {
        let dispatched = self.dispatch_all().await?;
        let mut outputs = Vec::with_capacity(dispatched.len());
        let mut errors = Vec::new();
        for (locator, submitted) in dispatched {
            match submitted {
                Ok(handle) => {
                    let (buf, result) = handle.gather().await;
                    match result {
                        Ok(()) => outputs.push(Some(buf)),
                        Err(error) => {
                            outputs.push(None);
                            errors.push(TargetError { locator, error });
                        }
                    }
                }
                Err(error) => {
                    outputs.push(None);
                    errors.push(TargetError { locator, error });
                }
            }
        }
        Ok(Gathered { outputs, errors })
    }

    /// Stream mode: write each target's output to `out` incrementally, in
    /// caller order, and return the failures once every target has been
    /// attempted.
    pub async fn stream<W: Write>(mut self, out: &mut W) -> Result<Vec<TargetError>> {
        let dispatched = self.dispatch_all().await?;
        let mut errors = Vec::new();
        for (locator, submitted) in dispatched {
            match submitted {
                Ok(mut handle) => {
                    while let Some(line) = handle.output.recv().await {
                        writeln!(out, "{}", line)?;
                    }
                    let result = match handle.done.await {
                        Ok(result) => result,
                        Err(_) => Err(CaskError::execution("dispatcher dropped the job")),
                    };
                    if let Err(error) = result {
                        errors.push(TargetError { locator, error });
                    }
                }
                Err(error) => errors.push(TargetError { locator, error }),
            }
        }
        Ok(errors)
    }

    /// Stream to stdout, deliver the completion report, and exit the
    /// process: zero when every target succeeded, non-zero otherwise.
    pub async fn stream_and_exit(self, reporter: &Reporter) {
        let mut stdout = std::io::stdout();
        let outcome = self.stream(&mut stdout).await;
        let report = match &outcome {
            Ok(errors) if errors.is_empty() => CompletionReport {
                payload: "succeeded".to_string(),
                success: true,
            },
            Ok(errors) => {
                for error in errors {
                    eprintln!("{}", error);
                }
                CompletionReport {
                    payload: errors
                        .iter()
                        .map(TargetError::to_string)
                        .collect::<Vec<_>>()
                        .join("\n"),
                    success: false,
                }
            }
            Err(e) => {
                eprintln!("{}", e);
                CompletionReport {
                    payload: e.to_string(),
                    success: false,
                }
            }
        };
        reporter.deliver(&report).await;
        let code = if report.success { 0 } else { 1 };
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::backend::testing::StubBackend;
    use crate::backend::ContainerBackend;
    use crate::dispatcher::DispatcherConfig;
    use crate::identifier::Identifier;
    use crate::jobs::{EnvVar, OutputSink, PortPair, RequestId};

    fn local_targets(names: &[&str]) -> Vec<Locator> {
        names
            .iter()
            .map(|name| Locator::Local {
                id: Identifier::new(name).unwrap(),
            })
            .collect()
    }

    fn local_dispatch(backend: StubBackend) -> LocalDispatch {
        let backend: Arc<dyn ContainerBackend> = Arc::new(backend);
        let dispatcher = Dispatcher::new(
            DispatcherConfig {
                queue_fast: 16,
                ..DispatcherConfig::default()
            },
            Arc::clone(&backend),
        );
        dispatcher.start();
        LocalDispatch {
            dispatcher,
            init: backend,
        }
    }

    fn status_factory(locator: &Locator) -> Job {
        Job::Status {
            request_id: RequestId::new(),
            id: locator.id().clone(),
        }
    }

    #[tokio::test]
    async fn gather_isolates_the_failing_target() {
        let local = local_dispatch(StubBackend::failing(["b"]));
        let executor = Executor::new(local_targets(&["a", "b", "c"]), status_factory)
            .unwrap()
            .with_local(local);

        let gathered = executor.gather().await.unwrap();
        assert_eq!(gathered.outputs.len(), 3);
        assert_eq!(gathered.outputs[0].as_deref(), Some("a: running\n"));
        assert!(gathered.outputs[1].is_none());
        assert_eq!(gathered.outputs[2].as_deref(), Some("c: running\n"));

        assert_eq!(gathered.errors.len(), 1);
        assert_eq!(gathered.errors[0].locator.id().as_str(), "b");
        assert!(matches!(
            gathered.errors[0].error,
            CaskError::ExecutionFailure(_)
        ));
    }

    #[tokio::test]
    async fn stream_attempts_every_target_in_order() {
        let local = local_dispatch(StubBackend::failing(["b"]));
        let executor = Executor::new(local_targets(&["a", "b", "c"]), status_factory)
            .unwrap()
            .with_local(local);

        let mut out = Vec::new();
        let errors = executor.stream(&mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "a: running\nc: running\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].locator.id().as_str(), "b");
    }

    #[tokio::test]
    async fn install_fanout_end_to_end() {
        let local = local_dispatch(StubBackend::new());
        let executor = Executor::new(local_targets(&["a", "b"]), |locator: &Locator| {
            Job::Install {
                request_id: RequestId::new(),
                id: locator.id().clone(),
                image: "busybox".to_string(),
                ports: Vec::<PortPair>::new(),
                env: Vec::<EnvVar>::new(),
                started: true,
            }
        })
        .unwrap()
        .with_local(local);

        let gathered = executor.gather().await.unwrap();
        assert!(gathered.errors.is_empty());
        assert_eq!(gathered.outputs.len(), 2);
        for (name, output) in ["a", "b"].iter().zip(&gathered.outputs) {
            let output = output.as_deref().unwrap();
            assert!(output.contains(&format!("installed busybox as cask-{}", name)));
            assert!(output.ends_with(&format!("{} started\n", name)));
        }
    }

    #[tokio::test]
    async fn local_installs_beyond_slow_lane_capacity_all_succeed() {
        // Default slow-lane capacity is 1; a four-target install fan-out
        // must queue behind it instead of overflowing it.
        let local = local_dispatch(StubBackend::new());
        let executor = Executor::new(
            local_targets(&["a", "b", "c", "d"]),
            |locator: &Locator| Job::Install {
                request_id: RequestId::new(),
                id: locator.id().clone(),
                image: "busybox".to_string(),
                ports: Vec::<PortPair>::new(),
                env: Vec::<EnvVar>::new(),
                started: false,
            },
        )
        .unwrap()
        .with_local(local);

        let gathered = executor.gather().await.unwrap();
        assert!(gathered.errors.is_empty());
        assert_eq!(gathered.outputs.len(), 4);
        for output in &gathered.outputs {
            assert!(output.is_some());
        }
    }

    struct UnreadyBackend;

    #[async_trait]
    impl ContainerBackend for UnreadyBackend {
        async fn ready(&self) -> crate::error::Result<()> {
            Err(CaskError::LocalInitFailure(
                "container runtime is not available".to_string(),
            ))
        }

        async fn install(
            &self,
            _id: &Identifier,
            _image: &str,
            _ports: &[PortPair],
            _env: &[EnvVar],
            _sink: &OutputSink,
        ) -> crate::error::Result<()> {
            unreachable!("dispatch must not happen after a failed readiness check")
        }

        async fn start(&self, _id: &Identifier) -> crate::error::Result<String> {
            unreachable!()
        }

        async fn stop(&self, _id: &Identifier) -> crate::error::Result<String> {
            unreachable!()
        }

        async fn status(&self, _id: &Identifier) -> crate::error::Result<String> {
            unreachable!()
        }

        async fn get_environment(&self, _id: &Identifier) -> crate::error::Result<Vec<EnvVar>> {
            unreachable!()
        }

        async fn put_environment(
            &self,
            _id: &Identifier,
            _env: &[EnvVar],
        ) -> crate::error::Result<()> {
            unreachable!()
        }

        async fn patch_environment(
            &self,
            _id: &Identifier,
            _env: &[EnvVar],
        ) -> crate::error::Result<()> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn failed_readiness_check_aborts_before_dispatch() {
        let backend: Arc<dyn ContainerBackend> = Arc::new(UnreadyBackend);
        let dispatcher = Dispatcher::new(DispatcherConfig::default(), Arc::clone(&backend));
        dispatcher.start();
        let executor = Executor::new(local_targets(&["a"]), status_factory)
            .unwrap()
            .with_local(LocalDispatch {
                dispatcher,
                init: backend,
            });

        match executor.gather().await {
            Err(CaskError::LocalInitFailure(_)) => {}
            other => panic!("expected LocalInitFailure, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn local_target_without_local_dispatch_is_an_init_failure() {
        let executor = Executor::new(local_targets(&["a"]), status_factory).unwrap();
        assert!(matches!(
            executor.gather().await,
            Err(CaskError::LocalInitFailure(_))
        ));
    }
}
