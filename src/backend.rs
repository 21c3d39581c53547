//! Collaborator interfaces the dispatcher executes jobs against.
//!
//! The dispatcher knows nothing about what a job does beyond its identifier
//! and lane; the actual container lifecycle and environment mutations happen
//! behind [`ContainerBackend`]. The process-backed [`SystemBackend`] shells
//! out to the container runtime; tests swap in a stub.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

use crate::clienv;
use crate::error::{CaskError, Result};
use crate::identifier::Identifier;
use crate::jobs::{EnvVar, OutputSink, PortPair};

/// Container lifecycle and environment store operations.
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Local readiness probe, run once before any local dispatch.
    async fn ready(&self) -> Result<()>;

    /// Install `image` as the managed unit `id`, streaming progress to
    /// `sink`. Does not start the unit; the job layer handles `--start`.
    async fn install(
        &self,
        id: &Identifier,
        image: &str,
        ports: &[PortPair],
        env: &[EnvVar],
        sink: &OutputSink,
    ) -> Result<()>;

    async fn start(&self, id: &Identifier) -> Result<String>;

    async fn stop(&self, id: &Identifier) -> Result<String>;

    async fn status(&self, id: &Identifier) -> Result<String>;

    async fn get_environment(&self, id: &Identifier) -> Result<Vec<EnvVar>>;

    async fn put_environment(&self, id: &Identifier, env: &[EnvVar]) -> Result<()>;

    async fn patch_environment(&self, id: &Identifier, env: &[EnvVar]) -> Result<()>;
}

/// Backend that drives a local container runtime (`docker` unless
/// `CASK_RUNTIME` overrides it) and keeps environment files under the data
/// directory.
pub struct SystemBackend {
    runtime: String,
    env_dir: PathBuf,
}

impl SystemBackend {
    pub fn from_env() -> Self {
        Self {
            runtime: clienv::runtime_bin(),
            env_dir: clienv::env_dir(),
        }
    }

    #[cfg(test)]
    fn with_env_dir(env_dir: PathBuf) -> Self {
        Self {
            runtime: clienv::runtime_bin(),
            env_dir,
        }
    }

    /// Run the runtime and capture its output; non-zero exit becomes an
    /// `ExecutionFailure` carrying the stderr tail.
    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(runtime = %self.runtime, ?args, "running runtime command");
        let output = Command::new(&self.runtime).args(args).output().await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(CaskError::execution(format!(
                "{} {} exited with {}: {}",
                self.runtime,
                args.first().unwrap_or(&""),
                output.status,
                stderr.trim()
            )))
        }
    }

    /// Run the runtime forwarding stdout and stderr lines to `sink` as they
    /// are produced.
    async fn run_streamed(&self, args: &[String], sink: &OutputSink) -> Result<()> {
        debug!(runtime = %self.runtime, ?args, "running streamed runtime command");
        let mut child = Command::new(&self.runtime)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let out_sink = sink.clone();
        let out_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                out_sink.line(line).await;
            }
        });
        let err_sink = sink.clone();
        let err_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                err_sink.line(line).await;
            }
        });

        let status = child.wait().await?;
        let _ = out_task.await;
        let _ = err_task.await;

        if status.success() {
            Ok(())
        } else {
            Err(CaskError::execution(format!(
                "{} {} exited with {}",
                self.runtime,
                args.first().map(String::as_str).unwrap_or(""),
                status
            )))
        }
    }

    fn env_path(&self, id: &Identifier) -> PathBuf {
        self.env_dir.join(id.as_str())
    }

    async fn read_env(&self, id: &Identifier) -> Result<Vec<EnvVar>> {
        let path = self.env_path(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => content
                .lines()
                .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
                .map(str::parse)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_env(&self, id: &Identifier, env: &[EnvVar]) -> Result<()> {
        tokio::fs::create_dir_all(&self.env_dir).await?;
        let mut content = String::new();
        for var in env {
            content.push_str(&var.to_string());
            content.push('\n');
        }
        tokio::fs::write(self.env_path(id), content).await?;
        trace!(id = %id, count = env.len(), "environment written");
        Ok(())
    }
}

#[async_trait]
impl ContainerBackend for SystemBackend {
    async fn ready(&self) -> Result<()> {
        let probe = Command::new(&self.runtime)
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match probe {
            Ok(status) if status.success() => {}
            Ok(status) => {
                return Err(CaskError::LocalInitFailure(format!(
                    "'{} version' exited with {}",
                    self.runtime, status
                )))
            }
            Err(e) => {
                return Err(CaskError::LocalInitFailure(format!(
                    "container runtime '{}' is not available: {}",
                    self.runtime, e
                )))
            }
        }
        tokio::fs::create_dir_all(&self.env_dir)
            .await
            .map_err(|e| CaskError::LocalInitFailure(format!("cannot create data dir: {}", e)))?;
        Ok(())
    }

    async fn install(
        &self,
        id: &Identifier,
        image: &str,
        ports: &[PortPair],
        env: &[EnvVar],
        sink: &OutputSink,
    ) -> Result<()> {
        let name = id.container_name();
        sink.line(format!("pulling image {}", image)).await;
        self.run_streamed(&["pull".to_string(), image.to_string()], sink)
            .await?;

        let mut args = vec!["create".to_string(), "--name".to_string(), name.clone()];
        for pair in ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", pair.external, pair.internal));
        }
        for var in env {
            args.push("-e".to_string());
            args.push(var.to_string());
        }
        args.push(image.to_string());
        self.run_streamed(&args, sink).await?;

        if !env.is_empty() {
            self.write_env(id, env).await?;
        }
        sink.line(format!("installed {} as {}", image, name)).await;
        Ok(())
    }

    async fn start(&self, id: &Identifier) -> Result<String> {
        self.run(&["start", &id.container_name()]).await?;
        Ok(format!("{} started", id))
    }

    async fn stop(&self, id: &Identifier) -> Result<String> {
        self.run(&["stop", &id.container_name()]).await?;
        Ok(format!("{} stopped", id))
    }

    async fn status(&self, id: &Identifier) -> Result<String> {
        let out = self
            .run(&[
                "inspect",
                "--format",
                "{{.State.Status}}",
                &id.container_name(),
            ])
            .await?;
        Ok(format!("{}: {}", id, out.trim()))
    }

    async fn get_environment(&self, id: &Identifier) -> Result<Vec<EnvVar>> {
        self.read_env(id).await
    }

    async fn put_environment(&self, id: &Identifier, env: &[EnvVar]) -> Result<()> {
        self.write_env(id, env).await
    }

    async fn patch_environment(&self, id: &Identifier, env: &[EnvVar]) -> Result<()> {
        let mut merged = self.read_env(id).await?;
        for var in env {
            match merged.iter_mut().find(|existing| existing.key == var.key) {
                Some(existing) => existing.value = var.value.clone(),
                None => merged.push(var.clone()),
            }
        }
        self.write_env(id, &merged).await
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory backend double with controllable blocking and failures.

    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::sync::Semaphore;

    use super::*;

    /// Backend whose operations can be gated on a semaphore (to hold jobs
    /// in the Running state) and forced to fail per identifier.
    #[derive(Default)]
    pub struct StubBackend {
        gate: Option<Arc<Semaphore>>,
        fail_ids: HashSet<String>,
        current: AtomicUsize,
        max: AtomicUsize,
        log: Mutex<Vec<String>>,
        env: Mutex<HashMap<String, Vec<EnvVar>>>,
    }

    impl StubBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Operations block until a permit is added to `gate`.
        pub fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        /// Operations against the listed ids fail with `ExecutionFailure`.
        pub fn failing<I: IntoIterator<Item = &'static str>>(ids: I) -> Self {
            Self {
                fail_ids: ids.into_iter().map(String::from).collect(),
                ..Self::default()
            }
        }

        /// Ids in the order their operations ran.
        pub fn executed(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        /// Highest number of operations observed in flight at once.
        pub fn max_concurrent(&self) -> usize {
            self.max.load(Ordering::SeqCst)
        }

        pub fn in_flight(&self) -> usize {
            self.current.load(Ordering::SeqCst)
        }

        async fn enter(&self, id: &Identifier) -> Result<()> {
            let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(current, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            self.log.lock().unwrap().push(id.to_string());
            self.current.fetch_sub(1, Ordering::SeqCst);
            if self.fail_ids.contains(id.as_str()) {
                return Err(CaskError::execution(format!("{} is broken", id)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ContainerBackend for StubBackend {
        async fn ready(&self) -> Result<()> {
            Ok(())
        }

        async fn install(
            &self,
            id: &Identifier,
            image: &str,
            _ports: &[PortPair],
            env: &[EnvVar],
            sink: &OutputSink,
        ) -> Result<()> {
            sink.line(format!("pulling image {}", image)).await;
            self.enter(id).await?;
            self.env
                .lock()
                .unwrap()
                .insert(id.to_string(), env.to_vec());
            sink.line(format!("installed {} as {}", image, id.container_name()))
                .await;
            Ok(())
        }

        async fn start(&self, id: &Identifier) -> Result<String> {
            self.enter(id).await?;
            Ok(format!("{} started", id))
        }

        async fn stop(&self, id: &Identifier) -> Result<String> {
            self.enter(id).await?;
            Ok(format!("{} stopped", id))
        }

        async fn status(&self, id: &Identifier) -> Result<String> {
            self.enter(id).await?;
            Ok(format!("{}: running", id))
        }

        async fn get_environment(&self, id: &Identifier) -> Result<Vec<EnvVar>> {
            self.enter(id).await?;
            Ok(self
                .env
                .lock()
                .unwrap()
                .get(id.as_str())
                .cloned()
                .unwrap_or_default())
        }

        async fn put_environment(&self, id: &Identifier, env: &[EnvVar]) -> Result<()> {
            self.enter(id).await?;
            self.env
                .lock()
                .unwrap()
                .insert(id.to_string(), env.to_vec());
            Ok(())
        }

        async fn patch_environment(&self, id: &Identifier, env: &[EnvVar]) -> Result<()> {
            self.enter(id).await?;
            let mut store = self.env.lock().unwrap();
            let merged = store.entry(id.to_string()).or_default();
            for var in env {
                match merged.iter_mut().find(|existing| existing.key == var.key) {
                    Some(existing) => existing.value = var.value.clone(),
                    None => merged.push(var.clone()),
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identifier {
        Identifier::new(name).unwrap()
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<EnvVar> {
        pairs
            .iter()
            .map(|(k, v)| EnvVar {
                key: k.to_string(),
                value: v.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn env_store_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SystemBackend::with_env_dir(dir.path().to_path_buf());
        let web = id("web");

        assert!(backend.get_environment(&web).await.unwrap().is_empty());

        let env = vars(&[("A", "1"), ("B", "2")]);
        backend.put_environment(&web, &env).await.unwrap();
        assert_eq!(backend.get_environment(&web).await.unwrap(), env);
    }

    #[tokio::test]
    async fn env_store_put_resets_existing_values() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SystemBackend::with_env_dir(dir.path().to_path_buf());
        let web = id("web");

        backend
            .put_environment(&web, &vars(&[("A", "1"), ("B", "2")]))
            .await
            .unwrap();
        backend
            .put_environment(&web, &vars(&[("C", "3")]))
            .await
            .unwrap();
        assert_eq!(
            backend.get_environment(&web).await.unwrap(),
            vars(&[("C", "3")])
        );
    }

    #[tokio::test]
    async fn env_store_patch_merges() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SystemBackend::with_env_dir(dir.path().to_path_buf());
        let web = id("web");

        backend
            .put_environment(&web, &vars(&[("A", "1"), ("B", "2")]))
            .await
            .unwrap();
        backend
            .patch_environment(&web, &vars(&[("B", "changed"), ("C", "3")]))
            .await
            .unwrap();
        assert_eq!(
            backend.get_environment(&web).await.unwrap(),
            vars(&[("A", "1"), ("B", "changed"), ("C", "3")])
        );
    }
}
