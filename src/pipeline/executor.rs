//! Pipeline executor: wires the stages and runs them to completion.
//!
//! Every run:
//! 1. Locks the configuration for the whole call.
//! 2. Resets every stage, destination last.
//! 3. Spawns one thread per accept link, from the destination back to the source.
//! 4. Spawns the source thread.
//! 5. Waits for the destination's completion signal.

use crate::config::PipelineConfig;
use crate::pipeline::context::Context;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::lock;
use crate::pipeline::message::Message;
use crate::pipeline::node::{Destination, Source, Stage};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Whether a [`Pipeline`] is executing a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
}

/// What one run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Threads spawned: one per accept link plus the source.
    pub tasks_spawned: usize,
    /// Threads still running when `run` returned. The next run waits for them.
    pub lingering: usize,
    pub elapsed: Duration,
    /// Whether the run's context was cancelled before the destination finished.
    pub cancelled: bool,
}

/// The accept side of a link: a transform stage or the destination.
enum Downstream<T> {
    Stage(Arc<dyn Stage<T>>),
    Destination(Arc<dyn Destination<T>>),
}

impl<T> Downstream<T> {
    fn name(&self) -> &str {
        match self {
            Downstream::Stage(stage) => stage.name(),
            Downstream::Destination(dst) => dst.name(),
        }
    }

    fn accept(&self, ctx: &Context, upstream: Receiver<Message<T>>) {
        match self {
            Downstream::Stage(stage) => stage.accept(ctx, upstream),
            Downstream::Destination(dst) => dst.accept(ctx, upstream),
        }
    }
}

/// Sends its task index when dropped, so exits are seen even after a panic.
struct ExitNotice {
    index: usize,
    tx: Sender<usize>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.tx.send(self.index);
    }
}

struct Task {
    index: usize,
    name: String,
    handle: JoinHandle<()>,
    finished: bool,
}

/// Threads spawned by one run.
struct TaskSet {
    prefix: String,
    tasks: Vec<Task>,
    exit_tx: Sender<usize>,
    exit_rx: Receiver<usize>,
}

impl TaskSet {
    fn new(prefix: &str) -> Self {
        let (exit_tx, exit_rx) = unbounded();
        Self {
            prefix: prefix.to_string(),
            tasks: Vec::new(),
            exit_tx,
            exit_rx,
        }
    }

    fn spawn<F>(&mut self, name: String, f: F) -> PipelineResult<usize>
    where
        F: FnOnce() + Send + 'static,
    {
        let index = self.tasks.len();
        let notice = ExitNotice {
            index,
            tx: self.exit_tx.clone(),
        };
        let thread_name = format!("{}-{}", self.prefix, name).replace('\0', "");
        let handle = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let _notice = notice;
                f();
            })
            .map_err(|source| PipelineError::Spawn {
                stage: name.clone(),
                source,
            })?;
        tracing::debug!(task = index, stage = %name, "task spawned");
        self.tasks.push(Task {
            index,
            name,
            handle,
            finished: false,
        });
        Ok(index)
    }

    fn mark_finished(&mut self, index: usize) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.index == index) {
            task.finished = true;
        }
    }

    /// Wait for the destination's signal, or for its link to exit without one.
    fn wait_for_completion(&mut self, done: &Receiver<()>, destination_task: usize) {
        let exit_rx = self.exit_rx.clone();
        loop {
            select! {
                recv(done) -> _ => return,
                recv(exit_rx) -> index => {
                    let Ok(index) = index else { continue };
                    self.mark_finished(index);
                    if index == destination_task {
                        if done.try_recv().is_err() {
                            tracing::warn!("destination returned without signalling completion");
                        }
                        return;
                    }
                }
            }
        }
    }

    /// Give stage threads up to `grace` to exit and join the finished ones.
    /// Threads still running stay in the set; returns how many.
    fn settle(&mut self, grace: Option<Duration>) -> usize {
        while let Ok(index) = self.exit_rx.try_recv() {
            self.mark_finished(index);
        }

        if let Some(grace) = grace {
            let deadline = Instant::now() + grace;
            while self.tasks.iter().any(|t| !t.finished) {
                match self.exit_rx.recv_deadline(deadline) {
                    Ok(index) => self.mark_finished(index),
                    Err(_) => break,
                }
            }
        }

        let mut running = Vec::new();
        for task in self.tasks.drain(..) {
            if task.finished {
                if task.handle.join().is_err() {
                    tracing::warn!(stage = %task.name, "stage thread panicked");
                }
            } else {
                if grace.is_some() {
                    tracing::warn!(stage = %task.name, "stage still running after grace period, detaching");
                }
                running.push(task);
            }
        }
        self.tasks = running;
        self.tasks.len()
    }

    /// Block until every remaining thread has exited, then join them.
    ///
    /// They still hold the stage channels, so this must happen before the
    /// next run resets them.
    fn reap(mut self) {
        let pending = self.tasks.iter().filter(|t| !t.finished).count();
        tracing::debug!(pending, "waiting for threads of the previous run");
        while self.tasks.iter().any(|t| !t.finished) {
            match self.exit_rx.recv() {
                Ok(index) => self.mark_finished(index),
                Err(_) => break,
            }
        }
        self.settle(None);
    }
}

/// Marks the pipeline as running for the lifetime of the guard.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct PipelineInner<T> {
    source: Option<Arc<dyn Source<T>>>,
    stages: Vec<Arc<dyn Stage<T>>>,
    destination: Option<Arc<dyn Destination<T>>>,
    config: PipelineConfig,
    /// Threads of the last run that were still alive when it returned.
    stragglers: Option<TaskSet>,
}

/// Orchestrates one source, an ordered list of transform stages and one
/// destination.
///
/// All methods take `&self` and serialize on one lock, so a pipeline can be
/// shared between threads. Mutators called while [`run`](Self::run) is in
/// progress block until it returns.
pub struct Pipeline<T> {
    inner: Mutex<PipelineInner<T>>,
    running: AtomicBool,
}

impl<T: Send + 'static> Pipeline<T> {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    /// The config is not validated here; [`run`](Self::run) rejects an invalid one.
    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            inner: Mutex::new(PipelineInner {
                source: None,
                stages: Vec::new(),
                destination: None,
                config,
                stragglers: None,
            }),
            running: AtomicBool::new(false),
        }
    }

    // ── Configuration ──

    /// Set the source. Blocks while a run is in progress.
    pub fn set_source(&self, source: Arc<dyn Source<T>>) {
        lock(&self.inner).source = Some(source);
    }

    /// Append a transform stage. Blocks while a run is in progress.
    pub fn add(&self, stage: Arc<dyn Stage<T>>) {
        lock(&self.inner).stages.push(stage);
    }

    /// Set the destination. Blocks while a run is in progress.
    pub fn set_destination(&self, destination: Arc<dyn Destination<T>>) {
        lock(&self.inner).destination = Some(destination);
    }

    /// Remove all transform stages. Blocks while a run is in progress.
    pub fn clear_stages(&self) {
        lock(&self.inner).stages.clear();
    }

    pub fn stage_count(&self) -> usize {
        lock(&self.inner).stages.len()
    }

    pub fn config(&self) -> PipelineConfig {
        lock(&self.inner).config.clone()
    }

    /// Replace the config. Validated by the next [`run`](Self::run).
    pub fn set_config(&self, config: PipelineConfig) {
        lock(&self.inner).config = config;
    }

    /// Current state. Does not wait for a run to finish.
    pub fn state(&self) -> PipelineState {
        if self.running.load(Ordering::Acquire) {
            PipelineState::Running
        } else {
            PipelineState::Idle
        }
    }

    // ── Execution ──

    /// Run the pipeline until the destination signals completion.
    ///
    /// Returns a configuration error if the source or destination is unset,
    /// and [`PipelineError::Config`] if the config fails
    /// [`validate`](PipelineConfig::validate). End of stream and cancellation
    /// are not errors. With
    /// [`ErrorPolicy::Abort`](crate::config::ErrorPolicy::Abort) the first
    /// stage error is returned as [`PipelineError::Aborted`].
    ///
    /// Threads the previous run left behind are waited for before any stage
    /// is reset. Stages that ignore cancellation make this call hang.
    pub fn run(&self, ctx: &Context) -> PipelineResult<RunSummary> {
        let mut inner = lock(&self.inner);

        let source = inner.source.clone().ok_or(PipelineError::MissingSource)?;
        let destination = inner
            .destination
            .clone()
            .ok_or(PipelineError::MissingDestination)?;
        inner.config.validate()?;

        let _running = RunningGuard::enter(&self.running);
        let started = Instant::now();
        let run_ctx = ctx.child_with_policy(inner.config.error_policy);

        tracing::info!(
            source = source.name(),
            stages = inner.stages.len(),
            destination = destination.name(),
            policy = %inner.config.error_policy,
            "pipeline run starting"
        );

        if let Some(previous) = inner.stragglers.take() {
            previous.reap();
        }

        source.reset();
        for stage in &inner.stages {
            stage.reset();
        }
        destination.reset();
        let done = destination.done();

        let mut tasks = TaskSet::new(&inner.config.thread_name_prefix);
        let destination_task =
            match Self::launch(&mut tasks, &run_ctx, &source, &inner.stages, &destination) {
                Ok(index) => index,
                Err(err) => {
                    tracing::error!(error = %err, "pipeline wiring failed, cancelling run");
                    run_ctx.cancel_with_reason("wiring failed");
                    if tasks.settle(None) > 0 {
                        inner.stragglers = Some(tasks);
                    }
                    return Err(err);
                }
            };

        tasks.wait_for_completion(&done, destination_task);
        let cancelled = run_ctx.is_cancelled();
        let tasks_spawned = tasks.tasks.len();

        // Release anything still blocked on this run.
        run_ctx.cancel_with_reason("run finished");
        let lingering = tasks.settle(inner.config.join_grace());
        if lingering > 0 {
            inner.stragglers = Some(tasks);
        }

        let summary = RunSummary {
            tasks_spawned,
            lingering,
            elapsed: started.elapsed(),
            cancelled,
        };
        tracing::info!(
            tasks = summary.tasks_spawned,
            lingering = summary.lingering,
            cancelled = summary.cancelled,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "pipeline run finished"
        );

        if let Some((stage, source)) = run_ctx.take_abort() {
            return Err(PipelineError::Aborted { stage, source });
        }
        Ok(summary)
    }

    /// Spawn the accept links from the destination back to the source, then
    /// the source itself. Returns the destination link's task index.
    fn launch(
        tasks: &mut TaskSet,
        ctx: &Context,
        source: &Arc<dyn Source<T>>,
        stages: &[Arc<dyn Stage<T>>],
        destination: &Arc<dyn Destination<T>>,
    ) -> PipelineResult<usize> {
        let mut downstream = Downstream::Destination(Arc::clone(destination));
        let mut destination_task = None;

        for stage in stages.iter().rev() {
            let index = Self::spawn_link(tasks, ctx, downstream, stage.output().out_ch())?;
            destination_task.get_or_insert(index);
            downstream = Downstream::Stage(Arc::clone(stage));
        }
        let index = Self::spawn_link(tasks, ctx, downstream, source.output().out_ch())?;
        let destination_task = *destination_task.get_or_insert(index);

        let producer = Arc::clone(source);
        let source_ctx = ctx.clone();
        tasks.spawn(format!("source-{}", source.name()), move || {
            producer.start(&source_ctx);
            tracing::debug!(stage = producer.name(), "source finished");
        })?;

        Ok(destination_task)
    }

    fn spawn_link(
        tasks: &mut TaskSet,
        ctx: &Context,
        downstream: Downstream<T>,
        upstream: Receiver<Message<T>>,
    ) -> PipelineResult<usize> {
        let link_ctx = ctx.clone();
        let name = format!("accept-{}", downstream.name());
        tasks.spawn(name, move || downstream.accept(&link_ctx, upstream))
    }
}

impl<T: Send + 'static> Default for Pipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorPolicy;
    use crate::error::StreamError;
    use crate::pipeline::nodes::{Collector, IterSource, MapStage};

    #[test]
    fn test_missing_source_and_destination() {
        let pipeline: Pipeline<i32> = Pipeline::new();
        let err = pipeline.run(&Context::new()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingSource));

        pipeline.set_source(Arc::new(IterSource::new("src", vec![1])));
        let err = pipeline.run(&Context::new()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingDestination));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn test_linear_run() {
        let pipeline: Pipeline<i32> = Pipeline::new();
        let sink = Arc::new(Collector::<i32>::new("sink"));
        pipeline.set_source(Arc::new(IterSource::new("src", vec![1, 2, 3])));
        pipeline.add(Arc::new(MapStage::new("inc", |v: i32| v + 1)));
        pipeline.set_destination(sink.clone());

        let summary = pipeline.run(&Context::new()).unwrap();
        assert_eq!(summary.tasks_spawned, 3);
        assert!(!summary.cancelled);
        assert_eq!(sink.items(), vec![2, 3, 4]);
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn test_abort_policy_returns_error() {
        let pipeline: Pipeline<i32> =
            Pipeline::with_config(PipelineConfig::new().with_error_policy(ErrorPolicy::Abort));
        pipeline.set_source(Arc::new(IterSource::new("src", vec![1, 2, 3])));
        pipeline.add(Arc::new(MapStage::fallible("check", |v: i32| {
            if v == 2 {
                Err(StreamError::stage("check", "two is not allowed"))
            } else {
                Ok(v)
            }
        })));
        pipeline.set_destination(Arc::new(Collector::<i32>::new("sink")));

        match pipeline.run(&Context::new()) {
            Err(PipelineError::Aborted { stage, source }) => {
                assert_eq!(stage, "check");
                assert!(source.to_string().contains("two is not allowed"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_config_rejected_before_start() {
        let mut config = PipelineConfig::new();
        config.thread_name_prefix = String::new();
        let pipeline: Pipeline<i32> = Pipeline::with_config(config);
        let sink = Arc::new(Collector::<i32>::new("sink"));
        pipeline.set_source(Arc::new(IterSource::new("src", vec![1])));
        pipeline.set_destination(sink.clone());

        let err = pipeline.run(&Context::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(sink.outcome().is_none());

        pipeline.set_config(PipelineConfig::new());
        pipeline.run(&Context::new()).unwrap();
        assert_eq!(sink.items(), vec![1]);
    }

    #[test]
    fn test_settle_keeps_running_tasks_until_reaped() {
        let mut tasks = TaskSet::new("test");
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        tasks.spawn("quick".to_string(), || {}).unwrap();
        tasks
            .spawn("held".to_string(), move || {
                let _ = release_rx.recv();
            })
            .unwrap();

        assert_eq!(tasks.settle(Some(Duration::from_millis(50))), 1);
        assert_eq!(tasks.tasks.len(), 1);
        assert_eq!(tasks.tasks[0].name, "held");

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            drop(release_tx);
        });
        tasks.reap();
        releaser.join().unwrap();
    }

    #[test]
    fn test_abort_does_not_cancel_callers_context() {
        let pipeline: Pipeline<i32> =
            Pipeline::with_config(PipelineConfig::new().with_error_policy(ErrorPolicy::Abort));
        pipeline.set_source(Arc::new(IterSource::new("src", vec![1])));
        pipeline.add(Arc::new(MapStage::fallible("fail", |_: i32| {
            Err(StreamError::stage("fail", "nope"))
        })));
        pipeline.set_destination(Arc::new(Collector::<i32>::new("sink")));

        let ctx = Context::new();
        assert!(pipeline.run(&ctx).is_err());
        assert!(!ctx.is_cancelled());
    }
}
