//! Dependency-respecting concurrent execution of a task graph.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tokio::task::{Id, JoinError, JoinSet};

use crate::graph::{GraphError, TaskError, TaskGraph, TaskKey};

/// A task that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRun<K> {
    /// Task identifier
    pub id: K,
    /// Time spent in the task's action
    pub elapsed: Duration,
}

/// Summary of a successful run.
#[derive(Debug)]
pub struct RunReport<K> {
    /// Completed tasks in completion order (groups included)
    pub completed: Vec<TaskRun<K>>,
    /// Wall-clock time for the whole run
    pub duration: Duration,
}

impl<K: TaskKey> RunReport<K> {
    /// Whether `id` completed during this run.
    pub fn ran(&self, id: K) -> bool {
        self.completed.iter().any(|r| r.id == id)
    }
}

/// Errors that stop a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError<K: TaskKey> {
    #[error(transparent)]
    Graph(#[from] GraphError<K>),

    #[error("Task '{task}' failed: {source}")]
    TaskFailed {
        task: K,
        #[source]
        source: TaskError,
        /// Tasks of the run that never started
        skipped: Vec<K>,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Panicked(String);

type Finished<K> = (K, Result<(), TaskError>, Duration);

impl<K: TaskKey> TaskGraph<K> {
    /// Run one task and its prerequisites.
    pub async fn run_one(&self, id: K) -> Result<RunReport<K>, RunError<K>> {
        self.run(&[id]).await
    }

    /// Run the dependency closure of `targets`.
    ///
    /// A task starts only after every prerequisite has returned `Ok`. Tasks
    /// without a path between them run concurrently. Every task of the
    /// closure runs at most once. After a failure no further task is started;
    /// tasks already running are awaited before the error is returned.
    pub async fn run(&self, targets: &[K]) -> Result<RunReport<K>, RunError<K>> {
        let start = Instant::now();
        let included = self.closure(targets)?;

        let mut waiting: BTreeMap<K, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<K, Vec<K>> = BTreeMap::new();
        for id in &included {
            let task = &self.tasks[id];
            waiting.insert(*id, task.prerequisites.len());
            for dep in &task.prerequisites {
                dependents.entry(*dep).or_default().push(*id);
            }
        }

        let mut ready: VecDeque<K> = waiting
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();
        for id in &ready {
            waiting.remove(id);
        }

        let mut running: JoinSet<Finished<K>> = JoinSet::new();
        let mut spawned: HashMap<Id, K> = HashMap::new();
        let mut completed = Vec::with_capacity(included.len());
        let mut failure: Option<(K, TaskError)> = None;

        loop {
            while failure.is_none() {
                let Some(id) = ready.pop_front() else {
                    break;
                };

                match self.tasks[&id].action.clone() {
                    None => {
                        tracing::debug!("Finished group '{}'", id);
                        completed.push(TaskRun {
                            id,
                            elapsed: Duration::ZERO,
                        });
                        release(id, &dependents, &mut waiting, &mut ready);
                    }
                    Some(action) => {
                        tracing::info!("Starting '{}'...", id);
                        let handle = running.spawn_blocking(move || {
                            let started = Instant::now();
                            let outcome = panic::catch_unwind(AssertUnwindSafe(|| action()))
                                .unwrap_or_else(|payload| {
                                    Err(Box::new(Panicked(panic_message(&*payload))) as TaskError)
                                });
                            (id, outcome, started.elapsed())
                        });
                        spawned.insert(handle.id(), id);
                    }
                }
            }

            let Some(joined) = running.join_next_with_id().await else {
                break;
            };
            let Some((id, outcome, elapsed)) = settle(joined, &mut spawned) else {
                continue;
            };

            match outcome {
                Ok(()) => {
                    tracing::info!("Finished '{}' after {}", id, format_elapsed(elapsed));
                    completed.push(TaskRun { id, elapsed });
                    release(id, &dependents, &mut waiting, &mut ready);
                }
                Err(source) => {
                    tracing::error!(
                        "'{}' errored after {}: {}",
                        id,
                        format_elapsed(elapsed),
                        source
                    );
                    if failure.is_none() {
                        failure = Some((id, source));
                    }
                }
            }
        }

        if let Some((task, source)) = failure {
            let mut skipped: Vec<K> = ready.into_iter().collect();
            skipped.extend(waiting.keys().copied());
            skipped.sort();
            return Err(RunError::TaskFailed {
                task,
                source,
                skipped,
            });
        }

        Ok(RunReport {
            completed,
            duration: start.elapsed(),
        })
    }
}

/// Resolve a joined task to its outcome. A task that never reported back
/// (cancelled by the runtime, or panicked outside its action) counts as a
/// failure of that task, so the run keeps draining the others.
fn settle<K: TaskKey>(
    joined: Result<(Id, Finished<K>), JoinError>,
    spawned: &mut HashMap<Id, K>,
) -> Option<Finished<K>> {
    match joined {
        Ok((handle, finished)) => {
            spawned.remove(&handle);
            Some(finished)
        }
        Err(error) => {
            let Some(id) = spawned.remove(&error.id()) else {
                tracing::error!("Lost track of a task: {}", error);
                return None;
            };
            Some((id, Err(Box::new(error) as TaskError), Duration::ZERO))
        }
    }
}

/// Mark `id` complete and queue dependents whose prerequisites are all done.
fn release<K: TaskKey>(
    id: K,
    dependents: &BTreeMap<K, Vec<K>>,
    waiting: &mut BTreeMap<K, usize>,
    ready: &mut VecDeque<K>,
) {
    let Some(children) = dependents.get(&id) else {
        return;
    };
    for child in children {
        if let Some(count) = waiting.get_mut(child) {
            *count -= 1;
            if *count == 0 {
                waiting.remove(child);
                ready.push_back(*child);
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    if elapsed.as_secs() >= 1 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    use crate::graph::TaskGraphBuilder;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    enum T {
        Clean,
        Compile,
        Minify,
        Render,
        All,
    }

    impl fmt::Display for T {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt::Debug::fmt(self, f)
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(
        log: &Log,
        name: &'static str,
        delay_ms: u64,
    ) -> impl Fn() -> Result<(), TaskError> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move || {
            log.lock().unwrap().push(format!("start {name}"));
            std::thread::sleep(Duration::from_millis(delay_ms));
            log.lock().unwrap().push(format!("end {name}"));
            Ok(())
        }
    }

    fn position(log: &[String], entry: &str) -> usize {
        log.iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("missing log entry {entry}"))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn prerequisite_finishes_before_dependent_starts() {
        let log: Log = Arc::default();
        let mut builder = TaskGraphBuilder::new();
        builder.task(T::Clean, &[], recording(&log, "clean", 50)).unwrap();
        builder.task(T::Compile, &[T::Clean], recording(&log, "compile", 0)).unwrap();
        builder.task(T::Minify, &[T::Compile], recording(&log, "minify", 0)).unwrap();
        let graph = builder.build().unwrap();

        let report = graph.run_one(T::Minify).await.unwrap();
        assert_eq!(report.completed.len(), 3);

        let log = log.lock().unwrap();
        assert!(position(&log, "end clean") < position(&log, "start compile"));
        assert!(position(&log, "end compile") < position(&log, "start minify"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shared_prerequisite_runs_once() {
        let log: Log = Arc::default();
        let mut builder = TaskGraphBuilder::new();
        builder.task(T::Clean, &[], recording(&log, "clean", 0)).unwrap();
        builder.task(T::Compile, &[T::Clean], recording(&log, "compile", 0)).unwrap();
        builder.task(T::Render, &[T::Clean], recording(&log, "render", 0)).unwrap();
        builder.group(T::All, &[T::Compile, T::Render]).unwrap();
        let graph = builder.build().unwrap();

        let report = graph.run(&[T::All, T::Compile]).await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.iter().filter(|e| *e == "start clean").count(), 1);
        assert!(report.ran(T::All));
        assert!(!report.ran(T::Minify));
        assert_eq!(report.completed.last().map(|r| r.id), Some(T::All));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn independent_tasks_run_concurrently() {
        // Each task waits for a message only the other one sends.
        let (to_b, from_a) = mpsc::channel::<()>();
        let (to_a, from_b) = mpsc::channel::<()>();
        let from_a = Mutex::new(from_a);
        let from_b = Mutex::new(from_b);

        let mut builder = TaskGraphBuilder::new();
        builder
            .task(T::Compile, &[], move || {
                to_b.send(())?;
                from_b.lock().unwrap().recv_timeout(Duration::from_secs(5))?;
                Ok(())
            })
            .unwrap();
        builder
            .task(T::Render, &[], move || {
                to_a.send(())?;
                from_a.lock().unwrap().recv_timeout(Duration::from_secs(5))?;
                Ok(())
            })
            .unwrap();
        let graph = builder.build().unwrap();

        graph.run(&[T::Compile, T::Render]).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_leaves_dependents_unrun() {
        let log: Log = Arc::default();
        let mut builder = TaskGraphBuilder::new();
        builder
            .task(T::Compile, &[], || Err("syntax error in main.scss".into()))
            .unwrap();
        builder.task(T::Minify, &[T::Compile], recording(&log, "minify", 0)).unwrap();
        builder.group(T::All, &[T::Minify]).unwrap();
        let graph = builder.build().unwrap();

        match graph.run_one(T::All).await {
            Err(RunError::TaskFailed {
                task,
                source,
                skipped,
            }) => {
                assert_eq!(task, T::Compile);
                assert_eq!(source.to_string(), "syntax error in main.scss");
                assert_eq!(skipped, vec![T::Minify, T::All]);
            }
            other => panic!("expected task failure, got {other:?}"),
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_waits_for_running_siblings() {
        let log: Log = Arc::default();
        let mut builder = TaskGraphBuilder::new();
        builder
            .task(T::Compile, &[], || Err("broken".into()))
            .unwrap();
        builder.task(T::Render, &[], recording(&log, "render", 100)).unwrap();
        let graph = builder.build().unwrap();

        let err = graph.run(&[T::Compile, T::Render]).await.unwrap_err();

        assert!(matches!(err, RunError::TaskFailed { task: T::Compile, .. }));
        assert!(log.lock().unwrap().contains(&"end render".to_string()));
    }

    #[tokio::test]
    async fn cancelled_task_settles_as_its_own_failure() {
        let mut set: JoinSet<Finished<T>> = JoinSet::new();
        let handle = set.spawn(std::future::pending());
        let mut spawned = HashMap::from([(handle.id(), T::Minify)]);
        handle.abort();

        let joined = set.join_next_with_id().await.unwrap();
        let (id, outcome, _) = settle(joined, &mut spawned).unwrap();

        assert_eq!(id, T::Minify);
        assert!(outcome.unwrap_err().to_string().contains("cancelled"));
        assert!(spawned.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_action_is_reported_as_failure() {
        let mut builder = TaskGraphBuilder::new();
        builder
            .task(T::Render, &[], || panic!("template exploded"))
            .unwrap();
        let graph = builder.build().unwrap();

        let err = graph.run_one(T::Render).await.unwrap_err();
        assert!(err.to_string().contains("template exploded"));
    }

    #[tokio::test]
    async fn unknown_target_is_rejected() {
        let mut builder = TaskGraphBuilder::new();
        builder.group(T::All, &[]).unwrap();
        let graph = builder.build().unwrap();

        assert!(matches!(
            graph.run_one(T::Clean).await,
            Err(RunError::Graph(GraphError::UnknownTask(T::Clean)))
        ));
    }
}
