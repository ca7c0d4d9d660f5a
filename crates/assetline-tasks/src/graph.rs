//! Task registration and graph validation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Identifier of a task in the graph.
///
/// Implemented automatically for any small copyable, ordered, printable type;
/// in practice a fieldless enum.
pub trait TaskKey:
    Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

impl<T> TaskKey for T where
    T: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

/// Error returned by a task action.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// The unit of work behind a task. Runs to completion on a blocking thread.
pub type TaskAction = Arc<dyn Fn() -> Result<(), TaskError> + Send + Sync>;

/// Errors raised while registering tasks or validating the graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError<K: TaskKey> {
    #[error("Task '{0}' is registered more than once")]
    Duplicate(K),

    #[error("Task '{task}' depends on unregistered task '{prerequisite}'")]
    UnknownPrerequisite { task: K, prerequisite: K },

    #[error("Dependency cycle detected: {}", render_cycle(.0))]
    Cycle(Vec<K>),

    #[error("Unknown task '{0}'")]
    UnknownTask(K),
}

fn render_cycle<K: TaskKey>(path: &[K]) -> String {
    path.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A registered task.
pub(crate) struct Task<K> {
    pub(crate) prerequisites: Vec<K>,
    pub(crate) action: Option<TaskAction>,
}

/// Collects task registrations before validation.
pub struct TaskGraphBuilder<K: TaskKey> {
    tasks: BTreeMap<K, Task<K>>,
}

impl<K: TaskKey> TaskGraphBuilder<K> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
        }
    }

    /// Register a task with an action.
    ///
    /// Prerequisites may name tasks registered later; they are checked by
    /// [`TaskGraphBuilder::build`].
    pub fn task<F>(&mut self, id: K, prerequisites: &[K], action: F) -> Result<(), GraphError<K>>
    where
        F: Fn() -> Result<(), TaskError> + Send + Sync + 'static,
    {
        self.insert(id, prerequisites, Some(Arc::new(action)))
    }

    /// Register a task without an action. It completes as soon as its
    /// prerequisites have.
    pub fn group(&mut self, id: K, prerequisites: &[K]) -> Result<(), GraphError<K>> {
        self.insert(id, prerequisites, None)
    }

    fn insert(
        &mut self,
        id: K,
        prerequisites: &[K],
        action: Option<TaskAction>,
    ) -> Result<(), GraphError<K>> {
        if self.tasks.contains_key(&id) {
            return Err(GraphError::Duplicate(id));
        }

        let mut deps: Vec<K> = Vec::with_capacity(prerequisites.len());
        for dep in prerequisites {
            if !deps.contains(dep) {
                deps.push(*dep);
            }
        }

        self.tasks.insert(
            id,
            Task {
                prerequisites: deps,
                action,
            },
        );
        Ok(())
    }

    /// Validate references and acyclicity, producing a runnable graph.
    pub fn build(self) -> Result<TaskGraph<K>, GraphError<K>> {
        for (id, task) in &self.tasks {
            for dep in &task.prerequisites {
                if !self.tasks.contains_key(dep) {
                    return Err(GraphError::UnknownPrerequisite {
                        task: *id,
                        prerequisite: *dep,
                    });
                }
            }
        }

        if let Some(cycle) = find_cycle(&self.tasks) {
            return Err(GraphError::Cycle(cycle));
        }

        Ok(TaskGraph { tasks: self.tasks })
    }
}

impl<K: TaskKey> Default for TaskGraphBuilder<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search for a back edge. Returns the cycle as a path that
/// starts and ends on the same task.
fn find_cycle<K: TaskKey>(tasks: &BTreeMap<K, Task<K>>) -> Option<Vec<K>> {
    fn visit<K: TaskKey>(
        id: K,
        tasks: &BTreeMap<K, Task<K>>,
        marks: &mut BTreeMap<K, Mark>,
        stack: &mut Vec<K>,
    ) -> Option<Vec<K>> {
        match marks.get(&id) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|k| *k == id).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(id);
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(id, Mark::Visiting);
        stack.push(id);

        if let Some(task) = tasks.get(&id) {
            for dep in &task.prerequisites {
                if let Some(cycle) = visit(*dep, tasks, marks, stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        marks.insert(id, Mark::Done);
        None
    }

    let mut marks = BTreeMap::new();
    let mut stack = Vec::new();
    for id in tasks.keys() {
        if let Some(cycle) = visit(*id, tasks, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

/// A validated, acyclic task graph.
pub struct TaskGraph<K: TaskKey> {
    pub(crate) tasks: BTreeMap<K, Task<K>>,
}

impl<K: TaskKey> TaskGraph<K> {
    /// Whether a task is registered.
    pub fn contains(&self, id: K) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Registered task identifiers in order.
    pub fn ids(&self) -> impl Iterator<Item = K> + '_ {
        self.tasks.keys().copied()
    }

    /// Direct prerequisites of a task.
    pub fn prerequisites(&self, id: K) -> Option<&[K]> {
        self.tasks.get(&id).map(|t| t.prerequisites.as_slice())
    }

    /// Whether a task is a group (has no action of its own).
    pub fn is_group(&self, id: K) -> bool {
        self.tasks.get(&id).is_some_and(|t| t.action.is_none())
    }

    /// The requested tasks plus everything they transitively depend on.
    pub fn closure(&self, targets: &[K]) -> Result<BTreeSet<K>, GraphError<K>> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<K> = Vec::new();

        for target in targets {
            if !self.contains(*target) {
                return Err(GraphError::UnknownTask(*target));
            }
            stack.push(*target);
        }

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(task) = self.tasks.get(&id) {
                stack.extend(task.prerequisites.iter().copied());
            }
        }

        Ok(seen)
    }

    /// The dependency closure of `targets` in a deterministic topological
    /// order: every task appears after all of its prerequisites.
    pub fn execution_plan(&self, targets: &[K]) -> Result<Vec<K>, GraphError<K>> {
        let included = self.closure(targets)?;

        let mut pending: BTreeMap<K, usize> = included
            .iter()
            .map(|id| (*id, self.tasks[id].prerequisites.len()))
            .collect();

        let mut ready: BTreeSet<K> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut ordered = Vec::with_capacity(included.len());
        while let Some(id) = ready.pop_first() {
            ordered.push(id);
            pending.remove(&id);
            for (other, count) in pending.iter_mut() {
                if self.tasks[other].prerequisites.contains(&id) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*other);
                    }
                }
            }
        }

        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    enum T {
        A,
        B,
        C,
        D,
    }

    impl fmt::Display for T {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let name = match self {
                T::A => "a",
                T::B => "b",
                T::C => "c",
                T::D => "d",
            };
            f.write_str(name)
        }
    }

    fn noop() -> Result<(), TaskError> {
        Ok(())
    }

    #[test]
    fn rejects_duplicate_registration() {
        let mut builder = TaskGraphBuilder::new();
        builder.task(T::A, &[], noop).unwrap();

        let err = builder.group(T::A, &[]).unwrap_err();
        assert!(matches!(err, GraphError::Duplicate(T::A)));
    }

    #[test]
    fn rejects_unknown_prerequisite() {
        let mut builder = TaskGraphBuilder::new();
        builder.task(T::A, &[T::B], noop).unwrap();

        match builder.build() {
            Err(GraphError::UnknownPrerequisite { task, prerequisite }) => {
                assert_eq!(task, T::A);
                assert_eq!(prerequisite, T::B);
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("graph with unknown prerequisite was accepted"),
        }
    }

    #[test]
    fn rejects_two_task_cycle() {
        let mut builder = TaskGraphBuilder::new();
        builder.task(T::A, &[T::B], noop).unwrap();
        builder.task(T::B, &[T::A], noop).unwrap();

        match builder.build() {
            Err(GraphError::Cycle(path)) => {
                assert_eq!(path, vec![T::A, T::B, T::A]);
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("cyclic graph was accepted"),
        }
    }

    #[test]
    fn cycle_error_names_the_path() {
        let mut builder = TaskGraphBuilder::new();
        builder.group(T::A, &[T::B]).unwrap();
        builder.group(T::B, &[T::C]).unwrap();
        builder.group(T::C, &[T::A]).unwrap();

        let err = builder.build().err().unwrap();
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> c -> a");
    }

    #[test]
    fn rejects_self_dependency() {
        let mut builder = TaskGraphBuilder::new();
        builder.task(T::D, &[T::D], noop).unwrap();

        assert!(matches!(builder.build(), Err(GraphError::Cycle(path)) if path == vec![T::D, T::D]));
    }

    #[test]
    fn plans_prerequisites_first() {
        let mut builder = TaskGraphBuilder::new();
        builder.task(T::D, &[T::B, T::C], noop).unwrap();
        builder.task(T::C, &[T::A], noop).unwrap();
        builder.task(T::B, &[T::A], noop).unwrap();
        builder.task(T::A, &[], noop).unwrap();
        let graph = builder.build().unwrap();

        assert_eq!(
            graph.execution_plan(&[T::D]).unwrap(),
            vec![T::A, T::B, T::C, T::D]
        );
        assert_eq!(graph.execution_plan(&[T::C]).unwrap(), vec![T::A, T::C]);
    }

    #[test]
    fn plan_rejects_unregistered_target() {
        let mut builder = TaskGraphBuilder::new();
        builder.task(T::A, &[], noop).unwrap();
        let graph = builder.build().unwrap();

        assert!(matches!(
            graph.execution_plan(&[T::B]),
            Err(GraphError::UnknownTask(T::B))
        ));
    }

    #[test]
    fn duplicate_prerequisites_collapse() {
        let mut builder = TaskGraphBuilder::new();
        builder.task(T::A, &[], noop).unwrap();
        builder.group(T::B, &[T::A, T::A]).unwrap();
        let graph = builder.build().unwrap();

        assert_eq!(graph.prerequisites(T::B), Some(&[T::A][..]));
        assert!(graph.is_group(T::B));
        assert!(!graph.is_group(T::A));
    }
}
