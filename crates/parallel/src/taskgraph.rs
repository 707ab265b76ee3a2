//! Dependency-scheduled task graph
//!
//! Tasks declare the files they write (targets), the tasks they depend on,
//! and optionally the external files they read and a fingerprint of their
//! arguments. [`TaskGraph::join`] runs the graph in dependency waves: every
//! task of a wave has all of its dependencies in earlier waves, so the tasks
//! of one wave run concurrently under the graph's [`ProcessingMode`].
//!
//! With a working directory, each completed task leaves a JSON token. On a
//! later run a task is skipped when its targets all exist, none of its
//! dependencies ran, and its token matches the current fingerprint and
//! input stamps.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

use greenaccess_core::{Error, Result};

use crate::strategy::{ParallelStrategy, ProcessingMode};

type TaskFn = Box<dyn FnOnce() -> Result<()> + Send>;

/// Handle to a task added to a [`TaskGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

/// A unit of work and its declared file effects
pub struct Task {
    name: String,
    func: TaskFn,
    targets: Vec<PathBuf>,
    inputs: Vec<PathBuf>,
    dependencies: Vec<TaskId>,
    fingerprint: Value,
}

impl Task {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
            targets: Vec::new(),
            inputs: Vec::new(),
            dependencies: Vec::new(),
            fingerprint: Value::Null,
        }
    }

    /// Files this task writes
    pub fn targets<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.targets.extend(paths.into_iter().map(Into::into));
        self
    }

    /// External files this task reads; their size and mtime are recorded
    pub fn inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.inputs.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn depends_on(mut self, deps: &[TaskId]) -> Self {
        self.dependencies.extend_from_slice(deps);
        self
    }

    /// Arguments that change the task's output
    pub fn fingerprint(mut self, value: Value) -> Self {
        self.fingerprint = value;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("targets", &self.targets)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FileStamp {
    path: PathBuf,
    len: u64,
    modified_secs: u64,
    modified_nanos: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TaskToken {
    name: String,
    targets: Vec<PathBuf>,
    fingerprint: Value,
    inputs: Vec<Option<FileStamp>>,
}

fn stamp(path: &Path) -> Option<FileStamp> {
    let meta = fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
    Some(FileStamp {
        path: path.to_path_buf(),
        len: meta.len(),
        modified_secs: modified.as_secs(),
        modified_nanos: modified.subsec_nanos(),
    })
}

/// Names and outcome of every task after [`TaskGraph::join`]
#[derive(Debug, Default, Clone)]
pub struct TaskReport {
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
}

/// A graph of tasks keyed by their output paths
pub struct TaskGraph {
    work_dir: Option<PathBuf>,
    mode: ProcessingMode,
    tasks: Vec<Task>,
    claimed: HashMap<PathBuf, String>,
    names: HashSet<String>,
}

impl TaskGraph {
    /// Create a graph that caches completion tokens in `work_dir`
    pub fn new(work_dir: impl Into<PathBuf>, mode: ProcessingMode) -> Result<Self> {
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir)?;
        Ok(Self {
            work_dir: Some(work_dir),
            ..Self::without_cache(mode)
        })
    }

    /// Create a graph that always runs every task
    pub fn without_cache(mode: ProcessingMode) -> Self {
        Self {
            work_dir: None,
            mode,
            tasks: Vec::new(),
            claimed: HashMap::new(),
            names: HashSet::new(),
        }
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Add a task. Dependencies must already be in the graph, the name must
    /// be unique and no target may be claimed by another task.
    pub fn add_task(&mut self, task: Task) -> Result<TaskId> {
        let id = TaskId(self.tasks.len());
        if self.names.contains(&task.name) {
            return Err(Error::InvalidParameter {
                name: "task",
                value: task.name,
                reason: "a task with this name was already added".into(),
            });
        }
        if let Some(dep) = task.dependencies.iter().find(|d| d.0 >= id.0) {
            return Err(Error::InvalidParameter {
                name: "task",
                value: task.name.clone(),
                reason: format!("depends on unknown task #{}", dep.0),
            });
        }
        for target in &task.targets {
            if let Some(owner) = self.claimed.get(target) {
                return Err(Error::InvalidParameter {
                    name: "task",
                    value: task.name.clone(),
                    reason: format!("{} is already written by '{}'", target.display(), owner),
                });
            }
        }

        for target in &task.targets {
            self.claimed.insert(target.clone(), task.name.clone());
        }
        self.names.insert(task.name.clone());
        debug!("added task '{}' with {} target(s)", task.name, task.targets.len());
        self.tasks.push(task);
        Ok(id)
    }

    /// Run every task and wait for the graph to finish.
    ///
    /// The first failing task in a wave aborts the run; tasks of later waves
    /// are not started.
    pub fn join(self) -> Result<TaskReport> {
        let TaskGraph {
            work_dir,
            mode,
            tasks,
            ..
        } = self;

        let mut level = vec![0usize; tasks.len()];
        for (i, task) in tasks.iter().enumerate() {
            level[i] = task
                .dependencies
                .iter()
                .map(|d| level[d.0] + 1)
                .max()
                .unwrap_or(0);
        }
        let n_waves = level.iter().max().map_or(0, |m| m + 1);

        let mut slots: Vec<Option<Task>> = tasks.into_iter().map(Some).collect();
        let mut ran = vec![false; slots.len()];
        let mut report = TaskReport::default();

        for wave in 0..n_waves {
            let mut batch = Vec::new();
            for i in (0..slots.len()).filter(|&i| level[i] == wave) {
                let Some(task) = slots[i].take() else { continue };
                let token = TaskToken {
                    name: task.name.clone(),
                    targets: task.targets.clone(),
                    fingerprint: task.fingerprint.clone(),
                    inputs: task.inputs.iter().map(|p| stamp(p)).collect(),
                };
                let deps_ran = task.dependencies.iter().any(|d| ran[d.0]);
                let token_path = work_dir.as_deref().map(|d| token_path(d, &task.name));

                if !deps_ran && is_up_to_date(&task, &token, token_path.as_deref()) {
                    debug!("skipping up-to-date task '{}'", task.name);
                    report.skipped.push(task.name);
                    continue;
                }
                ran[i] = true;
                batch.push((task, token, token_path));
            }

            if batch.is_empty() {
                continue;
            }
            debug!("running wave {} with {} task(s)", wave, batch.len());

            let results = mode.par_map(batch, |(task, token, token_path)| {
                info!("running task '{}'", task.name);
                let name = task.name;
                let outcome = (task.func)().and_then(|()| match &token_path {
                    Some(path) => write_token(path, &token),
                    None => Ok(()),
                });
                (name, outcome)
            });

            for (name, outcome) in results {
                match outcome {
                    Ok(()) => report.executed.push(name),
                    Err(source) => {
                        return Err(Error::Task {
                            task: name,
                            source: Box::new(source),
                        })
                    }
                }
            }
        }

        Ok(report)
    }
}

fn token_path(work_dir: &Path, name: &str) -> PathBuf {
    let file: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    work_dir.join(format!("{}.json", file))
}

fn is_up_to_date(task: &Task, token: &TaskToken, token_path: Option<&Path>) -> bool {
    let Some(token_path) = token_path else {
        return false;
    };
    if task.targets.is_empty() || !task.targets.iter().all(|t| t.exists()) {
        return false;
    }
    fs::read(token_path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<TaskToken>(&bytes).ok())
        .is_some_and(|previous| &previous == token)
}

fn write_token(path: &Path, token: &TaskToken) -> Result<()> {
    fs::write(path, serde_json::to_vec_pretty(token)?)?;
    Ok(())
}
