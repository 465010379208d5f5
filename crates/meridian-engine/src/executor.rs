use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use meridian_domain::{targets_conflict, targets_equal, StatusValue, Target, Thing};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::transition::{visited_contains, Transition};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

struct TaskResult {
    task: Transition,
    err: Option<EngineError>,
}

/// Parallel driver over the goal-driven transition engine. Owns the three
/// mutable collections the admission rule and commit logic reason about;
/// touched only from the single control task that calls `execute`.
pub struct Executor {
    running: Vec<Arc<dyn Thing>>,
    active_transitions: Vec<Transition>,
    constraints: Vec<Target>,
    simulate: bool,
    done_tx: mpsc::UnboundedSender<TaskResult>,
    done_rx: mpsc::UnboundedReceiver<TaskResult>,
}

impl Executor {
    pub fn new(simulate: bool) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Executor {
            running: Vec::new(),
            active_transitions: Vec::new(),
            constraints: Vec::new(),
            simulate,
            done_tx,
            done_rx,
        }
    }

    /// Drive `target` to completion, discovering and running whatever chain
    /// of transitions is necessary. Returns once the target is satisfied or
    /// an unrecoverable error occurs.
    pub async fn execute(&mut self, target: Target) -> Result<(), EngineError> {
        while !target.is_done().await {
            let candidate = self.find_transition(target.clone()).await?;

            if let Some(candidate) = candidate {
                self.run_task(candidate);
            } else if self.running.is_empty() {
                return Err(EngineError::Deadlocked);
            } else {
                let result = self.wait_for_any().await;
                if let Err(first_err) = self.finish_task(result).await {
                    self.drain().await;
                    return Err(first_err);
                }
            }
        }

        Ok(())
    }

    /// Best-effort: await completion of everything still running after a
    /// failure, logging (not panicking on) further failures. This softens
    /// the upstream behavior, which treats a second failure during drain as
    /// fatal to the whole process — inconsistent with this component's own
    /// "best-effort" framing (see DESIGN.md).
    async fn drain(&mut self) {
        while !self.running.is_empty() {
            let result = self.wait_for_any().await;
            if let Err(e) = self.finish_task(result).await {
                warn!(error = %e, "drain: a running action failed after the triggering failure; continuing drain");
            }
        }
    }

    /// Recursively resolves `target` into a single runnable transition, or
    /// `None` for "already satisfied" / "blocked, retry later". Used both as
    /// the top-level planner and, recursively, to resolve prerequisites —
    /// there is no separate "prerequisite-only" API.
    pub fn find_transition<'a>(
        &'a mut self,
        target: Target,
    ) -> BoxFuture<'a, Result<Option<Transition>, EngineError>> {
        Box::pin(async move {
            let mut visited: Vec<Box<dyn StatusValue>> = Vec::new();
            let chains = build_status_chains(
                target.thing.as_ref(),
                target.desired_status.as_ref(),
                target.match_exact,
                &mut visited,
            )
            .await?;

            if chains.is_empty() {
                // already satisfied — nothing to do.
                return Ok(None);
            }

            let mut chain = chains
                .into_iter()
                .min_by_key(|c| c.len())
                .expect("non-empty chains has a minimum");

            let current = target.thing.status().await;
            assert!(
                chain[0].equals(current.as_ref()),
                "planner invariant violated: chain does not start at entity's current status ({} vs {})",
                chain[0],
                current
            );

            chain.push(target.desired_status.clone_box());

            let to_status = chain[1].clone_box();

            let made = self.make_action(target, to_status).await?;

            match made {
                Some(t) if self.can_execute(&t) => Ok(Some(t)),
                _ => Ok(None),
            }
        })
    }

    fn make_action<'a>(
        &'a mut self,
        target: Target,
        to_status: Box<dyn StatusValue>,
    ) -> BoxFuture<'a, Result<Option<Transition>, EngineError>> {
        Box::pin(async move {
            let current = target.thing.status().await;
            let action = target.thing.get_action(current.as_ref(), to_status.as_ref()).await?;
            let prereqs = action.prerequisites()?;

            let mut all_prereqs_ready = true;

            for prereq in &prereqs {
                if prereq.is_done().await {
                    continue;
                }

                match self.find_transition(prereq.clone()).await? {
                    Some(sub) => return Ok(Some(sub)),
                    None => all_prereqs_ready = false,
                }
            }

            if !all_prereqs_ready {
                return Ok(None);
            }

            let from_status = target.thing.status().await;
            Ok(Some(Transition {
                target: Target::new(target.thing.clone(), to_status, target.match_exact),
                action,
                from_status,
                prerequisites: prereqs,
                started: Instant::now(),
            }))
        })
    }

    fn can_execute(&self, t: &Transition) -> bool {
        if t.action.is_exclusive() && !self.running.is_empty() {
            return false;
        }

        if self.running.iter().any(|r| r.equals(t.target.thing.as_ref())) {
            return false;
        }

        for prereq in &t.prerequisites {
            if self.constraints.iter().any(|c| targets_conflict(c, prereq)) {
                return false;
            }
        }

        true
    }

    fn run_task(&mut self, task: Transition) {
        self.running.push(task.target.thing.clone());
        self.constraints.extend(task.prerequisites.iter().cloned());

        if self.simulate {
            info!(transition = %task, "simulating");
        } else {
            info!(transition = %task, "starting");
        }

        let action = task.action.clone();
        let simulate = self.simulate;
        let tx = self.done_tx.clone();
        let from_status = task.from_status.clone_box();
        let target = task.target.clone();
        let prereqs_for_result = task.prerequisites.clone();

        tokio::spawn(async move {
            let err = if simulate {
                None
            } else {
                match action.apply().await {
                    Ok(()) => None,
                    Err(e) => Some(EngineError::from(e)),
                }
            };

            let result_task = Transition {
                target,
                action,
                from_status,
                prerequisites: prereqs_for_result,
                started: Instant::now(),
            };

            let _ = tx.send(TaskResult { task: result_task, err });
        });

        self.active_transitions.push(task);
    }

    async fn wait_for_any(&mut self) -> TaskResultOutcome {
        let sole_exclusive = self.active_transitions.len() == 1 && self.active_transitions[0].action.is_exclusive();

        if self.simulate || sole_exclusive {
            let result = self.done_rx.recv().await.expect("executor channel closed with tasks in flight");
            return TaskResultOutcome::from(result);
        }

        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        ticker.tick().await; // first tick fires immediately; skip it

        loop {
            tokio::select! {
                result = self.done_rx.recv() => {
                    let result = result.expect("executor channel closed with tasks in flight");
                    return TaskResultOutcome::from(result);
                }
                _ = ticker.tick() => {
                    for t in &self.active_transitions {
                        info!(transition = %t, elapsed = ?t.started.elapsed(), "running");
                    }
                }
            }
        }
    }

    async fn finish_task(&mut self, result: TaskResultOutcome) -> Result<(), EngineError> {
        let TaskResultOutcome { task, err } = result;

        let pos = self
            .running
            .iter()
            .position(|r| r.equals(task.target.thing.as_ref()))
            .unwrap_or_else(|| panic!("cannot find task {} in list of running tasks", task));
        self.running.remove(pos);

        let pos = self
            .active_transitions
            .iter()
            .position(|t| t.target.thing.equals(task.target.thing.as_ref()))
            .unwrap_or_else(|| panic!("cannot find transition {} in list of active transitions", task));
        let removed = self.active_transitions.remove(pos);

        for prereq in &removed.prerequisites {
            let pos = self
                .constraints
                .iter()
                .position(|c| targets_equal(c, prereq))
                .unwrap_or_else(|| panic!("cannot find constraint {} for completed task {}", prereq, task));
            self.constraints.remove(pos);
        }

        if let Some(err) = err {
            warn!(transition = %task, elapsed = ?task.started.elapsed(), error = %err, "failed");
            return Err(err);
        }

        let current = task.target.thing.status().await;
        if !current.equals(task.from_status.as_ref()) {
            panic!(
                "invariant violated: entity status changed outside the committing action ({} expected {})",
                current, task.from_status
            );
        }

        // A persistence failure here is not a programming error: the in-memory
        // status already reflects the action's success, but the write to disk
        // did not land. Treat it like any other action failure — the next run
        // reconciles against whatever actually made it to disk.
        match task.target.thing.set_status(task.target.desired_status.clone_box()).await {
            Ok(()) => {
                info!(transition = %task, elapsed = ?task.started.elapsed(), "committed");
                Ok(())
            }
            Err(e) => {
                let e = EngineError::from(e);
                warn!(transition = %task, error = %e, "status committed in memory but persistence failed");
                Err(e)
            }
        }
    }
}

/// `buildStatusChains` from the source system: recursively explores
/// `get_transitions(desired)` backward, using a visited set to break
/// cycles, collecting every terminating chain from the entity's current
/// status to `desired`.
fn build_status_chains<'a>(
    thing: &'a dyn Thing,
    desired: &'a dyn StatusValue,
    match_exact: bool,
    visited: &'a mut Vec<Box<dyn StatusValue>>,
) -> BoxFuture<'a, Result<Vec<Vec<Box<dyn StatusValue>>>, EngineError>> {
    Box::pin(async move {
        visited.push(desired.clone_box());

        let result = build_status_chains_inner(thing, desired, match_exact, visited).await;

        visited.pop();

        result
    })
}

async fn build_status_chains_inner(
    thing: &dyn Thing,
    desired: &dyn StatusValue,
    match_exact: bool,
    visited: &mut Vec<Box<dyn StatusValue>>,
) -> Result<Vec<Vec<Box<dyn StatusValue>>>, EngineError> {
    let current = thing.status().await;

    if Target::compare(current.as_ref(), desired, match_exact) {
        return Ok(Vec::new());
    }

    let predecessors = thing.get_transitions(desired)?;

    let mut chains: Vec<Vec<Box<dyn StatusValue>>> = Vec::new();

    for from in predecessors {
        if visited_contains(visited, from.as_ref()) {
            continue;
        }

        let sub_chains = build_status_chains(thing, from.as_ref(), match_exact, visited).await?;

        if sub_chains.is_empty() {
            chains.push(vec![from.clone_box()]);
        } else {
            for mut sub in sub_chains {
                sub.push(from.clone_box());
                chains.push(sub);
            }
        }
    }

    if chains.is_empty() {
        return Err(EngineError::NoChain {
            current: current.to_string(),
            desired: desired.to_string(),
        });
    }

    Ok(chains)
}

/// Newtype wrapper so `wait_for_any` can return owned data without exposing
/// the private `TaskResult` channel type across the module boundary.
struct TaskResultOutcome {
    task: Transition,
    err: Option<EngineError>,
}

impl From<TaskResult> for TaskResultOutcome {
    fn from(r: TaskResult) -> Self {
        TaskResultOutcome { task: r.task, err: r.err }
    }
}
