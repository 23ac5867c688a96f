//! Event resolution and structural transitions.
//!
//! `Runtime` owns everything a transition touches: the data payload, the
//! activity flags of the arena, scheduled timers and started tasks. It knows
//! nothing about queues, snapshots or subscribers; the machine drives it one
//! event at a time.
//!
//! Resolution follows the bubbling rule: active nodes are visited deepest
//! first, the first one declaring handlers for the event owns it, and the
//! first of its handlers whose guards pass is applied.

use crate::core::Event;
use crate::effects::{ActionFn, Outbox, Resolved, TaskError};
use crate::engine::blueprint::{Blueprint, CompiledDelay, CompiledHandler, NodeId};
use crate::engine::error::MachineError;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use stillwater::effect::BoxedEffect;
use tracing::{debug, trace, warn};

/// Smallest interval a computed repeating delay is clamped to.
const MIN_REPEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Result of offering one event to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// No active node handles the event, or every guard failed.
    Ignored,
    /// A handler was applied by the given node.
    Accepted(NodeId),
}

#[derive(Debug, Clone)]
pub(crate) struct ScheduledTimer {
    seq: u64,
    owner: NodeId,
    deadline: Duration,
    interval: Option<Duration>,
    event: String,
}

/// A task started by entering a state, waiting to be settled.
///
/// `activation` identifies the visit that started it; once the owner exits,
/// even if it is entered again later, the outcome no longer applies.
pub(crate) struct PendingTask {
    pub owner: String,
    pub node: NodeId,
    pub activation: u64,
    pub effect: BoxedEffect<Value, TaskError, ()>,
    pub resolve_event: String,
    pub reject_event: String,
}

/// Structural state saved before applying a handler, restored if it fails.
struct Checkpoint {
    active: Vec<bool>,
    timers: Vec<ScheduledTimer>,
    timer_seq: u64,
    activations: Vec<u64>,
    tasks: usize,
}

pub(crate) struct Runtime<D> {
    pub blueprint: Arc<Blueprint<D>>,
    pub data: D,
    pub outbox: Outbox,
    pub tasks: VecDeque<PendingTask>,
    active: Vec<bool>,
    activations: Vec<u64>,
    timers: Vec<ScheduledTimer>,
    timer_seq: u64,
    clock: Duration,
    redirects: VecDeque<NodeId>,
    max_redirects: usize,
}

impl<D> Runtime<D> {
    pub fn new(blueprint: Arc<Blueprint<D>>, data: D, max_redirects: usize) -> Self {
        let active = vec![false; blueprint.len()];
        let activations = vec![0; blueprint.len()];
        Self {
            blueprint,
            data,
            outbox: Outbox::default(),
            tasks: VecDeque::new(),
            active,
            activations,
            timers: Vec::new(),
            timer_seq: 0,
            clock: Duration::ZERO,
            redirects: VecDeque::new(),
            max_redirects,
        }
    }

    pub fn active_flags(&self) -> &[bool] {
        &self.active
    }

    pub fn is_active(&self, id: NodeId) -> bool {
        self.active[id.index()]
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    /// Whether `node` is still in the visit numbered `activation`.
    pub fn is_current(&self, node: NodeId, activation: u64) -> bool {
        self.is_active(node) && self.activations[node.index()] == activation
    }

    /// Paths of active nodes with no active children, in pre-order.
    pub fn active_leaves(&self) -> Vec<String> {
        let blueprint = &self.blueprint;
        blueprint
            .ids()
            .filter(|&id| self.is_active(id))
            .filter(|&id| !blueprint.node(id).children.iter().any(|&c| self.is_active(c)))
            .map(|id| blueprint.node(id).path.clone())
            .collect()
    }

    /// Active nodes, deepest first. Nodes at equal depth keep pre-order.
    fn bubbling_order(&self) -> Vec<NodeId> {
        let mut order: Vec<NodeId> = self
            .blueprint
            .ids()
            .filter(|&id| self.is_active(id))
            .collect();
        order.sort_by_key(|&id| Reverse(self.blueprint.node(id).depth));
        order
    }

    /// Find the node that owns `event` and the handler it would apply.
    fn select<'b>(
        &self,
        blueprint: &'b Blueprint<D>,
        event: &Event,
    ) -> Option<(NodeId, Option<&'b CompiledHandler<D>>)> {
        let owner = self
            .bubbling_order()
            .into_iter()
            .find(|&id| blueprint.node(id).on.contains_key(&event.name))?;
        let handler = blueprint.node(owner).on[&event.name]
            .iter()
            .find(|handler| handler.guards_pass(&self.data, event));
        Some((owner, handler))
    }

    /// Whether `event` would be accepted right now.
    pub fn can_handle(&self, event: &Event) -> bool {
        let blueprint = Arc::clone(&self.blueprint);
        matches!(self.select(&blueprint, event), Some((_, Some(_))))
    }

    /// Enter the root and its initial descendants.
    pub fn start(&mut self, event: &Event) -> Result<(), MachineError> {
        self.enter_default(NodeId::ROOT, event)?;
        self.follow_redirects(event)
    }

    /// Resolve and apply one event.
    ///
    /// On failure the activity flags, timers and task list are restored;
    /// data mutations made before the failure are kept.
    pub fn dispatch(&mut self, event: &Event) -> Result<Outcome, MachineError> {
        let blueprint = Arc::clone(&self.blueprint);
        let Some((owner, handler)) = self.select(&blueprint, event) else {
            trace!(event = %event.name, "no active handler");
            return Ok(Outcome::Ignored);
        };
        let Some(handler) = handler else {
            trace!(
                event = %event.name,
                state = %blueprint.node(owner).path,
                "all guards failed"
            );
            return Ok(Outcome::Ignored);
        };

        debug!(
            event = %event.name,
            state = %blueprint.node(owner).path,
            "applying handler"
        );
        let checkpoint = self.checkpoint();
        match self.apply(handler, event) {
            Ok(()) => Ok(Outcome::Accepted(owner)),
            Err(err) => {
                self.restore(checkpoint);
                self.outbox.clear();
                Err(err)
            }
        }
    }

    fn apply(&mut self, handler: &CompiledHandler<D>, event: &Event) -> Result<(), MachineError> {
        self.run_actions(&handler.actions, event)?;
        if let Some(target) = handler.target {
            self.transition(target, event)?;
            self.follow_redirects(event)?;
        }
        Ok(())
    }

    fn run_actions(
        &mut self,
        actions: &[Resolved<ActionFn<D>>],
        event: &Event,
    ) -> Result<(), MachineError> {
        for action in actions {
            (action.func)(&mut self.data, event, &mut self.outbox).map_err(|source| {
                warn!(action = %action.label, event = %event.name, error = %source, "action failed");
                MachineError::ActionFailed {
                    action: action.label.clone(),
                    event: event.name.clone(),
                    source,
                }
            })?;
        }
        Ok(())
    }

    fn follow_redirects(&mut self, event: &Event) -> Result<(), MachineError> {
        let mut followed = 0;
        while let Some(target) = self.redirects.pop_front() {
            followed += 1;
            if followed > self.max_redirects {
                self.redirects.clear();
                return Err(MachineError::RedirectLimit {
                    limit: self.max_redirects,
                    event: event.name.clone(),
                });
            }
            self.transition(target, event)?;
        }
        Ok(())
    }

    /// Move to `target`: exit the branch it replaces, then enter down to it.
    fn transition(&mut self, target: NodeId, event: &Event) -> Result<(), MachineError> {
        let blueprint = Arc::clone(&self.blueprint);
        let lineage = blueprint.lineage(target);
        trace!(target = %blueprint.node(target).path, "transition");

        if self.is_active(target) {
            // Self-transition: leave and re-enter the target.
            self.exit_subtree(target, event)?;
            return self.enter_path(target, &[], event);
        }

        let Some(start) = lineage.iter().position(|&id| !self.is_active(id)) else {
            return Ok(());
        };
        if start > 0 {
            let parent = lineage[start - 1];
            if !blueprint.node(parent).parallel {
                for &child in &blueprint.node(parent).children {
                    if self.is_active(child) {
                        self.exit_subtree(child, event)?;
                    }
                }
            }
        }
        self.enter_path(lineage[start], &lineage[start + 1..], event)
    }

    /// Enter `node`, then continue along `rest` towards the target.
    fn enter_path(&mut self, node: NodeId, rest: &[NodeId], event: &Event) -> Result<(), MachineError> {
        self.activate(node, event)?;
        let Some((&next, tail)) = rest.split_first() else {
            return self.enter_descendants(node, event);
        };

        let blueprint = Arc::clone(&self.blueprint);
        if blueprint.node(node).parallel {
            for &child in &blueprint.node(node).children {
                if child == next {
                    self.enter_path(child, tail, event)?;
                } else if !self.is_active(child) {
                    self.enter_default(child, event)?;
                }
            }
            Ok(())
        } else {
            self.enter_path(next, tail, event)
        }
    }

    fn enter_default(&mut self, node: NodeId, event: &Event) -> Result<(), MachineError> {
        self.activate(node, event)?;
        self.enter_descendants(node, event)
    }

    fn enter_descendants(&mut self, node: NodeId, event: &Event) -> Result<(), MachineError> {
        let blueprint = Arc::clone(&self.blueprint);
        let def = blueprint.node(node);
        if def.parallel {
            for &child in &def.children {
                self.enter_default(child, event)?;
            }
        } else if let Some(child) = blueprint.default_child(node) {
            self.enter_default(child, event)?;
        }
        Ok(())
    }

    /// Exit the active descendants of `node` deepest first, then `node` itself.
    fn exit_subtree(&mut self, node: NodeId, event: &Event) -> Result<(), MachineError> {
        let blueprint = Arc::clone(&self.blueprint);
        for &child in &blueprint.node(node).children {
            if self.is_active(child) {
                self.exit_subtree(child, event)?;
            }
        }
        self.deactivate(node, event)
    }

    fn activate(&mut self, node: NodeId, event: &Event) -> Result<(), MachineError> {
        let blueprint = Arc::clone(&self.blueprint);
        let def = blueprint.node(node);
        self.active[node.index()] = true;
        self.activations[node.index()] += 1;
        trace!(state = %def.path, "enter");

        for timer in &def.timers {
            let delay = match &timer.delay {
                CompiledDelay::Fixed(duration) => *duration,
                CompiledDelay::Computed(time) => (time.func)(&self.data),
            };
            let interval = timer.repeat.then(|| {
                if delay.is_zero() {
                    warn!(state = %def.path, "zero repeat interval, clamping");
                    MIN_REPEAT_INTERVAL
                } else {
                    delay
                }
            });
            self.timer_seq += 1;
            self.timers.push(ScheduledTimer {
                seq: self.timer_seq,
                owner: node,
                deadline: self.clock + interval.unwrap_or(delay),
                interval,
                event: timer.event.clone(),
            });
        }

        if let Some(task) = &def.task {
            debug!(state = %def.path, task = %task.task.label, "starting task");
            self.tasks.push_back(PendingTask {
                owner: def.path.clone(),
                node,
                activation: self.activations[node.index()],
                effect: (task.task.func)(&self.data, event),
                resolve_event: task.resolve_event.clone(),
                reject_event: task.reject_event.clone(),
            });
        }

        if let Some(handler) = def.on_enter.iter().find(|h| h.guards_pass(&self.data, event)) {
            self.run_actions(&handler.actions, event)?;
            if let Some(target) = handler.target {
                self.redirects.push_back(target);
            }
        }
        Ok(())
    }

    fn deactivate(&mut self, node: NodeId, event: &Event) -> Result<(), MachineError> {
        let blueprint = Arc::clone(&self.blueprint);
        let def = blueprint.node(node);
        trace!(state = %def.path, "exit");

        if let Some(handler) = def.on_exit.iter().find(|h| h.guards_pass(&self.data, event)) {
            self.run_actions(&handler.actions, event)?;
        }
        self.timers.retain(|timer| timer.owner != node);
        self.active[node.index()] = false;
        Ok(())
    }

    /// Deadline of the earliest scheduled timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.iter().map(|timer| timer.deadline).min()
    }

    /// Pop the earliest timer due at or before `until`, moving the clock to it.
    ///
    /// Repeating timers are rescheduled one interval later.
    pub fn pop_due_timer(&mut self, until: Duration) -> Option<Event> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.deadline <= until)
            .min_by_key(|(_, timer)| (timer.deadline, timer.seq))
            .map(|(index, _)| index)?;

        let timer = self.timers.remove(index);
        self.clock = self.clock.max(timer.deadline);
        if let Some(interval) = timer.interval {
            self.timer_seq += 1;
            self.timers.push(ScheduledTimer {
                seq: self.timer_seq,
                deadline: timer.deadline + interval,
                ..timer.clone()
            });
        }
        Some(Event::named(timer.event))
    }

    pub fn set_clock(&mut self, clock: Duration) {
        self.clock = self.clock.max(clock);
    }

    pub fn scheduled_timers(&self) -> usize {
        self.timers.len()
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            active: self.active.clone(),
            timers: self.timers.clone(),
            timer_seq: self.timer_seq,
            activations: self.activations.clone(),
            tasks: self.tasks.len(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.active = checkpoint.active;
        self.timers = checkpoint.timers;
        self.timer_seq = checkpoint.timer_seq;
        self.activations = checkpoint.activations;
        self.tasks.truncate(checkpoint.tasks);
        self.redirects.clear();
    }
}
