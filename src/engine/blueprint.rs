//! Compiled, validated form of a machine's configuration.
//!
//! The state tree is flattened into an arena in pre-order, so `NodeId`
//! order is declaration order and a node's descendants follow it
//! contiguously. Every function reference and transition target is resolved
//! here, once; the transition engine never looks anything up by name.
//!
//! Validation accumulates all problems with Stillwater's `Validation`
//! instead of stopping at the first one.

use crate::builder::state::TimerConfig;
use crate::builder::{ConfigError, ConfigErrors, Delay, Handler, StateConfig};
use crate::core::path::{matches_path, SEPARATOR};
use crate::core::{is_internal_name, Event, HandlerView, StateNode};
use crate::effects::{
    ActionFn, AsyncFn, ConditionFn, FnRef, Functions, Resolved, TimeFn, ValueFn,
};
use indexmap::IndexMap;
use std::time::Duration;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Name of the implicit root state.
pub const ROOT_NAME: &str = "root";

type Check = Validation<(), NonEmptyVec<ConfigError>>;

/// Index of a node in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeId(pub(crate) usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

pub(crate) struct CompiledHandler<D> {
    pub actions: Vec<Resolved<ActionFn<D>>>,
    pub target: Option<NodeId>,
    when: Vec<Resolved<ConditionFn<D>>>,
    when_any: Vec<Resolved<ConditionFn<D>>>,
    unless: Vec<Resolved<ConditionFn<D>>>,
}

impl<D> CompiledHandler<D> {
    /// Whether every guard of the handler is satisfied.
    pub fn guards_pass(&self, data: &D, event: &Event) -> bool {
        self.when.iter().all(|c| (c.func)(data, event))
            && (self.when_any.is_empty() || self.when_any.iter().any(|c| (c.func)(data, event)))
            && !self.unless.iter().any(|c| (c.func)(data, event))
    }
}

pub(crate) enum CompiledDelay<D> {
    Fixed(Duration),
    Computed(Resolved<TimeFn<D>>),
}

pub(crate) struct CompiledTimer<D> {
    pub delay: CompiledDelay<D>,
    pub repeat: bool,
    pub event: String,
}

pub(crate) struct CompiledTask<D> {
    pub task: Resolved<AsyncFn<D>>,
    pub resolve_event: String,
    pub reject_event: String,
}

pub(crate) struct NodeDef<D> {
    pub name: String,
    pub path: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub initial: Option<NodeId>,
    pub parallel: bool,
    pub depth: usize,
    pub on: IndexMap<String, Vec<CompiledHandler<D>>>,
    pub on_enter: Vec<CompiledHandler<D>>,
    pub on_exit: Vec<CompiledHandler<D>>,
    pub timers: Vec<CompiledTimer<D>>,
    pub task: Option<CompiledTask<D>>,
}

impl<D> NodeDef<D> {
    fn skeleton(name: String, path: String, parent: Option<NodeId>, depth: usize) -> Self {
        Self {
            name,
            path,
            parent,
            children: Vec::new(),
            initial: None,
            parallel: false,
            depth,
            on: IndexMap::new(),
            on_enter: Vec::new(),
            on_exit: Vec::new(),
            timers: Vec::new(),
            task: None,
        }
    }
}

pub(crate) struct Blueprint<D> {
    nodes: Vec<NodeDef<D>>,
    pub values: IndexMap<String, ValueFn<D>>,
}

impl<D> Blueprint<D> {
    /// Flatten and validate a configuration.
    pub fn compile(root: &StateConfig<D>, functions: &Functions<D>) -> Result<Self, ConfigErrors> {
        let mut checks: Vec<Check> = Vec::new();
        let mut nodes = Vec::new();
        let mut sources = Vec::new();

        layout(
            root,
            ROOT_NAME.to_string(),
            None,
            &mut nodes,
            &mut sources,
            &mut checks,
        );

        let mut blueprint = Self {
            nodes,
            values: functions.values.clone(),
        };

        for (index, config) in sources.into_iter().enumerate() {
            blueprint.compile_node(NodeId(index), config, functions, &mut checks);
        }

        match Validation::all_vec(checks) {
            Validation::Success(_) => Ok(blueprint),
            Validation::Failure(errors) => Err(ConfigErrors(errors.iter().cloned().collect())),
        }
    }

    pub fn node(&self, id: NodeId) -> &NodeDef<D> {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn ids(&self) -> impl DoubleEndedIterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// The node's ancestors from the root down to and including `id`.
    pub fn lineage(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// The child entered when `id` is entered without a more specific target.
    pub fn default_child(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        node.initial.or_else(|| node.children.first().copied())
    }

    /// Resolve a dotted pattern to a node, last depth-first match winning.
    pub fn resolve(&self, pattern: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .rposition(|node| matches_path(&node.path, pattern))
            .map(NodeId)
    }

    /// Build the immutable view of the tree for the given activity flags.
    pub fn view(&self, active: &[bool]) -> StateNode {
        self.view_node(NodeId::ROOT, active)
    }

    fn view_node(&self, id: NodeId, active: &[bool]) -> StateNode {
        let node = self.node(id);
        StateNode {
            name: node.name.clone(),
            path: node.path.clone(),
            active: active[id.0],
            parallel: node.parallel,
            initial: node.initial.map(|child| self.node(child).name.clone()),
            states: node
                .children
                .iter()
                .map(|&child| (self.node(child).name.clone(), self.view_node(child, active)))
                .collect(),
            on: node
                .on
                .iter()
                .filter(|(name, _)| !is_internal_name(name))
                .map(|(name, handlers)| {
                    let views = handlers.iter().map(|h| self.handler_view(h)).collect();
                    (name.clone(), views)
                })
                .collect(),
        }
    }

    fn handler_view(&self, handler: &CompiledHandler<D>) -> HandlerView {
        HandlerView {
            to: handler.target.map(|target| self.node(target).path.clone()),
            actions: handler.actions.iter().map(|a| a.label.clone()).collect(),
        }
    }

    fn compile_node(
        &mut self,
        id: NodeId,
        config: &StateConfig<D>,
        functions: &Functions<D>,
        checks: &mut Vec<Check>,
    ) {
        let path = self.nodes[id.0].path.clone();

        let mut on = IndexMap::new();
        for (event, handlers) in &config.on {
            if is_internal_name(event) {
                checks.push(Validation::fail(ConfigError::ReservedEventName {
                    event: event.clone(),
                    state: path.clone(),
                }));
                continue;
            }
            let compiled = self.compile_handlers(handlers, &path, functions, checks);
            on.insert(event.clone(), compiled);
        }

        let on_enter = self.compile_handlers(&config.on_enter, &path, functions, checks);

        for handler in &config.on_exit {
            if handler.target.is_some() {
                checks.push(Validation::fail(ConfigError::ExitTransition {
                    state: path.clone(),
                }));
            }
        }
        let on_exit = self.compile_handlers(&config.on_exit, &path, functions, checks);

        let mut timers = Vec::new();
        for (index, timer) in config.timers.iter().enumerate() {
            let event = format!("@after{path}#{index}");
            if let Some(compiled) = self.compile_timer(timer, &path, event.clone(), functions, checks)
            {
                timers.push(compiled);
                let handler = self.compile_handler(&timer.handler, &path, functions, checks);
                on.insert(event, handler.into_iter().collect());
            }
        }

        let task = match &config.task {
            Some(reference) => {
                let resolve_event = format!("@resolve{path}");
                let reject_event = format!("@reject{path}");
                let on_resolve = self.compile_handlers(&config.on_resolve, &path, functions, checks);
                let on_reject = self.compile_handlers(&config.on_reject, &path, functions, checks);
                on.insert(resolve_event.clone(), on_resolve);
                on.insert(reject_event.clone(), on_reject);
                record(functions.resolve_task(reference, &path), checks).map(|task| {
                    CompiledTask {
                        task,
                        resolve_event,
                        reject_event,
                    }
                })
            }
            None => {
                if !config.on_resolve.is_empty() || !config.on_reject.is_empty() {
                    checks.push(Validation::fail(ConfigError::OutcomeWithoutTask {
                        state: path.clone(),
                    }));
                }
                None
            }
        };

        let node = &mut self.nodes[id.0];
        node.on = on;
        node.on_enter = on_enter;
        node.on_exit = on_exit;
        node.timers = timers;
        node.task = task;
    }

    fn compile_handlers(
        &self,
        handlers: &[Handler<D>],
        path: &str,
        functions: &Functions<D>,
        checks: &mut Vec<Check>,
    ) -> Vec<CompiledHandler<D>> {
        handlers
            .iter()
            .filter_map(|handler| self.compile_handler(handler, path, functions, checks))
            .collect()
    }

    fn compile_handler(
        &self,
        handler: &Handler<D>,
        path: &str,
        functions: &Functions<D>,
        checks: &mut Vec<Check>,
    ) -> Option<CompiledHandler<D>> {
        let before = checks.len();

        let actions = collect(&handler.actions, checks, |r| functions.resolve_action(r, path));
        let when = collect(&handler.when, checks, |r| functions.resolve_condition(r, path));
        let when_any = collect(&handler.when_any, checks, |r| {
            functions.resolve_condition(r, path)
        });
        let unless = collect(&handler.unless, checks, |r| functions.resolve_condition(r, path));

        let target = match &handler.target {
            Some(pattern) => {
                let resolved = self.resolve(pattern).ok_or_else(|| ConfigError::UnknownTarget {
                    target: pattern.clone(),
                    state: path.to_string(),
                });
                Some(record(resolved, checks)?)
            }
            None => None,
        };

        let failed = checks[before..]
            .iter()
            .any(|check| matches!(check, Validation::Failure(_)));
        if failed {
            return None;
        }

        Some(CompiledHandler {
            actions,
            target,
            when,
            when_any,
            unless,
        })
    }

    fn compile_timer(
        &self,
        timer: &TimerConfig<D>,
        path: &str,
        event: String,
        functions: &Functions<D>,
        checks: &mut Vec<Check>,
    ) -> Option<CompiledTimer<D>> {
        let delay = match &timer.delay {
            Delay::Fixed(duration) => {
                if timer.repeat && duration.is_zero() {
                    checks.push(Validation::fail(ConfigError::ZeroInterval {
                        state: path.to_string(),
                    }));
                    return None;
                }
                CompiledDelay::Fixed(*duration)
            }
            Delay::Computed(reference) => {
                CompiledDelay::Computed(record(functions.resolve_delay(reference, path), checks)?)
            }
        };
        Some(CompiledTimer {
            delay,
            repeat: timer.repeat,
            event,
        })
    }
}

/// Record the outcome of a fallible step as a validation check.
fn record<T>(result: Result<T, ConfigError>, checks: &mut Vec<Check>) -> Option<T> {
    match result {
        Ok(value) => {
            checks.push(Validation::success(()));
            Some(value)
        }
        Err(err) => {
            checks.push(Validation::fail(err));
            None
        }
    }
}

fn collect<F, T>(
    references: &[FnRef<F>],
    checks: &mut Vec<Check>,
    resolve: impl Fn(&FnRef<F>) -> Result<T, ConfigError>,
) -> Vec<T> {
    references
        .iter()
        .filter_map(|reference| record(resolve(reference), checks))
        .collect()
}

/// Assign ids in pre-order and check the tree's shape.
fn layout<'a, D>(
    config: &'a StateConfig<D>,
    name: String,
    parent: Option<NodeId>,
    nodes: &mut Vec<NodeDef<D>>,
    sources: &mut Vec<&'a StateConfig<D>>,
    checks: &mut Vec<Check>,
) -> NodeId {
    let id = NodeId(nodes.len());
    let (path, depth) = match parent {
        Some(parent) => (
            format!("{}{SEPARATOR}{name}", nodes[parent.0].path),
            nodes[parent.0].depth + 1,
        ),
        None => (format!("{SEPARATOR}{name}"), 0),
    };
    let mut node = NodeDef::skeleton(name, path.clone(), parent, depth);
    node.parallel = config.parallel;
    nodes.push(node);
    sources.push(config);

    let mut seen: Vec<&str> = Vec::new();
    let mut children = Vec::new();
    for (child_name, child) in &config.states {
        if child_name.is_empty() || child_name.contains(SEPARATOR) {
            checks.push(Validation::fail(ConfigError::InvalidStateName {
                name: child_name.clone(),
                parent: path.clone(),
            }));
            continue;
        }
        if seen.contains(&child_name.as_str()) {
            checks.push(Validation::fail(ConfigError::DuplicateState {
                name: child_name.clone(),
                parent: path.clone(),
            }));
            continue;
        }
        seen.push(child_name);
        let child_id = layout(child, child_name.clone(), Some(id), nodes, sources, checks);
        children.push((child_name.as_str(), child_id));
    }

    if let Some(initial) = &config.initial {
        if config.parallel {
            checks.push(Validation::fail(ConfigError::InitialOnParallel { state: path }));
        } else if children.is_empty() {
            checks.push(Validation::fail(ConfigError::InitialWithoutChildren { state: path }));
        } else {
            match children.iter().find(|(name, _)| *name == initial.as_str()) {
                Some((_, child_id)) => nodes[id.0].initial = Some(*child_id),
                None => checks.push(Validation::fail(ConfigError::UnknownInitial {
                    initial: initial.clone(),
                    state: path,
                })),
            }
        }
    }

    nodes[id.0].children = children.into_iter().map(|(_, child_id)| child_id).collect();
    id
}
