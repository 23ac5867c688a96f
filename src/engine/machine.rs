//! Machine instances: the event queue, commits and subscriber delivery.

use crate::builder::Config;
use crate::core::{Event, StateNode, TransitionHistory, TransitionRecord, INIT_EVENT};
use crate::engine::blueprint::Blueprint;
use crate::engine::error::MachineError;
use crate::engine::snapshot::{MachineId, Snapshot};
use crate::engine::subscription::{Subscribers, Subscription};
use crate::engine::transition::{Outcome, Runtime};
use crate::effects::ValueFn;
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use stillwater::effect::Effect;
use tracing::{debug, info, info_span, trace, warn};

/// Build a machine from a configuration.
///
/// The configuration is validated as a whole; every problem found is
/// reported in one [`MachineError::Config`]. The root's initial states are
/// then entered, running their `on_enter` handlers.
///
/// # Example
///
/// ```rust
/// use statecraft::builder::{Config, Handler, StateConfig};
/// use statecraft::engine::create_machine;
/// use serde_json::Value;
///
/// let config = Config::new(())
///     .initial("idle")
///     .state("idle", StateConfig::new().on("GO", Handler::goto("running")))
///     .state("running", StateConfig::new().on("STOP", Handler::goto("idle")));
///
/// let mut machine = create_machine(config).unwrap();
/// assert_eq!(&machine.active()[..], [".root.idle".to_string()]);
///
/// machine.send("GO", Value::Null).unwrap();
/// assert_eq!(&machine.active()[..], [".root.running".to_string()]);
///
/// // No handler for GO while running: nothing happens.
/// assert!(machine.send("GO", Value::Null).unwrap().is_none());
/// ```
pub fn create_machine<D>(config: Config<D>) -> Result<Machine<D>, MachineError>
where
    D: Clone + Send + Sync + 'static,
{
    Machine::new(config)
}

/// Accumulates the result of draining the queue.
struct Progress<D> {
    last: Option<Snapshot<D>>,
    error: Option<MachineError>,
}

impl<D> Progress<D> {
    fn new() -> Self {
        Self {
            last: None,
            error: None,
        }
    }

    fn finish(self) -> Result<Option<Snapshot<D>>, MachineError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.last),
        }
    }
}

/// One running instance of a configured hierarchical state machine.
///
/// `send` is the only way to change a machine. Events are processed one at a
/// time, in the order they were queued; events sent by actions are queued
/// behind the event being processed. After each accepted event the machine
/// commits a new [`Snapshot`] and hands it to every subscriber before `send`
/// returns.
pub struct Machine<D> {
    id: MachineId,
    runtime: Runtime<D>,
    queue: VecDeque<Event>,
    current: Snapshot<D>,
    subscribers: Subscribers<D>,
    history: TransitionHistory,
    values: Arc<IndexMap<String, ValueFn<D>>>,
}

impl<D> Machine<D>
where
    D: Clone + Send + Sync + 'static,
{
    pub fn new(config: Config<D>) -> Result<Self, MachineError> {
        let id = MachineId::new();
        let span = info_span!("machine", id = %id);
        let entered = span.enter();

        let blueprint = Blueprint::compile(&config.root, &config.functions).map_err(|errors| {
            warn!(errors = errors.len(), "invalid machine configuration");
            MachineError::Config(errors)
        })?;
        let blueprint = Arc::new(blueprint);
        let values = Arc::new(blueprint.values.clone());

        let mut runtime = Runtime::new(
            Arc::clone(&blueprint),
            config.data,
            config.options.max_redirects,
        );
        runtime.start(&Event::named(INIT_EVENT))?;

        let current = Snapshot::new(
            id,
            0,
            None,
            Arc::new(runtime.data.clone()),
            runtime.active_leaves(),
            blueprint.view(runtime.active_flags()),
            Arc::clone(&values),
        );
        info!(states = blueprint.len(), active = ?current.active(), "machine created");

        let mut queue = VecDeque::new();
        queue.extend(runtime.outbox.take());

        let mut machine = Self {
            id,
            runtime,
            queue,
            current,
            subscribers: Subscribers::new(),
            history: TransitionHistory::with_limit(config.options.history_limit),
            values,
        };
        drop(entered);

        machine.drain()?;
        Ok(machine)
    }

    pub fn id(&self) -> MachineId {
        self.id
    }

    /// Queue an event and process the queue until it is empty.
    ///
    /// Returns the last snapshot committed while draining, or `None` if no
    /// queued event was accepted. If an action fails, the rest of the queue
    /// is still processed and the first failure is returned.
    ///
    /// Names starting with `@` are reserved for timers and task outcomes and
    /// fail with [`MachineError::ReservedEvent`] without being queued.
    pub fn send(
        &mut self,
        name: impl Into<String>,
        payload: Value,
    ) -> Result<Option<Snapshot<D>>, MachineError> {
        self.send_event(Event::new(name, payload))
    }

    /// Send a prepared event record.
    pub fn send_event(&mut self, event: Event) -> Result<Option<Snapshot<D>>, MachineError> {
        if event.is_internal() {
            warn!(machine = %self.id, event = %event.name, "rejected reserved event name");
            return Err(MachineError::ReservedEvent { event: event.name });
        }
        self.queue.push_back(event);
        self.drain()
    }

    /// Register a callback for every committed snapshot.
    pub fn on_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Snapshot<D>) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// The last committed snapshot.
    pub fn snapshot(&self) -> &Snapshot<D> {
        &self.current
    }

    pub fn data(&self) -> &Arc<D> {
        self.current.data()
    }

    pub fn active(&self) -> &Arc<[String]> {
        self.current.active()
    }

    pub fn state_tree(&self) -> &Arc<StateNode> {
        self.current.state_tree()
    }

    pub fn is_in(&self, pattern: &str) -> bool {
        self.current.is_in(pattern)
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        self.current.value(name)
    }

    /// Whether an event with this name and payload would be accepted now.
    pub fn can(&self, name: &str, payload: Value) -> bool {
        self.runtime.can_handle(&Event::new(name, payload))
    }

    pub fn history(&self) -> &TransitionHistory {
        &self.history
    }

    /// Time elapsed on the machine's timer clock.
    pub fn clock(&self) -> Duration {
        self.runtime.clock()
    }

    /// Clock time at which the next timer fires, if any is scheduled.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.runtime.next_deadline()
    }

    pub fn scheduled_timers(&self) -> usize {
        self.runtime.scheduled_timers()
    }

    /// Number of started tasks not yet settled.
    pub fn pending_tasks(&self) -> usize {
        self.runtime.tasks.len()
    }

    /// Advance the timer clock by `by`, firing due timers in deadline order.
    ///
    /// Each timer becomes an ordinary queued event and is fully processed,
    /// along with anything it sends, before the next timer fires.
    pub fn advance(&mut self, by: Duration) -> Result<Option<Snapshot<D>>, MachineError> {
        let until = self.runtime.clock() + by;
        let mut progress = Progress::new();
        while let Some(event) = self.runtime.pop_due_timer(until) {
            self.queue.push_back(event);
            self.drain_into(&mut progress);
        }
        self.runtime.set_clock(until);
        progress.finish()
    }

    /// Run started tasks to completion, one at a time in start order.
    ///
    /// Each outcome re-enters the machine as an event: the resolved value as
    /// the payload of a resolve event, or the error message as the payload
    /// of a reject event. Tasks started while settling are settled too.
    /// A task whose state has exited since it started is dropped unrun,
    /// even if that state has been entered again.
    pub async fn settle(&mut self) -> Result<Option<Snapshot<D>>, MachineError> {
        let mut progress = Progress::new();
        while let Some(task) = self.runtime.tasks.pop_front() {
            if !self.runtime.is_current(task.node, task.activation) {
                trace!(machine = %self.id, state = %task.owner, "dropping stale task");
                continue;
            }
            let event = match task.effect.run(&()).await {
                Ok(value) => {
                    debug!(machine = %self.id, state = %task.owner, "task resolved");
                    Event::new(task.resolve_event, value)
                }
                Err(err) => {
                    warn!(machine = %self.id, state = %task.owner, error = %err, "task rejected");
                    Event::new(task.reject_event, Value::String(err.to_string()))
                }
            };
            self.queue.push_back(event);
            self.drain_into(&mut progress);
        }
        progress.finish()
    }

    fn drain(&mut self) -> Result<Option<Snapshot<D>>, MachineError> {
        let mut progress = Progress::new();
        self.drain_into(&mut progress);
        progress.finish()
    }

    fn drain_into(&mut self, progress: &mut Progress<D>) {
        while let Some(event) = self.queue.pop_front() {
            match self.process(event) {
                Ok(Some(snapshot)) => progress.last = Some(snapshot),
                Ok(None) => {}
                Err(err) => {
                    progress.error.get_or_insert(err);
                }
            }
        }
    }

    fn process(&mut self, event: Event) -> Result<Option<Snapshot<D>>, MachineError> {
        let span = info_span!("machine", id = %self.id, event = %event.name);
        let _guard = span.enter();

        match self.runtime.dispatch(&event)? {
            Outcome::Ignored => Ok(None),
            Outcome::Accepted(_) => {
                self.queue.extend(self.runtime.outbox.take());
                Ok(Some(self.commit(event)))
            }
        }
    }

    /// Publish the runtime's state as a new snapshot and notify subscribers.
    fn commit(&mut self, event: Event) -> Snapshot<D> {
        let revision = self.current.revision() + 1;
        let active = self.runtime.active_leaves();
        let snapshot = Snapshot::new(
            self.id,
            revision,
            Some(event.name.clone()),
            Arc::new(self.runtime.data.clone()),
            active.clone(),
            self.runtime.blueprint.view(self.runtime.active_flags()),
            Arc::clone(&self.values),
        );

        self.history = self.history.record(TransitionRecord {
            event: event.name,
            from: self.current.active().to_vec(),
            to: active,
            timestamp: Utc::now(),
            revision,
        });
        debug!(revision, active = ?snapshot.active(), "committed");

        self.current = snapshot.clone();
        self.subscribers.notify(&snapshot);
        snapshot
    }
}

impl<D> std::fmt::Debug for Machine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.id)
            .field("revision", &self.current.revision())
            .field("active", &self.current.active())
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Handler, StateConfig};
    use crate::effects::{ActionError, TaskError};
    use serde_json::json;
    use std::sync::Mutex;
    use stillwater::prelude::*;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Log {
        entries: Vec<String>,
    }

    fn toggle() -> Config<Log> {
        Config::new(Log::default())
            .initial("idle")
            .state("idle", StateConfig::new().on("GO", Handler::goto("running")))
            .state("running", StateConfig::new().on("STOP", Handler::goto("idle")))
    }

    #[test]
    fn initial_snapshot_is_revision_zero() {
        let machine = create_machine(toggle()).unwrap();
        assert_eq!(machine.snapshot().revision(), 0);
        assert_eq!(machine.snapshot().event(), None);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn accepted_event_commits_new_snapshot_and_history() {
        let mut machine = create_machine(toggle()).unwrap();
        let snapshot = machine.send("GO", Value::Null).unwrap().unwrap();

        assert_eq!(snapshot.revision(), 1);
        assert_eq!(snapshot.event(), Some("GO"));
        let record = &machine.history().records()[0];
        assert_eq!(record.from, vec![".root.idle"]);
        assert_eq!(record.to, vec![".root.running"]);
    }

    #[test]
    fn subscribers_receive_snapshots_until_cancelled() {
        let mut machine = create_machine(toggle()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = machine.on_update(move |snapshot: &Snapshot<Log>| {
            sink.lock().unwrap().push(snapshot.active().to_vec());
        });

        machine.send("GO", Value::Null).unwrap();
        machine.send("STOP", Value::Null).unwrap();
        subscription.cancel();
        machine.send("GO", Value::Null).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![vec![".root.running".to_string()], vec![".root.idle".to_string()]]
        );
        assert_eq!(machine.subscriber_count(), 0);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let machine = create_machine(toggle()).unwrap();
        {
            let _subscription = machine.on_update(|_| {});
            assert_eq!(machine.subscriber_count(), 1);
        }
        assert_eq!(machine.subscriber_count(), 0);

        machine.on_update(|_| {}).detach();
        assert_eq!(machine.subscriber_count(), 1);
    }

    #[test]
    fn reentrant_send_runs_after_commit() {
        let config = Config::new(Log::default())
            .state(
                "a",
                StateConfig::new().on(
                    "A",
                    Handler::new()
                        .act_with(|log: &mut Log, _, outbox| {
                            log.entries.push("A action".to_string());
                            outbox.signal("B");
                            Ok(())
                        })
                        .act_fn(|log: &mut Log, _| log.entries.push("A after send".to_string()))
                        .to("b"),
                ),
            )
            .state(
                "b",
                StateConfig::new()
                    .on_enter(Handler::new().act_fn(|log: &mut Log, _| {
                        log.entries.push("enter b".to_string())
                    }))
                    .on("B", Handler::new().act_fn(|log: &mut Log, _| {
                        log.entries.push("B action".to_string())
                    })),
            );
        let mut machine = create_machine(config).unwrap();
        let revisions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&revisions);
        machine
            .on_update(move |s: &Snapshot<Log>| {
                sink.lock().unwrap().push((s.event().map(str::to_string), s.data().entries.len()))
            })
            .detach();

        machine.send("A", Value::Null).unwrap();

        assert_eq!(
            machine.data().entries,
            vec!["A action", "A after send", "enter b", "B action"]
        );
        assert_eq!(
            *revisions.lock().unwrap(),
            vec![(Some("A".to_string()), 3), (Some("B".to_string()), 4)]
        );
    }

    #[test]
    fn failed_action_emits_nothing_but_queue_keeps_draining() {
        let config = Config::new(Log::default())
            .on(
                "FAIL",
                Handler::new().act_with(|log: &mut Log, _, outbox| {
                    log.entries.push("partial".to_string());
                    outbox.signal("DROPPED");
                    Err(ActionError::failed("nope"))
                }),
            )
            .on("DROPPED", Handler::new().act_fn(|log: &mut Log, _| {
                log.entries.push("dropped ran".to_string())
            }));
        let mut machine = create_machine(config).unwrap();
        let before = Arc::clone(machine.state_tree());

        let err = machine.send("FAIL", Value::Null).unwrap_err();

        assert!(matches!(err, MachineError::ActionFailed { ref action, .. } if action == "<inline>"));
        assert!(Arc::ptr_eq(&before, machine.state_tree()));
        assert_eq!(machine.snapshot().revision(), 0);
        assert!(machine.runtime.data.entries.contains(&"partial".to_string()));
        assert!(!machine.runtime.data.entries.contains(&"dropped ran".to_string()));
    }

    #[test]
    fn on_enter_sends_at_creation_are_processed() {
        let config = Config::new(Log::default())
            .on_enter(Handler::new().act_with(|_: &mut Log, _, outbox| {
                outbox.signal("READY");
                Ok(())
            }))
            .state("booting", StateConfig::new().on("READY", Handler::goto("ready")))
            .state("ready", StateConfig::new());

        let machine = create_machine(config).unwrap();
        assert_eq!(&machine.active()[..], [".root.ready".to_string()]);
        assert_eq!(machine.snapshot().revision(), 1);
    }

    #[test]
    fn can_reports_without_applying() {
        let machine = create_machine(toggle()).unwrap();
        assert!(machine.can("GO", Value::Null));
        assert!(!machine.can("STOP", Value::Null));
        assert_eq!(machine.snapshot().revision(), 0);
    }

    #[test]
    fn timer_is_cancelled_when_owner_exits() {
        let config = Config::new(Log::default())
            .state(
                "waiting",
                StateConfig::new()
                    .on("CANCEL", Handler::goto("cancelled"))
                    .after(Duration::from_secs(1), Handler::goto("expired")),
            )
            .state("cancelled", StateConfig::new())
            .state("expired", StateConfig::new());
        let mut machine = create_machine(config).unwrap();
        assert_eq!(machine.scheduled_timers(), 1);

        machine.send("CANCEL", Value::Null).unwrap();
        assert_eq!(machine.scheduled_timers(), 0);
        assert!(machine.advance(Duration::from_secs(5)).unwrap().is_none());
        assert!(machine.is_in("cancelled"));
        assert_eq!(machine.clock(), Duration::from_secs(5));
    }

    #[test]
    fn computed_delay_reads_data() {
        let config = Config::new(Log::default())
            .time("backoff", |log: &Log| Duration::from_millis(10 * (log.entries.len() as u64 + 1)))
            .state("waiting", StateConfig::new().after("backoff", Handler::goto("done")))
            .state("done", StateConfig::new());
        let mut machine = create_machine(config).unwrap();
        assert_eq!(machine.next_deadline(), Some(Duration::from_millis(10)));

        assert!(machine.advance(Duration::from_millis(9)).unwrap().is_none());
        let snapshot = machine.advance(Duration::from_millis(1)).unwrap().unwrap();
        assert_eq!(&snapshot.active()[..], [".root.done".to_string()]);
    }

    #[tokio::test]
    async fn task_outcomes_route_through_events() {
        let config = Config::new(Log::default())
            .async_task("load", |_: &Log, event: &Event| {
                let id = event.payload["id"].as_u64().unwrap_or_default();
                pure(json!({ "id": id, "name": "loaded" })).boxed()
            })
            .state("idle", StateConfig::new().on("LOAD", Handler::goto("loading")))
            .state(
                "loading",
                StateConfig::new()
                    .await_task("load")
                    .on_resolve(
                        Handler::new()
                            .act_fn(|log: &mut Log, event| {
                                log.entries.push(event.payload["name"].to_string())
                            })
                            .to("ready"),
                    )
                    .on_reject(Handler::goto("failed")),
            )
            .state("ready", StateConfig::new())
            .state("failed", StateConfig::new());
        let mut machine = create_machine(config).unwrap();

        machine.send("LOAD", json!({ "id": 7 })).unwrap();
        assert_eq!(machine.pending_tasks(), 1);
        assert!(machine.is_in("loading"));

        let snapshot = machine.settle().await.unwrap().unwrap();
        assert_eq!(&snapshot.active()[..], [".root.ready".to_string()]);
        assert_eq!(snapshot.data().entries, vec!["\"loaded\""]);
        assert_eq!(machine.pending_tasks(), 0);
    }

    #[tokio::test]
    async fn task_rejection_routes_to_reject_handlers() {
        let config = Config::new(Log::default())
            .state(
                "loading",
                StateConfig::new()
                    .await_task_fn(|_: &Log, _| fail(TaskError::failed("offline")).boxed())
                    .on_resolve(Handler::goto("ready"))
                    .on_reject(
                        Handler::new()
                            .act_fn(|log: &mut Log, event| {
                                log.entries.push(event.payload.as_str().unwrap_or_default().to_string())
                            })
                            .to("failed"),
                    ),
            )
            .state("ready", StateConfig::new())
            .state("failed", StateConfig::new());
        let mut machine = create_machine(config).unwrap();

        machine.settle().await.unwrap();
        assert!(machine.is_in("failed"));
        assert_eq!(machine.data().entries, vec!["Task failed: offline"]);
    }

    #[tokio::test]
    async fn stale_task_outcome_is_a_no_op() {
        let config = Config::new(Log::default())
            .state(
                "loading",
                StateConfig::new()
                    .await_task_fn(|_: &Log, _| pure(Value::Null).boxed())
                    .on_resolve(Handler::goto("ready"))
                    .on("CANCEL", Handler::goto("cancelled")),
            )
            .state("ready", StateConfig::new())
            .state("cancelled", StateConfig::new());
        let mut machine = create_machine(config).unwrap();
        machine.send("CANCEL", Value::Null).unwrap();

        assert!(machine.settle().await.unwrap().is_none());
        assert!(machine.is_in("cancelled"));
    }

    #[tokio::test]
    async fn outside_sends_cannot_forge_engine_events() {
        let config = Config::new(Log::default())
            .state(
                "loading",
                StateConfig::new()
                    .await_task_fn(|_: &Log, _| pure(json!("real")).boxed())
                    .on_resolve(Handler::goto("ready"))
                    .after(Duration::from_secs(5), Handler::goto("timedOut")),
            )
            .state("ready", StateConfig::new())
            .state("timedOut", StateConfig::new());
        let mut machine = create_machine(config).unwrap();

        let err = machine.send("@resolve.root.loading", json!("forged")).unwrap_err();
        assert_eq!(
            err,
            MachineError::ReservedEvent {
                event: "@resolve.root.loading".to_string()
            }
        );
        let err = machine.send_event(Event::named("@after.root.loading#0")).unwrap_err();
        assert!(matches!(err, MachineError::ReservedEvent { .. }));

        assert!(machine.is_in("loading"));
        assert_eq!(machine.snapshot().revision(), 0);
        assert_eq!(machine.pending_tasks(), 1);
        assert_eq!(machine.scheduled_timers(), 1);

        machine.settle().await.unwrap();
        assert!(machine.is_in("ready"));
    }

    #[test]
    fn actions_cannot_send_engine_events() {
        let config = Config::new(Log::default())
            .state(
                "waiting",
                StateConfig::new()
                    .on(
                        "POKE",
                        Handler::new().act_with(|log: &mut Log, _, outbox| {
                            log.entries.push("poked".to_string());
                            outbox.signal("@after.root.waiting#0");
                            Ok(())
                        }),
                    )
                    .after(Duration::from_secs(1), Handler::goto("expired")),
            )
            .state("expired", StateConfig::new());
        let mut machine = create_machine(config).unwrap();

        let snapshot = machine.send("POKE", Value::Null).unwrap().unwrap();
        assert_eq!(snapshot.revision(), 1);
        assert!(machine.is_in("waiting"));
        assert_eq!(machine.data().entries, vec!["poked"]);
    }

    #[tokio::test]
    async fn task_from_an_earlier_visit_does_not_resolve_the_current_one() {
        let config = Config::new(Log::default())
            .state(
                "loading",
                StateConfig::new()
                    .await_task_fn(|log: &Log, _| pure(json!(log.entries.len())).boxed())
                    .on_resolve(
                        Handler::new()
                            .act_fn(|log: &mut Log, event| {
                                log.entries.push(format!("resolved {}", event.payload))
                            })
                            .to("done"),
                    )
                    .on("CANCEL", Handler::goto("idle")),
            )
            .state(
                "idle",
                StateConfig::new().on(
                    "RETRY",
                    Handler::new()
                        .act_fn(|log: &mut Log, _| log.entries.push("retry".to_string()))
                        .to("loading"),
                ),
            )
            .state("done", StateConfig::new());
        let mut machine = create_machine(config).unwrap();

        machine.send("CANCEL", Value::Null).unwrap();
        machine.send("RETRY", Value::Null).unwrap();
        assert_eq!(machine.pending_tasks(), 2);

        let snapshot = machine.settle().await.unwrap().unwrap();
        assert_eq!(snapshot.data().entries, vec!["retry", "resolved 1"]);
        assert_eq!(snapshot.revision(), 3);
        assert!(machine.is_in("done"));
        assert_eq!(machine.pending_tasks(), 0);
    }
}
