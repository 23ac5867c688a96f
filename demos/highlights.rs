//! Highlights Machine
//!
//! A viewer highlights either an event or a state of some other project's
//! state tree. Which one is highlit, and the transition targets of a
//! highlit event, are tracked by a small two-state machine.
//!
//! Key concepts:
//! - Named actions that decode typed payloads with serde
//! - Root-level handlers that apply in every state
//! - Several actions per handler, run in order
//! - Derived values resolved against another machine's state tree
//!
//! Run with: RUST_LOG=statecraft=debug cargo run --example highlights

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Value};
use statecraft::core::last_match;
use statecraft::{create_machine, ActionError, Config, Event, Handler, StateConfig, StateNode};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct HighlightData {
    event: Option<String>,
    state: Option<String>,
    path: Option<String>,
    scroll_to_line: bool,
    targets: Vec<String>,
    /// Element id of each mounted state node, by path.
    node_refs: IndexMap<String, String>,
    /// Element id of each mounted event button, by state path then event name.
    event_button_refs: IndexMap<String, IndexMap<String, String>>,
    /// State tree of the project being viewed.
    project: Arc<StateNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventHighlight {
    event_name: String,
    #[serde(default)]
    shift_key: bool,
    #[serde(default)]
    targets: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateHighlight {
    path: String,
    state_name: String,
    #[serde(default)]
    shift_key: bool,
}

#[derive(Deserialize)]
struct MountedNode {
    path: String,
    id: String,
}

#[derive(Deserialize)]
struct MountedButton {
    path: String,
    name: String,
    id: String,
}

fn payload<T: for<'de> Deserialize<'de>>(event: &Event) -> Result<T, ActionError> {
    Ok(serde_json::from_value(event.payload.clone())?)
}

fn highlights(project: Arc<StateNode>) -> Config<HighlightData> {
    let data = HighlightData {
        event: None,
        state: None,
        path: None,
        scroll_to_line: false,
        targets: Vec::new(),
        node_refs: IndexMap::new(),
        event_button_refs: IndexMap::new(),
        project,
    };

    Config::new(data)
        .initial("highlit")
        .state(
            "idle",
            StateConfig::new()
                .on("HIGHLIT_EVENT", Handler::new().act("setEventHighlight").to("highlit"))
                .on("HIGHLIT_STATE", Handler::new().act("setStateHighlight").to("highlit")),
        )
        .state(
            "highlit",
            StateConfig::new()
                .on(
                    "CLEARED_HIGHLIGHTS",
                    Handler::new()
                        .act_fn(|_, _| tracing::info!("clearing"))
                        .act("clearEventHighlight")
                        .act("clearStateHighlight")
                        .to("idle"),
                )
                .on(
                    "CLEARED_EVENT_HIGHLIGHT",
                    Handler::new().act("clearEventHighlight").to("idle"),
                )
                .on(
                    "CLEARED_STATE_HIGHLIGHT",
                    Handler::new().act("clearStateHighlight").to("idle"),
                )
                .on(
                    "HIGHLIT_EVENT",
                    Handler::new().act("clearEventHighlight").act("setEventHighlight"),
                )
                .on(
                    "HIGHLIT_STATE",
                    Handler::new().act("clearStateHighlight").act("setStateHighlight"),
                ),
        )
        .on("MOUNTED_NODE", "updateNodeRefs")
        .on("MOUNTED_EVENT_BUTTON", "updateEventButtonRefs")
        .action_with("setEventHighlight", |data: &mut HighlightData, event, _| {
            let highlight: EventHighlight = payload(event)?;
            data.state = None;
            data.event = Some(highlight.event_name);
            data.targets = highlight.targets;
            data.scroll_to_line = highlight.shift_key;
            Ok(())
        })
        .action_with("setStateHighlight", |data: &mut HighlightData, event, _| {
            let highlight: StateHighlight = payload(event)?;
            data.state = Some(highlight.state_name);
            data.event = None;
            data.path = Some(highlight.path);
            data.scroll_to_line = highlight.shift_key;
            Ok(())
        })
        .action("clearStateHighlight", |data: &mut HighlightData, _| {
            data.state = None;
            data.path = None;
            data.scroll_to_line = false;
        })
        .action("clearEventHighlight", |data: &mut HighlightData, _| {
            data.event = None;
            data.targets.clear();
            data.scroll_to_line = false;
        })
        .action_with("updateNodeRefs", |data: &mut HighlightData, event, _| {
            let mounted: MountedNode = payload(event)?;
            data.node_refs.insert(mounted.path, mounted.id);
            Ok(())
        })
        .action_with("updateEventButtonRefs", |data: &mut HighlightData, event, _| {
            let mounted: MountedButton = payload(event)?;
            data.event_button_refs
                .entry(mounted.path)
                .or_default()
                .insert(mounted.name, mounted.id);
            Ok(())
        })
        .value("highlitStateRef", |data: &HighlightData| {
            data.path
                .as_ref()
                .and_then(|path| data.node_refs.get(path))
                .map_or(Value::Null, |id| json!(id))
        })
        .value("targets", |data: &HighlightData| {
            let targets: Vec<Value> = data
                .targets
                .iter()
                .filter_map(|target| last_match(&data.project, target))
                .map(|node| {
                    json!({
                        "path": node.path,
                        "ref": data.node_refs.get(&node.path),
                    })
                })
                .collect();
            Value::Array(targets)
        })
}

/// The project whose states are being highlighted.
fn project() -> Config<()> {
    Config::new(())
        .state(
            "player",
            StateConfig::new()
                .state("stopped", StateConfig::new().on("PLAY", Handler::goto("playing")))
                .state("playing", StateConfig::new().on("STOP", Handler::goto("player.stopped"))),
        )
        .state(
            "volume",
            StateConfig::new()
                .state("muted", StateConfig::new())
                .state("stopped", StateConfig::new()),
        )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Highlights Machine ===\n");

    let project = create_machine(project())?;
    let mut machine = create_machine(highlights(Arc::clone(project.state_tree())))?;
    let _subscription = machine.on_update(|snapshot| {
        println!(
            "  [rev {}] {:<24} -> {:?}",
            snapshot.revision(),
            snapshot.event().unwrap_or("-"),
            snapshot.active()
        );
    });

    println!("Initial state: {:?}\n", machine.active());

    for (path, id) in [
        (".root.player.stopped", "node-1"),
        (".root.player.playing", "node-2"),
        (".root.volume.stopped", "node-3"),
    ] {
        machine.send("MOUNTED_NODE", json!({ "path": path, "id": id }))?;
    }
    machine.send(
        "MOUNTED_EVENT_BUTTON",
        json!({ "path": ".root.player.stopped", "name": "PLAY", "id": "button-1" }),
    )?;

    machine.send(
        "HIGHLIT_EVENT",
        json!({ "eventName": "PLAY", "shiftKey": true, "targets": ["playing", "stopped"] }),
    )?;
    println!("\nHighlit event: {:?}", machine.data().event);
    // "stopped" is ambiguous; the last match in the tree wins.
    println!("Targets: {}\n", machine.value("targets").unwrap_or_default());

    machine.send("CLEARED_HIGHLIGHTS", Value::Null)?;
    machine.send(
        "HIGHLIT_STATE",
        json!({ "path": ".root.player.playing", "stateName": "playing" }),
    )?;
    println!("\nHighlit state: {:?}", machine.data().state);
    println!(
        "Highlit state ref: {}",
        machine.value("highlitStateRef").unwrap_or_default()
    );

    // A malformed payload fails setStateHighlight. No snapshot is committed,
    // but data is not rolled back: clearStateHighlight already ran, and the
    // cleared highlight shows up with the next accepted event.
    if let Err(err) = machine.send("HIGHLIT_STATE", json!({ "path": 42 })) {
        println!("\nRejected: {err}");
    }
    println!("Last committed highlight: {:?}", machine.data().state);
    machine.send("MOUNTED_NODE", json!({ "path": ".root.volume.muted", "id": "node-4" }))?;
    println!("Highlight after the next commit: {:?}", machine.data().state);

    println!("\nHistory:");
    for record in machine.history().records() {
        println!("  {:>2}. {:<24} {:?} -> {:?}", record.revision, record.event, record.from, record.to);
    }

    Ok(())
}
