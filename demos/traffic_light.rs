//! Traffic Light State Machine
//!
//! This example demonstrates a cyclic machine driven by timers.
//!
//! Key concepts:
//! - One-shot timers that advance the cycle
//! - A repeating timer that blinks while the light is out of service
//! - Nested states: `operating` and `maintenance` each own their lights
//! - A virtual clock, advanced explicitly with `Machine::advance`
//!
//! Run with: cargo run --example traffic_light

use serde_json::Value;
use statecraft::{create_machine, Config, Handler, StateConfig};
use std::time::Duration;

#[derive(Clone, Debug, Default)]
struct Signal {
    cycles: u32,
    blinks: u32,
}

fn traffic_light() -> Config<Signal> {
    let secs = Duration::from_secs;

    Config::new(Signal::default())
        .action("countCycle", |signal: &mut Signal, _| signal.cycles += 1)
        .action("blink", |signal: &mut Signal, _| signal.blinks += 1)
        .state(
            "operating",
            StateConfig::new()
                .on("FAULT", Handler::goto("maintenance"))
                .state("red", StateConfig::new().after(secs(30), Handler::goto("green")))
                .state(
                    "green",
                    StateConfig::new().after(secs(25), Handler::goto("yellow")),
                )
                .state(
                    "yellow",
                    StateConfig::new().after(secs(5), Handler::new().act("countCycle").to("red")),
                ),
        )
        .state(
            "maintenance",
            StateConfig::new()
                .on("REPAIRED", Handler::goto("operating"))
                .state(
                    "flashing",
                    StateConfig::new().every(Duration::from_millis(500), "blink"),
                ),
        )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Traffic Light State Machine ===\n");

    let mut machine = create_machine(traffic_light())?;
    let _subscription = machine.on_update(|snapshot| {
        if snapshot.event().is_some_and(|event| !event.starts_with('@')) {
            println!("  event {:?}", snapshot.event());
        }
    });

    println!("Initial state: {:?}", machine.active());
    println!("Transition sequence (one full cycle is 60s):");
    for _ in 0..6 {
        let Some(deadline) = machine.next_deadline() else {
            break;
        };
        machine.advance(deadline - machine.clock())?;
        println!("  t={:>3}s  {:?}", machine.clock().as_secs(), machine.active());
    }
    println!("Completed cycles: {}\n", machine.data().cycles);

    println!("A fault switches to the flashing light:");
    machine.send("FAULT", Value::Null)?;
    machine.advance(Duration::from_secs(3))?;
    println!("  {:?} blinked {} times", machine.active(), machine.data().blinks);

    machine.send("REPAIRED", Value::Null)?;
    println!("  repaired: {:?}", machine.active());
    println!("  pending timers: {}", machine.scheduled_timers());

    println!("\nKey Characteristics:");
    println!("- Timers belong to states and are cancelled when the state exits");
    println!("- Timer expiry is an ordinary event, processed in deadline order");
    println!("- The clock only moves when the host advances it");

    println!("\n=== Example Complete ===");
    Ok(())
}
