// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use trigger_graph::config::{load_and_validate_config, EngineConfig};
use trigger_graph::engine::{Group, LoopSettings, LoopedTrigger, StepNode};
use trigger_graph::steps::{CounterStep, GainStep};

/// How long the demo lets the looped trigger run.
const RUN_FOR: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        eprintln!("Usage: {} [engine.yaml | engine.toml]", args[0]);
        std::process::exit(1);
    }

    let config = match args.get(1) {
        Some(path) => load_and_validate_config(path)
            .with_context(|| format!("failed to load config '{}'", path))?,
        None => EngineConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("⏱️  Trigger Graph Demo");
    println!("═══════════════════════");

    let group = build_demo(&config)?;
    let mut events = group.subscribe();
    let settings = LoopSettings::from(&config.looped_trigger);
    println!(
        "Clock: {:?} mode, step {:?}, running for {:?}",
        settings.mode, settings.step_size, RUN_FOR
    );

    group.start_all_triggers()?;
    tokio::time::sleep(RUN_FOR).await;

    // Stopping joins the trigger thread; keep that off the async workers.
    let stopper = Arc::clone(&group);
    tokio::task::spawn_blocking(move || stopper.stop_all_triggers(settings.stop_timeout))
        .await
        .context("stop task panicked")??;

    let counter = read_f64(&group, "counter.value")?;
    let doubled = read_f64(&group, "doubler.output")?;
    println!();
    println!("📊 Results");
    println!("  counter.value  = {}", format_value(counter));
    println!("  doubler.output = {}", format_value(doubled));
    if let Some(clock) = group.all_looped_triggers().first() {
        let stats = clock.trigger().stats();
        println!(
            "  pulses = {}, simulated time = {:?}, mean pulse = {:?}",
            stats.pulses,
            clock.simulated_time(),
            stats.mean_pulse
        );
    }

    let mut received = 0;
    while events.try_recv().is_ok() {
        received += 1;
    }
    println!("  events after start = {}", received);

    println!();
    println!("🧾 Snapshot");
    println!("{}", serde_json::to_string_pretty(&group.snapshot())?);
    Ok(())
}

/// counter -> doubler, driven by a looped trigger built from the config.
fn build_demo(config: &EngineConfig) -> anyhow::Result<Arc<Group>> {
    let fault_history = config.steps.fault_history;
    let group = Group::from_config("demo", config);
    group.add("clock", LoopedTrigger::from_config("clock", &config.looped_trigger))?;
    group.add(
        "counter",
        StepNode::with_fault_history("counter", CounterStep::new(), fault_history)?,
    )?;
    group.add(
        "doubler",
        StepNode::with_fault_history("doubler", GainStep::new(2.0), fault_history)?,
    )?;
    group.connect_trigger("clock", "counter")?;
    group.connect_slots("counter.value", "doubler.input")?;

    for issue in group.check_consistency() {
        println!("⚠️  {}", issue);
    }
    Ok(group)
}

fn read_f64(group: &Group, path: &str) -> anyhow::Result<Option<f64>> {
    let slot = group.slot(path)?;
    Ok(slot.data().and_then(|data| data.downcast_ref::<f64>().copied()))
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "<no data>".to_string(),
    }
}
