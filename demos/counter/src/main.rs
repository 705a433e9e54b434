//! Counter Demo
//!
//! Demonstrates both reflux engines over one graph: a sync action
//! updating a counter and an activity log together, and an async action
//! staging writes around an awaited operation so an observer sees one
//! combined transition per batch window.

use reflux_action::{create_action, create_async_action, Action, AsyncAction, TargetShape};
use reflux_graph::{Graph, Unit, Value};

fn main() {
    env_logger::init();
    println!("=== Reflux Counter Demo ===\n");

    let graph = Graph::new();
    let count = graph.cell(Value::Int(0));
    let status = graph.cell(Value::String("idle".into()));
    let activity = graph.emitter();

    activity.watch(|payload| println!("  activity: {}", payload));
    let count_reader = count.clone();
    let status_reader = status.clone();
    count.watch(move |value| {
        println!(
            "  committed: count = {}, status = {}",
            value,
            status_reader.get()
        );
    });

    // Sync action: one trigger mutates the counter and the log together
    let targets = TargetShape::named([
        ("count", Unit::from(count.clone())),
        ("activity", Unit::from(activity)),
    ]);
    let bump = create_action(
        &graph,
        Action::new(targets, |t, _source, payload| {
            let step = payload.as_int().unwrap_or(1);
            t.set_with("count", move |prev| {
                Value::Int(prev.as_int().unwrap_or(0) + step)
            })
            .expect("count is a known target");
            t.set("activity", format!("bumped by {}", step))
                .expect("activity is a known target");
        }),
    )
    .expect("valid config")
    .expect("default clock returns a trigger emitter");

    println!("Sync action, two firings:");
    bump.emit(1i64).expect("emit");
    bump.emit(10i64).expect("emit");

    // Async action: writes before and after the awaited operation land
    // as separate batches
    let fetch = graph.operation(|payload| {
        Box::pin(async move {
            let n = payload.as_int().unwrap_or(0);
            Ok(Value::Int(n * 2))
        })
    });
    let targets = TargetShape::named([
        ("count", Unit::from(count.clone())),
        ("status", Unit::from(status)),
        ("fetch", Unit::from(fetch)),
    ]);
    let refresh = create_async_action(
        &graph,
        AsyncAction::new(targets, |t, _source, payload| {
            Box::pin(async move {
                t.set("status", "loading")?;
                let doubled = t.call("fetch", payload).await?;
                t.set("count", doubled.clone())?;
                t.set("status", "done")?;
                Ok(doubled)
            })
        }),
    )
    .expect("valid config");

    println!("\nAsync action, one invocation:");
    let result = graph
        .scheduler()
        .run_until(refresh.call(count_reader.get()))
        .expect("invocation succeeds");

    println!("\nFinal: count = {}, result = {}", count_reader.get(), result);
}
