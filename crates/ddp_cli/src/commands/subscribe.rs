//! Subscribe command implementation.

use super::{open_session, parse_param, render, ConnectOptions};
use ddp_client::{ConnectionEvent, DataEvent};
use ddp_localdb::{JsonCollection, LocalDb};
use serde_json::{json, Value};
use std::sync::Arc;

/// Runs the subscribe command.
pub async fn run(
    options: &ConnectOptions,
    name: &str,
    params: &[String],
    follow: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = open_session(options).await?;
    let db = LocalDb::json();
    db.set_connection(Some(&session.connection));

    if follow {
        let json_output = format == "json";
        session
            .connection
            .add_data_observer(Arc::new(move |event: &DataEvent| {
                print_event(event, json_output)
            }));
    }

    let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();
    let subscription = session.connection.subscribe(name, params);

    let deadline = tokio::time::sleep(options.timeout);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = subscription.wait_ready() => break,
            _ = &mut deadline => {
                return Err(format!("subscription {name} not ready within {:?}", options.timeout).into());
            }
            event = session.events.recv() => match event {
                Some(ConnectionEvent::Error(error)) => {
                    if !subscription.is_active() {
                        return Err(format!("subscription {name} stopped: {error}").into());
                    }
                    eprintln!("error: {error}");
                }
                Some(ConnectionEvent::Connected { .. }) => {}
                _ => return Err("connection lost".into()),
            },
        }
    }

    if follow {
        eprintln!("{name} ready; following changes, press Ctrl-C to stop");
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = session.events.recv() => match event {
                    Some(ConnectionEvent::Error(error)) => eprintln!("error: {error}"),
                    Some(ConnectionEvent::Disconnected) | Some(ConnectionEvent::Closed) | None => {
                        return Err("connection lost".into());
                    }
                    Some(ConnectionEvent::Connected { .. }) => {}
                },
            }
        }
    } else {
        print_snapshot(&db, format)?;
    }

    if let Err(error) = session.connection.unsubscribe(&subscription) {
        tracing::debug!(%error, "unsubscribe failed");
    }
    db.set_connection(None);
    session.close(options.timeout).await;
    Ok(())
}

fn print_event(event: &DataEvent, json_output: bool) {
    let (kind, body) = match event {
        DataEvent::Added { fields, .. } => ("added", json!(fields)),
        DataEvent::Changed {
            fields, cleared, ..
        } => ("changed", json!({"fields": fields, "cleared": cleared})),
        DataEvent::Removed { .. } => ("removed", Value::Null),
        DataEvent::AddedBefore { fields, before, .. } => {
            ("addedBefore", json!({"fields": fields, "before": before}))
        }
        DataEvent::MovedBefore { before, .. } => ("movedBefore", json!({"before": before})),
    };

    if json_output {
        println!(
            "{}",
            json!({
                "event": kind,
                "collection": event.collection(),
                "id": event.document_id(),
                "body": body,
            })
        );
    } else {
        println!(
            "{kind} {}/{} {}",
            event.collection(),
            event.document_id(),
            if body.is_null() { String::new() } else { body.to_string() }
        );
    }
}

fn print_snapshot(db: &LocalDb, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut all = serde_json::Map::new();
    for name in db.collection_names() {
        let Some(collection) = db.collection_as::<JsonCollection>(&name) else {
            continue;
        };
        let documents: serde_json::Map<String, Value> = collection
            .snapshot()
            .into_iter()
            .map(|(id, fields)| (id, Value::Object(fields)))
            .collect();
        all.insert(name, Value::Object(documents));
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&all)?),
        _ => {
            if all.is_empty() {
                println!("(no documents)");
            }
            for (collection, documents) in &all {
                let count = documents.as_object().map(|d| d.len()).unwrap_or(0);
                println!("{collection} ({count} documents)");
                if let Some(documents) = documents.as_object() {
                    for (id, fields) in documents {
                        println!("  {id}: {}", render(fields));
                    }
                }
            }
        }
    }
    Ok(())
}
