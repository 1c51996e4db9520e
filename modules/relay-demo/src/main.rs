use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_dispatch::{
    json_data, load_config, CommandDispatcher, DispatchConfig, EventDispatcher, Message,
};

#[derive(Debug, Serialize)]
struct DoSomethingCommand {
    before: String,
    after: String,
}

impl Message for DoSomethingCommand {
    fn type_key(&self) -> Option<&str> {
        Some("DoSomething")
    }

    fn data(&self) -> Option<Vec<u8>> {
        json_data(self)
    }
}

#[derive(Debug, Serialize)]
struct SomethingHappenedEvent {
    before: String,
    after: String,
    when: DateTime<Utc>,
}

impl Message for SomethingHappenedEvent {
    fn type_key(&self) -> Option<&str> {
        Some("SomethingHappened")
    }

    fn data(&self) -> Option<Vec<u8>> {
        json_data(self)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relay=info".parse()?))
        .init();

    // Optional --config <path>; otherwise RELAY_* env vars
    let config = match std::env::args().nth(1).as_deref() {
        Some("--config") => {
            let path = std::env::args()
                .nth(2)
                .map(PathBuf::from)
                .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
            load_config(&path)?
        }
        _ => DispatchConfig::from_env()?,
    };
    info!(
        key_strategy = ?config.key_strategy,
        log_payloads = config.log_payloads,
        "Relay demo starting"
    );

    let events = Arc::new(EventDispatcher::from_config(&config));
    let commands = CommandDispatcher::<String>::from_config(&config);

    // Runs for every event, whatever its type.
    events.register_pre(|ctx| {
        let data = ctx.data().unwrap_or_default();
        println!(
            "inside global event handler! (type: {}, data: {})",
            ctx.type_key(),
            String::from_utf8_lossy(&data)
        );
        Ok(())
    });

    events.subscribe("SomethingHappened", |ctx| {
        let event = ctx
            .message::<SomethingHappenedEvent>()
            .ok_or_else(|| anyhow::anyhow!("unexpected event type"))?;
        println!(
            "inside {} event handler! ({} -> {} at {})",
            ctx.type_key(),
            event.before,
            event.after,
            event.when
        );
        Ok(())
    });

    let bus = events.clone();
    commands.register("DoSomething", move |ctx| {
        let cmd = ctx
            .message::<DoSomethingCommand>()
            .ok_or_else(|| anyhow::anyhow!("unexpected command type"))?;
        println!("inside {} command handler!", ctx.type_key());
        bus.publish(SomethingHappenedEvent {
            before: cmd.before.clone(),
            after: cmd.after.clone(),
            when: Utc::now(),
        })?;
        Ok(format!("{}:{}", cmd.before, cmd.after))
    });

    let outcome = commands
        .dispatch(DoSomethingCommand {
            before: "before".into(),
            after: "after".into(),
        })
        .map_err(|failure| failure.into_error())?;
    info!(outcome = %outcome, "Command handled");

    match commands.dispatch(DoSomethingElse) {
        Err(failure) if failure.error.is_unhandled() => {
            info!(error = %failure.error, "Unhandled command rejected as expected");
        }
        Err(failure) => return Err(failure.into_error().into()),
        Ok(_) => anyhow::bail!("DoSomethingElse should have no handler"),
    }

    Ok(())
}

struct DoSomethingElse;

impl Message for DoSomethingElse {
    fn type_key(&self) -> Option<&str> {
        Some("DoSomethingElse")
    }
}
