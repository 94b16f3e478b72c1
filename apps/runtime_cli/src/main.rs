use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_runtime::{
    config::DEFAULT_SETTINGS_FILE, load_settings, Command as QueuedCommand, ComponentEntry,
    DisconnectedTransport, DomNode, HttpTransport, Modifiers, OperationSpecNode, Runtime,
    Transport, UiEvent,
};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{ComponentId, EventPosition},
    protocol::Operation,
};
use tracing::{info, warn};

mod demo;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    /// Overrides `server_url` from the settings file.
    #[arg(long)]
    server_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mounts the demo counter page and feeds it a recorded event list.
    Replay {
        events: PathBuf,
        /// Keep commands queued instead of sending them.
        #[arg(long)]
        offline: bool,
    },
    /// Prints the configured page routes.
    Routes,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordedSpec {
    Text(String),
    Expression(Operation),
}

#[derive(Debug, Deserialize)]
struct RecordedEvent {
    #[serde(rename = "type", default = "default_event_type")]
    event_type: String,
    #[serde(default = "demo::counter_cid")]
    target: ComponentId,
    #[serde(default = "default_node")]
    node: String,
    #[serde(default)]
    position: EventPosition,
    #[serde(default)]
    modifiers: Vec<String>,
    spec: RecordedSpec,
}

fn default_event_type() -> String {
    "click".into()
}

fn default_node() -> String {
    "button".into()
}

impl RecordedEvent {
    fn modifiers(&self) -> Modifiers {
        let held = |key: &str| self.modifiers.iter().any(|m| m.eq_ignore_ascii_case(key));
        Modifiers {
            ctrl: held("ctrl"),
            meta: held("meta"),
            shift: held("shift"),
            alt: held("alt"),
        }
    }

    fn spec(&self) -> OperationSpecNode {
        match &self.spec {
            RecordedSpec::Text(name) => OperationSpecNode::Text(name.clone()),
            RecordedSpec::Expression(operation) => OperationSpecNode::Expression(operation.clone()),
        }
    }
}

#[derive(Serialize)]
struct Snapshot {
    components: BTreeMap<ComponentId, ComponentEntry>,
    commands: Vec<QueuedCommand>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let mut settings = load_settings(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }

    match cli.command {
        Command::Replay { events, offline } => {
            let transport: Arc<dyn Transport> = if offline {
                Arc::new(DisconnectedTransport)
            } else {
                Arc::new(HttpTransport::new(
                    &settings.server_url,
                    settings.command_timeout(),
                )?)
            };
            let runtime = Runtime::builder(settings)
                .handlers(demo::handlers())
                .transport(transport)
                .build()?;
            replay(&runtime, &events).await?;
        }
        Command::Routes => {
            if settings.routes.is_empty() {
                println!("no routes configured");
            }
            for (module, path) in &settings.routes {
                println!("{module} -> {path}");
            }
        }
    }

    Ok(())
}

async fn replay(runtime: &Runtime, events: &Path) -> Result<()> {
    let raw = fs::read_to_string(events).with_context(|| format!("reading {}", events.display()))?;
    let recorded: Vec<RecordedEvent> = serde_json::from_str(&raw)?;
    runtime.hydrate(demo::entries());

    let mut nodes: BTreeMap<String, Arc<DomNode>> = BTreeMap::new();
    for (index, event) in recorded.iter().enumerate() {
        let node = nodes
            .entry(event.node.clone())
            .or_insert_with(|| Arc::new(DomNode::new(event.node.clone())))
            .clone();
        let mut ui_event = UiEvent::new(event.position, node);
        ui_event.modifiers = event.modifiers();

        match runtime.handle_event(&ui_event, &event.event_type, &event.spec(), &event.target) {
            Ok(outcome) => info!(index, event_type = %event.event_type, ?outcome, "event replayed"),
            Err(err) => warn!(index, event_type = %event.event_type, "event failed: {err}"),
        }
    }

    runtime.settle().await;

    let snapshot = Snapshot {
        components: runtime.with_registry(|registry| {
            registry
                .component_ids()
                .filter_map(|cid| registry.get(cid).map(|entry| (cid.clone(), entry.clone())))
                .collect()
        }),
        commands: runtime.commands(),
    };
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
