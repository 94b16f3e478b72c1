//! Recording collaborators and component fixtures shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;
use shared::{
    domain::{ComponentId, ModuleRef, Params, Term},
    protocol::{CommandPayload, CommandResponse, OperationSpec, PageResponse},
};

use crate::{
    error::TransportError,
    handler::{ActionResult, HandlerRegistry},
    host::{Navigator, Renderer, RouteTable},
    registry::{ComponentEntry, ComponentRegistry},
    transport::Transport,
    Runtime, RuntimeSettings,
};

pub fn cid1() -> ComponentId {
    ComponentId::from("my_component_1")
}

pub fn cid2() -> ComponentId {
    ComponentId::from("my_component_2")
}

pub const MODULE7_PATH: &str = "/hologram-test-fixtures-module7";

pub fn params(value: Value) -> Params {
    serde_json::from_value(value).expect("params must be a JSON object")
}

pub fn event_params() -> Params {
    params(json!({"a": 1, "b": 2, "event": {"page_x": 1, "page_y": 2}}))
}

pub fn entry(module: &str) -> ComponentEntry {
    ComponentEntry::new(ModuleRef::from(module), json!({}))
}

#[derive(Default)]
pub struct RecordingTransport {
    connected: AtomicBool,
    pub sent: Mutex<Vec<CommandPayload>>,
    pub fetched: Mutex<Vec<ModuleRef>>,
    command_script: Mutex<VecDeque<Result<CommandResponse, TransportError>>>,
    page_script: Mutex<VecDeque<Result<PageResponse, TransportError>>>,
    page_gate: Mutex<Option<Arc<Notify>>>,
    command_delay_ms: AtomicU64,
    fail_unscripted: AtomicBool,
}

impl RecordingTransport {
    pub fn connected() -> Arc<Self> {
        let transport = Self::default();
        transport.connected.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn disconnected() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Queues the outcome of the next `send_command`; unscripted sends succeed
    /// with an empty response.
    pub fn script_command(&self, outcome: Result<CommandResponse, TransportError>) {
        self.command_script.lock().unwrap().push_back(outcome);
    }

    pub fn script_page(&self, outcome: Result<PageResponse, TransportError>) {
        self.page_script.lock().unwrap().push_back(outcome);
    }

    /// Page fetches wait for one `notify_one` each on the returned gate.
    pub fn gate_pages(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.page_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn set_command_delay(&self, delay: Duration) {
        self.command_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Unscripted sends fail with `Timeout` instead of succeeding.
    pub fn fail_unscripted_commands(&self) {
        self.fail_unscripted.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<CommandPayload> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fetched(&self) -> Vec<ModuleRef> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_command(&self, payload: CommandPayload) -> Result<CommandResponse, TransportError> {
        self.sent.lock().unwrap().push(payload);
        let delay = self.command_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let scripted = self.command_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            if self.fail_unscripted.load(Ordering::SeqCst) {
                Err(TransportError::Timeout)
            } else {
                Ok(CommandResponse::default())
            }
        })
    }

    async fn fetch_page(&self, to: &ModuleRef) -> Result<PageResponse, TransportError> {
        self.fetched.lock().unwrap().push(to.clone());
        let gate = self.page_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.page_script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(PageResponse {
                html: format!("<html>{to}</html>"),
            })
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingRenderer {
    renders: AtomicUsize,
    pub last_component_count: AtomicUsize,
}

impl RecordingRenderer {
    pub fn count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl Renderer for RecordingRenderer {
    fn render(&self, registry: &ComponentRegistry) {
        self.renders.fetch_add(1, Ordering::SeqCst);
        self.last_component_count
            .store(registry.len(), Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigatorCall {
    Navigate(String),
    Load { path: String, html: String },
}

#[derive(Default)]
pub struct RecordingNavigator {
    pub calls: Mutex<Vec<NavigatorCall>>,
}

impl RecordingNavigator {
    pub fn calls(&self) -> Vec<NavigatorCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(NavigatorCall::Navigate(path.to_string()));
    }

    fn load_page(&self, path: &str, html: &str) {
        self.calls.lock().unwrap().push(NavigatorCall::Load {
            path: path.to_string(),
            html: html.to_string(),
        });
    }
}

fn handler<F>(f: F) -> F
where
    F: Fn(&str, &Term, &Params) -> anyhow::Result<ActionResult> + Send + Sync,
{
    f
}

fn int(params: &Params, key: &str) -> i64 {
    params.get(key).and_then(Value::as_i64).unwrap_or_default()
}

fn event_context(params: &Params) -> Params {
    let mut context = Params::new();
    if let Some(event) = params.get("event") {
        context.insert("event".into(), event.clone());
    }
    context
}

/// Component modules used across the dispatch tests.
pub fn fixture_handlers() -> HandlerRegistry {
    HandlerRegistry::new()
        .with(
            "Module1",
            handler(|name: &str, _state: &Term, p: &Params| match name {
                "my_action_1" => Ok(ActionResult::new(json!({"x": int(p, "a") + int(p, "b") + 1}))
                    .with_emitted_context(event_context(p))),
                other => Err(anyhow!("Module1 has no action {other}")),
            }),
        )
        .with(
            "Module2",
            handler(|name: &str, _state: &Term, p: &Params| match name {
                "my_action_2" => Ok(ActionResult::new(json!({"x": int(p, "a") + int(p, "b") + 2}))
                    .with_emitted_context(event_context(p))
                    .with_next_action(
                        OperationSpec::new("my_action_6")
                            .with_params(params(json!({"c": 6})))
                            .with_target(cid2()),
                    )),
                other => Err(anyhow!("Module2 has no action {other}")),
            }),
        )
        .with(
            "Module3",
            handler(|name: &str, state: &Term, p: &Params| match name {
                "my_action_3a" => Ok(ActionResult::new(json!({"x": int(p, "a") + int(p, "b") + 3}))
                    .with_emitted_context(event_context(p))
                    .with_next_action(
                        OperationSpec::new("my_action_3b").with_params({
                            let mut next = event_context(p);
                            next.insert("c".into(), json!(3));
                            next
                        }),
                    )),
                "my_action_3b" => {
                    let mut next_state = state.clone();
                    next_state["y"] = json!(int(p, "c") * 11);
                    let mut context = event_context(p);
                    context.insert("my_context".into(), json!(int(p, "c")));
                    Ok(ActionResult::new(next_state).with_emitted_context(context))
                }
                other => Err(anyhow!("Module3 has no action {other}")),
            }),
        )
        .with(
            "Module4",
            handler(|name: &str, _state: &Term, p: &Params| match name {
                "my_action_4" => Ok(ActionResult::new(json!({"x": int(p, "a") + int(p, "b") + 4}))
                    .with_emitted_context(event_context(p))
                    .with_next_command(
                        OperationSpec::new("my_command_5")
                            .with_params(params(json!({"c": 10, "d": 20})))
                            .with_target(cid2()),
                    )),
                other => Err(anyhow!("Module4 has no action {other}")),
            }),
        )
        .with(
            "Module5",
            handler(|name: &str, _state: &Term, p: &Params| match name {
                "my_action_5" => Ok(ActionResult::new(json!({"x": int(p, "a") + int(p, "b") + 5}))
                    .with_emitted_context(event_context(p))
                    .with_next_command(
                        OperationSpec::new("my_command_6")
                            .with_params(params(json!({"c": 10, "d": 20}))),
                    )),
                "command_done" => Ok(ActionResult::new(json!({"saved": p.get("ok").cloned()}))),
                other => Err(anyhow!("Module5 has no action {other}")),
            }),
        )
        .with(
            "Module6",
            handler(|name: &str, _state: &Term, p: &Params| match name {
                "my_action_6" => Ok(ActionResult::new(json!({"y": int(p, "c") * int(p, "c")}))
                    .with_emitted_context(params(json!({"my_context": int(p, "c")})))),
                other => Err(anyhow!("Module6 has no action {other}")),
            }),
        )
        .with(
            "Looping",
            handler(|name: &str, state: &Term, _p: &Params| {
                Ok(ActionResult::new(state.clone()).with_next_action(OperationSpec::new(name)))
            }),
        )
        .with(
            "SlowCounter",
            handler(|name: &str, state: &Term, _p: &Params| {
                let n = state.get("n").and_then(Value::as_i64).unwrap_or_default();
                match name {
                    "inc" => {
                        std::thread::sleep(Duration::from_millis(100));
                        Ok(ActionResult::new(json!({"n": n + 1})))
                    }
                    "save" => Ok(ActionResult::new(state.clone())
                        .with_next_command(OperationSpec::new("persist"))),
                    other => Err(anyhow!("SlowCounter has no action {other}")),
                }
            }),
        )
        .with(
            "Reader",
            handler(|_name: &str, state: &Term, p: &Params| {
                Ok(ActionResult::new(state.clone()).with_emitted_context(p.clone()))
            }),
        )
}

pub fn test_routes() -> RouteTable {
    RouteTable::new().with_route("Hologram.Module7", MODULE7_PATH)
}

pub struct Harness {
    pub runtime: Runtime,
    pub transport: Arc<RecordingTransport>,
    pub renderer: Arc<RecordingRenderer>,
    pub navigator: Arc<RecordingNavigator>,
}

pub fn harness_with(settings: RuntimeSettings, transport: Arc<RecordingTransport>) -> Harness {
    let renderer = Arc::new(RecordingRenderer::default());
    let navigator = Arc::new(RecordingNavigator::default());
    let runtime = Runtime::builder(settings)
        .handlers(fixture_handlers())
        .transport(transport.clone())
        .renderer(renderer.clone())
        .navigator(navigator.clone())
        .route_resolver(Arc::new(test_routes()))
        .build()
        .expect("runtime");

    Harness {
        runtime,
        transport,
        renderer,
        navigator,
    }
}

pub fn harness() -> Harness {
    harness_with(RuntimeSettings::default(), RecordingTransport::connected())
}
