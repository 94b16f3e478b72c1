//! A two-component counter page used by `replay`.

use client_runtime::{ActionResult, ComponentEntry, HandlerRegistry};
use serde_json::json;
use shared::{
    domain::{ComponentId, ModuleRef, Params, Term},
    error::{ApiException, ErrorCode},
    protocol::OperationSpec,
};

pub const PAGE_MODULE: &str = "Demo.CounterPage";
pub const COUNTER_MODULE: &str = "Demo.Counter";

pub fn page_cid() -> ComponentId {
    ComponentId::from("page")
}

pub fn counter_cid() -> ComponentId {
    ComponentId::from("counter")
}

pub fn entries() -> Vec<(ComponentId, ComponentEntry)> {
    vec![
        (
            page_cid(),
            ComponentEntry::new(ModuleRef::from(PAGE_MODULE), json!({"title": "Counter"})),
        ),
        (
            counter_cid(),
            ComponentEntry::new(ModuleRef::from(COUNTER_MODULE), json!({"count": 0}))
                .with_parent(page_cid()),
        ),
    ]
}

fn count(state: &Term) -> i64 {
    state.get("count").and_then(Term::as_i64).unwrap_or_default()
}

fn step(params: &Params) -> i64 {
    params.get("by").and_then(Term::as_i64).unwrap_or(1)
}

fn counter(name: &str, state: &Term, params: &Params) -> anyhow::Result<ActionResult> {
    let current = count(state);
    let result = match name {
        "increment" => ActionResult::new(json!({"count": current + step(params)})),
        "decrement" => ActionResult::new(json!({"count": current - step(params)})),
        "reset" => ActionResult::new(json!({"count": 0})),
        "save" => ActionResult::new(state.clone()).with_next_command(
            OperationSpec::new("persist_count")
                .with_params([("count".to_string(), json!(current))].into_iter().collect()),
        ),
        "saved" => {
            let mut next = state.clone();
            next["saved_at"] = params.get("at").cloned().unwrap_or(Term::Null);
            ActionResult::new(next)
        }
        other => {
            return Err(ApiException::new(
                ErrorCode::NotFound,
                format!("{COUNTER_MODULE} has no action {other}"),
            )
            .into())
        }
    };
    Ok(result)
}

fn page(name: &str, _state: &Term, params: &Params) -> anyhow::Result<ActionResult> {
    match name {
        "set_title" => {
            let title = params.get("title").cloned().unwrap_or(Term::Null);
            let mut context = Params::new();
            context.insert("title".into(), title.clone());
            Ok(ActionResult::new(json!({"title": title})).with_emitted_context(context))
        }
        other => Err(ApiException::new(
            ErrorCode::NotFound,
            format!("{PAGE_MODULE} has no action {other}"),
        )
        .into()),
    }
}

pub fn handlers() -> HandlerRegistry {
    HandlerRegistry::new()
        .with(PAGE_MODULE, page)
        .with(COUNTER_MODULE, counter)
}
