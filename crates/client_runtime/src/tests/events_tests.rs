use super::*;

use serde_json::json;
use shared::domain::{CommandStatus, ModuleRef};

use crate::test_support::*;

fn click_event() -> UiEvent {
    UiEvent::new(
        EventPosition { page_x: 1, page_y: 2 },
        Arc::new(DomNode::new("dummy_node")),
    )
}

fn ignored_event() -> UiEvent {
    let mut event = click_event();
    event.modifiers.ctrl = true;
    event
}

fn page_link_spec(name: &str) -> OperationSpecNode {
    OperationSpecNode::Expression(Operation::Action(
        OperationSpec::new(name).with_params(params(json!({"to": "Hologram.Module7"}))),
    ))
}

#[test]
fn modifiers_and_secondary_buttons_are_ignored() {
    assert!(!click_event().is_ignored());
    assert!(ignored_event().is_ignored());

    for modifiers in [
        Modifiers { meta: true, ..Modifiers::default() },
        Modifiers { shift: true, ..Modifiers::default() },
        Modifiers { alt: true, ..Modifiers::default() },
    ] {
        let mut event = click_event();
        event.modifiers = modifiers;
        assert!(event.is_ignored(), "{modifiers:?}");
    }

    let mut event = click_event();
    event.button = Some(MouseButton::Auxiliary);
    assert!(event.is_ignored());
    event.button = Some(MouseButton::Primary);
    assert!(!event.is_ignored());
}

#[tokio::test]
async fn ignored_event_touches_nothing() {
    let h = harness();
    h.runtime.hydrate([(cid1(), entry("Module4")), (cid2(), entry("Module5"))]);

    for spec in [
        OperationSpecNode::Text("my_action_4".into()),
        OperationSpecNode::Expression(Operation::Command(OperationSpec::new("my_command"))),
        page_link_spec("__prefetch_page__"),
    ] {
        let outcome = h
            .runtime
            .handle_event(&ignored_event(), "click", &spec, &cid1())
            .expect("ignored");
        assert_eq!(outcome, EventOutcome::Ignored);
        assert!(!outcome.default_prevented());
    }

    h.runtime.settle().await;
    assert_eq!(h.runtime.queue_size(), 0);
    assert_eq!(h.renderer.count(), 0);
    assert!(h.transport.sent().is_empty());
    assert!(h.transport.fetched().is_empty());
    assert_eq!(h.runtime.get_entry(&cid1()), Some(entry("Module4")));
}

#[tokio::test]
async fn text_spec_runs_action_on_default_target_with_event_params() {
    let h = harness();
    h.runtime.hydrate([(cid1(), entry("Reader"))]);

    let outcome = h
        .runtime
        .handle_event(
            &click_event(),
            "click",
            &OperationSpecNode::Text("my_action".into()),
            &cid1(),
        )
        .expect("handled");

    assert_eq!(outcome, EventOutcome::Handled(EventRoute::Action));
    assert!(outcome.default_prevented());
    assert_eq!(
        h.runtime.get_emitted_context(&cid1()),
        Some(params(json!({"event": {"page_x": 1, "page_y": 2}})))
    );
    assert_eq!(h.renderer.count(), 1);
    assert_eq!(h.runtime.queue_size(), 0);
}

#[tokio::test]
async fn embedded_action_keeps_explicit_target() {
    let h = harness();
    h.runtime.hydrate([(cid1(), entry("Module1")), (cid2(), entry("Reader"))]);

    let spec = OperationSpecNode::Expression(Operation::Action(
        OperationSpec::new("read")
            .with_params(params(json!({"q": "x"})))
            .with_target(cid2()),
    ));
    h.runtime
        .handle_event(&click_event(), "click", &spec, &cid1())
        .expect("handled");

    assert_eq!(
        h.runtime.get_emitted_context(&cid2()),
        Some(params(json!({"q": "x", "event": {"page_x": 1, "page_y": 2}})))
    );
    assert_eq!(h.runtime.get_entry(&cid1()), Some(entry("Module1")));
}

#[tokio::test]
async fn prefetch_action_is_routed_to_prefetch_cache() {
    let h = harness();
    let event = click_event();

    let outcome = h
        .runtime
        .handle_event(&event, "click", &page_link_spec("__prefetch_page__"), &cid1())
        .expect("handled");

    let tag = event.target.hologram_id().expect("node tagged");
    assert_eq!(
        outcome,
        EventOutcome::Handled(EventRoute::Prefetch(PrefetchOutcome::Started {
            map_key: format!("{tag}:{MODULE7_PATH}"),
        }))
    );
    h.runtime.settle().await;

    assert_eq!(h.transport.fetched(), vec![ModuleRef::from("Hologram.Module7")]);
    assert_eq!(h.renderer.count(), 0);
    assert_eq!(h.runtime.queue_size(), 0);
}

#[tokio::test]
async fn navigate_action_prefetches_on_pointerdown_and_loads_on_click() {
    let h = harness();
    let event = click_event();
    let spec = page_link_spec("__load_prefetched_page__");

    let pressed = h
        .runtime
        .handle_event(&event, "pointerdown", &spec, &cid1())
        .expect("pointerdown");
    assert!(matches!(
        pressed,
        EventOutcome::Handled(EventRoute::Prefetch(PrefetchOutcome::Started { .. }))
    ));
    h.runtime.settle().await;

    let clicked = h
        .runtime
        .handle_event(&event, "click", &spec, &cid1())
        .expect("click");

    assert_eq!(
        clicked,
        EventOutcome::Handled(EventRoute::Navigate(NavigationOutcome::Loaded {
            path: MODULE7_PATH.into(),
        }))
    );
    assert_eq!(
        h.navigator.calls(),
        vec![NavigatorCall::Load {
            path: MODULE7_PATH.into(),
            html: "<html>Hologram.Module7</html>".into(),
        }]
    );
    assert_eq!(h.transport.fetched().len(), 1);
}

#[tokio::test]
async fn command_is_pushed_and_processed_without_render() {
    let h = harness_with(
        crate::RuntimeSettings::default(),
        RecordingTransport::disconnected(),
    );
    h.runtime.hydrate([(cid1(), entry("Module5"))]);

    let spec = OperationSpecNode::Expression(Operation::Command(OperationSpec::new("my_command")));
    let outcome = h
        .runtime
        .handle_event(&click_event(), "click", &spec, &cid1())
        .expect("handled");

    let EventOutcome::Handled(EventRoute::Command { id }) = outcome else {
        panic!("expected command route, got {outcome:?}");
    };
    let pending = h.runtime.next_pending_command().expect("queued");
    assert_eq!(pending.id, id);
    assert_eq!(pending.name, "my_command");
    assert_eq!(pending.module, ModuleRef::from("Module5"));
    assert_eq!(pending.target, cid1());
    assert_eq!(pending.status, CommandStatus::Pending);
    assert_eq!(
        pending.params,
        params(json!({"event": {"page_x": 1, "page_y": 2}}))
    );
    assert_eq!(h.renderer.count(), 0);
    assert_eq!(h.runtime.get_state(&cid1()), Some(json!({})));

    h.transport.set_connected(true);
    h.runtime.process_commands();
    h.runtime.settle().await;
    assert_eq!(h.transport.sent().len(), 1);
    assert_eq!(h.runtime.queue_size(), 0);
    assert_eq!(h.renderer.count(), 0);
}

#[tokio::test]
async fn command_against_unmounted_target_is_an_error() {
    let h = harness();
    let spec = OperationSpecNode::Expression(Operation::Command(OperationSpec::new("my_command")));

    let err = h
        .runtime
        .handle_event(&click_event(), "click", &spec, &cid1())
        .expect_err("not mounted");

    assert!(matches!(err, RuntimeError::ComponentNotFound(_)));
    assert_eq!(h.runtime.queue_size(), 0);
}
