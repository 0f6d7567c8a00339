use std::sync::Arc;
use std::time::Duration;

use injector::testing::{DomCall, FakeDom};
use injector::{
    DeliveryError, DomEvent, InjectionOutcome, InjectorHost, InjectorPolicy, InjectorSession,
    InjectorState,
};
use site_registry::{CommitKey, StrategyRegistry};
use tabcast_core_types::{ErrorKind, InjectionCommand, SiteKey, TabId};
use tokio::time::Instant;

fn session_for(dom: &Arc<FakeDom>, site: &str) -> InjectorSession {
    InjectorSession::new(
        dom.clone(),
        SiteKey::new(site),
        &StrategyRegistry::builtin(),
        InjectorPolicy::default(),
    )
}

fn assert_elapsed(started: Instant, expected: Duration) {
    let elapsed = started.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(50),
        "elapsed {elapsed:?}, expected {expected:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn plain_input_fills_then_commits_after_settle() {
    let dom = Arc::new(FakeDom::new("chat.deepseek.com"));
    let input = dom.add_textarea(&["#chat-input"]);
    let session = session_for(&dom, "chat.deepseek.com");

    let started = Instant::now();
    let outcome = session.handle_injection_command("hello").await;

    assert_eq!(outcome, InjectionOutcome::Succeeded);
    assert_elapsed(started, Duration::from_secs(1));
    assert_eq!(dom.value(input).as_deref(), Some("hello"));
    assert_eq!(
        dom.mutations(),
        vec![
            DomCall::Focus(input),
            DomCall::SetValue(input, "hello".into()),
            DomCall::Event(input, DomEvent::Input),
            DomCall::Event(input, DomEvent::Change),
            DomCall::Key(input, CommitKey::Enter),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn aistudio_commits_with_control_enter() {
    let dom = Arc::new(FakeDom::new("aistudio.google.com"));
    let input = dom.add_textarea(&[r#"textarea[placeholder="Type something"]"#]);
    let session = session_for(&dom, "aistudio.google.com");

    assert_eq!(
        session.handle_injection_command("hi").await,
        InjectionOutcome::Succeeded
    );
    assert_eq!(
        dom.mutations().last(),
        Some(&DomCall::Key(input, CommitKey::CtrlEnter))
    );
}

#[tokio::test(start_paused = true)]
async fn content_editable_sets_text_then_focuses() {
    let dom = Arc::new(FakeDom::new("claude.ai"));
    let editor = dom.add_content_editable(&[r#"div[contenteditable="true"][translate="no"]"#]);
    let session = session_for(&dom, "claude.ai");

    assert_eq!(
        session.handle_injection_command("hello").await,
        InjectionOutcome::Succeeded
    );
    assert_eq!(dom.text(editor).as_deref(), Some("hello"));
    assert_eq!(
        dom.mutations(),
        vec![
            DomCall::SetText(editor, "hello".into()),
            DomCall::Event(editor, DomEvent::Input),
            DomCall::Focus(editor),
            DomCall::Key(editor, CommitKey::Enter),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn composition_clicks_send_button() {
    let dom = Arc::new(FakeDom::new("gemini.google.com"));
    let editor = dom.add_content_editable(&[r#".ql-editor[contenteditable="true"]"#]);
    let send = dom.add_button(&[".send-button"], true);
    let session = session_for(&dom, "gemini.google.com");

    assert_eq!(
        session.handle_injection_command("hola").await,
        InjectionOutcome::Succeeded
    );
    assert_eq!(
        dom.mutations(),
        vec![
            DomCall::Focus(editor),
            DomCall::Event(editor, DomEvent::CompositionStart),
            DomCall::SetText(editor, "hola".into()),
            DomCall::Event(
                editor,
                DomEvent::CompositionUpdate {
                    data: "hola".into()
                }
            ),
            DomCall::Event(
                editor,
                DomEvent::CompositionEnd {
                    data: "hola".into()
                }
            ),
            DomCall::Click(send),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn composition_without_submit_control_uses_commit_key() {
    let dom = Arc::new(FakeDom::new("gemini.google.com"));
    let editor = dom.add_content_editable(&[r#"rich-textarea [contenteditable="true"]"#]);
    let session = session_for(&dom, "gemini.google.com");

    assert_eq!(
        session.handle_injection_command("hola").await,
        InjectionOutcome::Succeeded
    );
    assert_eq!(
        dom.mutations().last(),
        Some(&DomCall::Key(editor, CommitKey::Enter))
    );
}

#[tokio::test(start_paused = true)]
async fn submit_button_waits_until_enabled() {
    let dom = Arc::new(FakeDom::new("chatgpt.com"));
    let prompt = dom.add_content_editable(&["#prompt-textarea"]);
    let send = dom.add_button(&[r#"button[data-testid="send-button"]"#], false);
    let session = session_for(&dom, "chatgpt.com");

    let toggler = {
        let dom = dom.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            dom.set_enabled(send, true);
        })
    };

    let started = Instant::now();
    let outcome = session.handle_injection_command("go").await;
    toggler.await.unwrap();

    assert_eq!(outcome, InjectionOutcome::Succeeded);
    assert_elapsed(started, Duration::from_millis(1500));
    assert_eq!(dom.text(prompt).as_deref(), Some("go"));
    assert_eq!(dom.mutations().last(), Some(&DomCall::Click(send)));
}

#[tokio::test(start_paused = true)]
async fn submit_button_never_enabled_exhausts_injection_attempts() {
    let dom = Arc::new(FakeDom::new("chatgpt.com"));
    dom.add_textarea(&["#prompt-textarea"]);
    dom.add_button(&[r#"button[data-testid="send-button"]"#], false);
    let session = session_for(&dom, "chatgpt.com");

    let outcome = session.handle_injection_command("go").await;

    assert_eq!(outcome, InjectionOutcome::Failed(ErrorKind::InjectionFailed));
    assert_eq!(session.state(), InjectorState::Failed);
    assert!(!dom
        .mutations()
        .iter()
        .any(|call| matches!(call, DomCall::Click(_))));
}

#[tokio::test(start_paused = true)]
async fn missing_element_fails_after_polling_budget() {
    let dom = Arc::new(FakeDom::new("chat.deepseek.com"));
    let session = session_for(&dom, "chat.deepseek.com");

    let started = Instant::now();
    let outcome = session.handle_injection_command("hello").await;

    assert_eq!(outcome, InjectionOutcome::Failed(ErrorKind::ElementNotFound));
    assert_elapsed(started, Duration::from_secs(29));
    // 3 site locators + 5 generic ones, 30 polls
    assert_eq!(dom.query_count(), 8 * 30);
    assert!(dom.mutations().is_empty());
    assert!(!session.is_processing());
}

#[tokio::test(start_paused = true)]
async fn element_rendered_late_is_picked_up_by_polling() {
    let dom = Arc::new(FakeDom::new("huggingface.co"));
    let session = session_for(&dom, "huggingface.co");

    let renderer = {
        let dom = dom.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(4500)).await;
            dom.add_textarea(&[r#"textarea[placeholder="Ask anything"]"#])
        })
    };

    let started = Instant::now();
    let outcome = session.handle_injection_command("hello").await;
    let input = renderer.await.unwrap();

    assert_eq!(outcome, InjectionOutcome::Succeeded);
    // found on the poll at 5s, then 1s settle
    assert_elapsed(started, Duration::from_secs(6));
    assert_eq!(dom.value(input).as_deref(), Some("hello"));
}

#[tokio::test(start_paused = true)]
async fn injection_retries_then_succeeds() {
    let dom = Arc::new(FakeDom::new("chat.deepseek.com"));
    let input = dom.add_textarea(&["#chat-input"]);
    dom.fail_writes(2);
    let session = session_for(&dom, "chat.deepseek.com");

    let started = Instant::now();
    let outcome = session.handle_injection_command("hello").await;

    assert_eq!(outcome, InjectionOutcome::Succeeded);
    // two failed attempts with 1s between them, then the 1s settle
    assert_elapsed(started, Duration::from_secs(3));
    assert_eq!(dom.value(input).as_deref(), Some("hello"));
}

#[tokio::test(start_paused = true)]
async fn injection_fails_after_three_attempts() {
    let dom = Arc::new(FakeDom::new("chat.deepseek.com"));
    dom.add_textarea(&["#chat-input"]);
    dom.fail_writes(3);
    let session = session_for(&dom, "chat.deepseek.com");

    let started = Instant::now();
    let outcome = session.handle_injection_command("hello").await;

    assert_eq!(outcome, InjectionOutcome::Failed(ErrorKind::InjectionFailed));
    assert_elapsed(started, Duration::from_secs(2));
    let focuses = dom
        .mutations()
        .iter()
        .filter(|call| matches!(call, DomCall::Focus(_)))
        .count();
    assert_eq!(focuses, 3);
}

#[tokio::test(start_paused = true)]
async fn retry_re_resolves_a_re_rendered_element() {
    let dom = Arc::new(FakeDom::new("chat.deepseek.com"));
    let first = dom.add_textarea(&["#chat-input"]);
    dom.fail_writes(1);
    let session = Arc::new(session_for(&dom, "chat.deepseek.com"));

    let rerender = {
        let dom = dom.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            dom.detach(first);
            dom.add_textarea(&["#chat-input"])
        })
    };

    let outcome = session.handle_injection_command("hello").await;
    let second = rerender.await.unwrap();

    assert_eq!(outcome, InjectionOutcome::Succeeded);
    assert_eq!(dom.value(first).as_deref(), Some(""));
    assert_eq!(dom.value(second).as_deref(), Some("hello"));
}

#[tokio::test(start_paused = true)]
async fn concurrent_command_is_a_no_op() {
    let dom = Arc::new(FakeDom::new("chat.deepseek.com"));
    let session = session_for(&dom, "chat.deepseek.com");

    let renderer = {
        let dom = dom.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            dom.add_textarea(&["#chat-input"])
        })
    };

    let (first, second) = tokio::join!(
        session.handle_injection_command("one"),
        session.handle_injection_command("two"),
    );
    let input = renderer.await.unwrap();

    assert_eq!(first, InjectionOutcome::Succeeded);
    assert_eq!(second, InjectionOutcome::Skipped);
    assert_eq!(dom.value(input).as_deref(), Some("one"));
    let writes = dom
        .mutations()
        .iter()
        .filter(|call| matches!(call, DomCall::SetValue(..)))
        .count();
    assert_eq!(writes, 1);
}

#[tokio::test(start_paused = true)]
async fn host_rejects_delivery_without_injector() {
    let host = InjectorHost::new();
    let err = host
        .deliver(TabId::new(), &InjectionCommand::type_text("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::NoReceiver(_)));
}

#[tokio::test(start_paused = true)]
async fn host_duplicate_delivery_injects_once() {
    let dom = Arc::new(FakeDom::new("chat.deepseek.com"));
    let input = dom.add_textarea(&["#chat-input"]);
    let host = InjectorHost::new();
    let tab = TabId::new();
    host.attach(tab, session_for(&dom, "chat.deepseek.com"));

    let command = InjectionCommand::type_text("hello");
    host.deliver(tab, &command).await.unwrap();
    host.deliver(tab, &command).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(dom.value(input).as_deref(), Some("hello"));
    let writes = dom
        .mutations()
        .iter()
        .filter(|call| matches!(call, DomCall::SetValue(..)))
        .count();
    assert_eq!(writes, 1);
}

#[tokio::test(start_paused = true)]
async fn detached_injector_stops_receiving() {
    let dom = Arc::new(FakeDom::new("chat.deepseek.com"));
    let host = InjectorHost::new();
    let tab = TabId::new();
    let actor = host.attach(tab, session_for(&dom, "chat.deepseek.com"));
    assert!(host.is_attached(tab));

    assert!(host.detach(tab));
    actor.await.unwrap();

    let err = host
        .deliver(tab, &InjectionCommand::type_text("late"))
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::NoReceiver(_)));
}
