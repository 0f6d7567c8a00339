//! Event-synthesis recipes, one per `InputProtocol` variant.

use site_registry::{CommitKey, ElementLocator, InputProtocol};
use tracing::debug;

use crate::dom::{DomEvent, ElementHandle};
use crate::errors::DomError;
use crate::session::InjectorSession;

pub(crate) async fn apply(
    session: &InjectorSession,
    element: ElementHandle,
    text: &str,
) -> Result<(), DomError> {
    let dom = &*session.dom;
    if !dom.is_connected(element).await? {
        return Err(DomError::Detached);
    }

    match &session.strategy.protocol {
        InputProtocol::PlainInput { commit } => {
            if dom.is_content_editable(element).await? {
                fill_content_editable(session, element, text).await?;
            } else {
                fill_plain(session, element, text).await?;
            }
            commit_with_key(session, element, *commit).await
        }
        InputProtocol::ContentEditable { commit } => {
            fill_content_editable(session, element, text).await?;
            commit_with_key(session, element, *commit).await
        }
        InputProtocol::Composition { submit, commit } => {
            dom.focus(element).await?;
            dom.dispatch_event(element, &DomEvent::CompositionStart)
                .await?;
            dom.set_text_content(element, text).await?;
            dom.dispatch_event(
                element,
                &DomEvent::CompositionUpdate {
                    data: text.to_string(),
                },
            )
            .await?;
            dom.dispatch_event(
                element,
                &DomEvent::CompositionEnd {
                    data: text.to_string(),
                },
            )
            .await?;
            tokio::time::sleep(session.policy.settle()).await;
            match find_enabled(session, submit).await? {
                Some(button) => dom.click(button).await,
                None => {
                    debug!(target: "injector", "no submit control, committing with key");
                    dom.dispatch_key(element, *commit).await
                }
            }
        }
        InputProtocol::SubmitButton { submit } => {
            if dom.is_content_editable(element).await? {
                fill_content_editable(session, element, text).await?;
            } else {
                fill_plain(session, element, text).await?;
            }
            let button = wait_for_submit(session, submit).await?;
            dom.click(button).await
        }
    }
}

async fn fill_plain(
    session: &InjectorSession,
    element: ElementHandle,
    text: &str,
) -> Result<(), DomError> {
    let dom = &*session.dom;
    dom.focus(element).await?;
    dom.set_value(element, text).await?;
    dom.dispatch_event(element, &DomEvent::Input).await?;
    dom.dispatch_event(element, &DomEvent::Change).await
}

async fn fill_content_editable(
    session: &InjectorSession,
    element: ElementHandle,
    text: &str,
) -> Result<(), DomError> {
    let dom = &*session.dom;
    dom.set_text_content(element, text).await?;
    dom.dispatch_event(element, &DomEvent::Input).await?;
    dom.focus(element).await
}

async fn commit_with_key(
    session: &InjectorSession,
    element: ElementHandle,
    key: CommitKey,
) -> Result<(), DomError> {
    tokio::time::sleep(session.policy.settle()).await;
    session.dom.dispatch_key(element, key).await
}

/// First attached submit control that is currently enabled.
async fn find_enabled(
    session: &InjectorSession,
    locators: &[ElementLocator],
) -> Result<Option<ElementHandle>, DomError> {
    for locator in locators {
        if let Some(button) = session.find(locator).await {
            if session.dom.is_enabled(button).await? {
                return Ok(Some(button));
            }
        }
    }
    Ok(None)
}

async fn wait_for_submit(
    session: &InjectorSession,
    locators: &[ElementLocator],
) -> Result<ElementHandle, DomError> {
    let attempts = session.policy.submit_poll_attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(button) = find_enabled(session, locators).await? {
            return Ok(button);
        }
        if attempt < attempts {
            tokio::time::sleep(session.policy.submit_poll_interval()).await;
        }
    }
    Err(DomError::SubmitUnavailable)
}
