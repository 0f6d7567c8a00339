use serde::{Deserialize, Serialize};

/// Which attached match wins when a selector matches several elements.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pick {
    #[default]
    First,
    Last,
}

/// A rule for finding an element in the destination page.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ElementLocator {
    pub selector: String,
    #[serde(default, skip_serializing_if = "is_first")]
    pub pick: Pick,
}

fn is_first(pick: &Pick) -> bool {
    matches!(pick, Pick::First)
}

impl ElementLocator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            pick: Pick::First,
        }
    }

    pub fn last(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            pick: Pick::Last,
        }
    }
}

/// Keyboard signal used to commit the typed text.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitKey {
    #[default]
    Enter,
    CtrlEnter,
}

impl CommitKey {
    pub fn ctrl(&self) -> bool {
        matches!(self, CommitKey::CtrlEnter)
    }
}

/// Event-synthesis recipe that makes a host page accept programmatic text.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputProtocol {
    /// focus, set `value`, bubbling `input` + `change`, settle, commit key.
    PlainInput {
        #[serde(default)]
        commit: CommitKey,
    },
    /// set `textContent`, bubbling `input`, focus, settle, commit key.
    ContentEditable {
        #[serde(default)]
        commit: CommitKey,
    },
    /// IME-style composition events, then an explicit submit control.
    /// `commit` is used when no submit control can be found.
    Composition {
        submit: Vec<ElementLocator>,
        #[serde(default)]
        commit: CommitKey,
    },
    /// Fill with the element-appropriate method, then wait for the submit
    /// control to become enabled and click it.
    SubmitButton { submit: Vec<ElementLocator> },
}

impl InputProtocol {
    pub fn name(&self) -> &'static str {
        match self {
            InputProtocol::PlainInput { .. } => "plain-input",
            InputProtocol::ContentEditable { .. } => "content-editable",
            InputProtocol::Composition { .. } => "composition",
            InputProtocol::SubmitButton { .. } => "submit-button",
        }
    }

    /// Submit-control locators, for protocols that use one.
    pub fn submit_locators(&self) -> &[ElementLocator] {
        match self {
            InputProtocol::Composition { submit, .. } | InputProtocol::SubmitButton { submit } => {
                submit
            }
            _ => &[],
        }
    }
}

/// Locators plus protocol for one site.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InjectionStrategy {
    pub locators: Vec<ElementLocator>,
    pub protocol: InputProtocol,
}

impl InjectionStrategy {
    pub fn new(locators: Vec<ElementLocator>, protocol: InputProtocol) -> Self {
        Self { locators, protocol }
    }
}
