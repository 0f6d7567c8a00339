//! Built-in strategy table.

use crate::model::{CommitKey, ElementLocator, InjectionStrategy, InputProtocol};

fn css(selectors: &[&str]) -> Vec<ElementLocator> {
    selectors.iter().map(|s| ElementLocator::css(*s)).collect()
}

fn plain(commit: CommitKey) -> InputProtocol {
    InputProtocol::PlainInput { commit }
}

/// Known destinations, keyed by host.
pub fn sites() -> Vec<(&'static str, InjectionStrategy)> {
    vec![
        (
            "chat.mistral.ai",
            InjectionStrategy::new(
                css(&[
                    r#"textarea[placeholder="Ask le Chat or @mention an agent"]"#,
                    r#"textarea[placeholder*="message"]"#,
                ]),
                plain(CommitKey::Enter),
            ),
        ),
        (
            "claude.ai",
            InjectionStrategy::new(
                css(&[
                    r#"div[contenteditable="true"][translate="no"]"#,
                    r#"div[contenteditable="true"]"#,
                ]),
                InputProtocol::ContentEditable {
                    commit: CommitKey::Enter,
                },
            ),
        ),
        (
            "chat.openai.com",
            InjectionStrategy::new(
                css(&[
                    r#"textarea[placeholder*="Send a message"]"#,
                    r#"textarea[data-id="root"]"#,
                    "textarea",
                ]),
                plain(CommitKey::Enter),
            ),
        ),
        (
            "chatgpt.com",
            InjectionStrategy::new(
                css(&["#prompt-textarea", r#"textarea[placeholder*="Message"]"#]),
                InputProtocol::SubmitButton {
                    // the composer form is the last one on the page
                    submit: vec![
                        ElementLocator::css(r#"button[data-testid="send-button"]"#),
                        ElementLocator::last(r#"form button[type="submit"]"#),
                        ElementLocator::css(r#"button[aria-label*="Send"]"#),
                    ],
                },
            ),
        ),
        (
            "chat.deepseek.com",
            InjectionStrategy::new(
                css(&[
                    "#chat-input",
                    r#"textarea[placeholder*="Send a message"]"#,
                    "textarea",
                ]),
                plain(CommitKey::Enter),
            ),
        ),
        (
            "aistudio.google.com",
            InjectionStrategy::new(
                css(&[
                    r#"textarea[placeholder="Type something"]"#,
                    r#"textarea[placeholder*="message"]"#,
                    "textarea",
                ]),
                plain(CommitKey::CtrlEnter),
            ),
        ),
        (
            "huggingface.co",
            InjectionStrategy::new(
                css(&[
                    r#"textarea[placeholder="Ask anything"]"#,
                    r#"textarea[enterkeyhint="enter"]"#,
                    "textarea.scrollbar-custom",
                ]),
                plain(CommitKey::Enter),
            ),
        ),
        (
            "gemini.google.com",
            InjectionStrategy::new(
                css(&[
                    r#".ql-editor[contenteditable="true"]"#,
                    r#"rich-textarea [contenteditable="true"]"#,
                ]),
                InputProtocol::Composition {
                    submit: css(&[
                        r#"button[aria-label*="Send"]"#,
                        ".send-button",
                        r#"button[mattooltip*="Send"]"#,
                    ]),
                    commit: CommitKey::Enter,
                },
            ),
        ),
    ]
}

/// Safety net for sites without an entry.
pub fn default_strategy() -> InjectionStrategy {
    InjectionStrategy::new(
        css(&[
            ".relative textarea",
            r#"textarea[rows="1"]"#,
            r#"textarea[placeholder*="message"]"#,
            r#"textarea[placeholder*="Send"]"#,
            r#"div[contenteditable="true"]"#,
        ]),
        plain(CommitKey::Enter),
    )
}
