use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tabcast_core_types::SiteKey;
use tracing::{debug, info};

use crate::builtin;
use crate::errors::RegistryError;
use crate::model::{ElementLocator, InjectionStrategy, InputProtocol};

/// Read-only lookup table from site key to injection strategy.
#[derive(Clone, Debug)]
pub struct StrategyRegistry {
    sites: BTreeMap<SiteKey, InjectionStrategy>,
    default: InjectionStrategy,
}

/// Strategy chosen for one page: the site entry, if any, and the default.
#[derive(Clone, Copy, Debug)]
pub struct ResolvedStrategy<'a> {
    pub site: Option<&'a InjectionStrategy>,
    pub default: &'a InjectionStrategy,
}

impl<'a> ResolvedStrategy<'a> {
    /// Site locators first, then the generic ones.
    pub fn locators(&self) -> impl Iterator<Item = &'a ElementLocator> + 'a {
        let default: &'a InjectionStrategy = self.default;
        let site: &'a [ElementLocator] = self.site.map(|s| s.locators.as_slice()).unwrap_or(&[]);
        site.iter().chain(default.locators.iter())
    }

    pub fn protocol(&self) -> &'a InputProtocol {
        match self.site {
            Some(strategy) => &strategy.protocol,
            None => &self.default.protocol,
        }
    }

    pub fn is_known_site(&self) -> bool {
        self.site.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct Overlay {
    #[serde(default)]
    sites: BTreeMap<String, InjectionStrategy>,
    #[serde(default)]
    default: Option<InjectionStrategy>,
}

impl StrategyRegistry {
    pub fn builtin() -> Self {
        let sites = builtin::sites()
            .into_iter()
            .map(|(key, strategy)| (SiteKey::new(key), strategy))
            .collect();
        Self {
            sites,
            default: builtin::default_strategy(),
        }
    }

    /// An empty table: every site resolves to `default`.
    pub fn with_default(default: InjectionStrategy) -> Self {
        Self {
            sites: BTreeMap::new(),
            default,
        }
    }

    pub fn insert(
        &mut self,
        site: SiteKey,
        strategy: InjectionStrategy,
    ) -> Result<(), RegistryError> {
        validate(site.as_str(), &strategy)?;
        self.sites.insert(site, strategy);
        Ok(())
    }

    pub fn resolve(&self, site: &SiteKey) -> ResolvedStrategy<'_> {
        let entry = self.sites.get(site);
        debug!(target: "site-registry", %site, known = entry.is_some(), "resolved strategy");
        ResolvedStrategy {
            site: entry,
            default: &self.default,
        }
    }

    pub fn default_strategy(&self) -> &InjectionStrategy {
        &self.default
    }

    pub fn sites(&self) -> impl Iterator<Item = (&SiteKey, &InjectionStrategy)> {
        self.sites.iter()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Merge entries from a YAML overlay; overlay keys replace existing ones.
    pub fn load_overlay(&mut self, path: &Path) -> Result<usize, RegistryError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let overlay: Overlay = serde_yaml::from_str(&raw).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(default) = overlay.default {
            validate("default", &default)?;
            self.default = default;
        }
        let count = overlay.sites.len();
        for (key, strategy) in overlay.sites {
            self.insert(SiteKey::new(&key), strategy)?;
        }
        info!(target: "site-registry", path = %path.display(), count, "strategy overlay loaded");
        Ok(count)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn validate(site: &str, strategy: &InjectionStrategy) -> Result<(), RegistryError> {
    if strategy.locators.is_empty() {
        return Err(RegistryError::EmptyLocators {
            site: site.to_string(),
        });
    }
    let needs_submit = matches!(strategy.protocol, InputProtocol::SubmitButton { .. });
    if needs_submit && strategy.protocol.submit_locators().is_empty() {
        return Err(RegistryError::EmptySubmitLocators {
            site: site.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommitKey, Pick};
    use std::io::Write;

    #[test]
    fn claude_locators_prefer_translate_no_then_generic() {
        let registry = StrategyRegistry::builtin();
        let resolved = registry.resolve(&SiteKey::new("claude.ai"));
        let selectors: Vec<&str> = resolved.locators().map(|l| l.selector.as_str()).collect();
        assert_eq!(selectors[0], r#"div[contenteditable="true"][translate="no"]"#);
        assert_eq!(selectors[1], r#"div[contenteditable="true"]"#);
        assert_eq!(resolved.protocol().name(), "content-editable");
    }

    #[test]
    fn unknown_site_uses_default_chain() {
        let registry = StrategyRegistry::builtin();
        let resolved = registry.resolve(&SiteKey::new("example.org"));
        assert!(!resolved.is_known_site());
        assert_eq!(
            resolved.locators().count(),
            registry.default_strategy().locators.len()
        );
        assert!(resolved
            .locators()
            .any(|l| l.selector == r#"div[contenteditable="true"]"#));
    }

    #[test]
    fn known_site_falls_through_to_default_locators() {
        let registry = StrategyRegistry::builtin();
        let resolved = registry.resolve(&SiteKey::new("chat.mistral.ai"));
        let last = resolved.locators().last().unwrap();
        assert_eq!(
            last,
            registry.default_strategy().locators.last().unwrap()
        );
    }

    #[test]
    fn chatgpt_form_submit_picks_last_match() {
        let registry = StrategyRegistry::builtin();
        let resolved = registry.resolve(&SiteKey::new("chatgpt.com"));
        let submit = resolved.protocol().submit_locators();
        assert_eq!(submit[0].pick, Pick::First);
        assert_eq!(submit[1].selector, r#"form button[type="submit"]"#);
        assert_eq!(submit[1].pick, Pick::Last);
    }

    #[test]
    fn aistudio_commits_with_control_held() {
        let registry = StrategyRegistry::builtin();
        let resolved = registry.resolve(&SiteKey::new("aistudio.google.com"));
        assert_eq!(
            resolved.protocol(),
            &InputProtocol::PlainInput {
                commit: CommitKey::CtrlEnter
            }
        );
    }

    #[test]
    fn overlay_adds_and_replaces_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
sites:
  chat.example.com:
    locators:
      - selector: "textarea#prompt"
      - selector: "div[role=textbox]"
        pick: last
    protocol:
      kind: plain_input
      commit: ctrl_enter
  claude.ai:
    locators:
      - selector: "div.ProseMirror"
    protocol:
      kind: content_editable
"#
        )
        .unwrap();

        let mut registry = StrategyRegistry::builtin();
        let before = registry.len();
        let loaded = registry.load_overlay(file.path()).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(registry.len(), before + 1);

        let resolved = registry.resolve(&SiteKey::new("chat.example.com"));
        let first: Vec<_> = resolved.locators().take(2).collect();
        assert_eq!(first[1].pick, Pick::Last);

        let claude = registry.resolve(&SiteKey::new("claude.ai"));
        assert_eq!(claude.locators().next().unwrap().selector, "div.ProseMirror");
    }

    #[test]
    fn overlay_rejects_submit_button_without_submit_locators() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
sites:
  broken.example:
    locators:
      - selector: textarea
    protocol:
      kind: submit_button
      submit: []
"#
        )
        .unwrap();

        let mut registry = StrategyRegistry::builtin();
        let err = registry.load_overlay(file.path()).unwrap_err();
        assert!(matches!(err, RegistryError::EmptySubmitLocators { .. }));
    }
}
