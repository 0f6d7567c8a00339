use anyhow::Result;
use serde::Serialize;
use site_registry::{InjectionStrategy, StrategyRegistry};

use super::context::CliContext;
use super::output::{print_structured, OutputFormat};

#[derive(Serialize)]
struct SiteEntry<'a> {
    site: &'a str,
    #[serde(flatten)]
    strategy: &'a InjectionStrategy,
}

#[derive(Serialize)]
struct SitesView<'a> {
    sites: Vec<SiteEntry<'a>>,
    default: &'a InjectionStrategy,
}

pub fn cmd_sites(ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let registry = ctx.strategies()?;
    let view = sites_view(&registry);
    if print_structured(format, &view)? {
        return Ok(());
    }

    println!("{:<24} {:<18} LOCATORS", "SITE", "PROTOCOL");
    for entry in &view.sites {
        print_row(entry.site, entry.strategy);
    }
    print_row("(default)", view.default);
    Ok(())
}

fn sites_view(registry: &StrategyRegistry) -> SitesView<'_> {
    SitesView {
        sites: registry
            .sites()
            .map(|(site, strategy)| SiteEntry {
                site: site.as_str(),
                strategy,
            })
            .collect(),
        default: registry.default_strategy(),
    }
}

fn print_row(site: &str, strategy: &InjectionStrategy) {
    let locators: Vec<&str> = strategy
        .locators
        .iter()
        .map(|locator| locator.selector.as_str())
        .collect();
    println!(
        "{:<24} {:<18} {}",
        site,
        strategy.protocol.name(),
        locators.join(" | ")
    );
}
