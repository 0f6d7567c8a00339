use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use super::context::CliContext;
use super::output::{print_structured, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct SelectionArgs {
    #[command(subcommand)]
    pub command: SelectionCommand,
}

#[derive(Subcommand, Clone, Debug)]
pub enum SelectionCommand {
    /// Print the remembered destinations
    Show,
    /// Replace the remembered destinations (aliases or URLs)
    Set {
        #[arg(required = true, value_name = "ALIAS_OR_URL")]
        destinations: Vec<String>,
    },
    /// Forget the remembered destinations
    Clear,
}

#[derive(Serialize)]
struct SelectionView<'a> {
    #[serde(rename = "selectedServices")]
    selected_services: &'a [String],
}

pub fn cmd_selection(args: SelectionArgs, ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let store = ctx.selection_store();
    let selected = match args.command {
        SelectionCommand::Show => store.load()?,
        SelectionCommand::Set { destinations } => {
            let resolved: Vec<String> = destinations
                .iter()
                .map(|raw| ctx.config().resolve_destination(raw))
                .collect();
            store.save(&resolved)?;
            resolved
        }
        SelectionCommand::Clear => {
            store.clear()?;
            Vec::new()
        }
    };

    let view = SelectionView {
        selected_services: &selected,
    };
    if print_structured(format, &view)? {
        return Ok(());
    }
    if selected.is_empty() {
        println!("no destinations selected");
    }
    for destination in &selected {
        println!("{destination}");
    }
    Ok(())
}
