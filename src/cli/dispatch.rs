use anyhow::Result;

use super::selection::cmd_selection;
use super::send::cmd_send;
use super::sites::cmd_sites;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use crate::cli::env::CliArgs;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Send(args) => cmd_send(args, ctx, cli.output).await,
        Commands::Sites => cmd_sites(ctx, cli.output),
        Commands::Selection(args) => cmd_selection(args, ctx, cli.output),
    }
}
