use clap::Subcommand;

use super::selection::SelectionArgs;
use super::send::SendArgs;

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Open every destination in its own tab and type the text into it
    Send(SendArgs),

    /// List the site strategies (built-in and overlay)
    Sites,

    /// Show or change the remembered destination selection
    Selection(SelectionArgs),
}
