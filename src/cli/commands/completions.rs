//! Shell completions command implementation.

use crate::cli::{Cli, Shell};
use crate::error::Result;
use clap::CommandFactory;
use clap_complete::{generate, Shell as Target};
use std::io;

/// Write completions for `shell` to stdout.
pub fn execute(shell: &Shell) -> Result<()> {
    let target = match shell {
        Shell::Bash => Target::Bash,
        Shell::Zsh => Target::Zsh,
        Shell::Fish => Target::Fish,
        Shell::PowerShell => Target::PowerShell,
        Shell::Elvish => Target::Elvish,
    };

    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(target, &mut cmd, name, &mut io::stdout());
    Ok(())
}
