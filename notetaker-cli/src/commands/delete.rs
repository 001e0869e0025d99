//! Note erase command implementation.

use {
    crate::{
        Cli, CliError,
        config::Config,
        device::{self, ensure_interactive_terminal, map_prompt_error},
    },
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, theme::ColorfulTheme},
    notetaker::{Channel, DeviceSession},
};

/// Decide whether erasing may proceed without asking.
///
/// Returns `Ok(true)` when confirmation was given up front and `Ok(false)`
/// when a prompt is needed.
fn confirmed_upfront(yes: bool, non_interactive: bool) -> Result<bool> {
    if yes {
        Ok(true)
    } else if non_interactive {
        Err(CliError::Usage(
            "Refusing to erase notes without confirmation; pass --yes".to_string(),
        )
        .into())
    } else {
        Ok(false)
    }
}

fn confirm_erase() -> Result<()> {
    ensure_interactive_terminal()?;
    let answer = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Erase all notes stored in the pen?")
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?;

    if answer == Some(true) {
        Ok(())
    } else {
        Err(CliError::Cancelled("Erase cancelled".to_string()).into())
    }
}

/// Erase the pen's memory through an open session.
pub(crate) fn erase_notes<P: Channel, S: Channel>(session: &mut DeviceSession<P, S>) -> Result<()> {
    session.delete_all_notes()?;
    Ok(())
}

/// Delete command implementation.
pub(crate) fn cmd_delete(cli: &Cli, config: &Config, yes: bool) -> Result<()> {
    if !confirmed_upfront(yes, cli.non_interactive)? {
        confirm_erase()?;
    }

    let mut session = device::connect(cli, config)?;
    erase_notes(&mut session)?;

    if !cli.quiet {
        eprintln!(
            "{} Notes erased",
            style("✓")
                .green()
                .bold()
        );
    }
    Ok(())
}
