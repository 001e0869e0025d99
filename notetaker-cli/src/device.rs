//! Device node resolution and session setup.
//!
//! Nodes are taken from, in order:
//! - `--primary`/`--secondary` (or their environment variables)
//! - the `[device]` table of the config file
//! - sysfs auto-detection, prompting when more than one pen is attached

use {
    crate::{Cli, CliError, config::Config},
    anyhow::{Context, Result},
    console::style,
    dialoguer::{Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, info},
    notetaker::{Channel, DeviceSession, DevicePaths},
    std::{
        cmp::Ordering,
        io::IsTerminal,
        path::PathBuf,
    },
};

/// Session over whichever channel implementation the platform provides.
pub(crate) type Session = DeviceSession<Box<dyn Channel>, Box<dyn Channel>>;

fn usage_err(message: impl Into<String>) -> anyhow::Error {
    CliError::Usage(message.into()).into()
}

/// Combine an explicit primary/secondary pair.
///
/// Both or neither must be given.
fn explicit_pair(
    primary: Option<&PathBuf>,
    secondary: Option<&PathBuf>,
    source: &str,
) -> Result<Option<DevicePaths>> {
    match (primary, secondary) {
        (Some(primary), Some(secondary)) => Ok(Some(DevicePaths {
            primary: primary.clone(),
            secondary: secondary.clone(),
        })),
        (None, None) => Ok(None),
        _ => Err(usage_err(format!(
            "{source} must name both the primary and the secondary hidraw node"
        ))),
    }
}

fn describe(paths: &DevicePaths) -> String {
    format!(
        "{} + {}",
        paths
            .primary
            .display(),
        paths
            .secondary
            .display()
    )
}

/// Pick one pen out of the detected candidates.
fn choose_device(mut candidates: Vec<DevicePaths>, non_interactive: bool) -> Result<DevicePaths> {
    match candidates
        .len()
        .cmp(&1)
    {
        Ordering::Less => Err(notetaker::Error::DeviceNotFound.into()),
        Ordering::Equal => {
            let paths = candidates.remove(0);
            info!("Auto-selected NoteTaker: {}", describe(&paths));
            Ok(paths)
        },
        Ordering::Greater if non_interactive => Err(usage_err(format!(
            "{} NoteTaker devices found; pass --primary and --secondary to choose one",
            candidates.len()
        ))),
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_device_interactive(candidates)
        },
    }
}

/// Resolve the hidraw nodes to talk to.
pub(crate) fn resolve_paths(cli: &Cli, config: &Config) -> Result<DevicePaths> {
    if let Some(paths) = explicit_pair(
        cli.primary
            .as_ref(),
        cli.secondary
            .as_ref(),
        "--primary/--secondary",
    )? {
        return Ok(paths);
    }

    if let Some(paths) = explicit_pair(
        config
            .device
            .primary
            .as_ref(),
        config
            .device
            .secondary
            .as_ref(),
        "The [device] config table",
    )
    .map_err(|e| CliError::Config(e.to_string()))?
    {
        debug!("Using device from config: {}", describe(&paths));
        return Ok(paths);
    }

    choose_device(notetaker::find_devices(), cli.non_interactive)
}

pub(crate) fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Interactive prompt requires a terminal; rerun with explicit options",
        ))
    }
}

pub(crate) fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Prompt cancelled".to_string()).into()
            } else {
                usage_err(format!("Prompt failed: {io_err}"))
            }
        },
    }
}

fn select_device_interactive(candidates: Vec<DevicePaths>) -> Result<DevicePaths> {
    eprintln!(
        "{} Found {} NoteTaker devices",
        style("ℹ").blue(),
        candidates.len()
    );

    let items: Vec<String> = candidates
        .iter()
        .map(describe)
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a device")
        .items(&items)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => candidates
            .into_iter()
            .nth(index)
            .ok_or_else(|| usage_err("Invalid selection")),
        None => Err(CliError::Cancelled("Device selection cancelled".to_string()).into()),
    }
}

#[cfg(target_os = "linux")]
fn open_channels(paths: &DevicePaths) -> Result<(Box<dyn Channel>, Box<dyn Channel>)> {
    use notetaker::HidrawChannel;

    let primary: Box<dyn Channel> = Box::new(
        HidrawChannel::open_primary(&paths.primary)
            .with_context(|| format!("Failed to open {}", paths.primary.display()))?,
    );
    let secondary: Box<dyn Channel> = Box::new(
        HidrawChannel::open_secondary(&paths.secondary)
            .with_context(|| format!("Failed to open {}", paths.secondary.display()))?,
    );
    Ok((primary, secondary))
}

#[cfg(not(target_os = "linux"))]
fn open_channels(_paths: &DevicePaths) -> Result<(Box<dyn Channel>, Box<dyn Channel>)> {
    Err(notetaker::Error::Unsupported("hidraw access is only available on Linux".to_string()).into())
}

/// Resolve the device and open a session on it.
pub(crate) fn connect(cli: &Cli, config: &Config) -> Result<Session> {
    let session_config = config.session_config(cli.timeout_ms)?;
    let paths = resolve_paths(cli, config)?;
    debug!("Opening {}", describe(&paths));

    let (primary, secondary) = open_channels(&paths)?;
    let session = DeviceSession::new(primary, secondary, session_config)
        .with_context(|| format!("Cannot use {}", describe(&paths)))?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(primary: &str, secondary: &str) -> DevicePaths {
        DevicePaths {
            primary: PathBuf::from(primary),
            secondary: PathBuf::from(secondary),
        }
    }

    #[test]
    fn test_explicit_pair_both() {
        let primary = PathBuf::from("/dev/hidraw0");
        let secondary = PathBuf::from("/dev/hidraw1");
        let paths = explicit_pair(Some(&primary), Some(&secondary), "flags")
            .unwrap()
            .unwrap();
        assert_eq!(paths, pair("/dev/hidraw0", "/dev/hidraw1"));
    }

    #[test]
    fn test_explicit_pair_none() {
        assert!(explicit_pair(None, None, "flags").unwrap().is_none());
    }

    #[test]
    fn test_explicit_pair_half_is_usage_error() {
        let primary = PathBuf::from("/dev/hidraw0");
        let err = explicit_pair(Some(&primary), None, "flags").unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Usage(_))));

        let err = explicit_pair(None, Some(&primary), "flags").unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Usage(_))));
    }

    #[test]
    fn test_choose_device_none_found() {
        let err = choose_device(Vec::new(), true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<notetaker::Error>(),
            Some(notetaker::Error::DeviceNotFound)
        ));
    }

    #[test]
    fn test_choose_device_single() {
        let paths = choose_device(vec![pair("/dev/hidraw2", "/dev/hidraw3")], true).unwrap();
        assert_eq!(paths.primary, PathBuf::from("/dev/hidraw2"));
    }

    #[test]
    fn test_choose_device_ambiguous_non_interactive() {
        let err = choose_device(
            vec![
                pair("/dev/hidraw0", "/dev/hidraw1"),
                pair("/dev/hidraw2", "/dev/hidraw3"),
            ],
            true,
        )
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Usage(_))));
    }

    #[test]
    fn test_map_prompt_error_interrupted_is_cancel() {
        let err = map_prompt_error(DialoguerError::IO(std::io::Error::from(
            std::io::ErrorKind::Interrupted,
        )));
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Cancelled(_))));
    }

    #[test]
    fn test_map_prompt_error_other_io_is_usage() {
        let err = map_prompt_error(DialoguerError::IO(std::io::Error::from(
            std::io::ErrorKind::BrokenPipe,
        )));
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Usage(_))));
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            describe(&pair("/dev/hidraw0", "/dev/hidraw1")),
            "/dev/hidraw0 + /dev/hidraw1"
        );
    }
}
