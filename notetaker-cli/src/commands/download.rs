//! Note download command implementation.

use {
    crate::{Cli, CliError, config::Config, device, use_fancy_output},
    anyhow::{Context, Result},
    console::style,
    indicatif::{ProgressBar, ProgressStyle},
    notetaker::{Channel, DeviceSession, DownloadState},
    std::{
        io::{BufWriter, Write},
        path::Path,
    },
    tempfile::NamedTempFile,
};

/// Refuse to clobber an existing file unless forced.
pub(crate) fn check_output(output: &Path, force: bool) -> Result<()> {
    if output.is_dir() {
        return Err(CliError::Usage(format!("{} is a directory", output.display())).into());
    }
    if !force && output.exists() {
        return Err(CliError::Usage(format!(
            "{} already exists; use --force to overwrite it",
            output.display()
        ))
        .into());
    }
    Ok(())
}

fn progress_bar(cli: &Cli) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    }
}

/// Download the archive into `sink`, mirroring progress on `pb`.
pub(crate) fn download_to<P, S, W>(
    session: &mut DeviceSession<P, S>,
    sink: &mut W,
    pb: &ProgressBar,
) -> Result<u32>
where
    P: Channel,
    S: Channel,
    W: Write,
{
    let mut last_state = DownloadState::Idle;
    let size = session.download_notes_with_progress(sink, |state, done, total| {
        if state != last_state {
            last_state = state;
            pb.set_message(state.to_string());
        }
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    })?;
    Ok(size)
}

/// Download command implementation.
pub(crate) fn cmd_download(cli: &Cli, config: &Config, output: &Path, force: bool) -> Result<()> {
    check_output(output, force)?;

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Cannot create a temporary file in {}", dir.display()))?;

    let mut session = device::connect(cli, config)?;
    if !cli.quiet {
        eprintln!("{} Connected", style("✓").green());
    }

    let pb = progress_bar(cli);
    let size = {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        let result = download_to(&mut session, &mut writer, &pb);
        let size = match result {
            Ok(size) => size,
            Err(err) => {
                pb.abandon();
                return Err(err);
            },
        };
        writer
            .flush()
            .context("Failed to flush the downloaded notes")?;
        size
    };
    pb.finish_and_clear();

    let persisted = if force {
        tmp.persist(output)
    } else {
        tmp.persist_noclobber(output)
    };
    persisted
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if size == 0 {
        eprintln!(
            "{} No notes stored; wrote an empty {}",
            style("ℹ").blue(),
            style(output.display()).yellow()
        );
    } else {
        eprintln!(
            "{} Downloaded {} bytes to {}",
            style("✓")
                .green()
                .bold(),
            style(size).cyan(),
            style(output.display()).yellow()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        notetaker::{
            SessionConfig,
            channel::mock::{MockChannel, SimulatedM210},
        },
        std::fs,
        tempfile::tempdir,
    };

    #[test]
    fn test_check_output_new_file() {
        let dir = tempdir().unwrap();
        assert!(check_output(&dir.path().join("notes.bin"), false).is_ok());
    }

    #[test]
    fn test_check_output_existing_file_needs_force() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.bin");
        fs::write(&path, b"old").unwrap();

        let err = check_output(&path, false).unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Usage(msg)) if msg.contains("--force")));
        assert!(check_output(&path, true).is_ok());
    }

    #[test]
    fn test_check_output_directory() {
        let dir = tempdir().unwrap();
        assert!(check_output(dir.path(), true).is_err());
    }

    #[test]
    fn test_download_to_writes_archive() {
        let device = SimulatedM210::with_packet_count(4);
        let expected = device.archive();
        let mut session =
            DeviceSession::new(device, MockChannel::new("aux"), SessionConfig::default()).unwrap();

        let mut sink = Vec::new();
        let pb = ProgressBar::hidden();
        let size = download_to(&mut session, &mut sink, &pb).unwrap();

        assert_eq!(size, 4 * 62);
        assert_eq!(sink, expected);
        assert_eq!(pb.length(), Some(4));
        assert_eq!(pb.position(), 4);
    }

    #[test]
    fn test_download_to_recovers_lost_packet() {
        let device = SimulatedM210::with_packet_count(3).with_corrupted_packet(2);
        let mut session =
            DeviceSession::new(device, MockChannel::new("aux"), SessionConfig::default()).unwrap();

        let mut sink = Vec::new();
        let size = download_to(&mut session, &mut sink, &ProgressBar::hidden()).unwrap();
        assert_eq!(size, 3 * 62);
        assert!(
            session
                .primary()
                .opcodes()
                .contains(&0xb7)
        );
    }

    #[test]
    fn test_download_to_empty_device() {
        let mut session = DeviceSession::new(
            SimulatedM210::with_packet_count(0),
            MockChannel::new("aux"),
            SessionConfig::default(),
        )
        .unwrap();

        let mut sink = Vec::new();
        let size = download_to(&mut session, &mut sink, &ProgressBar::hidden()).unwrap();
        assert_eq!(size, 0);
        assert!(sink.is_empty());
    }
}
