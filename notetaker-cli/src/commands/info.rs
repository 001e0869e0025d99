//! Device info command implementation.

use {
    crate::{Cli, config::Config, device},
    anyhow::Result,
    console::style,
    notetaker::{Channel, DeviceInfo, DeviceSession},
};

/// Query the pen through an open session.
pub(crate) fn query_info<P: Channel, S: Channel>(
    session: &mut DeviceSession<P, S>,
) -> Result<DeviceInfo> {
    Ok(session.get_device_info()?)
}

/// JSON document for `info --json`.
pub(crate) fn info_json(info: &DeviceInfo) -> serde_json::Value {
    serde_json::json!({
        "ok": true,
        "data": info,
    })
}

fn print_info(info: &DeviceInfo) {
    eprintln!(
        "{}",
        style("NoteTaker M210")
            .bold()
            .underlined()
    );
    eprintln!("  Firmware version: {}", style(info.firmware_version).cyan());
    eprintln!("  Analog version:   {}", style(info.analog_version).cyan());
    eprintln!("  Pad version:      {}", style(info.pad_version).cyan());
    eprintln!("  Mode:             {}", info.mode);
    eprintln!(
        "  Stored notes:     {} bytes",
        style(info.download_size).yellow()
    );
}

/// Info command implementation.
pub(crate) fn cmd_info(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let mut session = device::connect(cli, config)?;
    let info = query_info(&mut session)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&info_json(&info))?
        );
    } else {
        print_info(&info);
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
    };

    #[test]
    fn test_query_info_reports_size_and_rejects_upload() {
        let mut session = DeviceSession::new(
            SimulatedM210::with_packet_count(3),
            MockChannel::new("aux"),
            SessionConfig::default(),
        )
        .unwrap();

        let info = query_info(&mut session).unwrap();
        assert_eq!(info.firmware_version, 337);
        assert_eq!(info.download_size, 3 * 62);
        assert_eq!(
            session
                .primary()
                .opcodes(),
            vec![0x95, 0xb5, 0xb7]
        );
    }

    #[test]
    fn test_info_json_shape() {
        let info = DeviceInfo {
            firmware_version: 337,
            analog_version: 265,
            pad_version: 32028,
            mode: 2,
            download_size: 124,
        };
        let value = info_json(&info);
        assert_eq!(value["ok"], true);
        assert_eq!(value["data"]["firmware_version"], 337);
        assert_eq!(value["data"]["pad_version"], 32028);
        assert_eq!(value["data"]["download_size"], 124);
    }
}
