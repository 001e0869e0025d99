//! hidraw interface listing.

use {
    anyhow::Result,
    console::style,
    notetaker::{DetectedInterface, DevicePaths, detect_interfaces, device::pair_all_interfaces},
};

/// JSON document for `list-devices --json`.
pub(crate) fn devices_json(
    interfaces: &[DetectedInterface],
    devices: &[DevicePaths],
) -> serde_json::Value {
    serde_json::json!({
        "ok": true,
        "data": {
            "interfaces": interfaces,
            "devices": devices,
        }
    })
}

fn print_devices(interfaces: &[DetectedInterface], devices: &[DevicePaths]) {
    eprintln!(
        "{}",
        style("hidraw interfaces")
            .bold()
            .underlined()
    );

    if interfaces.is_empty() {
        eprintln!("  {}", style("No hidraw interfaces found").dim());
        return;
    }

    for line in notetaker::device::format_interface_list(interfaces) {
        eprintln!("  {} {line}", style("•").green());
    }

    for paths in devices {
        eprintln!(
            "\n{} NoteTaker: {} + {}",
            style("→")
                .green()
                .bold(),
            style(paths.primary.display()).cyan(),
            style(paths.secondary.display()).cyan()
        );
    }
}

/// List devices command implementation.
pub(crate) fn cmd_list_devices(json: bool) -> Result<()> {
    let interfaces = detect_interfaces();
    let devices = pair_all_interfaces(&interfaces);

    if json {
        let output = devices_json(&interfaces, &devices);
        println!(
            "{}",
            serde_json::to_string_pretty(&output)?
        );
        return Ok(());
    }

    print_devices(&interfaces, &devices);
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        notetaker::M210_IDENTITY,
        std::path::PathBuf,
    };

    fn interface(name: &str, number: u8) -> DetectedInterface {
        DetectedInterface {
            name: name.to_string(),
            node: PathBuf::from(format!("/dev/{name}")),
            identity: Some(M210_IDENTITY),
            interface_number: Some(number),
            usb_device: Some("1-1".to_string()),
            product: Some("Pegasus NoteTaker".to_string()),
        }
    }

    #[test]
    fn test_devices_json_shape() {
        let interfaces = vec![interface("hidraw0", 0), interface("hidraw1", 1)];
        let devices = pair_all_interfaces(&interfaces);
        let value = devices_json(&interfaces, &devices);

        assert_eq!(value["ok"], true);
        let listed = value["data"]["interfaces"]
            .as_array()
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["node"], "/dev/hidraw0");
        assert_eq!(listed[1]["interface_number"], 1);

        let paired = value["data"]["devices"]
            .as_array()
            .unwrap();
        assert_eq!(paired.len(), 1);
        assert_eq!(paired[0]["primary"], "/dev/hidraw0");
        assert_eq!(paired[0]["secondary"], "/dev/hidraw1");
    }

    #[test]
    fn test_devices_json_empty() {
        let value = devices_json(&[], &[]);
        assert!(
            value["data"]["interfaces"]
                .as_array()
                .unwrap()
                .is_empty()
        );
    }
}
