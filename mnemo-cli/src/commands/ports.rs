//! Port listing command.

use {
    crate::config::Config,
    anyhow::{Context, Result},
    console::style,
    mnemo::{DetectedPort, default_locator},
};

fn port_json(port: &DetectedPort, vid: u16, pid: u16) -> serde_json::Value {
    serde_json::json!({
        "name": port.name,
        "mnemo": port.matches(vid, pid),
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
        "serial": port.serial,
    })
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(config: &Config, json: bool) -> Result<()> {
    let detected = default_locator()
        .list_ports()
        .context("Failed to enumerate serial ports")?;
    let (vid, pid) = config.usb_identity();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| port_json(p, vid, pid))
            .collect();
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &detected {
        let device_type = if port.matches(vid, pid) {
            format!(" [{}]", style("MNEMO").yellow())
        } else {
            String::new()
        };

        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };

        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{}{}{}",
            style("•").green(),
            style(&port.name).cyan(),
            device_type,
            vid_pid,
            product
        );
    }

    if let Some(found) = detected.iter().find(|p| p.matches(vid, pid)) {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→").green().bold(),
            style(&found.name).cyan().bold()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, mnemo::{MNEMO_PID, MNEMO_VID}};

    #[test]
    fn test_port_json() {
        let port = DetectedPort {
            vid: Some(MNEMO_VID),
            pid: Some(MNEMO_PID),
            product: Some("MNEMO".to_string()),
            ..DetectedPort::new("/dev/ttyACM0")
        };
        let value = port_json(&port, MNEMO_VID, MNEMO_PID);
        assert_eq!(value["name"], "/dev/ttyACM0");
        assert_eq!(value["mnemo"], true);
        assert_eq!(value["vid"], 0x04D8);
        assert_eq!(value["product"], "MNEMO");
        assert!(value["serial"].is_null());

        let plain = port_json(&DetectedPort::new("/dev/ttyS0"), MNEMO_VID, MNEMO_PID);
        assert_eq!(plain["mnemo"], false);
        assert!(plain["vid"].is_null());
    }
}
