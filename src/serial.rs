use serialport::{available_ports, SerialPortInfo, SerialPortType};

#[derive(Debug, thiserror::Error)]
pub enum InterfaceSelectError {
    #[error("No radio interfaces found. Re-run with --serial <PORT> or use 'scan --all' to inspect.")]
    NoInterfaces,
    #[error("Multiple radio interfaces detected: {}. Please specify --serial <PORT>.", .list.join(", "))]
    MultipleInterfaces { list: Vec<String> },
}

/// Serial ports that could be a radio dongle. Without `include_all` only USB
/// devices are listed.
pub fn scan_interfaces(include_all: bool) -> Vec<SerialPortInfo> {
    available_ports()
        .unwrap_or_default()
        .into_iter()
        .filter(|port| include_all || matches!(port.port_type, SerialPortType::UsbPort(_)))
        .collect::<Vec<_>>()
}

/// What `scan` reports about one candidate interface.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usb: Option<UsbIds>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct UsbIds {
    pub vid: u16,
    pub pid: u16,
    pub product: Option<String>,
    pub manufacturer: Option<String>,
}

impl From<SerialPortInfo> for InterfaceInfo {
    fn from(port: SerialPortInfo) -> Self {
        let (kind, usb) = match port.port_type {
            SerialPortType::UsbPort(info) => (
                "usb".to_string(),
                Some(UsbIds {
                    vid: info.vid,
                    pid: info.pid,
                    product: info.product,
                    manufacturer: info.manufacturer,
                }),
            ),
            SerialPortType::PciPort => ("pci".to_string(), None),
            SerialPortType::BluetoothPort => ("bluetooth".to_string(), None),
            SerialPortType::Unknown => ("unknown".to_string(), None),
        };
        Self { name: port.port_name, kind, usb }
    }
}

impl InterfaceInfo {
    /// One tab-separated line for `scan --verbose`.
    pub fn describe(&self) -> String {
        match &self.usb {
            Some(ids) => format!(
                "{}\tusb {:04x}:{:04x}\t{}\t{}",
                self.name,
                ids.vid,
                ids.pid,
                ids.product.as_deref().unwrap_or("-"),
                ids.manufacturer.as_deref().unwrap_or("-"),
            ),
            None => format!("{}\t{}", self.name, self.kind),
        }
    }
}

pub fn select_interface(explicit: &Option<String>) -> Result<String, InterfaceSelectError> {
    if let Some(p) = explicit {
        return Ok(p.clone());
    }
    let found = scan_interfaces(false)
        .into_iter()
        .map(|p| p.port_name)
        .collect::<Vec<_>>();
    decide_interface(None, found)
}

// Pure decision function for easier testing
pub(crate) fn decide_interface(
    explicit: Option<String>,
    available: Vec<String>,
) -> Result<String, InterfaceSelectError> {
    if let Some(p) = explicit {
        return Ok(p);
    }
    match available.len() {
        0 => Err(InterfaceSelectError::NoInterfaces),
        1 => Ok(available[0].clone()),
        _ => Err(InterfaceSelectError::MultipleInterfaces { list: available }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb_port(name: &str) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.into(),
            port_type: SerialPortType::UsbPort(serialport::UsbPortInfo {
                vid: 0x1915,
                pid: 0x7777,
                serial_number: None,
                manufacturer: Some("Bitcraze AB".into()),
                product: Some("Crazyradio PA".into()),
            }),
        }
    }

    #[test]
    fn usb_interface_describes_ids() {
        let info = InterfaceInfo::from(usb_port("/dev/ttyACM0"));
        assert_eq!(info.kind, "usb");
        assert_eq!(info.describe(), "/dev/ttyACM0\tusb 1915:7777\tCrazyradio PA\tBitcraze AB");

        let v = serde_json::to_value(&info).unwrap();
        assert_eq!(v["usb"]["vid"], 0x1915);
        assert_eq!(v["usb"]["product"], "Crazyradio PA");
    }

    #[test]
    fn non_usb_interface_has_no_ids() {
        let info = InterfaceInfo::from(SerialPortInfo {
            port_name: "/dev/ttyS0".into(),
            port_type: SerialPortType::Unknown,
        });
        assert_eq!(info.describe(), "/dev/ttyS0\tunknown");
        let v = serde_json::to_value(&info).unwrap();
        assert!(v.get("usb").is_none());
    }

    #[test]
    fn explicit_interface_wins() {
        let r = decide_interface(Some("/dev/ttyACM9".into()), vec!["/dev/ttyACM0".into()]).unwrap();
        assert_eq!(r, "/dev/ttyACM9");
    }

    #[test]
    fn single_interface_is_auto_selected() {
        let r = decide_interface(None, vec!["/dev/ttyACM0".into()]).unwrap();
        assert_eq!(r, "/dev/ttyACM0");
    }

    #[test]
    fn no_interfaces() {
        let err = decide_interface(None, vec![]).unwrap_err();
        assert!(matches!(err, InterfaceSelectError::NoInterfaces));
        assert!(err.to_string().contains("No radio interfaces"));
    }

    #[test]
    fn multiple_interfaces() {
        let err = decide_interface(None, vec!["/dev/ttyACM0".into(), "/dev/ttyACM1".into()])
            .unwrap_err();
        assert!(err.to_string().contains("/dev/ttyACM0, /dev/ttyACM1"));
    }
}
