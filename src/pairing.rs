//! Pairs the host's serial ports with the UWB modules plugged into them.
//!
//! Every `/dev/ttyACM*`-style port gets woken as a DWM1001 shell and asked
//! for its system info. Tags become ranging masters and carry a mounting
//! position in their label; anchors are the local vehicle's slaves. Devices
//! are keyed by the 4-hex short address that later shows up in ranging
//! reports, which is how the pipeline tells its own slaves apart from
//! foreign vehicles.

use crate::label::{decode_master_label, EndSide, InfoPosition, LabelError};
use crate::report::Firmware;
use crate::shell::{Shell, ShellError, ShellLink};
use crate::sysinfo::SysInfo;
use log::{info, warn};
use serial2::SerialPort;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::time::Duration;

/// [`ShellLink`] over a real serial port. The short read timeout makes
/// `recv_pending` behave like an input-buffer poll.
pub struct SerialShellLink {
    port: SerialPort,
}

impl SerialShellLink {
    /// Opens `path` at `baud` and configures it for shell polling.
    pub fn open(path: &std::path::Path, baud: u32) -> io::Result<Self> {
        let mut port = SerialPort::open(path, baud)?;
        port.set_read_timeout(Duration::from_millis(50))?;
        Ok(SerialShellLink { port })
    }

    /// Unwraps the underlying port for report streaming.
    pub fn into_port(self) -> SerialPort {
        self.port
    }
}

impl ShellLink for SerialShellLink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)
    }

    fn recv_pending(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port.discard_input_buffer()
    }
}

/// What a paired module does for the local vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// A tag: masters the ranging exchange for one vehicle end.
    Master {
        /// Mounting position decoded from the module's label.
        mount: InfoPosition,
    },
    /// An anchor: a ranging slave for foreign vehicles to measure against.
    Slave,
}

/// A module identified on some serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    /// The 4-hex short address used in ranging reports.
    pub short_addr: String,
    /// Master or slave.
    pub role: Role,
    /// The full `si` dump fields.
    pub sys_info: SysInfo,
}

/// A paired device together with its (reporting-resumed) serial port.
pub struct PairedPort {
    /// The port, left in streaming mode for masters.
    pub port: SerialPort,
    /// The identified device.
    pub device: PairedDevice,
}

/// Errors raised while pairing ports.
#[derive(Debug)]
pub enum PairingError {
    /// Port enumeration failed.
    Io(io::Error),
    /// A shell session failed.
    Shell(ShellError),
    /// A master's label did not decode to a mounting position.
    Label(LabelError),
    /// The module is neither tag nor anchor.
    UnknownMode(String),
    /// No serial port hosted a usable module.
    NoDevices,
}

impl fmt::Display for PairingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingError::Io(e) => write!(f, "port enumeration failed: {}", e),
            PairingError::Shell(e) => write!(f, "shell session failed: {}", e),
            PairingError::Label(e) => write!(f, "master label undecodable: {}", e),
            PairingError::UnknownMode(mode) => {
                write!(f, "module mode {:?} is neither tag nor anchor", mode)
            }
            PairingError::NoDevices => write!(f, "no UWB modules found on any serial port"),
        }
    }
}

impl std::error::Error for PairingError {}

impl From<io::Error> for PairingError {
    fn from(value: io::Error) -> Self {
        PairingError::Io(value)
    }
}

impl From<ShellError> for PairingError {
    fn from(value: ShellError) -> Self {
        PairingError::Shell(value)
    }
}

impl From<LabelError> for PairingError {
    fn from(value: LabelError) -> Self {
        PairingError::Label(value)
    }
}

/// Turns a system-info dump into a device classification. Pure, so the
/// master/slave decision is testable without hardware.
pub fn classify(sys_info: SysInfo) -> Result<PairedDevice, PairingError> {
    let short_addr = sys_info.short_addr();

    let role = if sys_info.is_tag() {
        Role::Master {
            mount: decode_master_label(&sys_info.label)?,
        }
    } else if sys_info.is_anchor() {
        Role::Slave
    } else {
        return Err(PairingError::UnknownMode(sys_info.uwb_mode.clone()));
    };

    Ok(PairedDevice {
        short_addr,
        role,
        sys_info,
    })
}

/// Walks every serial port on the host, identifies the module behind it,
/// and leaves masters streaming reports. Ports that cannot be opened or
/// that host something other than a DWM1001 shell are skipped with a
/// warning, since the host usually has unrelated ttys too.
pub fn pair_ports(baud: u32, firmware: Firmware) -> Result<Vec<PairedPort>, PairingError> {
    let mut paired = Vec::new();

    for path in SerialPort::available_ports()? {
        let link = match SerialShellLink::open(&path, baud) {
            Ok(link) => link,
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let mut shell = Shell::new(link);
        if let Err(e) = shell.init(firmware) {
            warn!("skipping {}: {}", path.display(), e);
            continue;
        }

        let sys_info = match shell.fetch_sys_info(firmware) {
            Ok(info) => info,
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let device = classify(sys_info)?;
        info!(
            "paired {} as {} ({})",
            device.short_addr,
            match device.role {
                Role::Master { .. } => "master",
                Role::Slave => "slave",
            },
            path.display()
        );

        if matches!(device.role, Role::Master { .. }) {
            shell.resume_reporting(firmware)?;
        }

        paired.push(PairedPort {
            port: shell.into_link().into_port(),
            device,
        });
    }

    if paired.is_empty() {
        return Err(PairingError::NoDevices);
    }
    Ok(paired)
}

/// The short addresses of every local module; readings against these are
/// the vehicle ranging against itself and get filtered out.
pub fn own_short_addrs(devices: &[PairedDevice]) -> HashSet<String> {
    devices.iter().map(|d| d.short_addr.clone()).collect()
}

/// Finds the master serving the given vehicle end.
pub fn master_for_side(devices: &[PairedDevice], side: EndSide) -> Option<&PairedDevice> {
    devices.iter().find(|d| match &d.role {
        Role::Master { mount } => mount.side == side,
        Role::Slave => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};

    fn sys_info(mode: &str, addr: &str, label: &str) -> SysInfo {
        SysInfo {
            fw_ver: "x01030001".into(),
            cfg_ver: "x00010700".into(),
            panid: "xC7D0".into(),
            addr: addr.into(),
            uwb_mode: mode.into(),
            label: label.into(),
            fwup: false,
            ble: true,
            leds: true,
            upd_rate_stat: 10,
            enc: "off".into(),
            ble_addr: "E0:E5:CF:26:DC:9E".into(),
            init: None,
            le: None,
            lp: None,
            upd_rate_norm: None,
        }
    }

    fn side_a_label() -> String {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&120i16.to_le_bytes());
        bytes.extend_from_slice(&0i16.to_le_bytes());
        bytes.extend_from_slice(&80u16.to_le_bytes());
        bytes.push(1);
        bytes.push(2);
        STANDARD.encode(&bytes)
    }

    #[test]
    fn tags_classify_as_masters_with_mount() {
        let device = classify(sys_info(
            "tn (act,twr,np,le)",
            "xDECA34E8B0BC45F1",
            &side_a_label(),
        ))
        .unwrap();

        assert_eq!(device.short_addr, "45F1");
        match device.role {
            Role::Master { mount } => {
                assert_eq!(mount.x_mm, 1200);
                assert_eq!(mount.side, EndSide::A);
            }
            Role::Slave => panic!("expected a master"),
        }
    }

    #[test]
    fn anchors_classify_as_slaves() {
        let device = classify(sys_info("an (act,-)", "xDECA00000000459A", "ignored")).unwrap();
        assert_eq!(device.short_addr, "459A");
        assert_eq!(device.role, Role::Slave);
    }

    #[test]
    fn unknown_mode_is_an_error() {
        let err = classify(sys_info("bn (?)", "xDECA00000000459A", "")).unwrap_err();
        assert!(matches!(err, PairingError::UnknownMode(_)));
    }

    #[test]
    fn master_with_bad_label_is_an_error() {
        let err = classify(sys_info(
            "tn (act,twr,np,le)",
            "xDECA34E8B0BC45F1",
            "@@@",
        ))
        .unwrap_err();
        assert!(matches!(err, PairingError::Label(_)));
    }

    #[test]
    fn side_lookup_and_own_filter() {
        let a_master = classify(sys_info(
            "tn (act,twr,np,le)",
            "xDECA34E8B0BC45F1",
            &side_a_label(),
        ))
        .unwrap();
        let slave = classify(sys_info("an (act,-)", "xDECA00000000459A", "")).unwrap();
        let devices = vec![a_master, slave];

        let own = own_short_addrs(&devices);
        assert!(own.contains("45F1"));
        assert!(own.contains("459A"));

        assert_eq!(
            master_for_side(&devices, EndSide::A).map(|d| d.short_addr.as_str()),
            Some("45F1")
        );
        assert!(master_for_side(&devices, EndSide::B).is_none());
    }
}
