//! Byte-level driver for the DWM1001 shell console.
//!
//! The shell is quirky: it needs a double carriage return to wake up, it
//! drops keystrokes that arrive faster than a human would type, and once
//! location reporting is active it floods the line and talks over command
//! output. The driver types slowly, pauses reporting before issuing
//! commands, and detects reporting by watching whether bytes keep arriving.
//!
//! All traffic goes through the [`ShellLink`] seam so the protocol can be
//! exercised against a scripted link in tests.

use crate::report::Firmware;
use crate::sysinfo::{SysInfo, SysInfoError};
use log::{debug, info, warn};
use std::fmt;
use std::io;
use std::time::Duration;

/// Double carriage return wakes the shell from reporting mode.
pub const CMD_WAKE: &[u8] = b"\x0D\x0D";
/// Toggles `lec` CSV distance reporting on the OEM firmware.
pub const CMD_LEC_TOGGLE: &[u8] = b"lec\x0D";
/// Accelerometer init; without it acceleration fields read garbage.
pub const CMD_ACCEL_INIT: &[u8] = b"av\x0D";
/// Slows positioning updates to one per minute, effectively pausing them.
pub const CMD_RATE_PAUSE: &[u8] = b"aurs 600 600\x0D";
/// Restores the 10 Hz positioning update rate.
pub const CMD_RATE_RESUME: &[u8] = b"aurs 1 1\x0D";
/// Requests the system info dump.
pub const CMD_SYS_INFO: &[u8] = b"si\x0D";

/// How many times to re-issue `si` before giving up.
pub const SYS_INFO_ATTEMPTS: u32 = 5;

/// Transport seam between the shell driver and a serial port.
pub trait ShellLink {
    /// Writes raw bytes to the device.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Reads whatever input is pending, returning the number of bytes; zero
    /// means nothing arrived within the link's own short timeout.
    fn recv_pending(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Drops any buffered input.
    fn discard_input(&mut self) -> io::Result<()>;
    /// Blocks the calling thread; factored into the link so tests run
    /// without real delays.
    fn pause(&mut self, d: Duration) {
        spin_sleep::sleep(d);
    }
}

/// Errors from driving the shell.
#[derive(Debug)]
pub enum ShellError {
    /// The serial link failed.
    Io(io::Error),
    /// The device never produced a parseable `si` dump.
    SysInfo(SysInfoError),
    /// The shell did not acknowledge the wake sequence.
    NotResponding,
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::Io(e) => write!(f, "shell io error: {}", e),
            ShellError::SysInfo(e) => write!(f, "system info parse failed: {}", e),
            ShellError::NotResponding => write!(f, "shell did not respond to wake sequence"),
        }
    }
}

impl std::error::Error for ShellError {}

impl From<io::Error> for ShellError {
    fn from(value: io::Error) -> Self {
        ShellError::Io(value)
    }
}

impl From<SysInfoError> for ShellError {
    fn from(value: SysInfoError) -> Self {
        ShellError::SysInfo(value)
    }
}

/// A DWM1001 shell session over some [`ShellLink`].
pub struct Shell<L: ShellLink> {
    link: L,
    /// Inter-keystroke delay. 100 ms is reliable; the firmware drops bytes
    /// well below that.
    keystroke_delay: Duration,
}

impl<L: ShellLink> Shell<L> {
    /// Wraps a link with the default keystroke delay.
    pub fn new(link: L) -> Self {
        Self::with_keystroke_delay(link, Duration::from_millis(100))
    }

    /// Wraps a link, typing with the given inter-byte delay.
    pub fn with_keystroke_delay(link: L, keystroke_delay: Duration) -> Self {
        Shell {
            link,
            keystroke_delay,
        }
    }

    /// Hands the link back, for callers that switch from shell traffic to
    /// report streaming on the same port.
    pub fn into_link(self) -> L {
        self.link
    }

    /// Types a command one byte at a time, pausing between keystrokes.
    pub fn send_command(&mut self, cmd: &[u8]) -> io::Result<()> {
        for &b in cmd {
            self.link.pause(self.keystroke_delay);
            self.link.send(&[b])?;
        }
        Ok(())
    }

    /// Wakes the shell with a double carriage return. Returns whether the
    /// device answered with anything at all.
    pub fn wake(&mut self) -> io::Result<bool> {
        self.link.discard_input()?;
        self.send_command(CMD_WAKE)?;
        self.link.pause(Duration::from_millis(500));
        let mut buf = [0u8; 64];
        Ok(self.link.recv_pending(&mut buf)? > 0)
    }

    /// Watches the line for `window` and reports whether bytes kept
    /// arriving, i.e. whether location reporting is running.
    pub fn is_reporting(&mut self, window: Duration) -> io::Result<bool> {
        self.link.discard_input()?;
        self.link.pause(window);
        let mut buf = [0u8; 256];
        let n = self.link.recv_pending(&mut buf)?;
        debug!("reporting check saw {} byte(s)", n);
        Ok(n > 0)
    }

    /// Quiets the report stream so command output stays readable.
    pub fn pause_reporting(&mut self, firmware: Firmware) -> io::Result<()> {
        match firmware {
            // lec is a toggle, so only send it while reports are flowing.
            Firmware::Oem => {
                if self.is_reporting(Duration::from_secs(1))? {
                    self.send_command(CMD_LEC_TOGGLE)?;
                }
            }
            Firmware::AccelEnabled => self.send_command(CMD_RATE_PAUSE)?,
        }
        Ok(())
    }

    /// Brings the report stream back up at the working update rate.
    pub fn resume_reporting(&mut self, firmware: Firmware) -> io::Result<()> {
        match firmware {
            Firmware::Oem => {
                if !self.is_reporting(Duration::from_secs(1))? {
                    self.send_command(CMD_LEC_TOGGLE)?;
                }
            }
            Firmware::AccelEnabled => self.send_command(CMD_RATE_RESUME)?,
        }
        Ok(())
    }

    /// Puts a freshly opened port into a known state: shell awake,
    /// accelerometer initialized (accel firmware), reporting paused.
    pub fn init(&mut self, firmware: Firmware) -> Result<(), ShellError> {
        if !self.wake()? && !self.is_reporting(Duration::from_secs(1))? {
            return Err(ShellError::NotResponding);
        }
        if firmware == Firmware::AccelEnabled {
            self.send_command(CMD_ACCEL_INIT)?;
        }
        self.pause_reporting(firmware)?;
        info!("shell init complete");
        Ok(())
    }

    /// Issues `si` and parses the dump, retrying up to
    /// [`SYS_INFO_ATTEMPTS`] times. Reports talking over the dump are the
    /// usual reason an attempt fails.
    pub fn fetch_sys_info(&mut self, firmware: Firmware) -> Result<SysInfo, ShellError> {
        let mut last_err = ShellError::NotResponding;

        for attempt in 1..=SYS_INFO_ATTEMPTS {
            debug!("fetching system info, attempt {}", attempt);
            if self.is_reporting(Duration::from_secs(1))? {
                self.pause_reporting(firmware)?;
            }
            self.link.discard_input()?;
            self.send_command(CMD_SYS_INFO)?;
            self.link.pause(Duration::from_millis(500));

            let mut dump = Vec::new();
            let mut buf = [0u8; 512];
            loop {
                let n = self.link.recv_pending(&mut buf)?;
                if n == 0 {
                    break;
                }
                dump.extend_from_slice(&buf[..n]);
            }

            match SysInfo::parse(&String::from_utf8_lossy(&dump)) {
                Ok(info) => return Ok(info),
                Err(e) => {
                    warn!("si attempt {} failed: {}", attempt, e);
                    last_err = ShellError::SysInfo(e);
                }
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// A scripted link: records writes, replays queued responses.
    struct MockLink {
        sent: Vec<u8>,
        responses: VecDeque<Vec<u8>>,
        discards: usize,
    }

    impl MockLink {
        fn new(responses: Vec<Vec<u8>>) -> Self {
            MockLink {
                sent: Vec::new(),
                responses: responses.into(),
                discards: 0,
            }
        }
    }

    impl ShellLink for MockLink {
        fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.sent.extend_from_slice(bytes);
            Ok(())
        }

        fn recv_pending(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.responses.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }

        fn discard_input(&mut self) -> io::Result<()> {
            self.discards += 1;
            Ok(())
        }

        fn pause(&mut self, _d: Duration) {}
    }

    fn quiet_shell(responses: Vec<Vec<u8>>) -> Shell<MockLink> {
        Shell::with_keystroke_delay(MockLink::new(responses), Duration::ZERO)
    }

    #[test]
    fn commands_are_typed_byte_by_byte() {
        let mut shell = quiet_shell(vec![]);
        shell.send_command(CMD_RATE_RESUME).unwrap();
        assert_eq!(shell.link.sent, b"aurs 1 1\x0D");
    }

    #[test]
    fn wake_reports_whether_device_answered() {
        let mut shell = quiet_shell(vec![b"dwm> ".to_vec()]);
        assert!(shell.wake().unwrap());
        assert_eq!(shell.link.sent, CMD_WAKE);

        let mut shell = quiet_shell(vec![]);
        assert!(!shell.wake().unwrap());
    }

    #[test]
    fn reporting_detection_watches_for_traffic() {
        let mut shell = quiet_shell(vec![b"DIST,0;\r\n".to_vec()]);
        assert!(shell.is_reporting(Duration::ZERO).unwrap());
        assert!(!shell.is_reporting(Duration::ZERO).unwrap());
    }

    #[test]
    fn oem_pause_only_toggles_when_reporting() {
        // Quiet line: lec must not be sent, it would start reporting.
        let mut shell = quiet_shell(vec![]);
        shell.pause_reporting(Firmware::Oem).unwrap();
        assert!(shell.link.sent.is_empty());

        let mut shell = quiet_shell(vec![b"DIST".to_vec()]);
        shell.pause_reporting(Firmware::Oem).unwrap();
        assert_eq!(shell.link.sent, CMD_LEC_TOGGLE);
    }

    #[test]
    fn accel_pause_always_slows_rate() {
        let mut shell = quiet_shell(vec![]);
        shell.pause_reporting(Firmware::AccelEnabled).unwrap();
        assert_eq!(shell.link.sent, CMD_RATE_PAUSE);
    }

    #[test]
    fn fetch_sys_info_retries_until_parseable() {
        let dump = "\
[000053.320 INF] sys: fw2 fw_ver=x01030001 cfg_ver=x00010700\r\n\
[000053.330 INF] uwb0: panid=xC7D0 addr=xDECA34E8B0BC45F1\r\n\
[000053.330 INF] mode: tn (act,twr,np,le)\r\n\
[000053.350 INF] cfg: sync=0 fwup=0 ble=1 leds=1 le=1 lp=0 stat_det=1 mode=0 upd_rate_norm=1 upd_rate_stat=10 label=FgD6/1AABwI=\r\n\
[000053.360 INF] enc: off\r\n\
[000053.360 INF] ble: addr=E0:E5:CF:26:DC:9E\r\n";

        // Attempt one: quiet reporting check, garbage dump, end of dump.
        // Attempt two: quiet reporting check, the real dump.
        let mut shell = quiet_shell(vec![
            vec![],
            b"DIST,0;\r\n".to_vec(),
            vec![],
            vec![],
            dump.as_bytes().to_vec(),
        ]);

        let info = shell.fetch_sys_info(Firmware::AccelEnabled).unwrap();
        assert_eq!(info.short_addr(), "45F1");
    }

    #[test]
    fn fetch_sys_info_gives_up_after_max_attempts() {
        let mut shell = quiet_shell(vec![]);
        let err = shell.fetch_sys_info(Firmware::AccelEnabled).unwrap_err();
        assert!(matches!(err, ShellError::SysInfo(_)));
    }
}
