//! Parser for the DWM1001 `si` shell dump.
//!
//! The dump is a handful of log-prefixed lines of `key=value` pairs and
//! free-form fields. Reporting traffic is paused before `si` is issued, but
//! stray prompt text or a late report line can still surround the dump, so
//! extraction keys off the field names rather than line positions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A selection of the system fields the harness needs from `si`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SysInfo {
    /// Firmware version, `x`-prefixed hex.
    pub fw_ver: String,
    /// Config version, `x`-prefixed hex.
    pub cfg_ver: String,
    /// UWB PAN id, `x`-prefixed hex.
    pub panid: String,
    /// Full 64-bit device address, `x`-prefixed hex.
    pub addr: String,
    /// Mode string, e.g. `tn (act,twr,np,le)` for a tag or `an (act,-)` for
    /// an anchor.
    pub uwb_mode: String,
    /// The free-form label field, which this deployment uses to carry an
    /// encoded mounting position.
    pub label: String,
    /// Firmware update enabled.
    pub fwup: bool,
    /// BLE enabled.
    pub ble: bool,
    /// LEDs enabled.
    pub leds: bool,
    /// Stationary update rate, in 100 ms units.
    pub upd_rate_stat: u32,
    /// Encryption status line.
    pub enc: String,
    /// BLE MAC address.
    pub ble_addr: String,
    /// Anchor only: whether this anchor is the initiator.
    pub init: Option<bool>,
    /// Tag only: location engine enabled.
    pub le: Option<bool>,
    /// Tag only: low-power mode enabled.
    pub lp: Option<bool>,
    /// Tag only: normal update rate, in 100 ms units.
    pub upd_rate_norm: Option<u32>,
}

/// Returned when a `si` dump is missing or mangles a required field.
#[derive(Debug)]
pub enum SysInfoError {
    /// A field the harness requires was absent from the dump.
    MissingField(&'static str),
    /// A numeric field did not parse.
    BadNumber(&'static str, String),
}

impl fmt::Display for SysInfoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SysInfoError::MissingField(name) => write!(f, "si dump is missing {}", name),
            SysInfoError::BadNumber(name, got) => {
                write!(f, "si field {} is not a number: {:?}", name, got)
            }
        }
    }
}

impl std::error::Error for SysInfoError {}

/// The token following `key`, terminated by whitespace.
fn value_after<'a>(dump: &'a str, key: &str) -> Option<&'a str> {
    let at = dump.find(key)? + key.len();
    let rest = &dump[at..];
    let end = rest
        .find(|c: char| c.is_whitespace())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Everything following `key` up to the end of its line.
fn line_after<'a>(dump: &'a str, key: &str) -> Option<&'a str> {
    let at = dump.find(key)? + key.len();
    let rest = &dump[at..];
    let end = rest.find(['\r', '\n']).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn required<'a>(
    value: Option<&'a str>,
    name: &'static str,
) -> Result<&'a str, SysInfoError> {
    value.ok_or(SysInfoError::MissingField(name))
}

fn parse_flag(dump: &str, key: &'static str) -> Result<bool, SysInfoError> {
    let raw = required(value_after(dump, key), key)?;
    match raw.parse::<u8>() {
        Ok(n) => Ok(n != 0),
        Err(_) => Err(SysInfoError::BadNumber(key, raw.to_owned())),
    }
}

fn parse_rate(dump: &str, key: &'static str) -> Result<u32, SysInfoError> {
    let raw = required(value_after(dump, key), key)?;
    raw.parse::<u32>()
        .map_err(|_| SysInfoError::BadNumber(key, raw.to_owned()))
}

impl SysInfo {
    /// Extracts the fields from a raw `si` dump.
    pub fn parse(dump: &str) -> Result<Self, SysInfoError> {
        // "addr=x" skips the BLE MAC, which is also introduced by "addr=".
        let uwb_mode = required(line_after(dump, "mode: "), "mode")?.to_owned();
        let is_tag = uwb_mode.contains("tn");

        let mut info = SysInfo {
            fw_ver: required(value_after(dump, "fw_ver="), "fw_ver")?.to_owned(),
            cfg_ver: required(value_after(dump, "cfg_ver="), "cfg_ver")?.to_owned(),
            panid: required(value_after(dump, "panid="), "panid")?.to_owned(),
            addr: required(value_after(dump, "addr=x"), "addr")
                .map(|a| format!("x{}", a))?,
            uwb_mode,
            label: required(value_after(dump, "label="), "label")?.to_owned(),
            fwup: parse_flag(dump, "fwup=")?,
            ble: parse_flag(dump, "ble=")?,
            leds: parse_flag(dump, "leds=")?,
            upd_rate_stat: parse_rate(dump, "upd_rate_stat=")?,
            enc: required(line_after(dump, "enc: "), "enc")?.to_owned(),
            ble_addr: required(line_after(dump, "ble: addr="), "ble_addr")?.to_owned(),
            init: None,
            le: None,
            lp: None,
            upd_rate_norm: None,
        };

        if is_tag {
            info.le = Some(parse_flag(dump, " le=")?);
            info.lp = Some(parse_flag(dump, " lp=")?);
            info.upd_rate_norm = Some(parse_rate(dump, "upd_rate_norm=")?);
        } else if info.is_anchor() {
            info.init = Some(parse_flag(dump, "init=")?);
        }

        Ok(info)
    }

    /// The 4-hex-digit short address the ranging reports use, uppercase.
    pub fn short_addr(&self) -> String {
        let hex: &str = self.addr.trim_start_matches('x');
        let tail = hex.len().saturating_sub(4);
        hex[tail..].to_ascii_uppercase()
    }

    /// A tag module, which masters the ranging exchange.
    pub fn is_tag(&self) -> bool {
        self.uwb_mode.contains("tn")
    }

    /// An anchor module, which serves as a ranging slave.
    pub fn is_anchor(&self) -> bool {
        self.uwb_mode.contains("an")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG_DUMP: &str = "\
dwm> si\r\n\
[000053.320 INF] sys: fw2 fw_ver=x01030001 cfg_ver=x00010700\r\n\
[000053.330 INF] uwb0: panid=xC7D0 addr=xDECA34E8B0BC45F1\r\n\
[000053.330 INF] mode: tn (act,twr,np,le)\r\n\
[000053.340 INF] uwbmac: connected\r\n\
[000053.340 INF] uwbmac: bh disconnected\r\n\
[000053.350 INF] cfg: sync=0 fwup=0 ble=1 leds=1 le=1 lp=0 stat_det=1 mode=0 upd_rate_norm=1 upd_rate_stat=10 label=FgD6/1AABwI=\r\n\
[000053.360 INF] enc: off\r\n\
[000053.360 INF] ble: addr=E0:E5:CF:26:DC:9E\r\n\
dwm> ";

    const ANCHOR_DUMP: &str = "\
[000012.110 INF] sys: fw2 fw_ver=x01030001 cfg_ver=x00010700\r\n\
[000012.120 INF] uwb0: panid=xC7D0 addr=xDECA00000000459A\r\n\
[000012.120 INF] mode: an (act,-)\r\n\
[000012.130 INF] uwbmac: connected\r\n\
[000012.130 INF] uwbmac: bh disconnected\r\n\
[000012.140 INF] cfg: sync=0 fwup=0 ble=1 leds=1 init=1 upd_rate_stat=10 label=AAAAAAAAAAA=\r\n\
[000012.150 INF] enc: off\r\n\
[000012.150 INF] ble: addr=E0:E5:CF:26:DC:9F\r\n";

    #[test]
    fn tag_dump_parses() {
        let info = SysInfo::parse(TAG_DUMP).unwrap();

        assert_eq!(info.fw_ver, "x01030001");
        assert_eq!(info.panid, "xC7D0");
        assert_eq!(info.addr, "xDECA34E8B0BC45F1");
        assert_eq!(info.uwb_mode, "tn (act,twr,np,le)");
        assert_eq!(info.label, "FgD6/1AABwI=");
        assert!(!info.fwup);
        assert!(info.ble);
        assert!(info.leds);
        assert_eq!(info.upd_rate_stat, 10);
        assert_eq!(info.enc, "off");
        assert_eq!(info.ble_addr, "E0:E5:CF:26:DC:9E");
        assert_eq!(info.le, Some(true));
        assert_eq!(info.lp, Some(false));
        assert_eq!(info.upd_rate_norm, Some(1));
        assert_eq!(info.init, None);
    }

    #[test]
    fn tag_identity() {
        let info = SysInfo::parse(TAG_DUMP).unwrap();
        assert!(info.is_tag());
        assert!(!info.is_anchor());
        assert_eq!(info.short_addr(), "45F1");
    }

    #[test]
    fn anchor_dump_parses() {
        let info = SysInfo::parse(ANCHOR_DUMP).unwrap();

        assert!(info.is_anchor());
        assert_eq!(info.short_addr(), "459A");
        assert_eq!(info.init, Some(true));
        assert_eq!(info.le, None);
        assert_eq!(info.upd_rate_norm, None);
    }

    #[test]
    fn missing_mode_is_an_error() {
        let err = SysInfo::parse("garbage with no fields").unwrap_err();
        assert!(matches!(err, SysInfoError::MissingField("mode")));
    }

    #[test]
    fn report_noise_around_the_dump_is_tolerated() {
        let noisy = format!(
            "DIST,1;[AN0,459A,0,0,0]=[1176,100];\r\n{}DIST,0;\r\n",
            TAG_DUMP
        );
        let info = SysInfo::parse(&noisy).unwrap();
        assert_eq!(info.short_addr(), "45F1");
    }
}
