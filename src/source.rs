//! The producer side of the ranging pipeline: a thread-safe buffer of
//! [`RangingUpdate`]s and the reader thread that fills it from a master's
//! serial port.

use crate::geometry::corrected_distance_mm;
use crate::label::{recover_slave_info, EndSide, InfoPosition};
use crate::report::{Firmware, RangingReport};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use serial2::SerialPort;
use std::{
    collections::{HashSet, VecDeque},
    io,
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
};

/// One foreign-slave measurement extracted from a ranging report, with the
/// geometry correction already applied.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RangingUpdate {
    /// Which local vehicle end measured it.
    pub side: EndSide,
    /// Counts the reports decoded on this end since startup, so consumers
    /// can tell fresh data from a stalled line.
    pub superframe: u64,
    /// Short address of the foreign slave.
    pub anchor_id: String,
    /// The slave's mounting position, recovered from the report integers.
    pub slave: InfoPosition,
    /// Raw antenna-to-antenna range, mm.
    pub raw_dist_mm: i32,
    /// Bumper-to-bumper clearance, when the correction is defined.
    pub corrected_mm: Option<i32>,
}

/// A typed, clearable iterator that emits [`RangingUpdate`]s when iterated
/// upon. The pipeline consumes any implementation the same way, which is how
/// the synthetic source stands in for hardware.
pub trait RangingSource: Iterator<Item = RangingUpdate> {
    /// Drops everything buffered so far.
    fn clear(&mut self);
}

/// A [`RangingSource`] that acts as the thread-safe hand-off buffer between
/// the serial reader threads and the accumulator.
#[derive(Debug, Default, Clone)]
pub struct ReportBuffer {
    msgs: Arc<Mutex<VecDeque<RangingUpdate>>>,
}

impl ReportBuffer {
    /// A fresh, empty buffer. Clones share the same backing queue.
    pub fn new() -> Self {
        ReportBuffer {
            msgs: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Queues one update.
    pub fn push(&self, update: RangingUpdate) {
        self.msgs.lock().unwrap().push_back(update);
    }

    /// Queues every foreign-slave update a decoded report yields.
    pub fn ingest(
        &self,
        report: &RangingReport,
        side: EndSide,
        superframe: u64,
        master_mount: &InfoPosition,
        own_devices: &HashSet<String>,
    ) {
        for update in updates_from_report(report, side, superframe, master_mount, own_devices) {
            self.push(update);
        }
    }
}

impl Iterator for ReportBuffer {
    type Item = RangingUpdate;

    fn next(&mut self) -> Option<Self::Item> {
        self.msgs.lock().unwrap().pop_front()
    }
}

impl RangingSource for ReportBuffer {
    fn clear(&mut self) {
        self.msgs.lock().unwrap().clear();
    }
}

/// Extracts the foreign-vehicle measurements from one report. Readings
/// against the vehicle's own slaves are dropped here, on the producer side,
/// so the buffer only ever holds real targets.
pub fn updates_from_report(
    report: &RangingReport,
    side: EndSide,
    superframe: u64,
    master_mount: &InfoPosition,
    own_devices: &HashSet<String>,
) -> Vec<RangingUpdate> {
    report
        .anchors
        .iter()
        .filter(|anchor| !own_devices.contains(&anchor.id))
        .map(|anchor| {
            let slave = recover_slave_info(anchor);
            let corrected_mm = corrected_distance_mm(anchor.dist_mm, master_mount, &slave);
            RangingUpdate {
                side,
                superframe,
                anchor_id: anchor.id.clone(),
                slave,
                raw_dist_mm: anchor.dist_mm,
                corrected_mm,
            }
        })
        .collect()
}

/// Streams a master port into the shared buffer: accumulate bytes, split on
/// newline, decode, ingest. Runs until the port dies. Undecodable lines are
/// routine (shell echo, garbage at stream start) and only logged.
pub fn spawn_reader(
    port: SerialPort,
    side: EndSide,
    firmware: Firmware,
    master_mount: InfoPosition,
    own_devices: HashSet<String>,
    buffer: ReportBuffer,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("{} end reader", side))
        .spawn(move || {
            let mut superframe: u64 = 0;
            let mut raw = [0u8; 256];
            let mut line_buf = Vec::new();

            loop {
                let read_len = match port.read(&mut raw) {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(e) => {
                        error!("{} end reader: port lost: {}", side, e);
                        break;
                    }
                };

                for &c in raw.iter().take(read_len) {
                    line_buf.push(c);
                    if c != b'\n' {
                        continue;
                    }

                    match std::str::from_utf8(&line_buf) {
                        Ok(s) => match RangingReport::parse(s, firmware) {
                            Ok(report) => {
                                debug!("{} end superframe {}: {} anchor(s)",
                                    side, superframe, report.anchors.len());
                                buffer.ingest(
                                    &report,
                                    side,
                                    superframe,
                                    &master_mount,
                                    &own_devices,
                                );
                                superframe += 1;
                            }
                            Err(e) => debug!("{} end reader: {}", side, e),
                        },
                        // Often happens at the beginning of transmission when
                        // there is still garbage in the hardware buffer
                        Err(e) => warn!("{} end reader: non-utf8 line: {}", side, e),
                    }
                    line_buf.clear();
                }
            }
        })
        .expect("thread name is valid")
}
