//! Defines the Component trait used by the offline replay pipeline. This
//! enforces a common interface between stages, so that each stage can
//! consume data from the preceding stage, process it, and pass new data to
//! the subsequent stage over a channel.

use crate::record::{RangingRecord, RecordError, RecordWriter};
use crate::report::{Firmware, RangingReport};
use crate::source::{updates_from_report, RangingUpdate};
use crate::label::{EndSide, InfoPosition};
use log::{info, warn};
use std::collections::HashSet;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Errors surfaced when a stage finalizes.
#[derive(Debug)]
pub enum ComponentError {
    /// The record sink failed to write.
    RecordError(RecordError),
}

///
/// A stage in the replay pipeline. All structs that perform a processing
/// step must implement Component, so that they can be chained over
/// channels.
///
pub trait Component: ToString {
    /// What the stage consumes.
    type InData;
    /// What the stage produces.
    type OutData;

    /// Converts an input of type A into an output of type B
    fn convert(&mut self, input: Self::InData) -> Self::OutData;

    /// Cleans up at termination of pipeline
    fn finalize(&mut self) -> Result<(), ComponentError>;
}

/// Runs the given Component on its own thread. On receiving data of type
/// InData on the input channel, the Component converts them to data of type
/// OutData and sends it to the output channel.
pub fn run_component<C: Component + Send + 'static>(
    mut component: Box<C>,
    input: Receiver<<C as Component>::InData>,
    output: Sender<<C as Component>::OutData>,
) -> JoinHandle<()>
where
    <C as Component>::InData: Send + 'static,
    <C as Component>::OutData: Send + 'static,
{
    thread::spawn(move || {
        while let Ok(data) = input.recv() {
            let out_data = component.convert(data);
            if let Err(error) = output.send(out_data) {
                warn!("{} : received error {}.", component.to_string(), error);
            }
        }

        if let Err(component_error) = component.finalize() {
            warn!(
                "{} : error during terminating : {component_error:?}.",
                component.to_string(),
            );
        }
        info!("{} : terminated.", component.to_string());
    })
}

/// Stage one: raw capture lines to decoded reports. Lines that are not
/// reports (prompts, garbage) come out as `None` so the counter downstream
/// stays aligned with the capture.
pub struct LineDecoder {
    firmware: Firmware,
}

impl LineDecoder {
    /// A decoder for captures from the given firmware.
    pub fn new(firmware: Firmware) -> Self {
        LineDecoder { firmware }
    }
}

impl Component for LineDecoder {
    type InData = String;
    type OutData = Option<RangingReport>;

    fn convert(&mut self, input: String) -> Option<RangingReport> {
        RangingReport::parse(&input, self.firmware).ok()
    }

    fn finalize(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }
}

impl ToString for LineDecoder {
    fn to_string(&self) -> String {
        "LineDecoder".to_string()
    }
}

/// Stage two: decoded reports to foreign-vehicle updates, counting
/// superframes as the live reader would. Non-report lines come out as
/// `None`; a report whose every reading was filtered still yields its
/// (empty) superframe, since an empty frame is what drives the display
/// back to out-of-range.
pub struct UpdateExtractor {
    side: EndSide,
    master_mount: InfoPosition,
    own_devices: HashSet<String>,
    superframe: u64,
}

impl UpdateExtractor {
    /// An extractor for one vehicle end's capture.
    pub fn new(side: EndSide, master_mount: InfoPosition, own_devices: HashSet<String>) -> Self {
        UpdateExtractor {
            side,
            master_mount,
            own_devices,
            superframe: 0,
        }
    }
}

impl Component for UpdateExtractor {
    type InData = Option<RangingReport>;
    type OutData = Option<(u64, Vec<RangingUpdate>)>;

    fn convert(&mut self, input: Option<RangingReport>) -> Option<(u64, Vec<RangingUpdate>)> {
        let report = input?;
        let updates = updates_from_report(
            &report,
            self.side,
            self.superframe,
            &self.master_mount,
            &self.own_devices,
        );
        let superframe = self.superframe;
        self.superframe += 1;
        Some((superframe, updates))
    }

    fn finalize(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }
}

impl ToString for UpdateExtractor {
    fn to_string(&self) -> String {
        "UpdateExtractor".to_string()
    }
}

/// Terminal stage: records to the on-disk log.
pub struct RecordSink {
    writer: RecordWriter,
    result: Result<(), RecordError>,
}

impl RecordSink {
    /// A sink appending to the given writer.
    pub fn new(writer: RecordWriter) -> Self {
        RecordSink {
            writer,
            result: Ok(()),
        }
    }
}

impl Component for RecordSink {
    type InData = RangingRecord;
    type OutData = ();

    fn convert(&mut self, input: RangingRecord) -> () {
        if self.result.is_ok() {
            self.result = self.writer.append(&input);
        }
    }

    fn finalize(&mut self) -> Result<(), ComponentError> {
        std::mem::replace(&mut self.result, Ok(())).map_err(ComponentError::RecordError)
    }
}

impl ToString for RecordSink {
    fn to_string(&self) -> String {
        "RecordSink".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    /// Checks that writing a capture line to the chained decode and extract
    /// stages produces corrected updates at the end of the chain.
    #[test]
    fn decode_then_extract_chain() {
        let decoder = LineDecoder::new(Firmware::AccelEnabled);
        let extractor =
            UpdateExtractor::new(EndSide::A, InfoPosition::unknown(), HashSet::new());

        let (line_tx, decode_rx) = channel::<String>();
        let (decode_tx, extract_rx) = channel();
        let (extract_tx, test_rx) = channel();

        run_component(Box::new(decoder), decode_rx, decode_tx);
        run_component(Box::new(extractor), extract_rx, extract_tx);

        line_tx
            .send("DIST,1;[AN0,459A,0,0,0]=[2833,100];".to_owned())
            .unwrap();
        line_tx.send("dwm> not a report".to_owned()).unwrap();
        line_tx.send("DIST,0;".to_owned()).unwrap();
        line_tx
            .send("DIST,1;[AN0,459A,0,0,0]=[2700,100];".to_owned())
            .unwrap();
        drop(line_tx);

        let (superframe, first) = test_rx.recv().unwrap().unwrap();
        assert_eq!(superframe, 0);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].anchor_id, "459A");

        // The non-report line yields no superframe at all.
        assert_eq!(test_rx.recv().unwrap(), None);

        // An empty report still counts as a (target-free) superframe.
        assert_eq!(test_rx.recv().unwrap(), Some((1, Vec::new())));

        let (superframe, last) = test_rx.recv().unwrap().unwrap();
        assert_eq!(superframe, 2);
        assert_eq!(last[0].raw_dist_mm, 2700);
    }

    #[test]
    fn record_sink_writes_and_finalizes() {
        use crate::safety::AlertLevel;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replayed.log");
        let mut sink = RecordSink::new(RecordWriter::create(&path).unwrap());

        sink.convert(RangingRecord::now(EndSide::A, AlertLevel::Safe, vec![]));
        sink.finalize().unwrap();

        let records = crate::record::read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].alert, AlertLevel::Safe);
    }
}
