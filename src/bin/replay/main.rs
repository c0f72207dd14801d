//! Offline replay of a raw UART capture. The capture lines run through the
//! same decode and correction stages the live harness uses, chained over
//! channels, and every decoded superframe prints one classified alert line.

use clap::Parser;
use log::warn;
use std::{
    collections::HashSet,
    fs::File,
    io::{BufRead, BufReader},
    sync::{mpsc::channel, Arc, Mutex},
    thread,
};

use uwbranging::{
    accumulator::DetectionAccumulator,
    args::ReplayArgs,
    component::{run_component, LineDecoder, RecordSink, UpdateExtractor},
    label::{decode_master_label, EndSide, InfoPosition},
    record::{RangingRecord, RecordWriter},
    safety::{classify, display_line},
    source::ReportBuffer,
};

fn main() {
    env_logger::init();
    let args = ReplayArgs::parse();

    let capture = File::open(&args.input).expect("Failed to open capture file");

    let master_mount = match &args.master_label {
        Some(label) => decode_master_label(label).expect("Failed to decode mounting label"),
        None => InfoPosition::unknown(),
    };
    let side = match master_mount.side {
        EndSide::Unknown => EndSide::A,
        known => known,
    };
    let own_devices: HashSet<String> = args
        .own_devices
        .iter()
        .map(|addr| addr.to_ascii_uppercase())
        .collect();

    let (line_tx, decode_rx) = channel::<String>();
    let (decode_tx, extract_rx) = channel();
    let (extract_tx, updates_rx) = channel();
    run_component(Box::new(LineDecoder::new(args.firmware)), decode_rx, decode_tx);
    run_component(
        Box::new(UpdateExtractor::new(side, master_mount, own_devices)),
        extract_rx,
        extract_tx,
    );

    // The sink's output channel must outlive the run, or every record it
    // acknowledges logs a send failure.
    let record_sink = args.record_out.as_ref().map(|path| {
        let writer = RecordWriter::create(path).expect("Failed to create record file");
        let (record_tx, sink_rx) = channel::<RangingRecord>();
        let (sink_tx, done_rx) = channel::<()>();
        let handle = run_component(Box::new(RecordSink::new(writer)), sink_rx, sink_tx);
        (record_tx, done_rx, handle)
    });

    let feeder = thread::spawn(move || {
        for line in BufReader::new(capture).lines() {
            match line {
                Ok(line) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("unreadable capture line: {}", e),
            }
        }
    });

    let buffer = ReportBuffer::new();
    let mut accumulator = DetectionAccumulator::new(Arc::new(Mutex::new(buffer.clone())));

    let mut superframes: u64 = 0;
    while let Ok(frame) = updates_rx.recv() {
        // Non-report lines (prompts, garbage) carry no superframe. Reports
        // with no foreign readings do, and still print, since that is how
        // the display falls back to OutOfRange.
        let Some((superframe, updates)) = frame else {
            continue;
        };
        for update in updates {
            buffer.push(update);
        }

        let detections = accumulator.detections_for(side);
        let alert = classify(&detections);
        println!(
            "superframe {:>6}: {} [{}]",
            superframe,
            display_line(side, &detections, args.units),
            alert
        );

        if let Some((record_tx, _, _)) = &record_sink {
            record_tx
                .send(RangingRecord::now(side, alert, detections))
                .expect("record sink is alive while updates flow");
        }
        superframes += 1;
    }

    feeder.join().expect("feeder thread never panics");
    if let Some((record_tx, done_rx, handle)) = record_sink {
        drop(record_tx);
        handle.join().expect("record sink never panics");
        drop(done_rx);
    }
    println!("replayed {} superframe(s)", superframes);
}
