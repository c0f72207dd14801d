//! Live vehicle ranging harness. Pairs the serial ports with the DWM1001
//! modules behind them, streams both masters' reports through the
//! correction pipeline, and prints one alert line per vehicle end at a
//! fixed rate. `--dummy` swaps the hardware for the synthetic source so the
//! display and record paths can be exercised on a desk.

use clap::Parser;
use log::{error, info};
use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use uwbranging::{
    accumulator::DetectionAccumulator,
    args::HarnessArgs,
    config::HarnessConfig,
    dummy_source::DummySource,
    label::EndSide,
    pairing::{master_for_side, own_short_addrs, pair_ports, PairedPort, Role},
    record::{RangingRecord, RecordError, RecordWriter},
    safety::{classify_with, display_line},
    source::{spawn_reader, RangingSource, ReportBuffer},
};

fn main() {
    env_logger::init();
    let args = HarnessArgs::parse();

    let mut config = match &args.config {
        Some(path) => HarnessConfig::from_path(path).expect("Failed to load config file"),
        None => HarnessConfig::default(),
    };
    if let Some(baud) = args.baud {
        config.baud = baud;
    }
    if let Some(firmware) = args.firmware {
        config.firmware = firmware;
    }
    if let Some(units) = args.units {
        config.units = units;
    }
    if let Some(dir) = args.record_dir {
        config.record_dir = Some(dir);
    }

    if args.dummy {
        run_dummy(&config);
    } else {
        run_live(&config);
    }
}

/// One record writer per vehicle end, stamped so consecutive runs in the
/// same directory do not clobber each other.
fn open_writers(dir: &Path) -> Result<Vec<(EndSide, RecordWriter)>, RecordError> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    [EndSide::A, EndSide::B]
        .into_iter()
        .map(|side| {
            let path = dir.join(format!("ranging-{}-{}.log", side, stamp));
            info!("recording {} end to {}", side, path.display());
            Ok((side, RecordWriter::create(path)?))
        })
        .collect()
}

/// Polls the accumulator, prints both ends' alert lines, and appends
/// records until the process is killed.
fn poll_loop<S: RangingSource>(config: &HarnessConfig, source: Arc<Mutex<S>>) {
    let mut accumulator = DetectionAccumulator::new(source);
    let mut writers = match &config.record_dir {
        Some(dir) => open_writers(dir).expect("Failed to create record files"),
        None => Vec::new(),
    };
    let interval = Duration::from_secs_f64(1.0 / config.poll_hz);

    loop {
        for side in [EndSide::A, EndSide::B] {
            let detections = accumulator.detections_for(side);
            let alert = classify_with(&detections, config.alarm_mm, config.warning_mm);
            println!(
                "[{}] {} [{}]",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f"),
                display_line(side, &detections, config.units),
                alert
            );

            if let Some((_, writer)) = writers.iter_mut().find(|(s, _)| *s == side) {
                if let Err(e) = writer.append(&RangingRecord::now(side, alert, detections)) {
                    error!("{} end record write failed: {}", side, e);
                }
            }
        }
        spin_sleep::sleep(interval);
    }
}

fn run_live(config: &HarnessConfig) {
    let paired = pair_ports(config.baud, config.firmware).expect("Failed to pair UWB modules");

    let devices: Vec<_> = paired.iter().map(|p| p.device.clone()).collect();
    let own_devices = own_short_addrs(&devices);
    let buffer = ReportBuffer::new();

    let mut readers = 0;
    for paired_port in paired {
        let PairedPort { port, device } = paired_port;
        let Role::Master { mount } = device.role else {
            // Slaves answer foreign tags over the air; the host has no
            // further business with their ports.
            continue;
        };

        spawn_reader(
            port,
            mount.side,
            config.firmware,
            mount,
            own_devices.clone(),
            buffer.clone(),
        );
        readers += 1;
    }

    if readers == 0 {
        panic!("no ranging master found on any serial port");
    }
    for side in [EndSide::A, EndSide::B] {
        if master_for_side(&devices, side).is_none() {
            info!("no {} end master; that end will read OutOfRange", side);
        }
    }

    poll_loop(config, Arc::new(Mutex::new(buffer)));
}

fn run_dummy(config: &HarnessConfig) {
    info!("running against the synthetic source");
    // 250 mm per 100 ms frame is a 9 km/h closing speed.
    let source = DummySource::new(250.0, 50.0);
    poll_loop(config, Arc::new(Mutex::new(source)));
}
