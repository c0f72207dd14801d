//! A synthetic [`RangingSource`] for running the harness without vehicles
//! or radios: a single foreign vehicle approaches from far out, with
//! measurement noise, and both ends see it.

use crate::label::{EndSide, InfoPosition};
use crate::source::{RangingSource, RangingUpdate};
use rand::prelude::*;
use std::collections::VecDeque;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Where the simulated foreign vehicle starts, mm.
const START_RANGE_MM: f64 = 30_000.0;
/// Simulated report interval, matching the 10 Hz firmware rate.
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// A background thread that fabricates [`RangingUpdate`]s for one
/// approaching vehicle.
pub struct DummySource {
    handle: Option<thread::JoinHandle<()>>,
    tx: mpsc::Sender<Signal>,
    msgs: Arc<Mutex<VecDeque<RangingUpdate>>>,
}

enum Signal {
    ClosingSpeed(f64),
    Noise(f64),
    Stop,
}

impl DummySource {
    /// Starts the generator with the given closing speed (mm per frame) and
    /// measurement noise (mm, uniform).
    pub fn new(closing_speed: f64, noise: f64) -> Self {
        let (tx, rx) = mpsc::channel::<Signal>();
        let msgs = Arc::new(Mutex::new(VecDeque::new()));
        let th_msgs = Arc::clone(&msgs);

        let handle = thread::spawn(move || {
            let mut rng = thread_rng();
            let mut running = true;
            let mut speed = closing_speed;
            let mut noise = noise;
            let mut range = START_RANGE_MM;
            let mut superframe: u64 = 0;

            while running {
                if let Ok(received) = rx.try_recv() {
                    match received {
                        Signal::ClosingSpeed(new_speed) => speed = new_speed,
                        Signal::Noise(new_noise) => noise = new_noise,
                        Signal::Stop => running = false,
                    }
                }

                th_msgs
                    .lock()
                    .unwrap()
                    .append(&mut generate_frame(range, noise, superframe, &mut rng));

                superframe += 1;
                range = (range - speed).max(0.0);
                thread::sleep(FRAME_INTERVAL);
            }
        });

        DummySource {
            handle: Some(handle),
            tx,
            msgs,
        }
    }

    /// Changes how fast the simulated vehicle closes in, mm per frame.
    pub fn set_closing_speed(&self, speed: f64) {
        self.tx.send(Signal::ClosingSpeed(speed)).unwrap();
    }

    /// Changes the measurement noise, mm.
    pub fn set_noise(&self, noise: f64) {
        self.tx.send(Signal::Noise(noise)).unwrap();
    }

    /// Stops the generator thread and waits for it to finish.
    pub fn stop(&mut self) {
        self.tx.send(Signal::Stop).unwrap();
        if let Some(thread) = self.handle.take() {
            thread.join().unwrap();
        }
    }
}

impl Iterator for DummySource {
    type Item = RangingUpdate;
    fn next(&mut self) -> Option<Self::Item> {
        self.msgs.lock().unwrap().pop_front()
    }
}

impl RangingSource for DummySource {
    fn clear(&mut self) {
        self.msgs.lock().unwrap().clear();
    }
}

/// The foreign vehicle's front slave as both of our masters would see it.
fn generate_frame(
    range: f64,
    noise: f64,
    superframe: u64,
    rng: &mut ThreadRng,
) -> VecDeque<RangingUpdate> {
    let slave = InfoPosition {
        x_mm: 900,
        y_mm: 0,
        z_mm: 700,
        assoc_id: 1,
        side: EndSide::A,
    };

    [EndSide::A, EndSide::B]
        .into_iter()
        .map(|side| {
            let jitter = if noise > 0.0 {
                rng.gen_range(-noise..noise)
            } else {
                0.0
            };
            // The B end sees the target a car length further away.
            let extra = if side == EndSide::B { 4500.0 } else { 0.0 };
            let measured = (range + extra + jitter).max(0.0);
            RangingUpdate {
                side,
                superframe,
                anchor_id: "D00D".to_owned(),
                slave,
                raw_dist_mm: measured.round() as i32,
                corrected_mm: Some((measured - slave.x_mm as f64).round() as i32),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_cover_both_ends() {
        let mut rng = thread_rng();
        let frame = generate_frame(10_000.0, 0.0, 4, &mut rng);

        assert_eq!(frame.len(), 2);
        let sides: Vec<EndSide> = frame.iter().map(|u| u.side).collect();
        assert_eq!(sides, vec![EndSide::A, EndSide::B]);
        assert!(frame.iter().all(|u| u.superframe == 4));
        assert_eq!(frame[0].raw_dist_mm, 10_000);
        assert_eq!(frame[0].corrected_mm, Some(9_100));
        assert_eq!(frame[1].raw_dist_mm, 14_500);
    }

    #[test]
    fn noise_stays_bounded() {
        let mut rng = thread_rng();
        for _ in 0..50 {
            let frame = generate_frame(5_000.0, 100.0, 0, &mut rng);
            let d = frame[0].raw_dist_mm;
            assert!((4_900..=5_100).contains(&d));
        }
    }

    #[test]
    fn source_produces_and_stops() {
        let mut source = DummySource::new(500.0, 0.0);
        thread::sleep(Duration::from_millis(250));
        source.stop();

        let first = source.next().expect("generator should have produced frames");
        assert_eq!(first.superframe, 0);
        assert_eq!(first.anchor_id, "D00D");
    }
}
