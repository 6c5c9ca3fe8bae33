// Interest module - Scores how visually interesting recent frames are on a
// background thread and advances the visualizer preset when the moving
// average falls below threshold
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::types::RasterBuffer;

// Fixed-period timer with catch-up firing: after a stall it fires once and
// realigns to the period grid instead of firing repeatedly.
pub struct Periodic {
    period: Duration,
    next_firing: Instant,
}

impl Periodic {
    pub fn new(period: Duration, start: Instant) -> Self {
        Periodic {
            period,
            next_firing: start + period,
        }
    }

    pub fn is_due(&mut self, now: Instant) -> bool {
        if now < self.next_firing {
            return false;
        }
        let delta = now - self.next_firing;
        let elapsed_periods = delta.as_nanos() / self.period.as_nanos().max(1);
        self.next_firing += self.period * (elapsed_periods as u32 + 1);
        true
    }
}

// Exponential moving average that holds at the interest threshold until
// enough real samples have arrived. The threshold doubles as the reset
// sentinel, so a fresh monitor (or one that just advanced the preset)
// cannot trigger again off startup noise.
#[derive(Debug)]
pub struct MovingAverage {
    average: f32,
    invocations: u32,
}

impl MovingAverage {
    fn new(threshold: f32) -> Self {
        MovingAverage {
            average: threshold,
            invocations: 0,
        }
    }

    fn update(&mut self, value: f32, alpha: f32, threshold: f32, min_invocations: u32) -> f32 {
        if self.invocations < min_invocations {
            self.invocations += 1;
            return threshold;
        }
        self.average = value * (1.0 - alpha) + self.average * alpha;
        self.average
    }

    fn reset(&mut self, threshold: f32) {
        self.average = threshold;
        self.invocations = 0;
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    // How often to score a frame, independent of capture rate
    pub calculation_period_ms: u64,
    // Moving average decay factor in (0, 1]
    pub alpha: f32,
    // The average is pinned to `interest_threshold` until this many scores
    // have been folded in
    pub min_invocations: u32,
    // Advance the preset when the average drops below this
    pub interest_threshold: f32,
    // Number of calculation periods to discard after an advance
    pub cooldown_periods: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            calculation_period_ms: 1000,
            alpha: 0.7,
            min_invocations: 5,
            interest_threshold: 10.0,
            cooldown_periods: 10,
        }
    }
}

// Worker-shared state: the single pending-frame slot and the quit flag.
// There is deliberately no queue; when the worker is busy a newly offered
// frame is dropped so only the most recent frame ever gets scored.
struct Slot {
    pending: Option<Vec<u8>>,
    quit: bool,
}

struct Shared {
    slot: Mutex<Slot>,
    frame_ready: Condvar,
}

pub struct VisualInterestMonitor {
    config: MonitorConfig,
    timer: Periodic,
    shared: Arc<Shared>,
    advance: Arc<dyn Fn() -> Result<()> + Send + Sync>,
    worker: Option<thread::JoinHandle<()>>,
}

impl VisualInterestMonitor {
    pub fn new<F>(config: MonitorConfig, advance: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let timer = Periodic::new(
            Duration::from_millis(config.calculation_period_ms),
            Instant::now(),
        );
        VisualInterestMonitor {
            config,
            timer,
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    pending: None,
                    quit: false,
                }),
                frame_ready: Condvar::new(),
            }),
            advance: Arc::new(advance),
            worker: None,
        }
    }

    // Called once per captured frame on the capture thread. Cheap unless the
    // calculation period has elapsed; never blocks on the worker (a
    // contended lock means the worker is busy, and the frame is dropped).
    pub fn receive(&mut self, raster: &RasterBuffer) {
        if !self.timer.is_due(Instant::now()) {
            return;
        }
        let Ok(mut slot) = self.shared.slot.try_lock() else {
            return;
        };
        if slot.pending.is_none() {
            slot.pending = Some(raster.data.clone());
        }
        drop(slot);
        if self.worker.is_none() {
            self.spawn_worker();
        }
        self.shared.frame_ready.notify_one();
    }

    fn spawn_worker(&mut self) {
        eprintln!("Creating interest calculation thread");
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let advance = Arc::clone(&self.advance);
        self.worker = Some(thread::spawn(move || {
            worker_loop(&shared, &config, advance.as_ref());
        }));
    }
}

impl Drop for VisualInterestMonitor {
    // Teardown is synchronous: the worker has fully exited before drop
    // returns, so no scoring can race the monitor's destruction.
    fn drop(&mut self) {
        {
            let mut slot = match self.shared.slot.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.quit = true;
        }
        self.shared.frame_ready.notify_one();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: &Shared, config: &MonitorConfig, advance: &(dyn Fn() -> Result<()>)) {
    let mut previous_frame: Vec<u8> = Vec::new();
    let mut average = MovingAverage::new(config.interest_threshold);
    // Starts at zero, so the monitor also sits out one full cooldown window
    // right after startup
    let mut cooldown_counter = 0;

    loop {
        // Scoring runs with the slot held, so frames offered meanwhile are
        // dropped rather than queued; the slot refills only once scoring is
        // done, which keeps the newest offer and loses the rest. The lock is
        // released before the average/advance step so a slow advance command
        // stalls only scoring, never frame admission.
        let interest = {
            let mut slot = match shared.slot.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            while slot.pending.is_none() && !slot.quit {
                slot = match shared.frame_ready.wait(slot) {
                    Ok(slot) => slot,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
            if slot.quit {
                eprintln!("Signaled to quit interest calculation thread");
                return;
            }

            if cooldown_counter < config.cooldown_periods {
                eprintln!(
                    "Cooldown over in {}...",
                    config.cooldown_periods - cooldown_counter
                );
                cooldown_counter += 1;
                slot.pending = None;
                continue;
            }

            let interest = match slot.pending.as_ref() {
                Some(frame) => calculate_visual_interest(frame, &mut previous_frame),
                None => continue,
            };
            slot.pending = None;
            interest
        };

        let average_interest = average.update(
            interest,
            config.alpha,
            config.interest_threshold,
            config.min_invocations,
        );
        eprintln!(
            "Visual interest is {}; average is {}",
            interest, average_interest
        );

        if average_interest < config.interest_threshold {
            eprintln!("Average is below threshold; advancing to next preset");
            if let Err(e) = advance() {
                eprintln!("Failed to advance preset: {}", e);
            }
            average.reset(config.interest_threshold);
            cooldown_counter = 0;
        }
    }
}

// Mean of sqrt(|delta|) over every byte of the frame. A size change (e.g.
// display resize) primes the snapshot and scores 0 rather than erroring.
fn calculate_visual_interest(frame: &[u8], previous_frame: &mut Vec<u8>) -> f32 {
    if previous_frame.len() != frame.len() {
        previous_frame.clear();
        previous_frame.extend_from_slice(frame);
        return 0.0;
    }
    let mut delta_energy = 0.0f64;
    for (current, previous) in frame.iter().zip(previous_frame.iter()) {
        delta_energy += f64::from(current.abs_diff(*previous)).sqrt();
    }
    previous_frame.copy_from_slice(frame);
    (delta_energy / frame.len() as f64) as f32
}
