use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::{Duration, Instant};

use drumgrid::{
    InstrumentId, Pattern, PlaybackError, PlaybackEvent, SampleBank, SequencerClock, STEPS,
};

#[derive(Default)]
struct Counter {
    hits: Mutex<Vec<(InstrumentId, Instant)>>,
}

impl Counter {
    fn count(&self) -> usize {
        self.hits.lock().unwrap().len()
    }

    fn count_of(&self, instrument: InstrumentId) -> usize {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(hit, _)| *hit == instrument)
            .count()
    }

    fn times(&self) -> Vec<Instant> {
        self.hits.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

impl SampleBank for Counter {
    fn trigger(&self, instrument: InstrumentId) -> Result<(), PlaybackError> {
        self.hits.lock().unwrap().push((instrument, Instant::now()));
        Ok(())
    }
}

/// Blocks in `trigger` for as long as someone else holds `busy`.
#[derive(Default)]
struct Contended {
    busy: Arc<Mutex<()>>,
    entered: AtomicUsize,
}

impl SampleBank for Contended {
    fn trigger(&self, _instrument: InstrumentId) -> Result<(), PlaybackError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        drop(self.busy.lock().unwrap());
        Ok(())
    }
}

fn every_step(instrument: InstrumentId, bpm: u16) -> Pattern {
    let mut pattern = Pattern::new();
    pattern.set_bpm(bpm).unwrap();
    for step in 0..STEPS {
        pattern.toggle_step(instrument, step).unwrap();
    }
    pattern
}

fn clock_with(pattern: Pattern, bank: &Arc<Counter>) -> SequencerClock {
    SequencerClock::new(pattern, Arc::clone(bank)).unwrap()
}

#[test]
fn test_first_tick_fires_step_zero_immediately() {
    let mut pattern = Pattern::new();
    pattern.toggle_step(InstrumentId::Kick, 0).unwrap();
    let bank = Arc::new(Counter::default());
    let clock = clock_with(pattern, &bank);

    assert!(clock.start());
    // well inside the first 125 ms step at 120 bpm
    sleep(Duration::from_millis(40));

    assert_eq!(bank.count_of(InstrumentId::Kick), 1);
    assert_eq!(clock.state().current_step, Some(0));
    assert!(clock.poll_events().starts_with(&[
        PlaybackEvent::StepAdvanced(0),
        PlaybackEvent::Triggered(InstrumentId::Kick),
    ]));
}

#[test]
fn test_start_twice_is_rejected() {
    let clock = SequencerClock::new(Pattern::new(), Arc::new(Counter::default())).unwrap();
    assert!(clock.start());
    assert!(!clock.start());
    assert!(clock.is_running());
}

#[test]
fn test_no_triggers_after_stop() {
    let bank = Arc::new(Counter::default());
    let clock = clock_with(every_step(InstrumentId::Hihat, 200), &bank);

    clock.start();
    sleep(Duration::from_millis(200));
    clock.stop();
    let count = bank.count();
    assert!(count >= 2, "only {count} hits before stop");

    sleep(Duration::from_millis(300));
    assert_eq!(bank.count(), count);
    assert!(!clock.is_running());
    assert_eq!(clock.state().current_step, None);
}

#[test]
fn test_current_step_stays_in_range() {
    let bank = Arc::new(Counter::default());
    let clock = clock_with(every_step(InstrumentId::Clap, 200), &bank);
    clock.start();

    let deadline = Instant::now() + Duration::from_millis(1500);
    while Instant::now() < deadline {
        if let Some(step) = clock.state().current_step {
            assert!(step < STEPS);
        }
        sleep(Duration::from_millis(5));
    }

    // 1.5 s at 75 ms per step wraps around the grid
    let steps: Vec<usize> = clock
        .poll_events()
        .into_iter()
        .filter_map(|event| match event {
            PlaybackEvent::StepAdvanced(step) => Some(step),
            PlaybackEvent::Triggered(_) => None,
        })
        .collect();
    assert!(steps.iter().all(|&step| step < STEPS));
    assert!(steps
        .windows(2)
        .any(|pair| pair[0] == STEPS - 1 && pair[1] == 0));
    for pair in steps.windows(2) {
        assert_eq!(pair[1], (pair[0] + 1) % STEPS);
    }
}

#[test]
fn test_tempo_change_applies_while_running() {
    let bank = Arc::new(Counter::default());
    let clock = clock_with(every_step(InstrumentId::Kick, 60), &bank);

    clock.start();
    sleep(Duration::from_millis(20));
    // the pending 250 ms step is rescheduled to 75 ms
    clock.set_bpm(200).unwrap();
    sleep(Duration::from_millis(600));
    clock.stop();

    let times = bank.times();
    assert!(times.len() >= 5, "only {} hits at 200 bpm", times.len());
    let gaps: Vec<Duration> = times.windows(2).map(|pair| pair[1] - pair[0]).collect();
    let mean = gaps.iter().sum::<Duration>() / gaps.len() as u32;
    assert!(mean < Duration::from_millis(150), "mean gap {mean:?}");
}

#[test]
fn test_clear_while_running() {
    let bank = Arc::new(Counter::default());
    let clock = clock_with(every_step(InstrumentId::Snare, 180), &bank);
    clock.start();
    sleep(Duration::from_millis(50));

    clock.clear();

    assert!(!clock.is_running());
    let pattern = clock.pattern();
    assert!(pattern.is_empty());
    for instrument in InstrumentId::all() {
        assert_eq!(pattern.track(instrument), &[false; STEPS]);
    }
    assert_eq!(pattern.bpm(), 180);
}

#[test]
fn test_restart_rewinds_to_step_zero() {
    let bank = Arc::new(Counter::default());
    let clock = clock_with(every_step(InstrumentId::Kick, 200), &bank);
    clock.start();
    sleep(Duration::from_millis(250));
    clock.stop();
    clock.poll_events();

    clock.start();
    sleep(Duration::from_millis(20));
    assert_eq!(
        clock.poll_events().first(),
        Some(&PlaybackEvent::StepAdvanced(0))
    );
}

#[test]
fn test_slow_bank_does_not_block_reads_or_edits() {
    let bank = Arc::new(Contended::default());
    let busy = Arc::clone(&bank.busy);
    let clock =
        SequencerClock::new(every_step(InstrumentId::Kick, 120), Arc::clone(&bank)).unwrap();
    // released before the clock on unwind, so a failed assert cannot hang the drop
    let held = busy.lock().unwrap();
    clock.start();

    let deadline = Instant::now() + Duration::from_secs(2);
    while bank.entered.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "first trigger never ran");
        sleep(Duration::from_millis(1));
    }

    // the worker is stuck inside trigger now
    let started = Instant::now();
    let state = clock.state();
    clock.toggle_step(InstrumentId::Snare, 3).unwrap();
    clock.set_bpm(140).unwrap();
    let pattern = clock.pattern();
    assert!(
        started.elapsed() < Duration::from_millis(100),
        "blocked for {:?}",
        started.elapsed()
    );
    assert!(state.is_running);
    assert_eq!(state.current_step, Some(0));
    assert!(pattern.is_active(InstrumentId::Snare, 3));
    assert_eq!(pattern.bpm(), 140);

    drop(held);
    clock.stop();
    let entered = bank.entered.load(Ordering::SeqCst);
    sleep(Duration::from_millis(300));
    assert_eq!(bank.entered.load(Ordering::SeqCst), entered);
}

#[test]
fn test_drop_joins_worker() {
    let bank = Arc::new(Counter::default());
    {
        let clock = clock_with(every_step(InstrumentId::Kick, 200), &bank);
        clock.start();
        sleep(Duration::from_millis(50));
    }
    let count = bank.count();
    sleep(Duration::from_millis(200));
    assert_eq!(bank.count(), count);
    // the clock's clone of the bank went away with the worker
    assert_eq!(Arc::strong_count(&bank), 1);
}
