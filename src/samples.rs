//! Sample triggering seam between the clock and whatever makes sound
use std::sync::Arc;

use log::debug;

use crate::error::PlaybackError;
use crate::instrument::InstrumentId;

/// Fire-and-forget sound trigger.
///
/// Every call starts an independent voice, so two hits of the same instrument
/// overlap instead of cutting each other off. Implementations must not block: the
/// clock calls this while holding its state lock.
pub trait SampleBank: Send + Sync {
    fn trigger(&self, instrument: InstrumentId) -> Result<(), PlaybackError>;
}

impl<T: SampleBank + ?Sized> SampleBank for Arc<T> {
    fn trigger(&self, instrument: InstrumentId) -> Result<(), PlaybackError> {
        (**self).trigger(instrument)
    }
}

impl<T: SampleBank + ?Sized> SampleBank for Box<T> {
    fn trigger(&self, instrument: InstrumentId) -> Result<(), PlaybackError> {
        (**self).trigger(instrument)
    }
}

/// Used when no output could be opened: the grid keeps animating without sound.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentBank;

impl SampleBank for SilentBank {
    fn trigger(&self, instrument: InstrumentId) -> Result<(), PlaybackError> {
        debug!("silent trigger {instrument}");
        Ok(())
    }
}

/// Sends every trigger to two banks, e.g. audio plus a MIDI mirror.
///
/// Both are always attempted; the first failure is reported.
#[derive(Debug, Clone)]
pub struct Layered<A, B> {
    pub primary: A,
    pub secondary: B,
}

impl<A, B> Layered<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }
}

impl<A: SampleBank, B: SampleBank> SampleBank for Layered<A, B> {
    fn trigger(&self, instrument: InstrumentId) -> Result<(), PlaybackError> {
        let primary = self.primary.trigger(instrument);
        let secondary = self.secondary.trigger(instrument);
        primary.and(secondary)
    }
}
