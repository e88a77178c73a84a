//! Relay loop composing the wait, refill, pacing and pump steps
//!
//! Each iteration runs, in order:
//!
//! 1. terminate check (exit without further I/O once latched)
//! 2. idle delay
//! 3. bounded readiness wait
//! 4. control-event handler, if an event is pending
//! 5. refill driver, if the slot awaits refill
//! 6. pump, if writable and not stopped and the pacing gate is open
//! 7. housekeeping
//!
//! Control events are always handled before refill and pump, so a stream
//! stop observed in an iteration prevents a pump in that same iteration.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::hooks::{
    ControlContext, ControlEventHandler, FpsReporter, Housekeeping, NoControlEvents,
    NoHousekeeping, RefillDriver, TickContext,
};
use crate::multiplexer::{EventMultiplexer, WaitOutcome};
use crate::pacing::{Clock, PacingController, SystemClock};
use crate::pump::{FramePump, PumpOutcome};
use crate::sink::{DeviceSink, SinkState};
use crate::types::{BufferSlot, StreamFlags};
use crate::{RelayError, Result};


/// Counters maintained by the loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub iterations: u64,
    pub frames_pumped: u64,
    pub dequeue_failures: u64,
    pub queue_failures: u64,
    pub timeouts: u64,
    pub interruptions: u64,
    pub control_events: u64,
}

/// Why the loop stopped
#[derive(Debug)]
pub enum ExitReason {
    /// `terminate` was observed at the top of an iteration
    Terminated,
    /// The timeout policy declared the device gone
    Timeout(RelayError),
    /// The wait primitive failed
    WaitFailed(RelayError),
}

/// Summary returned when the loop stops
#[derive(Debug)]
pub struct RelayReport {
    pub exit: ExitReason,
    pub stats: RelayStats,
}

/// Single-threaded relay from a refill driver into a device sink
pub struct RelayLoop<S: DeviceSink, C: Clock = SystemClock> {
    // Declared before `slot`: the sink is dropped, and releases any buffer
    // addresses it holds, before the slot memory is freed.
    sink: S,
    slot: BufferSlot,
    sink_state: SinkState,
    flags: Arc<StreamFlags>,
    config: RelayConfig,
    pump: FramePump,
    pacing: PacingController,
    mux: EventMultiplexer,
    control: Box<dyn ControlEventHandler + Send>,
    refill: Box<dyn RefillDriver + Send>,
    housekeeping: Box<dyn Housekeeping + Send>,
    clock: C,
    stats: RelayStats,
    stats_tx: Option<watch::Sender<RelayStats>>,
}

impl<S: DeviceSink> RelayLoop<S, SystemClock> {
    /// Start building a loop relaying frames from `refill` into `sink`.
    pub fn builder<R>(config: RelayConfig, sink: S, refill: R) -> RelayLoopBuilder<S, SystemClock>
    where
        R: RefillDriver + Send + 'static,
    {
        RelayLoopBuilder {
            config,
            sink,
            refill: Box::new(refill),
            control: None,
            housekeeping: None,
            flags: None,
            sink_state: SinkState::default(),
            clock: SystemClock,
            stats_tx: None,
        }
    }
}

impl<S: DeviceSink, C: Clock> RelayLoop<S, C> {
    /// Run until `terminate` is observed or the wait reports a fatal condition.
    pub fn run(&mut self) -> RelayReport {
        info!(
            label = %self.config.label,
            rate = %self.config.fps,
            frame_size = self.slot.length(),
            "PROCESSING: SOURCE {} -> UVC {}",
            self.config.source_format,
            self.sink.name()
        );

        // The schedule starts when the loop does, not when it was built.
        self.pacing.restart(self.clock.now());

        let exit = loop {
            if let Some(exit) = self.iterate() {
                break exit;
            }
        };

        self.publish_stats();
        info!(
            reason = ?exit,
            iterations = self.stats.iterations,
            frames = self.stats.frames_pumped,
            "Relay loop stopped"
        );
        RelayReport { exit, stats: self.stats.clone() }
    }

    /// One loop iteration; `Some` when the loop must stop.
    fn iterate(&mut self) -> Option<ExitReason> {
        if self.flags.terminate_requested() {
            debug!("Terminate requested");
            return Some(ExitReason::Terminated);
        }
        self.stats.iterations += 1;

        self.clock.sleep(self.config.idle_delay);

        let readiness = match self.mux.wait(&mut self.sink) {
            WaitOutcome::Proceed(readiness) => readiness,
            WaitOutcome::TimedOut => {
                self.stats.timeouts += 1;
                Default::default()
            }
            WaitOutcome::Restart => {
                self.stats.interruptions += 1;
                self.publish_stats();
                return None;
            }
            WaitOutcome::Fatal(e @ RelayError::Timeout { .. }) => {
                self.stats.timeouts += 1;
                return Some(ExitReason::Timeout(e));
            }
            WaitOutcome::Fatal(e) => return Some(ExitReason::WaitFailed(e)),
        };

        if readiness.error_pending {
            self.stats.control_events += 1;
            let mut ctx = ControlContext { sink: &mut self.sink_state, flags: &self.flags };
            self.control.handle_control_event(&mut ctx);
        }

        if self.slot.needs_refill() {
            self.refill.refill(&mut self.slot, &self.flags);
        }

        let now = self.clock.now();

        if readiness.writable && !self.flags.stopped() && self.pacing.may_pump_now(now) {
            match self.pump.try_pump(&mut self.slot, &mut self.sink, &mut self.sink_state, &self.flags)
            {
                PumpOutcome::Pumped { .. } => {
                    self.pacing.advance(now);
                    self.stats.frames_pumped += 1;
                }
                PumpOutcome::DequeueFailed => self.stats.dequeue_failures += 1,
                PumpOutcome::QueueFailed { .. } => self.stats.queue_failures += 1,
                PumpOutcome::Skipped(_) => {}
            }
        }

        let ctx =
            TickContext { now, sink: &self.sink_state, flags: &self.flags, stats: &self.stats };
        self.housekeeping.on_tick(&ctx);

        self.publish_stats();
        None
    }

    /// Replace the stats channel; the current counters are published at once.
    pub(crate) fn attach_stats_sender(&mut self, tx: watch::Sender<RelayStats>) {
        self.stats_tx = Some(tx);
        self.publish_stats();
    }

    fn publish_stats(&self) {
        if let Some(tx) = &self.stats_tx {
            tx.send_replace(self.stats.clone());
        }
    }

    pub fn flags(&self) -> Arc<StreamFlags> {
        Arc::clone(&self.flags)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn sink_state(&self) -> &SinkState {
        &self.sink_state
    }

    pub fn slot(&self) -> &BufferSlot {
        &self.slot
    }

    pub fn pacing(&self) -> &PacingController {
        &self.pacing
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

/// Builder for [`RelayLoop`]
pub struct RelayLoopBuilder<S: DeviceSink, C: Clock> {
    config: RelayConfig,
    sink: S,
    refill: Box<dyn RefillDriver + Send>,
    control: Option<Box<dyn ControlEventHandler + Send>>,
    housekeeping: Option<Box<dyn Housekeeping + Send>>,
    flags: Option<Arc<StreamFlags>>,
    sink_state: SinkState,
    clock: C,
    stats_tx: Option<watch::Sender<RelayStats>>,
}

impl<S: DeviceSink, C: Clock> RelayLoopBuilder<S, C> {
    /// Handler for pending control events. Defaults to ignoring them.
    pub fn control<H>(mut self, handler: H) -> Self
    where
        H: ControlEventHandler + Send + 'static,
    {
        self.control = Some(Box::new(handler));
        self
    }

    /// Per-iteration hook. Defaults to an [`FpsReporter`] when `show_fps`
    /// is set, nothing otherwise.
    pub fn housekeeping<K>(mut self, hook: K) -> Self
    where
        K: Housekeeping + Send + 'static,
    {
        self.housekeeping = Some(Box::new(hook));
        self
    }

    /// Share externally owned control flags.
    pub fn flags(mut self, flags: Arc<StreamFlags>) -> Self {
        self.flags = Some(flags);
        self
    }

    /// Initial sink state, for sinks already streaming when the loop starts.
    pub fn sink_state(mut self, state: SinkState) -> Self {
        self.sink_state = state;
        self
    }

    pub fn stats_sender(mut self, tx: watch::Sender<RelayStats>) -> Self {
        self.stats_tx = Some(tx);
        self
    }

    pub fn clock<C2: Clock>(self, clock: C2) -> RelayLoopBuilder<S, C2> {
        RelayLoopBuilder {
            config: self.config,
            sink: self.sink,
            refill: self.refill,
            control: self.control,
            housekeeping: self.housekeeping,
            flags: self.flags,
            sink_state: self.sink_state,
            clock,
            stats_tx: self.stats_tx,
        }
    }

    /// Validate the configuration and allocate the buffer slot.
    pub fn build(self) -> Result<RelayLoop<S, C>> {
        self.config.validate()?;

        let housekeeping: Box<dyn Housekeeping + Send> = match self.housekeeping {
            Some(hook) => hook,
            None if self.config.show_fps => {
                Box::new(FpsReporter::new(self.config.label.clone(), self.config.fps_report_interval))
            }
            None => Box::new(NoHousekeeping),
        };

        let pacing = PacingController::new(self.config.frame_interval(), self.clock.now());
        let mux = EventMultiplexer::new(self.config.wait_timeout, self.config.timeout_policy);

        Ok(RelayLoop {
            sink: self.sink,
            slot: BufferSlot::new(self.config.frame_size),
            sink_state: self.sink_state,
            flags: self.flags.unwrap_or_else(StreamFlags::new),
            pump: FramePump::new(self.config.show_fps),
            pacing,
            mux,
            control: self.control.unwrap_or_else(|| Box::new(NoControlEvents)),
            refill: self.refill,
            housekeeping,
            clock: self.clock,
            stats: RelayStats::default(),
            stats_tx: self.stats_tx,
            config: self.config,
        })
    }
}
