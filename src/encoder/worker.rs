use super::decoder::QuadratureDecoder;
use crate::error::{ControlResult, HardwareError};
use crate::hardware::BinaryPin;
use crate::metrics::LoopMetrics;
use crate::worker::LoopThread;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

struct EncoderLoop<A, B> {
    decoder: QuadratureDecoder<A, B>,
    accumulated: Arc<Mutex<i64>>,
    poll_interval: Duration,
    metrics: LoopMetrics,
    in_fault: bool,
}

fn poll_iteration<A: BinaryPin, B: BinaryPin>(
    lp: &mut EncoderLoop<A, B>,
) -> Result<(), HardwareError> {
    let cycle_start = Instant::now();

    match lp.decoder.get_delta() {
        Ok(delta) => {
            if delta != 0 {
                *lp.accumulated.lock() += i64::from(delta);
                tracing::trace!(delta, "encoder moved");
            }
            if lp.in_fault {
                tracing::info!("encoder pins readable again");
                lp.in_fault = false;
            }
            lp.metrics.record_cycle(cycle_start.elapsed());
        }
        Err(e) => {
            lp.metrics.record_fault();
            // Log once per streak; the loop polls every millisecond.
            if !lp.in_fault {
                tracing::warn!("encoder sample skipped: {}", e);
                lp.in_fault = true;
            }
        }
    }

    thread::sleep(lp.poll_interval);
    Ok(())
}

fn keep_state<A, B>(_: &mut EncoderLoop<A, B>) {}

// ============================================================================
// ENCODER WORKER - Fixed-cadence polling into a drainable counter
// ============================================================================

/// Polls a [`QuadratureDecoder`] on its own thread and accumulates the
/// movement until a consumer calls [`EncoderWorker::drain`].
///
/// Pin read failures skip the sample and polling continues.
pub struct EncoderWorker<A, B>
where
    A: BinaryPin + 'static,
    B: BinaryPin + 'static,
{
    accumulated: Arc<Mutex<i64>>,
    metrics: LoopMetrics,
    thread: LoopThread<EncoderLoop<A, B>>,
}

impl<A, B> EncoderWorker<A, B>
where
    A: BinaryPin + 'static,
    B: BinaryPin + 'static,
{
    pub fn new(decoder: QuadratureDecoder<A, B>, poll_interval: Duration) -> ControlResult<Self> {
        let accumulated = Arc::new(Mutex::new(0));
        let metrics = LoopMetrics::new()?;
        let encoder_loop = EncoderLoop {
            decoder,
            accumulated: accumulated.clone(),
            poll_interval,
            metrics: metrics.clone(),
            in_fault: false,
        };

        Ok(Self {
            accumulated,
            metrics,
            thread: LoopThread::new("encoder-poll", encoder_loop),
        })
    }

    /// Builds the decoder from two pins and polls at [`DEFAULT_POLL_INTERVAL`].
    pub fn from_pins(channel_a: A, channel_b: B) -> ControlResult<Self> {
        let decoder = QuadratureDecoder::new(channel_a, channel_b)?;
        Self::new(decoder, DEFAULT_POLL_INTERVAL)
    }

    pub fn start(&mut self) -> ControlResult<()> {
        self.thread.start(poll_iteration::<A, B>, keep_state::<A, B>)
    }

    pub fn stop(&self) {
        self.thread.stop();
    }

    pub fn join(&mut self) -> ControlResult<()> {
        self.thread.join()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    /// Take the movement accumulated since the previous drain and reset it to zero.
    pub fn drain(&self) -> i64 {
        std::mem::take(&mut *self.accumulated.lock())
    }

    pub fn metrics(&self) -> &LoopMetrics {
        &self.metrics
    }
}
