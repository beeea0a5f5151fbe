use super::pid::PidController;
use crate::error::{ControlResult, HardwareError};
use crate::hardware::ScalarSensor;
use crate::metrics::LoopMetrics;
use crate::timing::{Clock, MonotonicClock};
use crate::worker::LoopThread;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Receives the PID output once per iteration.
pub trait ControlSink: Send {
    fn apply(&mut self, output: f64) -> Result<(), HardwareError>;

    /// Called when an iteration fails, before the failure policy is applied.
    fn on_fault(&mut self, _err: &HardwareError) {}
}

impl<F> ControlSink for F
where
    F: FnMut(f64) -> Result<(), HardwareError> + Send,
{
    fn apply(&mut self, output: f64) -> Result<(), HardwareError> {
        self(output)
    }
}

/// What the loop does when the input or output capability fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// End the loop; the fault is returned by `join`.
    #[default]
    Stop,
    /// Count the fault, wait `backoff`, then carry on with the next sample.
    Skip { backoff: Duration },
}

struct ControlLoop<I, O, C: Clock> {
    pid: PidController<C>,
    input: I,
    output: O,
    set_point: Arc<Mutex<f64>>,
    policy: FailurePolicy,
    metrics: LoopMetrics,
}

impl<I, O, C> ControlLoop<I, O, C>
where
    I: ScalarSensor,
    O: ControlSink,
    C: Clock,
{
    fn fault(&mut self, err: HardwareError) -> Result<(), HardwareError> {
        self.metrics.record_fault();
        self.output.on_fault(&err);
        match self.policy {
            FailurePolicy::Stop => Err(err),
            FailurePolicy::Skip { backoff } => {
                tracing::warn!("control iteration skipped: {}", err);
                thread::sleep(backoff);
                Ok(())
            }
        }
    }
}

fn run_iteration<I, O, C>(lp: &mut ControlLoop<I, O, C>) -> Result<(), HardwareError>
where
    I: ScalarSensor,
    O: ControlSink,
    C: Clock,
{
    let cycle_start = Instant::now();

    let measured = match lp.input.read() {
        Ok(v) if v.is_finite() => v,
        Ok(v) => {
            // Would poison the PID accumulators for good.
            return lp.fault(HardwareError::Read {
                what: format!("non-finite measurement {v}"),
            });
        }
        Err(e) => return lp.fault(e),
    };
    let set_point = *lp.set_point.lock();
    let error = set_point - measured;
    let output = lp.pid.compute(error);
    tracing::trace!(set_point, measured, error, output, "pid sample");

    if let Err(e) = lp.output.apply(output) {
        return lp.fault(e);
    }

    lp.metrics.record_cycle(cycle_start.elapsed());
    Ok(())
}

fn reset_pid<I, O, C: Clock>(lp: &mut ControlLoop<I, O, C>) {
    lp.pid.reset();
}

// ============================================================================
// CONTROL LOOP WORKER - sample -> compute -> act on a dedicated thread
// ============================================================================

/// Repeatedly reads `input`, feeds `set_point - input` to a PID controller and
/// hands the result to `output`. No delay is inserted between iterations;
/// pacing belongs to the output.
pub struct ControlLoopWorker<I, O, C = MonotonicClock>
where
    I: ScalarSensor + 'static,
    O: ControlSink + 'static,
    C: Clock,
{
    set_point: Arc<Mutex<f64>>,
    metrics: LoopMetrics,
    thread: LoopThread<ControlLoop<I, O, C>>,
}

impl<I, O, C> ControlLoopWorker<I, O, C>
where
    I: ScalarSensor + 'static,
    O: ControlSink + 'static,
    C: Clock,
{
    pub fn new(
        name: impl Into<String>,
        pid: PidController<C>,
        input: I,
        output: O,
        policy: FailurePolicy,
    ) -> ControlResult<Self> {
        let set_point = Arc::new(Mutex::new(0.0));
        let metrics = LoopMetrics::new()?;
        let control_loop = ControlLoop {
            pid,
            input,
            output,
            set_point: set_point.clone(),
            policy,
            metrics: metrics.clone(),
        };

        Ok(Self {
            set_point,
            metrics,
            thread: LoopThread::new(name, control_loop),
        })
    }

    /// Takes effect on the next iteration.
    pub fn set_set_point(&self, value: f64) {
        *self.set_point.lock() = value;
    }

    pub fn set_point(&self) -> f64 {
        *self.set_point.lock()
    }

    /// Begin sampling. Idempotent while running.
    ///
    /// Every (re)start resets the PID history, so the first sample never
    /// integrates over the time the worker sat idle. A fault that ended the
    /// previous run and was not collected with [`join`](Self::join) is
    /// logged and dropped.
    pub fn start(&mut self) -> ControlResult<()> {
        self.thread
            .start(run_iteration::<I, O, C>, reset_pid::<I, O, C>)
    }

    pub fn stop(&self) {
        tracing::debug!(worker = self.thread.name(), "stop requested");
        self.thread.stop();
    }

    /// Wait for the loop to exit. Returns the fault that stopped it, if any,
    /// unless a later `start` already consumed it.
    pub fn join(&mut self) -> ControlResult<()> {
        self.thread.join()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    pub fn metrics(&self) -> &LoopMetrics {
        &self.metrics
    }
}
