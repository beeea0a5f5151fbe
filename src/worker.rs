//! Dedicated-thread driver shared by the control and encoder workers.
//!
//! A [`LoopThread`] owns the loop state `P` while idle, moves it onto a named
//! thread on `start`, and gets it back on `join`. The stop flag is checked
//! once per iteration, so an in-flight iteration always runs to completion.

use crate::error::{ControlError, ControlResult, HardwareError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// One pass of a sampling loop. `Err` ends the loop and is reported by `join`.
pub type Iteration<P> = fn(&mut P) -> Result<(), HardwareError>;

type LoopExit<P> = (P, Result<(), HardwareError>);

pub struct LoopThread<P: Send + 'static> {
    name: String,
    parts: Option<P>,
    handle: Option<thread::JoinHandle<LoopExit<P>>>,
    shutdown: Arc<AtomicBool>,
}

impl<P: Send + 'static> LoopThread<P> {
    pub fn new(name: impl Into<String>, parts: P) -> Self {
        Self {
            name: name.into(),
            parts: Some(parts),
            handle: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while the thread is alive and has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
            && !self.shutdown.load(Ordering::Acquire)
    }

    /// Loop state, available only while no thread holds it.
    pub fn parts_mut(&mut self) -> Option<&mut P> {
        self.parts.as_mut()
    }

    /// Spawns the loop. A no-op while already running; a stopped or exited
    /// thread is joined first and its state reused.
    ///
    /// A fault from the previous run that was never collected with `join` is
    /// logged and discarded here; only a panic is returned.
    ///
    /// `prepare` runs on the reclaimed state right before it moves to the new thread.
    pub fn start(&mut self, iteration: Iteration<P>, prepare: fn(&mut P)) -> ControlResult<()> {
        if self.is_running() {
            tracing::debug!(worker = %self.name, "start ignored, already running");
            return Ok(());
        }

        match self.reclaim() {
            Ok(()) => {}
            Err(e @ ControlError::WorkerPanicked { .. }) => return Err(e),
            Err(e) => tracing::warn!(worker = %self.name, "previous run ended with: {}", e),
        }

        let mut parts = self.parts.take().ok_or(ControlError::StateError {
            what: "worker state unavailable",
        })?;
        prepare(&mut parts);

        self.shutdown.store(false, Ordering::Release);
        let shutdown = self.shutdown.clone();
        let name = self.name.clone();

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                tracing::info!(worker = %name, "loop started");
                let mut outcome = Ok(());
                while !shutdown.load(Ordering::Acquire) {
                    if let Err(e) = iteration(&mut parts) {
                        tracing::error!(worker = %name, "loop stopping on fault: {}", e);
                        outcome = Err(e);
                        break;
                    }
                }
                tracing::info!(worker = %name, "loop exited");
                (parts, outcome)
            })
            .map_err(ControlError::Spawn)?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Requests a cooperative stop. Does not wait.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Waits for the thread to finish and takes its state back.
    ///
    /// Blocks indefinitely if the loop was never asked to stop and does not
    /// fault. Returns the fault that ended the loop, if any.
    pub fn join(&mut self) -> ControlResult<()> {
        self.reclaim()
    }

    fn reclaim(&mut self) -> ControlResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok((parts, outcome)) => {
                self.parts = Some(parts);
                outcome.map_err(ControlError::from)
            }
            Err(_) => Err(ControlError::WorkerPanicked {
                name: self.name.clone(),
            }),
        }
    }
}

impl<P: Send + 'static> Drop for LoopThread<P> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
            if let Err(e) = self.reclaim() {
                tracing::warn!(worker = %self.name, "worker ended with: {}", e);
            }
        }
    }
}
