//! Real-time driver for a stage

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use ostinato_core::{Bundle, Stage};
use thiserror::Error;
use tracing::{info, trace, warn};

use crate::config::ConductorConfig;
use crate::sample_library::{SampleLibrary, SampleLibraryError};
use crate::sink::ChannelSink;

#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("Sample library error: {0}")]
    Samples(#[from] SampleLibraryError),
    #[error("Conductor already running")]
    AlreadyRunning,
    #[error("Conductor not running")]
    NotRunning,
    #[error("Stage lock poisoned")]
    Poisoned,
    #[error("Scheduler thread panicked")]
    Panicked,
    #[error("Could not spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Advances a shared stage in step with the wall clock on a background
/// thread. Bundles come out of `messages()`.
pub struct Conductor {
    stage: Arc<Mutex<Stage>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    messages: Receiver<Bundle>,
    tick: Duration,
}

impl Conductor {
    /// Build a stage from `config`, scanning its sample directory if one is set
    pub fn new(config: ConductorConfig) -> Result<Self, ConductorError> {
        let mut stage = Stage::new(config.stage.clone());
        if let Some(root) = &config.samples {
            stage.set_samples(Box::new(SampleLibrary::scan(root)?));
        }
        Ok(Self::from_stage(stage, &config))
    }

    /// Wrap an existing stage. Its sink is replaced by the conductor's channel.
    pub fn from_stage(mut stage: Stage, config: &ConductorConfig) -> Self {
        let (sink, messages) = ChannelSink::bounded(config.channel_capacity.max(1));
        stage.set_sink(Box::new(sink));
        Self {
            stage: Arc::new(Mutex::new(stage)),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            messages,
            tick: Duration::from_millis(config.tick_ms.max(1)),
        }
    }

    /// Shared stage for callers that hold it across threads
    pub fn stage(&self) -> Arc<Mutex<Stage>> {
        self.stage.clone()
    }

    /// Run `f` with the stage locked
    pub fn with_stage<F, R>(&self, f: F) -> Result<R, ConductorError>
    where
        F: FnOnce(&mut Stage) -> R,
    {
        let mut stage = self.stage.lock().map_err(|_| ConductorError::Poisoned)?;
        Ok(f(&mut stage))
    }

    pub fn messages(&self) -> Receiver<Bundle> {
        self.messages.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start advancing from the stage's current beat
    pub fn start(&mut self) -> Result<(), ConductorError> {
        if self.thread.is_some() {
            return Err(ConductorError::AlreadyRunning);
        }

        let offset = self.with_stage(|stage| stage.clock().seconds_at(stage.now()))?;
        let stage = self.stage.clone();
        let running = self.running.clone();
        let tick = self.tick;
        running.store(true, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name("ostinato-conductor".into())
            .spawn(move || Self::run(&stage, &running, offset, tick));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        };

        self.thread = Some(handle);
        info!(offset, "Conductor started");
        Ok(())
    }

    /// Stop the scheduling thread. Queued events stay queued.
    pub fn stop(&mut self) -> Result<(), ConductorError> {
        let handle = self.thread.take().ok_or(ConductorError::NotRunning)?;
        self.running.store(false, Ordering::SeqCst);
        if let Err(panic) = handle.join() {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            warn!(%reason, "Scheduler thread panicked");
            return Err(ConductorError::Panicked);
        }
        info!("Conductor stopped");
        Ok(())
    }

    fn run(stage: &Mutex<Stage>, running: &AtomicBool, offset: f64, tick: Duration) {
        let origin = Instant::now();
        while running.load(Ordering::SeqCst) {
            let seconds = offset + origin.elapsed().as_secs_f64();
            let Ok(mut stage) = stage.lock() else {
                running.store(false, Ordering::SeqCst);
                break;
            };
            let beat = stage.clock().beat_at(seconds);
            trace!(beat, "conductor tick");
            stage.advance_to(beat);
            drop(stage);
            thread::sleep(tick);
        }
    }
}

impl Drop for Conductor {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostinato_core::{Assignment, Event, PlayerId, StageConfig};

    fn fast_config() -> ConductorConfig {
        ConductorConfig {
            stage: StageConfig {
                bpm: 600.0,
                ..Default::default()
            },
            tick_ms: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let mut conductor = Conductor::new(fast_config()).unwrap();
        assert!(matches!(conductor.stop(), Err(ConductorError::NotRunning)));
        conductor.start().unwrap();
        assert!(conductor.is_running());
        assert!(matches!(conductor.start(), Err(ConductorError::AlreadyRunning)));
        conductor.stop().unwrap();
        assert!(!conductor.is_running());
    }

    #[test]
    fn test_player_bundles_arrive() {
        let mut conductor = Conductor::new(fast_config()).unwrap();
        conductor
            .with_stage(|stage| {
                let id = stage.add_player();
                stage.assign(id, Assignment::pitched("pluck").dur([0.25]))
            })
            .unwrap()
            .unwrap();

        let rx = conductor.messages();
        conductor.start().unwrap();
        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        conductor.stop().unwrap();

        assert_eq!(first.messages[0].synth, "pluck");
        assert!(second.beat > first.beat);
        assert!(second.time > first.time);
    }

    #[test]
    fn test_stop_reports_panicked_thread() {
        let mut conductor = Conductor::new(fast_config()).unwrap();
        conductor
            .with_stage(|stage| -> ostinato_core::Result<()> {
                let id = stage.add_player();
                stage.assign(id, Assignment::pitched("pluck"))?;
                stage.player_mut(id)?.on_bang(Arc::new(|_: PlayerId, _: &Event| panic!("hook failed")));
                Ok(())
            })
            .unwrap()
            .unwrap();

        conductor.start().unwrap();
        let stage = conductor.stage();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !stage.is_poisoned() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        assert!(matches!(conductor.stop(), Err(ConductorError::Panicked)));
        assert!(!conductor.is_running());
        assert!(matches!(conductor.with_stage(|_| ()), Err(ConductorError::Poisoned)));
    }

    #[test]
    fn test_missing_sample_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConductorConfig {
            samples: Some(dir.path().join("absent")),
            ..Default::default()
        };
        assert!(matches!(Conductor::new(config), Err(ConductorError::Samples(_))));
    }
}
