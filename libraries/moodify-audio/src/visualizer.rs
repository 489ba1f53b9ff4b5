//! Spectrum visualizer loop
//!
//! Samples the graph's analyser once per frame and hands the result to a
//! [`FrameSink`]. Gating (setting enabled, analyser present, source present)
//! is re-read every frame; the loop ends by itself as soon as any of them
//! is false. A suspended source still produces frames, but flat ones.

use crate::context::{ContextState, NodeId, SharedContext};
use crate::graph::AudioGraphService;
use crate::settings::SettingsStore;
use std::sync::PoisonError;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Roughly one display refresh
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Reports on the audio source feeding the graph
pub trait AudioSourceProbe: Send + Sync {
    /// Whether a source is attached
    fn is_present(&self) -> bool;

    /// Whether the source is currently suspended
    fn is_suspended(&self) -> bool;
}

/// Probe over a context and its source node
#[derive(Debug, Clone)]
pub struct ContextProbe {
    context: SharedContext,
    source: NodeId,
}

impl ContextProbe {
    /// Probe `source` inside `context`
    pub fn new(context: SharedContext, source: NodeId) -> Self {
        Self { context, source }
    }
}

impl AudioSourceProbe for ContextProbe {
    fn is_present(&self) -> bool {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(self.source)
    }

    fn is_suspended(&self) -> bool {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
            == ContextState::Suspended
    }
}

/// One rendered frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpectrumFrame {
    /// Byte magnitudes, one per analyser bin
    Bars(Vec<u8>),
    /// Flat line: source present but suspended
    Baseline,
}

/// Consumer of frames (the drawing surface)
pub trait FrameSink: Send {
    /// Draw one frame
    fn render(&mut self, frame: SpectrumFrame);
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualizerExit {
    /// The handle was cancelled or dropped
    Cancelled,
    /// The wave analyzer setting was turned off
    Disabled,
    /// The analyser node is gone
    AnalyserMissing,
    /// The audio source is gone
    SourceMissing,
}

/// Running visualizer loop
///
/// Cancelling is idempotent, and dropping the handle cancels the loop.
#[derive(Debug)]
pub struct VisualizerHandle {
    token: CancellationToken,
    task: Option<JoinHandle<VisualizerExit>>,
}

impl VisualizerHandle {
    /// Stop the loop (no-op if already stopped)
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether `cancel` has been called
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the loop to exit
    pub async fn join(mut self) -> Option<VisualizerExit> {
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl Drop for VisualizerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Spectrum visualizer
pub struct SpectrumVisualizer;

impl SpectrumVisualizer {
    /// Start the per-frame loop on the current tokio runtime
    ///
    /// # Panics
    /// When called outside a tokio runtime.
    pub fn start<P, S>(
        graph: AudioGraphService,
        settings: SettingsStore,
        probe: P,
        mut sink: S,
        frame_interval: Duration,
    ) -> VisualizerHandle
    where
        P: AudioSourceProbe + 'static,
        S: FrameSink + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let exit = loop {
                tokio::select! {
                    () = cancelled.cancelled() => break VisualizerExit::Cancelled,
                    _ = ticker.tick() => {}
                }

                if !settings.read(|s| s.wave_analyzer_enabled) {
                    break VisualizerExit::Disabled;
                }
                if graph.analyser_node().is_none() {
                    break VisualizerExit::AnalyserMissing;
                }
                if !probe.is_present() {
                    break VisualizerExit::SourceMissing;
                }

                let frame = if probe.is_suspended() {
                    SpectrumFrame::Baseline
                } else {
                    let bars = graph.with_analyser(|analyser| {
                        let mut bins = vec![0u8; analyser.frequency_bin_count()];
                        analyser.byte_frequency_data(&mut bins);
                        bins
                    });
                    match bars {
                        Some(bars) => SpectrumFrame::Bars(bars),
                        None => break VisualizerExit::AnalyserMissing,
                    }
                };
                sink.render(frame);
            };

            debug!(?exit, "Visualizer loop stopped");
            exit
        });

        VisualizerHandle {
            token,
            task: Some(task),
        }
    }
}
