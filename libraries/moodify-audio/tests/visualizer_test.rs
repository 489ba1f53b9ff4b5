//! Integration tests for the spectrum visualizer loop
//!
//! Tests cover:
//! - Gating on the wave analyzer setting, the analyser node and the source
//! - Baseline frames while the source is suspended
//! - Cancellation through the handle and by dropping it

use async_trait::async_trait;
use moodify_audio::{
    AssetFetcher, AudioContext, AudioError, AudioGraphService, AudioSourceProbe, ContextProbe,
    FrameSink, ImpulseAssets, ImpulseLoader, MemoryAssetCache, NodeId, Result, SettingsStore,
    SpectrumFrame, SpectrumVisualizer, VisualizerExit,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FRAME: Duration = Duration::from_millis(16);

// ============================================================================
// TEST UTILITIES
// ============================================================================

struct OfflineFetcher;

#[async_trait]
impl AssetFetcher for OfflineFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        Err(AudioError::Fetch(format!("{url}: offline")))
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    frames: Arc<Mutex<Vec<SpectrumFrame>>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    fn frames(&self) -> Vec<SpectrumFrame> {
        self.frames.lock().unwrap().clone()
    }
}

impl FrameSink for RecordingSink {
    fn render(&mut self, frame: SpectrumFrame) {
        self.frames.lock().unwrap().push(frame);
    }
}

struct AbsentSource;

impl AudioSourceProbe for AbsentSource {
    fn is_present(&self) -> bool {
        false
    }

    fn is_suspended(&self) -> bool {
        false
    }
}

struct Fixture {
    graph: AudioGraphService,
    settings: SettingsStore,
    source: NodeId,
}

impl Fixture {
    fn new(initialize: bool) -> Self {
        let ctx = AudioContext::new(44100).into_shared();
        let (source, destination) = {
            let mut guard = ctx.lock().unwrap();
            (guard.create_source(), guard.create_destination())
        };
        let loader = ImpulseLoader::new(
            ImpulseAssets::default(),
            Arc::new(OfflineFetcher),
            Arc::new(MemoryAssetCache::new()),
        );
        let settings = SettingsStore::new();
        let graph = AudioGraphService::new(ctx, settings.clone(), loader);
        if initialize {
            graph.init(source, destination);
        }
        Self {
            graph,
            settings,
            source,
        }
    }

    fn probe(&self) -> ContextProbe {
        ContextProbe::new(self.graph.context().clone(), self.source)
    }

    fn start(&self, sink: RecordingSink) -> moodify_audio::VisualizerHandle {
        SpectrumVisualizer::start(
            self.graph.clone(),
            self.settings.clone(),
            self.probe(),
            sink,
            FRAME,
        )
    }
}

// ============================================================================
// GATING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_disabled_analyzer_stops_immediately() {
    let fixture = Fixture::new(true);
    fixture.settings.set_wave_analyzer_enabled(false);
    let sink = RecordingSink::default();

    let handle = fixture.start(sink.clone());
    assert_eq!(handle.join().await, Some(VisualizerExit::Disabled));
    assert_eq!(sink.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_uninitialized_graph_has_no_analyser() {
    let fixture = Fixture::new(false);
    let handle = fixture.start(RecordingSink::default());
    assert_eq!(handle.join().await, Some(VisualizerExit::AnalyserMissing));
}

#[tokio::test(start_paused = true)]
async fn test_missing_source_stops_loop() {
    let fixture = Fixture::new(true);
    let handle = SpectrumVisualizer::start(
        fixture.graph.clone(),
        fixture.settings.clone(),
        AbsentSource,
        RecordingSink::default(),
        FRAME,
    );
    assert_eq!(handle.join().await, Some(VisualizerExit::SourceMissing));
}

#[tokio::test(start_paused = true)]
async fn test_removed_source_node_stops_loop() {
    let fixture = Fixture::new(true);
    fixture
        .graph
        .context()
        .lock()
        .unwrap()
        .remove_node(fixture.source)
        .unwrap();

    let handle = fixture.start(RecordingSink::default());
    assert_eq!(handle.join().await, Some(VisualizerExit::SourceMissing));
}

#[tokio::test(start_paused = true)]
async fn test_disabling_mid_run_stops_loop() {
    let fixture = Fixture::new(true);
    let sink = RecordingSink::default();
    let handle = fixture.start(sink.clone());

    tokio::time::sleep(FRAME * 4).await;
    assert!(sink.count() > 0);

    fixture.settings.set_wave_analyzer_enabled(false);
    assert_eq!(handle.join().await, Some(VisualizerExit::Disabled));
}

#[tokio::test(start_paused = true)]
async fn test_teardown_mid_run_stops_loop() {
    let fixture = Fixture::new(true);
    let handle = fixture.start(RecordingSink::default());

    tokio::time::sleep(FRAME * 2).await;
    fixture.graph.teardown();
    assert_eq!(handle.join().await, Some(VisualizerExit::AnalyserMissing));
}

// ============================================================================
// FRAMES
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_running_source_renders_bars() {
    let fixture = Fixture::new(true);
    let sink = RecordingSink::default();
    let handle = fixture.start(sink.clone());

    tokio::time::sleep(FRAME * 5).await;
    handle.cancel();
    assert_eq!(handle.join().await, Some(VisualizerExit::Cancelled));

    let frames = sink.frames();
    assert!(frames.len() >= 5);
    for frame in frames {
        match frame {
            SpectrumFrame::Bars(bars) => assert_eq!(bars.len(), 1024),
            SpectrumFrame::Baseline => panic!("unexpected baseline frame"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_suspended_source_renders_baseline() {
    let fixture = Fixture::new(true);
    fixture.graph.context().lock().unwrap().suspend();
    let sink = RecordingSink::default();
    let handle = fixture.start(sink.clone());

    tokio::time::sleep(FRAME * 3).await;
    fixture.graph.context().lock().unwrap().resume();
    tokio::time::sleep(FRAME * 3).await;
    handle.cancel();
    handle.join().await;

    let frames = sink.frames();
    assert_eq!(frames.first(), Some(&SpectrumFrame::Baseline));
    assert!(matches!(frames.last(), Some(SpectrumFrame::Bars(_))));
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_is_idempotent() {
    let fixture = Fixture::new(true);
    let handle = fixture.start(RecordingSink::default());

    handle.cancel();
    handle.cancel();
    assert!(handle.is_cancelled());
    assert_eq!(handle.join().await, Some(VisualizerExit::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_frames() {
    let fixture = Fixture::new(true);
    let sink = RecordingSink::default();
    let handle = fixture.start(sink.clone());

    tokio::time::sleep(FRAME * 3).await;
    drop(handle);
    tokio::time::sleep(FRAME).await;
    let settled = sink.count();

    tokio::time::sleep(FRAME * 10).await;
    assert_eq!(sink.count(), settled);
}

#[tokio::test(start_paused = true)]
async fn test_finished_after_exit() {
    let fixture = Fixture::new(false);
    let handle = fixture.start(RecordingSink::default());

    tokio::time::sleep(FRAME).await;
    assert!(handle.is_finished());
}
