//! Audio graph service
//!
//! Owns every processing node between the externally supplied input and
//! output nodes and rewires them whenever settings change. The chain is
//! always rebuilt from scratch: every owned node is disconnected first and
//! the enabled stages are then reconnected in a fixed order
//!
//! ```text
//! input -> [EQ 60..12k] -> [compressor] -+-> dry ----------+-> junction -> output
//!                                        +-> convolver-> wet+      |
//!                                                                  +-> analyser (tap)
//! ```
//!
//! Nothing here returns errors to the caller. Calls before `init`, failed
//! disconnects and failed impulse loads are logged and absorbed, leaving
//! the graph in a consistent (possibly degraded) state.

use crate::context::{AudioContext, NodeId, SharedContext};
use crate::error::AudioError;
use crate::impulse::{ImpulseLoader, IrCache};
use crate::node::{Analyser, CompressorSettings, ImpulseResponse};
use crate::settings::{
    AudioSettings, FrequencyBand, NormalizationMode, RoomSize, SettingsChange, SettingsStore,
    SubscriptionId,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Compressor curve for a normalization mode (`None` means bypass)
pub fn normalization_curve(mode: NormalizationMode) -> Option<CompressorSettings> {
    match mode {
        NormalizationMode::Off => None,
        NormalizationMode::Loud => Some(CompressorSettings::from_curve(-18.0, 8.0, 0.005, 0.15)),
        NormalizationMode::Normal => Some(CompressorSettings::from_curve(-24.0, 12.0, 0.003, 0.25)),
        NormalizationMode::Quiet => Some(CompressorSettings::from_curve(-30.0, 16.0, 0.001, 0.35)),
    }
}

/// Node ids of a built graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphSlots {
    /// External input (borrowed)
    pub input: NodeId,
    /// External output (borrowed)
    pub output: NodeId,
    /// One peaking filter per band, in [`FrequencyBand::ALL`] order
    pub filters: [NodeId; 6],
    pub compressor: NodeId,
    pub convolver: NodeId,
    pub dry_gain: NodeId,
    pub wet_gain: NodeId,
    pub analyser: NodeId,
    /// Single rejoin point before the output
    pub junction: NodeId,
}

impl GraphSlots {
    fn allocate(ctx: &mut AudioContext, input: NodeId, output: NodeId) -> Self {
        Self {
            input,
            output,
            filters: FrequencyBand::ALL.map(|band| ctx.create_peaking_filter(band.hz())),
            compressor: ctx.create_compressor(),
            convolver: ctx.create_convolver(),
            dry_gain: ctx.create_gain(1.0),
            wet_gain: ctx.create_gain(0.0),
            analyser: ctx.create_analyser(),
            junction: ctx.create_gain(1.0),
        }
    }

    /// Every node the service owns (input and output excluded)
    pub fn owned(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.filters.iter().copied().chain([
            self.compressor,
            self.convolver,
            self.dry_gain,
            self.wet_gain,
            self.analyser,
            self.junction,
        ])
    }

    fn first_missing(&self, ctx: &AudioContext) -> Option<NodeId> {
        [self.input, self.output]
            .into_iter()
            .chain(self.owned())
            .find(|&id| !ctx.contains(id))
    }
}

struct Inner {
    context: SharedContext,
    settings: SettingsStore,
    loader: ImpulseLoader,
    ir_cache: IrCache,
    slots: Mutex<Option<GraphSlots>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let subscription = self
            .subscription
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = subscription {
            self.settings.unsubscribe(id);
        }
    }
}

/// Handle to the audio graph
///
/// Clones share the same graph. The service subscribes to the settings
/// store once at construction and rebuilds on every relevant change.
#[derive(Clone)]
pub struct AudioGraphService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AudioGraphService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGraphService")
            .field("slots", &self.slots())
            .finish_non_exhaustive()
    }
}

impl AudioGraphService {
    /// Create the service and subscribe it to `settings`
    pub fn new(context: SharedContext, settings: SettingsStore, loader: ImpulseLoader) -> Self {
        let inner = Arc::new(Inner {
            context,
            settings: settings.clone(),
            loader,
            ir_cache: IrCache::new(),
            slots: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let id = settings.subscribe(Arc::new(move |change, current| {
            if let Some(inner) = weak.upgrade() {
                AudioGraphService { inner }.on_settings_change(change, current);
            }
        }));
        *inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(id);

        Self { inner }
    }

    /// Shared context the graph lives in
    pub fn context(&self) -> &SharedContext {
        &self.inner.context
    }

    /// Settings the graph follows
    pub fn settings(&self) -> &SettingsStore {
        &self.inner.settings
    }

    fn lock_slots(&self) -> MutexGuard<'_, Option<GraphSlots>> {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_context(&self) -> MutexGuard<'_, AudioContext> {
        self.inner
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the chain between `input` and `output`
    ///
    /// Calling again with the same endpoints on an intact graph only
    /// reapplies settings. Otherwise any previous graph is torn down and
    /// fresh nodes are allocated. The impulse for the configured room is
    /// then loaded in the background.
    pub fn init(&self, input: NodeId, output: NodeId) {
        {
            let mut slots = self.lock_slots();
            let mut ctx = self.lock_context();

            if let Some(existing) = *slots {
                if existing.input == input
                    && existing.output == output
                    && existing.first_missing(&ctx).is_none()
                {
                    drop(ctx);
                    drop(slots);
                    debug!("Audio graph already initialized, reapplying settings");
                    self.apply_settings_to_graph();
                    return;
                }
                teardown(&mut ctx, &existing);
            }

            let fresh = GraphSlots::allocate(&mut ctx, input, output);
            *slots = Some(fresh);
            info!(input = %input, output = %output, "Audio graph initialized");
        }

        self.apply_settings_to_graph();
        let room = self.inner.settings.read(|s| s.reverb_room_size);
        self.schedule_ir_load(room);
    }

    /// Release every owned node; the service goes back to uninitialized
    pub fn teardown(&self) {
        let mut slots = self.lock_slots();
        if let Some(existing) = slots.take() {
            let mut ctx = self.lock_context();
            teardown(&mut ctx, &existing);
            info!("Audio graph torn down");
        }
    }

    /// Rewire the whole chain from the current settings
    pub fn apply_settings_to_graph(&self) {
        let slots = self.lock_slots();
        let Some(slots) = *slots else {
            warn!("Audio graph not initialized, settings will apply on init");
            return;
        };
        let settings = self.inner.settings.snapshot();
        let mut ctx = self.lock_context();

        if let Some(missing) = slots.first_missing(&ctx) {
            warn!(node = %missing, "Audio graph node missing, rebuild skipped");
            return;
        }

        rebuild(&mut ctx, &slots, &settings);
    }

    /// Connect or disconnect only the junction -> analyser tap
    pub fn set_analyzer_tap(&self, enabled: bool) {
        let slots = self.lock_slots();
        let Some(slots) = *slots else {
            warn!("Audio graph not initialized, analyzer tap unchanged");
            return;
        };
        let mut ctx = self.lock_context();

        let result = if enabled {
            ctx.connect(slots.junction, slots.analyser)
        } else {
            match ctx.disconnect_from(slots.junction, slots.analyser) {
                Err(AudioError::NotConnected { .. }) => Ok(()),
                other => other,
            }
        };
        match result {
            Ok(()) => debug!(enabled, "Analyzer tap updated"),
            Err(e) => warn!(error = %e, "Failed to update analyzer tap"),
        }
    }

    /// Load the impulse for `size`, attach it and rebuild
    ///
    /// A memoized impulse is attached immediately. Otherwise the loader is
    /// run (concurrent calls for one room share a single load). The result
    /// is only attached if `size` is still the configured room, so a slow
    /// load can't override a newer choice. On failure the convolver is
    /// cleared, which leaves reverb inert, and the graph is still rebuilt.
    pub async fn load_ir_file(&self, size: RoomSize) {
        let result = match self.inner.ir_cache.get(size) {
            Some(ir) => {
                trace!(room = %size, "Impulse response memo hit");
                Ok(ir)
            }
            None => {
                let loader = self.inner.loader.clone();
                self.inner
                    .ir_cache
                    .get_or_load(size, || async move { loader.load(size).await })
                    .await
            }
        };

        let current = self.inner.settings.read(|s| s.reverb_room_size);
        if current != size {
            debug!(requested = %size, current = %current, "Discarding stale impulse load");
            return;
        }

        match result {
            Ok(ir) => self.attach_impulse(Some(ir)),
            Err(e) => {
                warn!(room = %size, error = %e, "Impulse response unavailable, reverb disabled");
                self.attach_impulse(None);
            }
        }
    }

    fn attach_impulse(&self, ir: Option<Arc<ImpulseResponse>>) {
        {
            let slots = self.lock_slots();
            let Some(slots) = *slots else {
                debug!("Audio graph not initialized, impulse kept in memo only");
                return;
            };
            let mut ctx = self.lock_context();
            match ctx.convolver_mut(slots.convolver) {
                Ok(convolver) => convolver.set_buffer(ir),
                Err(e) => warn!(error = %e, "Failed to attach impulse response"),
            }
        }
        self.apply_settings_to_graph();
    }

    fn schedule_ir_load(&self, size: RoomSize) {
        let Ok(handle) = Handle::try_current() else {
            warn!(room = %size, "No async runtime, impulse response not loaded");
            return;
        };
        let service = self.clone();
        let task = handle.spawn(async move { service.load_ir_file(size).await });

        let mut tasks = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Wait for every scheduled impulse load to finish
    pub async fn settle(&self) {
        loop {
            let pending = std::mem::take(
                &mut *self
                    .inner
                    .tasks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if pending.is_empty() {
                return;
            }
            for task in pending {
                if let Err(e) = task.await {
                    warn!(error = %e, "Impulse load task failed");
                }
            }
        }
    }

    fn on_settings_change(&self, change: SettingsChange, current: &AudioSettings) {
        match change {
            SettingsChange::Equalizer | SettingsChange::Normalization => {
                self.apply_settings_to_graph();
            }
            SettingsChange::Reverb => {
                self.apply_settings_to_graph();
                let room = current.reverb_room_size;
                if current.reverb_enabled && self.impulse_missing(room) {
                    debug!(room = %room, "Reverb engaged without an impulse, retrying load");
                    self.schedule_ir_load(room);
                }
            }
            SettingsChange::Reset => {
                self.apply_settings_to_graph();
                self.schedule_ir_load(current.reverb_room_size);
            }
            SettingsChange::WaveAnalyzer => self.set_analyzer_tap(current.wave_analyzer_enabled),
            SettingsChange::ReverbRoom(size) => self.schedule_ir_load(size),
            SettingsChange::PlaybackRate => {
                trace!("Playback rate is display-only, graph unchanged");
            }
        }
    }

    /// No impulse memoized for `room` and none attached to the convolver
    ///
    /// An attached impulse without a memo entry means a room change is
    /// still loading, so that case does not count.
    fn impulse_missing(&self, room: RoomSize) -> bool {
        if self.inner.ir_cache.contains(room) {
            return false;
        }
        let slots = self.lock_slots();
        let Some(slots) = *slots else {
            return true;
        };
        let ctx = self.lock_context();
        ctx.convolver(slots.convolver)
            .map_or(true, |convolver| !convolver.has_buffer())
    }

    /// Whether `init` has built the graph
    pub fn is_initialized(&self) -> bool {
        self.lock_slots().is_some()
    }

    /// Node ids of the built graph
    pub fn slots(&self) -> Option<GraphSlots> {
        *self.lock_slots()
    }

    /// Whether the impulse for `size` is memoized
    pub fn ir_cache_contains(&self, size: RoomSize) -> bool {
        self.inner.ir_cache.contains(size)
    }

    /// Analyser node, if the graph is built and the node still exists
    pub fn analyser_node(&self) -> Option<NodeId> {
        let slots = (*self.lock_slots())?;
        self.lock_context()
            .contains(slots.analyser)
            .then_some(slots.analyser)
    }

    /// Run `f` against the analyser
    pub fn with_analyser<R>(&self, f: impl FnOnce(&mut Analyser) -> R) -> Option<R> {
        let slots = (*self.lock_slots())?;
        let mut ctx = self.lock_context();
        ctx.analyser_mut(slots.analyser).ok().map(f)
    }
}

fn teardown(ctx: &mut AudioContext, slots: &GraphSlots) {
    detach_input(ctx, slots);
    for id in slots.owned() {
        if let Err(e) = ctx.disconnect(id) {
            warn!(node = %id, error = %e, "Disconnect failed during teardown");
        }
        if let Err(e) = ctx.remove_node(id) {
            warn!(node = %id, error = %e, "Remove failed during teardown");
        }
    }
}

/// Drop edges from the external input into owned nodes, leaving any
/// foreign edges alone
fn detach_input(ctx: &mut AudioContext, slots: &GraphSlots) {
    let owned: Vec<NodeId> = slots.owned().collect();
    for target in ctx.outputs(slots.input) {
        if owned.contains(&target) {
            if let Err(e) = ctx.disconnect_from(slots.input, target) {
                warn!(node = %target, error = %e, "Failed to detach input");
            }
        }
    }
}

fn link(ctx: &mut AudioContext, from: NodeId, to: NodeId) {
    if let Err(e) = ctx.connect(from, to) {
        warn!(from = %from, to = %to, error = %e, "Connect failed");
    }
}

fn rebuild(ctx: &mut AudioContext, slots: &GraphSlots, settings: &AudioSettings) {
    // 1. Everything owned goes silent first
    detach_input(ctx, slots);
    for id in slots.owned() {
        if let Err(e) = ctx.disconnect(id) {
            warn!(node = %id, error = %e, "Disconnect failed");
        }
    }

    // 2.
    let mut tail = slots.input;

    // 3. Equalizer, low to high
    if settings.equalizer_enabled {
        for (band, &filter) in FrequencyBand::ALL.iter().zip(&slots.filters) {
            match ctx.filter_mut(filter) {
                Ok(node) => node.set_gain_db(settings.gain(*band)),
                Err(e) => warn!(band = %band, error = %e, "Failed to set band gain"),
            }
            link(ctx, tail, filter);
            tail = filter;
        }
    }

    // 4. Normalization
    if let Some(curve) = normalization_curve(settings.normalization_mode) {
        match ctx.compressor_mut(slots.compressor) {
            Ok(node) => node.set_settings(curve),
            Err(e) => warn!(error = %e, "Failed to program compressor"),
        }
        link(ctx, tail, slots.compressor);
        tail = slots.compressor;
    }

    // 5. Reverb: parallel dry/wet pair, or straight into the junction
    let has_impulse = ctx
        .convolver(slots.convolver)
        .map(|c| c.has_buffer())
        .unwrap_or(false);
    let wet_active = settings.reverb_enabled && has_impulse;
    let (dry, wet) = if wet_active {
        (1.0 - settings.reverb_mix, settings.reverb_mix)
    } else {
        (1.0, 0.0)
    };
    for (id, value) in [(slots.dry_gain, dry), (slots.wet_gain, wet)] {
        match ctx.gain_mut(id) {
            Ok(node) => node.set_gain(value),
            Err(e) => warn!(node = %id, error = %e, "Failed to set gain"),
        }
    }
    if wet_active {
        link(ctx, tail, slots.dry_gain);
        link(ctx, tail, slots.convolver);
        link(ctx, slots.convolver, slots.wet_gain);
        link(ctx, slots.dry_gain, slots.junction);
        link(ctx, slots.wet_gain, slots.junction);
    } else {
        link(ctx, tail, slots.junction);
    }

    // 6. Analyzer tap
    if settings.wave_analyzer_enabled {
        link(ctx, slots.junction, slots.analyser);
    }

    // 7.
    link(ctx, slots.junction, slots.output);

    debug!(
        eq = settings.equalizer_enabled,
        normalization = %settings.normalization_mode,
        reverb = wet_active,
        analyzer = settings.wave_analyzer_enabled,
        connections = ctx.connection_count(),
        "Audio graph rebuilt"
    );
}
