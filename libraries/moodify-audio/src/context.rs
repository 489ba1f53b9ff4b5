//! Audio context: a directed acyclic graph of processing nodes
//!
//! Nodes live in an arena keyed by [`NodeId`]. Edges are plain adjacency
//! lists; a node's input is the sum of everything connected into it. The
//! context is rendered one block at a time in topological order.
//!
//! The context is shared between the audio-element integration (which owns
//! the source and destination nodes and drives `render`) and the graph
//! service (which owns everything in between), hence [`SharedContext`].

use crate::error::{AudioError, Result};
use crate::node::{Analyser, AudioEffect, Compressor, Convolver, Gain, PeakingFilter};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Context shared between the output integration and the graph service
pub type SharedContext = Arc<Mutex<AudioContext>>;

/// Opaque node handle, only meaningful within the context that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether the context is currently producing audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Rendering normally
    Running,
    /// Rendering outputs silence and nodes do not advance
    Suspended,
}

enum NodeKind {
    Source,
    Destination,
    Filter(PeakingFilter),
    Compressor(Compressor),
    Convolver(Convolver),
    Gain(Gain),
    Analyser(Analyser),
}

impl NodeKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
            Self::Filter(_) => "peaking filter",
            Self::Compressor(_) => "compressor",
            Self::Convolver(_) => "convolver",
            Self::Gain(_) => "gain",
            Self::Analyser(_) => "analyser",
        }
    }

    fn effect_mut(&mut self) -> Option<&mut dyn AudioEffect> {
        match self {
            Self::Source | Self::Destination => None,
            Self::Filter(node) => Some(node),
            Self::Compressor(node) => Some(node),
            Self::Convolver(node) => Some(node),
            Self::Gain(node) => Some(node),
            Self::Analyser(node) => Some(node),
        }
    }
}

struct NodeEntry {
    kind: NodeKind,
    outputs: Vec<NodeId>,
}

/// Audio processing graph
pub struct AudioContext {
    sample_rate: u32,
    state: ContextState,
    nodes: BTreeMap<NodeId, NodeEntry>,
    next_id: u32,
    /// Reusable block buffers
    pool: Vec<Vec<f32>>,
}

macro_rules! typed_accessors {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty, $label:literal) => {
        #[doc = concat!("Borrow a ", $label, " node")]
        pub fn $get(&self, id: NodeId) -> Result<&$ty> {
            match &self.entry(id)?.kind {
                NodeKind::$variant(node) => Ok(node),
                other => Err(AudioError::WrongNodeKind {
                    id,
                    expected: $label,
                    actual: other.name(),
                }),
            }
        }

        #[doc = concat!("Mutably borrow a ", $label, " node")]
        pub fn $get_mut(&mut self, id: NodeId) -> Result<&mut $ty> {
            match &mut self.entry_mut(id)?.kind {
                NodeKind::$variant(node) => Ok(node),
                other => Err(AudioError::WrongNodeKind {
                    id,
                    expected: $label,
                    actual: other.name(),
                }),
            }
        }
    };
}

impl AudioContext {
    /// Create an empty running context
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            state: ContextState::Running,
            nodes: BTreeMap::new(),
            next_id: 0,
            pool: Vec::new(),
        }
    }

    /// Wrap into a [`SharedContext`]
    pub fn into_shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current state
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Stop producing audio
    pub fn suspend(&mut self) {
        if self.state != ContextState::Suspended {
            debug!("Audio context suspended");
            self.state = ContextState::Suspended;
        }
    }

    /// Resume producing audio
    pub fn resume(&mut self) {
        if self.state != ContextState::Running {
            debug!("Audio context resumed");
            self.state = ContextState::Running;
        }
    }

    fn insert(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        trace!(node = %id, kind = kind.name(), "Node created");
        self.nodes.insert(
            id,
            NodeEntry {
                kind,
                outputs: Vec::new(),
            },
        );
        id
    }

    /// Create a source node (emits the block passed to `render`)
    pub fn create_source(&mut self) -> NodeId {
        self.insert(NodeKind::Source)
    }

    /// Create a destination node (its input is what `render` writes out)
    pub fn create_destination(&mut self) -> NodeId {
        self.insert(NodeKind::Destination)
    }

    /// Create a peaking filter band at `frequency` Hz
    pub fn create_peaking_filter(&mut self, frequency: f32) -> NodeId {
        self.insert(NodeKind::Filter(PeakingFilter::new(frequency)))
    }

    /// Create a compressor with the default curve
    pub fn create_compressor(&mut self) -> NodeId {
        self.insert(NodeKind::Compressor(Compressor::new()))
    }

    /// Create a convolver with no impulse attached
    pub fn create_convolver(&mut self) -> NodeId {
        self.insert(NodeKind::Convolver(Convolver::new()))
    }

    /// Create a gain node
    pub fn create_gain(&mut self, gain: f32) -> NodeId {
        self.insert(NodeKind::Gain(Gain::new(gain)))
    }

    /// Create an analyser
    pub fn create_analyser(&mut self) -> NodeId {
        self.insert(NodeKind::Analyser(Analyser::new()))
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        self.nodes.remove(&id).ok_or(AudioError::UnknownNode(id))?;
        for entry in self.nodes.values_mut() {
            entry.outputs.retain(|&out| out != id);
        }
        trace!(node = %id, "Node removed");
        Ok(())
    }

    /// Whether `id` refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Kind label of a node
    pub fn kind(&self, id: NodeId) -> Option<&'static str> {
        self.nodes.get(&id).map(|entry| entry.kind.name())
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn entry(&self, id: NodeId) -> Result<&NodeEntry> {
        self.nodes.get(&id).ok_or(AudioError::UnknownNode(id))
    }

    fn entry_mut(&mut self, id: NodeId) -> Result<&mut NodeEntry> {
        self.nodes.get_mut(&id).ok_or(AudioError::UnknownNode(id))
    }

    /// Connect `from`'s output into `to`'s input
    ///
    /// Connecting an existing edge again is a no-op.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.entry(to)?;
        if from == to {
            return Err(AudioError::SelfConnection(from));
        }
        if self.entry(from)?.outputs.contains(&to) {
            return Ok(());
        }
        if self.reaches(to, from) {
            return Err(AudioError::WouldCycle { from, to });
        }
        self.entry_mut(from)?.outputs.push(to);
        trace!(from = %from, to = %to, "Connected");
        Ok(())
    }

    /// Remove all outgoing edges of `id`
    pub fn disconnect(&mut self, id: NodeId) -> Result<()> {
        self.entry_mut(id)?.outputs.clear();
        Ok(())
    }

    /// Remove the single edge `from -> to`
    pub fn disconnect_from(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.entry(to)?;
        let outputs = &mut self.entry_mut(from)?.outputs;
        let before = outputs.len();
        outputs.retain(|&out| out != to);
        if outputs.len() == before {
            return Err(AudioError::NotConnected { from, to });
        }
        Ok(())
    }

    /// Nodes `id` feeds into (empty for unknown ids)
    pub fn outputs(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .map(|entry| entry.outputs.clone())
            .unwrap_or_default()
    }

    /// Nodes feeding into `id`
    pub fn inputs(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, entry)| entry.outputs.contains(&id))
            .map(|(&node, _)| node)
            .collect()
    }

    /// Total number of edges
    pub fn connection_count(&self) -> usize {
        self.nodes.values().map(|entry| entry.outputs.len()).sum()
    }

    /// Every path from `from` to `to`, each listed node by node
    pub fn paths(&self, from: NodeId, to: NodeId) -> Vec<Vec<NodeId>> {
        let mut found = Vec::new();
        if self.contains(from) && self.contains(to) {
            let mut current = vec![from];
            self.collect_paths(from, to, &mut current, &mut found);
        }
        found
    }

    fn collect_paths(
        &self,
        node: NodeId,
        target: NodeId,
        current: &mut Vec<NodeId>,
        found: &mut Vec<Vec<NodeId>>,
    ) {
        if node == target {
            found.push(current.clone());
            return;
        }
        for next in self.outputs(node) {
            current.push(next);
            self.collect_paths(next, target, current, found);
            current.pop();
        }
    }

    /// Whether `target` is reachable from `start`
    fn reaches(&self, start: NodeId, target: NodeId) -> bool {
        let mut stack = vec![start];
        let mut seen = Vec::new();
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if seen.contains(&node) {
                continue;
            }
            seen.push(node);
            stack.extend(self.outputs(node));
        }
        false
    }

    /// Kahn's algorithm; the graph is acyclic by construction
    fn topological_order(&self) -> (Vec<NodeId>, HashMap<NodeId, Vec<NodeId>>) {
        let mut in_degree: HashMap<NodeId, usize> =
            self.nodes.keys().map(|&id| (id, 0)).collect();
        let mut predecessors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (&id, entry) in &self.nodes {
            for &out in &entry.outputs {
                *in_degree.entry(out).or_insert(0) += 1;
                predecessors.entry(out).or_default().push(id);
            }
        }

        let mut ready: VecDeque<NodeId> = self
            .nodes
            .keys()
            .filter(|id| in_degree.get(id) == Some(&0))
            .copied()
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            if let Some(entry) = self.nodes.get(&id) {
                for out in &entry.outputs {
                    if let Some(degree) = in_degree.get_mut(out) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push_back(*out);
                        }
                    }
                }
            }
        }
        (order, predecessors)
    }

    /// Render one block
    ///
    /// `input` is emitted by every source node; `output` receives the sum
    /// of everything arriving at destination nodes. Both are interleaved
    /// stereo and must have the same length.
    pub fn render(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        if input.len() != output.len() {
            return Err(AudioError::InvalidBuffer(format!(
                "input has {} samples but output has {}",
                input.len(),
                output.len()
            )));
        }
        if input.len() % 2 != 0 {
            return Err(AudioError::InvalidBuffer(
                "buffers must be interleaved stereo".into(),
            ));
        }

        output.fill(0.0);
        if self.state == ContextState::Suspended {
            return Ok(());
        }

        let (order, predecessors) = self.topological_order();
        let len = input.len();
        let sample_rate = self.sample_rate;
        let mut rendered: HashMap<NodeId, Vec<f32>> = HashMap::with_capacity(order.len());

        for id in order {
            let mut block = self.pool.pop().unwrap_or_default();
            block.clear();
            block.resize(len, 0.0);

            if let Some(preds) = predecessors.get(&id) {
                for pred in preds {
                    if let Some(upstream) = rendered.get(pred) {
                        for (acc, sample) in block.iter_mut().zip(upstream) {
                            *acc += sample;
                        }
                    }
                }
            }

            let Some(entry) = self.nodes.get_mut(&id) else {
                continue;
            };
            match &mut entry.kind {
                NodeKind::Source => block.copy_from_slice(input),
                NodeKind::Destination => {
                    for (out, sample) in output.iter_mut().zip(&block) {
                        *out += sample;
                    }
                }
                kind => {
                    if let Some(effect) = kind.effect_mut() {
                        effect.process(&mut block, sample_rate);
                    }
                }
            }
            rendered.insert(id, block);
        }

        self.pool.extend(rendered.into_values());
        Ok(())
    }

    /// Reset the internal state of every processing node
    pub fn reset_nodes(&mut self) {
        for entry in self.nodes.values_mut() {
            if let Some(effect) = entry.kind.effect_mut() {
                effect.reset();
            }
        }
    }

    typed_accessors!(filter, filter_mut, Filter, PeakingFilter, "peaking filter");
    typed_accessors!(compressor, compressor_mut, Compressor, Compressor, "compressor");
    typed_accessors!(convolver, convolver_mut, Convolver, Convolver, "convolver");
    typed_accessors!(gain, gain_mut, Gain, Gain, "gain");
    typed_accessors!(analyser, analyser_mut, Analyser, Analyser, "analyser");
}

impl fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioContext")
            .field("sample_rate", &self.sample_rate)
            .field("state", &self.state)
            .field("nodes", &self.nodes.len())
            .field("connections", &self.connection_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_rejects_unknown_self_and_cycles() {
        let mut ctx = AudioContext::new(44100);
        let a = ctx.create_gain(1.0);
        let b = ctx.create_gain(1.0);
        let c = ctx.create_gain(1.0);

        assert!(matches!(ctx.connect(a, a), Err(AudioError::SelfConnection(_))));

        ctx.connect(a, b).unwrap();
        ctx.connect(b, c).unwrap();
        assert!(matches!(
            ctx.connect(c, a),
            Err(AudioError::WouldCycle { .. })
        ));

        ctx.remove_node(c).unwrap();
        assert!(matches!(ctx.connect(b, c), Err(AudioError::UnknownNode(_))));
        assert_eq!(ctx.connection_count(), 1);
    }

    #[test]
    fn connect_is_idempotent() {
        let mut ctx = AudioContext::new(44100);
        let a = ctx.create_source();
        let b = ctx.create_destination();
        ctx.connect(a, b).unwrap();
        ctx.connect(a, b).unwrap();
        assert_eq!(ctx.connection_count(), 1);
        assert_eq!(ctx.inputs(b), vec![a]);
    }

    #[test]
    fn disconnect_variants() {
        let mut ctx = AudioContext::new(44100);
        let a = ctx.create_gain(1.0);
        let b = ctx.create_gain(1.0);
        let c = ctx.create_gain(1.0);
        ctx.connect(a, b).unwrap();
        ctx.connect(a, c).unwrap();

        ctx.disconnect_from(a, b).unwrap();
        assert_eq!(ctx.outputs(a), vec![c]);
        assert!(matches!(
            ctx.disconnect_from(a, b),
            Err(AudioError::NotConnected { .. })
        ));

        ctx.disconnect(a).unwrap();
        assert!(ctx.outputs(a).is_empty());
        // Disconnecting an already-idle node is fine
        ctx.disconnect(a).unwrap();
    }

    #[test]
    fn typed_accessor_checks_kind() {
        let mut ctx = AudioContext::new(44100);
        let gain = ctx.create_gain(0.5);
        assert_eq!(ctx.gain(gain).unwrap().gain(), 0.5);
        assert!(matches!(
            ctx.filter_mut(gain),
            Err(AudioError::WrongNodeKind { .. })
        ));
    }

    #[test]
    fn render_sums_parallel_branches() {
        let mut ctx = AudioContext::new(44100);
        let src = ctx.create_source();
        let dst = ctx.create_destination();
        let dry = ctx.create_gain(0.7);
        let wet = ctx.create_gain(0.3);
        ctx.connect(src, dry).unwrap();
        ctx.connect(src, wet).unwrap();
        ctx.connect(dry, dst).unwrap();
        ctx.connect(wet, dst).unwrap();

        let input = vec![1.0, -1.0, 0.5, -0.5];
        let mut output = vec![0.0; 4];
        ctx.render(&input, &mut output).unwrap();

        for (out, inp) in output.iter().zip(&input) {
            assert!((out - inp).abs() < 1e-6);
        }
        assert_eq!(ctx.paths(src, dst).len(), 2);
    }

    #[test]
    fn unconnected_destination_is_silent() {
        let mut ctx = AudioContext::new(44100);
        ctx.create_source();
        ctx.create_destination();
        let mut output = vec![1.0; 8];
        ctx.render(&[0.5; 8], &mut output).unwrap();
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn suspended_context_outputs_silence() {
        let mut ctx = AudioContext::new(44100);
        let src = ctx.create_source();
        let dst = ctx.create_destination();
        ctx.connect(src, dst).unwrap();
        ctx.suspend();
        assert_eq!(ctx.state(), ContextState::Suspended);

        let mut output = vec![1.0; 4];
        ctx.render(&[0.5; 4], &mut output).unwrap();
        assert!(output.iter().all(|&s| s == 0.0));

        ctx.resume();
        ctx.render(&[0.5; 4], &mut output).unwrap();
        assert!(output.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn render_rejects_mismatched_buffers() {
        let mut ctx = AudioContext::new(44100);
        let mut output = vec![0.0; 4];
        assert!(ctx.render(&[0.0; 6], &mut output).is_err());
        let mut odd = vec![0.0; 3];
        assert!(ctx.render(&[0.0; 3], &mut odd).is_err());
    }
}
