//! Engine: arena ownership of every playable, construction, configuration
//! setters and timeline composition.
//!
//! Methods:
//! - create_tween / create_callback / create_interval / create_timeline, destroy
//! - insert / insert_at / remove / set_start_time / set_order (timeline editing)
//! - subscribe / unsubscribe (observers)
//! - rewind / skip / playback live in `state_machine` and `playback`.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::debug;

use crate::config::{CallbackCfg, Config, TimelineCfg, TweenCfg};
use crate::ease::Ease;
use crate::error::TimelineError;
use crate::events::{EventKind, Observers, PlayableEvent};
use crate::ids::{IdAllocator, ObserverId, PlayableId};
use crate::leaf::{CallbackNode, Sample, TweenNode, ValueApplier};
use crate::playable::{Direction, LoopType, PlaybackState, PlayableCore};
use crate::timeline::{ChildShape, ElementInfo, IndexSnapshot, LoopResetBehaviour, TimelineNode};
use crate::Result;

/// Variant of a playable, as reported by [`Engine::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayableKind {
    Tween,
    Timeline,
    Callback,
    /// Pure time placeholder; applies nothing.
    Interval,
}

pub(crate) enum NodeKind {
    Tween(TweenNode),
    Timeline(TimelineNode),
    Callback(CallbackNode),
    Interval,
}

impl NodeKind {
    fn kind(&self) -> PlayableKind {
        match self {
            Self::Tween(_) => PlayableKind::Tween,
            Self::Timeline(_) => PlayableKind::Timeline,
            Self::Callback(_) => PlayableKind::Callback,
            Self::Interval => PlayableKind::Interval,
        }
    }
}

pub(crate) struct Node {
    pub core: PlayableCore,
    pub kind: NodeKind,
    /// Owning timeline, if any.
    pub parent: Option<PlayableId>,
    pub observers: Observers,
}

/// Owner of every playable and the single entry point for driving them.
pub struct Engine {
    pub(crate) cfg: Config,
    ids: IdAllocator,
    pub(crate) nodes: SlotMap<PlayableId, Node>,
    observer_owner: HashMap<ObserverId, PlayableId>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cfg", &self.cfg)
            .field("playables", &self.nodes.len())
            .field("observers", &self.observer_owner.len())
            .finish()
    }
}

fn validate_span(span: f64) -> Result<()> {
    if !(span.is_finite() && span >= 0.0) {
        return Err(TimelineError::invalid(format!(
            "span must be finite and >= 0, got {span}"
        )));
    }
    Ok(())
}

fn validate_loops(loops_count: u32) -> Result<()> {
    if loops_count < 1 {
        return Err(TimelineError::invalid("loops_count must be >= 1"));
    }
    Ok(())
}

fn validate_start(start_time: f64) -> Result<()> {
    if !(start_time.is_finite() && start_time >= 0.0) {
        return Err(TimelineError::invalid(format!(
            "start_time must be finite and >= 0, got {start_time}"
        )));
    }
    Ok(())
}

impl Engine {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            ids: IdAllocator::new(),
            nodes: SlotMap::with_key(),
            observer_owner: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    // ---------- arena access ----------

    pub(crate) fn node(&self, id: PlayableId) -> Result<&Node> {
        self.nodes.get(id).ok_or_else(|| not_found(id))
    }

    pub(crate) fn node_mut(&mut self, id: PlayableId) -> Result<&mut Node> {
        self.nodes.get_mut(id).ok_or_else(|| not_found(id))
    }

    pub(crate) fn core(&self, id: PlayableId) -> Result<&PlayableCore> {
        Ok(&self.node(id)?.core)
    }

    pub(crate) fn core_mut(&mut self, id: PlayableId) -> Result<&mut PlayableCore> {
        Ok(&mut self.node_mut(id)?.core)
    }

    pub(crate) fn timeline(&self, id: PlayableId) -> Result<&TimelineNode> {
        match &self.node(id)?.kind {
            NodeKind::Timeline(tl) => Ok(tl),
            other => Err(TimelineError::invalid(format!(
                "{id:?} is a {:?}, not a timeline",
                other.kind()
            ))),
        }
    }

    pub(crate) fn timeline_mut(&mut self, id: PlayableId) -> Result<&mut TimelineNode> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Timeline(tl) => Ok(tl),
            other => Err(TimelineError::invalid(format!(
                "{id:?} is a {:?}, not a timeline",
                other.kind()
            ))),
        }
    }

    /// Driving APIs only accept playables no timeline owns.
    pub(crate) fn ensure_top_level(&self, id: PlayableId) -> Result<()> {
        match self.node(id)?.parent {
            None => Ok(()),
            Some(parent) => Err(TimelineError::invalid(format!(
                "{id:?} is owned by timeline {parent:?}; drive the owner instead"
            ))),
        }
    }

    fn spawn(&mut self, core: PlayableCore, kind: NodeKind) -> PlayableId {
        let kind_name = kind.kind();
        let id = self.nodes.insert(Node {
            core,
            kind,
            parent: None,
            observers: Observers::default(),
        });
        debug!(?id, kind = ?kind_name, "engine: created playable");
        id
    }

    // ---------- construction ----------

    /// Create a tween whose value is driven by `applier`.
    pub fn create_tween(
        &mut self,
        cfg: TweenCfg,
        applier: impl ValueApplier + 'static,
    ) -> Result<PlayableId> {
        validate_span(cfg.span)?;
        validate_loops(cfg.loops_count)?;
        let core = PlayableCore::new(cfg.span, cfg.loops_count, cfg.loop_type, cfg.direction);
        Ok(self.spawn(
            core,
            NodeKind::Tween(TweenNode {
                applier: Box::new(applier),
            }),
        ))
    }

    /// Create an interval: a placeholder that only occupies time.
    pub fn create_interval(&mut self, cfg: TweenCfg) -> Result<PlayableId> {
        validate_span(cfg.span)?;
        validate_loops(cfg.loops_count)?;
        let core = PlayableCore::new(cfg.span, cfg.loops_count, cfg.loop_type, cfg.direction);
        Ok(self.spawn(core, NodeKind::Interval))
    }

    /// Create a zero-duration callback, invoked once per qualifying crossing.
    pub fn create_callback(
        &mut self,
        cfg: CallbackCfg,
        callback: impl FnMut(&Sample) + 'static,
    ) -> Result<PlayableId> {
        validate_loops(cfg.loops_count)?;
        let core = PlayableCore::new(0.0, cfg.loops_count, LoopType::Reset, Direction::Forward);
        Ok(self.spawn(
            core,
            NodeKind::Callback(CallbackNode {
                callback: Box::new(callback),
                fire_backward: cfg.fire_backward,
            }),
        ))
    }

    /// Create an empty timeline. Its span follows its children.
    pub fn create_timeline(&mut self, cfg: TimelineCfg) -> Result<PlayableId> {
        let loops_count = cfg.loops_count.unwrap_or(1);
        validate_loops(loops_count)?;
        let loop_reset = cfg.loop_reset.unwrap_or(self.cfg.default_loop_reset);
        let core = PlayableCore::new(0.0, loops_count, cfg.loop_type, cfg.direction);
        Ok(self.spawn(core, NodeKind::Timeline(TimelineNode::new(loop_reset))))
    }

    /// Destroy a top-level playable and, for timelines, everything it contains.
    pub fn destroy(&mut self, id: PlayableId) -> Result<()> {
        self.ensure_top_level(id)?;
        let doomed = self.subtree(id);
        for pid in &doomed {
            self.nodes.remove(*pid);
        }
        self.observer_owner.retain(|_, owner| !doomed.contains(owner));
        debug!(?id, removed = doomed.len(), "engine: destroyed playable");
        Ok(())
    }

    /// `id` followed by every playable transitively contained in it.
    fn subtree(&self, id: PlayableId) -> Vec<PlayableId> {
        let mut out = vec![id];
        let mut cursor = 0;
        while cursor < out.len() {
            if let Some(Node {
                kind: NodeKind::Timeline(tl),
                ..
            }) = self.nodes.get(out[cursor])
            {
                out.extend(tl.elements.iter().map(|e| e.child));
            }
            cursor += 1;
        }
        out
    }

    pub fn contains(&self, id: PlayableId) -> bool {
        self.nodes.contains_key(id)
    }

    // ---------- accessors ----------

    pub fn kind(&self, id: PlayableId) -> Result<PlayableKind> {
        Ok(self.node(id)?.kind.kind())
    }

    pub fn parent(&self, id: PlayableId) -> Result<Option<PlayableId>> {
        Ok(self.node(id)?.parent)
    }

    pub fn played_time(&self, id: PlayableId) -> Result<f64> {
        Ok(self.core(id)?.played_time)
    }

    pub fn span(&self, id: PlayableId) -> Result<f64> {
        Ok(self.core(id)?.span)
    }

    pub fn loop_duration(&self, id: PlayableId) -> Result<f64> {
        Ok(self.core(id)?.loop_duration())
    }

    pub fn duration(&self, id: PlayableId) -> Result<f64> {
        Ok(self.core(id)?.duration())
    }

    pub fn loops_count(&self, id: PlayableId) -> Result<u32> {
        Ok(self.core(id)?.loops_count)
    }

    pub fn loop_type(&self, id: PlayableId) -> Result<LoopType> {
        Ok(self.core(id)?.loop_type)
    }

    pub fn direction(&self, id: PlayableId) -> Result<Direction> {
        Ok(self.core(id)?.direction)
    }

    pub fn ease(&self, id: PlayableId) -> Result<Ease> {
        Ok(self.core(id)?.ease)
    }

    pub fn state(&self, id: PlayableId) -> Result<PlaybackState> {
        Ok(self.core(id)?.state)
    }

    /// Whether the playable is between its Start and Complete.
    pub fn is_started(&self, id: PlayableId) -> Result<bool> {
        let core = self.core(id)?;
        Ok(core.started || core.zero_running)
    }

    // ---------- setters ----------

    /// Change the span of a tween or interval.
    pub fn set_span(&mut self, id: PlayableId, span: f64) -> Result<()> {
        validate_span(span)?;
        match self.kind(id)? {
            PlayableKind::Tween | PlayableKind::Interval => {}
            other => {
                return Err(TimelineError::invalid(format!(
                    "span of a {other:?} cannot be set directly"
                )))
            }
        }
        self.core_mut(id)?.span = span;
        self.reshape(id)
    }

    pub fn set_loops_count(&mut self, id: PlayableId, loops_count: u32) -> Result<()> {
        validate_loops(loops_count)?;
        self.core_mut(id)?.loops_count = loops_count;
        self.reshape(id)
    }

    pub fn set_loop_type(&mut self, id: PlayableId, loop_type: LoopType) -> Result<()> {
        self.core_mut(id)?.loop_type = loop_type;
        self.reshape(id)
    }

    pub fn set_ease(&mut self, id: PlayableId, ease: Ease) -> Result<()> {
        self.core_mut(id)?.ease = ease;
        Ok(())
    }

    /// Play direction used by [`Engine::play`] and [`Engine::tick`].
    pub fn set_direction(&mut self, id: PlayableId, direction: Direction) -> Result<()> {
        self.core_mut(id)?.direction = direction;
        Ok(())
    }

    pub fn set_loop_reset(&mut self, id: PlayableId, behaviour: LoopResetBehaviour) -> Result<()> {
        self.timeline_mut(id)?.loop_reset = behaviour;
        Ok(())
    }

    pub(crate) fn shape_of(&self, id: PlayableId) -> Result<ChildShape> {
        let node = self.node(id)?;
        Ok(ChildShape {
            loop_duration: node.core.loop_duration(),
            span: node.core.span,
            loops_count: node.core.loops_count,
            loop_type: node.core.loop_type,
            placeholder: matches!(node.kind, NodeKind::Interval),
        })
    }

    /// Re-seat `id` after its duration changed and re-index it in its owner.
    fn reshape(&mut self, id: PlayableId) -> Result<()> {
        let eps = self.cfg.time_epsilon;
        let core = self.core_mut(id)?;
        let played = core.played_time;
        core.park(played, eps);
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        let shape = self.shape_of(id)?;
        let gap = self.cfg.rank_gap;
        let tl = self.timeline_mut(parent)?;
        let order = tl.position_of(id).ok_or_else(|| not_member(parent, id))?;
        if let Some(old) = tl.remove_element(id) {
            tl.insert_element(id, shape, old.start_time, order, gap);
        }
        self.refresh_span(parent)
    }

    /// Recompute a timeline's span from its children, propagating upward on change.
    fn refresh_span(&mut self, timeline: PlayableId) -> Result<()> {
        let span = self.timeline(timeline)?.content_span();
        let core = self.core_mut(timeline)?;
        if core.span == span {
            return Ok(());
        }
        debug!(?timeline, from = core.span, to = span, "engine: timeline span changed");
        core.span = span;
        self.reshape(timeline)
    }

    // ---------- composition ----------

    /// Append `child` after every existing element.
    pub fn insert(&mut self, timeline: PlayableId, child: PlayableId, start_time: f64) -> Result<()> {
        let order = self.timeline(timeline)?.elements.len();
        self.insert_at(timeline, child, start_time, order)
    }

    /// Insert `child` at dense position `order` (clamped to the element count).
    pub fn insert_at(
        &mut self,
        timeline: PlayableId,
        child: PlayableId,
        start_time: f64,
        order: usize,
    ) -> Result<()> {
        validate_start(start_time)?;
        self.timeline(timeline)?;
        if self.node(child)?.parent.is_some() {
            return Err(TimelineError::invalid(format!(
                "{child:?} already belongs to a timeline"
            )));
        }
        if self.subtree(child).contains(&timeline) {
            return Err(TimelineError::invalid(format!(
                "inserting {child:?} into {timeline:?} would create a cycle"
            )));
        }
        let shape = self.shape_of(child)?;
        let gap = self.cfg.rank_gap;
        self.timeline_mut(timeline)?
            .insert_element(child, shape, start_time, order, gap);
        self.node_mut(child)?.parent = Some(timeline);
        self.refresh_span(timeline)?;
        self.reseat(timeline)
    }

    /// Detach `child`; it becomes a top-level playable again.
    pub fn remove(&mut self, timeline: PlayableId, child: PlayableId) -> Result<()> {
        self.ensure_member(timeline, child)?;
        self.timeline_mut(timeline)?.remove_element(child);
        self.node_mut(child)?.parent = None;
        self.refresh_span(timeline)?;
        self.reseat(timeline)
    }

    pub fn set_start_time(
        &mut self,
        timeline: PlayableId,
        child: PlayableId,
        start_time: f64,
    ) -> Result<()> {
        validate_start(start_time)?;
        let order = self.ensure_member(timeline, child)?;
        let shape = self.shape_of(child)?;
        let gap = self.cfg.rank_gap;
        let tl = self.timeline_mut(timeline)?;
        tl.remove_element(child);
        tl.insert_element(child, shape, start_time, order, gap);
        self.refresh_span(timeline)?;
        self.reseat(timeline)
    }

    /// Move `child` to dense position `order` (clamped to the last position).
    pub fn set_order(&mut self, timeline: PlayableId, child: PlayableId, order: usize) -> Result<()> {
        self.ensure_member(timeline, child)?;
        let gap = self.cfg.rank_gap;
        let tl = self.timeline_mut(timeline)?;
        if let Some(old) = tl.remove_element(child) {
            tl.insert_element(child, old.shape, old.start_time, order, gap);
        }
        Ok(())
    }

    /// Dense order of `child` in `timeline`, or InvalidArgument when it is not a member.
    fn ensure_member(&self, timeline: PlayableId, child: PlayableId) -> Result<usize> {
        self.node(child)?;
        self.timeline(timeline)?
            .position_of(child)
            .ok_or_else(|| not_member(timeline, child))
    }

    pub fn elements(&self, timeline: PlayableId) -> Result<Vec<ElementInfo>> {
        let tl = self.timeline(timeline)?;
        Ok((0..tl.elements.len()).map(|i| tl.info(i)).collect())
    }

    pub fn element(&self, timeline: PlayableId, child: PlayableId) -> Result<ElementInfo> {
        let order = self.ensure_member(timeline, child)?;
        Ok(self.timeline(timeline)?.info(order))
    }

    pub fn chronoline_snapshot(&self, timeline: PlayableId) -> Result<IndexSnapshot> {
        Ok(self.timeline(timeline)?.snapshot())
    }

    pub fn chronoline_count(&self, timeline: PlayableId) -> Result<usize> {
        Ok(self.timeline(timeline)?.chronoline_count())
    }

    // ---------- observers ----------

    /// Register `handler` for `kind` events of `id`; handlers run in registration order.
    pub fn subscribe(
        &mut self,
        id: PlayableId,
        kind: EventKind,
        handler: impl FnMut(&PlayableEvent) + 'static,
    ) -> Result<ObserverId> {
        self.node(id)?;
        let oid = self.ids.alloc_observer();
        self.node_mut(id)?.observers.push(oid, kind, Box::new(handler));
        self.observer_owner.insert(oid, id);
        Ok(oid)
    }

    /// Remove an observer; returns false when it was unknown or already removed.
    pub fn unsubscribe(&mut self, observer: ObserverId) -> bool {
        let Some(owner) = self.observer_owner.remove(&observer) else {
            return false;
        };
        self.nodes
            .get_mut(owner)
            .map(|n| n.observers.remove(observer))
            .unwrap_or(false)
    }
}

pub(crate) fn not_found(id: PlayableId) -> TimelineError {
    TimelineError::PlayableNotFound {
        playable: format!("{id:?}"),
    }
}

fn not_member(timeline: PlayableId, child: PlayableId) -> TimelineError {
    TimelineError::invalid(format!("{child:?} is not an element of {timeline:?}"))
}
