//! Typed flow events with pre-allocated ring buffers.
//!
//! Stations and the motion pass emit events while a tick runs; the engine
//! delivers them in one batch once the tick has finished, grouped by
//! [`EventKind`] and oldest first within a kind. Each kind gets its own
//! [`EventBuffer`], allocated lazily on first emit.
//!
//! Kinds can be suppressed with [`EventBus::suppress`]. A suppressed kind is
//! never buffered and costs nothing.

use crate::fixed::{Fixed64, SimTime};
use crate::id::{NodeId, ProductId};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. Every event carries the simulated time it happened at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A source created a product and put it on its output edge.
    ProductSpawned {
        product: ProductId,
        node: NodeId,
        time: SimTime,
    },
    /// A product finished traversing an edge and reached `node`.
    ProductArrived {
        product: ProductId,
        node: NodeId,
        time: SimTime,
    },
    ProcessingStarted {
        product: ProductId,
        node: NodeId,
        time: SimTime,
    },
    ProcessingFinished {
        product: ProductId,
        node: NodeId,
        time: SimTime,
    },
    /// A product left the system as finished work.
    ProductCompleted {
        product: ProductId,
        node: NodeId,
        cycle_time: Fixed64,
        time: SimTime,
    },
    /// A full buffer discarded an arrival.
    ProductDropped {
        product: ProductId,
        node: NodeId,
        time: SimTime,
    },
    /// A palletizer released a batch of `count` products.
    PalletReleased {
        node: NodeId,
        count: u32,
        time: SimTime,
    },
}

/// Discriminant tag for event types, used for suppression and subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ProductSpawned,
    ProductArrived,
    ProcessingStarted,
    ProcessingFinished,
    ProductCompleted,
    ProductDropped,
    PalletReleased,
}

const EVENT_KIND_COUNT: usize = 7;

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ProductSpawned { .. } => EventKind::ProductSpawned,
            Event::ProductArrived { .. } => EventKind::ProductArrived,
            Event::ProcessingStarted { .. } => EventKind::ProcessingStarted,
            Event::ProcessingFinished { .. } => EventKind::ProcessingFinished,
            Event::ProductCompleted { .. } => EventKind::ProductCompleted,
            Event::ProductDropped { .. } => EventKind::ProductDropped,
            Event::PalletReleased { .. } => EventKind::PalletReleased,
        }
    }

    /// The node the event happened at.
    pub fn node(&self) -> NodeId {
        match self {
            Event::ProductSpawned { node, .. }
            | Event::ProductArrived { node, .. }
            | Event::ProcessingStarted { node, .. }
            | Event::ProcessingFinished { node, .. }
            | Event::ProductCompleted { node, .. }
            | Event::ProductDropped { node, .. }
            | Event::PalletReleased { node, .. } => *node,
        }
    }

    pub fn time(&self) -> SimTime {
        match self {
            Event::ProductSpawned { time, .. }
            | Event::ProductArrived { time, .. }
            | Event::ProcessingStarted { time, .. }
            | Event::ProcessingFinished { time, .. }
            | Event::ProductCompleted { time, .. }
            | Event::ProductDropped { time, .. }
            | Event::PalletReleased { time, .. } => *time,
        }
    }
}

impl EventKind {
    pub const ALL: [EventKind; EVENT_KIND_COUNT] = [
        EventKind::ProductSpawned,
        EventKind::ProductArrived,
        EventKind::ProcessingStarted,
        EventKind::ProcessingFinished,
        EventKind::ProductCompleted,
        EventKind::ProductDropped,
        EventKind::PalletReleased,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventBuffer
// ---------------------------------------------------------------------------

/// Fixed-capacity ring buffer. When full, the oldest event is overwritten.
#[derive(Debug)]
pub struct EventBuffer {
    events: Vec<Option<Event>>,
    /// Next write position.
    head: usize,
    len: usize,
    /// Events ever written, including overwritten ones.
    total_written: u64,
    /// Events pushed out by a newer event before they could be delivered.
    overwritten: u64,
}

impl EventBuffer {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
            overwritten: 0,
        }
    }

    pub fn push(&mut self, event: Event) {
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        } else {
            self.overwritten += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Events lost to overwrite since creation. Events removed by
    /// [`clear`](Self::clear) do not count.
    pub fn overwritten_count(&self) -> u64 {
        self.overwritten
    }

    /// Oldest to newest.
    pub fn iter(&self) -> EventBufferIter<'_> {
        let start = if self.len < self.capacity() { 0 } else { self.head };
        EventBufferIter {
            buffer: self,
            index: start,
            remaining: self.len,
        }
    }

    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

pub struct EventBufferIter<'a> {
    buffer: &'a EventBuffer,
    index: usize,
    remaining: usize,
}

impl<'a> Iterator for EventBufferIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let event = self.buffer.events[self.index].as_ref();
        self.index = (self.index + 1) % self.buffer.capacity();
        self.remaining -= 1;
        event
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for EventBufferIter<'_> {}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// A read-only event listener.
pub type PassiveListener = Box<dyn FnMut(&Event)>;

/// Optional predicate narrowing which events reach a listener.
pub type EventFilter = Box<dyn Fn(&Event) -> bool>;

struct ListenerEntry {
    listener: PassiveListener,
    filter: Option<EventFilter>,
}

impl std::fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("filtered", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// One ring buffer per event kind, listener lists, and suppression flags.
pub struct EventBus {
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    listeners: [Vec<ListenerEntry>; EVENT_KIND_COUNT],
    default_capacity: usize,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("suppressed", &self.suppressed)
            .field("default_capacity", &self.default_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            listeners: Default::default(),
            default_capacity,
        }
    }

    /// Stop recording an event kind and release its buffer.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Buffer an event for delivery. No-op for suppressed kinds.
    pub fn emit(&mut self, event: Event) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        let capacity = self.default_capacity;
        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(event);
    }

    /// Register a listener for one event kind. Listeners run in
    /// registration order.
    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) {
        self.on_passive_filtered(kind, None, listener);
    }

    pub fn on_passive_filtered(
        &mut self,
        kind: EventKind,
        filter: Option<EventFilter>,
        listener: PassiveListener,
    ) {
        self.listeners[kind.index()].push(ListenerEntry { listener, filter });
    }

    /// Hand every buffered event to its listeners, then clear the buffers.
    ///
    /// Kinds are visited in declaration order; within a kind each listener
    /// sees all events oldest first before the next listener runs.
    pub fn deliver(&mut self) {
        for idx in 0..EVENT_KIND_COUNT {
            let Some(buffer) = self.buffers[idx].as_mut() else {
                continue;
            };
            if buffer.is_empty() {
                continue;
            }
            let events: Vec<Event> = buffer.iter().cloned().collect();
            buffer.clear();

            for entry in &mut self.listeners[idx] {
                for event in &events {
                    if let Some(filter) = &entry.filter
                        && !filter(event)
                    {
                        continue;
                    }
                    (entry.listener)(event);
                }
            }
        }
    }

    pub fn buffer(&self, kind: EventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.len())
            .unwrap_or(0)
    }

    /// Events ever emitted for a kind since the buffer was allocated.
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.total_written())
            .unwrap_or(0)
    }

    /// Discard buffered events without delivering them. Listeners and
    /// suppression flags are kept.
    pub fn clear_all(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
