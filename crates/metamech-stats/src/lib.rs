//! Rolling flow statistics for the MetaMech engine.
//!
//! The core engine reports lifetime totals. This crate listens to its events
//! (`ProductSpawned`, `ProductArrived`, `ProcessingStarted`,
//! `ProcessingFinished`, `ProductCompleted`, `ProductDropped`,
//! `PalletReleased`) and keeps recent per-node and line-wide rates over a
//! window of ticks, plus short histories for sparklines. All arithmetic is
//! [`Fixed64`].
//!
//! Windows are weighted by simulated time: each tick commits its counts
//! together with the seconds it covered, so rates stay correct when the host
//! changes `dt` or the speed multiplier.
//!
//! # Usage
//!
//! ```ignore
//! let mut stats = FlowStats::new(StatsConfig::default());
//! // Feed the tick's events:
//! stats.process_event(&event);
//! // Close the tick with the simulated seconds it covered:
//! stats.end_tick(result.elapsed);
//! // Query:
//! let per_minute = stats.completion_rate();
//! ```

use std::collections::HashMap;

use metamech_core::event::Event;
use metamech_core::fixed::{checked_div_64, clamp_unit, Fixed64};
use metamech_core::id::{NodeId, ProductId};

const SECONDS_PER_MINUTE: i64 = 60;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the statistics module.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Number of ticks in each rolling window.
    pub window_ticks: usize,
    /// Maximum number of history samples retained per series.
    pub history_capacity: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_ticks: 120,
            history_capacity: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity ring buffer of [`Fixed64`] samples.
///
/// When full, the oldest sample is overwritten. Iterates oldest-to-newest.
/// A requested capacity of zero is raised to one.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<Fixed64>,
    head: usize,
    len: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![Fixed64::ZERO; capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, value: Fixed64) {
        self.data[self.head] = value;
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The most recent sample, if any.
    pub fn latest(&self) -> Option<Fixed64> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.head + self.capacity() - 1) % self.capacity();
        Some(self.data[idx])
    }

    /// Arithmetic mean of the stored samples, zero when empty.
    pub fn mean(&self) -> Fixed64 {
        if self.len == 0 {
            return Fixed64::ZERO;
        }
        let sum = self.iter().fold(Fixed64::ZERO, |acc, v| acc.saturating_add(v));
        sum / Fixed64::saturating_from_num(self.len)
    }

    /// Iterate samples from oldest to newest.
    pub fn iter(&self) -> RingBufferIter<'_> {
        let start = if self.len < self.capacity() { 0 } else { self.head };
        RingBufferIter {
            buffer: self,
            index: start,
            remaining: self.len,
        }
    }

    pub fn to_vec(&self) -> Vec<Fixed64> {
        self.iter().collect()
    }

    pub fn clear(&mut self) {
        self.data.fill(Fixed64::ZERO);
        self.head = 0;
        self.len = 0;
    }
}

/// Iterator over [`RingBuffer`] samples, oldest to newest.
pub struct RingBufferIter<'a> {
    buffer: &'a RingBuffer,
    index: usize,
    remaining: usize,
}

impl Iterator for RingBufferIter<'_> {
    type Item = Fixed64;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let value = self.buffer.data[self.index];
        self.index = (self.index + 1) % self.buffer.capacity();
        self.remaining -= 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for RingBufferIter<'_> {}

// ---------------------------------------------------------------------------
// Rolling window
// ---------------------------------------------------------------------------

/// Sum of a quantity over the most recent N committed ticks.
///
/// Call [`add`](Self::add) during the tick, then [`commit`](Self::commit)
/// exactly once at end of tick. Queries see committed ticks only.
#[derive(Debug, Clone)]
struct RollingWindow {
    slots: Vec<Fixed64>,
    write_pos: usize,
    committed: usize,
    total: Fixed64,
    current: Fixed64,
}

impl RollingWindow {
    fn new(window_ticks: usize) -> Self {
        Self {
            slots: vec![Fixed64::ZERO; window_ticks.max(1)],
            write_pos: 0,
            committed: 0,
            total: Fixed64::ZERO,
            current: Fixed64::ZERO,
        }
    }

    fn add(&mut self, amount: Fixed64) {
        self.current = self.current.saturating_add(amount);
    }

    fn add_one(&mut self) {
        self.add(Fixed64::ONE);
    }

    fn commit(&mut self) {
        if self.committed == self.slots.len() {
            self.total -= self.slots[self.write_pos];
        } else {
            self.committed += 1;
        }
        self.slots[self.write_pos] = self.current;
        self.total = self.total.saturating_add(self.current);
        self.current = Fixed64::ZERO;
        self.write_pos = (self.write_pos + 1) % self.slots.len();
    }

    fn total(&self) -> Fixed64 {
        self.total
    }
}

/// `count` over `seconds`, scaled to per minute. Zero when no time passed.
fn per_minute(count: Fixed64, seconds: Fixed64) -> Fixed64 {
    checked_div_64(count.saturating_mul_int(SECONDS_PER_MINUTE), seconds).unwrap_or(Fixed64::ZERO)
}

// ---------------------------------------------------------------------------
// Per-node statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct NodeFlow {
    /// Seconds covered by each committed tick since this node was first seen.
    time: RollingWindow,
    arrivals: RollingWindow,
    /// Work leaving the node: spawns, finished jobs and released pallets.
    outputs: RollingWindow,
    completions: RollingWindow,
    drops: RollingWindow,
    working_time: RollingWindow,
    output_history: RingBuffer,
    /// The job in the work slot. Events arrive grouped by kind, so a finish
    /// only clears the slot if it names the job that started there.
    job: Option<ProductId>,
}

impl NodeFlow {
    fn new(config: &StatsConfig) -> Self {
        let window = config.window_ticks;
        Self {
            time: RollingWindow::new(window),
            arrivals: RollingWindow::new(window),
            outputs: RollingWindow::new(window),
            completions: RollingWindow::new(window),
            drops: RollingWindow::new(window),
            working_time: RollingWindow::new(window),
            output_history: RingBuffer::new(config.history_capacity),
            job: None,
        }
    }

    fn end_tick(&mut self, elapsed: Fixed64) {
        self.time.add(elapsed);
        if self.job.is_some() {
            self.working_time.add(elapsed);
        }

        for window in [
            &mut self.time,
            &mut self.arrivals,
            &mut self.outputs,
            &mut self.completions,
            &mut self.drops,
            &mut self.working_time,
        ] {
            window.commit();
        }

        self.output_history
            .push(per_minute(self.outputs.total(), self.time.total()));
    }

    fn rate(&self, window: &RollingWindow) -> Fixed64 {
        per_minute(window.total(), self.time.total())
    }

    fn working_ratio(&self) -> Fixed64 {
        checked_div_64(self.working_time.total(), self.time.total())
            .map(clamp_unit)
            .unwrap_or(Fixed64::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Line-wide statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct LineFlow {
    time: RollingWindow,
    spawned: RollingWindow,
    completed: RollingWindow,
    dropped: RollingWindow,
    completion_history: RingBuffer,
    cycle_times: RingBuffer,
}

impl LineFlow {
    fn new(config: &StatsConfig) -> Self {
        let window = config.window_ticks;
        Self {
            time: RollingWindow::new(window),
            spawned: RollingWindow::new(window),
            completed: RollingWindow::new(window),
            dropped: RollingWindow::new(window),
            completion_history: RingBuffer::new(config.history_capacity),
            cycle_times: RingBuffer::new(config.history_capacity),
        }
    }
}

// ---------------------------------------------------------------------------
// FlowStats
// ---------------------------------------------------------------------------

/// Event-driven rolling statistics for one engine run.
///
/// Feed every delivered event to [`process_event`](FlowStats::process_event)
/// and close each tick with [`end_tick`](FlowStats::end_tick). Nodes are
/// tracked from their first event onward. Rates are per simulated minute.
#[derive(Debug)]
pub struct FlowStats {
    config: StatsConfig,
    nodes: HashMap<NodeId, NodeFlow>,
    line: LineFlow,
    ticks: u64,
}

impl FlowStats {
    pub fn new(config: StatsConfig) -> Self {
        let line = LineFlow::new(&config);
        Self {
            config,
            nodes: HashMap::new(),
            line,
            ticks: 0,
        }
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Ticks closed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Simulated seconds covered by the line-wide window.
    pub fn window_time(&self) -> Fixed64 {
        self.line.time.total()
    }

    // -- Event processing ---------------------------------------------------

    pub fn process_event(&mut self, event: &Event) {
        let node = event.node();
        match event {
            Event::ProductSpawned { .. } => {
                self.node_mut(node).outputs.add_one();
                self.line.spawned.add_one();
            }
            Event::ProductArrived { .. } => {
                self.node_mut(node).arrivals.add_one();
            }
            Event::ProcessingStarted { product, .. } => {
                let flow = self.node_mut(node);
                flow.job = Some(*product);
            }
            Event::ProcessingFinished { product, .. } => {
                let flow = self.node_mut(node);
                flow.outputs.add_one();
                if flow.job == Some(*product) {
                    flow.job = None;
                }
            }
            Event::ProductCompleted { cycle_time, .. } => {
                self.node_mut(node).completions.add_one();
                self.line.completed.add_one();
                self.line.cycle_times.push(*cycle_time);
            }
            Event::ProductDropped { .. } => {
                self.node_mut(node).drops.add_one();
                self.line.dropped.add_one();
            }
            Event::PalletReleased { .. } => {
                self.node_mut(node).outputs.add_one();
            }
        }
    }

    /// Close the current tick. `elapsed` is the simulated time it covered,
    /// as reported in the engine's tick result.
    pub fn end_tick(&mut self, elapsed: Fixed64) {
        let elapsed = elapsed.max(Fixed64::ZERO);
        self.ticks += 1;

        for flow in self.nodes.values_mut() {
            flow.end_tick(elapsed);
        }

        let line = &mut self.line;
        line.time.add(elapsed);
        for window in [
            &mut line.time,
            &mut line.spawned,
            &mut line.completed,
            &mut line.dropped,
        ] {
            window.commit();
        }
        line.completion_history
            .push(per_minute(line.completed.total(), line.time.total()));
    }

    // -- Per-node queries ---------------------------------------------------

    /// Products landing at `node`, per minute.
    pub fn arrival_rate(&self, node: NodeId) -> Fixed64 {
        self.with_node(node, |n| n.rate(&n.arrivals))
    }

    /// Spawns, finished jobs or released pallets at `node`, per minute.
    pub fn output_rate(&self, node: NodeId) -> Fixed64 {
        self.with_node(node, |n| n.rate(&n.outputs))
    }

    /// Products retired at `node`, per minute.
    pub fn node_completion_rate(&self, node: NodeId) -> Fixed64 {
        self.with_node(node, |n| n.rate(&n.completions))
    }

    /// Products discarded at `node`, per minute.
    pub fn node_drop_rate(&self, node: NodeId) -> Fixed64 {
        self.with_node(node, |n| n.rate(&n.drops))
    }

    /// Recent fraction of time `node` ended a tick with a job in its work
    /// slot, in `[0, 1]`. Matches how the engine accrues busy time.
    pub fn working_ratio(&self, node: NodeId) -> Fixed64 {
        self.with_node(node, NodeFlow::working_ratio)
    }

    /// Output rate sampled at the end of each tick, oldest first.
    pub fn output_history(&self, node: NodeId) -> Vec<Fixed64> {
        self.nodes
            .get(&node)
            .map(|n| n.output_history.to_vec())
            .unwrap_or_default()
    }

    // -- Line-wide queries --------------------------------------------------

    pub fn spawn_rate(&self) -> Fixed64 {
        per_minute(self.line.spawned.total(), self.line.time.total())
    }

    pub fn completion_rate(&self) -> Fixed64 {
        per_minute(self.line.completed.total(), self.line.time.total())
    }

    pub fn drop_rate(&self) -> Fixed64 {
        per_minute(self.line.dropped.total(), self.line.time.total())
    }

    /// Mean cycle time of the most recent completions.
    pub fn recent_cycle_time(&self) -> Fixed64 {
        self.line.cycle_times.mean()
    }

    /// Cycle times of the most recent completions, oldest first.
    pub fn cycle_time_history(&self) -> Vec<Fixed64> {
        self.line.cycle_times.to_vec()
    }

    /// Line completion rate sampled at the end of each tick, oldest first.
    pub fn completion_history(&self) -> Vec<Fixed64> {
        self.line.completion_history.to_vec()
    }

    // -- Utility ------------------------------------------------------------

    pub fn remove_node(&mut self, node: NodeId) {
        self.nodes.remove(&node);
    }

    /// Forget everything, e.g. after the engine is reset.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.line = LineFlow::new(&self.config);
        self.ticks = 0;
    }

    pub fn tracked_node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_mut(&mut self, node: NodeId) -> &mut NodeFlow {
        let config = &self.config;
        self.nodes.entry(node).or_insert_with(|| NodeFlow::new(config))
    }

    fn with_node(&self, node: NodeId, f: impl FnOnce(&NodeFlow) -> Fixed64) -> Fixed64 {
        self.nodes.get(&node).map(f).unwrap_or(Fixed64::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use metamech_core::fixed::f64_to_fixed64;
    use slotmap::SlotMap;

    fn make_node_id() -> NodeId {
        let mut sm = SlotMap::<NodeId, ()>::with_key();
        sm.insert(())
    }

    fn make_product_id() -> ProductId {
        let mut sm = SlotMap::<ProductId, ()>::with_key();
        sm.insert(())
    }

    fn fx(v: f64) -> Fixed64 {
        f64_to_fixed64(v)
    }

    fn small_config() -> StatsConfig {
        StatsConfig {
            window_ticks: 10,
            history_capacity: 16,
        }
    }

    fn assert_fixed_approx(actual: Fixed64, expected: f64, tolerance: f64) {
        let actual_f64: f64 = actual.to_num();
        assert!(
            (actual_f64 - expected).abs() < tolerance,
            "expected ~{expected}, got {actual_f64}"
        );
    }

    fn spawned(node: NodeId) -> Event {
        Event::ProductSpawned {
            product: make_product_id(),
            node,
            time: Fixed64::ZERO,
        }
    }

    fn completed(node: NodeId, cycle: f64) -> Event {
        Event::ProductCompleted {
            product: make_product_id(),
            node,
            cycle_time: fx(cycle),
            time: Fixed64::ZERO,
        }
    }

    // -----------------------------------------------------------------------
    // RingBuffer
    // -----------------------------------------------------------------------

    #[test]
    fn ring_buffer_wraps_oldest_first() {
        let mut buf = RingBuffer::new(3);
        for i in 1..=5 {
            buf.push(fx(i as f64));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.to_vec(), vec![fx(3.0), fx(4.0), fx(5.0)]);
        assert_eq!(buf.latest(), Some(fx(5.0)));
        assert_eq!(buf.iter().len(), 3);
    }

    #[test]
    fn ring_buffer_mean_and_clear() {
        let mut buf = RingBuffer::new(4);
        assert_eq!(buf.mean(), Fixed64::ZERO);
        buf.push(fx(1.0));
        buf.push(fx(2.0));
        assert_eq!(buf.mean(), fx(1.5));

        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.latest().is_none());
    }

    #[test]
    fn ring_buffer_zero_capacity_holds_one() {
        let mut buf = RingBuffer::new(0);
        buf.push(fx(1.0));
        buf.push(fx(2.0));
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.to_vec(), vec![fx(2.0)]);
    }

    // -----------------------------------------------------------------------
    // Rates
    // -----------------------------------------------------------------------

    #[test]
    fn spawn_rate_is_per_simulated_minute() {
        let mut stats = FlowStats::new(small_config());
        let src = make_node_id();

        // One spawn per half-second tick: 120 per minute.
        for _ in 0..10 {
            stats.process_event(&spawned(src));
            stats.end_tick(fx(0.5));
        }
        assert_eq!(stats.spawn_rate(), fx(120.0));
        assert_eq!(stats.output_rate(src), fx(120.0));
        assert_eq!(stats.window_time(), fx(5.0));
    }

    #[test]
    fn rates_follow_tick_length() {
        let mut stats = FlowStats::new(small_config());
        let src = make_node_id();

        // Same event count, twice the time per tick: half the rate.
        for _ in 0..10 {
            stats.process_event(&spawned(src));
            stats.end_tick(fx(1.0));
        }
        assert_eq!(stats.spawn_rate(), fx(60.0));
    }

    #[test]
    fn window_forgets_old_ticks() {
        let mut stats = FlowStats::new(small_config());
        let sink = make_node_id();

        for _ in 0..10 {
            stats.process_event(&completed(sink, 2.0));
            stats.end_tick(fx(1.0));
        }
        assert_eq!(stats.completion_rate(), fx(60.0));

        // Ten idle ticks push every completion out of the window.
        for _ in 0..10 {
            stats.end_tick(fx(1.0));
        }
        assert_eq!(stats.completion_rate(), Fixed64::ZERO);
        assert_eq!(stats.node_completion_rate(sink), Fixed64::ZERO);

        let history = stats.completion_history();
        assert_eq!(history.len(), 16);
        assert_eq!(history.last(), Some(&Fixed64::ZERO));
    }

    #[test]
    fn partial_window_uses_elapsed_time_only() {
        let mut stats = FlowStats::new(small_config());
        let sink = make_node_id();

        stats.process_event(&completed(sink, 1.0));
        stats.end_tick(fx(1.0));
        stats.end_tick(fx(1.0));
        assert_eq!(stats.completion_rate(), fx(30.0));
    }

    #[test]
    fn zero_time_ticks_do_not_divide() {
        let mut stats = FlowStats::new(small_config());
        let src = make_node_id();
        stats.process_event(&spawned(src));
        stats.end_tick(Fixed64::ZERO);
        assert_eq!(stats.spawn_rate(), Fixed64::ZERO);

        stats.end_tick(fx(-1.0));
        assert_eq!(stats.window_time(), Fixed64::ZERO);
    }

    #[test]
    fn drops_are_tracked_per_node_and_line() {
        let mut stats = FlowStats::new(small_config());
        let buffer = make_node_id();
        for _ in 0..4 {
            stats.process_event(&Event::ProductDropped {
                product: make_product_id(),
                node: buffer,
                time: Fixed64::ZERO,
            });
            stats.end_tick(fx(1.0));
        }
        assert_eq!(stats.drop_rate(), fx(60.0));
        assert_eq!(stats.node_drop_rate(buffer), fx(60.0));
    }

    #[test]
    fn arrivals_and_pallets_count_per_node() {
        let mut stats = FlowStats::new(small_config());
        let pal = make_node_id();
        for i in 0..8 {
            stats.process_event(&Event::ProductArrived {
                product: make_product_id(),
                node: pal,
                time: Fixed64::ZERO,
            });
            if i % 4 == 3 {
                stats.process_event(&Event::PalletReleased {
                    node: pal,
                    count: 4,
                    time: Fixed64::ZERO,
                });
            }
            stats.end_tick(fx(1.0));
        }
        assert_eq!(stats.arrival_rate(pal), fx(60.0));
        assert_eq!(stats.output_rate(pal), fx(15.0));
    }

    // -----------------------------------------------------------------------
    // Working ratio
    // -----------------------------------------------------------------------

    #[test]
    fn working_ratio_spans_ticks_between_events() {
        let mut stats = FlowStats::new(small_config());
        let machine = make_node_id();
        let product = make_product_id();

        // Busy for 2 ticks, idle for 2.
        stats.process_event(&Event::ProcessingStarted {
            product,
            node: machine,
            time: Fixed64::ZERO,
        });
        stats.end_tick(fx(1.0));
        stats.end_tick(fx(1.0));
        stats.process_event(&Event::ProcessingFinished {
            product,
            node: machine,
            time: Fixed64::ZERO,
        });
        stats.end_tick(fx(1.0));
        stats.end_tick(fx(1.0));

        assert_eq!(stats.working_ratio(machine), fx(0.5));
        assert_fixed_approx(stats.output_rate(machine), 15.0, 1e-6);
    }

    #[test]
    fn restart_seen_before_finish_stays_busy() {
        let mut stats = FlowStats::new(small_config());
        let machine = make_node_id();
        let mut products = SlotMap::<ProductId, ()>::with_key();
        let first = products.insert(());
        let second = products.insert(());

        stats.process_event(&Event::ProcessingStarted {
            product: first,
            node: machine,
            time: Fixed64::ZERO,
        });
        stats.end_tick(fx(0.25));

        // The next job's start is delivered ahead of the previous finish.
        stats.process_event(&Event::ProcessingStarted {
            product: second,
            node: machine,
            time: Fixed64::ZERO,
        });
        stats.process_event(&Event::ProcessingFinished {
            product: first,
            node: machine,
            time: Fixed64::ZERO,
        });
        stats.end_tick(fx(0.25));
        stats.end_tick(fx(0.25));
        stats.end_tick(fx(0.25));

        assert_eq!(stats.working_ratio(machine), Fixed64::ONE);
    }

    // -----------------------------------------------------------------------
    // Cycle times and housekeeping
    // -----------------------------------------------------------------------

    #[test]
    fn recent_cycle_time_averages_completions() {
        let mut stats = FlowStats::new(small_config());
        let sink = make_node_id();
        stats.process_event(&completed(sink, 2.0));
        stats.process_event(&completed(sink, 4.0));
        stats.end_tick(fx(1.0));

        assert_eq!(stats.recent_cycle_time(), fx(3.0));
        assert_eq!(stats.cycle_time_history(), vec![fx(2.0), fx(4.0)]);
    }

    #[test]
    fn unknown_nodes_read_as_zero() {
        let stats = FlowStats::new(StatsConfig::default());
        let node = make_node_id();
        assert_eq!(stats.arrival_rate(node), Fixed64::ZERO);
        assert_eq!(stats.working_ratio(node), Fixed64::ZERO);
        assert!(stats.output_history(node).is_empty());
        assert_eq!(stats.recent_cycle_time(), Fixed64::ZERO);
    }

    #[test]
    fn clear_and_remove_node_forget_state() {
        let mut stats = FlowStats::new(small_config());
        let src = make_node_id();
        stats.process_event(&spawned(src));
        stats.end_tick(fx(1.0));
        assert_eq!(stats.tracked_node_count(), 1);

        stats.remove_node(src);
        assert_eq!(stats.tracked_node_count(), 0);
        assert_eq!(stats.output_rate(src), Fixed64::ZERO);

        stats.process_event(&spawned(src));
        stats.end_tick(fx(1.0));
        stats.clear();
        assert_eq!(stats.ticks(), 0);
        assert_eq!(stats.tracked_node_count(), 0);
        assert_eq!(stats.spawn_rate(), Fixed64::ZERO);
        assert!(stats.completion_history().is_empty());
    }
}
