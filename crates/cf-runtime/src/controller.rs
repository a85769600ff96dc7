//! Controller: signal table, block pipeline and scheduling thread.
//!
//! All mutable state lives in one [`Core`] behind a single mutex. A tick
//! (sources, then filters, then sinks) holds that mutex for its whole
//! duration, and so does every configuration call, so external callers only
//! ever observe the table between ticks.

use std::fmt::{self, Write as _};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cf_controls::{
    Block, BlockKind, ControlError, ControlResult, Options, SignalTable, SignalValue,
};
use cf_core::period_from_secs;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, DEFAULT_PERIOD, Interrupt};
use crate::config::{BlockConfig, ControllerConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::stats::TickStats;

/// Name of the signal and source created for the controller's clock. Sample
/// values bundled by the clock device land in `clock.0`, `clock.1`, ...
pub const CLOCK: &str = "clock";

/// Controller run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Never started.
    Created,
    Stopped,
    Running,
    /// The scheduling thread failed; the controller cannot be restarted.
    Exiting,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Created => "created",
            RunState::Stopped => "stopped",
            RunState::Running => "running",
            RunState::Exiting => "exiting",
        };
        f.write_str(s)
    }
}

/// One of the three ordered block collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Source,
    Filter,
    Sink,
}

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Source => "source",
            Section::Filter => "filter",
            Section::Sink => "sink",
        }
    }

    fn plural(self) -> &'static str {
        match self {
            Section::Source => "sources",
            Section::Filter => "filters",
            Section::Sink => "sinks",
        }
    }
}

#[derive(Debug)]
struct BlockEntry {
    name: String,
    block: Box<dyn Block>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    enabled: bool,
}

impl BlockEntry {
    fn uses(&self, signal: &str) -> bool {
        self.inputs.iter().chain(&self.outputs).any(|s| s == signal)
    }
}

#[derive(Debug)]
struct Core {
    signals: SignalTable,
    sources: Vec<BlockEntry>,
    filters: Vec<BlockEntry>,
    sinks: Vec<BlockEntry>,
    state: RunState,
    stats: TickStats,
}

fn check_signals(signals: &SignalTable, names: &[String]) -> ControlResult<()> {
    match names.iter().find(|n| !signals.contains(n)) {
        Some(missing) => Err(ControlError::not_found("signal", missing.as_str())),
        None => Ok(()),
    }
}

fn check_role(section: Section, block: &dyn Block) -> ControlResult<()> {
    let caps = block.capabilities();
    let supported = match section {
        Section::Source => caps.is_source(),
        Section::Filter => caps.is_filter(),
        Section::Sink => caps.is_sink(),
    };
    if !supported {
        return Err(ControlError::config(format!(
            "{} block cannot be used as a {}",
            block.type_name(),
            section.as_str()
        )));
    }
    Ok(())
}

impl Core {
    fn section(&self, section: Section) -> &Vec<BlockEntry> {
        match section {
            Section::Source => &self.sources,
            Section::Filter => &self.filters,
            Section::Sink => &self.sinks,
        }
    }

    fn section_mut(&mut self, section: Section) -> &mut Vec<BlockEntry> {
        match section {
            Section::Source => &mut self.sources,
            Section::Filter => &mut self.filters,
            Section::Sink => &mut self.sinks,
        }
    }

    fn entry_mut(&mut self, section: Section, name: &str) -> ControlResult<&mut BlockEntry> {
        self.section_mut(section)
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| ControlError::not_found(section.as_str(), name))
    }

    fn name_taken(&self, section: Section, name: &str) -> bool {
        self.section(section).iter().any(|e| e.name == name)
    }

    /// Run one tick. Blocks work on a staged copy of the table that replaces
    /// it only when every block succeeded. The error names the block that
    /// failed.
    fn tick(&mut self) -> Result<(), String> {
        let Core {
            signals: committed,
            sources,
            filters,
            sinks,
            ..
        } = self;
        let mut staged = committed.clone();
        let signals = &mut staged;
        let fail = |section: Section, name: &str, err: ControlError| {
            format!("{} '{}': {}", section.as_str(), name, err)
        };

        for entry in sources.iter_mut().filter(|e| e.enabled) {
            entry
                .block
                .read()
                .and_then(|values| signals.assign(&entry.outputs, values))
                .map_err(|e| fail(Section::Source, &entry.name, e))?;
        }
        for entry in filters.iter_mut().filter(|e| e.enabled) {
            signals
                .gather(&entry.inputs)
                .and_then(|inputs| entry.block.write(&inputs))
                .and_then(|()| entry.block.read())
                .and_then(|values| signals.assign(&entry.outputs, values))
                .map_err(|e| fail(Section::Filter, &entry.name, e))?;
        }
        for entry in sinks.iter_mut().filter(|e| e.enabled) {
            signals
                .gather(&entry.inputs)
                .and_then(|inputs| entry.block.write(&inputs))
                .map_err(|e| fail(Section::Sink, &entry.name, e))?;
        }
        *committed = staged;
        Ok(())
    }

    /// Tick with panics from block code converted into errors.
    fn guarded_tick(&mut self) -> Result<Duration, String> {
        let started = Instant::now();
        match panic::catch_unwind(AssertUnwindSafe(|| self.tick())) {
            Ok(Ok(())) => {
                let elapsed = started.elapsed();
                self.stats.record(elapsed);
                Ok(elapsed)
            }
            Ok(Err(what)) => Err(what),
            Err(payload) => Err(if let Some(s) = payload.downcast_ref::<&str>() {
                format!("block panicked: {s}")
            } else if let Some(s) = payload.downcast_ref::<String>() {
                format!("block panicked: {s}")
            } else {
                "block panicked".to_string()
            }),
        }
    }
}

struct Shared {
    core: Mutex<Core>,
    state_changed: Condvar,
    stop: Interrupt,
    clock: Clock,
}

impl Shared {
    fn set_state(&self, core: &mut Core, state: RunState) {
        core.state = state;
        self.state_changed.notify_all();
    }
}

/// Periodic executor of a source → filter → sink pipeline.
///
/// Every method takes `&self` and is safe to call from any thread; share the
/// controller with `Arc<Controller>`.
pub struct Controller {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state())
            .field("period", &self.get_period())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Controller on the process-wide system clock.
    pub fn new() -> RuntimeResult<Self> {
        Self::with_clock(Clock::acquire(DEFAULT_PERIOD)?)
    }

    /// Controller driven by `clock`. Adds the `clock` signal and source,
    /// plus one `clock.N` signal per value in the device's sample.
    pub fn with_clock(clock: Clock) -> RuntimeResult<Self> {
        let mut signals = SignalTable::new();
        signals.add(CLOCK)?;
        let mut outputs = vec![CLOCK.to_string()];
        for (i, value) in clock.sample()?.into_iter().enumerate() {
            let name = format!("{CLOCK}.{i}");
            signals.add_with(&name, value)?;
            outputs.push(name);
        }
        let sources = vec![BlockEntry {
            name: CLOCK.to_string(),
            block: Box::new(clock.source()),
            inputs: Vec::new(),
            outputs,
            enabled: true,
        }];
        let core = Core {
            signals,
            sources,
            filters: Vec::new(),
            sinks: Vec::new(),
            state: RunState::Created,
            stats: TickStats::default(),
        };
        Ok(Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                state_changed: Condvar::new(),
                stop: Interrupt::new(),
                clock,
            }),
            thread: Mutex::new(None),
        })
    }

    /// Build a controller on `clock` and apply `config`.
    pub fn from_config(clock: Clock, config: &ControllerConfig) -> RuntimeResult<Self> {
        let controller = Self::with_clock(clock)?;
        controller.configure(config)?;
        Ok(controller)
    }

    pub fn clock(&self) -> &Clock {
        &self.shared.clock
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.shared.core.lock().state
    }

    /// Snapshot of the tick counters.
    pub fn stats(&self) -> TickStats {
        self.shared.core.lock().stats
    }

    // Lifecycle

    /// Spawn the scheduling thread. No-op when already running.
    pub fn start(&self) -> RuntimeResult<()> {
        let mut thread = self.thread.lock();
        {
            let mut core = self.shared.core.lock();
            match core.state {
                RunState::Running => return Ok(()),
                RunState::Exiting => {
                    return Err(RuntimeError::state("controller has exited"));
                }
                RunState::Created | RunState::Stopped => {}
            }
            self.shared.set_state(&mut core, RunState::Running);
        }
        if let Some(previous) = thread.take() {
            let _ = previous.join();
        }

        self.shared.stop.clear();
        self.shared.clock.set_running(true);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("cf-controller".to_string())
            .spawn(move || run_loop(shared));
        match spawned {
            Ok(handle) => {
                *thread = Some(handle);
                info!(
                    period_s = self.shared.clock.period().as_secs_f64(),
                    "controller started"
                );
                Ok(())
            }
            Err(err) => {
                self.shared.clock.set_running(false);
                let mut core = self.shared.core.lock();
                self.shared.set_state(&mut core, RunState::Stopped);
                Err(err.into())
            }
        }
    }

    /// Ask the scheduling thread to finish its current tick and wait for it.
    /// A thread sleeping towards its next deadline is woken at once.
    pub fn stop(&self) -> RuntimeResult<()> {
        let mut thread = self.thread.lock();
        let Some(handle) = thread.take() else {
            return Ok(());
        };
        self.shared.stop.raise();
        let joined = handle.join();
        self.shared.clock.set_running(false);
        if joined.is_err() {
            let mut core = self.shared.core.lock();
            self.shared.set_state(&mut core, RunState::Exiting);
            return Err(RuntimeError::Fatal {
                what: "scheduling thread panicked".to_string(),
            });
        }
        info!(ticks = self.stats().ticks, "controller stopped");
        Ok(())
    }

    /// Block until the controller is no longer running.
    pub fn join(&self) {
        let mut core = self.shared.core.lock();
        while core.state == RunState::Running {
            self.shared.state_changed.wait(&mut core);
        }
    }

    /// Start now and stop when the returned guard is dropped.
    pub fn run_scope(&self) -> RuntimeResult<RunScope<'_>> {
        self.start()?;
        Ok(RunScope { controller: self })
    }

    /// Run exactly one tick on the calling thread. Only allowed while not
    /// running; errors are returned rather than ending the controller.
    pub fn step(&self) -> RuntimeResult<()> {
        let mut core = self.shared.core.lock();
        match core.state {
            RunState::Running => Err(RuntimeError::state("cannot step while running")),
            RunState::Exiting => Err(RuntimeError::state("controller has exited")),
            RunState::Created | RunState::Stopped => core
                .guarded_tick()
                .map(|_| ())
                .map_err(|what| RuntimeError::Tick { what }),
        }
    }

    /// Current tick period.
    pub fn get_period(&self) -> Duration {
        self.shared.clock.period()
    }

    /// Change the tick period. Rejected while running.
    pub fn set_period(&self, period: Duration) -> RuntimeResult<()> {
        let core = self.shared.core.lock();
        if core.state == RunState::Running {
            return Err(RuntimeError::state("cannot change the period while running"));
        }
        self.shared.clock.set_period(period)?;
        drop(core);
        debug!(period_s = period.as_secs_f64(), "period changed");
        Ok(())
    }

    // Signals

    /// Add a signal initialised to scalar zero.
    pub fn add_signal(&self, name: &str) -> RuntimeResult<()> {
        self.shared.core.lock().signals.add(name)?;
        Ok(())
    }

    /// Add a signal with an initial value.
    pub fn add_signal_with(&self, name: &str, value: impl Into<SignalValue>) -> RuntimeResult<()> {
        self.shared.core.lock().signals.add_with(name, value.into())?;
        Ok(())
    }

    /// Overwrite a signal's value.
    pub fn set_signal(&self, name: &str, value: impl Into<SignalValue>) -> RuntimeResult<()> {
        self.shared.core.lock().signals.set(name, value.into())?;
        Ok(())
    }

    /// Get a copy of a signal's current value.
    pub fn get_signal(&self, name: &str) -> RuntimeResult<SignalValue> {
        Ok(self.shared.core.lock().signals.get(name)?.clone())
    }

    /// Several values taken from the same snapshot.
    pub fn get_signals(&self, names: &[impl AsRef<str>]) -> RuntimeResult<Vec<SignalValue>> {
        let core = self.shared.core.lock();
        let values = names
            .iter()
            .map(|n| core.signals.get(n.as_ref()).cloned())
            .collect::<ControlResult<Vec<_>>>()?;
        Ok(values)
    }

    /// Remove a signal no block refers to.
    pub fn remove_signal(&self, name: &str) -> RuntimeResult<()> {
        let mut core = self.shared.core.lock();
        for section in [Section::Source, Section::Filter, Section::Sink] {
            if let Some(entry) = core.section(section).iter().find(|e| e.uses(name)) {
                return Err(ControlError::config(format!(
                    "signal '{}' is used by {} '{}'",
                    name,
                    section.as_str(),
                    entry.name
                ))
                .into());
            }
        }
        core.signals.remove(name)?;
        Ok(())
    }

    /// Signal names in insertion order.
    pub fn list_signals(&self) -> Vec<String> {
        self.shared.core.lock().signals.names().to_vec()
    }

    // Blocks

    /// Append a source writing `outputs`.
    pub fn add_source(
        &self,
        name: &str,
        block: Box<dyn Block>,
        outputs: &[impl AsRef<str>],
    ) -> RuntimeResult<()> {
        self.add_block(Section::Source, name, block, &[] as &[&str], outputs)
    }

    /// Append a filter reading `inputs` and writing `outputs`.
    pub fn add_filter(
        &self,
        name: &str,
        block: Box<dyn Block>,
        inputs: &[impl AsRef<str>],
        outputs: &[impl AsRef<str>],
    ) -> RuntimeResult<()> {
        self.add_block(Section::Filter, name, block, inputs, outputs)
    }

    /// Append a sink reading `inputs`.
    pub fn add_sink(
        &self,
        name: &str,
        block: Box<dyn Block>,
        inputs: &[impl AsRef<str>],
    ) -> RuntimeResult<()> {
        self.add_block(Section::Sink, name, block, inputs, &[] as &[&str])
    }

    /// Build a block from its description and add it to `section`.
    pub fn add_block_from_kind(
        &self,
        section: Section,
        name: &str,
        kind: BlockKind,
        inputs: &[impl AsRef<str>],
        outputs: &[impl AsRef<str>],
    ) -> RuntimeResult<()> {
        let block = kind.build()?;
        self.add_block(section, name, block, inputs, outputs)
    }

    /// Append `block` to `section`. Every named signal must exist and the
    /// block must support the section's role.
    pub fn add_block(
        &self,
        section: Section,
        name: &str,
        block: Box<dyn Block>,
        inputs: &[impl AsRef<str>],
        outputs: &[impl AsRef<str>],
    ) -> RuntimeResult<()> {
        check_role(section, block.as_ref())?;

        let inputs: Vec<String> = inputs.iter().map(|s| s.as_ref().to_string()).collect();
        let outputs: Vec<String> = outputs.iter().map(|s| s.as_ref().to_string()).collect();

        let mut core = self.shared.core.lock();
        if core.name_taken(section, name) {
            return Err(ControlError::duplicate(section.as_str(), name).into());
        }
        check_signals(&core.signals, &inputs)?;
        check_signals(&core.signals, &outputs)?;
        debug!(
            section = section.as_str(),
            name,
            kind = block.type_name(),
            "block added"
        );
        core.section_mut(section).push(BlockEntry {
            name: name.to_string(),
            block,
            inputs,
            outputs,
            enabled: true,
        });
        Ok(())
    }

    /// Apply options to a source. See [`set_block`](Self::set_block).
    pub fn set_source(&self, name: &str, options: Options) -> RuntimeResult<()> {
        self.set_block(Section::Source, name, options)
    }

    pub fn set_filter(&self, name: &str, options: Options) -> RuntimeResult<()> {
        self.set_block(Section::Filter, name, options)
    }

    pub fn set_sink(&self, name: &str, options: Options) -> RuntimeResult<()> {
        self.set_block(Section::Sink, name, options)
    }

    /// Apply options to a block. `reset` and `enabled` are handled here; the
    /// rest go to the block, and anything it leaves behind is an error.
    pub fn set_block(&self, section: Section, name: &str, mut options: Options) -> RuntimeResult<()> {
        let reset = options.take::<bool>("reset")?.unwrap_or(false);
        let enabled = options.take::<bool>("enabled")?;

        let mut core = self.shared.core.lock();
        let entry = core.entry_mut(section, name)?;
        entry.block.set(&mut options)?;
        options.finish()?;
        if let Some(enabled) = enabled {
            entry.enabled = enabled;
        }
        if reset {
            entry.block.reset();
        }
        Ok(())
    }

    pub fn remove_source(&self, name: &str) -> RuntimeResult<()> {
        self.remove_block(Section::Source, name)
    }

    pub fn remove_filter(&self, name: &str) -> RuntimeResult<()> {
        self.remove_block(Section::Filter, name)
    }

    pub fn remove_sink(&self, name: &str) -> RuntimeResult<()> {
        self.remove_block(Section::Sink, name)
    }

    /// Remove a block. Signals it used are kept.
    pub fn remove_block(&self, section: Section, name: &str) -> RuntimeResult<()> {
        let mut core = self.shared.core.lock();
        let blocks = core.section_mut(section);
        let index = blocks
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| ControlError::not_found(section.as_str(), name))?;
        blocks.remove(index);
        Ok(())
    }

    /// Read a source outside the tick.
    pub fn read_source(&self, name: &str) -> RuntimeResult<Vec<SignalValue>> {
        self.read_block(Section::Source, name)
    }

    pub fn read_filter(&self, name: &str) -> RuntimeResult<Vec<SignalValue>> {
        self.read_block(Section::Filter, name)
    }

    /// Read a sink's accumulated data outside the tick.
    pub fn read_sink(&self, name: &str) -> RuntimeResult<Vec<SignalValue>> {
        self.read_block(Section::Sink, name)
    }

    /// Call `read` on a block directly, outside the tick.
    pub fn read_block(&self, section: Section, name: &str) -> RuntimeResult<Vec<SignalValue>> {
        let mut core = self.shared.core.lock();
        Ok(core.entry_mut(section, name)?.block.read()?)
    }

    /// Source names in execution order.
    pub fn list_sources(&self) -> Vec<String> {
        self.list_blocks(Section::Source)
    }

    pub fn list_filters(&self) -> Vec<String> {
        self.list_blocks(Section::Filter)
    }

    pub fn list_sinks(&self) -> Vec<String> {
        self.list_blocks(Section::Sink)
    }

    /// Block names of `section` in execution order.
    pub fn list_blocks(&self, section: Section) -> Vec<String> {
        let core = self.shared.core.lock();
        core.section(section).iter().map(|e| e.name.clone()).collect()
    }

    // Configuration

    /// Apply a configuration: period, signals, then blocks in order.
    /// Signals that already exist are kept.
    ///
    /// Every block is built and checked before anything changes, so a
    /// rejected configuration leaves the controller as it was.
    pub fn configure(&self, config: &ControllerConfig) -> RuntimeResult<()> {
        config.validate()?;
        let period =
            period_from_secs(config.period).map_err(|e| ControlError::config(e.to_string()))?;

        let sections = [
            (Section::Source, &config.sources),
            (Section::Filter, &config.filters),
            (Section::Sink, &config.sinks),
        ];
        let mut planned = Vec::new();
        for (section, blocks) in sections {
            for BlockConfig {
                name,
                block,
                inputs,
                outputs,
                enabled,
            } in blocks
            {
                let block = block.clone().build()?;
                check_role(section, block.as_ref())?;
                planned.push((
                    section,
                    BlockEntry {
                        name: name.clone(),
                        block,
                        inputs: inputs.clone(),
                        outputs: outputs.clone(),
                        enabled: *enabled,
                    },
                ));
            }
        }

        let mut core = self.shared.core.lock();
        if core.state == RunState::Running {
            return Err(RuntimeError::state("cannot configure while running"));
        }
        let mut signals = core.signals.clone();
        for name in &config.signals {
            if !signals.contains(name) {
                signals.add(name)?;
            }
        }
        for (i, (section, entry)) in planned.iter().enumerate() {
            let repeated = planned[..i]
                .iter()
                .any(|(s, e)| s == section && e.name == entry.name);
            if repeated || core.name_taken(*section, &entry.name) {
                return Err(ControlError::duplicate(section.as_str(), &entry.name).into());
            }
            check_signals(&signals, &entry.inputs)?;
            check_signals(&signals, &entry.outputs)?;
        }

        self.shared.clock.set_period(period)?;
        core.signals = signals;
        for (section, entry) in planned {
            core.section_mut(section).push(entry);
        }
        drop(core);
        info!(
            signals = config.signals.len(),
            sources = config.sources.len(),
            filters = config.filters.len(),
            sinks = config.sinks.len(),
            "controller configured"
        );
        Ok(())
    }

    /// Human-readable description of `what`: `all`, `summary`, `signals`,
    /// `sources`, `filters` or `sinks`.
    pub fn info(&self, what: &str) -> RuntimeResult<String> {
        let core = self.shared.core.lock();
        let mut out = String::new();
        let want = |key: &str| what == "all" || what == key;

        let known = ["all", "summary", "signals", "sources", "filters", "sinks"];
        if !known.contains(&what) {
            return Err(ControlError::config(format!(
                "unknown info topic '{what}', expected one of: {}",
                known.join(", ")
            ))
            .into());
        }

        if want("summary") {
            let _ = writeln!(
                out,
                "> Controller with {} signal(s), {} source(s), {} filter(s), and {} sink(s)",
                core.signals.len(),
                core.sources.len(),
                core.filters.len(),
                core.sinks.len()
            );
            let _ = writeln!(
                out,
                "> period = {}s",
                self.shared.clock.period().as_secs_f64()
            );
            let _ = writeln!(out, "> state = {}", core.state);
        }
        if want("signals") {
            let _ = writeln!(out, "> signals");
            for (i, name) in core.signals.names().iter().enumerate() {
                let _ = writeln!(out, "  {}. {}", i + 1, name);
            }
        }
        for section in [Section::Source, Section::Filter, Section::Sink] {
            if !want(section.plural()) {
                continue;
            }
            let _ = writeln!(out, "> {}", section.plural());
            for (i, entry) in core.section(section).iter().enumerate() {
                let status = if entry.enabled { "enabled" } else { "disabled" };
                let _ = write!(
                    out,
                    "  {}. {}[{}, {}]",
                    i + 1,
                    entry.name,
                    entry.block.type_name(),
                    status
                );
                if !entry.inputs.is_empty() {
                    let _ = write!(out, " {}", entry.inputs.join(", "));
                }
                if !entry.outputs.is_empty() {
                    let _ = write!(out, " >> {}", entry.outputs.join(", "));
                }
                out.push('\n');
            }
        }
        Ok(out)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("controller stop on drop failed: {err}");
        }
    }
}

/// Guard returned by [`Controller::run_scope`].
#[derive(Debug)]
pub struct RunScope<'a> {
    controller: &'a Controller,
}

impl RunScope<'_> {
    pub fn controller(&self) -> &Controller {
        self.controller
    }
}

impl Drop for RunScope<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.controller.stop() {
            warn!("controller stop at end of scope failed: {err}");
        }
    }
}

/// Scheduling thread body.
///
/// Deadlines sit on the nominal grid `start + k * period`. A missed deadline
/// is counted and the loop resumes at the next boundary still in the future.
fn run_loop(shared: Arc<Shared>) {
    let clock = &shared.clock;
    let period = clock.period();
    let mut deadline = clock.device_now() + period;

    while !shared.stop.is_raised() {
        let outcome = {
            let mut core = shared.core.lock();
            core.guarded_tick()
        };
        if let Err(what) = outcome {
            error!(error = %what, "tick failed; controller exiting");
            clock.set_running(false);
            let mut core = shared.core.lock();
            shared.set_state(&mut core, RunState::Exiting);
            return;
        }

        let now = clock.device_now();
        if now >= deadline {
            let behind = (now - deadline).as_nanos() / period.as_nanos().max(1);
            let skipped = u64::try_from(behind).unwrap_or(u64::MAX).saturating_add(1);
            deadline += period.saturating_mul(u32::try_from(skipped).unwrap_or(u32::MAX));
            let mut core = shared.core.lock();
            let warn_due = core.stats.record_overrun(skipped);
            let overruns = core.stats.overruns;
            drop(core);
            debug!(overruns, skipped, "tick deadline missed");
            if warn_due {
                warn!(overruns, "controller is missing tick deadlines");
            }
        }
        clock.sleep_until_interruptible(deadline, &shared.stop);
        deadline += period;
    }

    let mut core = shared.core.lock();
    shared.set_state(&mut core, RunState::Stopped);
}
