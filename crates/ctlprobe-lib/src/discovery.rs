//! Discovery engine: probe a device with candidate control codes and keep
//! the ones its driver appears to recognize.
//!
//! Three strategies share one probe primitive:
//!
//! - [`Scanner::scan_range`] tries every raw code in an inclusive interval.
//! - [`Scanner::discover`] fixes a device type and walks the function range
//!   table, crossing methods with access levels and stopping at the first
//!   recognized combination for each function.
//! - [`Scanner::discover_parallel`] runs the same candidates on a pool of
//!   workers, one device handle per worker.
//!
//! A fatal [`DeviceError`] aborts any strategy and is returned inside
//! [`DiscoveryError::Aborted`] together with everything found so far. The
//! targeted strategies refuse to start on an invalid range table.
//! Cancellation and the time budget are not errors; they end the scan early
//! and mark the result with a [`StopReason`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::classify::ProbeOutcome;
use crate::code::{Access, ControlCode, MAX_FUNCTION, Method};
use crate::config::Config;
use crate::device::{self, DeviceControl, DeviceError};

/// Default input buffer handed to every probe.
pub const PROBE_INPUT_LEN: usize = 16;
/// Default output buffer handed to every probe.
pub const PROBE_OUTPUT_LEN: usize = 256;

/// Function intervals probed by the targeted strategy when none are configured.
pub const DEFAULT_RANGES: [(u16, u16); 4] =
    [(0x000, 0x100), (0x400, 0x600), (0x800, 0x900), (0xF00, 0xFFF)];

pub const DEFAULT_WORKERS: usize = 4;

// ── Probe buffers ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeBuffers {
    pub input_len: usize,
    pub output_len: usize,
}

impl Default for ProbeBuffers {
    fn default() -> Self {
        ProbeBuffers {
            input_len: PROBE_INPUT_LEN,
            output_len: PROBE_OUTPUT_LEN,
        }
    }
}

/// Zeroed buffers reused across the probes of one scan.
struct Scratch {
    input: Vec<u8>,
    output: Vec<u8>,
}

impl Scratch {
    fn new(buffers: ProbeBuffers) -> Self {
        Scratch {
            input: vec![0; buffers.input_len],
            output: vec![0; buffers.output_len],
        }
    }
}

// ── Search ranges ──

fn all_methods() -> Vec<Method> {
    Method::ALL.to_vec()
}

fn all_access() -> Vec<Access> {
    Access::ALL.to_vec()
}

/// Closed interval of function codes, crossed with methods and access levels.
///
/// `methods` is the outer loop, `access` the inner one; both keep their
/// listed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRange {
    pub start: u16,
    pub end: u16,
    #[serde(default = "all_methods")]
    pub methods: Vec<Method>,
    #[serde(default = "all_access")]
    pub access: Vec<Access>,
}

impl SearchRange {
    /// Range over `[start, end]` with every method and access level.
    pub fn new(start: u16, end: u16) -> Self {
        SearchRange {
            start,
            end,
            methods: all_methods(),
            access: all_access(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.start > self.end {
            return Err(format!(
                "range 0x{:03X}-0x{:03X}: start is after end",
                self.start, self.end
            ));
        }
        if self.end > MAX_FUNCTION {
            return Err(format!(
                "range 0x{:03X}-0x{:03X}: end exceeds 0x{MAX_FUNCTION:03X}",
                self.start, self.end
            ));
        }
        if self.methods.is_empty() || self.access.is_empty() {
            return Err(format!(
                "range 0x{:03X}-0x{:03X}: needs at least one method and one access level",
                self.start, self.end
            ));
        }
        Ok(())
    }

    /// Number of codes this range expands to.
    pub fn len(&self) -> usize {
        if self.start > self.end {
            return 0;
        }
        (self.end - self.start) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, function: u16) -> bool {
        (self.start..=self.end).contains(&function)
    }
}

pub fn default_ranges() -> Vec<SearchRange> {
    DEFAULT_RANGES
        .iter()
        .map(|&(start, end)| SearchRange::new(start, end))
        .collect()
}

/// Validate a whole range table. Overlapping ranges would probe the same
/// function twice and are rejected.
pub fn validate_ranges(ranges: &[SearchRange]) -> std::result::Result<(), String> {
    for range in ranges {
        range.validate()?;
    }
    for (i, a) in ranges.iter().enumerate() {
        for b in &ranges[i + 1..] {
            if a.start <= b.end && b.start <= a.end {
                return Err(format!(
                    "ranges 0x{:03X}-0x{:03X} and 0x{:03X}-0x{:03X} overlap",
                    a.start, a.end, b.start, b.end
                ));
            }
        }
    }
    Ok(())
}

// ── Candidates ──

/// One unit of work for the targeted strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// Position in the sequential probe order.
    pub index: usize,
    pub function: u16,
    pub method: Method,
    pub access: Access,
    pub code: ControlCode,
}

/// Expand a range table into candidates, in the order the sequential
/// strategy would probe them. Functions above [`MAX_FUNCTION`] are dropped.
pub fn candidates(device_type: u16, ranges: &[SearchRange]) -> Vec<Candidate> {
    let mut out = Vec::new();
    for range in ranges {
        for function in range.start..=range.end.min(MAX_FUNCTION) {
            for &method in &range.methods {
                for &access in &range.access {
                    out.push(Candidate {
                        index: out.len(),
                        function,
                        method,
                        access,
                        code: ControlCode::new(device_type, function, method, access),
                    });
                }
            }
        }
    }
    out
}

// ── Results ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    BudgetExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::BudgetExhausted => write!(f, "time budget exhausted"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryResult {
    /// Outcomes classified as hits, in probe order.
    pub found: Vec<ProbeOutcome>,
    pub probes_issued: usize,
    /// Set when the scan ended before covering its whole search space.
    pub stopped: Option<StopReason>,
}

impl DiscoveryResult {
    pub fn is_complete(&self) -> bool {
        self.stopped.is_none()
    }

    pub fn codes(&self) -> Vec<ControlCode> {
        self.found.iter().map(|o| o.code).collect()
    }
}

// ── Error type ──

#[derive(Debug)]
pub enum DiscoveryError {
    /// The range table failed [`validate_ranges`]; nothing was submitted.
    InvalidRanges(String),
    /// The device became unusable mid-scan.
    Aborted {
        source: DeviceError,
        partial: DiscoveryResult,
    },
}

impl DiscoveryError {
    /// Results gathered before the failure, if the scan got that far.
    pub fn partial(&self) -> Option<&DiscoveryResult> {
        match self {
            DiscoveryError::InvalidRanges(_) => None,
            DiscoveryError::Aborted { partial, .. } => Some(partial),
        }
    }
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::InvalidRanges(e) => write!(f, "Invalid function ranges: {e}"),
            DiscoveryError::Aborted { source, partial } => write!(
                f,
                "Scan aborted after {} probes ({} found): {source}",
                partial.probes_issued,
                partial.found.len()
            ),
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiscoveryError::InvalidRanges(_) => None,
            DiscoveryError::Aborted { source, .. } => Some(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

// ── Scanner ──

/// Discovery settings: range table, buffer sizes, stop conditions, pool size.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    ranges: Vec<SearchRange>,
    buffers: ProbeBuffers,
    budget: Option<Duration>,
    running: Option<&'a AtomicBool>,
    workers: usize,
}

impl Default for Scanner<'_> {
    fn default() -> Self {
        Scanner {
            ranges: default_ranges(),
            buffers: ProbeBuffers::default(),
            budget: None,
            running: None,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl<'a> Scanner<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scanner configured from the user's config file values.
    pub fn from_config(config: &Config) -> Self {
        let budget = (config.time_budget_secs > 0)
            .then(|| Duration::from_secs(config.time_budget_secs));
        Scanner {
            ranges: config.ranges.clone(),
            buffers: ProbeBuffers {
                input_len: config.input_len,
                output_len: config.output_len,
            },
            budget,
            running: None,
            workers: config.workers.max(1),
        }
    }

    /// Replace the range table. It is checked with [`validate_ranges`] when
    /// a targeted scan starts.
    pub fn with_ranges(mut self, ranges: Vec<SearchRange>) -> Self {
        self.ranges = ranges;
        self
    }

    pub fn with_buffers(mut self, buffers: ProbeBuffers) -> Self {
        self.buffers = buffers;
        self
    }

    /// Stop once this much time has elapsed since the scan started.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn without_budget(mut self) -> Self {
        self.budget = None;
        self
    }

    /// Stop as soon as `running` reads `false`.
    pub fn with_running_flag(mut self, running: &'a AtomicBool) -> Self {
        self.running = Some(running);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn ranges(&self) -> &[SearchRange] {
        &self.ranges
    }

    pub fn buffers(&self) -> ProbeBuffers {
        self.buffers
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn check_ranges(&self) -> Result<()> {
        validate_ranges(&self.ranges).map_err(|e| {
            log::warn!("refusing to scan: {e}");
            DiscoveryError::InvalidRanges(e)
        })
    }

    fn should_stop(&self, started: Instant) -> Option<StopReason> {
        if self.running.is_some_and(|r| !r.load(Ordering::Relaxed)) {
            return Some(StopReason::Cancelled);
        }
        if self.budget.is_some_and(|b| started.elapsed() >= b) {
            return Some(StopReason::BudgetExhausted);
        }
        None
    }

    fn probe_with(
        &self,
        dev: &impl DeviceControl,
        code: ControlCode,
        scratch: &mut Scratch,
    ) -> device::Result<ProbeOutcome> {
        let completion = dev.submit(code, &scratch.input, &mut scratch.output)?;
        let outcome = ProbeOutcome {
            code,
            signal: completion.signal,
            bytes_returned: completion.bytes_returned,
        };
        log::trace!("probe {code}: {:?} -> {}", outcome.signal, outcome.verdict());
        Ok(outcome)
    }

    /// Submit one code with zeroed buffers and report what came back.
    pub fn probe(&self, dev: &impl DeviceControl, code: ControlCode) -> device::Result<ProbeOutcome> {
        self.probe_with(dev, code, &mut Scratch::new(self.buffers))
    }

    /// Probe every raw code in `[start, end]`, ascending. `start > end` is
    /// an empty scan.
    pub fn scan_range(
        &self,
        dev: &impl DeviceControl,
        start: ControlCode,
        end: ControlCode,
    ) -> Result<DiscoveryResult> {
        let mut result = DiscoveryResult::default();
        if start > end {
            return Ok(result);
        }
        log::info!("scanning {start}..={end} on {}", dev.path());
        let started = Instant::now();
        let mut scratch = Scratch::new(self.buffers);

        for raw in start.raw()..=end.raw() {
            if let Some(reason) = self.should_stop(started) {
                result.stopped = Some(reason);
                break;
            }
            let outcome = match self.probe_with(dev, ControlCode(raw), &mut scratch) {
                Ok(outcome) => outcome,
                Err(source) => return Err(abort(source, result)),
            };
            result.probes_issued += 1;
            if outcome.verdict().is_hit() {
                result.found.push(outcome);
            }
        }

        log_finished(&result, started);
        Ok(result)
    }

    /// Targeted discovery for one device type, one result per function at most.
    pub fn discover(&self, dev: &impl DeviceControl, device_type: u16) -> Result<DiscoveryResult> {
        self.check_ranges()?;
        let mut result = DiscoveryResult::default();
        log::info!(
            "discovering device type 0x{device_type:04X} on {} ({} ranges)",
            dev.path(),
            self.ranges.len()
        );
        let started = Instant::now();
        let mut scratch = Scratch::new(self.buffers);

        'functions: for range in &self.ranges {
            for function in range.start..=range.end {
                'combos: for &method in &range.methods {
                    for &access in &range.access {
                        if let Some(reason) = self.should_stop(started) {
                            result.stopped = Some(reason);
                            break 'functions;
                        }
                        let code = ControlCode::new(device_type, function, method, access);
                        let outcome = match self.probe_with(dev, code, &mut scratch) {
                            Ok(outcome) => outcome,
                            Err(source) => return Err(abort(source, result)),
                        };
                        result.probes_issued += 1;
                        if outcome.verdict().is_hit() {
                            result.found.push(outcome);
                            break 'combos;
                        }
                    }
                }
            }
        }

        log_finished(&result, started);
        Ok(result)
    }

    /// Targeted discovery on a pool of worker threads.
    ///
    /// `open` is called once per worker; handles are never shared between
    /// threads. When several combinations of one function are recognized,
    /// the first to complete wins, so the retained method/access pair may
    /// differ from [`discover`](Self::discover). The returned hits are in
    /// candidate order.
    pub fn discover_parallel<D, F>(&self, open: F, device_type: u16) -> Result<DiscoveryResult>
    where
        D: DeviceControl,
        F: Fn() -> device::Result<D> + Sync,
    {
        self.check_ranges()?;
        let work = candidates(device_type, &self.ranges);
        let workers = self.workers.clamp(1, work.len().max(1));
        log::info!(
            "discovering device type 0x{device_type:04X} with {workers} workers ({} candidates)",
            work.len()
        );

        let shared = Shared {
            claimed: (0..=MAX_FUNCTION).map(|_| AtomicBool::new(false)).collect(),
            abort: AtomicBool::new(false),
            issued: AtomicUsize::new(0),
            started: Instant::now(),
            stopped: Mutex::new(None),
            fatal: Mutex::new(None),
            hits: Mutex::new(Vec::new()),
        };
        let (tx, rx) = mpsc::sync_channel::<Candidate>(workers * 4);
        let rx = Arc::new(Mutex::new(rx));

        std::thread::scope(|s| {
            for id in 0..workers {
                let rx = Arc::clone(&rx);
                let shared = &shared;
                let open = &open;
                s.spawn(move || self.worker(id, open, rx, shared));
            }
            // Workers hold the only receivers; once they all exit, send fails.
            drop(rx);
            for candidate in work {
                if shared.abort.load(Ordering::Relaxed) || tx.send(candidate).is_err() {
                    break;
                }
            }
            drop(tx);
        });

        let Shared {
            issued,
            started,
            stopped,
            fatal,
            hits,
            ..
        } = shared;
        let mut hits = hits.into_inner().unwrap_or_else(|e| e.into_inner());
        hits.sort_by_key(|&(index, _)| index);
        let result = DiscoveryResult {
            found: hits.into_iter().map(|(_, outcome)| outcome).collect(),
            probes_issued: issued.into_inner(),
            stopped: stopped.into_inner().unwrap_or_else(|e| e.into_inner()),
        };

        if let Some(source) = fatal.into_inner().unwrap_or_else(|e| e.into_inner()) {
            return Err(abort(source, result));
        }
        log_finished(&result, started);
        Ok(result)
    }

    fn worker<D, F>(&self, id: usize, open: &F, rx: Arc<Mutex<Receiver<Candidate>>>, shared: &Shared)
    where
        D: DeviceControl,
        F: Fn() -> device::Result<D>,
    {
        let dev = match open() {
            Ok(dev) => dev,
            Err(e) => {
                log::warn!("worker {id}: cannot open device: {e}");
                shared.fail(e);
                return;
            }
        };
        let mut scratch = Scratch::new(self.buffers);

        loop {
            if shared.abort.load(Ordering::Relaxed) {
                return;
            }
            let next = {
                let Ok(guard) = rx.lock() else { return };
                guard.recv()
            };
            // Closed and drained.
            let Ok(candidate) = next else { return };

            let claimed = &shared.claimed[candidate.function as usize];
            if claimed.load(Ordering::Acquire) {
                continue;
            }
            if let Some(reason) = self.should_stop(shared.started) {
                shared.stop(reason);
                return;
            }
            let outcome = match self.probe_with(&dev, candidate.code, &mut scratch) {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::warn!("worker {id}: {e}");
                    shared.fail(e);
                    return;
                }
            };
            shared.issued.fetch_add(1, Ordering::Relaxed);
            if !outcome.verdict().is_hit() {
                continue;
            }
            if claimed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if let Ok(mut hits) = shared.hits.lock() {
                    hits.push((candidate.index, outcome));
                }
            } else {
                log::trace!("worker {id}: dropping late hit {}", candidate.code);
            }
        }
    }
}

/// State shared by the parallel workers.
struct Shared {
    /// One flag per function value, set by the first recognized candidate.
    claimed: Vec<AtomicBool>,
    abort: AtomicBool,
    issued: AtomicUsize,
    started: Instant,
    stopped: Mutex<Option<StopReason>>,
    fatal: Mutex<Option<DeviceError>>,
    hits: Mutex<Vec<(usize, ProbeOutcome)>>,
}

impl Shared {
    /// Record the first fatal error and tell everyone to stop.
    fn fail(&self, e: DeviceError) {
        if let Ok(mut fatal) = self.fatal.lock() {
            fatal.get_or_insert(e);
        }
        self.abort.store(true, Ordering::Relaxed);
    }

    fn stop(&self, reason: StopReason) {
        if let Ok(mut stopped) = self.stopped.lock() {
            stopped.get_or_insert(reason);
        }
    }
}

fn abort(source: DeviceError, partial: DiscoveryResult) -> DiscoveryError {
    log::warn!(
        "scan aborted after {} probes: {source}",
        partial.probes_issued
    );
    DiscoveryError::Aborted { source, partial }
}

fn log_finished(result: &DiscoveryResult, started: Instant) {
    match result.stopped {
        Some(reason) => log::info!(
            "scan stopped ({reason}) after {} probes, {} found",
            result.probes_issued,
            result.found.len()
        ),
        None => log::info!(
            "scan finished: {} probes, {} found in {:.1?}",
            result.probes_issued,
            result.found.len(),
            started.elapsed()
        ),
    }
}

// ── Convenience wrappers with default settings ──

/// Probe one code with the default 16-byte input and 256-byte output buffers.
pub fn probe_one(dev: &impl DeviceControl, code: ControlCode) -> device::Result<ProbeOutcome> {
    Scanner::default().probe(dev, code)
}

pub fn scan_range(
    dev: &impl DeviceControl,
    start: ControlCode,
    end: ControlCode,
) -> Result<DiscoveryResult> {
    Scanner::default().scan_range(dev, start, end)
}

/// Targeted discovery over [`DEFAULT_RANGES`].
pub fn discover_by_device_type(
    dev: &impl DeviceControl,
    device_type: u16,
) -> Result<DiscoveryResult> {
    Scanner::default().discover(dev, device_type)
}
