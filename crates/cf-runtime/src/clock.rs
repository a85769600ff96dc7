//! Clock devices and the shared clock handle.
//!
//! A [`ClockDevice`] is the hardware (or virtual) timer that paces the
//! scheduling loop and may bundle sensor samples with each timestamp. A
//! [`Clock`] wraps one device together with its period and time origin and is
//! cheap to clone. Only one device session is active per process when clocks
//! are obtained through [`Clock::acquire`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::{Duration, Instant};

use cf_controls::{Block, Capabilities, ControlResult, SignalValue};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// Period used when none is configured (100 Hz).
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(10);

/// Flag that wakes a sleeper as soon as it is raised.
#[derive(Debug, Default)]
pub struct Interrupt {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every waiter.
    pub fn raise(&self) {
        *self.raised.lock() = true;
        self.cond.notify_all();
    }

    pub fn clear(&self) {
        *self.raised.lock() = false;
    }

    pub fn is_raised(&self) -> bool {
        *self.raised.lock()
    }

    /// Wait at most `timeout` for the flag. Returns whether it is raised; may
    /// return early and unraised on a spurious wakeup.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut raised = self.raised.lock();
        if !*raised {
            self.cond.wait_for(&mut raised, timeout);
        }
        *raised
    }
}

/// Timer hardware driving a [`Clock`].
pub trait ClockDevice: Send + Sync + fmt::Debug {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    /// Block until `now() >= deadline`; return at once if already past.
    fn sleep_until(&self, deadline: Duration);

    /// Like [`sleep_until`](Self::sleep_until), but return early once
    /// `interrupt` is raised. Devices that cannot be woken just sleep.
    fn sleep_until_interruptible(&self, deadline: Duration, _interrupt: &Interrupt) {
        self.sleep_until(deadline)
    }

    /// Reprogram the sample-rate generator.
    fn configure(&self, _period: Duration) -> ControlResult<()> {
        Ok(())
    }

    /// Sensor values read together with the timestamp. May block.
    fn sample(&self) -> ControlResult<Vec<SignalValue>> {
        Ok(Vec::new())
    }

    /// Release the device.
    fn power_off(&self) {}
}

/// Monotonic OS clock.
#[derive(Debug)]
pub struct SystemClockDevice {
    origin: Instant,
}

impl SystemClockDevice {
    /// Device whose origin is the moment of creation.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockDevice for SystemClockDevice {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
    }

    fn sleep_until_interruptible(&self, deadline: Duration, interrupt: &Interrupt) {
        loop {
            let now = self.now();
            if now >= deadline || interrupt.wait_for(deadline - now) {
                return;
            }
        }
    }
}

/// Virtual clock for tests: time only moves when advanced, and sleeping
/// jumps straight to the deadline.
#[derive(Debug, Default)]
pub struct ManualClockDevice {
    now: Mutex<Duration>,
}

impl ManualClockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, now: Duration) {
        *self.now.lock() = now;
    }
}

impl ClockDevice for ManualClockDevice {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep_until(&self, deadline: Duration) {
        {
            let mut now = self.now.lock();
            if deadline > *now {
                *now = deadline;
            }
        }
        thread::yield_now();
    }
}

impl<D: ClockDevice + ?Sized> ClockDevice for Arc<D> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep_until(&self, deadline: Duration) {
        (**self).sleep_until(deadline)
    }

    fn sleep_until_interruptible(&self, deadline: Duration, interrupt: &Interrupt) {
        (**self).sleep_until_interruptible(deadline, interrupt)
    }

    fn configure(&self, period: Duration) -> ControlResult<()> {
        (**self).configure(period)
    }

    fn sample(&self) -> ControlResult<Vec<SignalValue>> {
        (**self).sample()
    }

    fn power_off(&self) {
        (**self).power_off()
    }
}

struct ClockInner {
    device: Box<dyn ClockDevice>,
    period: Mutex<Duration>,
    origin: Mutex<Duration>,
    running: AtomicBool,
    last_sample: Mutex<Vec<SignalValue>>,
}

impl Drop for ClockInner {
    fn drop(&mut self) {
        self.device.power_off();
        debug!("clock device powered off");
    }
}

static ACTIVE: OnceLock<Mutex<Weak<ClockInner>>> = OnceLock::new();

fn check_period(period: Duration) -> RuntimeResult<()> {
    if period.is_zero() {
        return Err(RuntimeError::Clock {
            what: "period must be positive".to_string(),
        });
    }
    Ok(())
}

/// Shared handle to a clock device.
#[derive(Clone)]
pub struct Clock {
    inner: Arc<ClockInner>,
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("device", &self.inner.device)
            .field("period", &self.period())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Clock {
    /// Open an independent clock on `device`.
    pub fn new(device: impl ClockDevice + 'static, period: Duration) -> RuntimeResult<Self> {
        check_period(period)?;
        device.configure(period)?;
        let origin = device.now();
        let first = device.sample()?;
        Ok(Self {
            inner: Arc::new(ClockInner {
                device: Box::new(device),
                period: Mutex::new(period),
                origin: Mutex::new(origin),
                running: AtomicBool::new(false),
                last_sample: Mutex::new(first),
            }),
        })
    }

    /// Obtain the process-wide system clock.
    pub fn acquire(period: Duration) -> RuntimeResult<Self> {
        Self::acquire_with(SystemClockDevice::new, period)
    }

    /// Obtain the process-wide clock, initialising it with `init` if no
    /// session is active. A second initialisation while one is active
    /// returns the active clock unchanged.
    pub fn acquire_with<D, F>(init: F, period: Duration) -> RuntimeResult<Self>
    where
        D: ClockDevice + 'static,
        F: FnOnce() -> D,
    {
        let slot = ACTIVE.get_or_init(|| Mutex::new(Weak::new()));
        let mut active = slot.lock();
        if let Some(inner) = active.upgrade() {
            warn!("clock device already initialised; reusing active session");
            return Ok(Self { inner });
        }
        let clock = Self::new(init(), period)?;
        *active = Arc::downgrade(&clock.inner);
        debug!(period_s = period.as_secs_f64(), "clock device initialised");
        Ok(clock)
    }

    /// Whether both handles share one device session.
    pub fn ptr_eq(&self, other: &Clock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current tick period.
    pub fn period(&self) -> Duration {
        *self.inner.period.lock()
    }

    /// Reprogram the device. The controller only calls this while stopped.
    pub fn set_period(&self, period: Duration) -> RuntimeResult<()> {
        check_period(period)?;
        self.inner.device.configure(period)?;
        *self.inner.period.lock() = period;
        Ok(())
    }

    /// Raw device time, used for deadlines.
    pub fn device_now(&self) -> Duration {
        self.inner.device.now()
    }

    /// Seconds since the last reset.
    pub fn time(&self) -> f64 {
        let origin = *self.inner.origin.lock();
        self.device_now().saturating_sub(origin).as_secs_f64()
    }

    /// Restart `time()` from zero.
    pub fn reset(&self) {
        *self.inner.origin.lock() = self.device_now();
    }

    /// Block until device time reaches `deadline`.
    pub fn sleep_until(&self, deadline: Duration) {
        self.inner.device.sleep_until(deadline);
    }

    /// Block until device time reaches `deadline` or `interrupt` is raised.
    pub fn sleep_until_interruptible(&self, deadline: Duration, interrupt: &Interrupt) {
        self.inner.device.sleep_until_interruptible(deadline, interrupt);
    }

    /// Whether a controller's scheduling thread is driving this clock.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.inner.running.store(running, Ordering::Release);
    }

    /// Latest sensor sample. The device is only read while the owning
    /// controller is running; otherwise the cached sample is returned.
    pub fn sample(&self) -> ControlResult<Vec<SignalValue>> {
        if !self.is_running() {
            return Ok(self.inner.last_sample.lock().clone());
        }
        let sample = self.inner.device.sample()?;
        *self.inner.last_sample.lock() = sample.clone();
        Ok(sample)
    }

    /// Source block publishing this clock's time (and sample).
    pub fn source(&self) -> ClockSource {
        ClockSource {
            clock: self.clone(),
        }
    }
}

/// Source block reading a [`Clock`]: outputs `time` followed by the
/// device's sample values.
#[derive(Debug, Clone)]
pub struct ClockSource {
    clock: Clock,
}

impl Block for ClockSource {
    fn type_name(&self) -> &'static str {
        "Clock"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::SOURCE
    }

    fn read(&mut self) -> ControlResult<Vec<SignalValue>> {
        let mut out = vec![SignalValue::scalar(self.clock.time())];
        out.extend(self.clock.sample()?);
        Ok(out)
    }

    fn reset(&mut self) {
        self.clock.reset();
    }
}
