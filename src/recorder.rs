//! The paced capture loop.
//!
//! Drives grab → convert → write at a fixed target rate on a dedicated
//! thread, polling a stop token once per iteration. The writer is
//! consumed by the loop and finalized exactly once on every exit path.

use crate::capture::{CaptureError, FrameSource, MonitorSource, StopHandle};
use crate::encoder::{self, EncoderError, FrameSink, VideoEncoder};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long to yield when the next frame is not yet due. Bounds CPU use
/// without busy-spinning; also bounds stop-signal latency while idle.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Fatal recording errors surfaced to the controlling context.
///
/// Transient per-frame capture failures are not represented here; the
/// loop logs and skips them.
#[derive(Debug)]
pub enum RecorderError {
    /// No capturable surface; the loop never started
    CaptureInit(CaptureError),
    /// The output sink could not be opened; the loop never started
    WriterInit(EncoderError),
    /// The sink rejected a frame mid-recording
    Write(EncoderError),
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderError::CaptureInit(e) => write!(f, "capture initialization failed: {}", e),
            RecorderError::WriterInit(e) => write!(f, "writer initialization failed: {}", e),
            RecorderError::Write(e) => write!(f, "recording aborted: {}", e),
        }
    }
}

impl std::error::Error for RecorderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecorderError::CaptureInit(e) => Some(e),
            RecorderError::WriterInit(e) | RecorderError::Write(e) => Some(e),
        }
    }
}

/// Lifecycle of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Resolving the monitor and opening the writer
    Initializing,
    /// The loop is running
    Capturing,
    /// Stop observed (or fatal error); finalizing the writer
    Stopping,
    /// Writer released; terminal
    Closed,
}

/// Shared, atomically updated view of the loop state.
#[derive(Clone)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(0)))
    }

    fn set(&self, state: RecorderState) {
        let v = match state {
            RecorderState::Initializing => 0,
            RecorderState::Capturing => 1,
            RecorderState::Stopping => 2,
            RecorderState::Closed => 3,
        };
        self.0.store(v, Ordering::Release);
    }

    pub fn get(&self) -> RecorderState {
        match self.0.load(Ordering::Acquire) {
            0 => RecorderState::Initializing,
            1 => RecorderState::Capturing,
            2 => RecorderState::Stopping,
            _ => RecorderState::Closed,
        }
    }
}

/// Scheduling state for the fixed-rate loop. Owned by the loop thread.
pub struct PacingState {
    target_interval: Duration,
    next_deadline: Instant,
}

impl PacingState {
    /// `fps` must be positive; callers validate it at the CLI/config
    /// boundary.
    pub fn new(fps: u32, now: Instant) -> Self {
        debug_assert!(fps > 0);
        Self {
            target_interval: Duration::from_secs(1) / fps,
            next_deadline: now,
        }
    }

    pub fn target_interval(&self) -> Duration {
        self.target_interval
    }

    /// Whether a frame is due at `now`.
    pub fn frame_due(&self, now: Instant) -> bool {
        now >= self.next_deadline
    }

    /// Move the deadline one interval forward. If that leaves it more
    /// than one interval in the past, re-anchor pacing to the present:
    /// the frame just processed counts as the frame for `now`, and the
    /// next one is due a full interval out. A slow tick never turns
    /// into a burst of backlogged frames; recorded duration may
    /// undershoot wall clock under sustained overload, but frame
    /// spacing never compresses.
    pub fn advance(&mut self, now: Instant) {
        self.next_deadline += self.target_interval;
        if now.saturating_duration_since(self.next_deadline) > self.target_interval {
            self.next_deadline = now + self.target_interval;
        }
    }
}

/// Totals reported when a recording ends.
#[derive(Debug, Clone)]
pub struct RecordingSummary {
    /// Frames appended to the writer
    pub frames_written: u64,
    /// Ticks skipped due to transient capture failures
    pub frames_skipped: u64,
    /// Wall-clock time spent in the loop
    pub elapsed: Duration,
}

/// Run the paced loop until the stop token is set or a write fails.
///
/// The sink is consumed and finalized exactly once, on every exit path.
/// Frames reach the sink in strict capture order.
pub fn run_capture_loop<S, W>(
    mut source: S,
    mut sink: W,
    fps: u32,
    stop: StopHandle,
    state: StateCell,
) -> Result<RecordingSummary, RecorderError>
where
    S: FrameSource,
    W: FrameSink,
{
    state.set(RecorderState::Capturing);
    let started = Instant::now();
    let mut pacing = PacingState::new(fps, started);
    let mut frames_written = 0u64;
    let mut frames_skipped = 0u64;
    let mut fatal: Option<RecorderError> = None;

    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if !pacing.frame_due(now) {
            thread::sleep(IDLE_SLEEP);
            continue;
        }

        match source.grab() {
            Ok(raw) => {
                let frame = raw.into_rgb();
                if let Err(e) = sink.write_frame(&frame) {
                    tracing::error!("frame write failed, stopping recording: {}", e);
                    fatal = Some(RecorderError::Write(e));
                    break;
                }
                frames_written += 1;
            }
            Err(e) => {
                // One dropped frame should not end the recording.
                tracing::warn!("frame capture failed, skipping tick: {}", e);
                frames_skipped += 1;
            }
        }

        // Re-read the clock: grab + write may have eaten the budget,
        // and the resync decision must see the post-write present.
        pacing.advance(Instant::now());
    }

    state.set(RecorderState::Stopping);
    let finished = sink.finish();
    state.set(RecorderState::Closed);

    match fatal {
        Some(err) => {
            if let Err(e) = finished {
                tracing::error!("finalizing output after write failure also failed: {}", e);
            }
            Err(err)
        }
        None => {
            finished.map_err(RecorderError::Write)?;
            let elapsed = started.elapsed();
            tracing::info!(
                "recording complete: {:.1}s, {} frames ({} skipped)",
                elapsed.as_secs_f64(),
                frames_written,
                frames_skipped
            );
            Ok(RecordingSummary {
                frames_written,
                frames_skipped,
                elapsed,
            })
        }
    }
}

/// Handle to a recording running on its own thread.
pub struct RecordingHandle {
    stop: StopHandle,
    state: StateCell,
    output_path: PathBuf,
    thread: JoinHandle<Result<RecordingSummary, RecorderError>>,
}

impl RecordingHandle {
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn state(&self) -> RecorderState {
        self.state.get()
    }

    /// Raise the stop signal. Safe to call more than once; the loop
    /// honors it within one grab+write cycle plus the idle sleep.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Block until the loop thread exits and return its outcome.
    pub fn wait(self) -> Result<RecordingSummary, RecorderError> {
        self.thread.join().expect("capture loop thread panicked")
    }
}

/// Resolve the primary monitor, open the writer sized to it, and start
/// the capture loop on a dedicated thread.
pub fn start(fps: u32, output_dir: Option<PathBuf>) -> Result<RecordingHandle, RecorderError> {
    let state = StateCell::new();

    let (source, sink, output_path) = match open_session(fps, output_dir.as_deref()) {
        Ok(v) => v,
        Err(e) => {
            // Whatever was partially acquired is dropped on this path.
            state.set(RecorderState::Closed);
            return Err(e);
        }
    };

    let stop: StopHandle = Arc::new(AtomicBool::new(false));
    let thread = thread::spawn({
        let stop = Arc::clone(&stop);
        let state = state.clone();
        move || run_capture_loop(source, sink, fps, stop, state)
    });

    Ok(RecordingHandle {
        stop,
        state,
        output_path,
        thread,
    })
}

fn open_session(
    fps: u32,
    output_dir: Option<&Path>,
) -> Result<(MonitorSource, VideoEncoder, PathBuf), RecorderError> {
    let source = MonitorSource::primary().map_err(RecorderError::CaptureInit)?;
    let region = source.region();

    let output_path =
        encoder::generate_output_path(output_dir).map_err(RecorderError::WriterInit)?;
    let sink = VideoEncoder::open(&output_path, region.width, region.height, fps)
        .map_err(RecorderError::WriterInit)?;

    Ok((source, sink, output_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureRegion, Frame, RawFrame};
    use std::sync::Mutex;

    const WIDTH: u32 = 8;
    const HEIGHT: u32 = 4;

    /// Fake frame source with optional per-tick failure or delay.
    struct FakeSource {
        tick: u64,
        fail_on: Option<u64>,
        delay: Option<(u64, Duration)>,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                tick: 0,
                fail_on: None,
                delay: None,
            }
        }
    }

    impl FrameSource for FakeSource {
        fn region(&self) -> CaptureRegion {
            CaptureRegion {
                x: 0,
                y: 0,
                width: WIDTH,
                height: HEIGHT,
            }
        }

        fn grab(&mut self) -> Result<RawFrame, CaptureError> {
            let tick = self.tick;
            self.tick += 1;

            if let Some((at, delay)) = self.delay {
                if tick == at {
                    thread::sleep(delay);
                }
            }
            if self.fail_on == Some(tick) {
                return Err(CaptureError::Backend("injected".into()));
            }
            Ok(RawFrame {
                width: WIDTH,
                height: HEIGHT,
                data: vec![0; (WIDTH * HEIGHT * 4) as usize],
            })
        }
    }

    #[derive(Default)]
    struct SinkLog {
        writes: Vec<Instant>,
        closed: u32,
    }

    /// Fake sink recording write instants and close count.
    struct FakeSink {
        log: Arc<Mutex<SinkLog>>,
        fail_on_write: Option<usize>,
    }

    impl FakeSink {
        fn new() -> (Self, Arc<Mutex<SinkLog>>) {
            let log = Arc::new(Mutex::new(SinkLog::default()));
            (
                Self {
                    log: Arc::clone(&log),
                    fail_on_write: None,
                },
                log,
            )
        }
    }

    impl FrameSink for FakeSink {
        fn write_frame(&mut self, frame: &Frame) -> Result<(), EncoderError> {
            assert_eq!(frame.data.len(), (frame.width * frame.height * 3) as usize);
            let mut log = self.log.lock().unwrap();
            if self.fail_on_write == Some(log.writes.len()) {
                return Err(EncoderError::Write("injected".into()));
            }
            log.writes.push(Instant::now());
            Ok(())
        }

        fn finish(self) -> Result<(), EncoderError> {
            self.log.lock().unwrap().closed += 1;
            Ok(())
        }
    }

    fn run_for(
        source: FakeSource,
        sink: FakeSink,
        fps: u32,
        duration: Duration,
    ) -> Result<RecordingSummary, RecorderError> {
        let stop: StopHandle = Arc::new(AtomicBool::new(false));
        let state = StateCell::new();
        let handle = thread::spawn({
            let stop = Arc::clone(&stop);
            let state = state.clone();
            move || run_capture_loop(source, sink, fps, stop, state)
        });
        thread::sleep(duration);
        stop.store(true, Ordering::Relaxed);
        let result = handle.join().unwrap();
        assert_eq!(state.get(), RecorderState::Closed);
        result
    }

    #[test]
    fn test_nominal_rate_frame_count() {
        let (sink, log) = FakeSink::new();

        let summary = run_for(FakeSource::new(), sink, 10, Duration::from_secs(1)).unwrap();

        // ~1s at 10 fps: first frame fires immediately, then every 100ms.
        let writes = log.lock().unwrap().writes.len();
        assert!(
            (8..=12).contains(&writes),
            "expected ~10 frames, got {}",
            writes
        );
        assert_eq!(summary.frames_written as usize, writes);
        assert_eq!(summary.frames_skipped, 0);
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_stall_resyncs_without_burst() {
        let mut source = FakeSource::new();
        // One tick stalls for 4.8 intervals at 20 fps.
        source.delay = Some((3, Duration::from_millis(240)));
        let (sink, log) = FakeSink::new();

        run_for(source, sink, 20, Duration::from_millis(800)).unwrap();

        let log = log.lock().unwrap();
        let writes = &log.writes;
        assert!(writes.len() >= 5, "too few writes: {}", writes.len());
        // After the stall the deadline re-anchors to the present; no
        // catch-up burst, so consecutive writes never land closer than
        // half an interval.
        for pair in writes.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(
                gap >= Duration::from_millis(25),
                "burst detected: {:?} gap",
                gap
            );
        }
        // Time was dropped, not compensated: strictly fewer frames than
        // the naive 0.8s x 20fps estimate.
        assert!(writes.len() < 16, "got {} writes", writes.len());
        assert_eq!(log.closed, 1);
    }

    #[test]
    fn test_transient_capture_error_skips_one_tick() {
        let mut source = FakeSource::new();
        source.fail_on = Some(1);
        let (sink, log) = FakeSink::new();

        let summary = run_for(source, sink, 10, Duration::from_millis(550)).unwrap();

        // Tick 1 failed but ticks 2.. were still attempted on schedule.
        assert_eq!(summary.frames_skipped, 1);
        assert!(
            summary.frames_written >= 3,
            "loop did not continue after transient error"
        );
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_fatal_write_error_stops_and_closes_once() {
        let (mut sink, log) = FakeSink::new();
        sink.fail_on_write = Some(2);
        let stop: StopHandle = Arc::new(AtomicBool::new(false));
        let state = StateCell::new();

        // No external stop: the loop must end on its own.
        let result = run_capture_loop(FakeSource::new(), sink, 50, stop, state.clone());

        assert!(matches!(result, Err(RecorderError::Write(_))));
        assert_eq!(state.get(), RecorderState::Closed);
        let log = log.lock().unwrap();
        assert_eq!(log.writes.len(), 2);
        assert_eq!(log.closed, 1);
    }

    #[test]
    fn test_stop_signal_halts_promptly() {
        let (sink, log) = FakeSink::new();

        // 2 fps: only the immediate first frame fits in 80ms.
        let begin = Instant::now();
        let summary = run_for(FakeSource::new(), sink, 2, Duration::from_millis(80)).unwrap();
        let total = begin.elapsed();

        assert!(
            total < Duration::from_millis(400),
            "stop took {:?}",
            total
        );
        assert_eq!(summary.frames_written, 1);
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[test]
    fn test_preset_stop_writes_nothing() {
        let (sink, log) = FakeSink::new();
        let stop: StopHandle = Arc::new(AtomicBool::new(true));
        let state = StateCell::new();

        let summary =
            run_capture_loop(FakeSource::new(), sink, 10, stop, state.clone()).unwrap();

        assert_eq!(summary.frames_written, 0);
        assert_eq!(state.get(), RecorderState::Closed);
        let log = log.lock().unwrap();
        assert!(log.writes.is_empty());
        assert_eq!(log.closed, 1);
    }

    #[test]
    fn test_pacing_nominal_advance() {
        let base = Instant::now();
        let interval = Duration::from_millis(100);
        let mut pacing = PacingState::new(10, base);

        assert_eq!(pacing.target_interval(), interval);
        assert!(pacing.frame_due(base));

        pacing.advance(base);
        assert!(!pacing.frame_due(base + Duration::from_millis(50)));
        assert!(pacing.frame_due(base + interval));
    }

    #[test]
    fn test_pacing_resync_when_over_one_interval_behind() {
        let base = Instant::now();
        let mut pacing = PacingState::new(10, base);

        // The tick took 450ms: deadline would land 350ms in the past.
        let late = base + Duration::from_millis(450);
        pacing.advance(late);

        // Re-anchored: no backlog is burst out, the next frame is due a
        // full interval after the stalled one.
        assert!(!pacing.frame_due(late));
        assert!(!pacing.frame_due(late + Duration::from_millis(99)));
        assert!(pacing.frame_due(late + Duration::from_millis(100)));
    }

    #[test]
    fn test_pacing_no_resync_when_slightly_behind() {
        let base = Instant::now();
        let mut pacing = PacingState::new(10, base);

        // 50ms over budget is within one interval: keep the grid.
        pacing.advance(base + Duration::from_millis(150));
        assert!(pacing.frame_due(base + Duration::from_millis(100)));
    }
}
