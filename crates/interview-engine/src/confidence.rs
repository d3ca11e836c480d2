//! Confidence scoring from facial landmarks.
//!
//! A face-mesh detector produces one [`LandmarkFrame`] per video frame. The
//! [`ConfidencePipeline`] turns accepted frames into a 0-100 score built from
//! three sub-metrics:
//!
//! | metric | landmarks | normalization |
//! |---|---|---|
//! | eye aperture | 159/145 (left), 386/374 (right) | / 30 |
//! | mouth aperture | 13/14 | / 40 |
//! | head pose | 33, 263 (eye corners), 1 (nose tip) | already 0..1 |
//!
//! weighted 0.3 / 0.3 / 0.4. It is a heuristic composure proxy, nothing more.
//!
//! Output is rate-limited to one sample per sample interval (100 ms by
//! default). When no face is detected the last value is held rather than
//! dropped to zero.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::config::ConfidenceConfig;
use crate::error::Result;
use crate::websocket::{EventBroadcaster, SessionEvent};

/// Upper lid of the left eye.
pub const LEFT_EYE_UPPER: usize = 159;
/// Lower lid of the left eye.
pub const LEFT_EYE_LOWER: usize = 145;
/// Upper lid of the right eye.
pub const RIGHT_EYE_UPPER: usize = 386;
/// Lower lid of the right eye.
pub const RIGHT_EYE_LOWER: usize = 374;
/// Inner upper lip.
pub const UPPER_LIP: usize = 13;
/// Inner lower lip.
pub const LOWER_LIP: usize = 14;
/// Outer corner of the left eye.
pub const LEFT_EYE_CORNER: usize = 33;
/// Outer corner of the right eye.
pub const RIGHT_EYE_CORNER: usize = 263;
/// Tip of the nose.
pub const NOSE_TIP: usize = 1;

const EYE_DIVISOR: f64 = 30.0;
const MOUTH_DIVISOR: f64 = 40.0;

const EYE_WEIGHT: f64 = 0.3;
const MOUTH_WEIGHT: f64 = 0.3;
const POSE_WEIGHT: f64 = 0.4;

/// Default minimum spacing between emitted samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Landmarks
// ============================================================================

/// A 2D landmark in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl Landmark {
    /// Creates a landmark.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One detector output: landmarks indexed by face-mesh label.
///
/// Serialized as an array where missing points are `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkFrame {
    points: Vec<Option<Landmark>>,
}

impl LandmarkFrame {
    /// Creates a frame from a dense list of points.
    #[must_use]
    pub fn new(points: Vec<Landmark>) -> Self {
        Self {
            points: points.into_iter().map(Some).collect(),
        }
    }

    /// Creates a frame holding only the given `(index, point)` pairs.
    #[must_use]
    pub fn sparse(points: impl IntoIterator<Item = (usize, Landmark)>) -> Self {
        let mut frame = Self::default();
        for (index, point) in points {
            if frame.points.len() <= index {
                frame.points.resize(index + 1, None);
            }
            frame.points[index] = Some(point);
        }
        frame
    }

    /// Returns the landmark at `index`, if present and finite.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.points
            .get(index)
            .copied()
            .flatten()
            .filter(|p| p.x.is_finite() && p.y.is_finite())
    }

    /// Returns the number of slots in the frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the frame holds no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Mean vertical lid distance of both eyes; 0 if any lid point is missing.
#[must_use]
pub fn eye_aperture(frame: &LandmarkFrame) -> f64 {
    let (Some(lu), Some(ll), Some(ru), Some(rl)) = (
        frame.get(LEFT_EYE_UPPER),
        frame.get(LEFT_EYE_LOWER),
        frame.get(RIGHT_EYE_UPPER),
        frame.get(RIGHT_EYE_LOWER),
    ) else {
        return 0.0;
    };
    ((lu.y - ll.y).abs() + (ru.y - rl.y).abs()) / 2.0
}

/// Vertical lip distance; 0 if either lip point is missing.
#[must_use]
pub fn mouth_aperture(frame: &LandmarkFrame) -> f64 {
    match (frame.get(UPPER_LIP), frame.get(LOWER_LIP)) {
        (Some(upper), Some(lower)) => (upper.y - lower.y).abs(),
        _ => 0.0,
    }
}

/// How centered the nose is between the eyes, in `0.0..=1.0`.
///
/// The horizontal nose offset is divided by the inter-eye distance, so the
/// metric does not depend on distance from the camera. Returns 0 if a point
/// is missing or the eyes coincide.
#[must_use]
pub fn head_pose(frame: &LandmarkFrame) -> f64 {
    let (Some(left), Some(right), Some(nose)) = (
        frame.get(LEFT_EYE_CORNER),
        frame.get(RIGHT_EYE_CORNER),
        frame.get(NOSE_TIP),
    ) else {
        return 0.0;
    };

    let eye_distance = (right.x - left.x).hypot(right.y - left.y);
    if eye_distance <= f64::EPSILON {
        return 0.0;
    }

    let offset = ((left.x + right.x) / 2.0 - nose.x).abs();
    (1.0 - (offset / eye_distance).min(1.0)).clamp(0.0, 1.0)
}

/// Combines the three metrics into a score in `0..=100`.
#[must_use]
pub fn score_frame(frame: &LandmarkFrame) -> u8 {
    let eye = (eye_aperture(frame) / EYE_DIVISOR).clamp(0.0, 1.0);
    let mouth = (mouth_aperture(frame) / MOUTH_DIVISOR).clamp(0.0, 1.0);
    let pose = head_pose(frame);

    let combined = (EYE_WEIGHT * eye + MOUTH_WEIGHT * mouth + POSE_WEIGHT * pose) * 100.0;
    if !combined.is_finite() {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let value = combined.round().clamp(0.0, 100.0) as u8;
    value
}

// ============================================================================
// Pipeline
// ============================================================================

/// An emitted confidence value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceSample {
    /// Score in `0..=100`.
    pub value: u8,
    /// Milliseconds since the feed started.
    pub timestamp_ms: u64,
}

impl ConfidenceSample {
    /// Coaching band of this sample's value.
    #[must_use]
    pub const fn band(&self) -> ConfidenceBand {
        ConfidenceBand::from_value(self.value)
    }
}

/// Coarse reading of a confidence value shown next to the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    /// Below 30.
    Low,
    /// 30 up to 70.
    Steady,
    /// 70 and above.
    High,
}

impl ConfidenceBand {
    /// Classifies a `0..=100` confidence value.
    #[must_use]
    pub const fn from_value(value: u8) -> Self {
        match value {
            0..=29 => Self::Low,
            30..=69 => Self::Steady,
            _ => Self::High,
        }
    }

    /// Encouragement shown to the candidate.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Low => "Take deep breaths and stay calm",
            Self::Steady => "You're doing well",
            Self::High => "Excellent presence!",
        }
    }
}

impl std::fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Rate-limited landmark scorer.
#[derive(Debug, Clone)]
pub struct ConfidencePipeline {
    sample_interval: Duration,
    last_emitted: Option<Duration>,
    latest: u8,
}

impl Default for ConfidencePipeline {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL)
    }
}

impl ConfidencePipeline {
    /// Creates a pipeline emitting at most once per `sample_interval`.
    #[must_use]
    pub const fn new(sample_interval: Duration) -> Self {
        Self {
            sample_interval,
            last_emitted: None,
            latest: 0,
        }
    }

    /// Processes one frame.
    ///
    /// `frame` is `None` when no face was detected. Returns `None` when the
    /// frame is rate-limited or faceless; the held value is unchanged.
    pub fn on_frame(
        &mut self,
        frame: Option<&LandmarkFrame>,
        timestamp: Duration,
    ) -> Option<ConfidenceSample> {
        let frame = frame?;

        if let Some(last) = self.last_emitted {
            if timestamp.saturating_sub(last) < self.sample_interval {
                return None;
            }
        }

        let value = score_frame(frame);
        self.latest = value;
        self.last_emitted = Some(timestamp);
        trace!(value, "Confidence sample");

        Some(ConfidenceSample {
            value,
            timestamp_ms: u64::try_from(timestamp.as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Returns the most recently emitted value (0 before the first).
    #[must_use]
    pub const fn latest(&self) -> u8 {
        self.latest
    }
}

// ============================================================================
// Feed
// ============================================================================

/// Shared entry point for landmark frames.
///
/// Wraps a [`ConfidencePipeline`] with a clock and publishes accepted samples
/// on a `watch` channel and, optionally, as `confidence` events.
#[derive(Debug)]
pub struct ConfidenceFeed {
    pipeline: Mutex<ConfidencePipeline>,
    samples: watch::Sender<ConfidenceSample>,
    origin: Instant,
    events: Option<EventBroadcaster>,
}

impl Default for ConfidenceFeed {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL)
    }
}

impl ConfidenceFeed {
    /// Creates a feed with the given sample interval.
    #[must_use]
    pub fn new(sample_interval: Duration) -> Self {
        let (samples, _) = watch::channel(ConfidenceSample::default());
        Self {
            pipeline: Mutex::new(ConfidencePipeline::new(sample_interval)),
            samples,
            origin: Instant::now(),
            events: None,
        }
    }

    /// Creates a feed from configuration.
    #[must_use]
    pub fn from_config(config: &ConfidenceConfig) -> Self {
        Self::new(Duration::from_millis(config.sample_interval_ms))
    }

    /// Also publishes accepted samples to `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventBroadcaster) -> Self {
        self.events = Some(events);
        self
    }

    /// Scores a frame timestamped with the feed's clock.
    pub fn submit(&self, frame: Option<&LandmarkFrame>) -> Option<ConfidenceSample> {
        self.submit_at(frame, self.origin.elapsed())
    }

    /// Scores a frame at an explicit timestamp.
    pub fn submit_at(
        &self,
        frame: Option<&LandmarkFrame>,
        timestamp: Duration,
    ) -> Option<ConfidenceSample> {
        let sample = self
            .pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_frame(frame, timestamp)?;

        self.samples.send_replace(sample);
        if let Some(events) = &self.events {
            events.send(SessionEvent::Confidence(sample));
        }
        Some(sample)
    }

    /// Returns the latest sample (value 0 before the first).
    #[must_use]
    pub fn latest(&self) -> ConfidenceSample {
        *self.samples.borrow()
    }

    /// Subscribes to accepted samples.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConfidenceSample> {
        self.samples.subscribe()
    }
}

// ============================================================================
// Sampler
// ============================================================================

/// Supplies landmark frames from a camera and detector.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Captures and analyzes one frame.
    ///
    /// `Ok(None)` means no face was found. Errors are `EngineError::Detection`.
    async fn capture_frame(&self) -> Result<Option<LandmarkFrame>>;
}

/// Polls a [`FrameSource`] once per frame interval while enabled.
pub struct ConfidenceSampler {
    feed: Arc<ConfidenceFeed>,
    source: Arc<dyn FrameSource>,
    frame_interval: Duration,
    enabled: watch::Receiver<bool>,
}

impl std::fmt::Debug for ConfidenceSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfidenceSampler")
            .field("frame_interval", &self.frame_interval)
            .field("enabled", &*self.enabled.borrow())
            .finish_non_exhaustive()
    }
}

impl ConfidenceSampler {
    /// Creates a sampler. Sampling runs while `enabled` holds `true`; the
    /// loop exits once the toggle's sender is dropped.
    #[must_use]
    pub fn new(
        feed: Arc<ConfidenceFeed>,
        source: Arc<dyn FrameSource>,
        frame_interval: Duration,
        enabled: watch::Receiver<bool>,
    ) -> Self {
        Self {
            feed,
            source,
            frame_interval,
            enabled,
        }
    }

    /// Creates a sampler polling at the configured frame interval.
    #[must_use]
    pub fn from_config(
        feed: Arc<ConfidenceFeed>,
        source: Arc<dyn FrameSource>,
        config: &ConfidenceConfig,
        enabled: watch::Receiver<bool>,
    ) -> Self {
        Self::new(
            feed,
            source,
            Duration::from_millis(config.frame_interval_ms),
            enabled,
        )
    }

    /// Runs the sampling loop until the toggle is dropped.
    pub async fn run(mut self) {
        let mut ticker = interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frames = 0u64;

        loop {
            if !*self.enabled.borrow_and_update() {
                debug!(frames, "Confidence sampling paused");
                if self.enabled.changed().await.is_err() {
                    break;
                }
                ticker.reset();
                continue;
            }

            tokio::select! {
                changed = self.enabled.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    frames += 1;
                    self.sample_once().await;
                }
            }
        }

        info!(frames, "Confidence sampler stopped");
    }

    async fn sample_once(&self) {
        let result = self.source.capture_frame().await;

        if !*self.enabled.borrow() {
            trace!("Dropping detection that finished after sampling was disabled");
            return;
        }

        match result {
            Ok(frame) => {
                self.feed.submit(frame.as_ref());
            }
            Err(e) => debug!(error = %e, "Skipping frame"),
        }
    }
}
