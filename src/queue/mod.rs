//! Moving-average queues and the correction criteria.
//!
//! The vertical-difference and rotation queues are always written together,
//! so their write index, wrap flag and write count stay in lockstep.

use crate::config::Criteria;

/// Slots in each averaging queue.
pub const QUEUE_CAPACITY: usize = 200;

/// Statistics over the most recent entries of a queue.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AverageStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    /// Entries averaged.
    pub samples: usize,
}

/// Fixed-capacity circular buffer of samples.
#[derive(Clone, Debug)]
pub struct AverageQueue {
    slots: [f64; QUEUE_CAPACITY],
    index: usize,
    wrapped: bool,
    writes: usize,
}

impl Default for AverageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AverageQueue {
    pub fn new() -> Self {
        Self {
            slots: [0.0; QUEUE_CAPACITY],
            index: 0,
            wrapped: false,
            writes: 0,
        }
    }

    /// Empties the queue.
    pub fn clear(&mut self) {
        self.index = 0;
        self.wrapped = false;
        self.writes = 0;
    }

    /// Writes a sample, overwriting the oldest once full.
    pub fn push(&mut self, value: f64) {
        self.slots[self.index] = value;
        self.index += 1;
        if self.index >= QUEUE_CAPACITY {
            self.index = 0;
            self.wrapped = true;
        }
        self.writes += 1;
    }

    /// Total writes since the last clear.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Number of samples currently stored.
    pub fn len(&self) -> usize {
        if self.wrapped {
            QUEUE_CAPACITY
        } else {
            self.index
        }
    }

    /// Returns true if nothing has been written since the last clear.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Statistics over the most recent `width` samples.
    ///
    /// `width` is clamped to the capacity and, before the queue has wrapped,
    /// to the samples written so far. An empty window yields all zeros.
    pub fn average(&self, width: usize) -> AverageStats {
        let width = width.min(QUEUE_CAPACITY);
        let mut end = self.index;
        let mut start = end as isize - width as isize;
        if start < 0 {
            if self.wrapped {
                start += QUEUE_CAPACITY as isize;
                end += QUEUE_CAPACITY;
            } else {
                start = 0;
            }
        }
        let start = start as usize;
        if end <= start {
            return AverageStats::default();
        }

        let mut sum = 0.0;
        let mut sq_sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for i in start..end {
            let value = self.slots[i % QUEUE_CAPACITY];
            sum += value;
            sq_sum += value * value;
            min = min.min(value);
            max = max.max(value);
        }
        let n = (end - start) as f64;
        let mean = sum / n;
        let variance = (sq_sum / n - mean * mean).max(0.0);
        AverageStats {
            mean,
            min,
            max,
            std_dev: variance.sqrt(),
            samples: end - start,
        }
    }
}

/// Time-averaged drift: frame count plus vertical and rotation averages.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AverageDifference {
    /// Total gated frames written since the last reset.
    pub frame_count: usize,
    /// Averaged vertical difference, in pixels.
    pub vertical_difference: f64,
    /// Averaged rotation, in radians.
    pub rotation: f64,
    /// Standard deviation of the averaged vertical difference, in pixels.
    pub std_dev: f64,
}

impl AverageDifference {
    /// True if `criteria` call for a hardware correction.
    pub fn meets(&self, criteria: &Criteria) -> bool {
        let drifted = self.vertical_difference.abs() > criteria.difference
            || (criteria.rotation_correction && self.rotation.abs() > criteria.rotation);
        self.frame_count > criteria.frame_count && self.std_dev < criteria.deviation && drifted
    }
}

/// Paired vertical/rotation queues with the cached time average.
#[derive(Clone, Debug, Default)]
pub struct DriftAverager {
    difference: AverageQueue,
    rotation: AverageQueue,
    latest: AverageDifference,
}

impl DriftAverager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one gated frame and recomputes the average over `window` frames.
    pub fn push(&mut self, vertical_difference: f64, rotation: f64, window: usize) {
        self.difference.push(vertical_difference);
        self.rotation.push(rotation);
        let diff = self.difference.average(window);
        let rot = self.rotation.average(window);
        self.latest = AverageDifference {
            frame_count: self.difference.writes(),
            vertical_difference: diff.mean,
            rotation: rot.mean,
            std_dev: diff.std_dev,
        };
    }

    /// The average computed at the last push.
    pub fn latest(&self) -> AverageDifference {
        self.latest
    }

    /// Empties both queues and forgets the cached average.
    pub fn reset(&mut self) {
        self.difference.clear();
        self.rotation.clear();
        self.latest = AverageDifference::default();
    }

    /// The vertical-difference queue.
    pub fn difference_queue(&self) -> &AverageQueue {
        &self.difference
    }

    /// The rotation queue.
    pub fn rotation_queue(&self) -> &AverageQueue {
        &self.rotation
    }
}
