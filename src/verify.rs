//! Determinism Verification
//!
//! Records the raw fixed-point state of every body each frame and compares
//! recordings bit for bit. Two runs with identical inputs must produce
//! identical logs on every platform and thread count.
//!
//! # Features
//!
//! - **Snapshots**: raw `i64` of position, orientation and velocities
//! - **Logs**: JSON persistence, comparison and replay against a fresh space
//! - **State hashing**: SHA-256 over the little-endian raws, sampled by
//!   [`HashTrace`] every N steps for cheap cross-machine checks
//!
//! # Example
//!
//! ```
//! use fixstep::verify::{state_hash, DeterminismLog};
//! use fixstep::scenario;
//!
//! let mut space = scenario::pyramid(3);
//! let mut log = DeterminismLog::new(space.config().time_step);
//! for _ in 0..10 {
//!     space.update();
//!     log.record(&space);
//! }
//! let mut fresh = scenario::pyramid(3);
//! assert!(log.replay(&mut fresh).is_ok());
//! assert_eq!(state_hash(&space), state_hash(&fresh));
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::Result;
use crate::fixed::Fix64;
use crate::math::{QuatFix, Vec3Fix};
use crate::space::Space;

// ============================================================================
// Snapshots
// ============================================================================

#[inline]
fn raw3(v: Vec3Fix) -> [i64; 3] {
    [v.x.raw(), v.y.raw(), v.z.raw()]
}

#[inline]
fn raw4(q: QuatFix) -> [i64; 4] {
    [q.x.raw(), q.y.raw(), q.z.raw(), q.w.raw()]
}

/// Raw state of one body
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodySnapshot {
    /// Arena slot
    pub slot: u32,
    pub position: [i64; 3],
    /// `[x, y, z, w]`
    pub orientation: [i64; 4],
    pub linear_velocity: [i64; 3],
    pub angular_velocity: [i64; 3],
}

impl BodySnapshot {
    /// Named components in comparison order
    fn fields(&self) -> [(&'static str, &[i64]); 4] {
        [
            ("position", &self.position),
            ("orientation", &self.orientation),
            ("linear_velocity", &self.linear_velocity),
            ("angular_velocity", &self.angular_velocity),
        ]
    }
}

/// Every live body after a step, in slot order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub frame: u64,
    pub bodies: Vec<BodySnapshot>,
}

impl FrameSnapshot {
    pub fn capture(space: &Space) -> Self {
        let bodies = space
            .bodies()
            .map(|(handle, body)| BodySnapshot {
                slot: handle.index(),
                position: raw3(body.position),
                orientation: raw4(body.orientation),
                linear_velocity: raw3(body.linear_velocity),
                angular_velocity: raw3(body.angular_velocity),
            })
            .collect();
        Self {
            frame: space.frame(),
            bodies,
        }
    }

    /// First difference against `actual`
    pub fn compare(&self, actual: &FrameSnapshot) -> Option<Divergence> {
        if self.bodies.len() != actual.bodies.len() {
            return Some(Divergence::BodyCount {
                frame: self.frame,
                expected: self.bodies.len(),
                actual: actual.bodies.len(),
            });
        }
        for (e, a) in self.bodies.iter().zip(&actual.bodies) {
            if e.slot != a.slot {
                return Some(Divergence::BodyCount {
                    frame: self.frame,
                    expected: self.bodies.len(),
                    actual: actual.bodies.len(),
                });
            }
            for ((field, ev), (_, av)) in e.fields().into_iter().zip(a.fields()) {
                if let Some(component) = ev.iter().zip(av).position(|(x, y)| x != y) {
                    return Some(Divergence::Field {
                        frame: self.frame,
                        body: e.slot,
                        field,
                        component,
                        expected: ev[component],
                        actual: av[component],
                    });
                }
            }
        }
        None
    }
}

// ============================================================================
// Divergence
// ============================================================================

/// First mismatch between two recordings
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Divergence {
    /// A state component differs
    #[error("frame {frame}: body {body} {field}[{component}] expected raw {expected}, got {actual}")]
    Field {
        frame: u64,
        /// Slot of the body
        body: u32,
        field: &'static str,
        /// Component index (`x, y, z[, w]`)
        component: usize,
        expected: i64,
        actual: i64,
    },

    /// Different live bodies
    #[error("frame {frame}: expected {expected} bodies, got {actual}")]
    BodyCount { frame: u64, expected: usize, actual: usize },

    /// Recordings of different lengths
    #[error("expected {expected} frames, got {actual}")]
    FrameCount { expected: usize, actual: usize },
}

// ============================================================================
// Log
// ============================================================================

/// Per-frame recording of a simulation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterminismLog {
    /// Step length the recording was made with
    pub time_step: Fix64,
    frames: Vec<FrameSnapshot>,
}

impl DeterminismLog {
    pub fn new(time_step: Fix64) -> Self {
        Self {
            time_step,
            frames: Vec::new(),
        }
    }

    /// Append the current state of `space`
    pub fn record(&mut self, space: &Space) {
        self.frames.push(FrameSnapshot::capture(space));
    }

    #[inline]
    pub fn frames(&self) -> &[FrameSnapshot] {
        &self.frames
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Write the log as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.to_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    /// First divergence of `other` from this log
    pub fn compare(&self, other: &DeterminismLog) -> Option<Divergence> {
        let divergence = if self.frames.len() != other.frames.len() {
            Some(Divergence::FrameCount {
                expected: self.frames.len(),
                actual: other.frames.len(),
            })
        } else {
            self.frames.iter().zip(&other.frames).find_map(|(e, a)| e.compare(a))
        };
        if let Some(d) = &divergence {
            warn!("determinism check failed: {d}");
        }
        divergence
    }

    /// Step `space` up to every recorded frame and compare.
    ///
    /// `space` must start in the state the recording started from.
    pub fn replay(&self, space: &mut Space) -> std::result::Result<(), Divergence> {
        for expected in &self.frames {
            while space.frame() < expected.frame {
                space.step(self.time_step);
            }
            if let Some(d) = expected.compare(&FrameSnapshot::capture(space)) {
                warn!("replay diverged: {d}");
                return Err(d);
            }
        }
        Ok(())
    }
}

// ============================================================================
// State Hash
// ============================================================================

/// SHA-256 digest of a space's body state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateHash(pub [u8; 32]);

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Hash every live body's raw state in slot order
pub fn state_hash(space: &Space) -> StateHash {
    let mut hasher = Sha256::new();
    for (handle, body) in space.bodies() {
        hasher.update(handle.index().to_le_bytes());
        let values = raw3(body.position)
            .into_iter()
            .chain(raw4(body.orientation))
            .chain(raw3(body.linear_velocity))
            .chain(raw3(body.angular_velocity));
        for v in values {
            hasher.update(v.to_le_bytes());
        }
    }
    StateHash(hasher.finalize().into())
}

/// State hashes sampled every `interval` frames
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashTrace {
    interval: u64,
    hashes: Vec<(u64, StateHash)>,
}

impl HashTrace {
    /// `interval` of zero is treated as one
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            hashes: Vec::new(),
        }
    }

    /// Record a hash if the space's frame falls on the interval
    pub fn observe(&mut self, space: &Space) {
        if space.frame() % self.interval == 0 {
            self.hashes.push((space.frame(), state_hash(space)));
        }
    }

    #[inline]
    pub fn hashes(&self) -> &[(u64, StateHash)] {
        &self.hashes
    }

    /// Frame of the first differing sample, if any
    pub fn first_mismatch(&self, other: &HashTrace) -> Option<u64> {
        let mismatch = self
            .hashes
            .iter()
            .zip(&other.hashes)
            .find(|(a, b)| a != b)
            .map(|((frame, _), _)| *frame);
        mismatch.or_else(|| {
            let shared = self.hashes.len().min(other.hashes.len());
            let longer = if self.hashes.len() > shared { &self.hashes } else { &other.hashes };
            longer.get(shared).map(|(frame, _)| *frame)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario;

    fn run(frames: usize) -> (Space, DeterminismLog) {
        let mut space = scenario::pyramid(4);
        let mut log = DeterminismLog::new(space.config().time_step);
        for _ in 0..frames {
            space.update();
            log.record(&space);
        }
        (space, log)
    }

    #[test]
    fn test_identical_runs_match() {
        let (space_a, log_a) = run(30);
        let (space_b, log_b) = run(30);
        assert_eq!(log_a.compare(&log_b), None);
        assert_eq!(state_hash(&space_a), state_hash(&space_b), "same inputs, same hash");
    }

    #[test]
    fn test_perturbed_run_reports_first_field() {
        let (_, log_a) = run(5);
        let mut space = scenario::pyramid(4);
        let mut log_b = DeterminismLog::new(space.config().time_step);
        let (handle, _) = space.bodies().nth(3).expect("a box");
        let velocity = Vec3Fix::new(Fix64::from_ratio(1, 1000), Fix64::ZERO, Fix64::ZERO);
        space.set_linear_velocity(handle, velocity).expect("live body");
        for _ in 0..5 {
            space.update();
            log_b.record(&space);
        }
        match log_a.compare(&log_b) {
            Some(Divergence::Field { frame, .. }) => assert_eq!(frame, 1, "diverges on the first frame"),
            other => panic!("expected a field divergence, got {other:?}"),
        }
    }

    #[test]
    fn test_frame_count_divergence() {
        let (_, long) = run(4);
        let (_, short) = run(3);
        assert_eq!(long.compare(&short), Some(Divergence::FrameCount { expected: 4, actual: 3 }));
    }

    #[test]
    fn test_replay_fresh_space() {
        let (_, log) = run(20);
        let mut fresh = scenario::pyramid(4);
        assert_eq!(log.replay(&mut fresh), Ok(()));
        assert_eq!(fresh.frame(), 20);

        let mut other = scenario::pyramid(5);
        assert!(matches!(log.replay(&mut other), Err(Divergence::BodyCount { .. })));
    }

    #[test]
    fn test_log_json_round_trip() {
        let (_, log) = run(3);
        let mut buffer = Vec::new();
        log.to_writer(&mut buffer).expect("write");
        let back = DeterminismLog::from_reader(buffer.as_slice()).expect("read");
        assert_eq!(back, log);

        let path = std::env::temp_dir().join(format!("fixstep-log-{}.json", std::process::id()));
        log.save(&path).expect("save");
        let loaded = DeterminismLog::load(&path).expect("load");
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, log);
    }

    #[test]
    fn test_hash_trace_interval() {
        let mut space = scenario::pyramid(3);
        let mut trace = HashTrace::new(5);
        for _ in 0..20 {
            space.update();
            trace.observe(&space);
        }
        let frames: Vec<u64> = trace.hashes().iter().map(|(f, _)| *f).collect();
        assert_eq!(frames, vec![5, 10, 15, 20]);
        assert_eq!(trace.first_mismatch(&trace.clone()), None);
        assert_eq!(state_hash(&space).to_string().len(), 64, "hex digest");
    }
}
