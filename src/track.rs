use crate::all::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrackId(pub usize);

impl fmt::Display for TrackId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

// One followed target. The health counter accumulates unreliability signals
// and never decreases; the track manager drops the track once it reaches the
// kill threshold.
#[derive(Clone, Debug)]
pub struct Track {
  pub id: TrackId,
  // Pixels.
  position: Vector2d,
  health: u32,
}

impl Track {
  pub fn new(id: TrackId, position: Vector2d) -> Track {
    Track {
      id,
      position,
      health: 0,
    }
  }

  pub fn position(&self) -> Vector2d {
    self.position
  }

  pub fn health(&self) -> u32 {
    self.health
  }

  // Moves the track to where the motion estimator finds its point in `frame1`.
  pub fn advance(
    &mut self,
    motion: &mut dyn MotionEstimator,
    frame0: &Frame,
    frame1: &Frame,
    lk: &LkParameters,
    max_tracker_error: f64,
  ) -> FlowResult {
    let result = motion.track(frame0, frame1, self.position, lk);
    let old_position = self.position;
    self.position = result.point;

    // A point that does not move has latched onto a static feature.
    if (result.point - old_position).norm() == 0. {
      self.mark_unhealthy();
    }
    if !result.success && result.error > max_tracker_error {
      self.mark_unhealthy();
    }
    result
  }

  // Strictly closer than `short_distance`.
  pub fn is_near(&self, point: Vector2d, short_distance: f64) -> bool {
    (self.position - point).norm() < short_distance
  }

  pub fn mark_unhealthy(&mut self) {
    self.health = self.health.saturating_add(1);
  }
}

#[cfg(test)]
pub struct ScriptedMotion {
  pub results: VecDeque<FlowResult>,
}

#[cfg(test)]
impl MotionEstimator for ScriptedMotion {
  fn track(&mut self, _: &Frame, _: &Frame, point: Vector2d, _: &LkParameters) -> FlowResult {
    self.results.pop_front().unwrap_or(FlowResult { point, success: true, error: 0. })
  }
}

#[cfg(test)]
pub fn blank_frame() -> Frame {
  Frame::new(Image::new(4, 4), None, 0)
}
