use crate::all::*;

// The algorithms the track manager coordinates. Any implementation can be
// swapped in without touching the manager.
pub struct Collaborators {
  pub segmenter: Box<dyn BackgroundSegmenter>,
  pub detector: Box<dyn FeatureDetector>,
  pub clustering: Box<dyn ClusteringEngine>,
  pub motion: Box<dyn MotionEstimator>,
}

impl Collaborators {
  pub fn new(p: &ParameterSet) -> Collaborators {
    Collaborators {
      segmenter: Box::new(KnnSegmenter::new(p.subtractor_history, p.subtractor_threshold)),
      detector: Box::new(Detector::new()),
      clustering: Box::new(SingleLinkage::new()),
      motion: Box::new(OpticalFlow::new()),
    }
  }
}

#[derive(Clone, Debug)]
pub struct TrackFlow {
  pub id: TrackId,
  pub old: Vector2d,
  pub new: Vector2d,
  pub success: bool,
  pub error: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClusterOutcome {
  TooSmall,
  AlreadyTracked,
  AtCapacity,
  Spawned(TrackId),
}

#[derive(Clone, Debug)]
pub struct Cluster {
  // Indices into `FrameReport::points`.
  pub members: Vec<usize>,
  // Axis-aligned bounding box corners, min and max.
  pub bounds: [Vector2d; 2],
  // Bounding box center, if the cluster is large enough to seed a track.
  pub candidate: Option<Vector2d>,
  pub outcome: ClusterOutcome,
}

// Everything that happened during one frame, for rendering and logging.
#[derive(Clone, Debug, Default)]
pub struct FrameReport {
  pub frame_number: usize,
  pub flows: Vec<TrackFlow>,
  pub points: Vec<Vector2d>,
  pub clusters: Vec<Cluster>,
  pub spawned: Vec<TrackId>,
  pub removed: Vec<TrackId>,
}

impl FrameReport {
  fn clear(&mut self, frame_number: usize) {
    self.frame_number = frame_number;
    self.flows.clear();
    self.points.clear();
    self.clusters.clear();
    self.spawned.clear();
    self.removed.clear();
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackerStats {
  pub frames: usize,
  pub spawned: usize,
  pub removed: usize,
}

// Owns the active tracks and runs the update, prune and spawn cycle once per
// frame.
pub struct TrackManager {
  parameters: ParameterSet,
  lk: LkParameters,
  collaborators: Collaborators,
  tracks: Vec<Track>,
  previous_frame: Option<Frame>,
  next_id: usize,
  stats: TrackerStats,
  report: FrameReport,
  // Workspace.
  unused_frame: Option<Frame>,
}

impl TrackManager {
  pub fn new(parameters: &ParameterSet, collaborators: Collaborators) -> Result<TrackManager> {
    parameters.validate()?;
    Ok(TrackManager {
      lk: parameters.lk_parameters(),
      parameters: parameters.clone(),
      collaborators,
      tracks: vec![],
      previous_frame: None,
      next_id: 0,
      stats: TrackerStats::default(),
      report: FrameReport::default(),
      unused_frame: None,
    })
  }

  pub fn tracks(&self) -> &[Track] {
    &self.tracks
  }

  pub fn report(&self) -> &FrameReport {
    &self.report
  }

  pub fn stats(&self) -> TrackerStats {
    self.stats
  }

  pub fn process(&mut self, image: Image) -> Result<&FrameReport> {
    let frame = Frame::new(image, self.unused_frame.take(), self.lk.max_level);
    self.report.clear(self.stats.frames);
    self.stats.frames += 1;

    self.update(&frame);
    self.prune();
    self.detect(&frame)?;
    self.spawn();
    debug!("Frame {}: {} points, {} clusters, {} tracks.",
      self.report.frame_number, self.report.points.len(), self.report.clusters.len(), self.tracks.len());

    // Keep the replaced frame around so its buffers can be reused.
    self.unused_frame = self.previous_frame.replace(frame);
    Ok(&self.report)
  }

  fn update(&mut self, frame: &Frame) {
    let previous_frame = match &self.previous_frame {
      Some(x) => x,
      None => return,
    };
    for track in &mut self.tracks {
      let old = track.position();
      let result = track.advance(
        self.collaborators.motion.as_mut(),
        previous_frame,
        frame,
        &self.lk,
        self.parameters.max_tracker_error,
      );
      self.report.flows.push(TrackFlow {
        id: track.id,
        old,
        new: result.point,
        success: result.success,
        error: result.error,
      });
    }
  }

  // Builds the new track list in one go rather than removing in place.
  fn prune(&mut self) {
    let max_kills = self.parameters.max_tracker_kills;
    let (kept, removed): (Vec<Track>, Vec<Track>) = mem::take(&mut self.tracks)
      .into_iter()
      .partition(|track| track.health() < max_kills);
    self.tracks = kept;
    for track in removed {
      info!("Removing track {} at ({:.1}, {:.1}), now tracking {} points.",
        track.id, track.position()[0], track.position()[1], self.tracks.len());
      self.report.removed.push(track.id);
      self.stats.removed += 1;
    }
  }

  fn detect(&mut self, frame: &Frame) -> Result<()> {
    let p = &self.parameters;
    let mask = self.collaborators.segmenter.apply(&frame.image);
    let masked = frame.image.masked(&mask)
      .context("Background segmenter returned a mask of wrong size.")?;
    self.collaborators.detector.detect(
      &masked,
      p.max_corners,
      p.corner_quality,
      p.corner_min_distance,
      &mut self.report.points,
    );
    if self.report.points.is_empty() { return Ok(()) }

    let groups = self.collaborators.clustering.cluster(&self.report.points, p.short_distance);
    for members in groups {
      let bounds = bounding_box(&self.report.points, &members);
      let candidate = if members.len() >= p.min_cluster_size {
        Some(0.5 * (bounds[0] + bounds[1]))
      }
      else {
        None
      };
      self.report.clusters.push(Cluster {
        members,
        bounds,
        candidate,
        outcome: ClusterOutcome::TooSmall,
      });
    }
    Ok(())
  }

  // Candidates are handled in cluster order against the already pruned
  // tracks, including those spawned earlier in the same frame.
  fn spawn(&mut self) {
    for cluster in &mut self.report.clusters {
      let candidate = match cluster.candidate {
        Some(x) => x,
        None => continue,
      };
      if self.tracks.iter().any(|track| track.is_near(candidate, self.parameters.short_distance)) {
        cluster.outcome = ClusterOutcome::AlreadyTracked;
        continue;
      }
      if self.tracks.len() >= self.parameters.max_trackers {
        cluster.outcome = ClusterOutcome::AtCapacity;
        continue;
      }
      let id = TrackId(self.next_id);
      self.next_id += 1;
      self.tracks.push(Track::new(id, candidate));
      cluster.outcome = ClusterOutcome::Spawned(id);
      self.report.spawned.push(id);
      self.stats.spawned += 1;
      info!("Spawning track {} at ({:.1}, {:.1}), now tracking {} points.",
        id, candidate[0], candidate[1], self.tracks.len());
    }
  }
}

fn bounding_box(points: &[Vector2d], members: &[usize]) -> [Vector2d; 2] {
  let mut min = Vector2d::repeat(f64::INFINITY);
  let mut max = Vector2d::repeat(f64::NEG_INFINITY);
  for i in members {
    min = min.inf(&points[*i]);
    max = max.sup(&points[*i]);
  }
  [min, max]
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::{Rng, SeedableRng};
  use std::collections::{HashMap, HashSet};

  struct AllForeground;

  impl BackgroundSegmenter for AllForeground {
    fn apply(&mut self, image: &Image) -> Image {
      Image { data: vec![FOREGROUND; image.data.len()], width: image.width, height: image.height }
    }
  }

  // Returns a prepared point list per frame, nothing once exhausted.
  struct ScriptedDetector {
    frames: VecDeque<Vec<Vector2d>>,
  }

  impl FeatureDetector for ScriptedDetector {
    fn detect(&mut self, _: &Image, max_count: usize, _: f64, _: f64, detections: &mut Vec<Vector2d>) {
      detections.clear();
      let points = self.frames.pop_front().unwrap_or_default();
      detections.extend(points.into_iter().take(max_count));
    }
  }

  struct FnMotion<F: FnMut(Vector2d) -> FlowResult>(F);

  impl<F: FnMut(Vector2d) -> FlowResult> MotionEstimator for FnMotion<F> {
    fn track(&mut self, _: &Frame, _: &Frame, point: Vector2d, _: &LkParameters) -> FlowResult {
      (self.0)(point)
    }
  }

  fn drift(point: Vector2d) -> FlowResult {
    FlowResult { point: point + Vector2d::new(0.5, 0.), success: true, error: 1. }
  }

  fn stationary(point: Vector2d) -> FlowResult {
    FlowResult { point, success: true, error: 0. }
  }

  // `n` points spaced one pixel apart, bounding box centered at `center`.
  fn blob(center: [f64; 2], n: usize) -> Vec<Vector2d> {
    let half = (n - 1) as f64 / 2.;
    (0..n).map(|i| Vector2d::new(center[0] - half + i as f64, center[1])).collect()
  }

  fn manager(
    args: &[&str],
    frames: Vec<Vec<Vector2d>>,
    motion: Box<dyn MotionEstimator>,
  ) -> TrackManager {
    let p = test_parameters(args);
    let collaborators = Collaborators {
      segmenter: Box::new(AllForeground),
      detector: Box::new(ScriptedDetector { frames: frames.into() }),
      clustering: Box::new(SingleLinkage::new()),
      motion,
    };
    TrackManager::new(&p, collaborators).unwrap()
  }

  fn image() -> Image {
    Image::new(8, 8)
  }

  #[test]
  fn test_first_frame_spawns_without_update() {
    let mut m = manager(&[], vec![blob([50., 50.], 8)], Box::new(FnMotion(drift)));
    let report = m.process(image()).unwrap();
    assert!(report.flows.is_empty());
    assert_eq!(report.spawned, vec![TrackId(0)]);
    assert_eq!(report.points.len(), 8);
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].outcome, ClusterOutcome::Spawned(TrackId(0)));
    assert_eq!(m.tracks().len(), 1);
    assert_eq!(m.tracks()[0].position(), Vector2d::new(50., 50.));
    assert_eq!(m.tracks()[0].health(), 0);

    let report = m.process(image()).unwrap();
    assert_eq!(report.flows.len(), 1);
    assert_eq!(report.flows[0].old, Vector2d::new(50., 50.));
    assert_eq!(report.flows[0].new, Vector2d::new(50.5, 50.));
    assert_eq!(m.tracks()[0].position(), Vector2d::new(50.5, 50.));
  }

  #[test]
  fn test_capacity_first_come_first_served() {
    let points = [blob([50., 50.], 8), blob([300., 300.], 8)].concat();
    let mut m = manager(&["--max-trackers", "1"], vec![points], Box::new(FnMotion(drift)));
    let report = m.process(image()).unwrap();
    assert_eq!(report.clusters.len(), 2);
    assert_eq!(report.clusters[0].outcome, ClusterOutcome::Spawned(TrackId(0)));
    assert_eq!(report.clusters[1].outcome, ClusterOutcome::AtCapacity);
    assert_eq!(m.tracks().len(), 1);
    assert_eq!(m.tracks()[0].position(), Vector2d::new(50., 50.));
  }

  #[test]
  fn test_capacity_checked_per_candidate() {
    let frame1 = [
      blob([100., 100.], 8),
      blob([200., 100.], 8),
      blob([300., 100.], 8),
      blob([400., 100.], 8),
    ].concat();
    let mut m = manager(&["--max-trackers", "3"], vec![blob([500., 500.], 8), frame1], Box::new(FnMotion(drift)));
    m.process(image()).unwrap();
    let report = m.process(image()).unwrap();
    assert_eq!(report.spawned, vec![TrackId(1), TrackId(2)]);
    let outcomes: Vec<_> = report.clusters.iter().map(|x| x.outcome).collect();
    assert_eq!(outcomes, vec![
      ClusterOutcome::Spawned(TrackId(1)),
      ClusterOutcome::Spawned(TrackId(2)),
      ClusterOutcome::AtCapacity,
      ClusterOutcome::AtCapacity,
    ]);
    assert_eq!(m.tracks().len(), 3);
  }

  #[test]
  fn test_dedup_near_existing_track() {
    let mut m = manager(&[], vec![blob([50., 50.], 8), blob([55., 50.], 8)], Box::new(FnMotion(|p| {
      FlowResult { point: p + Vector2d::new(0., 0.001), success: true, error: 0. }
    })));
    m.process(image()).unwrap();
    let report = m.process(image()).unwrap();
    assert!(report.spawned.is_empty());
    assert_eq!(report.clusters[0].candidate, Some(Vector2d::new(55., 50.)));
    assert_eq!(report.clusters[0].outcome, ClusterOutcome::AlreadyTracked);
    assert_eq!(m.tracks().len(), 1);
  }

  #[test]
  fn test_dedup_against_same_frame_spawns() {
    // A ring of points is one cluster whose box center lies in the empty
    // middle. A lone point near that center is a separate cluster.
    let c = Vector2d::new(100., 100.);
    let mut points: Vec<Vector2d> = (0..12).map(|k| {
      let a = k as f64 * std::f64::consts::PI / 6.;
      c + 40. * Vector2d::new(a.cos(), a.sin())
    }).collect();
    points.push(c + Vector2d::new(10., 0.));
    let args = ["--min-cluster-size", "1", "--short-distance", "25"];
    let mut m = manager(&args, vec![points], Box::new(FnMotion(drift)));
    let report = m.process(image()).unwrap();
    assert_eq!(report.clusters.len(), 2);
    assert_eq!(report.clusters[0].members.len(), 12);
    assert_eq!(report.clusters[0].outcome, ClusterOutcome::Spawned(TrackId(0)));
    assert_eq!(report.clusters[1].outcome, ClusterOutcome::AlreadyTracked);
    assert_eq!(m.tracks().len(), 1);
  }

  #[test]
  fn test_small_clusters_never_spawn() {
    for n in 1..8 {
      let mut m = manager(&[], vec![blob([50., 50.], n)], Box::new(FnMotion(drift)));
      let report = m.process(image()).unwrap();
      assert_eq!(report.clusters.len(), 1);
      assert_eq!(report.clusters[0].candidate, None);
      assert_eq!(report.clusters[0].outcome, ClusterOutcome::TooSmall);
      assert!(m.tracks().is_empty());
    }
  }

  #[test]
  fn test_failed_motion_removes_on_third_update() {
    let motion = FnMotion(|p| FlowResult { point: p + Vector2d::new(1., 0.), success: false, error: 20. });
    let mut m = manager(&["--max-tracker-kills", "3", "--max-tracker-error", "10"], vec![blob([50., 50.], 8)], Box::new(motion));
    m.process(image()).unwrap();
    for health in 1..3 {
      let report = m.process(image()).unwrap();
      assert!(report.removed.is_empty());
      assert_eq!(m.tracks().len(), 1);
      assert_eq!(m.tracks()[0].health(), health);
    }
    let report = m.process(image()).unwrap();
    assert_eq!(report.removed, vec![TrackId(0)]);
    assert!(m.tracks().is_empty());
    assert_eq!(m.stats(), TrackerStats { frames: 4, spawned: 1, removed: 1 });
  }

  #[test]
  fn test_stationary_removed_after_kill_count_updates() {
    for kills in 1..5u32 {
      let kills_arg = kills.to_string();
      let mut m = manager(&["--max-tracker-kills", kills_arg.as_str()], vec![blob([50., 50.], 8)], Box::new(FnMotion(stationary)));
      m.process(image()).unwrap();
      for _ in 1..kills {
        m.process(image()).unwrap();
        assert_eq!(m.tracks().len(), 1);
      }
      let report = m.process(image()).unwrap();
      assert_eq!(report.removed, vec![TrackId(0)]);
      assert!(m.tracks().is_empty());
    }
  }

  #[test]
  fn test_removed_track_does_not_block_spawn() {
    let frames = vec![blob([50., 50.], 8), blob([50., 50.], 8)];
    let mut m = manager(&["--max-tracker-kills", "1"], frames, Box::new(FnMotion(stationary)));
    m.process(image()).unwrap();
    let report = m.process(image()).unwrap();
    assert_eq!(report.removed, vec![TrackId(0)]);
    // A fresh identity, never the terminated one.
    assert_eq!(report.spawned, vec![TrackId(1)]);
    assert_eq!(m.tracks().len(), 1);
    assert_eq!(m.tracks()[0].id, TrackId(1));
    assert_eq!(m.tracks()[0].health(), 0);
  }

  #[test]
  fn test_rejects_invalid_parameters() {
    let p = test_parameters(&["--max-trackers", "0"]);
    let collaborators = Collaborators::new(&p);
    assert!(TrackManager::new(&p, collaborators).is_err());
  }

  // Random points and random motion outcomes from a seeded generator.
  fn random_run(seed: u64) -> Vec<(Vec<TrackId>, Vec<TrackId>, Vec<(TrackId, u32)>)> {
    let mut rng = rand_xoshiro::Xoshiro256StarStar::seed_from_u64(seed);
    let frames: Vec<Vec<Vector2d>> = (0..40).map(|_| {
      let blobs = rng.gen_range(0..4);
      (0..blobs).flat_map(|_| {
        let center = [rng.gen_range(0..20) as f64 * 30., rng.gen_range(0..20) as f64 * 30.];
        blob(center, rng.gen_range(4..12))
      }).collect()
    }).collect();
    let mut motion_rng = rand_xoshiro::Xoshiro256StarStar::seed_from_u64(seed + 1);
    let motion = FnMotion(move |p: Vector2d| {
      let moved = motion_rng.gen_bool(0.7);
      let step = if moved { Vector2d::new(motion_rng.gen_range(-3.0..3.0), 1.) } else { Vector2d::zeros() };
      FlowResult { point: p + step, success: motion_rng.gen_bool(0.8), error: motion_rng.gen_range(0.0..20.0) }
    });
    let mut m = manager(&["--max-trackers", "5"], frames, Box::new(motion));

    let mut history = vec![];
    let mut healths: HashMap<TrackId, u32> = HashMap::new();
    let mut gone: HashSet<TrackId> = HashSet::new();
    for _ in 0..40 {
      let report = m.process(image()).unwrap();
      let (spawned, removed) = (report.spawned.clone(), report.removed.clone());
      assert!(m.tracks().len() <= 5);
      for id in &removed {
        assert!(gone.insert(*id));
      }
      let mut state = vec![];
      for track in m.tracks() {
        assert!(!gone.contains(&track.id));
        assert!(track.health() < 3);
        let last = healths.entry(track.id).or_insert(0);
        assert!(track.health() >= *last);
        *last = track.health();
        state.push((track.id, track.health()));
      }
      history.push((spawned, removed, state));
    }
    history
  }

  #[test]
  fn test_deterministic_and_invariants_hold() {
    for seed in 0..5 {
      let a = random_run(seed);
      let b = random_run(seed);
      assert_eq!(a, b);
    }
  }
}
