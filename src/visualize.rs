use crate::all::*;

pub type Rgb = [u8; 3];

const RED: Rgb = [255, 0, 0];
const GREEN: Rgb = [0, 255, 0];
const BLUE: Rgb = [0, 0, 255];

const CORNER_RADIUS: i32 = 3;
const TRACK_RADIUS: i32 = 5;
// Arrow head length relative to the arrow.
const ARROW_TIP: f64 = 0.5;

#[inline(always)]
fn draw_pixel(frame: &mut VideoFrame, p: &Vector2i, v: Rgb) {
  if p[0] < 0 || p[0] >= frame.width as i32 { return }
  if p[1] < 0 || p[1] >= frame.height as i32 { return }
  let i = 3 * (p[1] as usize * frame.width + p[0] as usize);
  frame.data[i..i + 3].copy_from_slice(&v);
}

fn draw_disk(frame: &mut VideoFrame, p: &Vector2i, v: Rgb, r: i32) {
  for y in (-r)..(r + 1) {
    for x in (-r)..(r + 1) {
      if x * x + y * y > r * r { continue }
      draw_pixel(frame, &(p + Vector2i::new(x, y)), v);
    }
  }
}

fn draw_line(frame: &mut VideoFrame, mut p0: Vector2i, mut p1: Vector2i, v: Rgb) {
  let dx = p1[0] - p0[0];
  let dy = p1[1] - p0[1];
  if dx == 0 && dy == 0 {
    draw_pixel(frame, &p0, v);
  }
  else if dx.abs() < dy.abs() {
    if p0[1] > p1[1] { (p0, p1) = (p1, p0); }
    let k = dx as f32 / dy as f32;
    for y in p0[1] ..= p1[1] {
      let x = p0[0] + (k * (y - p0[1]) as f32).round() as i32;
      draw_pixel(frame, &Vector2i::new(x, y), v);
    }
  }
  else {
    if p0[0] > p1[0] { (p0, p1) = (p1, p0); }
    let k = dy as f32 / dx as f32;
    for x in p0[0] ..= p1[0] {
      let y = p0[1] + (k * (x - p0[0]) as f32).round() as i32;
      draw_pixel(frame, &Vector2i::new(x, y), v);
    }
  }
}

fn draw_arrow(frame: &mut VideoFrame, p0: &Vector2d, p1: &Vector2d, v: Rgb) {
  draw_line(frame, from_f64(p0), from_f64(p1), v);
  let back = (p0 - p1) * ARROW_TIP;
  if back.norm() < 1. { return }
  let angle = std::f64::consts::FRAC_PI_4;
  for a in [angle, -angle] {
    let rotated = nalgebra::Rotation2::new(a) * back;
    draw_line(frame, from_f64(p1), from_f64(&(p1 + rotated)), v);
  }
}

fn draw_rectangle(frame: &mut VideoFrame, min: Vector2i, max: Vector2i, v: Rgb) {
  draw_line(frame, min, Vector2i::new(max[0], min[1]), v);
  draw_line(frame, Vector2i::new(max[0], min[1]), max, v);
  draw_line(frame, max, Vector2i::new(min[0], max[1]), v);
  draw_line(frame, Vector2i::new(min[0], max[1]), min, v);
}

// Overlays one frame's tracking state: detected corners, the bounding boxes
// of clusters that seeded a track or matched an existing one, and each track with an arrow
// showing its exaggerated motion.
pub fn visualize(
  frame: &mut VideoFrame,
  report: &FrameReport,
  tracks: &[Track],
  arrow_scale: f64,
) {
  for point in &report.points {
    draw_disk(frame, &from_f64(point), RED, CORNER_RADIUS);
  }

  for cluster in &report.clusters {
    match cluster.outcome {
      ClusterOutcome::Spawned(_) | ClusterOutcome::AlreadyTracked => {},
      ClusterOutcome::TooSmall | ClusterOutcome::AtCapacity => continue,
    }
    draw_rectangle(frame, from_f64(&cluster.bounds[0]), from_f64(&cluster.bounds[1]), BLUE);
  }

  for flow in &report.flows {
    let tip = flow.old + (flow.new - flow.old) * arrow_scale;
    draw_disk(frame, &from_f64(&flow.new), GREEN, TRACK_RADIUS);
    draw_arrow(frame, &flow.old, &tip, GREEN);
  }

  // Tracks spawned this frame have not moved yet.
  for track in tracks {
    if report.spawned.contains(&track.id) {
      draw_disk(frame, &from_f64(&track.position()), GREEN, TRACK_RADIUS);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pixel(frame: &VideoFrame, x: usize, y: usize) -> Rgb {
    let i = 3 * (y * frame.width + x);
    [frame.data[i], frame.data[i + 1], frame.data[i + 2]]
  }

  #[test]
  fn test_draw_line_and_clipping() {
    let mut frame = VideoFrame::new(10, 10);
    draw_line(&mut frame, Vector2i::new(-5, 2), Vector2i::new(20, 2), RED);
    for x in 0..10 {
      assert_eq!(pixel(&frame, x, 2), RED);
    }
    assert_eq!(pixel(&frame, 0, 3), [0, 0, 0]);
    draw_line(&mut frame, Vector2i::new(4, 4), Vector2i::new(4, 4), BLUE);
    assert_eq!(pixel(&frame, 4, 4), BLUE);
  }

  #[test]
  fn test_visualize() {
    let mut frame = VideoFrame::new(100, 100);
    let report = FrameReport {
      points: vec![Vector2d::new(10., 10.), Vector2d::new(90., 90.)],
      clusters: vec![
        Cluster {
          members: vec![0, 1],
          bounds: [Vector2d::new(10., 10.), Vector2d::new(90., 90.)],
          candidate: Some(Vector2d::new(50., 50.)),
          outcome: ClusterOutcome::Spawned(TrackId(1)),
        },
        Cluster {
          members: vec![],
          bounds: [Vector2d::new(20., 30.), Vector2d::new(40., 35.)],
          candidate: Some(Vector2d::new(30., 32.5)),
          outcome: ClusterOutcome::AtCapacity,
        },
      ],
      flows: vec![TrackFlow {
        id: TrackId(0),
        old: Vector2d::new(30., 70.),
        new: Vector2d::new(31., 70.),
        success: true,
        error: 0.,
      }],
      spawned: vec![TrackId(1)],
      ..Default::default()
    };
    let tracks = vec![
      Track::new(TrackId(0), Vector2d::new(31., 70.)),
      Track::new(TrackId(1), Vector2d::new(50., 50.)),
    ];
    visualize(&mut frame, &report, &tracks, 10.);
    assert_eq!(pixel(&frame, 92, 92), RED);
    assert_eq!(pixel(&frame, 50, 10), BLUE);
    assert_eq!(pixel(&frame, 50, 50), GREEN);
    assert_eq!(pixel(&frame, 31, 70), GREEN);
    // Arrow tip ten times the motion away.
    assert_eq!(pixel(&frame, 40, 70), GREEN);
    assert_eq!(pixel(&frame, 60, 20), [0, 0, 0]);
    // No box for a cluster that did not get a track for lack of room.
    assert_eq!(pixel(&frame, 30, 30), [0, 0, 0]);
    assert_eq!(pixel(&frame, 20, 32), [0, 0, 0]);
  }
}
