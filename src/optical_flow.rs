// Pyramidal Lucas-Kanade tracker based on:
// <http://robots.stanford.edu/cs223b04/algo_tracking.pdf>
// “Pyramidal Implementation of the Lucas Kanade Feature Tracker
//   Description of the algorithm” by Jean-Yves Bouguet

use crate::all::*;

type Range = [[i16; 2]; 2];

#[derive(Clone, Copy, Debug)]
pub struct LkParameters {
  // Side length of the square integration window, odd.
  pub win_size: usize,
  // Number of pyramid levels used above the original image.
  pub max_level: usize,
  pub max_iters: usize,
  // Iteration stops when the update step is shorter than this (pixels).
  pub epsilon: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowResult {
  pub point: Vector2d,
  pub success: bool,
  // Mean absolute intensity difference over the window.
  pub error: f64,
}

// Follows a single point from one frame to the next.
pub trait MotionEstimator {
  fn track(
    &mut self,
    frame0: &Frame,
    frame1: &Frame,
    point: Vector2d,
    params: &LkParameters,
  ) -> FlowResult;
}

#[allow(non_snake_case)]
pub struct OpticalFlow {
  Ix: Matrixd,
  Iy: Matrixd,
  It: Matrixd,
  // Workspace.
  grid0: Matrixd,
}

impl MotionEstimator for OpticalFlow {
  fn track(
    &mut self,
    frame0: &Frame,
    frame1: &Frame,
    point: Vector2d,
    params: &LkParameters,
  ) -> FlowResult {
    match self.process_feature(frame0, frame1, point, params) {
      Some((point, error)) => FlowResult { point, success: true, error },
      // The point stays where it was, so a failure also counts as no motion
      // in `Track::advance` and costs two health points.
      None => FlowResult { point, success: false, error: f64::INFINITY },
    }
  }
}

impl OpticalFlow {
  pub fn new() -> OpticalFlow {
    OpticalFlow {
      Ix: dmatrix!(),
      Iy: dmatrix!(),
      It: dmatrix!(),
      grid0: dmatrix!(),
    }
  }

  fn process_feature(
    &mut self,
    frame0: &Frame,
    frame1: &Frame,
    feature0: Vector2d,
    params: &LkParameters,
  ) -> Option<(Vector2d, f64)> {
    if !feature0.iter().all(|x| x.is_finite()) { return None }
    if frame0.width() != frame1.width() || frame0.height() != frame1.height() { return None }
    let r = (params.win_size - 1) / 2;
    let top = params.max_level
      .min(frame0.pyramid.levels.len())
      .min(frame1.pyramid.levels.len());
    let mut g = Vector2d::zeros();
    for level in (1..=top).rev() {
      let u = feature0 / u32::pow(2, level as u32) as f64;
      // Coarse levels the window does not fit in contribute nothing.
      let d = self.process_level(frame0.get_level(level), frame1.get_level(level), u, g, r, params)
        .unwrap_or_else(Vector2d::zeros);
      g = 2. * (g + d);
    }
    let d = self.process_level(frame0.get_level(0), frame1.get_level(0), feature0, g, r, params)?;
    let feature1 = feature0 + g + d;

    // `grid0` still holds the level 0 window around `feature0`.
    let range = integration_range(frame0.get_level(0), feature0, r, 1)?;
    image_difference(range, &self.grid0, &mut self.It, frame1.get_level(0), feature1)?;
    let error = self.It.iter().map(|x| x.abs()).sum::<f64>() / self.It.len() as f64;
    Some((feature1, error))
  }

  // Returns the residual flow `nu` on one level given the guess `g`.
  #[allow(non_snake_case)]
  fn process_level(
    &mut self,
    level0: &Image,
    level1: &Image,
    u: Vector2d,
    g: Vector2d,
    r: usize,
    params: &LkParameters,
  ) -> Option<Vector2d> {
    let range = integration_range(level0, u, r, 1)?;
    scharr(level0, u, range, &mut self.Ix, &mut self.Iy, &mut self.grid0);
    let G = spatial_gradient(&self.Ix, &self.Iy);
    let mut nu = Vector2d::zeros();
    for _ in 0..params.max_iters {
      image_difference(range, &self.grid0, &mut self.It, level1, u + g + nu)?;
      let step = flow_vector(&G, &self.Ix, &self.Iy, &self.It)?;
      nu += step;
      if step.norm() < params.epsilon { break }
    }
    Some(nu)
  }
}

// Fills `It` with the difference of the padded source window `I0` and the
// target level sampled around `center`, over `prev_range`.
#[allow(non_snake_case)]
fn image_difference(
  prev_range: Range,
  I0: &Matrixd,
  It: &mut Matrixd,
  level: &Image,
  center: Vector2d,
) -> Option<()> {
  let r = [prev_range[0][0].abs(), prev_range[0][1], prev_range[1][0].abs(), prev_range[1][1]]
    .into_iter().max().unwrap_or(0) as usize;
  let range = integration_range(level, center, r, 0)?;
  // The window must fit in the target level at the new position.
  for i in 0..2 {
    if range[i][0] > prev_range[i][0] || range[i][1] < prev_range[i][1] { return None }
  }
  fill_grid(level, prev_range, center, It);
  *It *= -1.;
  *It += I0.slice((1, 1), (It.nrows(), It.ncols()));
  Some(())
}

#[allow(non_snake_case)]
fn flow_vector(
  G: &Matrix2d,
  Ix: &Matrixd,
  Iy: &Matrixd,
  It: &Matrixd,
) -> Option<Vector2d> {
  let mut b = Vector2d::zeros();
  for y in 0..Ix.nrows() {
    for x in 0..Ix.ncols() {
      b[0] += It[(y, x)] * Ix[(y, x)];
      b[1] += It[(y, x)] * Iy[(y, x)];
    }
  }
  G.try_inverse().map(|invG| invG * b)
}

#[allow(non_snake_case)]
fn spatial_gradient(Ix: &Matrixd, Iy: &Matrixd) -> Matrix2d {
  assert_eq!(Ix.shape(), Iy.shape());
  let mut x2 = 0.;
  let mut y2 = 0.;
  let mut xy = 0.;
  for y in 0..Ix.nrows() {
    for x in 0..Ix.ncols() {
      x2 += Ix[(y, x)] * Ix[(y, x)];
      y2 += Iy[(y, x)] * Iy[(y, x)];
      xy += Ix[(y, x)] * Iy[(y, x)];
    }
  }
  Matrix2d::new(x2, xy, xy, y2)
}

// Returns closed range of integer steps that can be takes without going outside
// the image borders. Returns None if the center point is outside the level
// boundaries.
fn integration_range(
  level: &Image,
  center: Vector2d,
  r: usize,
  padding: i16,
) -> Option<Range> {
  let r = r as i16;
  let mut range = [[0, 0], [0, 0]];
  for i in 0..2 {
    let s = if i == 0 { level.width } else { level.height };
    if s < 2 { return None }
    if !(center[i] >= 0. && center[i] <= (s - 1) as f64) { return None }
    let n = center[i] as i16;
    range[i] = [i16::max(-r, -n + padding), i16::min(r, s as i16 - n - padding - 2)];
    if range[i][0] > range[i][1] { return None }
  }
  Some(range)
}

fn fill_grid(
  level: &Image,
  range: Range,
  center: Vector2d,
  grid: &mut Matrixd,
) {
  *grid = DMatrix::zeros((range[1][1] - range[1][0] + 1) as usize, (range[0][1] - range[0][0] + 1) as usize);
  for (y_ind, y) in (range[1][0]..=range[1][1]).enumerate() {
    for (x_ind, x) in (range[0][0]..=range[0][1]).enumerate() {
      grid[(y_ind, x_ind)] = bilinear(level, center + Vector2d::new(x as f64, y as f64));
    }
  }
}

fn scharr(
  level: &Image,
  center: Vector2d,
  range: Range,
  out_x: &mut Matrixd,
  out_y: &mut Matrixd,
  // Workspace.
  grid: &mut Matrixd,
) {
  let grange = [[range[0][0] - 1, range[0][1] + 1], [range[1][0] - 1, range[1][1] + 1]];
  fill_grid(level, grange, center, grid);
  *out_x = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
  *out_y = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
  for y in 1..(grid.nrows() - 1) {
    for x in 1..(grid.ncols() - 1) {
      out_x[(y - 1, x - 1)] = (10. * grid[(y, x + 1)]
        + 3. * grid[(y + 1, x + 1)]
        + 3. * grid[(y - 1, x + 1)]
        - 10. * grid[(y, x - 1)]
        - 3. * grid[(y + 1, x - 1)]
        - 3. * grid[(y - 1, x - 1)]
      ) / 32.;
      out_y[(y - 1, x - 1)] = (10. * grid[(y + 1, x)]
        + 3. * grid[(y + 1, x + 1)]
        + 3. * grid[(y + 1, x - 1)]
        - 10. * grid[(y - 1, x)]
        - 3. * grid[(y - 1, x + 1)]
        - 3. * grid[(y - 1, x - 1)]
      ) / 32.;
    }
  }
}

#[inline(always)]
fn bilinear(image: &Image, u: Vector2d) -> f64 {
  assert!(u[0] >= 0.0 && u[0] <= image.width as f64 - 1.);
  assert!(u[1] >= 0.0 && u[1] <= image.height as f64 - 1.);
  let x0 = u[0] as usize;
  let y0 = u[1] as usize;
  let xa = u[0].fract();
  let ya = u[1].fract();
  // Besides improving computation speed, these allow to work one pixel
  // closer to the right and bottom edges when coordinates are integers.
  let eps = 1e-5;
  let v = |x: usize, y: usize| image.value(x, y) as f64;
  if xa < eps && ya < eps {
    v(x0, y0)
  }
  else if xa < eps {
    (1. - ya) * v(x0, y0) + ya * v(x0, y0 + 1)
  }
  else if ya < eps {
    (1. - xa) * v(x0, y0) + xa * v(x0 + 1, y0)
  }
  else {
    (1. - xa) * (1. - ya) * v(x0, y0)
      + xa * (1. - ya) * v(x0 + 1, y0)
      + (1. - xa) * ya * v(x0, y0 + 1)
      + xa * ya * v(x0 + 1, y0 + 1)
  }
}

#[cfg(test)]
pub fn gaussian_blob(width: usize, height: usize, center: Vector2d, sigma: f64) -> Image {
  let mut image = Image::new(width, height);
  for y in 0..height {
    for x in 0..width {
      let d2 = (Vector2d::new(x as f64, y as f64) - center).norm_squared();
      let v = 20. + 200. * (-d2 / (2. * sigma * sigma)).exp();
      image.set_value(x, y, v.round() as u8);
    }
  }
  image
}
