use crate::all::*;

// Proposes points worth following in a (masked) grayscale image.
pub trait FeatureDetector {
  // Writes at most `max_count` points into `detections`, strongest first,
  // no two closer than `min_separation`.
  fn detect(
    &mut self,
    image: &Image,
    max_count: usize,
    quality_level: f64,
    min_separation: f64,
    detections: &mut Vec<Vector2d>,
  );
}

// Shi-Tomasi "good features to track": minimum eigenvalue of the gradient
// structure tensor summed over a 3x3 block.
pub struct Detector {
  gx: Vec<f64>,
  gy: Vec<f64>,
  response: Vec<f64>,
  candidates: Vec<(f64, usize)>,
}

// Sobel (1) + block (1) margin.
const BORDER: usize = 2;

impl Detector {
  pub fn new() -> Detector {
    Detector {
      gx: vec![],
      gy: vec![],
      response: vec![],
      candidates: vec![],
    }
  }

  fn compute_gradients(&mut self, image: &Image) {
    let w = image.width;
    let h = image.height;
    self.gx.clear();
    self.gx.resize(w * h, 0.);
    self.gy.clear();
    self.gy.resize(w * h, 0.);
    for y in 1..(h - 1) {
      for x in 1..(w - 1) {
        let v = |dx: i32, dy: i32| image.value_i32(x as i32 + dx, y as i32 + dy) as f64;
        self.gx[y * w + x] = (v(1, -1) + 2. * v(1, 0) + v(1, 1))
          - (v(-1, -1) + 2. * v(-1, 0) + v(-1, 1));
        self.gy[y * w + x] = (v(-1, 1) + 2. * v(0, 1) + v(1, 1))
          - (v(-1, -1) + 2. * v(0, -1) + v(1, -1));
      }
    }
  }

  fn compute_response(&mut self, image: &Image) -> f64 {
    let w = image.width;
    let h = image.height;
    self.response.clear();
    self.response.resize(w * h, 0.);
    let mut max_response: f64 = 0.;
    for y in BORDER..(h - BORDER) {
      for x in BORDER..(w - BORDER) {
        let mut a = 0.;
        let mut b = 0.;
        let mut c = 0.;
        for yy in (y - 1)..=(y + 1) {
          for xx in (x - 1)..=(x + 1) {
            let gx = self.gx[yy * w + xx];
            let gy = self.gy[yy * w + xx];
            a += gx * gx;
            b += gx * gy;
            c += gy * gy;
          }
        }
        let half_trace = 0.5 * (a + c);
        let d = 0.5 * (a - c);
        let lambda = half_trace - (d * d + b * b).sqrt();
        // Rounding can make a flat window slightly negative.
        let lambda = lambda.max(0.);
        self.response[y * w + x] = lambda;
        max_response = max_response.max(lambda);
      }
    }
    max_response
  }

  fn is_local_max(&self, x: usize, y: usize, w: usize) -> bool {
    let value = self.response[y * w + x];
    for yy in (y - 1)..=(y + 1) {
      for xx in (x - 1)..=(x + 1) {
        if self.response[yy * w + xx] > value { return false }
      }
    }
    true
  }
}

impl FeatureDetector for Detector {
  fn detect(
    &mut self,
    image: &Image,
    max_count: usize,
    quality_level: f64,
    min_separation: f64,
    detections: &mut Vec<Vector2d>,
  ) {
    detections.clear();
    if image.width <= 2 * BORDER || image.height <= 2 * BORDER || max_count == 0 { return }
    let w = image.width;
    self.compute_gradients(image);
    let max_response = self.compute_response(image);
    if max_response <= 0. { return }
    let threshold = quality_level * max_response;

    self.candidates.clear();
    for y in BORDER..(image.height - BORDER) {
      for x in BORDER..(w - BORDER) {
        let value = self.response[y * w + x];
        if value <= threshold { continue }
        if !self.is_local_max(x, y, w) { continue }
        self.candidates.push((value, y * w + x));
      }
    }
    // Stable, so equal responses keep scan order.
    self.candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

    let min_d2 = min_separation * min_separation;
    for (_, ind) in &self.candidates {
      let p = Vector2d::new((ind % w) as f64, (ind / w) as f64);
      if detections.iter().any(|q| (p - q).norm_squared() < min_d2) { continue }
      detections.push(p);
      if detections.len() >= max_count { break }
    }
  }
}

#[cfg(test)]
pub fn square_image(width: usize, height: usize, x0: usize, y0: usize, side: usize) -> Image {
  let mut image = Image::new(width, height);
  for y in y0..(y0 + side) {
    for x in x0..(x0 + side) {
      image.set_value(x, y, 200);
    }
  }
  image
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_square_corners() {
    let image = square_image(64, 64, 20, 20, 20);
    let mut detections = vec![];
    Detector::new().detect(&image, 50, 0.01, 10., &mut detections);
    assert_eq!(detections.len(), 4);
    let corners = [
      Vector2d::new(19.5, 19.5),
      Vector2d::new(39.5, 19.5),
      Vector2d::new(19.5, 39.5),
      Vector2d::new(39.5, 39.5),
    ];
    for corner in &corners {
      let n = detections.iter().filter(|p| (*p - corner).norm() < 3.).count();
      assert_eq!(n, 1, "{}", corner);
    }
    for p in &detections {
      assert_eq!(p[0].fract(), 0.);
      assert_eq!(p[1].fract(), 0.);
    }
  }

  #[test]
  fn test_max_count_and_separation() {
    let image = square_image(64, 64, 20, 20, 20);
    let mut detections = vec![];
    let mut detector = Detector::new();
    detector.detect(&image, 2, 0.01, 10., &mut detections);
    assert_eq!(detections.len(), 2);

    // Separation larger than the square leaves a single corner.
    detector.detect(&image, 50, 0.01, 100., &mut detections);
    assert_eq!(detections.len(), 1);
  }

  #[test]
  fn test_no_texture() {
    let mut detections = vec![Vector2d::zeros()];
    let mut detector = Detector::new();
    detector.detect(&Image { data: vec![77; 32 * 32], width: 32, height: 32 }, 50, 0.01, 10., &mut detections);
    assert!(detections.is_empty());
    detector.detect(&Image::new(3, 3), 50, 0.01, 10., &mut detections);
    assert!(detections.is_empty());
  }
}
