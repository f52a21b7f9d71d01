use crate::all::*;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

// Separates moving pixels from the static scene. Stateful across frames.
pub trait BackgroundSegmenter {
  // Returns a mask of the same size as `image`, `FOREGROUND` or `BACKGROUND`.
  fn apply(&mut self, image: &Image) -> Image;
}

// Number of close history samples needed to call a pixel background.
const KNN_SAMPLES: usize = 2;

// K-nearest-neighbours background model over the most recent frames.
pub struct KnnSegmenter {
  history_length: usize,
  distance_threshold: f64,
  history: VecDeque<Image>,
}

impl KnnSegmenter {
  pub fn new(history_length: usize, distance_threshold: f64) -> KnnSegmenter {
    KnnSegmenter {
      history_length,
      distance_threshold,
      history: VecDeque::new(),
    }
  }
}

impl BackgroundSegmenter for KnnSegmenter {
  fn apply(&mut self, image: &Image) -> Image {
    // A change of resolution invalidates the model.
    if self.history.front().map_or(false, |h| h.width != image.width || h.height != image.height) {
      warn!("Frame size changed, resetting background model.");
      self.history.clear();
    }

    let needed = KNN_SAMPLES.min(self.history.len());
    let mut mask = Image::new(image.width, image.height);
    for (i, value) in image.data.iter().enumerate() {
      let v = *value as f64;
      let mut matches = 0;
      for sample in &self.history {
        let d = v - sample.data[i] as f64;
        if d * d <= self.distance_threshold { matches += 1 }
        if matches >= needed { break }
      }
      mask.data[i] = if needed == 0 || matches < needed { FOREGROUND } else { BACKGROUND };
    }

    if self.history.len() >= self.history_length {
      self.history.pop_front();
    }
    self.history.push_back(image.clone());
    mask
  }
}
