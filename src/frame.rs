use crate::all::*;

// Grayscale frame plus the data derived from it for optical flow.
pub struct Frame {
  pub image: Image,
  pub pyramid: Pyramid,
}

impl Frame {
  pub fn new(
    image: Image,
    unused_frame: Option<Frame>,
    level_count: usize,
  ) -> Frame {
    // Reuse pyramid buffers of an old unused frame to avoid allocation.
    let unused_pyramid = unused_frame.map(|x| x.pyramid);
    Frame {
      pyramid: Pyramid::new(&image, unused_pyramid, level_count),
      image,
    }
  }

  pub fn get_level(&self, level: usize) -> &Image {
    if level == 0 { &self.image } else { &self.pyramid.levels[level - 1] }
  }

  pub fn width(&self) -> usize { self.image.width }
  pub fn height(&self) -> usize { self.image.height }
}
