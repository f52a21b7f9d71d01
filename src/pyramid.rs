use crate::all::*;

// Successively halved copies of a frame. `levels[0]` is half the size of the
// original image, which itself is not stored here.
pub struct Pyramid {
  pub levels: Vec<Image>,
}

impl Pyramid {
  pub fn new(
    image: &Image,
    unused_pyramid: Option<Pyramid>,
    level_count: usize,
  ) -> Pyramid {
    let mut levels = unused_pyramid.map(|x| x.levels).unwrap_or_default();
    levels.resize(level_count, Image::empty());
    for level_ind in 0..level_count {
      let (parent, children) = levels.split_at_mut(level_ind);
      let parent = if level_ind > 0 { &parent[level_ind - 1] } else { image };
      downscale(parent, &mut children[0]);
    }
    // Stop at levels too small to hold anything.
    while levels.last().map_or(false, |x| x.width == 0 || x.height == 0) {
      levels.pop();
    }
    Pyramid { levels }
  }
}

// 2x2 box filter. An odd last row or column is dropped.
fn downscale(parent: &Image, child: &mut Image) {
  child.width = parent.width / 2;
  child.height = parent.height / 2;
  child.data.clear();
  child.data.reserve(child.width * child.height);
  for y in 0..child.height {
    for x in 0..child.width {
      let sum = parent.value(2 * x, 2 * y) as u32
        + parent.value(2 * x + 1, 2 * y) as u32
        + parent.value(2 * x, 2 * y + 1) as u32
        + parent.value(2 * x + 1, 2 * y + 1) as u32;
      child.data.push(((sum + 2) / 4) as u8);
    }
  }
}
