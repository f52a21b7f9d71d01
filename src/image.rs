use crate::all::*;

// Row-major grayscale image storage.
// Could also have used nalebgra::DMatrix, but the added complexity
// only seems to help with algorithms like the optical flow.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
  pub data: Vec<u8>,
  pub width: usize,
  pub height: usize,
}

impl Image {
  pub fn empty() -> Image {
    Image {
      data: vec![],
      width: 0,
      height: 0,
    }
  }

  pub fn new(width: usize, height: usize) -> Image {
    Image {
      data: vec![0; width * height],
      width,
      height,
    }
  }

  // Luma from interleaved RGB24 bytes, ITU-R BT.601 weights.
  pub fn from_rgb(rgb: &[u8], width: usize, height: usize) -> Result<Image> {
    if rgb.len() != 3 * width * height {
      bail!("RGB buffer has {} bytes, expected {} for {}x{}.", rgb.len(), 3 * width * height, width, height);
    }
    let data = rgb.chunks_exact(3)
      .map(|c| ((299 * c[0] as u32 + 587 * c[1] as u32 + 114 * c[2] as u32 + 500) / 1000) as u8)
      .collect();
    Ok(Image { data, width, height })
  }

  #[inline(always)]
  pub fn value(&self, x: usize, y: usize) -> u8 {
    self.data[y * self.width + x]
  }

  #[inline(always)]
  pub fn value_i32(&self, x: i32, y: i32) -> u8 {
    self.data[y as usize * self.width + x as usize]
  }

  #[inline(always)]
  pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
    self.data[y * self.width + x] = value;
  }

  // Keeps pixels where the mask is non-zero, zeroes the rest.
  pub fn masked(&self, mask: &Image) -> Result<Image> {
    if self.width != mask.width || self.height != mask.height {
      bail!("Mask size {}x{} does not match image size {}x{}.",
        mask.width, mask.height, self.width, self.height);
    }
    let data = self.data.iter().zip(mask.data.iter())
      .map(|(v, m)| if *m != 0 { *v } else { 0 })
      .collect();
    Ok(Image { data, width: self.width, height: self.height })
  }
}

// Element access in the manner of `image[y][x]`.
impl Index<usize> for Image {
  type Output = [u8];
  fn index(&self, y: usize) -> &Self::Output {
    &self.data[y * self.width .. (y + 1) * self.width]
  }
}

impl fmt::Display for Image {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut s = String::new();
    for y in 0..self.height {
      for x in 0..self.width {
        s += &format!("{:>3},", self.value(x, y));
      }
      s += "\n";
    }
    write!(f, "{}", s)
  }
}
