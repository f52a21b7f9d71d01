// Generated video for running the pipeline without an input file: a static
// textured background with textured squares moving across it.

use crate::all::*;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

const BACKGROUND_CELL: usize = 16;
const TARGET_SIDE: usize = 40;
const TARGET_CELL: usize = 8;

struct Target {
  position: Vector2d,
  velocity: Vector2d,
  colors: [[u8; 3]; 2],
}

pub struct SyntheticInput {
  frame_count: usize,
  frame_number: usize,
  background: Vec<u8>,
  targets: Vec<Target>,
  video_frame: VideoFrame,
}

impl SyntheticInput {
  pub fn new(
    width: usize,
    height: usize,
    target_count: usize,
    frame_count: usize,
    seed: u64,
  ) -> Result<SyntheticInput> {
    if width <= TARGET_SIDE || height <= TARGET_SIDE {
      bail!("Synthetic video size {}x{} is too small.", width, height);
    }
    let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
    let cells_x = (width + BACKGROUND_CELL - 1) / BACKGROUND_CELL;
    let cells_y = (height + BACKGROUND_CELL - 1) / BACKGROUND_CELL;
    let cells: Vec<u8> = (0..cells_x * cells_y).map(|_| rng.gen_range(60..120)).collect();
    let mut background = vec![0; 3 * width * height];
    for y in 0..height {
      for x in 0..width {
        let v = cells[(y / BACKGROUND_CELL) * cells_x + x / BACKGROUND_CELL];
        background[3 * (y * width + x)..3 * (y * width + x) + 3].copy_from_slice(&[v, v, v]);
      }
    }

    let max = Vector2d::new((width - TARGET_SIDE) as f64, (height - TARGET_SIDE) as f64);
    let targets = (0..target_count).map(|_| {
      let angle = rng.gen_range(0.0..std::f64::consts::TAU);
      let speed = rng.gen_range(1.0..4.0);
      Target {
        position: Vector2d::new(rng.gen_range(0.0..max[0]), rng.gen_range(0.0..max[1])),
        velocity: speed * Vector2d::new(angle.cos(), angle.sin()),
        colors: [[rng.gen_range(180..=255), rng.gen(), rng.gen()], [rng.gen_range(0..40); 3]],
      }
    }).collect();

    Ok(SyntheticInput {
      frame_count,
      frame_number: 0,
      background,
      targets,
      video_frame: VideoFrame::new(width, height),
    })
  }

  fn render(&mut self) {
    let w = self.video_frame.width;
    let data = &mut self.video_frame.data;
    data.copy_from_slice(&self.background);
    for target in &self.targets {
      let x0 = target.position[0].round() as usize;
      let y0 = target.position[1].round() as usize;
      for y in 0..TARGET_SIDE {
        for x in 0..TARGET_SIDE {
          let color = target.colors[(x / TARGET_CELL + y / TARGET_CELL) % 2];
          let i = 3 * ((y0 + y) * w + x0 + x);
          data[i..i + 3].copy_from_slice(&color);
        }
      }
    }
  }

  // Bounces off the borders.
  fn step(&mut self) {
    let max = Vector2d::new(
      (self.video_frame.width - TARGET_SIDE) as f64,
      (self.video_frame.height - TARGET_SIDE) as f64,
    );
    for target in &mut self.targets {
      target.position += target.velocity;
      for i in 0..2 {
        if target.position[i] < 0. {
          target.position[i] = -target.position[i];
          target.velocity[i] = -target.velocity[i];
        }
        if target.position[i] > max[i] {
          target.position[i] = 2. * max[i] - target.position[i];
          target.velocity[i] = -target.velocity[i];
        }
        target.position[i] = target.position[i].clamp(0., max[i]);
      }
    }
  }
}

impl FrameSource for SyntheticInput {
  fn next(&mut self) -> Result<Option<&VideoFrame>> {
    if self.frame_number >= self.frame_count { return Ok(None) }
    if self.frame_number > 0 { self.step() }
    self.frame_number += 1;
    self.render();
    Ok(Some(&self.video_frame))
  }

  fn size(&self) -> [usize; 2] {
    [self.video_frame.width, self.video_frame.height]
  }
}
