use crate::all::*;

// Tuning parameters of the whole pipeline. Constructed once at startup,
// validated and then passed around by reference.
#[derive(Clone, Debug)]
#[derive(clap::Parser)]
pub struct ParameterSet {
  // Video.
  #[clap(long, default_value = "30")]
  pub fps: f64,
  // Input frames are resized by this factor before processing.
  #[clap(long, default_value = "0.6")]
  pub scale: f64,

  // Proximity threshold, used both for corner clustering and track dedup.
  #[clap(long, default_value = "20")]
  pub short_distance: f64,
  #[clap(long, default_value = "8")]
  pub min_cluster_size: usize,

  // Shi-Tomasi corner detector.
  #[clap(long, default_value = "50")]
  pub max_corners: usize,
  #[clap(long, default_value = "0.01")]
  pub corner_quality: f64,
  #[clap(long, default_value = "10")]
  pub corner_min_distance: f64,

  // Track manager.
  #[clap(long, default_value = "10")]
  pub max_trackers: usize,
  #[clap(long, default_value = "10")]
  pub max_tracker_error: f64,
  #[clap(long, default_value = "3")]
  pub max_tracker_kills: u32,

  // Pyramidal Lucas-Kanade feature tracker.
  #[clap(long, default_value = "4")]
  pub lk_levels: usize,
  #[clap(long, default_value = "10")]
  pub lk_iters: usize,
  #[clap(long, default_value = "0.03")]
  pub lk_epsilon: f64,
  #[clap(long, default_value = "15")]
  pub lk_win_size: usize,

  // KNN background subtractor.
  #[clap(long, default_value = "4")]
  pub subtractor_history: usize,
  #[clap(long, default_value = "1000")]
  pub subtractor_threshold: f64,

  // Visualizations.
  #[clap(long, default_value = "10")]
  pub arrow_scale: f64,
}

impl ParameterSet {
  pub fn validate(&self) -> Result<()> {
    if self.max_trackers == 0 {
      bail!("max_trackers must be at least 1.");
    }
    if self.max_tracker_kills == 0 {
      bail!("max_tracker_kills must be at least 1.");
    }
    if !(self.short_distance > 0.) {
      bail!("short_distance must be positive, got {}.", self.short_distance);
    }
    if self.min_cluster_size == 0 {
      bail!("min_cluster_size must be at least 1.");
    }
    if self.max_corners == 0 {
      bail!("max_corners must be at least 1.");
    }
    if !(self.corner_quality > 0. && self.corner_quality <= 1.) {
      bail!("corner_quality must be in (0, 1], got {}.", self.corner_quality);
    }
    if !(self.corner_min_distance >= 0.) {
      bail!("corner_min_distance must be non-negative, got {}.", self.corner_min_distance);
    }
    if !(self.max_tracker_error >= 0.) {
      bail!("max_tracker_error must be non-negative, got {}.", self.max_tracker_error);
    }
    if self.lk_win_size % 2 != 1 {
      bail!("Lucas-Kanade window size must be odd number.");
    }
    if self.lk_win_size < 3 {
      bail!("Lucas-Kanade window size must be at least 3.");
    }
    if self.lk_iters == 0 {
      bail!("Lucas-Kanade iteration count must be at least 1.");
    }
    if !(self.lk_epsilon >= 0.) {
      bail!("Lucas-Kanade epsilon must be non-negative, got {}.", self.lk_epsilon);
    }
    if self.subtractor_history == 0 {
      bail!("subtractor_history must be at least 1.");
    }
    if !(self.subtractor_threshold >= 0.) {
      bail!("subtractor_threshold must be non-negative, got {}.", self.subtractor_threshold);
    }
    if !(self.fps > 0.) {
      bail!("fps must be positive, got {}.", self.fps);
    }
    if !(self.scale > 0. && self.scale <= 1.) {
      bail!("scale must be in (0, 1], got {}.", self.scale);
    }
    if !(self.arrow_scale >= 0.) {
      bail!("arrow_scale must be non-negative, got {}.", self.arrow_scale);
    }
    Ok(())
  }

  pub fn lk_parameters(&self) -> LkParameters {
    LkParameters {
      win_size: self.lk_win_size,
      max_level: self.lk_levels,
      max_iters: self.lk_iters,
      epsilon: self.lk_epsilon,
    }
  }
}

#[cfg(test)]
pub fn test_parameters(args: &[&str]) -> ParameterSet {
  use clap::Parser;
  ParameterSet::parse_from(std::iter::once("test").chain(args.iter().copied()))
}
