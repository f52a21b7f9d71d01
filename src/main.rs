mod all;
mod background;
mod clustering;
mod detector;
mod event_loop;
mod frame;
mod image;
mod optical_flow;
mod parameters;
mod pyramid;
mod synthetic;
mod track;
mod track_log;
mod tracker;
mod types;
mod util;
mod video;
mod visualize;

use all::*;

use clap::Parser;
use signal_hook::consts::signal::{SIGINT, SIGTERM};

// Size of generated video before scaling.
const SYNTHETIC_SIZE: [usize; 2] = [960, 540];
const SYNTHETIC_TARGETS: usize = 3;

#[derive(Parser)]
#[clap(about = "Detects moving feature clusters in a video and follows them with optical flow.")]
struct Args {
  #[clap(short, long)]
  input: Option<PathBuf>,
  // Number of frames of generated video to use instead of `--input`.
  #[clap(long)]
  synthetic: Option<usize>,
  #[clap(long, default_value = "1")]
  seed: u64,
  // Annotated video.
  #[clap(short, long)]
  output: Option<PathBuf>,
  // JSON lines of track creations and removals.
  #[clap(long)]
  track_log: Option<PathBuf>,
  #[clap(long)]
  max_frames: Option<usize>,
  // Show the annotated video in a window. Escape or Q stops.
  #[clap(long)]
  display: bool,
  #[clap(short, long)]
  verbose: bool,
  #[clap(flatten)]
  parameters: ParameterSet,
}

fn handle_error(err: &anyhow::Error) {
  for (i, e) in err.chain().enumerate() {
    eprintln!("  {}: {}", i + 1, e);
  }
}

fn main() {
  if let Err(err) = run() {
    handle_error(&err);
    std::process::exit(1);
  }
}

fn run() -> Result<()> {
  let args = Args::parse();
  env_logger::Builder::new()
    .filter_level(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info })
    .format(util::format_log)
    .init();

  let p = &args.parameters;
  p.validate().context("Invalid parameters.")?;

  let input: Box<dyn FrameSource> = match (&args.input, args.synthetic) {
    (Some(path), None) => Box::new(VideoInput::new(path, p.scale)?),
    (None, Some(frame_count)) => {
      let [width, height] = scaled_size(SYNTHETIC_SIZE, p.scale);
      Box::new(SyntheticInput::new(width, height, SYNTHETIC_TARGETS, frame_count, args.seed)?)
    },
    _ => bail!("Give exactly one of --input and --synthetic."),
  };
  let [width, height] = input.size();
  let output = args.output.as_deref()
    .map(|path| VideoOutput::new(path, width, height, p.fps))
    .transpose()?;
  let track_log = args.track_log.as_deref()
    .map(TrackLog::create)
    .transpose()?;

  // The first signal stops the loop so that outputs get finished, a second one
  // exits immediately.
  let interrupted = Arc::new(AtomicBool::new(false));
  for signal in [SIGINT, SIGTERM] {
    signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&interrupted))
      .context("Failed to install signal handler.")?;
    signal_hook::flag::register(signal, Arc::clone(&interrupted))
      .context("Failed to install signal handler.")?;
  }

  let mut pipeline = Pipeline {
    input,
    manager: TrackManager::new(p, Collaborators::new(p))?,
    output,
    track_log,
    arrow_scale: p.arrow_scale,
    max_frames: args.max_frames,
    interrupted,
    canvas: VideoFrame::new(width, height),
  };
  if args.display {
    run_window(&mut pipeline)?;
  }
  else {
    while pipeline.step()? {}
  }
  pipeline.finish()
}
