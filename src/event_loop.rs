use crate::all::*;

use softbuffer::GraphicsContext;
use winit::event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::run_return::EventLoopExtRunReturn;
use winit::window::{Window, WindowBuilder};

// Frame source, track manager and sinks wired together. One `step()` fully
// processes and renders one frame.
pub struct Pipeline {
  pub input: Box<dyn FrameSource>,
  pub manager: TrackManager,
  pub output: Option<VideoOutput>,
  pub track_log: Option<TrackLog<BufWriter<File>>>,
  pub arrow_scale: f64,
  pub max_frames: Option<usize>,
  // Set from a signal handler to stop after the current frame.
  pub interrupted: Arc<AtomicBool>,
  // Annotated copy of the current frame.
  pub canvas: VideoFrame,
}

impl Pipeline {
  // Returns false once there is nothing more to process.
  pub fn step(&mut self) -> Result<bool> {
    if self.interrupted.load(Ordering::Relaxed) {
      info!("Interrupted after {} frames.", self.manager.stats().frames);
      return Ok(false);
    }
    if let Some(max_frames) = self.max_frames {
      if self.manager.stats().frames >= max_frames { return Ok(false) }
    }
    let frame = match self.input.next()? {
      Some(frame) => frame,
      None => return Ok(false),
    };
    let image = Image::from_rgb(&frame.data, frame.width, frame.height)?;
    self.canvas.width = frame.width;
    self.canvas.height = frame.height;
    self.canvas.data.clear();
    self.canvas.data.extend_from_slice(&frame.data);

    self.manager.process(image)?;
    let report = self.manager.report();
    let tracks = self.manager.tracks();
    visualize(&mut self.canvas, report, tracks, self.arrow_scale);
    if let Some(track_log) = &mut self.track_log {
      track_log.write(report, tracks)?;
    }
    if let Some(output) = &mut self.output {
      output.write(&self.canvas)?;
    }
    Ok(true)
  }

  pub fn finish(&mut self) -> Result<()> {
    if let Some(track_log) = &mut self.track_log {
      track_log.flush()?;
    }
    if let Some(output) = &mut self.output {
      output.finish()?;
    }
    let stats = self.manager.stats();
    info!("Processed {} frames, spawned {} tracks, removed {} tracks, {} still active.",
      stats.frames, stats.spawned, stats.removed, self.manager.tracks().len());
    Ok(())
  }
}

pub struct EventLoopArgs<'a> {
  pub pipeline: &'a mut Pipeline,
  pub buffer: &'a mut Vec<u32>,
  pub graphics_context: &'a mut GraphicsContext<Window>,
}

// Shows the annotated frames in a window. Escape or Q stops early.
pub fn run_window(pipeline: &mut Pipeline) -> Result<()> {
  let [width, height] = pipeline.input.size();
  let size = winit::dpi::PhysicalSize::new(width as u32, height as u32);
  let mut event_loop = EventLoop::new();
  let window = WindowBuilder::new()
    .with_title("trackfly")
    .with_resizable(false)
    .with_min_inner_size(size)
    .with_max_inner_size(size)
    .build(&event_loop)
    .context("Failed to create window.")?;
  let mut graphics_context = unsafe { GraphicsContext::new(window) }
    .map_err(|_| anyhow!("Failed to create graphics context."))?;

  let mut buffer = vec![];
  let mut args = EventLoopArgs {
    pipeline,
    buffer: &mut buffer,
    graphics_context: &mut graphics_context,
  };
  let mut result = Ok(());
  event_loop.run_return(|event, _, control_flow| {
    if let Err(err) = handle_event(event, control_flow, &mut args) {
      result = Err(err);
      *control_flow = ControlFlow::Exit;
    }
  });
  result
}

pub fn handle_event(
  event: Event<()>,
  control_flow: &mut ControlFlow,
  args: &mut EventLoopArgs,
) -> Result<()> {
  if *control_flow != ControlFlow::Exit {
    *control_flow = ControlFlow::Poll;
  }
  let (window_width, window_height) = {
    let size = args.graphics_context.window().inner_size();
    (size.width as usize, size.height as usize)
  };
  if args.buffer.len() != window_width * window_height {
    *args.buffer = vec![0; window_width * window_height];
  }

  match event {
    Event::RedrawRequested(window_id) if window_id == args.graphics_context.window().id() => {
      args.graphics_context.set_buffer(&args.buffer, window_width as u16, window_height as u16);
    },
    Event::WindowEvent {
      event,
      window_id,
    } => {
      if event == WindowEvent::CloseRequested && window_id == args.graphics_context.window().id() {
        *control_flow = ControlFlow::Exit;
      }
      match event {
        WindowEvent::KeyboardInput {
          input: KeyboardInput {
            state: ElementState::Pressed,
            virtual_keycode: Some(keycode),
            ..
          },
          ..
        } => {
          match keycode {
            VirtualKeyCode::Escape | VirtualKeyCode::Q => {
              info!("Stopped by user.");
              *control_flow = ControlFlow::Exit;
            },
            _ => {}, // Other keys.
          }
        },
        _ => {}, // Other window events.
      }
    },
    Event::MainEventsCleared if *control_flow != ControlFlow::Exit => {
      if !args.pipeline.step()? {
        *control_flow = ControlFlow::Exit;
        return Ok(());
      }
      let canvas = &args.pipeline.canvas;
      for i in 0..canvas.height {
        if i >= window_height { continue }
        for j in 0..canvas.width {
          if j >= window_width { continue }
          let k = 3 * (i * canvas.width + j);
          let rgb = &canvas.data[k..k + 3];
          args.buffer[i * window_width + j] = (rgb[0] as u32) << 16 | (rgb[1] as u32) << 8 | rgb[2] as u32;
        }
      }
      args.graphics_context.window().request_redraw();
    },
    _ => {}, // Other events.
  }
  Ok(())
}
