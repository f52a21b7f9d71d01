use crate::all::*;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackEventKind {
  Spawn,
  Remove,
}

#[derive(Debug, Serialize)]
pub struct TrackEvent {
  pub frame: usize,
  pub event: TrackEventKind,
  pub id: TrackId,
  pub x: f64,
  pub y: f64,
}

// Writes track creations and removals as JSON lines.
pub struct TrackLog<W: Write> {
  writer: W,
}

impl TrackLog<BufWriter<File>> {
  pub fn create(path: &Path) -> Result<TrackLog<BufWriter<File>>> {
    let file = File::create(path)
      .context(format!("Failed to create track log {}.", path.display()))?;
    Ok(TrackLog::new(BufWriter::new(file)))
  }
}

impl<W: Write> TrackLog<W> {
  pub fn new(writer: W) -> TrackLog<W> {
    TrackLog { writer }
  }

  // Removed tracks are logged at their last position, spawned ones at their
  // seed point.
  pub fn write(&mut self, report: &FrameReport, tracks: &[Track]) -> Result<()> {
    for id in &report.removed {
      let position = report.flows.iter().find(|x| x.id == *id).map(|x| x.new);
      self.write_event(report.frame_number, TrackEventKind::Remove, *id, position)?;
    }
    for id in &report.spawned {
      let position = tracks.iter().find(|x| x.id == *id).map(|x| x.position());
      self.write_event(report.frame_number, TrackEventKind::Spawn, *id, position)?;
    }
    Ok(())
  }

  fn write_event(
    &mut self,
    frame: usize,
    event: TrackEventKind,
    id: TrackId,
    position: Option<Vector2d>,
  ) -> Result<()> {
    let position = position.ok_or(anyhow!("No position for track {}.", id))?;
    let event = TrackEvent { frame, event, id, x: position[0], y: position[1] };
    serde_json::to_writer(&mut self.writer, &event)?;
    self.writer.write_all(b"\n")?;
    Ok(())
  }

  pub fn flush(&mut self) -> Result<()> {
    self.writer.flush().context("Failed to flush track log.")
  }

  #[cfg(test)]
  pub fn into_inner(self) -> W {
    self.writer
  }
}
