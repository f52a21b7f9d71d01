// NOTE This kind of import-all file isn't a common Rust idiom.

pub use crate::{
  background::*,
  clustering::*,
  detector::*,
  event_loop::*,
  frame::*,
  image::*,
  optical_flow::*,
  parameters::*,
  pyramid::*,
  synthetic::*,
  track::*,
  track_log::*,
  tracker::*,
  types::*,
  util::*,
  video::*,
  visualize::*,
};

pub use {
  std::{
    collections::VecDeque,
    fmt,
    mem,
    fs::File,
    io::{BufWriter, Read, Write},
    ops::Index,
    path::{Path, PathBuf},
    sync::{Arc, atomic::{AtomicBool, Ordering}},
  },
  log::{debug, error, info, warn, LevelFilter},
  nalgebra::{dmatrix, DMatrix},
  anyhow::{anyhow, bail, Context as AnyhowContext, Result},
  serde::{Deserialize, Serialize},
};
