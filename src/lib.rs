pub mod config;
pub mod controller;
pub mod convert;
pub mod dom;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod registry;
pub mod render;
pub mod script;
pub mod throttle;
#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{DragConfig, load_config, parse_config};
pub use controller::{Controller, DragState, PointerEvent};
pub use convert::{isolate, local_to_screen, owner_svg, screen_to_local};
pub use dom::{Document, EventKind, ListenTarget, MemoryDocument, NodeId};
pub use error::{DragError, Result};
pub use geometry::{Matrix, Point, Rect, Vector};
pub use layout::{FixedGeometry, GeometryProvider, SvgLayout};
pub use registry::{DispatchOutcome, DragManager};
pub use throttle::{Clock, ManualClock, SystemClock, Throttle};
