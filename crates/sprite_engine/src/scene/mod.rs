//! Scene graph
//!
//! A scene is a tree of [`GameObject`]s shared through [`ObjectRef`]
//! handles. Once per frame the root is updated: every object pushes its
//! local transform on the shared [`TransformStack`](crate::render::TransformStack),
//! queues its sequences for drawing, updates its children in name order and
//! refreshes its sounds.
//!
//! ## Object kinds
//!
//! ```text
//! Location ─┬─ Layer ─── LayerImage
//!           ├─ AnimatedObject (states, sequences)
//!           ├─ Region / PathFindRegion (polygon, walk grid)
//!           └─ Path ──> carries another object
//! ```
//!
//! Script hooks attached to animated states run synchronously inside the
//! update pass and may edit the graph while it is being walked.

mod animated;
mod kinds;
mod object;
mod shapes;
mod state;

pub use animated::AnimatedObject;
pub use kinds::{Gizmo, Layer, LayerImage, Location, ObjectKind, TextObject, LOCATION_HEIGHT, LOCATION_WIDTH};
pub use object::{GameObject, ObjectMap, ObjectRef, WeakObjectRef};
pub use shapes::{Outlined, Path, PathFindRegion, Region};
pub use state::State;
