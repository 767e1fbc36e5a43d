//! # Data Module
//!
//! In-memory representations of the analysis input: markers, samples,
//! the phased allele matrix with its reverse-orientation mirrors, the
//! genetic map, and shared IBD segments.
//!
//! ## Design Philosophy
//! - **Zero-cost newtypes:** `SampleIdx` and `HapIdx` prevent index bugs
//!   at compile time with no runtime overhead.
//! - **Immutable sharing:** `MarkerFrame` is built once, then shared by
//!   reference across all workers; the reverse orientation is a virtual
//!   view that remaps marker indices at read time.

pub mod frame;
pub mod genetic_map;
pub mod haplotype;
pub mod marker;
pub mod segment;

pub use frame::{FrameView, MarkerFrame, Orientation};
pub use genetic_map::{ChromMap, GeneticMap};
pub use haplotype::{HapIdx, SampleIdx, Samples};
pub use marker::{Marker, Markers};
pub use segment::{SegmentParser, SharedSegment};
