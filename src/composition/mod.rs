//! Offline composition: trimmed tracks on a fresh timeline, the video layer transform, and the
//! stacked background / video / annotation layers.

pub mod builder;
pub mod model;

pub use builder::CompositionOpts;
pub use model::{
    Composition, CompositionDescriptor, CompositionTrack, LayerInstruction, LayerStack, TrackKind,
    VideoComposition,
};
