pub mod editor;
pub mod main_context;
pub mod playback;
