pub mod cancel;
pub mod config;
pub mod ffmpeg;
pub mod pipeline;
