// Audio pipeline
// Uses Symphonia for decoding, rubato for rate conversion and cpal for output

pub mod decoder;
pub mod output;
pub mod resampler;

pub use decoder::ClipDecoder;
pub use output::AudioOutput;
pub use resampler::Resampler;
