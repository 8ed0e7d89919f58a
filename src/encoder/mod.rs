pub mod standard_encoder;

pub use self::standard_encoder::StandardEncoder;
