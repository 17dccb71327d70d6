pub mod gainfile;
pub mod raw;

#[cfg(feature = "audio")]
pub mod audio;
