#[cfg(feature = "glam")]
mod glam;
