//! Services around the matting pipeline: image I/O, output encoding and the
//! remote removal client

pub mod format;
pub mod io;
pub mod removebg;

pub use format::OutputFormatHandler;
pub use io::ImageIOService;
pub use removebg::{ImageUpload, RemoveBgClient, RemoveBgOptions};
