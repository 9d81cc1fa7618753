mod docker;
mod native;

pub use docker::DockerBackend;
pub use native::NativeBackend;
