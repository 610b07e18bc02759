mod devices;
mod manager;
mod sim;
mod stream;
mod track;

pub use devices::MediaDevices;
pub use manager::MediaCaptureManager;
pub use sim::SimulatedDevices;
pub use stream::MediaStream;
pub use track::{MediaTrack, TrackKind};
