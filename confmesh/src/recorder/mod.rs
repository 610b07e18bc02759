mod backend;
mod buffer;
mod listener;
mod manager;
mod sim;
mod sink;

pub use backend::{AudioEncoder, RecorderBackend, RecordingFormat};
pub use buffer::{RecordingArtifact, RecordingBuffer, artifact_file_name};
pub use listener::{RecordingListener, StubListener};
pub use manager::AudioRecorder;
pub use sim::SimulatedRecorderBackend;
pub use sink::{ArtifactSink, DirectorySink, SavedRecording};
