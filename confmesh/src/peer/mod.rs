mod connection;
mod participant;
mod registry;
mod sim;

pub use connection::{
    IceCandidateError, IceConnectionState, PeerConnection, PeerConnectionFactory, PeerObserver,
    SignalingState,
};
pub use participant::{Participant, ParticipantView};
pub use registry::{PeerConnectionRegistry, PeerEvent, PeerEventKind};
pub use sim::{SimulatedPeerConnection, SimulatedPeerFactory};
