//! Avatar rendering over a peer-to-peer media session.

pub mod media;
pub mod negotiation;

pub use media::{
    DataChannelHandler, MediaKind, MediaTrack, PeerConnection, PeerConnectionFactory,
    RenderSurface, SdpType, SessionDescription, TrackHandler,
};
pub use negotiation::{decode_sdp, encode_sdp, AvatarNegotiator, AvatarSession};
