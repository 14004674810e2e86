//! Peer-to-peer media boundary for avatar video.
//!
//! The WebRTC stack lives behind these traits; the negotiator only drives
//! offer/answer and wiring.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::ParleyError;
use crate::realtime::IceServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// A local or remote media description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Inbound media track handed to a render surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: MediaKind,
}

pub type TrackHandler = Arc<dyn Fn(MediaTrack) + Send + Sync>;
pub type DataChannelHandler = Arc<dyn Fn(String) + Send + Sync>;

/// One peer connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Add a send/receive transceiver.
    async fn add_transceiver(&self, kind: MediaKind) -> Result<(), ParleyError>;

    async fn create_data_channel(&self, label: &str) -> Result<(), ParleyError>;

    fn on_track(&self, handler: TrackHandler);

    fn on_data_channel_message(&self, handler: DataChannelHandler);

    async fn create_offer(&self) -> Result<SessionDescription, ParleyError>;

    async fn set_local_description(&self, description: SessionDescription)
        -> Result<(), ParleyError>;

    /// Current local description, including candidates gathered so far.
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), ParleyError>;

    /// Release the relay connection and all tracks.
    async fn close(&self) -> Result<(), ParleyError>;
}

#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        ice_servers: &[IceServer],
    ) -> Result<Arc<dyn PeerConnection>, ParleyError>;
}

/// Where inbound avatar tracks are rendered.
pub trait RenderSurface: Send + Sync {
    fn attach(&self, track: MediaTrack);

    fn detach(&self);
}
