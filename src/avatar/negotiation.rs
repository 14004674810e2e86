//! Avatar media negotiation over the realtime session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::media::{
    MediaKind, PeerConnection, PeerConnectionFactory, RenderSurface, SessionDescription,
};
use crate::error::ParleyError;
use crate::realtime::{ClientEvent, IceServer, TurnSender};

const CONTROL_CHANNEL_LABEL: &str = "eventChannel";

/// Encode a description the way `session.avatar.connect` expects it.
pub fn encode_sdp(description: &SessionDescription) -> Result<String, ParleyError> {
    Ok(STANDARD.encode(serde_json::to_string(description)?))
}

/// Decode the `server_sdp` of `session.avatar.connecting`.
pub fn decode_sdp(encoded: &str) -> Result<SessionDescription, ParleyError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ParleyError::Negotiation(format!("Answer is not valid base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ParleyError::Negotiation(format!("Answer is not a session description: {e}")))
}

/// An established avatar media session.
pub struct AvatarSession {
    pub ice_servers: Vec<IceServer>,
    pub local: SessionDescription,
    pub remote: SessionDescription,
    peer: Arc<dyn PeerConnection>,
    surface: Option<Arc<dyn RenderSurface>>,
}

impl std::fmt::Debug for AvatarSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarSession")
            .field("ice_servers", &self.ice_servers.len())
            .finish_non_exhaustive()
    }
}

impl AvatarSession {
    /// Release the peer connection and detach the surface.
    pub async fn close(self) -> Result<(), ParleyError> {
        if let Some(surface) = &self.surface {
            surface.detach();
        }
        self.peer.close().await
    }
}

/// Drives offer/answer for one avatar session. Renegotiation is not
/// supported; recovery is a full reconnect.
pub struct AvatarNegotiator {
    factory: Arc<dyn PeerConnectionFactory>,
    surface: Option<Arc<dyn RenderSurface>>,
    /// Wait after setting the local offer so candidate gathering can make
    /// progress. A fixed delay, not a gathering-complete barrier.
    settle_delay: Duration,
}

impl AvatarNegotiator {
    pub fn new(
        factory: Arc<dyn PeerConnectionFactory>,
        surface: Option<Arc<dyn RenderSurface>>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            factory,
            surface,
            settle_delay,
        }
    }

    /// Negotiate a media session.
    ///
    /// `answer` resolves to the encoded server answer; it is polled only after
    /// the offer has been sent. The peer connection is closed on failure.
    pub async fn negotiate<A>(
        &self,
        ice_servers: Vec<IceServer>,
        sender: &dyn TurnSender,
        answer: A,
    ) -> Result<AvatarSession, ParleyError>
    where
        A: Future<Output = Result<String, ParleyError>> + Send,
    {
        let peer = self.factory.create(&ice_servers).await.map_err(as_negotiation)?;
        match self.exchange(&peer, sender, answer).await {
            Ok((local, remote)) => {
                tracing::info!(ice_servers = ice_servers.len(), "avatar media session established");
                Ok(AvatarSession {
                    ice_servers,
                    local,
                    remote,
                    peer,
                    surface: self.surface.clone(),
                })
            }
            Err(error) => {
                if let Err(close_error) = peer.close().await {
                    tracing::warn!(error = %close_error, "failed to close avatar peer connection");
                }
                if let Some(surface) = &self.surface {
                    surface.detach();
                }
                Err(as_negotiation(error))
            }
        }
    }

    async fn exchange<A>(
        &self,
        peer: &Arc<dyn PeerConnection>,
        sender: &dyn TurnSender,
        answer: A,
    ) -> Result<(SessionDescription, SessionDescription), ParleyError>
    where
        A: Future<Output = Result<String, ParleyError>> + Send,
    {
        if let Some(surface) = &self.surface {
            let surface = surface.clone();
            peer.on_track(Arc::new(move |track| {
                tracing::debug!(track = %track.id, kind = %track.kind, "avatar track received");
                surface.attach(track);
            }));
        }
        peer.on_data_channel_message(Arc::new(|message| {
            tracing::debug!(%message, "avatar control message");
        }));

        peer.add_transceiver(MediaKind::Video).await?;
        peer.add_transceiver(MediaKind::Audio).await?;
        peer.create_data_channel(CONTROL_CHANNEL_LABEL).await?;

        let offer = peer.create_offer().await?;
        peer.set_local_description(offer.clone()).await?;
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        let local = peer.local_description().await.unwrap_or(offer);

        sender
            .send_event(ClientEvent::AvatarConnect {
                client_sdp: encode_sdp(&local)?,
            })
            .await?;

        let remote = decode_sdp(&answer.await?)?;
        peer.set_remote_description(remote.clone()).await?;
        Ok((local, remote))
    }
}

fn as_negotiation(error: ParleyError) -> ParleyError {
    match error {
        ParleyError::Negotiation(_) => error,
        other => ParleyError::Negotiation(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::media::{DataChannelHandler, MediaTrack, TrackHandler};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakePeer {
        calls: Mutex<Vec<String>>,
        track_handler: Mutex<Option<TrackHandler>>,
    }

    impl FakePeer {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    #[async_trait]
    impl PeerConnection for FakePeer {
        async fn add_transceiver(&self, kind: MediaKind) -> Result<(), ParleyError> {
            self.record(format!("transceiver:{kind}"));
            Ok(())
        }
        async fn create_data_channel(&self, label: &str) -> Result<(), ParleyError> {
            self.record(format!("data:{label}"));
            Ok(())
        }
        fn on_track(&self, handler: TrackHandler) {
            *self.track_handler.lock().unwrap() = Some(handler);
        }
        fn on_data_channel_message(&self, _handler: DataChannelHandler) {}
        async fn create_offer(&self) -> Result<SessionDescription, ParleyError> {
            self.record("offer");
            Ok(SessionDescription::offer("v=0 offer"))
        }
        async fn set_local_description(&self, _d: SessionDescription) -> Result<(), ParleyError> {
            self.record("local");
            Ok(())
        }
        async fn local_description(&self) -> Option<SessionDescription> {
            Some(SessionDescription::offer("v=0 offer+candidates"))
        }
        async fn set_remote_description(&self, d: SessionDescription) -> Result<(), ParleyError> {
            self.record(format!("remote:{}", d.sdp));
            Ok(())
        }
        async fn close(&self) -> Result<(), ParleyError> {
            self.record("close");
            Ok(())
        }
    }

    struct FakeFactory(Arc<FakePeer>);

    #[async_trait]
    impl PeerConnectionFactory for FakeFactory {
        async fn create(
            &self,
            _ice_servers: &[IceServer],
        ) -> Result<Arc<dyn PeerConnection>, ParleyError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct CapturingSender(Mutex<Vec<ClientEvent>>);

    #[async_trait]
    impl TurnSender for CapturingSender {
        async fn send_event(&self, event: ClientEvent) -> Result<(), ParleyError> {
            self.0.lock().unwrap().push(event);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Surface(Mutex<Vec<String>>);

    impl RenderSurface for Surface {
        fn attach(&self, track: MediaTrack) {
            self.0.lock().unwrap().push(format!("attach:{}", track.kind));
        }
        fn detach(&self) {
            self.0.lock().unwrap().push("detach".into());
        }
    }

    #[tokio::test]
    async fn offer_is_sent_and_answer_applied() {
        let peer = Arc::new(FakePeer::default());
        let surface = Arc::new(Surface::default());
        let negotiator = AvatarNegotiator::new(
            Arc::new(FakeFactory(peer.clone())),
            Some(surface.clone()),
            Duration::ZERO,
        );
        let sender = CapturingSender::default();
        let answer = encode_sdp(&SessionDescription::answer("v=0 answer")).unwrap();

        let session = negotiator
            .negotiate(Vec::new(), &sender, async move { Ok(answer) })
            .await
            .unwrap();

        assert_eq!(
            *peer.calls.lock().unwrap(),
            vec![
                "transceiver:video",
                "transceiver:audio",
                "data:eventChannel",
                "offer",
                "local",
                "remote:v=0 answer",
            ]
        );
        let sent = sender.0.lock().unwrap().clone();
        let ClientEvent::AvatarConnect { client_sdp } = &sent[0] else {
            panic!("expected avatar connect, got {sent:?}");
        };
        assert_eq!(
            decode_sdp(client_sdp).unwrap(),
            SessionDescription::offer("v=0 offer+candidates")
        );

        let handler = peer.track_handler.lock().unwrap().clone().unwrap();
        handler(MediaTrack {
            id: "t1".into(),
            kind: MediaKind::Video,
        });
        session.close().await.unwrap();
        assert_eq!(*surface.0.lock().unwrap(), vec!["attach:video", "detach"]);
        assert_eq!(peer.calls.lock().unwrap().last().unwrap(), "close");
    }

    #[tokio::test]
    async fn missing_answer_closes_the_peer() {
        let peer = Arc::new(FakePeer::default());
        let negotiator =
            AvatarNegotiator::new(Arc::new(FakeFactory(peer.clone())), None, Duration::ZERO);
        let sender = CapturingSender::default();

        let error = negotiator
            .negotiate(Vec::new(), &sender, async {
                Err(ParleyError::Transport("closed".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(error, ParleyError::Negotiation(_)));
        assert_eq!(peer.calls.lock().unwrap().last().unwrap(), "close");
    }

    #[test]
    fn garbage_answer_is_a_negotiation_error() {
        assert!(matches!(
            decode_sdp("not base64!"),
            Err(ParleyError::Negotiation(_))
        ));
    }
}
