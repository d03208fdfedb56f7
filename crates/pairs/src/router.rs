use crate::error::RouteError;
use crate::handle::ConnectionHandle;
use crate::metrics::counters;
use crate::registry::Registry;
use pair_common::{Envelope, PeerId};
use std::sync::Arc;

/// Relays envelopes to the connection registered under their `to` id.
///
/// Delivery is single-hop and best effort: there is no retry and nothing
/// is buffered for peers that are not connected.
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<Registry>,
}

impl Router {
    /// Create a router over `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// The registry this router resolves recipients in.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Deliver `envelope` unchanged to its recipient.
    ///
    /// # Errors
    ///
    /// - [`RouteError::UnknownRecipient`] if `to` is not registered
    /// - [`RouteError::DeliveryFailed`] if the write to the recipient fails
    /// - [`RouteError::UnknownType`] for envelopes outside the protocol
    /// - [`RouteError::NotRoutable`] for `register`, which only the
    ///   receiving connection can act on
    pub async fn route(&self, envelope: &Envelope) -> Result<(), RouteError> {
        let to = match envelope {
            Envelope::OfferOrAnswer { to, .. } | Envelope::Forward { to, .. } => to,
            Envelope::Unknown { kind } => {
                counters::messages_dropped_total("unknown_type");
                return Err(RouteError::UnknownType(kind.clone()));
            }
            Envelope::Register { .. } => {
                return Err(RouteError::NotRoutable(pair_common::types::tag::REGISTER));
            }
        };

        let handle = self.resolve(to)?;
        match handle.send(envelope).await {
            Ok(()) => {
                counters::messages_relayed_total(envelope.kind());
                tracing::debug!(
                    kind = envelope.kind(),
                    from = envelope.sender().map(PeerId::as_str),
                    to = %to,
                    conn = %handle.id(),
                    "relayed envelope"
                );
                Ok(())
            }
            Err(source) => {
                counters::messages_dropped_total("delivery_failed");
                Err(RouteError::DeliveryFailed {
                    to: to.clone(),
                    source,
                })
            }
        }
    }

    fn resolve(&self, to: &PeerId) -> Result<ConnectionHandle, RouteError> {
        self.registry.find(to).ok_or_else(|| {
            counters::messages_dropped_total("unknown_recipient");
            RouteError::UnknownRecipient(to.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SendError;
    use crate::handle::testing::{channel_handle, drain_text};

    fn peer(id: &str) -> PeerId {
        PeerId::new(id).unwrap()
    }

    fn router() -> Router {
        Router::new(Arc::new(Registry::new()))
    }

    #[tokio::test]
    async fn offer_is_delivered_to_recipient_only() {
        let router = router();
        let (alice, mut alice_rx) = channel_handle();
        let (bob, mut bob_rx) = channel_handle();
        router.registry().register(peer("alice"), alice).unwrap();
        router.registry().register(peer("bob"), bob).unwrap();

        let offer = Envelope::offer(peer("bob"), peer("alice"), "v=0...");
        router.route(&offer).await.unwrap();

        assert_eq!(
            drain_text(&mut alice_rx),
            vec![r#"{"type":"offer","from":"bob","to":"alice","sdp":"v=0..."}"#.to_string()]
        );
        assert!(drain_text(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn answer_and_forward_keep_their_type() {
        let router = router();
        let (bob, mut bob_rx) = channel_handle();
        router.registry().register(peer("bob"), bob).unwrap();

        let answer = Envelope::answer(peer("alice"), peer("bob"), "v=0 answer");
        let forward = Envelope::forward(peer("alice"), peer("bob"), "ice-candidate");
        router.route(&answer).await.unwrap();
        router.route(&forward).await.unwrap();

        let received: Vec<Envelope> = drain_text(&mut bob_rx)
            .iter()
            .map(|t| Envelope::decode_str(t).unwrap())
            .collect();
        assert_eq!(received, vec![answer, forward]);
    }

    #[tokio::test]
    async fn unknown_recipient_delivers_nothing() {
        let router = router();
        let (bob, mut bob_rx) = channel_handle();
        router.registry().register(peer("bob"), bob).unwrap();

        let offer = Envelope::offer(peer("bob"), peer("alice"), "v=0");
        let err = router.route(&offer).await.unwrap_err();

        assert!(matches!(err, RouteError::UnknownRecipient(ref id) if id.as_str() == "alice"));
        assert!(drain_text(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn released_recipient_is_unknown() {
        let router = router();
        let (alice, mut alice_rx) = channel_handle();
        let conn = alice.id();
        router.registry().register(peer("alice"), alice).unwrap();
        router.registry().unregister(&peer("alice"), conn);

        let offer = Envelope::offer(peer("bob"), peer("alice"), "v=0");
        let err = router.route(&offer).await.unwrap_err();

        assert!(matches!(err, RouteError::UnknownRecipient(ref id) if id.as_str() == "alice"));
        assert!(drain_text(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn closed_recipient_reports_delivery_failed() {
        let router = router();
        let (alice, _rx) = channel_handle();
        router.registry().register(peer("alice"), alice.clone()).unwrap();
        alice.close().await;

        let forward = Envelope::forward(peer("bob"), peer("alice"), "late");
        let err = router.route(&forward).await.unwrap_err();

        assert!(matches!(
            err,
            RouteError::DeliveryFailed {
                source: SendError::Closed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unknown_type_is_never_routed() {
        let router = router();
        let err = router
            .route(&Envelope::Unknown {
                kind: "candidate".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::UnknownType(ref k) if k == "candidate"));
    }

    #[tokio::test]
    async fn register_is_not_routable() {
        let router = router();
        let err = router
            .route(&Envelope::register(peer("alice")))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::NotRoutable("register")));
        assert!(router.registry().is_empty());
    }
}
