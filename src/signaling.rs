//! Offer/answer exchange and candidate relay against the media server.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::WidgetConfig;
use crate::error::{SignalingError, VoiceError};
use crate::peer::types::{IceCandidate, IceServerList, SdpType, SessionDescription};
use crate::session::SessionId;

const TURN_CREDENTIALS_PATH: &str = "/webrtc/turn-credentials";
const OFFER_PATH: &str = "/webrtc/offer";

#[async_trait]
pub trait Signaling: Send + Sync {
    /// Never fails: any problem yields [`IceServerList::fallback`].
    async fn fetch_ice_servers(&self) -> IceServerList;

    /// Sends the local offer and returns the validated remote answer. No retries.
    async fn exchange_offer(
        &self,
        offer: &SessionDescription,
        session: &SessionId,
    ) -> Result<SessionDescription, SignalingError>;

    /// Fire-and-forget; failures are logged and swallowed.
    async fn relay_candidate(&self, candidate: &IceCandidate, session: &SessionId);
}

/// Checks that the server answered with `{ sdp, type }` before anything is
/// applied to the transport.
pub fn parse_answer(body: Value) -> Result<SessionDescription, SignalingError> {
    let Value::Object(map) = body else {
        return Err(SignalingError::MalformedResponse(
            "response is not an object".to_owned(),
        ));
    };

    let field = |name: &str| {
        map.get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };
    let (Some(sdp), Some(kind)) = (field("sdp"), field("type")) else {
        return Err(SignalingError::MalformedResponse(
            "missing sdp or type".to_owned(),
        ));
    };
    let sdp_type = match SdpType::parse(kind) {
        Some(t @ (SdpType::Answer | SdpType::Pranswer)) => t,
        _ => {
            return Err(SignalingError::MalformedResponse(format!(
                "unexpected description type {kind:?}"
            )))
        }
    };

    Ok(SessionDescription {
        sdp: sdp.to_owned(),
        sdp_type,
    })
}

#[derive(Clone)]
pub struct HttpSignaling {
    client: Client,
    base_url: String,
}

impl HttpSignaling {
    pub fn new(config: &WidgetConfig) -> Result<Self, SignalingError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = config.bearer_token() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| SignalingError::Request(format!("invalid auth token: {e}")))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| SignalingError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn try_fetch_ice_servers(&self) -> Result<IceServerList, VoiceError> {
        let relay_err = VoiceError::RelayConfigUnavailable;

        let resp = self
            .client
            .get(self.url(TURN_CREDENTIALS_PATH))
            .send()
            .await
            .map_err(|e| relay_err(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(relay_err(format!("status {status}")));
        }
        let list = resp
            .json::<IceServerList>()
            .await
            .map_err(|e| relay_err(e.to_string()))?;
        if list.ice_servers.is_empty() {
            return Err(relay_err("empty server list".to_owned()));
        }
        Ok(list)
    }
}

#[async_trait]
impl Signaling for HttpSignaling {
    async fn fetch_ice_servers(&self) -> IceServerList {
        match self.try_fetch_ice_servers().await {
            Ok(list) => {
                info!(count = list.ice_servers.len(), "fetched relay configuration");
                list
            }
            Err(e) => {
                warn!("{e}; using fallback rendezvous server");
                IceServerList::fallback()
            }
        }
    }

    async fn exchange_offer(
        &self,
        offer: &SessionDescription,
        session: &SessionId,
    ) -> Result<SessionDescription, SignalingError> {
        let body = json!({
            "sdp": offer.sdp,
            "type": offer.sdp_type,
            "webrtc_id": session,
        });
        debug!(session = %session, "sending offer");

        let resp = self
            .client
            .post(self.url(OFFER_PATH))
            .json(&body)
            .send()
            .await
            .map_err(|e| SignalingError::Request(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SignalingError::Status(status.as_u16()));
        }

        let value = resp
            .json::<Value>()
            .await
            .map_err(|e| SignalingError::MalformedResponse(e.to_string()))?;
        let answer = parse_answer(value)?;
        debug!(session = %session, "received answer");
        Ok(answer)
    }

    async fn relay_candidate(&self, candidate: &IceCandidate, session: &SessionId) {
        let body = json!({
            "candidate": candidate,
            "webrtc_id": session,
            "type": "ice-candidate",
        });

        match self.client.post(self.url(OFFER_PATH)).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(session = %session, "candidate relayed")
            }
            Ok(resp) => warn!(session = %session, status = %resp.status(), "candidate relay rejected"),
            Err(e) => warn!(session = %session, "error sending ICE candidate: {e}"),
        }
    }
}
