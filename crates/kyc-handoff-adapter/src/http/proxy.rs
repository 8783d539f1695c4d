/*
[INPUT]:  Session request (wallet address, level, optional SIWE proof)
[OUTPUT]: VerificationSession from the backend proxy
[POS]:    HTTP layer - client side of POST /auth/token and POST /kyc/verify
[UPDATE]: When proxy endpoints or body shapes change
*/

use async_trait::async_trait;
use reqwest::Method;
use tracing::{info, warn};

use crate::http::session::session_from_response;
use crate::http::{
    InFlightAddresses, KycClient, KycError, Result, SessionInitiator, SessionRequest,
};
use crate::types::{AccessTokenResponse, KycResponse, SiweData, VerificationSession, VerifyRequest};

const TOKEN_ENDPOINT: &str = "auth/token";
const VERIFY_ENDPOINT: &str = "kyc/verify";

/// Session initiator talking to the application's backend proxy
#[derive(Debug, Clone)]
pub struct ProxySessionInitiator {
    client: KycClient,
    in_flight: InFlightAddresses,
}

impl ProxySessionInitiator {
    pub fn new(client: KycClient) -> Self {
        Self::with_in_flight(client, InFlightAddresses::new())
    }

    /// Share an in-flight registry with other initiators
    pub fn with_in_flight(client: KycClient, in_flight: InFlightAddresses) -> Self {
        Self { client, in_flight }
    }

    pub fn client(&self) -> &KycClient {
        &self.client
    }

    /// Step 1: service credential
    ///
    /// POST /auth/token
    pub async fn fetch_access_token(&self) -> Result<AccessTokenResponse> {
        let builder = self.client.request(Method::POST, TOKEN_ENDPOINT)?;
        let outcome = self
            .client
            .send::<AccessTokenResponse>(builder)
            .await
            .map_err(|e| KycError::AuthBackend(e.to_string()))?;

        match outcome {
            Ok(token) if !token.access.is_empty() => Ok(token),
            Ok(_) => Err(KycError::AuthBackend("empty access token".to_string())),
            Err(failure) => {
                warn!(status = failure.status.as_u16(), "access token request rejected");
                let message = failure.message();
                Err(KycError::AuthBackend(if message.is_empty() {
                    format!("token endpoint returned {}", failure.status)
                } else {
                    message
                }))
            }
        }
    }

    /// Step 2: KYC initiation
    ///
    /// POST /kyc/verify
    pub async fn verify(
        &self,
        access_token: &str,
        request: &SessionRequest,
    ) -> Result<VerificationSession> {
        let body = VerifyRequest {
            wallet_address: request.wallet_address.clone(),
            level: request.level,
            siwe_data: request.signed.as_ref().map(SiweData::from),
        };

        let builder = self
            .client
            .request(Method::POST, VERIFY_ENDPOINT)?
            .bearer_auth(access_token)
            .json(&body);

        match self.client.send::<KycResponse>(builder).await? {
            Ok(response) => session_from_response(request, response),
            Err(failure) => Err(KycError::verification_rejected(
                failure.status,
                failure.message(),
                failure.details(),
            )),
        }
    }
}

#[async_trait]
impl SessionInitiator for ProxySessionInitiator {
    async fn initiate(&self, request: SessionRequest) -> Result<VerificationSession> {
        let _claim = self.in_flight.claim(&request.wallet_address)?;
        info!(
            address = %request.wallet_address,
            level = request.level.as_u8(),
            signed = request.signed.is_some(),
            "initiating verification session via proxy"
        );

        let token = self.fetch_access_token().await?;
        let session = self.verify(&token.access, &request).await?;

        info!(
            address = %session.wallet_address,
            flow = session.flow.as_deref().unwrap_or("-"),
            "verification session created"
        );
        Ok(session)
    }
}
