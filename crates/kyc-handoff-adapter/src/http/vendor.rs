/*
[INPUT]:  Vendor client credentials, session request
[OUTPUT]: VerificationSession straight from the vendor
[POS]:    HTTP layer - server side of the exchange (client-credentials + KYC initiation)
[UPDATE]: When vendor endpoints or payload fields change
*/

use async_trait::async_trait;
use reqwest::Method;
use tracing::{info, warn};

use crate::config::VendorConfig;
use crate::http::session::session_from_response;
use crate::http::{
    InFlightAddresses, KycClient, KycError, Result, SessionInitiator, SessionRequest,
};
use crate::types::{
    ClientCredentialsRequest, KycResponse, VendorKycRequest, VendorTokenResponse,
    VerificationSession,
};

/// Session initiator holding vendor service credentials
#[derive(Debug, Clone)]
pub struct VendorSessionInitiator {
    client: KycClient,
    config: VendorConfig,
    blockchain: String,
    in_flight: InFlightAddresses,
}

impl VendorSessionInitiator {
    pub fn new(client: KycClient, config: VendorConfig, blockchain: impl Into<String>) -> Self {
        Self {
            client,
            config,
            blockchain: blockchain.into(),
            in_flight: InFlightAddresses::new(),
        }
    }

    /// Share an in-flight registry with other initiators
    pub fn with_in_flight(mut self, in_flight: InFlightAddresses) -> Self {
        self.in_flight = in_flight;
        self
    }

    /// Client-credentials exchange; independent of the user's signature
    pub async fn fetch_service_token(&self) -> Result<String> {
        let body = ClientCredentialsRequest {
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
        };
        let builder = self
            .client
            .request(Method::POST, &self.config.auth_endpoint)?
            .json(&body);

        let outcome = self
            .client
            .send::<VendorTokenResponse>(builder)
            .await
            .map_err(|e| KycError::AuthBackend(e.to_string()))?;

        match outcome {
            Ok(token) if !token.access_token.is_empty() => Ok(token.access_token),
            Ok(_) => Err(KycError::AuthBackend("empty access token".to_string())),
            Err(failure) => {
                warn!(
                    status = failure.status.as_u16(),
                    "vendor rejected service credentials"
                );
                Err(KycError::AuthBackend(format!(
                    "vendor returned {}: {}",
                    failure.status,
                    failure.message()
                )))
            }
        }
    }

    /// Build the vendor KYC initiation body
    pub fn build_payload(&self, request: &SessionRequest) -> VendorKycRequest {
        VendorKycRequest::new(
            self.config.action_type.clone(),
            request.level,
            self.blockchain.clone(),
            &request.wallet_address,
            request.signed.as_ref(),
        )
    }

    pub async fn initiate_kyc(
        &self,
        access_token: &str,
        request: &SessionRequest,
    ) -> Result<VerificationSession> {
        let payload = self.build_payload(request);
        let builder = self
            .client
            .request(Method::POST, &self.config.kyc_endpoint)?
            .bearer_auth(access_token)
            .json(&payload);

        match self.client.send::<KycResponse>(builder).await? {
            Ok(response) => session_from_response(request, response),
            Err(failure) => Err(KycError::verification_rejected(
                failure.status,
                failure.message(),
                failure.raw.clone(),
            )),
        }
    }
}

#[async_trait]
impl SessionInitiator for VendorSessionInitiator {
    async fn initiate(&self, request: SessionRequest) -> Result<VerificationSession> {
        let _claim = self.in_flight.claim(&request.wallet_address)?;
        info!(
            address = %request.wallet_address,
            level = request.level.as_u8(),
            blockchain = %self.blockchain,
            "initiating verification session with vendor"
        );

        let token = self.fetch_service_token().await?;
        self.initiate_kyc(&token, &request).await
    }
}
