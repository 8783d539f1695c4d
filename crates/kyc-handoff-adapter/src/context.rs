/*
[INPUT]:  Validated HandoffConfig
[OUTPUT]: Shared HTTP pool, in-flight registry and shutdown token for all flows
[POS]:    Application context - constructed once, passed to every component
[UPDATE]: When adding process-wide shared resources
*/

use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::ChallengeBuilder;
use crate::config::HandoffConfig;
use crate::flow::FlowController;
use crate::http::{
    ClientConfig, InFlightAddresses, KycClient, KycError, ProxySessionInitiator, Result,
    SessionInitiator, VendorSessionInitiator,
};
use crate::widget::WidgetRuntime;

/// Process-wide resources shared by every flow
#[derive(Debug, Clone)]
pub struct HandoffContext {
    config: Arc<HandoffConfig>,
    http_client: Client,
    in_flight: InFlightAddresses,
    shutdown: CancellationToken,
}

impl HandoffContext {
    pub fn new(config: HandoffConfig) -> Result<Self> {
        config.validate()?;
        let client_config = ClientConfig::from(&config.http);
        let http_client = Client::builder()
            .timeout(client_config.timeout)
            .connect_timeout(client_config.connect_timeout)
            .build()?;
        info!(
            api = %config.api_base_url,
            origin = %config.uri(),
            chain_id = config.chain_id,
            "handoff context ready"
        );
        Ok(Self {
            config: Arc::new(config),
            http_client,
            in_flight: InFlightAddresses::new(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &HandoffConfig {
        &self.config
    }

    pub fn in_flight(&self) -> &InFlightAddresses {
        &self.in_flight
    }

    /// Initiator talking to the backend proxy
    pub fn proxy_initiator(&self) -> Result<ProxySessionInitiator> {
        let client =
            KycClient::with_http_client(self.http_client.clone(), self.config.api_base_url.as_str())?;
        Ok(ProxySessionInitiator::with_in_flight(client, self.in_flight.clone()))
    }

    /// Initiator talking to the vendor directly; needs the `vendor` block
    pub fn vendor_initiator(&self) -> Result<VendorSessionInitiator> {
        let vendor = self
            .config
            .vendor
            .clone()
            .ok_or_else(|| KycError::Config("vendor credentials are not configured".to_string()))?;
        let client = KycClient::with_http_client(self.http_client.clone(), vendor.base_url.as_str())?;
        Ok(VendorSessionInitiator::new(client, vendor, self.config.blockchain.clone())
            .with_in_flight(self.in_flight.clone()))
    }

    pub fn challenge_builder(&self) -> Result<ChallengeBuilder> {
        ChallengeBuilder::from_config(&self.config)
    }

    pub fn flow_controller(
        &self,
        initiator: Arc<dyn SessionInitiator>,
        runtime: Arc<dyn WidgetRuntime>,
    ) -> Result<FlowController> {
        FlowController::new(self, initiator, runtime)
    }

    /// Stop every flow created from this context
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("handoff context shutting down");
        }
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
