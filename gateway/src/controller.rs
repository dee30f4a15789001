//! Gateway lifecycle state machine.
//!
//! The controller owns the provisioning flow and the connected-mode loop.
//! It runs on a single task; collaborators running elsewhere (the broker
//! session, the transport notification stream) hand their events over
//! through queues that the controller drains here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use bluebridge_common::TelemetryEnvelope;

use crate::channel::{InboundMessage, MessageChannel};
use crate::config::Config;
use crate::dispatch::InstructionDispatcher;
use crate::heartbeat::HeartbeatScheduler;
use crate::identity::GatewayIdentity;
use crate::provisioning::ProvisioningClient;
use crate::router::MessageRouter;

/// Provisioning progress of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No cloud identity yet.
    Unregistered,
    /// Registered with the cloud, no broker session yet.
    Registered,
    /// Broker session established, serving instructions.
    Connected,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Unregistered => "unregistered",
            LifecycleState::Registered => "registered",
            LifecycleState::Connected => "connected",
        };
        write!(f, "{name}")
    }
}

pub struct GatewayController {
    identity: GatewayIdentity,
    state: LifecycleState,
    attempts: u32,
    max_attempts: u32,
    registration_backoff: Duration,
    connect_backoff: Duration,
    tick: Duration,
    telemetry_topic: String,
    provisioning: ProvisioningClient,
    channel: Arc<dyn MessageChannel>,
    dispatcher: InstructionDispatcher,
    heartbeat: HeartbeatScheduler,
    router: MessageRouter,
    control_rx: mpsc::Receiver<InboundMessage>,
    announced: bool,
    shutdown: CancellationToken,
}

impl GatewayController {
    pub fn new(
        config: &Config,
        identity: GatewayIdentity,
        provisioning: ProvisioningClient,
        channel: Arc<dyn MessageChannel>,
        dispatcher: InstructionDispatcher,
        control_rx: mpsc::Receiver<InboundMessage>,
        shutdown: CancellationToken,
    ) -> Self {
        let router = MessageRouter::new(
            identity.mac_address(),
            Duration::from_secs(config.transport.scan_timeout_secs),
        );
        let telemetry_topic = config.broker.telemetry_topic(identity.mac_address());
        Self {
            identity,
            state: LifecycleState::Unregistered,
            attempts: 0,
            max_attempts: config.cloud.max_attempts,
            registration_backoff: Duration::from_secs(config.cloud.registration_backoff_secs),
            connect_backoff: Duration::from_secs(config.cloud.connect_backoff_secs),
            tick: Duration::from_secs(config.runtime.tick_secs),
            telemetry_topic,
            provisioning,
            channel,
            dispatcher,
            heartbeat: HeartbeatScheduler::new(config.runtime.heartbeat_ticks),
            router,
            control_rx,
            announced: false,
            shutdown,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Consecutive failed attempts in the current provisioning state.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Drive the state machine until shutdown is requested.
    pub async fn run(&mut self) {
        tracing::info!("Gateway {} starting", self.identity.mac_address());
        while !self.shutdown.is_cancelled() {
            self.step().await;
        }
        if let Err(e) = self.channel.disconnect().await {
            tracing::warn!("Broker disconnect on shutdown failed: {}", e);
        }
        tracing::info!("Gateway stopped");
    }

    /// Run one iteration of the current state.
    pub async fn step(&mut self) {
        match self.state {
            LifecycleState::Unregistered => self.run_unregistered().await,
            LifecycleState::Registered => self.run_registered().await,
            LifecycleState::Connected => self.run_connected().await,
        }
    }

    async fn run_unregistered(&mut self) {
        if self.attempts >= self.max_attempts {
            tracing::error!(
                "Registration attempt limit ({}) reached, holding in {} state",
                self.max_attempts,
                self.state
            );
            self.wait(self.registration_backoff).await;
            return;
        }
        match self.provisioning.register(self.identity.mac_address()).await {
            Ok(secret) => {
                self.identity.apply_registration(secret);
                self.attempts = 0;
                self.state = LifecycleState::Registered;
                tracing::info!("Registered with the cloud");
            }
            Err(e) => {
                self.attempts += 1;
                tracing::warn!(
                    "Registration failed (attempt {}/{}): {}",
                    self.attempts,
                    self.max_attempts,
                    e
                );
                self.wait(self.registration_backoff).await;
            }
        }
    }

    async fn run_registered(&mut self) {
        if self.attempts >= self.max_attempts {
            tracing::error!(
                "Connection attempt limit ({}) reached, holding in {} state",
                self.max_attempts,
                self.state
            );
            self.wait(self.registration_backoff).await;
            return;
        }

        // A gateway registered before secrets were issued carries none; the
        // credential endpoint rejects the empty value like any stale secret.
        let secret = self.identity.secret().unwrap_or_default().to_string();
        let credentials = match self
            .provisioning
            .fetch_credentials(self.identity.mac_address(), &secret)
            .await
        {
            Ok(credentials) => credentials,
            Err(e) => {
                self.attempts += 1;
                tracing::warn!(
                    "Credential fetch failed (attempt {}/{}): {}",
                    self.attempts,
                    self.max_attempts,
                    e
                );
                self.wait(self.registration_backoff).await;
                return;
            }
        };
        self.identity.apply_credentials(credentials.clone());

        match self.channel.connect(&credentials).await {
            Ok(()) => {
                self.attempts = 0;
                self.state = LifecycleState::Connected;
                tracing::info!("Broker session established");
            }
            Err(e) => {
                self.attempts += 1;
                tracing::warn!(
                    "Broker connect failed (attempt {}/{}): {}",
                    self.attempts,
                    self.max_attempts,
                    e
                );
                self.wait(self.connect_backoff).await;
            }
        }
    }

    async fn run_connected(&mut self) {
        if !self.channel.is_connected() && !self.reconnect().await {
            // Demotion is not subject to the attempt limit; the gateway
            // keeps working to restore a session it already earned.
            tracing::warn!("Broker session lost, falling back to {}", self.state);
            self.state = LifecycleState::Registered;
            return;
        }

        if !self.announced {
            self.publish(self.router.sensor_list_request()).await;
            self.announced = true;
        }

        while let Ok(message) = self.control_rx.try_recv() {
            let instruction = match self.router.parse_instruction(&message.payload) {
                Some(instruction) => instruction,
                None => continue,
            };
            tracing::info!("Executing {} instruction", instruction.kind());
            let envelopes = self.dispatcher.execute(instruction, &self.router).await;
            for envelope in envelopes {
                self.publish(envelope).await;
            }
        }
        self.dispatcher.drain_notifications();

        if self.heartbeat.tick() {
            let envelope = self.router.heartbeat(self.dispatcher.snapshot());
            self.publish(envelope).await;
        }

        self.wait(self.tick).await;
    }

    async fn reconnect(&self) -> bool {
        let credentials = match self.identity.credentials() {
            Some(credentials) => credentials.clone(),
            None => return false,
        };
        match self.channel.connect(&credentials).await {
            Ok(()) => {
                tracing::info!("Broker session restored");
                true
            }
            Err(e) => {
                tracing::warn!("Broker reconnect failed: {}", e);
                false
            }
        }
    }

    async fn publish(&self, envelope: TelemetryEnvelope) {
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to serialize {} envelope: {}", envelope.kind, e);
                return;
            }
        };
        if let Err(e) = self.channel.publish(&self.telemetry_topic, &payload).await {
            tracing::warn!("Publish of {} envelope failed: {}", envelope.kind, e);
        }
    }

    /// Cooperative delay that wakes early on shutdown.
    async fn wait(&self, duration: Duration) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}
