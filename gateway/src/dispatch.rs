//! Instruction execution against the device transport.
//!
//! The dispatcher is the single consumer of the notification queue and the
//! sole owner of the session map and measurement buffers. Instructions are
//! executed one at a time on the main task; a failed instruction is logged
//! and never faults the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use bluebridge_common::ble::{commands, MEASUREMENT_COMMAND_UUID, MEASUREMENT_RESPONSE_UUID};
use bluebridge_common::{InitialCommand, SensorEntry, SensorStatus, TelemetryEnvelope};

use crate::config::TransportSection;
use crate::error::{Error, Result};
use crate::measurement::MeasurementAggregator;
use crate::router::{Instruction, MessageRouter};
use crate::session::DeviceSessionManager;
use crate::transport::{DeviceNotification, DeviceTransport};

pub struct InstructionDispatcher {
    transport: Arc<dyn DeviceTransport>,
    sessions: DeviceSessionManager,
    aggregator: MeasurementAggregator,
    notifications: mpsc::Receiver<DeviceNotification>,
    read_window: Duration,
    read_poll_interval: Duration,
}

impl InstructionDispatcher {
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        notifications: mpsc::Receiver<DeviceNotification>,
        transport_config: &TransportSection,
    ) -> Self {
        Self {
            sessions: DeviceSessionManager::new(Arc::clone(&transport)),
            transport,
            aggregator: MeasurementAggregator::new(),
            notifications,
            read_window: Duration::from_secs(transport_config.read_window_secs),
            read_poll_interval: Duration::from_secs(transport_config.read_poll_interval_secs),
        }
    }

    /// Execute one instruction to completion.
    ///
    /// Returns the telemetry envelopes the instruction produced; only `read`
    /// produces any. Failures are logged and yield an empty result.
    pub async fn execute(
        &mut self,
        instruction: Instruction,
        router: &MessageRouter,
    ) -> Vec<TelemetryEnvelope> {
        match instruction {
            Instruction::Pair {
                address,
                notify_characteristics,
                initial_commands,
            } => {
                self.pair(&address, &notify_characteristics, &initial_commands)
                    .await;
                Vec::new()
            }
            Instruction::Unpair { address } => {
                self.unpair(&address).await;
                Vec::new()
            }
            Instruction::Scan { timeout } => {
                self.scan(timeout).await;
                Vec::new()
            }
            Instruction::Read { address } => match self.read(&address).await {
                Ok(data) => vec![router.measurement(&address, data)],
                Err(e) => {
                    tracing::warn!("Measurement read from {} failed: {}", address, e);
                    Vec::new()
                }
            },
            Instruction::SensorList { sensors } => {
                self.sensor_list(sensors).await;
                Vec::new()
            }
        }
    }

    /// Move queued notification fragments into the measurement buffers
    /// without blocking.
    pub fn drain_notifications(&mut self) {
        while let Ok(notification) = self.notifications.try_recv() {
            tracing::debug!(
                "Notification from {} ({} bytes)",
                notification.address,
                notification.payload.len()
            );
            self.aggregator
                .append_fragment(&notification.address, &notification.payload);
        }
    }

    /// Current pairing status of every known device, sorted by address.
    pub fn snapshot(&self) -> Vec<SensorStatus> {
        self.sessions.snapshot()
    }

    async fn pair(
        &mut self,
        address: &str,
        notify_characteristics: &[String],
        initial_commands: &[InitialCommand],
    ) {
        if let Err(e) = self.sessions.connect(address).await {
            tracing::warn!("Pairing {} failed: {}", address, e);
            return;
        }
        for characteristic in notify_characteristics {
            if let Err(e) = self.sessions.subscribe(address, characteristic).await {
                tracing::warn!("Subscribe to {} on {} failed: {}", characteristic, address, e);
            }
        }
        for command in initial_commands {
            if let Err(e) = self.write_initial_command(address, command).await {
                tracing::warn!(
                    "Initial command {} on {} failed: {}",
                    command.characteristic,
                    address,
                    e
                );
            }
        }
        tracing::info!("Paired {}", address);
    }

    async fn write_initial_command(&self, address: &str, command: &InitialCommand) -> Result<()> {
        let payload = hex::decode(&command.data)?;
        self.transport
            .write_characteristic(address, &command.characteristic, &payload)
            .await
    }

    async fn unpair(&mut self, address: &str) {
        for characteristic in self.sessions.subscribed_characteristics(address) {
            if let Err(e) = self.sessions.unsubscribe(address, &characteristic).await {
                tracing::warn!(
                    "Unsubscribe from {} on {} failed: {}",
                    characteristic,
                    address,
                    e
                );
            }
        }
        if let Err(e) = self.sessions.disconnect(address).await {
            tracing::warn!("Unpairing {} failed: {}", address, e);
        }
    }

    async fn scan(&self, timeout: Duration) {
        match self.transport.discover(timeout).await {
            Ok(devices) => {
                tracing::info!("Scan finished, {} device(s) in range", devices.len());
                for device in devices {
                    match device.rssi {
                        Some(rssi) => tracing::info!(
                            "Discovered {} ({}) at {} dBm",
                            device.address,
                            device.name,
                            rssi
                        ),
                        None => tracing::info!("Discovered {} ({})", device.address, device.name),
                    }
                }
            }
            Err(e) => tracing::warn!("Scan failed: {}", e),
        }
    }

    /// Trigger a measurement and collect its fragments.
    ///
    /// Writes the trigger command, then polls for the configured window.
    /// The response subscription is re-asserted every sub-tick; some devices
    /// drop it mid-stream, and re-subscribing an active handle is a no-op.
    async fn read(&mut self, address: &str) -> Result<String> {
        if !self.sessions.is_paired(address) {
            return Err(Error::NotConnected(address.to_string()));
        }
        self.transport
            .write_characteristic(
                address,
                MEASUREMENT_COMMAND_UUID,
                &[commands::TRIGGER_MEASUREMENT],
            )
            .await?;

        let deadline = tokio::time::Instant::now() + self.read_window;
        while tokio::time::Instant::now() < deadline {
            if let Err(e) = self
                .sessions
                .subscribe(address, MEASUREMENT_RESPONSE_UUID)
                .await
            {
                tracing::warn!("Measurement subscribe on {} failed: {}", address, e);
            }
            self.drain_notifications();
            tokio::time::sleep(self.read_poll_interval).await;
        }
        self.drain_notifications();

        if let Err(e) = self
            .sessions
            .unsubscribe(address, MEASUREMENT_RESPONSE_UUID)
            .await
        {
            tracing::warn!("Measurement unsubscribe on {} failed: {}", address, e);
        }
        Ok(self.aggregator.flush(address))
    }

    async fn sensor_list(&mut self, sensors: Vec<SensorEntry>) {
        for sensor in sensors {
            if self.sessions.is_paired(&sensor.address) {
                tracing::debug!("{} already paired, skipping", sensor.address);
                continue;
            }
            let config = sensor.config.unwrap_or_default();
            self.pair(
                &sensor.address,
                &config.notify_characteristics,
                &config.initial_commands,
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockOperation, MockTransport};
    use bluebridge_common::TelemetryKind;

    const DEVICE: &str = "AA:BB:CC:DD:EE:FF";
    const OTHER: &str = "11:22:33:44:55:66";

    fn router() -> MessageRouter {
        MessageRouter::new("F0:F1:F2:F3:F4:F5", Duration::from_secs(1))
    }

    fn dispatcher(
        transport: Arc<MockTransport>,
        notify_rx: mpsc::Receiver<DeviceNotification>,
    ) -> InstructionDispatcher {
        let section = TransportSection {
            backend: "mock".to_string(),
            scan_timeout_secs: 1,
            read_window_secs: 3,
            read_poll_interval_secs: 1,
        };
        InstructionDispatcher::new(transport, notify_rx, &section)
    }

    fn pair_instruction(address: &str) -> Instruction {
        Instruction::Pair {
            address: address.to_string(),
            notify_characteristics: Vec::new(),
            initial_commands: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_pair_connects_subscribes_and_writes_in_order() {
        let (tx, rx) = mpsc::channel(8);
        let mock = Arc::new(MockTransport::new(tx));
        let mut dispatcher = dispatcher(Arc::clone(&mock), rx);

        let instruction = Instruction::Pair {
            address: DEVICE.to_string(),
            notify_characteristics: vec!["1234".to_string()],
            initial_commands: vec![InitialCommand {
                characteristic: "5678".to_string(),
                data: "0102".to_string(),
            }],
        };
        let envelopes = dispatcher.execute(instruction, &router()).await;

        assert!(envelopes.is_empty());
        assert_eq!(
            mock.operations().await,
            vec![
                MockOperation::Connect(DEVICE.to_string()),
                MockOperation::Subscribe {
                    address: DEVICE.to_string(),
                    characteristic: "1234".to_string(),
                },
                MockOperation::Write {
                    address: DEVICE.to_string(),
                    characteristic: "5678".to_string(),
                    payload: vec![0x01, 0x02],
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_pair_twice_connects_once() {
        let (tx, rx) = mpsc::channel(8);
        let mock = Arc::new(MockTransport::new(tx));
        let mut dispatcher = dispatcher(Arc::clone(&mock), rx);

        dispatcher.execute(pair_instruction(DEVICE), &router()).await;
        dispatcher.execute(pair_instruction(DEVICE), &router()).await;

        assert_eq!(mock.connect_count(DEVICE).await, 1);
    }

    #[tokio::test]
    async fn test_pair_skips_malformed_initial_command() {
        let (tx, rx) = mpsc::channel(8);
        let mock = Arc::new(MockTransport::new(tx));
        let mut dispatcher = dispatcher(Arc::clone(&mock), rx);

        let instruction = Instruction::Pair {
            address: DEVICE.to_string(),
            notify_characteristics: Vec::new(),
            initial_commands: vec![
                InitialCommand {
                    characteristic: "5678".to_string(),
                    data: "not-hex".to_string(),
                },
                InitialCommand {
                    characteristic: "5678".to_string(),
                    data: "0a".to_string(),
                },
            ],
        };
        dispatcher.execute(instruction, &router()).await;

        let writes: Vec<_> = mock
            .operations()
            .await
            .into_iter()
            .filter(|op| matches!(op, MockOperation::Write { .. }))
            .collect();
        assert_eq!(
            writes,
            vec![MockOperation::Write {
                address: DEVICE.to_string(),
                characteristic: "5678".to_string(),
                payload: vec![0x0a],
            }]
        );
    }

    #[tokio::test]
    async fn test_unpair_unsubscribes_before_disconnect() {
        let (tx, rx) = mpsc::channel(8);
        let mock = Arc::new(MockTransport::new(tx));
        let mut dispatcher = dispatcher(Arc::clone(&mock), rx);

        let instruction = Instruction::Pair {
            address: DEVICE.to_string(),
            notify_characteristics: vec!["1234".to_string()],
            initial_commands: Vec::new(),
        };
        dispatcher.execute(instruction, &router()).await;
        dispatcher
            .execute(
                Instruction::Unpair {
                    address: DEVICE.to_string(),
                },
                &router(),
            )
            .await;

        let tail: Vec<_> = mock.operations().await.split_off(2);
        assert_eq!(
            tail,
            vec![
                MockOperation::Unsubscribe {
                    address: DEVICE.to_string(),
                    characteristic: "1234".to_string(),
                },
                MockOperation::Disconnect(DEVICE.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unpair_unknown_device_touches_nothing() {
        let (tx, rx) = mpsc::channel(8);
        let mock = Arc::new(MockTransport::new(tx));
        let mut dispatcher = dispatcher(Arc::clone(&mock), rx);

        dispatcher
            .execute(
                Instruction::Unpair {
                    address: DEVICE.to_string(),
                },
                &router(),
            )
            .await;

        assert!(mock.operations().await.is_empty());
    }

    #[tokio::test]
    async fn test_instructions_execute_in_arrival_order() {
        let (tx, rx) = mpsc::channel(8);
        let mock = Arc::new(MockTransport::new(tx));
        let mut dispatcher = dispatcher(Arc::clone(&mock), rx);
        let router = router();

        for instruction in [
            pair_instruction(DEVICE),
            Instruction::Scan {
                timeout: Duration::from_secs(1),
            },
            Instruction::Unpair {
                address: DEVICE.to_string(),
            },
        ] {
            let envelopes = dispatcher.execute(instruction, &router).await;
            assert!(envelopes.is_empty());
        }

        assert_eq!(
            mock.operations().await,
            vec![
                MockOperation::Connect(DEVICE.to_string()),
                MockOperation::Discover,
                MockOperation::Disconnect(DEVICE.to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_joins_fragments_into_one_measurement() {
        let (tx, rx) = mpsc::channel(8);
        let mock = Arc::new(MockTransport::new(tx));
        let mut dispatcher = dispatcher(Arc::clone(&mock), rx);
        let router = router();

        dispatcher.execute(pair_instruction(DEVICE), &router).await;
        mock.push_notification(DEVICE, MEASUREMENT_RESPONSE_UUID, &[0x01])
            .await;
        mock.push_notification(DEVICE, MEASUREMENT_RESPONSE_UUID, &[0x02])
            .await;
        mock.push_notification(DEVICE, MEASUREMENT_RESPONSE_UUID, &[0xff])
            .await;

        let envelopes = dispatcher
            .execute(
                Instruction::Read {
                    address: DEVICE.to_string(),
                },
                &router,
            )
            .await;

        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].kind, TelemetryKind::Measurement);
        assert_eq!(envelopes[0].sensor_mac.as_deref(), Some(DEVICE));
        assert_eq!(envelopes[0].data.as_deref(), Some("01,02,ff"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_triggers_once_and_cleans_up_subscription() {
        let (tx, rx) = mpsc::channel(8);
        let mock = Arc::new(MockTransport::new(tx));
        let mut dispatcher = dispatcher(Arc::clone(&mock), rx);
        let router = router();

        dispatcher.execute(pair_instruction(DEVICE), &router).await;
        dispatcher
            .execute(
                Instruction::Read {
                    address: DEVICE.to_string(),
                },
                &router,
            )
            .await;

        let operations = mock.operations().await;
        let trigger_writes: Vec<_> = operations
            .iter()
            .filter(|op| {
                matches!(
                    op,
                    MockOperation::Write { characteristic, payload, .. }
                        if characteristic == MEASUREMENT_COMMAND_UUID
                            && payload == &vec![commands::TRIGGER_MEASUREMENT]
                )
            })
            .collect();
        assert_eq!(trigger_writes.len(), 1);

        // The session layer re-asserts the subscription every sub-tick but
        // only the first call reaches the transport.
        let subscribes = operations
            .iter()
            .filter(|op| matches!(op, MockOperation::Subscribe { .. }))
            .count();
        assert_eq!(subscribes, 1);
        assert!(!mock.is_subscribed(DEVICE, MEASUREMENT_RESPONSE_UUID).await);
    }

    #[tokio::test]
    async fn test_read_unpaired_device_yields_nothing() {
        let (tx, rx) = mpsc::channel(8);
        let mock = Arc::new(MockTransport::new(tx));
        let mut dispatcher = dispatcher(Arc::clone(&mock), rx);

        let envelopes = dispatcher
            .execute(
                Instruction::Read {
                    address: DEVICE.to_string(),
                },
                &router(),
            )
            .await;

        assert!(envelopes.is_empty());
        assert!(mock.operations().await.is_empty());
    }

    #[tokio::test]
    async fn test_sensor_list_pairs_only_missing_devices() {
        let (tx, rx) = mpsc::channel(8);
        let mock = Arc::new(MockTransport::new(tx));
        let mut dispatcher = dispatcher(Arc::clone(&mock), rx);
        let router = router();

        dispatcher.execute(pair_instruction(DEVICE), &router).await;
        dispatcher
            .execute(
                Instruction::SensorList {
                    sensors: vec![
                        SensorEntry {
                            address: DEVICE.to_string(),
                            config: None,
                        },
                        SensorEntry {
                            address: OTHER.to_string(),
                            config: None,
                        },
                    ],
                },
                &router,
            )
            .await;

        assert_eq!(mock.connect_count(DEVICE).await, 1);
        assert_eq!(mock.connect_count(OTHER).await, 1);
    }

    #[tokio::test]
    async fn test_sensor_list_continues_past_failed_device() {
        let (tx, rx) = mpsc::channel(8);
        let mock = Arc::new(MockTransport::new(tx));
        mock.fail_connect(DEVICE).await;
        let mut dispatcher = dispatcher(Arc::clone(&mock), rx);

        dispatcher
            .execute(
                Instruction::SensorList {
                    sensors: vec![
                        SensorEntry {
                            address: DEVICE.to_string(),
                            config: None,
                        },
                        SensorEntry {
                            address: OTHER.to_string(),
                            config: None,
                        },
                    ],
                },
                &router(),
            )
            .await;

        assert_eq!(mock.connect_count(OTHER).await, 1);
        assert!(!dispatcher.sessions.is_paired(DEVICE));
        assert!(dispatcher.sessions.is_paired(OTHER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fragments_queued_during_slow_pair_keep_order() {
        let (tx, rx) = mpsc::channel(8);
        let mock = Arc::new(MockTransport::new(tx));
        let mut dispatcher = dispatcher(Arc::clone(&mock), rx);
        let router = router();

        dispatcher.execute(pair_instruction(DEVICE), &router).await;
        mock.set_connect_delay(Duration::from_secs(2)).await;

        let fragments = async {
            for byte in 1u8..=5 {
                mock.push_notification(DEVICE, MEASUREMENT_RESPONSE_UUID, &[byte])
                    .await;
            }
        };
        tokio::join!(dispatcher.execute(pair_instruction(OTHER), &router), fragments);

        let envelopes = dispatcher
            .execute(
                Instruction::Read {
                    address: DEVICE.to_string(),
                },
                &router,
            )
            .await;
        assert_eq!(envelopes[0].data.as_deref(), Some("01,02,03,04,05"));
    }
}
