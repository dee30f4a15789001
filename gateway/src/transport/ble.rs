//! BLE implementation of the device transport over btleplug.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::{DeviceNotification, DeviceTransport, DiscoveredDevice};

/// Window used to locate a peripheral the adapter has not cached yet.
const LOCATE_SCAN_SECS: u64 = 5;

/// Real BLE transport bound to the first Bluetooth adapter on the host.
///
/// Peripherals are cached by address once seen; every connected peripheral
/// gets a forwarder task that pumps its notification stream into the shared
/// fragment queue.
pub struct BleTransport {
    adapter: Adapter,
    notify_tx: mpsc::Sender<DeviceNotification>,
    peripherals: Mutex<HashMap<String, Peripheral>>,
    forwarders: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl BleTransport {
    pub async fn new(notify_tx: mpsc::Sender<DeviceNotification>) -> Result<Self> {
        let manager = Manager::new().await.map_err(ble_err)?;
        let adapters = manager.adapters().await.map_err(ble_err)?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| Error::Transport("no bluetooth adapter found".to_string()))?;
        Ok(Self {
            adapter,
            notify_tx,
            peripherals: Mutex::new(HashMap::new()),
            forwarders: Mutex::new(HashMap::new()),
        })
    }

    async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        if let Some(peripheral) = self.peripherals.lock().await.get(address) {
            return Ok(peripheral.clone());
        }

        // Not cached yet: scan briefly so the adapter learns about it
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(ble_err)?;
        tokio::time::sleep(Duration::from_secs(LOCATE_SCAN_SECS)).await;
        let peripherals = self.adapter.peripherals().await.map_err(ble_err)?;
        self.adapter.stop_scan().await.map_err(ble_err)?;

        for peripheral in peripherals {
            if peripheral
                .address()
                .to_string()
                .eq_ignore_ascii_case(address)
            {
                self.peripherals
                    .lock()
                    .await
                    .insert(address.to_string(), peripheral.clone());
                return Ok(peripheral);
            }
        }
        Err(Error::Transport(format!("device {address} not found")))
    }

    fn find_characteristic(peripheral: &Peripheral, uuid: &str) -> Result<Characteristic> {
        let wanted = Uuid::parse_str(uuid)
            .map_err(|e| Error::Transport(format!("invalid characteristic uuid {uuid}: {e}")))?;
        peripheral
            .characteristics()
            .iter()
            .find(|c| c.uuid == wanted)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("characteristic {uuid} not found")))
    }

    async fn spawn_forwarder(&self, address: &str, peripheral: &Peripheral) -> Result<()> {
        let mut stream = peripheral.notifications().await.map_err(ble_err)?;
        let notify_tx = self.notify_tx.clone();
        let forwarder_address = address.to_string();
        let handle = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                let fragment = DeviceNotification {
                    address: forwarder_address.clone(),
                    characteristic: notification.uuid.to_string(),
                    payload: notification.value,
                };
                if notify_tx.send(fragment).await.is_err() {
                    break;
                }
            }
        });
        if let Some(stale) = self
            .forwarders
            .lock()
            .await
            .insert(address.to_string(), handle)
        {
            stale.abort();
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceTransport for BleTransport {
    fn backend(&self) -> &'static str {
        "ble"
    }

    async fn connect(&self, address: &str) -> Result<()> {
        let peripheral = self.find_peripheral(address).await?;
        if peripheral.is_connected().await.map_err(ble_err)? {
            return Ok(());
        }
        peripheral.connect().await.map_err(ble_err)?;
        peripheral.discover_services().await.map_err(ble_err)?;
        self.spawn_forwarder(address, &peripheral).await?;
        tracing::debug!("Connected to {}", address);
        Ok(())
    }

    async fn disconnect(&self, address: &str) -> Result<()> {
        let peripheral = match self.peripherals.lock().await.get(address) {
            Some(peripheral) => peripheral.clone(),
            None => return Ok(()),
        };
        if let Some(forwarder) = self.forwarders.lock().await.remove(address) {
            forwarder.abort();
        }
        peripheral.disconnect().await.map_err(ble_err)?;
        tracing::debug!("Disconnected from {}", address);
        Ok(())
    }

    async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(ble_err)?;
        tokio::time::sleep(timeout).await;

        let peripherals = self.adapter.peripherals().await.map_err(ble_err)?;
        self.adapter.stop_scan().await.map_err(ble_err)?;

        let mut devices = Vec::new();
        let mut cache = self.peripherals.lock().await;
        for peripheral in peripherals {
            if let Some(props) = peripheral.properties().await.map_err(ble_err)? {
                let address = peripheral.address().to_string();
                let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
                devices.push(DiscoveredDevice {
                    address: address.clone(),
                    name,
                    rssi: props.rssi,
                });
                cache.insert(address, peripheral);
            }
        }
        Ok(devices)
    }

    async fn write_characteristic(
        &self,
        address: &str,
        characteristic: &str,
        payload: &[u8],
    ) -> Result<()> {
        let peripheral = self.find_peripheral(address).await?;
        let target = Self::find_characteristic(&peripheral, characteristic)?;
        peripheral
            .write(&target, payload, WriteType::WithResponse)
            .await
            .map_err(ble_err)
    }

    async fn subscribe(&self, address: &str, characteristic: &str) -> Result<()> {
        let peripheral = self.find_peripheral(address).await?;
        let target = Self::find_characteristic(&peripheral, characteristic)?;
        peripheral.subscribe(&target).await.map_err(ble_err)
    }

    async fn unsubscribe(&self, address: &str, characteristic: &str) -> Result<()> {
        let peripheral = match self.peripherals.lock().await.get(address) {
            Some(peripheral) => peripheral.clone(),
            None => return Ok(()),
        };
        let target = Self::find_characteristic(&peripheral, characteristic)?;
        peripheral.unsubscribe(&target).await.map_err(ble_err)
    }
}

fn ble_err(e: btleplug::Error) -> Error {
    Error::Transport(e.to_string())
}
