//! RFduino BLE Transport (WinRT)
//!
//! Finds the receiver by its advertised local name, opens its GATT service
//! and writes command frames to the send characteristic.

use crate::infrastructure::bluetooth::{Link, Transport, TransportError};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use windows::core::GUID;
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEScanningMode,
};
use windows::Devices::Bluetooth::BluetoothLEDevice;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattCommunicationStatus, GattWriteOption,
};
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::DataWriter;

/// RFduino service (0x2220)
pub const RFDUINO_SERVICE_UUID: GUID = GUID::from_u128(0x00002220_0000_1000_8000_00805f9b34fb);

/// Send characteristic (0x2222) - data written here reaches the sketch
pub const RFDUINO_SEND_CHAR_UUID: GUID = GUID::from_u128(0x00002222_0000_1000_8000_00805f9b34fb);

impl From<windows::core::Error> for TransportError {
    fn from(e: windows::core::Error) -> Self {
        TransportError::Platform(format!("{:#010X}", e.code().0))
    }
}

pub struct RfduinoTransport {
    watcher: Mutex<Option<BluetoothLEAdvertisementWatcher>>,
}

impl RfduinoTransport {
    pub fn new() -> Self {
        Self {
            watcher: Mutex::new(None),
        }
    }

    /// Scan until a device advertising `device_name` shows up. The first
    /// advertisement seen wins.
    async fn find_address(&self, device_name: &str) -> Result<u64, TransportError> {
        self.stop_scan();

        let watcher = BluetoothLEAdvertisementWatcher::new()?;
        watcher.SetScanningMode(BluetoothLEScanningMode::Active)?;

        let (tx, rx) = oneshot::channel::<u64>();
        let tx = Mutex::new(Some(tx));
        let wanted = device_name.to_string();

        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let name = args.Advertisement()?.LocalName()?.to_string();
                    if name == wanted {
                        let address = args.BluetoothAddress()?;
                        if let Some(tx) = tx.lock().ok().and_then(|mut slot| slot.take()) {
                            let _ = tx.send(address);
                        }
                    }
                }
                Ok(())
            },
        );

        watcher.Received(&handler)?;
        watcher.Start()?;
        info!("Scanning for {}...", device_name);
        if let Ok(mut slot) = self.watcher.lock() {
            *slot = Some(watcher);
        }

        let address = rx
            .await
            .map_err(|_| TransportError::NotFound(device_name.to_string()))?;
        self.stop_scan();
        Ok(address)
    }

    fn stop_scan(&self) {
        let watcher = self.watcher.lock().ok().and_then(|mut slot| slot.take());
        if let Some(watcher) = watcher {
            debug!("Stopping BLE scan");
            if let Err(e) = watcher.Stop() {
                warn!("Failed to stop scan: {}", e);
            }
        }
    }
}

impl Default for RfduinoTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for RfduinoTransport {
    async fn connect(&self, device_name: &str) -> Result<Box<dyn Link>, TransportError> {
        let address = self.find_address(device_name).await?;
        info!("Found {} at {:#X}", device_name, address);

        let device = BluetoothLEDevice::FromBluetoothAddressAsync(address)?.await?;

        let services_result = device
            .GetGattServicesForUuidAsync(RFDUINO_SERVICE_UUID)?
            .await?;
        let status = services_result.Status()?;
        if status != GattCommunicationStatus::Success {
            return Err(TransportError::Rejected(format!("GATT status {}", status.0)));
        }
        let services = services_result.Services()?;
        if services.Size()? == 0 {
            return Err(TransportError::NotFound("RFduino service".to_string()));
        }
        let service = services.GetAt(0)?;

        let chars_result = service
            .GetCharacteristicsForUuidAsync(RFDUINO_SEND_CHAR_UUID)?
            .await?;
        let status = chars_result.Status()?;
        if status != GattCommunicationStatus::Success {
            return Err(TransportError::Rejected(format!("GATT status {}", status.0)));
        }
        let characteristics = chars_result.Characteristics()?;
        if characteristics.Size()? == 0 {
            return Err(TransportError::NotFound("send characteristic".to_string()));
        }
        let characteristic = characteristics.GetAt(0)?;

        info!("RFduino send characteristic ready");
        Ok(Box::new(RfduinoLink {
            device,
            characteristic,
        }))
    }

    fn close(&self) {
        self.stop_scan();
    }
}

struct RfduinoLink {
    device: BluetoothLEDevice,
    characteristic: GattCharacteristic,
}

impl Link for RfduinoLink {
    fn write_data(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let write_error = |e: windows::core::Error| TransportError::Write(format!("{:#010X}", e.code().0));

        let writer = DataWriter::new().map_err(write_error)?;
        writer.WriteBytes(bytes).map_err(write_error)?;
        let buffer = writer.DetachBuffer().map_err(write_error)?;

        // Fire-and-forget write
        let _ = self
            .characteristic
            .WriteValueWithOptionAsync(&buffer, GattWriteOption::WriteWithoutResponse)
            .map_err(write_error)?;
        Ok(())
    }
}

impl Drop for RfduinoLink {
    fn drop(&mut self) {
        let _ = self.device.Close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfduino_uuids() {
        assert_eq!(RFDUINO_SERVICE_UUID.data1, 0x2220);
        assert_eq!(RFDUINO_SEND_CHAR_UUID.data1, 0x2222);
        assert_eq!(RFDUINO_SEND_CHAR_UUID.data4, [0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb]);
    }
}
