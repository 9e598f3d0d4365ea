//! # Message Schemas
//!
//! A handful of concrete actions implementing the message contract. They
//! exist to exercise the dispatch core end to end; the full OCPP catalogue
//! plugs in the same way.

use crate::message::{RequestPayload, ResponsePayload};
use crate::result::DispatchResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extra detail on a status, used by most responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub reason_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

impl StatusInfo {
    /// Describe a substituted result.
    #[must_use]
    pub fn from_result(result: &DispatchResult) -> Self {
        Self {
            reason_code: result.code.as_str().to_string(),
            additional_info: result.description.clone(),
        }
    }
}

/// Accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenericStatus {
    Accepted,
    Rejected,
}

// =============================================================================
// GET CRL
// =============================================================================

/// Hash algorithm of a certificate hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    SHA256,
    SHA384,
    SHA512,
}

/// Identifies a certificate by issuer hashes and serial number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateHashData {
    pub hash_algorithm: HashAlgorithm,
    pub issuer_name_hash: String,
    pub issuer_key_hash: String,
    pub serial_number: String,
}

/// Ask for the certificate revocation list of a certificate's issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCrlRequest {
    pub request_id: i64,
    pub certificate_hash_data: CertificateHashData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCrlResponse {
    pub status: GenericStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl RequestPayload for GetCrlRequest {
    const ACTION: &'static str = "GetCRL";
    type Response = GetCrlResponse;

    fn validate(&self) -> Result<(), String> {
        let hashes = &self.certificate_hash_data;
        if hashes.issuer_name_hash.len() > 128 || hashes.issuer_key_hash.len() > 128 {
            return Err("issuer hashes are limited to 128 characters".into());
        }
        if hashes.serial_number.len() > 40 {
            return Err("serialNumber is limited to 40 characters".into());
        }
        Ok(())
    }
}

impl ResponsePayload for GetCrlResponse {
    fn from_failure(result: &DispatchResult) -> Self {
        Self {
            status: GenericStatus::Rejected,
            status_info: Some(StatusInfo::from_result(result)),
        }
    }
}

// =============================================================================
// BOOT NOTIFICATION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootReason {
    ApplicationReset,
    FirmwareUpdate,
    LocalReset,
    PowerUp,
    RemoteReset,
    ScheduledReset,
    Triggered,
    Unknown,
    Watchdog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingStation {
    pub model: String,
    pub vendor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    pub charging_station: ChargingStation,
    pub reason: BootReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Accepted,
    Pending,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationResponse {
    pub current_time: DateTime<Utc>,
    /// Heartbeat interval in seconds.
    pub interval: u32,
    pub status: RegistrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl RequestPayload for BootNotificationRequest {
    const ACTION: &'static str = "BootNotification";
    type Response = BootNotificationResponse;

    fn validate(&self) -> Result<(), String> {
        if self.charging_station.model.len() > 20 {
            return Err("model is limited to 20 characters".into());
        }
        if self.charging_station.vendor_name.len() > 50 {
            return Err("vendorName is limited to 50 characters".into());
        }
        Ok(())
    }
}

impl ResponsePayload for BootNotificationResponse {
    fn from_failure(result: &DispatchResult) -> Self {
        Self {
            current_time: Utc::now(),
            interval: 0,
            status: RegistrationStatus::Rejected,
            status_info: Some(StatusInfo::from_result(result)),
        }
    }
}

// =============================================================================
// HEARTBEAT
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub current_time: DateTime<Utc>,
}

impl RequestPayload for HeartbeatRequest {
    const ACTION: &'static str = "Heartbeat";
    type Response = HeartbeatResponse;
}

impl ResponsePayload for HeartbeatResponse {
    fn from_failure(_result: &DispatchResult) -> Self {
        Self {
            current_time: Utc::now(),
        }
    }
}

// =============================================================================
// RESET
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetType {
    Immediate,
    OnIdle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    #[serde(rename = "type")]
    pub reset_type: ResetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evse_id: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetStatus {
    Accepted,
    Rejected,
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub status: ResetStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl RequestPayload for ResetRequest {
    const ACTION: &'static str = "Reset";
    type Response = ResetResponse;
}

impl ResponsePayload for ResetResponse {
    fn from_failure(result: &DispatchResult) -> Self {
        Self {
            status: ResetStatus::Rejected,
            status_info: Some(StatusInfo::from_result(result)),
        }
    }
}

// =============================================================================
// DATA TRANSFER
// =============================================================================

/// Vendor-specific data exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransferRequest {
    pub vendor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataTransferStatus {
    Accepted,
    Rejected,
    UnknownMessageId,
    UnknownVendorId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTransferResponse {
    pub status: DataTransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_info: Option<StatusInfo>,
}

impl RequestPayload for DataTransferRequest {
    const ACTION: &'static str = "DataTransfer";
    type Response = DataTransferResponse;

    fn validate(&self) -> Result<(), String> {
        if self.vendor_id.is_empty() || self.vendor_id.len() > 255 {
            return Err("vendorId must be 1 to 255 characters".into());
        }
        Ok(())
    }
}

impl ResponsePayload for DataTransferResponse {
    fn from_failure(result: &DispatchResult) -> Self {
        Self {
            status: DataTransferStatus::Rejected,
            data: None,
            status_info: Some(StatusInfo::from_result(result)),
        }
    }
}
