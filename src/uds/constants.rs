//! Constants for the UDS Client.
use strum_macros::{EnumIter, FromRepr};

/// Response identifier of every negative response
pub const NEGATIVE_RESPONSE: u8 = 0x7f;
/// Offset added to the request SID in a positive response
pub const POSITIVE_RESPONSE: u8 = 0x40;

/// Service Identifiers (SIDs) as defined in ISO 14229
#[derive(Debug, PartialEq, Copy, Clone, FromRepr)]
#[repr(u8)]
pub enum ServiceIdentifier {
    // Diagnostic and Communication Management
    DiagnosticSessionControl = 0x10,
    EcuReset = 0x11,
    SecurityAccess = 0x27,
    CommunicationControl = 0x28,
    TesterPresent = 0x3e,
    ControlDTCSetting = 0x85,

    // Data Transmission
    ReadDataByIdentifier = 0x22,
    ReadMemoryByAddress = 0x23,
    WriteDataByIdentifier = 0x2e,
    WriteMemoryByAddress = 0x3d,

    // Stored Data Transmission
    ClearDiagnosticInformation = 0x14,
    ReadDTCInformation = 0x19,

    // Routine
    RoutineControl = 0x31,

    // Upload/Download
    RequestDownload = 0x34,
    RequestUpload = 0x35,
    TransferData = 0x36,
    RequestTransferExit = 0x37,

    NegativeResponse = 0x7f,
}

/// OBD-II services (SAE J1979) reachable through the same request primitive
#[derive(Debug, PartialEq, Copy, Clone)]
#[repr(u8)]
pub enum ObdService {
    ShowCurrentData = 0x01,
    ShowStoredDtc = 0x03,
    ClearDtc = 0x04,
    ShowPendingDtc = 0x07,
    VehicleInformation = 0x09,
}

/// Standard Data Identifiers (DIDs) as defined in ISO 14229
#[derive(Debug, PartialEq, Copy, Clone, EnumIter)]
#[repr(u16)]
pub enum DataIdentifier {
    BootSoftwareIdentification = 0xf180,
    ApplicationSoftwareIdentification = 0xf181,
    ApplicationDataIdentification = 0xf182,
    ActiveDiagnosticSession = 0xf186,
    VehicleManufacturerSparePartNumber = 0xf187,
    VehicleManufacturerEcuSoftwareNumber = 0xf188,
    SystemSupplierIdentifier = 0xf18a,
    EcuSerialNumber = 0xf18c,
    Vin = 0xf190,
    VehicleManufacturerEcuHardwareNumber = 0xf191,
    SystemSupplierEcuHardwareNumber = 0xf192,
    SystemSupplierEcuSoftwareNumber = 0xf194,
    ProgrammingDate = 0xf199,
    CalibrationDate = 0xf19b,
}

/// Diagnostic Session Type Sub-Function ID as defined in ISO 14229
#[derive(Debug, PartialEq, Copy, Clone)]
#[repr(u8)]
pub enum SessionType {
    Default = 0x01,
    Programming = 0x02,
    ExtendedDiagnostic = 0x03,
    SafetySystemDiagnostic = 0x04,
}

/// ECU Reset Sub-Function ID as defined in ISO 14229
#[derive(Debug, PartialEq, Copy, Clone)]
#[repr(u8)]
pub enum ResetType {
    /// Simulates power-on/start-up sequence after a power loss
    HardReset = 0x01,
    /// Simulates the driver turning the key off and then on again
    KeyOffOnReset = 0x02,
    /// Restart the application software
    SoftReset = 0x03,
}

/// Security Access Type Sub-Function ID as defined in ISO 14229
#[derive(Debug, PartialEq, Copy, Clone)]
#[repr(u8)]
pub enum SecurityAccessType {
    RequestSeed = 0x01,
    SendKey = 0x02,
}
