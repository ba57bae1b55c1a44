//! Error types for vault-core
//!
//! Every failure that leaves the vault is a [`VaultError`]: a numeric code
//! from the wire-stable [`ErrorCode`] table, an optional sub-code and an
//! optional message. Backends report failures in whatever shape their
//! native layer produces; [`crate::normalize`] turns those into this type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Wire-stable vault error codes.
///
/// The numbering is shared with native modules and must never change.
/// Values are grouped by subsystem: generic storage 1–4, iOS biometry 5–16,
/// PIN code 20–23, Android fingerprint 30–39, lock state 40–42, renewal 50,
/// environment 100.
///
/// Known inconsistency: one platform reports its PIN failures as 20/21
/// ("failed after a few attempts", "validation error") while the other
/// reuses the same neighbourhood for its generic biometric availability
/// errors. The numbers are kept as they are on the wire; callers must not
/// infer the subsystem from the range alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum ErrorCode {
    /// Native system exception the backend could not classify
    Undefined,

    CantSavePassword,
    CantSaveLogin,
    CantGetLoginPassword,
    CantDeleteCred,

    WrongTouchIdSettings,
    NoTouchIdFingers,
    TouchIdNotAvailable,
    PasscodeForTouchId,
    WrongTouchIdSettings2,

    SystemUnavailable,
    BiometryFailed,
    BiometryCancelled,
    AuthFallback,
    NoTouchIdFingers2,
    TouchIdNotAvailable2,
    PasscodeForTouchId2,

    PincodeTooManyAttempts,
    PincodeCheckFailed,
    PincodeEncryptFailed,
    PincodeDecryptFailed,

    FingerprintBusy,
    FingerprintFailed,
    FingerprintCanceled,
    FingerprintEncryptInitFailed,
    FingerprintDecryptFailed,
    FingerprintTooManyAttempts,
    FingerprintNotSupported,
    FingerprintNotSetup,
    FingerprintNotGranted,
    FingerprintNotSecure,

    Locked,
    CantSetCode,
    CantSetBiometry,

    /// Biometry must be enrolled again (the sensor's template set changed)
    BiometryNeedRenew,

    /// No foreground activity / UI context to host a prompt
    ActivityNotFound,
}

impl ErrorCode {
    /// Every known code, in wire order
    pub const ALL: [ErrorCode; 36] = [
        Self::Undefined,
        Self::CantSavePassword,
        Self::CantSaveLogin,
        Self::CantGetLoginPassword,
        Self::CantDeleteCred,
        Self::WrongTouchIdSettings,
        Self::NoTouchIdFingers,
        Self::TouchIdNotAvailable,
        Self::PasscodeForTouchId,
        Self::WrongTouchIdSettings2,
        Self::SystemUnavailable,
        Self::BiometryFailed,
        Self::BiometryCancelled,
        Self::AuthFallback,
        Self::NoTouchIdFingers2,
        Self::TouchIdNotAvailable2,
        Self::PasscodeForTouchId2,
        Self::PincodeTooManyAttempts,
        Self::PincodeCheckFailed,
        Self::PincodeEncryptFailed,
        Self::PincodeDecryptFailed,
        Self::FingerprintBusy,
        Self::FingerprintFailed,
        Self::FingerprintCanceled,
        Self::FingerprintEncryptInitFailed,
        Self::FingerprintDecryptFailed,
        Self::FingerprintTooManyAttempts,
        Self::FingerprintNotSupported,
        Self::FingerprintNotSetup,
        Self::FingerprintNotGranted,
        Self::FingerprintNotSecure,
        Self::Locked,
        Self::CantSetCode,
        Self::CantSetBiometry,
        Self::BiometryNeedRenew,
        Self::ActivityNotFound,
    ];

    /// Numeric wire value
    pub const fn value(self) -> i64 {
        match self {
            Self::Undefined => -1,
            Self::CantSavePassword => 1,
            Self::CantSaveLogin => 2,
            Self::CantGetLoginPassword => 3,
            Self::CantDeleteCred => 4,
            Self::WrongTouchIdSettings => 5,
            Self::NoTouchIdFingers => 6,
            Self::TouchIdNotAvailable => 7,
            Self::PasscodeForTouchId => 8,
            Self::WrongTouchIdSettings2 => 9,
            Self::SystemUnavailable => 10,
            Self::BiometryFailed => 11,
            Self::BiometryCancelled => 12,
            Self::AuthFallback => 13,
            Self::NoTouchIdFingers2 => 14,
            Self::TouchIdNotAvailable2 => 15,
            Self::PasscodeForTouchId2 => 16,
            Self::PincodeTooManyAttempts => 20,
            Self::PincodeCheckFailed => 21,
            Self::PincodeEncryptFailed => 22,
            Self::PincodeDecryptFailed => 23,
            Self::FingerprintBusy => 30,
            Self::FingerprintFailed => 31,
            Self::FingerprintCanceled => 32,
            Self::FingerprintEncryptInitFailed => 33,
            Self::FingerprintDecryptFailed => 34,
            Self::FingerprintTooManyAttempts => 35,
            Self::FingerprintNotSupported => 36,
            Self::FingerprintNotSetup => 37,
            Self::FingerprintNotGranted => 38,
            Self::FingerprintNotSecure => 39,
            Self::Locked => 40,
            Self::CantSetCode => 41,
            Self::CantSetBiometry => 42,
            Self::BiometryNeedRenew => 50,
            Self::ActivityNotFound => 100,
        }
    }

    /// Look up a code by its wire value
    pub fn from_value(value: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|code| code.value() == value)
    }

    /// Upper-case wire name, as used by the native modules
    pub const fn name(self) -> &'static str {
        match self {
            Self::Undefined => "UNDEFINED",
            Self::CantSavePassword => "CANT_SAVE_PASSWORD",
            Self::CantSaveLogin => "CANT_SAVE_LOGIN",
            Self::CantGetLoginPassword => "CANT_GET_LOGIN_PASSWORD",
            Self::CantDeleteCred => "CANT_DELETE_CRED",
            Self::WrongTouchIdSettings => "WRONG_TOUCHID_SETTINGS",
            Self::NoTouchIdFingers => "NO_TOUCHID_FINGERS",
            Self::TouchIdNotAvailable => "TOUCHID_NOT_AVAILABLE",
            Self::PasscodeForTouchId => "PASSCODE_FOR_TOUCHID",
            Self::WrongTouchIdSettings2 => "WRONG_TOUCHID_SETTINGS2",
            Self::SystemUnavailable => "SYSTEM_UNAVAILABLE",
            Self::BiometryFailed => "BIOMETRY_FAILED",
            Self::BiometryCancelled => "BIOMETRY_CANCELLED",
            Self::AuthFallback => "AUTH_FALLBACK",
            Self::NoTouchIdFingers2 => "NO_TOUCHID_FINGERS2",
            Self::TouchIdNotAvailable2 => "TOUCHID_NOT_AVAILABLE2",
            Self::PasscodeForTouchId2 => "PASSCODE_FOR_TOUCHID2",
            Self::PincodeTooManyAttempts => "PINCODE_TO_MUCH_ATTEMPTS",
            Self::PincodeCheckFailed => "PINCODE_CHECK_FAILED",
            Self::PincodeEncryptFailed => "PINCODE_ENCRYPT_FAILED",
            Self::PincodeDecryptFailed => "PINCODE_DECRYPT_FAILED",
            Self::FingerprintBusy => "FINGERPRINT_BUSY",
            Self::FingerprintFailed => "FINGERPRINT_FAILED",
            Self::FingerprintCanceled => "FINGERPRINT_CANCELED",
            Self::FingerprintEncryptInitFailed => "FINGERPRINT_ENCRYPT_INIT_FAILED",
            Self::FingerprintDecryptFailed => "FINGERPRINT_DECRYPT_FAILED",
            Self::FingerprintTooManyAttempts => "FINGERPRINT_TO_MUCH_ATTEMPTS",
            Self::FingerprintNotSupported => "FINGERPRINT_NOT_SUPPORTED",
            Self::FingerprintNotSetup => "FINGERPRINT_NOT_SETUP",
            Self::FingerprintNotGranted => "FINGERPRINT_NOT_GRANTED",
            Self::FingerprintNotSecure => "FINGERPRINT_NOT_SECURE",
            Self::Locked => "LOCKED",
            Self::CantSetCode => "CANT_SET_CODE",
            Self::CantSetBiometry => "CANT_SET_BIOMETRY",
            Self::BiometryNeedRenew => "BIOMETRY_NEED_RENEW",
            Self::ActivityNotFound => "ACTIVITY_NOT_FOUND",
        }
    }

    /// Subsystem this code belongs to
    pub const fn category(self) -> ErrorCategory {
        use ErrorCategory as C;
        match self {
            Self::Undefined => C::Undefined,
            Self::CantSavePassword
            | Self::CantSaveLogin
            | Self::CantGetLoginPassword
            | Self::CantDeleteCred => C::Storage,
            Self::WrongTouchIdSettings
            | Self::NoTouchIdFingers
            | Self::TouchIdNotAvailable
            | Self::PasscodeForTouchId
            | Self::WrongTouchIdSettings2
            | Self::SystemUnavailable
            | Self::NoTouchIdFingers2
            | Self::TouchIdNotAvailable2
            | Self::PasscodeForTouchId2
            | Self::FingerprintBusy
            | Self::FingerprintNotSupported
            | Self::FingerprintNotGranted
            | Self::FingerprintNotSecure => C::BiometryAvailability,
            Self::BiometryFailed | Self::AuthFallback | Self::FingerprintFailed => {
                C::BiometryVerification
            }
            Self::BiometryCancelled | Self::FingerprintCanceled => C::Cancelled,
            Self::FingerprintTooManyAttempts => C::BiometryLockout,
            Self::PincodeTooManyAttempts => C::CodeLockout,
            Self::PincodeCheckFailed => C::CodeVerification,
            Self::PincodeEncryptFailed
            | Self::PincodeDecryptFailed
            | Self::FingerprintEncryptInitFailed
            | Self::FingerprintDecryptFailed => C::Crypto,
            Self::Locked => C::LockedState,
            Self::FingerprintNotSetup | Self::CantSetCode | Self::CantSetBiometry => C::Setup,
            Self::BiometryNeedRenew => C::Renewal,
            Self::ActivityNotFound => C::Environment,
        }
    }
}

impl From<ErrorCode> for i64 {
    fn from(code: ErrorCode) -> Self {
        code.value()
    }
}

impl TryFrom<i64> for ErrorCode {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        Self::from_value(value).ok_or_else(|| format!("unknown vault error code {}", value))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.value())
    }
}

/// Coarse grouping of error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Cannot save, read or delete stored data
    Storage,
    /// Biometric hardware missing, not enrolled, not permitted
    BiometryAvailability,
    /// A biometric read happened but did not match
    BiometryVerification,
    /// Too many failed biometric attempts
    BiometryLockout,
    /// Too many wrong codes
    CodeLockout,
    /// Wrong code
    CodeVerification,
    /// Encrypt/decrypt step failed
    Crypto,
    /// Operation needs an unlocked vault
    LockedState,
    /// Setting up a gate failed, or the gate was never set up
    Setup,
    /// Biometry must be enrolled again
    Renewal,
    /// User or caller cancelled a prompt
    Cancelled,
    /// Host environment missing (no activity to show UI)
    Environment,
    /// Unclassified native exception, or a code outside the table
    Undefined,
}

/// Android `FingerprintManager` sub-codes carried alongside fingerprint errors
pub mod android_subcode {
    /// Sensor image was dirty or the press too weak
    pub const ACQUIRED_IMAGER_DIRTY: i64 = 0x03;
    /// Operation canceled by the system (for example the device was locked)
    pub const ERROR_CANCELED: i64 = 0x05;
    /// Temporary lockout after too many attempts
    pub const ERROR_LOCKOUT: i64 = 0x07;
    /// Lockout until the user authenticates with a device credential
    pub const ERROR_LOCKOUT_PERMANENT: i64 = 0x09;
    /// User pressed cancel or back
    pub const ERROR_USER_CANCELED: i64 = 0x0a;
}

/// Sub-code attached to an error: numeric when the backend sent something
/// decimal, otherwise the original text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubCode {
    Int(i64),
    Text(String),
}

impl SubCode {
    /// Numeric value, if this sub-code is numeric
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for SubCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{}", value),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for SubCode {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for SubCode {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Normalized vault error
///
/// `code` is `None` when the backend sent a code that does not parse as a
/// decimal integer. A parsed code outside [`ErrorCode`] is kept as-is and
/// reported through [`VaultError::raw_code`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultError {
    code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub_code: Option<SubCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Sub-code used for client-side timeouts
pub const TIMEOUT_SUB_CODE: &str = "TIMEOUT";

impl VaultError {
    /// Error with a known code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code: Some(code.value()),
            sub_code: None,
            message: None,
        }
    }

    /// Error from already-coerced parts
    pub fn from_parts(code: Option<i64>, sub_code: Option<SubCode>, message: Option<String>) -> Self {
        Self {
            code,
            sub_code,
            message,
        }
    }

    /// Client-side timeout for `operation`
    pub fn timeout(operation: &str) -> Self {
        Self::new(ErrorCode::Undefined)
            .with_sub_code(TIMEOUT_SUB_CODE)
            .with_message(format!("{} timed out", operation))
    }

    pub fn with_sub_code(mut self, sub_code: impl Into<SubCode>) -> Self {
        self.sub_code = Some(sub_code.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Parsed numeric code, `None` if the backend's code was not numeric
    pub fn raw_code(&self) -> Option<i64> {
        self.code
    }

    /// Known code, `None` if unparsable or outside the table
    pub fn kind(&self) -> Option<ErrorCode> {
        self.code.and_then(ErrorCode::from_value)
    }

    pub fn sub_code(&self) -> Option<&SubCode> {
        self.sub_code.as_ref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Category of the code; unknown and unparsable codes are `Undefined`
    pub fn category(&self) -> ErrorCategory {
        self.kind()
            .map(ErrorCode::category)
            .unwrap_or(ErrorCategory::Undefined)
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == Some(code.value())
    }

    /// Attempt-limit lockout (code or biometry); not to be retried automatically
    pub fn is_lockout(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::CodeLockout | ErrorCategory::BiometryLockout
        )
    }

    pub fn is_cancellation(&self) -> bool {
        self.category() == ErrorCategory::Cancelled
    }

    /// Caller must run biometry enrollment again
    pub fn needs_renewal(&self) -> bool {
        self.category() == ErrorCategory::Renewal
    }

    pub fn is_timeout(&self) -> bool {
        self.is(ErrorCode::Undefined)
            && matches!(&self.sub_code, Some(SubCode::Text(text)) if text == TIMEOUT_SUB_CODE)
    }
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind(), self.code) {
            (Some(kind), _) => write!(f, "{}", kind)?,
            (None, Some(code)) => write!(f, "vault error {}", code)?,
            (None, None) => f.write_str("vault error with unparsable code")?,
        }
        if let Some(sub_code) = &self.sub_code {
            write!(f, " [{}]", sub_code)?;
        }
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for VaultError {}
