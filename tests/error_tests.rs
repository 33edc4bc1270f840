//! Unit tests for the `Sx127xError` enum and its associated `Display` trait
//! implementation.

use sx127x_rs::error::Sx127xError;
use sx127x_rs::sx127x::hal::HalError;

/// Tests that the `Bus` variant wraps and formats the HAL error.
#[test]
fn test_bus_error() {
    let err = Sx127xError::Bus(HalError::Spi);
    assert_eq!(err.to_string(), "Bus error: SPI communication error");
}

/// Tests that the `InvalidState` variant is correctly formatted.
#[test]
fn test_invalid_state_error() {
    let err = Sx127xError::InvalidState("unknown chip version 0x12".to_string());
    assert_eq!(
        err.to_string(),
        "Invalid device state: unknown chip version 0x12"
    );
}

/// Tests that the `InvalidArgument` variant is correctly formatted.
#[test]
fn test_invalid_argument_error() {
    let err = Sx127xError::InvalidArgument("spreading factor 13 outside 6..=12".to_string());
    assert_eq!(
        err.to_string(),
        "Invalid argument: spreading factor 13 outside 6..=12"
    );
}

/// Tests that the `IllegalTransition` variant is correctly formatted.
#[test]
fn test_illegal_transition_error() {
    let err = Sx127xError::IllegalTransition("opmode cad under fsk".to_string());
    assert_eq!(err.to_string(), "Illegal transition: opmode cad under fsk");
}

/// Tests that the `Busy` variant is correctly formatted.
#[test]
fn test_busy_error() {
    assert_eq!(Sx127xError::Busy.to_string(), "Device is busy");
}

/// Tests that the `Timeout` variant is correctly formatted.
#[test]
fn test_timeout_error() {
    assert_eq!(Sx127xError::Timeout.to_string(), "Operation timed out");
}

/// Tests that the `Unsupported` variant is correctly formatted.
#[test]
fn test_unsupported_error() {
    assert_eq!(
        Sx127xError::Unsupported.to_string(),
        "Operation not supported"
    );
}

/// Tests that a HAL error converts into the `Bus` variant.
#[test]
fn test_hal_error_conversion() {
    let err: Sx127xError = HalError::Timeout.into();
    assert!(matches!(err, Sx127xError::Bus(HalError::Timeout)));
}
