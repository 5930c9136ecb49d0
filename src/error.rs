use {crate::sensors::SensorDescriptor, std::fmt};

/// Why a single sensor read produced no reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    /// Driver not initialised yet, conditioning, or mid self-test.
    #[error("NotReady")]
    NotReady,
    /// Bus or UART did not answer within its window.
    #[error("Timeout")]
    Timeout,
    /// I2C/SPI/IO transaction error.
    #[error("BusFault")]
    BusFault,
    /// Frame integrity check failed.
    #[error("ChecksumFailure")]
    ChecksumFailure,
    /// Converted value lies outside the sensor's valid domain.
    #[error("OutOfRange")]
    OutOfRange,
}

/// A driver-level failure, before it is attributed to a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct Fault {
    pub kind: ErrorKind,
    /// Raw bytes seen on the wire, if the driver had any.
    pub diagnostic: Vec<u8>,
}

impl Fault {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            diagnostic: Vec::new(),
        }
    }

    pub fn with_diagnostic(kind: ErrorKind, diagnostic: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn not_ready() -> Self {
        Self::new(ErrorKind::NotReady)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout)
    }

    pub fn bus() -> Self {
        Self::new(ErrorKind::BusFault)
    }
}

impl From<std::io::Error> for Fault {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Fault::timeout(),
            _ => Fault::bus(),
        }
    }
}

/// A [`Fault`] attributed to the descriptor whose read produced it.
#[derive(Debug)]
pub struct ReadError<'a> {
    pub descriptor: &'a SensorDescriptor,
    pub fault: Fault,
    /// When the failed read returned, on the same clock as [`Reading`](crate::cycle::Reading).
    pub timestamp_ms: u64,
}

impl ReadError<'_> {
    pub fn kind(&self) -> ErrorKind {
        self.fault.kind
    }
}

impl fmt::Display for ReadError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.descriptor.name(), self.fault.kind)
    }
}

impl std::error::Error for ReadError<'_> {}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("a sensor named '{0}' is already registered")]
    DuplicateName(String),
}

/// Failures while bringing a sensor up, before polling starts.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// A mandatory self-test did not pass. The host decides whether to retry or abort.
    #[error("{sensor} self-test failed: {detail}")]
    SelfTest { sensor: &'static str, detail: String },

    #[error("failed to initialize {sensor}: {detail}")]
    Init { sensor: &'static str, detail: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SetupError {
    /// Fatal errors must not be skipped over by the host.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SetupError::SelfTest { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_matches_report_tags() {
        assert_eq!(ErrorKind::NotReady.to_string(), "NotReady");
        assert_eq!(ErrorKind::ChecksumFailure.to_string(), "ChecksumFailure");
        assert_eq!(Fault::timeout().to_string(), "Timeout");
    }

    #[test]
    fn io_errors_map_to_timeout_or_bus_fault() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(Fault::from(timed_out).kind, ErrorKind::Timeout);
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Fault::from(missing).kind, ErrorKind::BusFault);
    }

    #[test]
    fn only_self_test_is_fatal() {
        let self_test = SetupError::SelfTest {
            sensor: "SGP30",
            detail: "0xd400 expected".into(),
        };
        let init = SetupError::Init {
            sensor: "AHT20",
            detail: "no ack".into(),
        };
        assert!(self_test.is_fatal());
        assert!(!init.is_fatal());
    }
}
