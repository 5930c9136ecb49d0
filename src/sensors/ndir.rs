//! NDIR CO2 module on a 9600 baud UART.
//!
//! Requests and responses are fixed 9-byte frames:
//!
//! ```text
//! request   FF 01 86 00 00 00 00 00 79
//! response  FF 86 HH LL -- -- -- -- CS     ppm = HH * 256 + LL
//! ```
//!
//! The checksum is the two's complement of the sum of bytes 1 to 7.

use {
    crate::error::{ErrorKind, Fault},
    embedded_hal::{blocking::delay::DelayUs, serial},
    log::{debug, trace},
    std::{
        fmt::Debug,
        time::{Duration, Instant},
    },
};

pub const FRAME_LEN: usize = 9;
pub const START: u8 = 0xFF;
/// Address byte of every request.
pub const SENSOR_ADDRESS: u8 = 0x01;
pub const READ_CONCENTRATION: u8 = 0x86;
/// Receive window for a complete response frame.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(300);

const POLL_PAUSE_US: u32 = 500;
const MAX_STALE_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Co2Frame {
    pub header: u8,
    /// Sensor address in requests, command echo in responses.
    pub command: u8,
    pub payload: [u8; 6],
    pub checksum: u8,
}

impl Co2Frame {
    /// Builds a frame with a valid checksum.
    pub fn new(command: u8, payload: [u8; 6]) -> Self {
        let mut frame = Self {
            header: START,
            command,
            payload,
            checksum: 0,
        };
        frame.checksum = checksum(&frame.to_bytes());
        frame
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut bytes = [0; FRAME_LEN];
        bytes[0] = self.header;
        bytes[1] = self.command;
        bytes[2..8].copy_from_slice(&self.payload);
        bytes[8] = self.checksum;
        bytes
    }
}

/// `0xFF - sum(bytes[1..=7]) + 1`, modulo 256.
pub fn checksum(bytes: &[u8; FRAME_LEN]) -> u8 {
    let sum = bytes[1..8].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0u8.wrapping_sub(sum)
}

pub fn encode_command(cmd: u8) -> Co2Frame {
    Co2Frame::new(SENSOR_ADDRESS, [cmd, 0, 0, 0, 0, 0])
}

/// Validates a "read concentration" response and returns the CO2 concentration in ppm.
pub fn decode_frame(bytes: &[u8; FRAME_LEN]) -> Result<u16, Fault> {
    if bytes[0] != START || bytes[1] != READ_CONCENTRATION {
        return Err(Fault::with_diagnostic(ErrorKind::ChecksumFailure, &bytes[..]));
    }
    if checksum(bytes) != bytes[8] {
        return Err(Fault::with_diagnostic(ErrorKind::ChecksumFailure, &bytes[..]));
    }
    Ok(u16::from_be_bytes([bytes[2], bytes[3]]))
}

/// Request/response driver over any non-blocking embedded-hal UART.
pub struct Ndir<S, D> {
    serial: S,
    delay: D,
    window: Duration,
}

impl<S, D> Ndir<S, D>
where
    S: serial::Read<u8> + serial::Write<u8>,
    <S as serial::Read<u8>>::Error: Debug,
    <S as serial::Write<u8>>::Error: Debug,
    D: DelayUs<u32>,
{
    pub fn new(serial: S, delay: D) -> Self {
        Self {
            serial,
            delay,
            window: DEFAULT_WINDOW,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn read_ppm(&mut self) -> Result<u16, Fault> {
        self.discard_input();

        let deadline = Instant::now() + self.window;
        for byte in encode_command(READ_CONCENTRATION).to_bytes() {
            self.poll_until(deadline, |s| serial::Write::<u8>::write(s, byte))?;
        }
        self.poll_until(deadline, |s| serial::Write::<u8>::flush(s))?;

        let frame = self.receive()?;
        trace!("NDIR response {:02X?}", frame);
        decode_frame(&frame)
    }

    /// Fewer than [`FRAME_LEN`] bytes inside the window is a timeout carrying the partial frame.
    fn receive(&mut self) -> Result<[u8; FRAME_LEN], Fault> {
        let deadline = Instant::now() + self.window;
        let mut frame = [0; FRAME_LEN];
        for received in 0..FRAME_LEN {
            match self.poll_until(deadline, |s| serial::Read::<u8>::read(s)) {
                Ok(byte) => frame[received] = byte,
                Err(mut fault) => {
                    if fault.kind == ErrorKind::Timeout {
                        fault.diagnostic = frame[..received].to_vec();
                    }
                    return Err(fault);
                }
            }
        }
        Ok(frame)
    }

    fn discard_input(&mut self) {
        let mut dropped = 0;
        while dropped < MAX_STALE_BYTES && serial::Read::<u8>::read(&mut self.serial).is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Discarded {} stale NDIR bytes", dropped);
        }
    }

    fn poll_until<T, E, F>(&mut self, deadline: Instant, mut op: F) -> Result<T, Fault>
    where
        E: Debug,
        F: FnMut(&mut S) -> nb::Result<T, E>,
    {
        loop {
            match op(&mut self.serial) {
                Ok(value) => return Ok(value),
                Err(nb::Error::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(Fault::timeout());
                    }
                    self.delay.delay_us(POLL_PAUSE_US);
                }
                Err(nb::Error::Other(e)) => {
                    debug!("NDIR UART error: {:?}", e);
                    return Err(Fault::bus());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::collections::VecDeque};

    const REQUEST: [u8; 9] = [0xFF, 0x01, 0x86, 0x00, 0x00, 0x00, 0x00, 0x00, 0x79];

    fn response(ppm: u16) -> [u8; 9] {
        let [hi, lo] = ppm.to_be_bytes();
        let mut bytes = [0xFF, 0x86, hi, lo, 0, 0, 0, 0, 0];
        bytes[8] = checksum(&bytes);
        bytes
    }

    /// Answers with `reply` once a full request has been written.
    struct FakeUart {
        reply: Vec<u8>,
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    impl FakeUart {
        fn new(reply: &[u8]) -> Self {
            Self {
                reply: reply.to_vec(),
                rx: VecDeque::new(),
                tx: Vec::new(),
            }
        }
    }

    impl serial::Read<u8> for FakeUart {
        type Error = ();

        fn read(&mut self) -> nb::Result<u8, ()> {
            self.rx.pop_front().ok_or(nb::Error::WouldBlock)
        }
    }

    impl serial::Write<u8> for FakeUart {
        type Error = ();

        fn write(&mut self, word: u8) -> nb::Result<(), ()> {
            self.tx.push(word);
            if self.tx.len() % FRAME_LEN == 0 {
                self.rx.extend(self.reply.iter().copied());
            }
            Ok(())
        }

        fn flush(&mut self) -> nb::Result<(), ()> {
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayUs<u32> for NoDelay {
        fn delay_us(&mut self, _us: u32) {}
    }

    fn ndir(reply: &[u8]) -> Ndir<FakeUart, NoDelay> {
        Ndir::new(FakeUart::new(reply), NoDelay).with_window(Duration::from_millis(20))
    }

    #[test]
    fn request_frame_is_fixed() {
        let frame = encode_command(READ_CONCENTRATION);
        assert_eq!(frame.to_bytes(), REQUEST);
        assert_eq!(frame.checksum, 0x79);
        assert_eq!(checksum(&REQUEST), 0x79);
    }

    #[test]
    fn decodes_valid_frame() {
        let bytes = [0xFF, 0x86, 0x03, 0xDB, 0x00, 0x00, 0x00, 0x00, 0x9C];
        assert_eq!(checksum(&bytes), 0x9C);
        assert_eq!(decode_frame(&bytes), Ok(987));
    }

    #[test]
    fn any_flipped_payload_bit_fails_checksum() {
        let valid = response(987);
        for index in 2..FRAME_LEN {
            for bit in 0..8 {
                let mut corrupt = valid;
                corrupt[index] ^= 1 << bit;
                let err = decode_frame(&corrupt).unwrap_err();
                assert_eq!(err.kind, ErrorKind::ChecksumFailure, "byte {} bit {}", index, bit);
                assert_eq!(err.diagnostic, corrupt.to_vec());
            }
        }
    }

    #[test]
    fn wrong_header_is_rejected() {
        let mut bytes = response(400);
        bytes[1] = 0x87;
        bytes[8] = checksum(&bytes);
        assert_eq!(
            decode_frame(&bytes).unwrap_err().kind,
            ErrorKind::ChecksumFailure
        );
    }

    #[test]
    fn reads_ppm_over_uart() {
        let mut sensor = ndir(&response(1234));
        assert_eq!(sensor.read_ppm(), Ok(1234));
        assert_eq!(sensor.serial.tx, REQUEST);
    }

    #[test]
    fn stale_bytes_are_discarded_before_request() {
        let mut uart = FakeUart::new(&response(650));
        uart.rx.extend([0x12, 0x34, 0xFF]);
        let mut sensor = Ndir::new(uart, NoDelay).with_window(Duration::from_millis(20));
        assert_eq!(sensor.read_ppm(), Ok(650));
    }

    #[test]
    fn short_response_times_out_with_partial_bytes() {
        let partial = &response(987)[..5];
        let mut sensor = ndir(partial);
        let err = sensor.read_ppm().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.diagnostic, partial.to_vec());
    }

    #[test]
    fn silent_module_times_out() {
        let mut sensor = ndir(&[]);
        let err = sensor.read_ppm().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.diagnostic.is_empty());
    }

    struct BrokenUart;

    impl serial::Read<u8> for BrokenUart {
        type Error = &'static str;

        fn read(&mut self) -> nb::Result<u8, Self::Error> {
            Err(nb::Error::Other("framing"))
        }
    }

    impl serial::Write<u8> for BrokenUart {
        type Error = &'static str;

        fn write(&mut self, _word: u8) -> nb::Result<(), Self::Error> {
            Ok(())
        }

        fn flush(&mut self) -> nb::Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn uart_error_is_a_bus_fault() {
        let mut sensor = Ndir::new(BrokenUart, NoDelay);
        assert_eq!(sensor.read_ppm().unwrap_err().kind, ErrorKind::BusFault);
    }
}
