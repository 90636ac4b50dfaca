//! Output sinks.
//!
//! A sink is the single character device script output goes to. Writes
//! are blocking and ordered.

use alloc::vec::Vec;

/// Byte-oriented output device.
pub trait OutputSink {
    /// Write one byte.
    fn put_byte(&mut self, byte: u8);

    /// Write bytes in order.
    fn put_str(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.put_byte(byte);
        }
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn put_byte(&mut self, byte: u8) {
        (**self).put_byte(byte);
    }

    fn put_str(&mut self, bytes: &[u8]) {
        (**self).put_str(bytes);
    }
}

/// Collects output in memory.
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    bytes: Vec<u8>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Drain everything written so far.
    pub fn take(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.bytes)
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

impl OutputSink for BufferSink {
    fn put_byte(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    fn put_str(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }
}

#[cfg(all(feature = "serial", target_arch = "x86_64"))]
pub use self::serial::SerialSink;

#[cfg(all(feature = "serial", target_arch = "x86_64"))]
mod serial {
    use spin::Mutex;
    use uart_16550::SerialPort;
    use x86_64::instructions::interrupts;

    use super::OutputSink;

    /// COM1 base port.
    const COM1_BASE: u16 = 0x3F8;

    static COM1: Mutex<Option<SerialPort>> = Mutex::new(None);

    /// 16550 UART on COM1.
    pub struct SerialSink {
        _private: (),
    }

    impl SerialSink {
        /// Initialize COM1 on first use and return a handle to it.
        pub fn com1() -> Self {
            interrupts::without_interrupts(|| {
                let mut port = COM1.lock();
                if port.is_none() {
                    // SAFETY: COM1 is the standard serial port address.
                    let mut serial = unsafe { SerialPort::new(COM1_BASE) };
                    serial.init();
                    *port = Some(serial);
                }
            });
            SerialSink { _private: () }
        }
    }

    impl OutputSink for SerialSink {
        fn put_byte(&mut self, byte: u8) {
            interrupts::without_interrupts(|| {
                if let Some(port) = COM1.lock().as_mut() {
                    port.send(byte);
                }
            });
        }

        // Hold the lock for the whole string so lines never interleave.
        fn put_str(&mut self, bytes: &[u8]) {
            interrupts::without_interrupts(|| {
                if let Some(port) = COM1.lock().as_mut() {
                    for &byte in bytes {
                        port.send(byte);
                    }
                }
            });
        }
    }
}
