//! PMW3901 optical-flow sensor over Linux SPI (rppal).
//!
//! Register map and the performance-optimisation sequence follow the
//! PixArt PMW3901MB datasheet and the widely used reference drivers.

use std::thread::sleep;
use std::time::Duration;

use flowenc_traits::{Motion, MotionSensor, SensorDriver};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use tracing::{debug, trace};

use crate::error::{HwError, Result};
use crate::util::poll_until;

const REG_PRODUCT_ID: u8 = 0x00;
const REG_MOTION: u8 = 0x02;
const REG_DELTA_X_L: u8 = 0x03;
const REG_DELTA_X_H: u8 = 0x04;
const REG_DELTA_Y_L: u8 = 0x05;
const REG_DELTA_Y_H: u8 = 0x06;
const REG_POWER_UP_RESET: u8 = 0x3a;
const REG_INVERSE_PRODUCT_ID: u8 = 0x5f;
const REG_MOTION_BURST: u8 = 0x16;

const PRODUCT_ID: u8 = 0x49;
const INVERSE_PRODUCT_ID: u8 = 0xb6;
const RESET_MAGIC: u8 = 0x5a;

const BURST_LEN: usize = 12;
/// MOT bit: displacement has accumulated since the last burst.
const MOTION_OCCURRED: u8 = 0x80;
const MIN_SQUAL: u8 = 0x19;
const SHUTTER_SATURATED: u8 = 0x1f;

const POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Vendor-recommended register writes applied after reset, split around the
/// mandatory 100 ms pause.
const PERFORMANCE_A: &[(u8, u8)] = &[
    (0x7f, 0x00),
    (0x61, 0xad),
    (0x7f, 0x03),
    (0x40, 0x00),
    (0x7f, 0x05),
    (0x41, 0xb3),
    (0x43, 0xf1),
    (0x45, 0x14),
    (0x5b, 0x32),
    (0x5f, 0x34),
    (0x7b, 0x08),
    (0x7f, 0x06),
    (0x44, 0x1b),
    (0x40, 0xbf),
    (0x4e, 0x3f),
    (0x7f, 0x08),
    (0x65, 0x20),
    (0x6a, 0x18),
    (0x7f, 0x09),
    (0x4f, 0xaf),
    (0x5f, 0x40),
    (0x48, 0x80),
    (0x49, 0x80),
    (0x57, 0x77),
    (0x60, 0x78),
    (0x61, 0x78),
    (0x62, 0x08),
    (0x63, 0x50),
    (0x7f, 0x0a),
    (0x45, 0x60),
    (0x7f, 0x00),
    (0x4d, 0x11),
    (0x55, 0x80),
    (0x74, 0x1f),
    (0x75, 0x1f),
    (0x4a, 0x78),
    (0x4b, 0x78),
    (0x44, 0x08),
    (0x45, 0x50),
    (0x64, 0xff),
    (0x65, 0x1f),
    (0x7f, 0x14),
    (0x65, 0x60),
    (0x66, 0x08),
    (0x63, 0x78),
    (0x7f, 0x15),
    (0x48, 0x58),
    (0x7f, 0x07),
    (0x41, 0x0d),
    (0x43, 0x14),
    (0x4b, 0x0e),
    (0x45, 0x0f),
    (0x44, 0x42),
    (0x4c, 0x80),
    (0x7f, 0x10),
    (0x5b, 0x02),
    (0x7f, 0x07),
    (0x40, 0x41),
    (0x70, 0x00),
];

const PERFORMANCE_B: &[(u8, u8)] = &[
    (0x32, 0x44),
    (0x7f, 0x07),
    (0x40, 0x40),
    (0x7f, 0x06),
    (0x62, 0xf0),
    (0x63, 0x00),
    (0x7f, 0x0d),
    (0x48, 0xc0),
    (0x6f, 0xd5),
    (0x7f, 0x00),
    (0x5b, 0xa0),
    (0x4e, 0xa8),
    (0x5a, 0x50),
    (0x40, 0x80),
];

/// SPI parameters for acquiring a PMW3901.
#[derive(Debug, Clone, Copy)]
pub struct Pmw3901Driver {
    pub spi_bus: u8,
    pub spi_cs: u8,
    pub clock_hz: u32,
}

impl SensorDriver for Pmw3901Driver {
    type Sensor = Pmw3901;

    fn initialize(&mut self) -> std::result::Result<Pmw3901, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Pmw3901::open(self.spi_bus, self.spi_cs, self.clock_hz)?)
    }
}

pub struct Pmw3901 {
    spi: Spi,
}

impl Pmw3901 {
    pub fn open(spi_bus: u8, spi_cs: u8, clock_hz: u32) -> Result<Self> {
        let bus = match spi_bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            other => return Err(HwError::Spi(format!("unsupported spi bus {other}"))),
        };
        let ss = match spi_cs {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            other => return Err(HwError::Spi(format!("unsupported chip select {other}"))),
        };
        let spi = Spi::new(bus, ss, clock_hz, Mode::Mode3)
            .map_err(|e| HwError::Spi(format!("open spi{spi_bus}.{spi_cs}: {e}")))?;
        let mut sensor = Self { spi };
        sensor.reset_and_identify()?;
        sensor.apply_performance_registers()?;
        debug!(spi_bus, spi_cs, clock_hz, "pmw3901 initialised");
        Ok(sensor)
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<()> {
        self.spi
            .write(&[reg | 0x80, value])
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(())
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8> {
        let mut rx = [0u8; 2];
        self.spi
            .transfer(&mut rx, &[reg & 0x7f, 0])
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(rx[1])
    }

    fn reset_and_identify(&mut self) -> Result<()> {
        self.write_reg(REG_POWER_UP_RESET, RESET_MAGIC)?;
        sleep(Duration::from_millis(5));
        // Reading the motion registers once clears stale deltas from before the reset.
        for reg in [
            REG_MOTION,
            REG_DELTA_X_L,
            REG_DELTA_X_H,
            REG_DELTA_Y_L,
            REG_DELTA_Y_H,
        ] {
            self.read_reg(reg)?;
        }
        let found = self.read_reg(REG_PRODUCT_ID)?;
        let inverse = self.read_reg(REG_INVERSE_PRODUCT_ID)?;
        if found != PRODUCT_ID || inverse != INVERSE_PRODUCT_ID {
            return Err(HwError::ProductId { found, inverse });
        }
        Ok(())
    }

    fn apply_performance_registers(&mut self) -> Result<()> {
        for &(reg, value) in PERFORMANCE_A {
            self.write_reg(reg, value)?;
        }
        sleep(Duration::from_millis(100));
        for &(reg, value) in PERFORMANCE_B {
            self.write_reg(reg, value)?;
        }
        Ok(())
    }

    /// One burst read. `None` when the frame cannot be trusted and should be
    /// polled again; a sensor at rest yields zero motion, not `None`.
    fn try_burst(&mut self) -> Result<Option<Motion>> {
        let mut tx = [0u8; BURST_LEN + 1];
        let mut rx = [0u8; BURST_LEN + 1];
        tx[0] = REG_MOTION_BURST;
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        let frame = BurstFrame::parse(&rx[1..]);
        trace!(
            motion = frame.motion,
            squal = frame.squal,
            shutter_upper = frame.shutter_upper,
            dx = frame.dx,
            dy = frame.dy,
            "pmw3901 burst"
        );
        Ok(frame.motion())
    }
}

impl MotionSensor for Pmw3901 {
    fn read_motion(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<Motion, Box<dyn std::error::Error + Send + Sync>> {
        Ok(poll_until(|| self.try_burst(), timeout, POLL_INTERVAL)?)
    }
}

#[derive(Debug, Clone, Copy)]
struct BurstFrame {
    motion: u8,
    dx: i16,
    dy: i16,
    squal: u8,
    shutter_upper: u8,
}

impl BurstFrame {
    fn parse(b: &[u8]) -> Self {
        let byte = |i: usize| b.get(i).copied().unwrap_or(0);
        Self {
            motion: byte(0),
            dx: i16::from_le_bytes([byte(2), byte(3)]),
            dy: i16::from_le_bytes([byte(4), byte(5)]),
            squal: byte(6),
            shutter_upper: byte(10),
        }
    }

    /// Low surface quality with a saturated shutter means the deltas are noise.
    fn is_trusted(&self) -> bool {
        !(self.squal < MIN_SQUAL && self.shutter_upper == SHUTTER_SATURATED)
    }

    fn motion(&self) -> Option<Motion> {
        if !self.is_trusted() {
            return None;
        }
        if self.motion & MOTION_OCCURRED == 0 {
            return Some(Motion::new(0, 0));
        }
        Some(Motion::new(self.dx.into(), self.dy.into()))
    }
}
