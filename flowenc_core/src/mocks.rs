//! Test and helper mocks for flowenc_core.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use flowenc_traits::{EncoderOutputs, EncoderPin, Level, Motion, MotionSensor, SensorDriver};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One scripted read.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Motion(Motion),
    Fail(&'static str),
    /// Report the motion only after the read has taken the given duration.
    Slow(Motion, Duration),
}

/// Sensor driver that replays a fixed script. The script is shared across
/// re-initialisations; once exhausted every read reports zero motion.
pub struct ScriptedSensorDriver {
    fail_inits: u32,
    inits: u32,
    script: Rc<RefCell<VecDeque<ScriptStep>>>,
    sleeper: Rc<dyn Fn(Duration)>,
}

impl ScriptedSensorDriver {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            fail_inits: 0,
            inits: 0,
            script: Rc::new(RefCell::new(steps.into_iter().collect())),
            sleeper: Rc::new(std::thread::sleep),
        }
    }

    /// Replace how `ScriptStep::Slow` passes time, e.g. by advancing a test clock.
    pub fn with_sleeper(mut self, f: impl Fn(Duration) + 'static) -> Self {
        self.sleeper = Rc::new(f);
        self
    }

    /// Fail the first `n` calls to `initialize`.
    pub fn failing_inits(mut self, n: u32) -> Self {
        self.fail_inits = n;
        self
    }

    /// Total `initialize` calls, successful or not.
    pub fn inits(&self) -> u32 {
        self.inits
    }

    pub fn remaining(&self) -> usize {
        self.script.borrow().len()
    }
}

impl SensorDriver for ScriptedSensorDriver {
    type Sensor = ScriptedSensor;

    fn initialize(&mut self) -> Result<ScriptedSensor, BoxError> {
        self.inits += 1;
        if self.inits <= self.fail_inits {
            return Err(Box::new(std::io::Error::other("scripted init failure")));
        }
        Ok(ScriptedSensor {
            script: self.script.clone(),
            sleeper: self.sleeper.clone(),
        })
    }
}

pub struct ScriptedSensor {
    script: Rc<RefCell<VecDeque<ScriptStep>>>,
    sleeper: Rc<dyn Fn(Duration)>,
}

impl MotionSensor for ScriptedSensor {
    fn read_motion(&mut self, _timeout: Duration) -> Result<Motion, BoxError> {
        let step = self.script.borrow_mut().pop_front();
        match step {
            None => Ok(Motion::default()),
            Some(ScriptStep::Motion(m)) => Ok(m),
            Some(ScriptStep::Fail(msg)) => Err(Box::new(std::io::Error::other(msg))),
            Some(ScriptStep::Slow(m, d)) => {
                (self.sleeper)(d);
                Ok(m)
            }
        }
    }
}

/// Output sink that records every write and the resulting levels.
#[derive(Debug, Default, Clone)]
pub struct RecordingPins {
    levels: [Level; 3],
    writes: Vec<(EncoderPin, Level)>,
}

impl RecordingPins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, pin: EncoderPin) -> Level {
        self.levels[pin_slot(pin)]
    }

    pub fn writes(&self) -> &[(EncoderPin, Level)] {
        &self.writes
    }

    pub fn clear(&mut self) {
        self.writes.clear();
    }
}

fn pin_slot(pin: EncoderPin) -> usize {
    match pin {
        EncoderPin::A => 0,
        EncoderPin::B => 1,
        EncoderPin::Z => 2,
    }
}

impl EncoderOutputs for RecordingPins {
    fn set_level(&mut self, pin: EncoderPin, level: Level) {
        self.levels[pin_slot(pin)] = level;
        self.writes.push((pin, level));
    }
}
