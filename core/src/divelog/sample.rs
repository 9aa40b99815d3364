use serde::Serialize;

use crate::interpolator::{Line, Sample};
use crate::markup::{Document, NodeId};
use crate::utils::{time_to_seconds, to_number};

/// One dive computer reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiveSample {
    /// Seconds since the start of the dive.
    pub time: f64,
    /// Meters.
    pub depth: f64,
    /// Celsius.
    pub temperature: Option<f64>,
    pub heart_rate: Option<f64>,
}

impl Sample for DiveSample {
    fn key(&self) -> Option<f64> {
        Some(self.time)
    }

    fn blend(first: &Self, second: &Self, line: &Line) -> Self {
        DiveSample {
            time: line.x(),
            depth: line.value(first.depth, second.depth),
            temperature: line.optional(first.temperature, second.temperature),
            heart_rate: line.optional(first.heart_rate, second.heart_rate),
        }
    }
}

impl DiveSample {
    /// Reads a `sample` element. Samples without time or depth are skipped.
    pub(crate) fn from_element(document: &Document, id: NodeId) -> Option<Self> {
        let time = document.attribute(id, "time")?;
        let depth = document.attribute(id, "depth")?;
        Some(DiveSample {
            time: time_to_seconds(time) as f64,
            depth: to_number(depth),
            temperature: document.attribute(id, "temp").map(to_number),
            heart_rate: document.attribute(id, "heartbeat").map(to_number),
        })
    }

    /// Fills the fields this sample lacks from the previous one. Dive computers
    /// only log temperature and heart rate when they change.
    pub(crate) fn hold(mut self, previous: Option<&DiveSample>) -> Self {
        if let Some(previous) = previous {
            self.temperature = self.temperature.or(previous.temperature);
            self.heart_rate = self.heart_rate.or(previous.heart_rate);
        }
        self
    }
}
