use serde::{Deserialize, Serialize};

/// Class id of "person" in SSD person/vehicle detectors.
pub const DEFAULT_PERSON_CLASS_ID: u32 = 1;
pub const DEFAULT_PROB_THRESHOLD: f32 = 0.5;

/// One detection. Box corners are normalized to `0..=1` of the frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Detection {
    pub fn person(confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            class_id: DEFAULT_PERSON_CLASS_ID,
            confidence,
            x1,
            y1,
            x2,
            y2,
        }
    }
}

/// Which detections count as people.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PersonFilter {
    pub class_id: u32,
    pub threshold: f32,
}

impl Default for PersonFilter {
    fn default() -> Self {
        Self {
            class_id: DEFAULT_PERSON_CLASS_ID,
            threshold: DEFAULT_PROB_THRESHOLD,
        }
    }
}

impl PersonFilter {
    pub fn accepts(&self, detection: &Detection) -> bool {
        detection.class_id == self.class_id && detection.confidence >= self.threshold
    }
}

/// Raw person count of one frame.
pub fn count_people(detections: &[Detection], filter: PersonFilter) -> u32 {
    detections.iter().filter(|d| filter.accepts(d)).count() as u32
}
