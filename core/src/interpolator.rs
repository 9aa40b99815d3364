//! Linear interpolation/extrapolation over a set of samples keyed by one
//! numeric field (the x axis).

use crate::errors::SampleError;

/// A record an [`Interpolator`] can store.
pub trait Sample: Clone {
    /// The x-axis value. `None` marks a record that cannot be stored.
    fn key(&self) -> Option<f64>;

    /// Builds the record at `line.x()` from two stored records. Numeric fields
    /// go through [`Line::value`]/[`Line::optional`]; everything else is
    /// dropped.
    fn blend(first: &Self, second: &Self, line: &Line) -> Self;
}

/// The straight line through two samples, evaluated at `x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    x1: f64,
    x2: f64,
    x: f64,
}

impl Line {
    pub fn new(x1: f64, x2: f64, x: f64) -> Self {
        Self { x1, x2, x }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn value(&self, y1: f64, y2: f64) -> f64 {
        if self.x1 == self.x2 {
            return y1;
        }
        let d = (self.x - self.x1) / (self.x2 - self.x1);
        y1 + d * (y2 - y1)
    }

    /// `None` unless both sides carry the field.
    pub fn optional(&self, y1: Option<f64>, y2: Option<f64>) -> Option<f64> {
        Some(self.value(y1?, y2?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    Exact,
    /// Between the nearest samples before and after x.
    Interpolated,
    /// After the last sample, using the last two.
    ExtrapolatedForward,
    /// Before the first sample, using the first two.
    ExtrapolatedBackward,
}

impl Match {
    pub fn is_interpolated(&self) -> bool {
        matches!(self, Match::Exact | Match::Interpolated)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Estimate<S> {
    pub sample: S,
    pub kind: Match,
    /// Largest |key - x| over the two samples the estimate was built from,
    /// not over every sample scanned to find them.
    pub max_distance: f64,
}

#[derive(Debug, Clone)]
pub struct Interpolator<S> {
    /// Sorted by key, keys unique.
    samples: Vec<(f64, S)>,
}

impl<S> Default for Interpolator<S> {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
        }
    }
}

impl<S: Sample> Interpolator<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a sample. A later sample with an equal key replaces the earlier one.
    pub fn add(&mut self, sample: S) -> Result<&mut Self, SampleError> {
        let key = sample
            .key()
            .filter(|k| k.is_finite())
            .ok_or(SampleError::InvalidKey)?
            + 0.0;

        let split = self.samples.partition_point(|(k, _)| *k < key);
        if self.samples.get(split).is_some_and(|(k, _)| *k == key) {
            self.samples[split].1 = sample;
        } else {
            self.samples.insert(split, (key, sample));
        }
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Estimates the sample at `x`.
    ///
    /// An exact key is returned unchanged. Otherwise the nearest samples on
    /// both sides are interpolated, or, when x is outside the stored range, the
    /// two samples closest to it are extrapolated. Fewer than two usable
    /// samples yields `None`.
    pub fn sample_at(&self, x: f64) -> Option<Estimate<S>> {
        if !x.is_finite() {
            return None;
        }

        let split = self.samples.partition_point(|(k, _)| *k < x);
        if let Some((k, sample)) = self.samples.get(split) {
            if *k == x {
                return Some(Estimate {
                    sample: sample.clone(),
                    kind: Match::Exact,
                    max_distance: 0.0,
                });
            }
        }

        let (before, after) = self.samples.split_at(split);
        let (first, second, kind) = match (before, after) {
            ([.., b], [a, ..]) => (b, a, Match::Interpolated),
            ([.., b1, b2], []) => (b1, b2, Match::ExtrapolatedForward),
            ([], [a1, a2, ..]) => (a1, a2, Match::ExtrapolatedBackward),
            _ => return None,
        };

        let line = Line::new(first.0, second.0, x);
        Some(Estimate {
            sample: S::blend(&first.1, &second.1, &line),
            kind,
            max_distance: (first.0 - x).abs().max((second.0 - x).abs()),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Reading {
        x: Option<f64>,
        y: f64,
        z: Option<f64>,
        label: Option<String>,
    }

    impl Sample for Reading {
        fn key(&self) -> Option<f64> {
            self.x
        }

        fn blend(first: &Self, second: &Self, line: &Line) -> Self {
            Reading {
                x: Some(line.x()),
                y: line.value(first.y, second.y),
                z: line.optional(first.z, second.z),
                label: None,
            }
        }
    }

    fn reading(x: f64, y: f64) -> Reading {
        Reading {
            x: Some(x),
            y,
            z: None,
            label: Some(format!("#{x}")),
        }
    }

    fn two_samples() -> Interpolator<Reading> {
        let mut interpolator = Interpolator::new();
        interpolator.add(reading(0.0, 0.0)).unwrap();
        interpolator.add(reading(10.0, 10.0)).unwrap();
        interpolator
    }

    #[test]
    fn test_exact_match_returns_stored_sample() {
        let interpolator = two_samples();
        let estimate = interpolator.sample_at(10.0).unwrap();
        assert_eq!(estimate.kind, Match::Exact);
        assert_eq!(estimate.max_distance, 0.0);
        assert_eq!(estimate.sample, reading(10.0, 10.0));
    }

    #[test]
    fn test_interpolation() {
        let estimate = two_samples().sample_at(5.0).unwrap();
        assert_eq!(estimate.kind, Match::Interpolated);
        assert_eq!(estimate.sample.y, 5.0);
        assert_eq!(estimate.sample.x, Some(5.0));
        assert_eq!(estimate.sample.label, None);
        assert_eq!(estimate.max_distance, 5.0);
    }

    #[test]
    fn test_extrapolation() {
        let forward = two_samples().sample_at(20.0).unwrap();
        assert_eq!(forward.kind, Match::ExtrapolatedForward);
        assert_eq!(forward.sample.y, 20.0);
        assert_eq!(forward.max_distance, 20.0);

        let backward = two_samples().sample_at(-5.0).unwrap();
        assert_eq!(backward.kind, Match::ExtrapolatedBackward);
        assert_eq!(backward.sample.y, -5.0);
        assert!(!backward.kind.is_interpolated());
    }

    #[test]
    fn test_nearest_pair_is_used() {
        let mut interpolator = Interpolator::new();
        for (x, y) in [(0.0, 0.0), (10.0, 100.0), (20.0, 0.0), (30.0, 50.0)] {
            interpolator.add(reading(x, y)).unwrap();
        }
        let estimate = interpolator.sample_at(15.0).unwrap();
        assert_eq!(estimate.sample.y, 50.0);
        assert_eq!(estimate.max_distance, 5.0);

        // Forward extrapolation uses the two most recent samples
        let estimate = interpolator.sample_at(40.0).unwrap();
        assert_eq!(estimate.sample.y, 100.0);

        // Backward extrapolation uses the two earliest samples
        let estimate = interpolator.sample_at(-10.0).unwrap();
        assert_eq!(estimate.sample.y, -100.0);
    }

    #[test]
    fn test_single_sample_has_no_data() {
        let mut interpolator = Interpolator::new();
        interpolator.add(reading(0.0, 1.0)).unwrap();
        assert!(interpolator.sample_at(5.0).is_none());
        assert!(interpolator.sample_at(-5.0).is_none());
        assert!(interpolator.sample_at(0.0).is_some());
        assert!(Interpolator::<Reading>::new().sample_at(0.0).is_none());
    }

    #[test]
    fn test_optional_fields_need_both_sides() {
        let mut interpolator = Interpolator::new();
        interpolator
            .add(Reading {
                z: Some(1.0),
                ..reading(0.0, 0.0)
            })
            .unwrap();
        interpolator.add(reading(10.0, 10.0)).unwrap();
        assert_eq!(interpolator.sample_at(5.0).unwrap().sample.z, None);
    }

    #[test]
    fn test_equal_key_replaces() {
        let mut interpolator = two_samples();
        interpolator.add(reading(10.0, 20.0)).unwrap();
        assert_eq!(interpolator.len(), 2);
        assert_eq!(interpolator.sample_at(5.0).unwrap().sample.y, 10.0);
    }

    #[test]
    fn test_invalid_key() {
        let mut interpolator = Interpolator::new();
        let result = interpolator.add(Reading {
            x: None,
            ..reading(0.0, 0.0)
        });
        assert_eq!(result.err(), Some(SampleError::InvalidKey));
        let result = interpolator.add(Reading {
            x: Some(f64::NAN),
            ..reading(0.0, 0.0)
        });
        assert!(result.is_err());
        assert!(interpolator.is_empty());
    }

    #[test]
    fn test_coincident_keys_do_not_divide_by_zero() {
        let line = Line::new(3.0, 3.0, 7.0);
        assert_eq!(line.value(4.0, 9.0), 4.0);
    }
}
