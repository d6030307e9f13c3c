//! Time-indexed actual-usage function of a virtual machine.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};

use serde::Serialize;

use crate::core::common::TraceTime;

/// One usage observation: CPU in MHz and memory in MB.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DemandSample {
    pub cpu_mhz: f64,
    pub memory_mb: f64,
}

impl DemandSample {
    pub fn new(cpu_mhz: f64, memory_mb: f64) -> Self {
        Self { cpu_mhz, memory_mb }
    }

    fn interpolate(t0: TraceTime, v0: &Self, t1: TraceTime, v1: &Self, time: f64) -> Self {
        let ratio = (time - t0 as f64) / (t1 - t0) as f64;
        Self {
            cpu_mhz: v0.cpu_mhz + (v1.cpu_mhz - v0.cpu_mhz) * ratio,
            memory_mb: v0.memory_mb + (v1.memory_mb - v0.memory_mb) * ratio,
        }
    }
}

/// Returned when a series already holds a sample for the given time.
#[derive(Debug, PartialEq)]
pub struct DuplicateSample(pub TraceTime);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DemandSeries {
    samples: BTreeMap<TraceTime, DemandSample>,
}

impl DemandSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(
        &mut self,
        time: TraceTime,
        sample: DemandSample,
    ) -> Result<(), DuplicateSample> {
        if self.samples.contains_key(&time) {
            return Err(DuplicateSample(time));
        }
        self.samples.insert(time, sample);
        Ok(())
    }

    /// Adds `sample` onto whatever is already recorded at `time`.
    pub fn accumulate(&mut self, time: TraceTime, sample: DemandSample) {
        let slot = self.samples.entry(time).or_default();
        slot.cpu_mhz += sample.cpu_mhz;
        slot.memory_mb += sample.memory_mb;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = TraceTime> + '_ {
        self.samples.keys().copied()
    }

    pub fn first_time(&self) -> Option<TraceTime> {
        self.samples.keys().next().copied()
    }

    pub fn last_time(&self) -> Option<TraceTime> {
        self.samples.keys().next_back().copied()
    }

    /// Component-wise maximum over all samples.
    pub fn peak(&self) -> DemandSample {
        self.samples
            .values()
            .fold(DemandSample::default(), |peak, sample| DemandSample {
                cpu_mhz: peak.cpu_mhz.max(sample.cpu_mhz),
                memory_mb: peak.memory_mb.max(sample.memory_mb),
            })
    }

    /// Usage at `time`: the exact sample when present, otherwise linear interpolation between
    /// the closest samples around `time`. Outside the sampled range the closest boundary sample
    /// is returned as is, never extrapolated. `None` only for an empty series.
    pub fn usage_at(&self, time: f64) -> Option<DemandSample> {
        let previous = if time < 0.0 {
            None
        } else {
            self.samples
                .range((Unbounded, Included(time.floor() as TraceTime)))
                .next_back()
        };
        let next = if time < 0.0 {
            self.samples.iter().next()
        } else {
            self.samples
                .range((Excluded(time.floor() as TraceTime), Unbounded))
                .next()
        };

        match (previous, next) {
            (Some((&t0, v0)), _) if t0 as f64 == time => Some(*v0),
            (Some((&t0, v0)), Some((&t1, v1))) => {
                Some(DemandSample::interpolate(t0, v0, t1, v1, time))
            }
            (Some((_, v0)), None) => Some(*v0),
            (None, Some((_, v1))) => Some(*v1),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DemandSample, DemandSeries, DuplicateSample};

    fn series(samples: &[(u64, f64, f64)]) -> DemandSeries {
        let mut series = DemandSeries::new();
        for (time, cpu, memory) in samples {
            series
                .add_sample(*time, DemandSample::new(*cpu, *memory))
                .unwrap();
        }
        series
    }

    #[test]
    fn test_exact_sample_is_returned_as_is() {
        let series = series(&[(10, 100.0, 50.0), (20, 300.0, 150.0)]);
        assert_eq!(Some(DemandSample::new(100.0, 50.0)), series.usage_at(10.0));
        assert_eq!(Some(DemandSample::new(300.0, 150.0)), series.usage_at(20.0));
    }

    #[test]
    fn test_linear_interpolation_between_samples() {
        let series = series(&[(10, 100.0, 50.0), (20, 300.0, 150.0)]);
        assert_eq!(Some(DemandSample::new(200.0, 100.0)), series.usage_at(15.0));
        assert_eq!(Some(DemandSample::new(150.0, 75.0)), series.usage_at(12.5));
    }

    #[test]
    fn test_no_extrapolation_past_last_sample() {
        let series = series(&[(10, 100.0, 50.0), (20, 300.0, 150.0)]);
        assert_eq!(Some(DemandSample::new(300.0, 150.0)), series.usage_at(20.5));
        assert_eq!(Some(DemandSample::new(300.0, 150.0)), series.usage_at(1000.0));
    }

    #[test]
    fn test_query_before_first_sample_uses_first_sample() {
        let series = series(&[(10, 100.0, 50.0), (20, 300.0, 150.0)]);
        assert_eq!(Some(DemandSample::new(100.0, 50.0)), series.usage_at(3.0));
        assert_eq!(Some(DemandSample::new(100.0, 50.0)), series.usage_at(-1.0));
    }

    #[test]
    fn test_interpolation_uses_nearest_samples_of_irregular_series() {
        let series = series(&[(0, 0.0, 0.0), (7, 70.0, 7.0), (100, 1000.0, 100.0)]);
        let usage = series.usage_at(53.5).unwrap();
        let expected_cpu = 70.0 + (1000.0 - 70.0) * (53.5 - 7.0) / (100.0 - 7.0);
        assert!((usage.cpu_mhz - expected_cpu).abs() < 1e-9);
    }

    #[test]
    fn test_empty_series_has_no_usage() {
        assert_eq!(None, DemandSeries::new().usage_at(0.0));
    }

    #[test]
    fn test_duplicate_time_is_rejected() {
        let mut series = series(&[(10, 100.0, 50.0)]);
        assert_eq!(
            Err(DuplicateSample(10)),
            series.add_sample(10, DemandSample::new(1.0, 1.0))
        );
        assert_eq!(1, series.len());
    }

    #[test]
    fn test_peak_is_component_wise() {
        let series = series(&[(0, 500.0, 10.0), (1, 100.0, 900.0)]);
        assert_eq!(DemandSample::new(500.0, 900.0), series.peak());
    }

    #[test]
    fn test_accumulated_samples_are_summed() {
        let mut series = DemandSeries::new();
        series.accumulate(5, DemandSample::new(100.0, 10.0));
        series.accumulate(5, DemandSample::new(250.0, 30.0));
        series.accumulate(9, DemandSample::new(1.0, 1.0));
        assert_eq!(2, series.len());
        assert_eq!(Some(DemandSample::new(350.0, 40.0)), series.usage_at(5.0));
    }
}
