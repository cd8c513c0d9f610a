//! Thermal time clock.
//!
//! Converts calendar dates into degree-days accumulated since sowing from a
//! daily or sub-daily temperature series.

use crate::error::{SimError, SimResult, read_to_string};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn daily_hours() -> f64 {
    24.0
}

/// One mean-temperature record covering `[start, start + duration_hours)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRecord {
    pub start: NaiveDateTime,
    #[serde(default = "daily_hours")]
    pub duration_hours: f64,
    /// Mean air temperature over the record (°C).
    pub temperature: f64,
}

impl TemperatureRecord {
    pub fn daily(date: NaiveDate, temperature: f64) -> Self {
        Self {
            start: date.and_time(chrono::NaiveTime::MIN),
            duration_hours: 24.0,
            temperature,
        }
    }

    /// End of the record, `None` when it falls outside the calendar.
    pub fn end(&self) -> Option<NaiveDateTime> {
        self.start
            .checked_add_signed(duration_from_hours(self.duration_hours)?)
    }
}

/// Daily mean temperature, the common input format.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyTemperature {
    pub date: NaiveDate,
    pub temperature: f64,
}

/// Temperature series as found in weather files.
///
/// Files may mix `[[daily]]` entries and sub-daily `[[records]]`; both are
/// merged and sorted by start time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureSeries {
    pub daily: Vec<DailyTemperature>,
    pub records: Vec<TemperatureRecord>,
}

impl TemperatureSeries {
    pub fn from_daily(days: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self {
            daily: days
                .into_iter()
                .map(|(date, temperature)| DailyTemperature { date, temperature })
                .collect(),
            records: Vec::new(),
        }
    }

    pub fn from_records(records: Vec<TemperatureRecord>) -> Self {
        Self {
            daily: Vec::new(),
            records,
        }
    }

    pub fn from_toml_str(s: &str) -> SimResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> SimResult<Self> {
        Self::from_toml_str(&read_to_string(path.as_ref())?)
    }

    /// All records, daily entries included, sorted by start time.
    pub fn merged_records(&self) -> Vec<TemperatureRecord> {
        let mut out: Vec<TemperatureRecord> = self
            .daily
            .iter()
            .map(|d| TemperatureRecord::daily(d.date, d.temperature))
            .chain(self.records.iter().copied())
            .collect();
        out.sort_by_key(|r| r.start);
        out
    }
}

fn duration_from_hours(hours: f64) -> Option<Duration> {
    let ms = (hours * 3_600_000.0).round();
    if !(ms.is_finite() && ms.abs() < i64::MAX as f64) {
        return None;
    }
    Duration::try_milliseconds(ms as i64)
}

fn hours_between(a: NaiveDateTime, b: NaiveDateTime) -> f64 {
    (b - a).num_milliseconds() as f64 / 3_600_000.0
}

/// Accumulated thermal time as a function of date.
///
/// The clock starts at 00:00 on the sowing date. Each record contributes
/// `max(0, T - T_base) * hours / 24` degree-days for the part of the record
/// after sowing.
#[derive(Clone, Debug)]
pub struct ThermalTimeClock {
    base_temperature: f64,
    sowing: NaiveDateTime,
    records: Vec<TemperatureRecord>,
    /// End of each record.
    ends: Vec<NaiveDateTime>,
    /// Thermal time accumulated at the end of each record.
    cumulative: Vec<f64>,
}

impl ThermalTimeClock {
    /// Builds the clock and precomputes cumulative sums.
    ///
    /// ### Errors
    /// [`SimError::InvalidWeather`] if records are not finite, end beyond
    /// the representable calendar, overlap, leave gaps, or start after the
    /// sowing date.
    pub fn new(
        series: &TemperatureSeries,
        base_temperature: f64,
        sowing_date: NaiveDate,
    ) -> SimResult<Self> {
        if !base_temperature.is_finite() {
            return Err(SimError::InvalidWeather(
                "base temperature must be finite".into(),
            ));
        }
        let records = series.merged_records();
        let first = records
            .first()
            .ok_or_else(|| SimError::InvalidWeather("temperature series is empty".into()))?;

        let sowing = sowing_date.and_time(chrono::NaiveTime::MIN);
        if first.start > sowing {
            return Err(SimError::InvalidWeather(format!(
                "series starts at {} after the sowing date {sowing_date}",
                first.start
            )));
        }

        let mut cumulative = Vec::with_capacity(records.len());
        let mut ends = Vec::with_capacity(records.len());
        let mut acc = 0.0;
        let mut prev_end: Option<NaiveDateTime> = None;
        for r in &records {
            if !(r.temperature.is_finite() && r.duration_hours.is_finite() && r.duration_hours > 0.0)
            {
                return Err(SimError::InvalidWeather(format!(
                    "record at {} has a non-finite temperature or non-positive duration",
                    r.start
                )));
            }
            if let Some(end) = prev_end
                && r.start != end
            {
                return Err(SimError::InvalidWeather(format!(
                    "records must be contiguous: expected a record starting at {end}, found {}",
                    r.start
                )));
            }
            let end = r.end().ok_or_else(|| {
                SimError::InvalidWeather(format!(
                    "record at {} lasts {} hours, past the end of the calendar",
                    r.start, r.duration_hours
                ))
            })?;
            let effective_start = r.start.max(sowing);
            if end > effective_start {
                let hours = hours_between(effective_start, end);
                acc += (r.temperature - base_temperature).max(0.0) * hours / 24.0;
            }
            cumulative.push(acc);
            ends.push(end);
            prev_end = Some(end);
        }

        Ok(Self {
            base_temperature,
            sowing,
            records,
            ends,
            cumulative,
        })
    }

    pub fn base_temperature(&self) -> f64 {
        self.base_temperature
    }

    pub fn sowing_date(&self) -> NaiveDate {
        self.sowing.date()
    }

    /// Last instant covered by the series.
    pub fn covered_until(&self) -> NaiveDateTime {
        self.ends.last().copied().unwrap_or(self.sowing)
    }

    /// Last date whose whole day is covered by the series.
    pub fn last_covered_date(&self) -> Option<NaiveDate> {
        let end = self.covered_until();
        let last = end.date().pred_opt()?;
        (last >= self.records.first()?.start.date()).then_some(last)
    }

    /// Thermal time accumulated at an instant.
    ///
    /// Instants before sowing return 0. Within a record the accumulation is
    /// linear.
    pub fn thermal_time_at_instant(&self, instant: NaiveDateTime) -> Option<f64> {
        if instant <= self.sowing {
            return Some(0.0);
        }
        if instant > self.covered_until() {
            return None;
        }
        // First record ending at or after the instant.
        let idx = self.ends.partition_point(|&end| end < instant);
        let record = self.records.get(idx)?;
        let before = if idx == 0 { 0.0 } else { self.cumulative[idx - 1] };
        let effective_start = record.start.max(self.sowing);
        if instant <= effective_start {
            return Some(before);
        }
        let hours = hours_between(effective_start, instant);
        let rate = (record.temperature - self.base_temperature).max(0.0) / 24.0;
        Some(before + rate * hours)
    }

    /// Thermal time accumulated through the end of `date`.
    ///
    /// ### Errors
    /// [`SimError::DateOutOfRange`] when the series does not cover the
    /// whole day.
    pub fn thermal_time_at(&self, date: NaiveDate) -> SimResult<f64> {
        date.succ_opt()
            .and_then(|next| self.thermal_time_at_instant(next.and_time(chrono::NaiveTime::MIN)))
            .ok_or_else(|| SimError::DateOutOfRange {
                date,
                covered_through: self.last_covered_date(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn constant_series(start: NaiveDate, days: i64, t: f64) -> TemperatureSeries {
        TemperatureSeries::from_daily((0..days).map(|i| (start + Duration::days(i), t)))
    }

    #[test]
    fn accumulates_degree_days_from_sowing() {
        let sowing = d(2010, 10, 15);
        let series = constant_series(d(2010, 10, 10), 30, 12.0);
        let clock = ThermalTimeClock::new(&series, 2.0, sowing).unwrap();

        // Sowing day fully counted: one day at 10 °C·day.
        assert_relative_eq!(clock.thermal_time_at(sowing).unwrap(), 10.0);
        assert_relative_eq!(
            clock.thermal_time_at(sowing + Duration::days(9)).unwrap(),
            100.0
        );
        // Before sowing nothing accumulates.
        assert_eq!(clock.thermal_time_at(d(2010, 10, 12)).unwrap(), 0.0);
    }

    #[test]
    fn below_base_contributes_zero_and_is_monotonic() {
        let sowing = d(2010, 1, 1);
        let temps = [5.0, -3.0, 0.0, 8.0, -10.0, 2.0];
        let series = TemperatureSeries::from_daily(
            temps
                .iter()
                .enumerate()
                .map(|(i, &t)| (sowing + Duration::days(i as i64), t)),
        );
        let clock = ThermalTimeClock::new(&series, 1.0, sowing).unwrap();

        let values: Vec<f64> = (0..temps.len())
            .map(|i| clock.thermal_time_at(sowing + Duration::days(i as i64)).unwrap())
            .collect();
        assert_eq!(values, vec![4.0, 4.0, 4.0, 11.0, 11.0, 12.0]);
        assert!(values.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn future_date_is_out_of_range() {
        let sowing = d(2010, 10, 15);
        let series = constant_series(sowing, 5, 10.0);
        let clock = ThermalTimeClock::new(&series, 0.0, sowing).unwrap();

        assert_eq!(clock.last_covered_date(), Some(d(2010, 10, 19)));
        assert!(clock.thermal_time_at(d(2010, 10, 19)).is_ok());
        match clock.thermal_time_at(d(2010, 10, 20)) {
            Err(SimError::DateOutOfRange {
                date,
                covered_through,
            }) => {
                assert_eq!(date, d(2010, 10, 20));
                assert_eq!(covered_through, Some(d(2010, 10, 19)));
            }
            other => panic!("expected DateOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn sub_daily_records_accumulate_proportionally() {
        let sowing = d(2010, 10, 15);
        let start = sowing.and_time(chrono::NaiveTime::MIN);
        let records = (0..8)
            .map(|i| TemperatureRecord {
                start: start + Duration::hours(3 * i),
                duration_hours: 3.0,
                temperature: if i % 2 == 0 { 16.0 } else { 0.0 },
            })
            .collect();
        let clock =
            ThermalTimeClock::new(&TemperatureSeries::from_records(records), 4.0, sowing).unwrap();

        // Four 3-hour records at 12 degrees above base: 4 * 12 * 3 / 24.
        assert_relative_eq!(clock.thermal_time_at(sowing).unwrap(), 6.0);
        // Half-way through the first record.
        let mid = start + Duration::minutes(90);
        assert_relative_eq!(clock.thermal_time_at_instant(mid).unwrap(), 0.75);
    }

    #[test]
    fn gaps_and_late_series_are_rejected() {
        let sowing = d(2010, 10, 15);
        let gap = TemperatureSeries::from_daily([(sowing, 10.0), (sowing + Duration::days(2), 10.0)]);
        assert!(matches!(
            ThermalTimeClock::new(&gap, 0.0, sowing),
            Err(SimError::InvalidWeather(_))
        ));

        let late = constant_series(sowing + Duration::days(1), 5, 10.0);
        assert!(ThermalTimeClock::new(&late, 0.0, sowing).is_err());
        assert!(ThermalTimeClock::new(&TemperatureSeries::default(), 0.0, sowing).is_err());
    }

    #[test]
    fn records_ending_past_the_calendar_are_rejected() {
        let sowing = d(2010, 10, 15);
        for hours in [1e12, 1e300] {
            let series = TemperatureSeries::from_records(vec![TemperatureRecord {
                start: sowing.and_time(chrono::NaiveTime::MIN),
                duration_hours: hours,
                temperature: 10.0,
            }]);
            assert!(matches!(
                ThermalTimeClock::new(&series, 0.0, sowing),
                Err(SimError::InvalidWeather(_))
            ));
        }
    }

    #[test]
    fn parses_weather_toml() {
        let src = r#"
            [[daily]]
            date = "2010-10-15"
            temperature = 11.0

            [[daily]]
            date = "2010-10-16"
            temperature = 9.0
        "#;
        let series = TemperatureSeries::from_toml_str(src).unwrap();
        let clock = ThermalTimeClock::new(&series, 0.0, d(2010, 10, 15)).unwrap();
        assert_relative_eq!(clock.thermal_time_at(d(2010, 10, 16)).unwrap(), 20.0);
    }
}
