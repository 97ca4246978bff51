// Low-precision solar ephemeris (Astronomical Almanac, page C24) plus the
// horizontal-coordinate conversion and a rise/set time solver built on it.
// Quoted accuracy is 0.01 degrees in declination and 0.1 minutes of time in
// the equation of time, valid for 1950 to 2050 inclusive.

use chrono::{Datelike, NaiveDate};
use std::f64::consts::PI;
use std::fmt;

const DEG2RAD: f64 = PI / 180.0;
const RAD2DEG: f64 = 180.0 / PI;

/// First year the almanac formulas are valid for
pub const FIRST_YEAR: i32 = 1950;
/// Last year the almanac formulas are valid for
pub const LAST_YEAR: i32 = 2050;

/// Convergence tolerance of the rise/set solver, in decimal hours
/// (0.00001 h of correction is roughly 0.5 s of time).
pub const SOLVER_TOLERANCE: f64 = 0.00001;
/// Upper bound on solver iterations. Typical inputs converge in 8 to 15.
pub const SOLVER_MAX_ITERATIONS: u32 = 50;

/// Zenith of the geometric horizon
pub const HORIZON_ZENITH: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EphemerisError {
    /// The almanac approximation only covers 1950..=2050
    YearOutOfRange(i32),
    /// The rise/set solver hit its iteration cap without settling
    NoConvergence { iterations: u32, last_estimate: f64 },
}

impl fmt::Display for EphemerisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EphemerisError::YearOutOfRange(year) => write!(
                f,
                "year {} outside supported almanac range {}..={}",
                year, FIRST_YEAR, LAST_YEAR
            ),
            EphemerisError::NoConvergence {
                iterations,
                last_estimate,
            } => write!(
                f,
                "zenith solver did not converge after {} iterations (last estimate {:.5} h)",
                iterations, last_estimate
            ),
        }
    }
}

impl std::error::Error for EphemerisError {}

/// Station the sun is observed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observer {
    /// North positive, decimal degrees
    pub latitude_deg: f64,
    /// East positive, decimal degrees
    pub longitude_deg: f64,
    /// Offset of local standard time from UTC in hours (e.g. +2.0)
    pub timezone_offset_hours: f64,
}

/// Ephemeris data for one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ephemeris {
    pub declination_deg: f64,
    /// True sun minus mean sun, normalized to [0, 360)
    pub equation_of_time_deg: f64,
    /// West of the meridian positive, normalized to [0, 360)
    pub hour_angle_deg: f64,
    pub sun_distance_au: f64,
    pub sun_semi_diameter_deg: f64,
    pub julian_day: f64,
}

/// Horizontal coordinates of the sun.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Horizontal {
    /// Clockwise from geographic north, [0, 360)
    pub azimuth_deg: f64,
    /// Angle from the point overhead, [0, 180]
    pub zenith_deg: f64,
}

/// Which of the two daily crossings of a zenith angle to solve for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SunEvent {
    /// Morning crossing, seeded at 06:00
    Rise,
    /// Evening crossing, seeded at 18:00
    Set,
}

impl SunEvent {
    fn sign(self) -> f64 {
        match self {
            SunEvent::Rise => -1.0,
            SunEvent::Set => 1.0,
        }
    }
}

/// Put an angle into [0, 360).
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if wrapped >= 360.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Julian day for a calendar date and universal time (Montenbruck, p. 33-34).
fn julian_day(date: NaiveDate, ut_hours: f64) -> f64 {
    let (mut year, mut month) = (date.year() as i64, date.month() as i64);
    if month <= 2 {
        year -= 1;
        month += 12;
    }
    let days_in_years = (365.25 * year as f64) as i64;
    let days_in_months = (30.6001 * (month + 1) as f64) as i64;
    let leap_correction = year / 400 - year / 100;

    (days_in_years + days_in_months + leap_correction) as f64
        + 1_720_996.5
        + date.day() as f64
        + ut_hours / 24.0
}

/// Computes declination, equation of time, hour angle, sun distance and
/// semi-diameter for a local standard time on `date`.
///
/// Fails with [`EphemerisError::YearOutOfRange`] outside 1950..=2050.
pub fn ephemeris(
    date: NaiveDate,
    local_time_hours: f64,
    observer: &Observer,
) -> Result<Ephemeris, EphemerisError> {
    if !(FIRST_YEAR..=LAST_YEAR).contains(&date.year()) {
        return Err(EphemerisError::YearOutOfRange(date.year()));
    }

    let ut_hours = local_time_hours - observer.timezone_offset_hours;
    let julian_day = julian_day(date, ut_hours);

    // Days since J2000.0
    let n = julian_day - 2_451_545.0;
    // Mean longitude corrected for aberration, and mean anomaly
    let mean_longitude = normalize_degrees(280.460 + 0.985_647_4 * n);
    let mean_anomaly = normalize_degrees(357.528 + 0.985_600_3 * n);
    let obliquity = 23.439 - 0.000_000_4 * n;

    let ecliptic_longitude = normalize_degrees(
        mean_longitude
            + 1.915 * (mean_anomaly * DEG2RAD).sin()
            + 0.020 * (2.0 * mean_anomaly * DEG2RAD).sin(),
    );

    let declination_deg =
        RAD2DEG * ((obliquity * DEG2RAD).sin() * (ecliptic_longitude * DEG2RAD).sin()).asin();

    // Right ascension lands in the quadrant of the ecliptic longitude
    let mut right_ascension = normalize_degrees(
        RAD2DEG * ((obliquity * DEG2RAD).cos() * (ecliptic_longitude * DEG2RAD).tan()).atan(),
    );
    let quadrant_lambda = (ecliptic_longitude as i64) / 90;
    let quadrant_ra = (right_ascension as i64) / 90;
    right_ascension += ((quadrant_lambda - quadrant_ra) * 90) as f64;

    let equation_of_time_deg = normalize_degrees(mean_longitude - right_ascension);
    let hour_angle_deg = normalize_degrees(
        15.0 * ut_hours + observer.longitude_deg + equation_of_time_deg - 180.0,
    );

    let sun_distance_au = 1.000_14
        - 0.016_71 * (mean_anomaly * DEG2RAD).cos()
        - 0.000_14 * (2.0 * mean_anomaly * DEG2RAD).cos();

    Ok(Ephemeris {
        declination_deg,
        equation_of_time_deg,
        hour_angle_deg,
        sun_distance_au,
        sun_semi_diameter_deg: 0.267 / sun_distance_au,
        julian_day,
    })
}

/// Converts hour angle and declination into azimuth and zenith for an
/// observer at `latitude_deg`.
pub fn horizontal_position(hour_angle_deg: f64, declination_deg: f64, latitude_deg: f64) -> Horizontal {
    let hour_angle = hour_angle_deg * DEG2RAD;
    let declination = declination_deg * DEG2RAD;
    let latitude = latitude_deg * DEG2RAD;

    let numerator = -hour_angle.sin();
    let denominator = declination.tan() * latitude.cos() - latitude.sin() * hour_angle.cos();

    let azimuth = if denominator == 0.0 {
        // Sun exactly east or west of the meridian plane
        if numerator > 0.0 {
            PI / 2.0
        } else if numerator < 0.0 {
            3.0 * PI / 2.0
        } else {
            0.0
        }
    } else {
        let azimuth = numerator.atan2(denominator);
        if azimuth < 0.0 {
            azimuth + 2.0 * PI
        } else {
            azimuth
        }
    };

    let cos_zenith =
        latitude.sin() * declination.sin() + latitude.cos() * declination.cos() * hour_angle.cos();

    Horizontal {
        azimuth_deg: normalize_degrees(azimuth * RAD2DEG),
        zenith_deg: cos_zenith.clamp(-1.0, 1.0).acos() * RAD2DEG,
    }
}

/// Azimuth and zenith of the sun at a local standard time.
pub fn sun_position(
    date: NaiveDate,
    local_time_hours: f64,
    observer: &Observer,
) -> Result<Horizontal, EphemerisError> {
    let eph = ephemeris(date, local_time_hours, observer)?;
    Ok(horizontal_position(
        eph.hour_angle_deg,
        eph.declination_deg,
        observer.latitude_deg,
    ))
}

/// Local standard time (decimal hours) at which the sun crosses
/// `target_zenith_deg` in the morning or evening of `date`.
///
/// The estimate is refined assuming the sun moves 15 degrees per hour.
/// Where the sun never reaches the target zenith (polar day or night) the
/// iteration does not settle and [`EphemerisError::NoConvergence`] is returned.
pub fn solve_time_for_zenith(
    date: NaiveDate,
    observer: &Observer,
    target_zenith_deg: f64,
    event: SunEvent,
) -> Result<f64, EphemerisError> {
    let sign = event.sign();
    let mut estimate = 12.0 + sign * 6.0;
    let mut iterations = 0;

    loop {
        iterations += 1;
        let zenith = sun_position(date, estimate, observer)?.zenith_deg;
        let correction = (target_zenith_deg - zenith) * sign / 15.0;
        estimate += correction;

        if correction.abs() <= SOLVER_TOLERANCE {
            return Ok(estimate);
        }
        if iterations >= SOLVER_MAX_ITERATIONS {
            return Err(EphemerisError::NoConvergence {
                iterations,
                last_estimate: estimate,
            });
        }
    }
}

/// Morning and evening crossing times of the given zeniths, in local
/// standard decimal hours.
pub fn sunrise_and_sunset(
    date: NaiveDate,
    observer: &Observer,
    rise_zenith_deg: f64,
    set_zenith_deg: f64,
) -> Result<(f64, f64), EphemerisError> {
    let rise = solve_time_for_zenith(date, observer, rise_zenith_deg, SunEvent::Rise)?;
    let set = solve_time_for_zenith(date, observer, set_zenith_deg, SunEvent::Set)?;
    Ok((rise, set))
}

/// Converts fixed-point tenths of a degree into degrees.
pub fn tenths_to_degrees(tenths: i32) -> f64 {
    tenths as f64 / 10.0
}

/// Converts degrees into fixed-point tenths of a degree, truncating toward
/// zero the way the setpoint registers are filled.
pub fn degrees_to_tenths(degrees: f64) -> i32 {
    (degrees * 10.0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hamburg() -> Observer {
        Observer {
            latitude_deg: 53.551085,
            longitude_deg: 9.993682,
            timezone_offset_hours: 2.0,
        }
    }

    fn reference_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 10, 19).unwrap()
    }

    #[test]
    fn test_julian_day_reference() {
        // 2019-10-19 12:00 local at UTC+2 is 10:00 UT
        let eph = ephemeris(reference_date(), 12.0, &hamburg()).unwrap();
        assert!((eph.julian_day - 2_458_775.916_666_666_5).abs() < 1e-6);
    }

    #[test]
    fn test_ephemeris_reference_values() {
        let eph = ephemeris(reference_date(), 12.0, &hamburg()).unwrap();
        assert!((eph.declination_deg - (-9.942_502_099)).abs() < 1e-6);
        assert!((eph.equation_of_time_deg - 3.742_084_839).abs() < 1e-6);
        assert!((eph.hour_angle_deg - 343.735_766_839).abs() < 1e-6);
        assert!((eph.sun_distance_au - 0.996_129_399).abs() < 1e-6);
        assert!((eph.sun_semi_diameter_deg - 0.268_037_466).abs() < 1e-6);
    }

    #[test]
    fn test_sun_position_reference_values() {
        let pos = sun_position(reference_date(), 10.0, &hamburg()).unwrap();
        assert!((pos.azimuth_deg - 132.403_127_062).abs() < 1e-6);
        assert!((pos.zenith_deg - 74.567_874_455).abs() < 1e-6);

        let noon = sun_position(reference_date(), 12.0, &hamburg()).unwrap();
        assert!((noon.azimuth_deg - 162.276_717_860).abs() < 1e-6);
        assert!((noon.zenith_deg - 64.983_507_424).abs() < 1e-6);
    }

    #[test]
    fn test_ephemeris_is_idempotent() {
        let observer = hamburg();
        let first = sun_position(reference_date(), 14.25, &observer).unwrap();
        let second = sun_position(reference_date(), 14.25, &observer).unwrap();
        assert_eq!(first.azimuth_deg.to_bits(), second.azimuth_deg.to_bits());
        assert_eq!(first.zenith_deg.to_bits(), second.zenith_deg.to_bits());
    }

    #[test]
    fn test_year_range_is_enforced() {
        let observer = hamburg();
        let early = NaiveDate::from_ymd_opt(1949, 12, 31).unwrap();
        let late = NaiveDate::from_ymd_opt(2051, 1, 1).unwrap();
        assert_eq!(
            ephemeris(early, 12.0, &observer),
            Err(EphemerisError::YearOutOfRange(1949))
        );
        assert_eq!(
            ephemeris(late, 12.0, &observer),
            Err(EphemerisError::YearOutOfRange(2051))
        );
        assert!(ephemeris(NaiveDate::from_ymd_opt(1950, 1, 1).unwrap(), 0.0, &observer).is_ok());
        assert!(ephemeris(NaiveDate::from_ymd_opt(2050, 12, 31).unwrap(), 23.9, &observer).is_ok());
    }

    #[test]
    fn test_horizontal_position_ranges() {
        let mut hour_angle = -720.0;
        while hour_angle <= 720.0 {
            let mut declination = -23.5;
            while declination <= 23.5 {
                let mut latitude = -89.0;
                while latitude <= 89.0 {
                    let pos = horizontal_position(hour_angle, declination, latitude);
                    assert!(
                        (0.0..360.0).contains(&pos.azimuth_deg),
                        "azimuth {} for ha={} decl={} lat={}",
                        pos.azimuth_deg,
                        hour_angle,
                        declination,
                        latitude
                    );
                    assert!((0.0..=180.0).contains(&pos.zenith_deg));
                    latitude += 17.8;
                }
                declination += 4.7;
            }
            hour_angle += 37.5;
        }
    }

    #[test]
    fn test_horizontal_position_degenerate_denominator() {
        // Equator observer, sun on the celestial equator: the denominator is
        // -sin(0)*cos(ha) + tan(0)*cos(0) = 0 for every hour angle.
        let west = horizontal_position(270.0, 0.0, 0.0);
        assert_eq!(west.azimuth_deg, 90.0);
        let east = horizontal_position(90.0, 0.0, 0.0);
        assert_eq!(east.azimuth_deg, 270.0);
        let overhead = horizontal_position(0.0, 0.0, 0.0);
        assert_eq!(overhead.azimuth_deg, 0.0);
        assert!(overhead.zenith_deg.abs() < 1e-9);
    }

    #[test]
    fn test_sunrise_sunset_golden_values() {
        let (rise, set) =
            sunrise_and_sunset(reference_date(), &hamburg(), HORIZON_ZENITH, HORIZON_ZENITH).unwrap();
        // 07:59:39 and 18:09:34 local summer time
        assert!((rise - 7.994_310_886).abs() < 1e-6, "rise {}", rise);
        assert!((set - 18.159_317_916).abs() < 1e-6, "set {}", set);
    }

    #[test]
    fn test_solver_round_trip() {
        let observer = hamburg();
        for (zenith, event) in [
            (90.0, SunEvent::Rise),
            (90.0, SunEvent::Set),
            (80.0, SunEvent::Rise),
            (96.0, SunEvent::Set),
        ] {
            let time = solve_time_for_zenith(reference_date(), &observer, zenith, event).unwrap();
            let pos = sun_position(reference_date(), time, &observer).unwrap();
            assert!(
                (pos.zenith_deg - zenith).abs() <= 15.0 * SOLVER_TOLERANCE,
                "zenith {} at {} for target {}",
                pos.zenith_deg,
                time,
                zenith
            );
        }
    }

    #[test]
    fn test_solver_caps_iterations_at_polar_latitude() {
        let svalbard = Observer {
            latitude_deg: 80.0,
            longitude_deg: 10.0,
            timezone_offset_hours: 1.0,
        };
        let midsummer = NaiveDate::from_ymd_opt(2019, 6, 21).unwrap();
        match solve_time_for_zenith(midsummer, &svalbard, HORIZON_ZENITH, SunEvent::Rise) {
            Err(EphemerisError::NoConvergence { iterations, .. }) => {
                assert_eq!(iterations, SOLVER_MAX_ITERATIONS)
            }
            other => panic!("expected no convergence, got {:?}", other),
        }
    }

    #[test]
    fn test_solver_rejects_out_of_range_year() {
        let date = NaiveDate::from_ymd_opt(2060, 3, 1).unwrap();
        assert_eq!(
            solve_time_for_zenith(date, &hamburg(), HORIZON_ZENITH, SunEvent::Set),
            Err(EphemerisError::YearOutOfRange(2060))
        );
    }

    #[test]
    fn test_matches_sun_times_crate() {
        // sun-times targets the refracted horizon (zenith 90.833), so allow
        // a few minutes of difference against the geometric crossing.
        let date = reference_date();
        let (rise_utc, set_utc) = sun_times::sun_times(date, 53.551085, 9.993682, 0.0).unwrap();
        let rise_utc = rise_utc.time();
        let set_utc = set_utc.time();
        let (rise, set) =
            sunrise_and_sunset(date, &hamburg(), 90.833, 90.833).unwrap();

        let to_hours = |t: chrono::NaiveTime| {
            use chrono::Timelike;
            t.num_seconds_from_midnight() as f64 / 3600.0
        };
        assert!((rise - 2.0 - to_hours(rise_utc)).abs() < 6.0 / 60.0);
        assert!((set - 2.0 - to_hours(set_utc)).abs() < 6.0 / 60.0);
    }

    #[test]
    fn test_matches_noaa_azimuth() {
        use astronav::coords::noaa_sun::NOAASun;

        let sun = NOAASun {
            year: 2019,
            doy: 292,
            long: 9.993682,
            lat: 53.551085,
            timezone: 2.0,
            hour: 10,
            min: 0,
            sec: 0,
        };
        let pos = sun_position(reference_date(), 10.0, &hamburg()).unwrap();
        assert!((sun.azimuth_in_deg() - pos.azimuth_deg).abs() < 1.0);
    }

    #[test]
    fn test_fixed_point_conversion_truncates() {
        assert_eq!(degrees_to_tenths(132.403), 1324);
        assert_eq!(degrees_to_tenths(359.99), 3599);
        assert_eq!(degrees_to_tenths(-0.05), 0);
        assert_eq!(tenths_to_degrees(900), 90.0);
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(-360.0), 0.0);
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(725.0), 5.0);
        assert!(normalize_degrees(-1e-20) < 360.0);
    }
}
