pub mod ephemeris;

pub mod clock {
    use crate::ephemeris::{self, Observer};
    use anyhow::anyhow;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
    use ds323x::DateTimeAccess;
    use std::fmt::Debug;

    /// Anything that can report the current local civil date and time.
    pub trait DateTimeSource {
        fn date_time(&mut self) -> anyhow::Result<NaiveDateTime>;

        /// Offset of the reported local time from UTC
        fn timezone_offset_hours(&self) -> f64;
    }

    /// Real-time clock holding local civil time, plus the timezone offset
    /// the ephemeris needs to turn it back into universal time.
    pub struct Clock<R> {
        rtc: R,
        timezone_offset_hours: f64,
    }

    impl<R> Clock<R>
    where
        R: DateTimeAccess,
        R::Error: Debug,
    {
        // Constructor for Clock
        pub fn new(rtc: R, timezone_offset_hours: f64) -> Clock<R> {
            Clock {
                rtc,
                timezone_offset_hours,
            }
        }

        /// Method to get the timezone offset in hours
        pub fn timezone_offset(&self) -> f64 {
            self.timezone_offset_hours
        }

        /// Method for setting the local date and time
        pub fn set_date_time(&mut self, date_time: &NaiveDateTime) -> anyhow::Result<()> {
            self.rtc
                .set_datetime(date_time)
                .map_err(|e| anyhow!("RTC write failed: {:?}", e))
        }

        /// Method for returning the local date and time
        pub fn get_date_time(&mut self) -> anyhow::Result<NaiveDateTime> {
            self.rtc
                .datetime()
                .map_err(|e| anyhow!("RTC read failed: {:?}", e))
        }

        pub fn get_date(&mut self) -> anyhow::Result<NaiveDate> {
            Ok(self.get_date_time()?.date())
        }

        pub fn get_time(&mut self) -> anyhow::Result<NaiveTime> {
            Ok(self.get_date_time()?.time())
        }

        /// Sunrise and sunset (geometric horizon) for today at the given position
        pub fn sun_times(
            &mut self,
            latitude: f64,
            longitude: f64,
        ) -> anyhow::Result<(NaiveTime, NaiveTime)> {
            let date = self.get_date()?;
            let observer = Observer {
                latitude_deg: latitude,
                longitude_deg: longitude,
                timezone_offset_hours: self.timezone_offset_hours,
            };
            let (rise, set) = ephemeris::sunrise_and_sunset(
                date,
                &observer,
                ephemeris::HORIZON_ZENITH,
                ephemeris::HORIZON_ZENITH,
            )?;
            match (time_from_decimal_hours(rise), time_from_decimal_hours(set)) {
                (Some(rise), Some(set)) => {
                    log::debug!("Sun times for {}: rise {}, set {}", date, rise, set);
                    Ok((rise, set))
                }
                _ => Err(anyhow!(
                    "sun crossing outside the local day (rise {:.3} h, set {:.3} h)",
                    rise,
                    set
                )),
            }
        }

        /// Method for returning a boolean for if it is after sunrise today
        pub fn after_sunrise(&mut self, latitude: f64, longitude: f64) -> anyhow::Result<bool> {
            let (sunrise, _) = self.sun_times(latitude, longitude)?;
            Ok(self.get_time()? >= sunrise)
        }

        /// Method for returning a boolean for if it is after sunset today
        pub fn after_sunset(&mut self, latitude: f64, longitude: f64) -> anyhow::Result<bool> {
            let (_, sunset) = self.sun_times(latitude, longitude)?;
            Ok(self.get_time()? >= sunset)
        }
    }

    impl<R> DateTimeSource for Clock<R>
    where
        R: DateTimeAccess,
        R::Error: Debug,
    {
        fn date_time(&mut self) -> anyhow::Result<NaiveDateTime> {
            self.get_date_time()
        }

        fn timezone_offset_hours(&self) -> f64 {
            self.timezone_offset_hours
        }
    }

    /// Time of day as decimal hours (14:15:00 -> 14.25)
    pub fn decimal_hours(time: NaiveTime) -> f64 {
        time.hour() as f64 + time.minute() as f64 / 60.0 + time.second() as f64 / 3600.0
    }

    /// Inverse of [`decimal_hours`], `None` outside [0, 24)
    pub fn time_from_decimal_hours(hours: f64) -> Option<NaiveTime> {
        if !(0.0..24.0).contains(&hours) {
            return None;
        }
        let seconds = (hours * 3600.0).round() as u32;
        NaiveTime::from_num_seconds_from_midnight_opt(seconds.min(86_399), 0)
    }

}

pub use clock::{Clock, DateTimeSource};
pub use ds323x::{DateTimeAccess, Ds323x};
