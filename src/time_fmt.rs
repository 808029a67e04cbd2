//! Local-time capture and the timestamp formats used by the logger.

/// A broken-down local timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalTime {
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub milli_second: u16,
}

impl LocalTime {
    /// Capture the current local time.
    pub fn now() -> Self {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts);
        }
        let mut tm: libc::tm = unsafe { std::mem::zeroed() };
        unsafe {
            libc::localtime_r(&ts.tv_sec, &mut tm);
        }
        LocalTime {
            year: (tm.tm_year + 1900) as u16,
            month: (tm.tm_mon + 1) as u16,
            day: tm.tm_mday as u16,
            hour: tm.tm_hour as u16,
            minute: tm.tm_min as u16,
            second: tm.tm_sec as u16,
            milli_second: (ts.tv_nsec / 1_000_000) as u16,
        }
    }

    /// `yyyy-mm-dd hh:mm:ss`
    pub fn human(&self) -> String {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }

    /// `yyyymmddhhmmss` — used for log file names.
    pub fn compact(&self) -> String {
        format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }

    /// `yyyy-mm-dd hh:mm:ss.mmm` — used for log line stamps.
    pub fn with_millis(&self) -> String {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.milli_second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_plausible() {
        let t = LocalTime::now();
        assert!(t.year >= 2024);
        assert!((1..=12).contains(&t.month));
        assert!((1..=31).contains(&t.day));
        assert!(t.hour < 24 && t.minute < 60 && t.second < 61);
        assert!(t.milli_second < 1000);
    }

    #[test]
    fn format_widths() {
        let t = LocalTime {
            year: 2026,
            month: 8,
            day: 2,
            hour: 3,
            minute: 4,
            second: 5,
            milli_second: 6,
        };
        assert_eq!(t.human(), "2026-08-02 03:04:05");
        assert_eq!(t.compact(), "20260802030405");
        assert_eq!(t.with_millis(), "2026-08-02 03:04:05.006");
    }
}
