use serde::{Deserialize, Serialize};

/// Fixed candle interval set (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Interval::OneMinute => 60,
            Interval::FiveMinutes => 5 * 60,
            Interval::FifteenMinutes => 15 * 60,
            Interval::OneHour => 3600,
            Interval::FourHours => 4 * 3600,
            Interval::OneDay => 24 * 3600,
        }
    }

    /// Aligns a unix timestamp (seconds) down to this interval's bucket start.
    pub fn bucket_start(&self, t: i64) -> i64 {
        let secs = self.seconds();
        t - t.rem_euclid(secs)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Interval::OneMinute),
            "5m" => Some(Interval::FiveMinutes),
            "15m" => Some(Interval::FifteenMinutes),
            "1h" => Some(Interval::OneHour),
            "4h" => Some(Interval::FourHours),
            "1d" => Some(Interval::OneDay),
            _ => None,
        }
    }
}

/// One OHLCV bucket for `(symbol, interval)`. Bucket-start uniquely
/// identifies the row; later updates to an in-progress bucket overwrite
/// `close`/`high`/`low`/`volume` until it closes (spec §3, scenario S6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub t: i64,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
}

impl Candle {
    /// Merge a later update for the same bucket: open is fixed, high/low
    /// widen, close and volume take the later value.
    pub fn merge(&self, update: &Candle) -> Candle {
        Candle {
            t: self.t,
            o: self.o,
            h: self.h.max(update.h),
            l: self.l.min(update.l),
            c: update.c,
            v: update.v,
        }
    }
}
