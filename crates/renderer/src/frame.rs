use std::time::Duration;

use chrono::{Datelike, Timelike};

use crate::uniforms::{UniformStore, UniformType, UniformValue, U_DATE, U_MOUSE, U_RESOLUTION, U_TIME};

/// Built-in values assembled fresh for every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub mouse: [f32; 2],
    pub date: [f32; 4],
}

impl FrameUniforms {
    pub fn capture<D>(resolution: (u32, u32), time: Duration, mouse: [f32; 2], now: &D) -> Self
    where
        D: Datelike + Timelike,
    {
        Self {
            resolution: [resolution.0 as f32, resolution.1 as f32],
            time: time.as_secs_f32(),
            mouse,
            date: date_components(now),
        }
    }

    /// Writes the four built-ins into `store`, replacing whatever was there.
    pub fn apply(&self, store: &mut UniformStore) {
        store.set(U_RESOLUTION, UniformValue::Vec2(self.resolution), UniformType::Vec2);
        store.set(U_TIME, UniformValue::Float(self.time), UniformType::Float);
        store.set(U_MOUSE, UniformValue::Vec2(self.mouse), UniformType::Vec2);
        store.set(U_DATE, UniformValue::Vec4(self.date), UniformType::Vec4);
    }
}

/// `[year, zero-based month, day, seconds since midnight]`.
pub fn date_components<D>(now: &D) -> [f32; 4]
where
    D: Datelike + Timelike,
{
    let seconds_since_midnight =
        now.num_seconds_from_midnight() as f32 + now.nanosecond() as f32 / 1_000_000_000.0;
    [
        now.year() as f32,
        now.month0() as f32,
        now.day() as f32,
        seconds_since_midnight,
    ]
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn date_uses_zero_based_month_and_fractional_seconds() {
        let moment = NaiveDate::from_ymd_opt(2024, 3, 5)
            .and_then(|date| date.and_hms_nano_opt(10, 30, 15, 250_000_000))
            .expect("valid date");
        let date = date_components(&moment);
        assert_eq!(date[0], 2024.0);
        assert_eq!(date[1], 2.0);
        assert_eq!(date[2], 5.0);
        assert!((date[3] - 37_815.25).abs() < 1e-2);
    }

    #[test]
    fn apply_overwrites_builtins() {
        let moment = NaiveDate::from_ymd_opt(1999, 12, 31)
            .and_then(|date| date.and_hms_opt(23, 59, 59))
            .expect("valid date");
        let frame = FrameUniforms::capture(
            (640, 480),
            Duration::from_millis(1_500),
            [12.0, 34.0],
            &moment,
        );
        let mut store = UniformStore::with_builtins();
        frame.apply(&mut store);

        assert_eq!(
            store.get(U_RESOLUTION).map(|u| u.value),
            Some(UniformValue::Vec2([640.0, 480.0]))
        );
        assert_eq!(store.get(U_TIME).map(|u| u.value), Some(UniformValue::Float(1.5)));
        assert_eq!(
            store.get(U_MOUSE).map(|u| u.value),
            Some(UniformValue::Vec2([12.0, 34.0]))
        );
        assert_eq!(
            store.get(U_DATE).map(|u| u.value),
            Some(UniformValue::Vec4([1999.0, 11.0, 31.0, 86_399.0]))
        );
    }
}
