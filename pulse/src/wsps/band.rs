//! Green/Yellow/Red classification with hysteresis.
//!
//! A band is left only when the smoothed score crosses the adjacent
//! threshold by at least `margin` points, measured from the band being left.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandThresholds {
    /// `ema >= green` is Green.
    pub green: u8,
    /// `yellow <= ema < green` is Yellow; below is Red.
    pub yellow: u8,
    pub margin: u8,
}

impl Default for BandThresholds {
    fn default() -> Self {
        Self {
            green: 67,
            yellow: 33,
            margin: 3,
        }
    }
}

/// Plain threshold mapping, no hysteresis. Used to seed a fresh state and to
/// pick the destination once a band is allowed to change.
pub fn band_for(ema: u8, t: &BandThresholds) -> Band {
    if ema >= t.green {
        Band::Green
    } else if ema >= t.yellow {
        Band::Yellow
    } else {
        Band::Red
    }
}

pub fn classify(ema: u8, prev: Band, t: &BandThresholds) -> Band {
    let ema = i32::from(ema);
    let (green, yellow, m) = (i32::from(t.green), i32::from(t.yellow), i32::from(t.margin));

    match prev {
        Band::Yellow => {
            if ema >= green + m {
                Band::Green
            } else if ema < yellow - m {
                Band::Red
            } else {
                Band::Yellow
            }
        }
        Band::Green if ema < green - m => band_for(ema as u8, t),
        Band::Red if ema >= yellow + m => band_for(ema as u8, t),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const T: BandThresholds = BandThresholds {
        green: 67,
        yellow: 33,
        margin: 3,
    };

    #[test]
    fn yellow_needs_full_margin_to_turn_green() {
        assert_eq!(classify(67, Band::Yellow, &T), Band::Yellow);
        assert_eq!(classify(69, Band::Yellow, &T), Band::Yellow);
        assert_eq!(classify(70, Band::Yellow, &T), Band::Green);
    }

    #[test]
    fn yellow_needs_full_margin_to_turn_red() {
        assert_eq!(classify(32, Band::Yellow, &T), Band::Yellow);
        assert_eq!(classify(30, Band::Yellow, &T), Band::Yellow);
        assert_eq!(classify(29, Band::Yellow, &T), Band::Red);
    }

    #[test]
    fn green_holds_inside_margin() {
        assert_eq!(classify(66, Band::Green, &T), Band::Green);
        assert_eq!(classify(64, Band::Green, &T), Band::Green);
        assert_eq!(classify(63, Band::Green, &T), Band::Yellow);
        assert_eq!(classify(10, Band::Green, &T), Band::Red);
    }

    #[test]
    fn red_holds_inside_margin() {
        assert_eq!(classify(33, Band::Red, &T), Band::Red);
        assert_eq!(classify(35, Band::Red, &T), Band::Red);
        assert_eq!(classify(36, Band::Red, &T), Band::Yellow);
        assert_eq!(classify(95, Band::Red, &T), Band::Green);
    }

    #[test]
    fn plain_thresholds() {
        assert_eq!(band_for(67, &T), Band::Green);
        assert_eq!(band_for(66, &T), Band::Yellow);
        assert_eq!(band_for(33, &T), Band::Yellow);
        assert_eq!(band_for(32, &T), Band::Red);
    }

    #[test]
    fn margin_near_bounds_does_not_overflow() {
        let t = BandThresholds {
            green: 100,
            yellow: 1,
            margin: 5,
        };
        assert_eq!(classify(100, Band::Yellow, &t), Band::Yellow);
        assert_eq!(classify(0, Band::Yellow, &t), Band::Yellow);
    }

    fn any_band() -> impl Strategy<Value = Band> {
        prop_oneof![Just(Band::Green), Just(Band::Yellow), Just(Band::Red)]
    }

    proptest! {
        #[test]
        fn no_change_within_margin_of_the_departure_band(ema in 0u8..=100, prev in any_band()) {
            let next = classify(ema, prev, &T);
            let e = i32::from(ema);
            let stays = match prev {
                Band::Green => e >= 67 - 3,
                Band::Red => e < 33 + 3,
                Band::Yellow => (33 - 3..67 + 3).contains(&e),
            };
            if stays {
                prop_assert_eq!(next, prev);
            } else {
                prop_assert_ne!(next, prev);
            }
        }

        #[test]
        fn classification_is_stable_on_repeat(ema in 0u8..=100, prev in any_band()) {
            let once = classify(ema, prev, &T);
            prop_assert_eq!(classify(ema, once, &T), once);
        }
    }
}
