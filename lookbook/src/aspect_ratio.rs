//! Output aspect ratios accepted by the image models.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// The fixed set of ratios a generation can be rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "9:16")]
    Story,
    #[serde(rename = "21:9")]
    Cinematic,
}

impl AspectRatio {
    /// Candidates in priority order; ties resolve to the earlier entry
    pub const ALL: [AspectRatio; 6] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Widescreen,
        AspectRatio::Story,
        AspectRatio::Cinematic,
    ];

    /// Used for anything that is not a positive `W:H` pair
    pub const DEFAULT: AspectRatio = AspectRatio::Story;

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Story => "9:16",
            AspectRatio::Cinematic => "21:9",
        }
    }

    /// Width and height terms of the ratio
    pub fn terms(&self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Landscape => (4, 3),
            AspectRatio::Portrait => (3, 4),
            AspectRatio::Widescreen => (16, 9),
            AspectRatio::Story => (9, 16),
            AspectRatio::Cinematic => (21, 9),
        }
    }

    pub fn value(&self) -> f64 {
        let (w, h) = self.terms();
        w as f64 / h as f64
    }

    /// Nearest supported ratio to a `"W:H"` string by absolute difference of `W/H`
    pub fn nearest(input: &str) -> AspectRatio {
        let Some(target) = parse_ratio(input) else {
            return Self::DEFAULT;
        };

        let mut best = Self::ALL[0];
        let mut best_delta = f64::MAX;
        for candidate in Self::ALL {
            let delta = (candidate.value() - target).abs();
            if delta < best_delta {
                best = candidate;
                best_delta = delta;
            }
        }
        best
    }

    /// Nearest supported ratio to a pixel size
    pub fn nearest_to(width: u32, height: u32) -> AspectRatio {
        Self::nearest(&format!("{width}:{height}"))
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_ratio(input: &str) -> Option<f64> {
    let (w, h) = input.trim().split_once(':')?;
    let w: f64 = w.trim().parse().ok()?;
    let h: f64 = h.trim().parse().ok()?;
    if !w.is_finite() || !h.is_finite() || w <= 0.0 || h <= 0.0 {
        return None;
    }
    Some(w / h)
}

/// Normalize a client-supplied `"W:H"` string to one of the supported ratios
pub fn format_aspect_ratio(input: &str) -> &'static str {
    AspectRatio::nearest(input).as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_ratios_map_to_themselves() {
        for ratio in AspectRatio::ALL {
            assert_eq!(format_aspect_ratio(ratio.as_str()), ratio.as_str());
        }
    }

    #[test]
    fn test_nearest_ratio() {
        assert_eq!(format_aspect_ratio("1080:1920"), "9:16");
        assert_eq!(format_aspect_ratio("1920:1080"), "16:9");
        assert_eq!(format_aspect_ratio("2:3"), "3:4");
        assert_eq!(format_aspect_ratio("3:2"), "4:3");
        assert_eq!(format_aspect_ratio("5:4"), "4:3");
        assert_eq!(format_aspect_ratio("4:5"), "3:4");
        assert_eq!(format_aspect_ratio("32:9"), "21:9");
        assert_eq!(format_aspect_ratio("1:3"), "9:16");
        assert_eq!(format_aspect_ratio(" 1.5 : 1 "), "4:3");
    }

    #[test]
    fn test_nearest_is_minimal() {
        for (w, h) in [(7u32, 5u32), (11, 10), (10, 11), (2, 1), (1, 2), (9, 7), (100, 43)] {
            let target = w as f64 / h as f64;
            let chosen = AspectRatio::nearest(&format!("{w}:{h}"));
            let chosen_delta = (chosen.value() - target).abs();
            for candidate in AspectRatio::ALL {
                assert!(chosen_delta <= (candidate.value() - target).abs());
            }
        }
    }

    #[test]
    fn test_invalid_input_defaults_to_story() {
        for input in ["", "portrait", "16x9", "0:1", "1:0", "-4:3", "a:b", "4:", ":3", "NaN:1", "inf:1"] {
            assert_eq!(format_aspect_ratio(input), "9:16", "input {input:?}");
        }
    }

    #[test]
    fn test_serde_uses_ratio_strings() {
        assert_eq!(serde_json::to_string(&AspectRatio::Widescreen).unwrap(), "\"16:9\"");
        let parsed: AspectRatio = serde_json::from_str("\"3:4\"").unwrap();
        assert_eq!(parsed, AspectRatio::Portrait);
    }
}
