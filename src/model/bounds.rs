use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested placement of an attached window, in desktop coordinates.
///
/// All-zero means "no explicit placement": the window keeps its current extent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Parse up to four positional tokens. Missing values are 0, so are tokens
    /// that are not integers; anything past the fourth token is ignored.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Self {
        let mut values = [0i32; 4];
        for (slot, token) in values.iter_mut().zip(tokens) {
            *slot = token.as_ref().trim().parse().unwrap_or(0);
        }
        let [x, y, width, height] = values;
        Self::new(x, y, width, height)
    }

    pub fn is_unset(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_trailing_values_default_to_zero() {
        let empty: [&str; 0] = [];
        assert_eq!(Bounds::parse(&empty), Bounds::default());
        assert_eq!(Bounds::parse(&["10"]), Bounds::new(10, 0, 0, 0));
        assert_eq!(Bounds::parse(&["10", "20"]), Bounds::new(10, 20, 0, 0));
        assert_eq!(Bounds::parse(&["10", "20", "30"]), Bounds::new(10, 20, 30, 0));
        assert_eq!(
            Bounds::parse(&["0", "0", "1920", "1080"]),
            Bounds::new(0, 0, 1920, 1080)
        );
    }

    #[test]
    fn non_numeric_tokens_parse_as_zero() {
        assert_eq!(
            Bounds::parse(&["abc", "12", "1.5", ""]),
            Bounds::new(0, 12, 0, 0)
        );
        assert_eq!(
            Bounds::parse(&["99999999999", "7", "x", "8"]),
            Bounds::new(0, 7, 0, 8)
        );
    }

    #[test]
    fn signs_and_whitespace_are_accepted() {
        assert_eq!(
            Bounds::parse(&["-1920", " 40 ", "+800", "600"]),
            Bounds::new(-1920, 40, 800, 600)
        );
    }

    #[test]
    fn extra_tokens_are_ignored() {
        assert_eq!(
            Bounds::parse(&["1", "2", "3", "4", "5"]),
            Bounds::new(1, 2, 3, 4)
        );
    }

    #[test]
    fn sentinel_detection() {
        assert!(Bounds::default().is_unset());
        assert!(Bounds::parse(&["0", "nope"]).is_unset());
        assert!(!Bounds::new(0, 0, 1, 0).is_unset());
    }
}
