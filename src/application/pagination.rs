//! Offset/limit windows for feed reads.
//!
//! Callers at the HTTP edge speak in `-1` sentinels; everything past
//! [`FeedWindow::from_raw`] uses [`Limit`] and `Option<u32>` until a storage
//! adapter converts back with [`Limit::as_sentinel`].

use thiserror::Error;

/// Sentinel used by the wire format and by storage adapters for "unspecified".
pub const UNSPECIFIED: i64 = -1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("{field} must be -1 or a non-negative integer, got {value}")]
    Negative { field: &'static str, value: i64 },
    #[error("{field} value {value} exceeds supported range")]
    OutOfRange { field: &'static str, value: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Bounded(u32),
    Unbounded,
}

impl Limit {
    pub fn as_sentinel(self) -> i64 {
        match self {
            Limit::Bounded(value) => i64::from(value),
            Limit::Unbounded => UNSPECIFIED,
        }
    }

    pub fn bounded(self) -> Option<u32> {
        match self {
            Limit::Bounded(value) => Some(value),
            Limit::Unbounded => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedWindow {
    pub limit: Limit,
    pub offset: Option<u32>,
}

impl FeedWindow {
    /// The whole feed, from the head.
    pub const ALL: FeedWindow = FeedWindow {
        limit: Limit::Unbounded,
        offset: None,
    };

    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: Limit::Bounded(limit),
            offset: Some(offset),
        }
    }

    /// Parse raw query values where `None` and `-1` both mean "unspecified".
    pub fn from_raw(limit: Option<i64>, offset: Option<i64>) -> Result<Self, PaginationError> {
        let limit = match parse_component("limit", limit)? {
            Some(value) => Limit::Bounded(value),
            None => Limit::Unbounded,
        };
        let offset = parse_component("offset", offset)?;
        Ok(Self { limit, offset })
    }

    /// Offset with "unspecified" resolved to zero.
    pub fn start(&self) -> usize {
        self.offset.map(|value| value as usize).unwrap_or(0)
    }

    /// Exclusive end of the window, `None` when unbounded.
    pub fn end(&self) -> Option<usize> {
        self.limit
            .bounded()
            .map(|limit| self.start().saturating_add(limit as usize))
    }

    pub fn offset_sentinel(&self) -> i64 {
        self.offset.map(i64::from).unwrap_or(UNSPECIFIED)
    }

    /// Whether the window can be served from a feed cache holding `capacity` entries.
    ///
    /// Unbounded windows never fit: they always go to the authoritative store.
    pub fn fits_cache(&self, capacity: usize) -> bool {
        match self.end() {
            Some(end) => end < capacity,
            None => false,
        }
    }
}

impl Default for FeedWindow {
    fn default() -> Self {
        Self::ALL
    }
}

fn parse_component(field: &'static str, raw: Option<i64>) -> Result<Option<u32>, PaginationError> {
    match raw {
        None | Some(UNSPECIFIED) => Ok(None),
        Some(value) if value < 0 => Err(PaginationError::Negative { field, value }),
        Some(value) => u32::try_from(value)
            .map(Some)
            .map_err(|_| PaginationError::OutOfRange { field, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_and_missing_values_are_unspecified() {
        let window = FeedWindow::from_raw(Some(-1), None).expect("valid window");
        assert_eq!(window, FeedWindow::ALL);
        assert_eq!(window.limit.as_sentinel(), -1);
        assert_eq!(window.offset_sentinel(), -1);
        assert_eq!(window.start(), 0);
        assert_eq!(window.end(), None);
    }

    #[test]
    fn other_negative_values_are_rejected() {
        let err = FeedWindow::from_raw(Some(-5), None).unwrap_err();
        assert_eq!(
            err,
            PaginationError::Negative {
                field: "limit",
                value: -5
            }
        );
    }

    #[test]
    fn unspecified_offset_behaves_like_zero() {
        let window = FeedWindow::from_raw(Some(10), Some(-1)).expect("valid window");
        assert_eq!(window.start(), 0);
        assert_eq!(window.end(), Some(10));
    }

    #[test]
    fn cache_guard_is_strict() {
        assert!(FeedWindow::new(10, 989).fits_cache(1000));
        assert!(!FeedWindow::new(10, 990).fits_cache(1000));
        assert!(!FeedWindow::ALL.fits_cache(1000));
        let no_offset = FeedWindow {
            limit: Limit::Bounded(999),
            offset: None,
        };
        assert!(no_offset.fits_cache(1000));
    }
}
