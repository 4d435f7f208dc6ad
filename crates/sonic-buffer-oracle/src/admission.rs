//! Admission guard for cumulative port headroom

use std::ops::Add;

use tracing::debug;

use crate::port::PortState;

/// Cumulative headroom of a port, possibly only known within bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadroomBounds {
    pub lower: u64,
    /// `None` when nothing caps the reservation from above
    pub upper: Option<u64>,
}

impl HeadroomBounds {
    pub const ZERO: HeadroomBounds = HeadroomBounds {
        lower: 0,
        upper: Some(0),
    };

    pub fn exact(size: u64) -> Self {
        Self {
            lower: size,
            upper: Some(size),
        }
    }

    pub fn between(lower: u64, upper: Option<u64>) -> Self {
        Self { lower, upper }
    }

    /// Scale a per-PG reservation by the PG count of a range
    pub fn times(self, count: u32) -> Self {
        let count = u64::from(count);
        Self {
            lower: self.lower.saturating_mul(count),
            upper: self.upper.map(|u| u.saturating_mul(count)),
        }
    }

    pub fn is_exact(&self) -> bool {
        self.upper == Some(self.lower)
    }
}

impl Add for HeadroomBounds {
    type Output = HeadroomBounds;

    fn add(self, other: HeadroomBounds) -> HeadroomBounds {
        HeadroomBounds {
            lower: self.lower.saturating_add(other.lower),
            upper: match (self.upper, other.upper) {
                (Some(a), Some(b)) => Some(a.saturating_add(b)),
                _ => None,
            },
        }
    }
}

/// Outcome of the guard for one port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { prospective: u64, max: u64 },
    /// The bounds straddle the maximum
    Undetermined { lower: u64, max: u64 },
}

/// Check a prospective cumulative headroom against the port maximum
///
/// A port without a reported maximum admits everything.
pub fn admit(port: &PortState, prospective: u64) -> bool {
    match port.max_headroom {
        Some(max) => prospective <= max,
        None => true,
    }
}

/// Run the guard on bounded headroom
pub fn assess(port: &PortState, bounds: HeadroomBounds) -> Admission {
    let Some(max) = port.max_headroom else {
        return Admission::Admitted;
    };

    let admission = if !admit(port, bounds.lower) {
        Admission::Rejected {
            prospective: bounds.lower,
            max,
        }
    } else {
        match bounds.upper {
            Some(upper) if admit(port, upper) => Admission::Admitted,
            _ => Admission::Undetermined {
                lower: bounds.lower,
                max,
            },
        }
    };

    debug!(
        port = %port.name,
        lower = bounds.lower,
        upper = ?bounds.upper,
        max,
        admission = ?admission,
        "Checked cumulative headroom"
    );
    admission
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CableLength;

    fn port(max: Option<u64>) -> PortState {
        let port = PortState::new("Ethernet0", 50000, CableLength(40), 9100);
        match max {
            Some(max) => port.with_max_headroom(max),
            None => port,
        }
    }

    #[test]
    fn test_admit() {
        let port = port(Some(100_000));
        assert!(admit(&port, 100_000));
        assert!(!admit(&port, 100_001));
    }

    #[test]
    fn test_no_maximum_is_unbounded() {
        let port = port(None);
        assert!(admit(&port, u64::MAX));
        assert_eq!(
            assess(&port, HeadroomBounds::between(1, None)),
            Admission::Admitted
        );
    }

    #[test]
    fn test_assess_exact() {
        let port = port(Some(100_000));
        assert_eq!(
            assess(&port, HeadroomBounds::exact(22528).times(2)),
            Admission::Admitted
        );
        assert_eq!(
            assess(&port, HeadroomBounds::exact(60000).times(2)),
            Admission::Rejected {
                prospective: 120_000,
                max: 100_000
            }
        );
    }

    #[test]
    fn test_assess_bounds() {
        let port = port(Some(100_000));

        // Lower bound alone exceeds the maximum
        assert!(matches!(
            assess(&port, HeadroomBounds::between(60000, None).times(2)),
            Admission::Rejected { .. }
        ));

        // Upper bound fits
        assert_eq!(
            assess(&port, HeadroomBounds::between(19456, Some(22528)).times(2)),
            Admission::Admitted
        );

        // Cannot tell
        assert_eq!(
            assess(&port, HeadroomBounds::between(48128, None).times(2)),
            Admission::Undetermined {
                lower: 96256,
                max: 100_000
            }
        );
    }

    #[test]
    fn test_bounds_sum() {
        let total = HeadroomBounds::exact(10) + HeadroomBounds::between(5, Some(8));
        assert_eq!(total, HeadroomBounds::between(15, Some(18)));
        assert!(!total.is_exact());

        let open = total + HeadroomBounds::between(1, None);
        assert_eq!(open.upper, None);
        assert!((HeadroomBounds::ZERO + HeadroomBounds::exact(3)).is_exact());
    }
}
