//! Shared ingress pool accounting
//!
//! The expected lossless pool size follows from how much headroom the
//! modeled ports reserve. How reservations map to pool size is vendor
//! specific, so the arithmetic is a strategy selected once per device class.

use std::fmt::Debug;

use sonic_buffer_common::{BufferModelError, BufferModelResult};

use crate::types::VendorClass;

/// Reservation being replaced by a configuration change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationChange {
    /// Pool size observed before the change
    pub current_size: u64,
    /// Headroom reserved before the change
    pub old_reserved: u64,
    /// Headroom reserved after the change
    pub new_reserved: u64,
}

impl ReservationChange {
    /// Build a change from per-PG headroom and PG counts
    ///
    /// `new_headroom` defaults to `old_headroom` and `new_pg_count` to
    /// `old_pg_count`. A zero `new_pg_count` reserves nothing whatever the
    /// headroom.
    pub fn from_headroom(
        current_size: u64,
        old_headroom: u64,
        old_pg_count: u32,
        new_headroom: Option<u64>,
        new_pg_count: Option<u32>,
    ) -> BufferModelResult<Self> {
        let new_pg_count = new_pg_count.unwrap_or(old_pg_count);
        let new_reserved = if new_pg_count == 0 {
            0
        } else {
            reserved(new_headroom.unwrap_or(old_headroom), new_pg_count)?
        };

        Ok(Self {
            current_size,
            old_reserved: reserved(old_headroom, old_pg_count)?,
            new_reserved,
        })
    }
}

fn reserved(headroom: u64, pg_count: u32) -> BufferModelResult<u64> {
    headroom.checked_mul(u64::from(pg_count)).ok_or_else(|| {
        BufferModelError::model_inconsistency(
            "reserved headroom",
            "a size within 64 bits",
            format!("{} * {}", headroom, pg_count),
        )
    })
}

/// Vendor-specific pool size arithmetic
pub trait PoolAccountingStrategy: Debug + Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Expected pool size once `change` is in effect
    fn expected_pool_size(&self, change: &ReservationChange) -> BufferModelResult<u64>;
}

/// Headroom carved from a budget shared by `pool_count` congruent pools
///
/// `(current * pool_count + old_reserved - new_reserved) / pool_count`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedHeadroomAccounting {
    pub pool_count: u32,
}

impl PoolAccountingStrategy for SharedHeadroomAccounting {
    fn name(&self) -> &'static str {
        "shared-headroom"
    }

    fn expected_pool_size(&self, change: &ReservationChange) -> BufferModelResult<u64> {
        if self.pool_count == 0 {
            return Err(BufferModelError::invalid_config(
                "pool_count",
                "shared headroom accounting needs at least one ingress pool",
            ));
        }

        let pool_count = i128::from(self.pool_count);
        let memory = i128::from(change.current_size) * pool_count
            + i128::from(change.old_reserved)
            - i128::from(change.new_reserved);

        if memory % pool_count != 0 {
            return Err(BufferModelError::model_inconsistency(
                "pool size",
                "an integral size",
                format!("{}/{}", memory, pool_count),
            ));
        }

        non_negative(memory / pool_count)
    }
}

/// Reservations taken from a single pool without any division
///
/// `current + old_reserved - new_reserved`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdditiveAccounting;

impl PoolAccountingStrategy for AdditiveAccounting {
    fn name(&self) -> &'static str {
        "additive"
    }

    fn expected_pool_size(&self, change: &ReservationChange) -> BufferModelResult<u64> {
        non_negative(
            i128::from(change.current_size) + i128::from(change.old_reserved)
                - i128::from(change.new_reserved),
        )
    }
}

fn non_negative(size: i128) -> BufferModelResult<u64> {
    u64::try_from(size).map_err(|_| {
        BufferModelError::model_inconsistency("pool size", "a non-negative size", size)
    })
}

/// Select the accounting strategy of a vendor class
pub fn strategy_for(vendor: &VendorClass, pool_count: u32) -> Box<dyn PoolAccountingStrategy> {
    if vendor.shares_headroom_with_pool() {
        Box::new(SharedHeadroomAccounting { pool_count })
    } else {
        Box::new(AdditiveAccounting)
    }
}

/// Expected pool size for a single headroom replacement
pub fn expected_pool_size(
    vendor: &VendorClass,
    current_size: u64,
    pool_count: u32,
    old_headroom: u64,
    old_pg_count: u32,
    new_headroom: Option<u64>,
    new_pg_count: Option<u32>,
) -> BufferModelResult<u64> {
    let change = ReservationChange::from_headroom(
        current_size,
        old_headroom,
        old_pg_count,
        new_headroom,
        new_pg_count,
    )?;
    strategy_for(vendor, pool_count).expected_pool_size(&change)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_headroom_formula() {
        // (1000000 * 2 + 19456 * 2 - 22528 * 2) / 2
        let size = expected_pool_size(
            &VendorClass::Mellanox,
            1_000_000,
            2,
            19456,
            2,
            Some(22528),
            None,
        )
        .unwrap();
        assert_eq!(size, 1_000_000 + 19456 - 22528);
    }

    #[test]
    fn test_zero_pgs_reserve_nothing() {
        let change = ReservationChange::from_headroom(1_000_000, 19456, 2, Some(99999), Some(0)).unwrap();
        assert_eq!(change.new_reserved, 0);

        let size = SharedHeadroomAccounting { pool_count: 2 }
            .expected_pool_size(&change)
            .unwrap();
        assert_eq!(size, 1_000_000 + 19456);
    }

    #[test]
    fn test_defaults_keep_old_values() {
        let change = ReservationChange::from_headroom(500, 10, 2, None, Some(3)).unwrap();
        assert_eq!(change.old_reserved, 20);
        assert_eq!(change.new_reserved, 30);

        let change = ReservationChange::from_headroom(500, 10, 2, Some(12), None).unwrap();
        assert_eq!(change.new_reserved, 24);
    }

    #[test]
    fn test_non_integral_is_inconsistency() {
        let err = expected_pool_size(&VendorClass::Mellanox, 1000, 2, 10, 1, Some(13), Some(1))
            .unwrap_err();
        assert!(matches!(err, BufferModelError::ModelInconsistency { .. }));
    }

    #[test]
    fn test_additive_skips_division() {
        let size =
            expected_pool_size(&VendorClass::Broadcom, 1000, 2, 10, 1, Some(13), Some(1)).unwrap();
        assert_eq!(size, 997);
    }

    #[test]
    fn test_negative_pool_is_inconsistency() {
        let err = AdditiveAccounting
            .expected_pool_size(&ReservationChange {
                current_size: 10,
                old_reserved: 0,
                new_reserved: 11,
            })
            .unwrap_err();
        assert!(matches!(err, BufferModelError::ModelInconsistency { .. }));
    }

    #[test]
    fn test_zero_pool_count_rejected() {
        let err = SharedHeadroomAccounting { pool_count: 0 }
            .expected_pool_size(&ReservationChange::from_headroom(1, 1, 1, None, None).unwrap())
            .unwrap_err();
        assert!(matches!(err, BufferModelError::InvalidConfig { .. }));
    }

    #[test]
    fn test_reservation_overflow_is_inconsistency() {
        let err = ReservationChange::from_headroom(1000, u64::MAX / 2, 3, None, None).unwrap_err();
        assert!(matches!(err, BufferModelError::ModelInconsistency { .. }));

        let err = expected_pool_size(&VendorClass::Broadcom, 1000, 1, 10, 1, Some(u64::MAX), Some(2))
            .unwrap_err();
        assert!(matches!(err, BufferModelError::ModelInconsistency { .. }));
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(strategy_for(&VendorClass::Mellanox, 2).name(), "shared-headroom");
        assert_eq!(strategy_for(&VendorClass::Barefoot, 2).name(), "additive");
    }
}
