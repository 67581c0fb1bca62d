//! Reservations: temporary holds on stock pending order confirmation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stockhold_core::{ItemId, ReservationId};

use crate::error::{InventoryError, InventoryResult};
use crate::record::Allocation;

/// Lifecycle state of a reservation.
///
/// `Pending` is the only non-terminal state. Terminal states never change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Expired => "EXPIRED",
        }
    }
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hold on `quantity` units of `item_id`, spread over `allocations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub expiry_time: DateTime<Utc>,
    pub status: ReservationStatus,
    pub allocations: Vec<Allocation>,
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn pending(
        id: ReservationId,
        request: &ReservationRequest,
        allocations: Vec<Allocation>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            item_id: request.item_id.clone(),
            quantity: request.quantity,
            expiry_time: request.expiry_time,
            status: ReservationStatus::Pending,
            allocations,
            order_id: request.order_id.clone(),
            customer_id: request.customer_id.clone(),
            created_at,
            resolved_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Pending
    }

    /// Strictly past the deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_time
    }

    /// Compare-and-transition: only a pending reservation moves, and only to a terminal state.
    pub fn resolve(&self, to: ReservationStatus, at: DateTime<Utc>) -> InventoryResult<Reservation> {
        if self.status.is_terminal() {
            return Err(InventoryError::ReservationNotActive {
                id: self.id,
                status: self.status,
            });
        }
        if !to.is_terminal() {
            return Err(InventoryError::invalid_state(format!(
                "reservation {} cannot transition {} -> {}",
                self.id, self.status, to
            )));
        }

        let mut next = self.clone();
        next.status = to;
        next.resolved_at = Some(at);
        Ok(next)
    }
}

/// Input to [`crate::ReservationManager::place`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub item_id: ItemId,
    pub quantity: i64,
    pub expiry_time: DateTime<Utc>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

impl ReservationRequest {
    pub fn new(item_id: ItemId, quantity: i64, expiry_time: DateTime<Utc>) -> Self {
        Self {
            item_id,
            quantity,
            expiry_time,
            order_id: None,
            customer_id: None,
        }
    }

    pub fn for_order(mut self, order_id: impl Into<String>, customer_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self.customer_id = Some(customer_id.into());
        self
    }
}

/// Limits applied to reservation deadlines.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReservationPolicy {
    /// Lifetime used when the caller does not pass a deadline.
    pub default_ttl: Duration,
    /// Furthest allowed deadline, relative to creation. `None` = unbounded.
    pub max_ttl: Option<Duration>,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            default_ttl: Duration::minutes(15),
            max_ttl: Some(Duration::hours(24)),
        }
    }
}

impl ReservationPolicy {
    pub fn check_expiry(&self, expiry_time: DateTime<Utc>, now: DateTime<Utc>) -> InventoryResult<()> {
        if expiry_time <= now {
            return Err(InventoryError::invalid_expiry(format!(
                "expiry {expiry_time} must be after {now}"
            )));
        }
        if let Some(max) = self.max_ttl {
            if expiry_time - now > max {
                return Err(InventoryError::invalid_expiry(format!(
                    "expiry {expiry_time} is beyond the maximum reservation lifetime of {}s",
                    max.num_seconds()
                )));
            }
        }
        Ok(())
    }

    pub fn default_expiry(&self, now: DateTime<Utc>) -> InventoryResult<DateTime<Utc>> {
        now.checked_add_signed(self.default_ttl).ok_or_else(|| {
            InventoryError::invalid_expiry(format!(
                "default lifetime of {}s from {now} is out of range",
                self.default_ttl.num_seconds()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(now: DateTime<Utc>) -> Reservation {
        let req = ReservationRequest::new(ItemId::new("SKU-1"), 3, now + Duration::minutes(5));
        Reservation::pending(ReservationId::new(), &req, vec![], now)
    }

    #[test]
    fn resolve_moves_pending_to_terminal_once() {
        let now = Utc::now();
        let res = pending(now);

        let confirmed = res.resolve(ReservationStatus::Confirmed, now).unwrap();
        assert_eq!(confirmed.status, ReservationStatus::Confirmed);
        assert_eq!(confirmed.resolved_at, Some(now));

        let err = confirmed.resolve(ReservationStatus::Cancelled, now).unwrap_err();
        assert_eq!(
            err,
            InventoryError::ReservationNotActive {
                id: res.id,
                status: ReservationStatus::Confirmed
            }
        );
    }

    #[test]
    fn resolve_to_pending_is_rejected() {
        let now = Utc::now();
        let err = pending(now).resolve(ReservationStatus::Pending, now).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn overdue_is_strict() {
        let now = Utc::now();
        let res = pending(now);
        assert!(!res.is_overdue(res.expiry_time));
        assert!(res.is_overdue(res.expiry_time + Duration::milliseconds(1)));
    }

    #[test]
    fn policy_rejects_past_and_far_deadlines() {
        let now = Utc::now();
        let policy = ReservationPolicy::default();

        assert!(policy.check_expiry(now, now).is_err());
        assert!(policy.check_expiry(now - Duration::seconds(1), now).is_err());
        assert!(policy.check_expiry(now + Duration::hours(25), now).is_err());
        assert!(policy.check_expiry(now + Duration::hours(1), now).is_ok());

        let unbounded = ReservationPolicy {
            max_ttl: None,
            ..policy
        };
        assert!(unbounded.check_expiry(now + Duration::days(30), now).is_ok());
    }

    #[test]
    fn default_expiry_out_of_range_is_an_error() {
        let now = Utc::now();
        let policy = ReservationPolicy::default();
        assert_eq!(policy.default_expiry(now).unwrap(), now + Duration::minutes(15));

        let huge = ReservationPolicy {
            default_ttl: Duration::MAX,
            max_ttl: None,
        };
        assert!(matches!(
            huge.default_expiry(now),
            Err(InventoryError::InvalidExpiry(_))
        ));
    }
}
