//! # Order Lifecycle
//!
//! The authoritative state machine shared by order placement, payment
//! reconciliation and fulfillment tooling.
//!
//! ## Order Status
//! ```text
//!            ┌──────────► CANCELLED ◄──────────┬───────────────┐
//!            │                                 │               │
//!   PENDING ─┴─► CONFIRMED ─► PROCESSING ─► SHIPPED ─► DELIVERED
//!                    │            │            │           │
//!                    └────────────┴─────┬──────┴───────────┘
//!                                       ▼
//!                                   REFUNDED
//! ```
//! CANCELLED is reachable from PENDING, CONFIRMED and PROCESSING only.
//! CANCELLED and REFUNDED are terminal.
//!
//! ## Payment Status
//! ```text
//!   PENDING ──► PAID ──► REFUNDED
//!      │         ▲
//!      ▼         │
//!   FAILED ──────┘   (a new attempt may still succeed)
//! ```
//! PAID and REFUNDED never move backward. Provider events arrive out of
//! order, so every transition is planned against the current state and a
//! request for a state the order already holds is a no-op.

use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::types::{OrderStatus, PaymentStatus};

// =============================================================================
// Transition Tables
// =============================================================================

impl OrderStatus {
    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Processing)
                | (Confirmed, Cancelled)
                | (Confirmed, Refunded)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Processing, Refunded)
                | (Shipped, Delivered)
                | (Shipped, Refunded)
                | (Delivered, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

impl PaymentStatus {
    /// Whether `self -> next` is allowed. Never backward from PAID/REFUNDED.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Failed) | (Failed, Paid) | (Paid, Refunded)
        )
    }

    /// True once money has moved: no new payment attempt may start.
    pub fn is_settled(self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Refunded)
    }
}

/// Validates a fulfillment or cancellation step.
pub fn plan_status_transition(current: OrderStatus, next: OrderStatus) -> CoreResult<OrderStatus> {
    if current.can_transition_to(next) {
        Ok(next)
    } else {
        Err(CoreError::invalid_transition("status", current, next))
    }
}

// =============================================================================
// Payment Outcomes
// =============================================================================

/// What a payment provider reported about an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Captured,
    Denied,
    Refunded,
}

impl PaymentOutcome {
    /// The payment status this outcome drives the order toward.
    pub fn target(self) -> PaymentStatus {
        match self {
            PaymentOutcome::Captured => PaymentStatus::Paid,
            PaymentOutcome::Denied => PaymentStatus::Failed,
            PaymentOutcome::Refunded => PaymentStatus::Refunded,
        }
    }
}

impl fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentOutcome::Captured => f.write_str("captured"),
            PaymentOutcome::Denied => f.write_str("denied"),
            PaymentOutcome::Refunded => f.write_str("refunded"),
        }
    }
}

/// The result of planning a payment outcome against an order's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTransition {
    /// The order already holds the target payment status.
    NoOp,
    /// Write these values, guarded on the state the plan was made from.
    Apply {
        status: OrderStatus,
        payment_status: PaymentStatus,
    },
    /// Money was captured for a cancelled order whose stock is already
    /// released. Record the payment, keep the order cancelled, and flag it
    /// for a refund.
    RefundRequired { payment_status: PaymentStatus },
}

/// Plans how a provider outcome changes an order.
///
/// | outcome  | payment status     | order status                          |
/// |----------|--------------------|---------------------------------------|
/// | Captured | → PAID             | PENDING → CONFIRMED, otherwise kept   |
/// | Denied   | → FAILED           | kept                                  |
/// | Refunded | PAID → REFUNDED    | → REFUNDED when the graph allows it   |
///
/// A capture on a CANCELLED order plans [`PaymentTransition::RefundRequired`].
///
/// ```rust
/// use checkstand_core::lifecycle::plan_payment_transition;
/// use checkstand_core::{OrderStatus, PaymentOutcome, PaymentStatus, PaymentTransition};
///
/// let plan = plan_payment_transition(
///     OrderStatus::Pending,
///     PaymentStatus::Pending,
///     PaymentOutcome::Captured,
/// ).unwrap();
/// assert_eq!(plan, PaymentTransition::Apply {
///     status: OrderStatus::Confirmed,
///     payment_status: PaymentStatus::Paid,
/// });
///
/// // Denied after captured would un-pay the order
/// assert!(plan_payment_transition(
///     OrderStatus::Confirmed,
///     PaymentStatus::Paid,
///     PaymentOutcome::Denied,
/// ).is_err());
/// ```
pub fn plan_payment_transition(
    status: OrderStatus,
    payment_status: PaymentStatus,
    outcome: PaymentOutcome,
) -> CoreResult<PaymentTransition> {
    let target = outcome.target();

    if payment_status == target {
        return Ok(PaymentTransition::NoOp);
    }

    if !payment_status.can_transition_to(target) {
        return Err(CoreError::invalid_transition("payment_status", payment_status, target));
    }

    if outcome == PaymentOutcome::Captured && status == OrderStatus::Cancelled {
        return Ok(PaymentTransition::RefundRequired { payment_status: target });
    }

    let next_status = match outcome {
        PaymentOutcome::Captured if status == OrderStatus::Pending => OrderStatus::Confirmed,
        PaymentOutcome::Refunded if status.can_transition_to(OrderStatus::Refunded) => {
            OrderStatus::Refunded
        }
        _ => status,
    };

    Ok(PaymentTransition::Apply {
        status: next_status,
        payment_status: target,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
