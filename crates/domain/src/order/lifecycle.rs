//! Order lifecycle state machine.
//!
//! Every change to an order's status or payment status goes through
//! [`next`], a pure function of the current [`Lifecycle`] and a
//! [`LifecycleEvent`]. Persistence, stock restoration and gateway calls are
//! the caller's business; this module only decides what the new state is.

use serde::{Deserialize, Serialize};

use super::{OrderError, OrderStatus, PaymentStatus};

/// The pair of statuses the state machine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lifecycle {
    pub status: OrderStatus,
    pub payment: PaymentStatus,
}

impl Lifecycle {
    pub fn new(status: OrderStatus, payment: PaymentStatus) -> Self {
        Self { status, payment }
    }

    /// State of a freshly placed order: `Processing` with a `Pending` payment.
    pub fn placed() -> Self {
        Self::new(OrderStatus::Processing, PaymentStatus::Pending)
    }
}

/// Something that happened to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The gateway reported a successful payment.
    PaymentCompleted,
    /// The gateway reported a definitive payment failure.
    PaymentFailed,
    /// The customer or an admin cancelled the order.
    Cancel,
    /// Fulfilment started on a confirmed order.
    StartProcessing,
    /// The order left the warehouse.
    Ship,
    /// The carrier delivered the order.
    Deliver,
    /// The customer sent a delivered order back.
    Return,
}

impl LifecycleEvent {
    /// Stable snake_case name, matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::PaymentCompleted => "payment_completed",
            LifecycleEvent::PaymentFailed => "payment_failed",
            LifecycleEvent::Cancel => "cancel",
            LifecycleEvent::StartProcessing => "start_processing",
            LifecycleEvent::Ship => "ship",
            LifecycleEvent::Deliver => "deliver",
            LifecycleEvent::Return => "return",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::PaymentCompleted => "complete payment for",
            LifecycleEvent::PaymentFailed => "fail payment for",
            LifecycleEvent::Cancel => "cancel",
            LifecycleEvent::StartProcessing => "start processing",
            LifecycleEvent::Ship => "ship",
            LifecycleEvent::Deliver => "deliver",
            LifecycleEvent::Return => "return",
        }
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of feeding an event to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The event moves the order to a new lifecycle state.
    Advanced(Lifecycle),
    /// The event was already applied (or is superseded); nothing to do.
    Unchanged,
}

impl Step {
    pub fn is_advanced(&self) -> bool {
        matches!(self, Step::Advanced(_))
    }
}

/// Computes the lifecycle state that follows `event`.
///
/// Guards:
/// - a completed payment confirms the order only while it is still
///   `Created` or `Processing`; later statuses keep their value;
/// - a payment already `Completed` ignores every further payment event, so
///   duplicate or late gateway notifications are no-ops;
/// - cancelling is allowed from any non-terminal state except `Delivered`,
///   and cancelling an already cancelled order is a no-op;
/// - shipping requires a completed payment.
pub fn next(current: Lifecycle, event: LifecycleEvent) -> Result<Step, OrderError> {
    let Lifecycle { status, payment } = current;

    match event {
        LifecycleEvent::PaymentCompleted => {
            if payment == PaymentStatus::Completed {
                return Ok(Step::Unchanged);
            }
            let status = if confirms_on_payment(status) {
                OrderStatus::Confirmed
            } else {
                status
            };
            Ok(Step::Advanced(Lifecycle::new(
                status,
                PaymentStatus::Completed,
            )))
        }

        LifecycleEvent::PaymentFailed => match payment {
            PaymentStatus::Pending => Ok(Step::Advanced(Lifecycle::new(
                status,
                PaymentStatus::Failed,
            ))),
            PaymentStatus::Failed | PaymentStatus::Completed => Ok(Step::Unchanged),
        },

        LifecycleEvent::Cancel => match status {
            OrderStatus::Cancelled => Ok(Step::Unchanged),
            OrderStatus::Delivered | OrderStatus::Returned => Err(invalid(current, event)),
            _ => Ok(Step::Advanced(Lifecycle::new(
                OrderStatus::Cancelled,
                payment,
            ))),
        },

        LifecycleEvent::StartProcessing => match status {
            OrderStatus::Confirmed => Ok(Step::Advanced(Lifecycle::new(
                OrderStatus::Processing,
                payment,
            ))),
            _ => Err(invalid(current, event)),
        },

        LifecycleEvent::Ship => match (status, payment) {
            (OrderStatus::Confirmed | OrderStatus::Processing, PaymentStatus::Completed) => Ok(
                Step::Advanced(Lifecycle::new(OrderStatus::Shipped, payment)),
            ),
            _ => Err(invalid(current, event)),
        },

        LifecycleEvent::Deliver => match status {
            OrderStatus::Shipped => Ok(Step::Advanced(Lifecycle::new(
                OrderStatus::Delivered,
                payment,
            ))),
            _ => Err(invalid(current, event)),
        },

        LifecycleEvent::Return => match status {
            OrderStatus::Delivered => Ok(Step::Advanced(Lifecycle::new(
                OrderStatus::Returned,
                payment,
            ))),
            _ => Err(invalid(current, event)),
        },
    }
}

fn confirms_on_payment(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Created | OrderStatus::Processing)
}

fn invalid(current: Lifecycle, event: LifecycleEvent) -> OrderError {
    OrderError::InvalidTransition {
        status: current.status,
        payment_status: current.payment,
        event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(status: OrderStatus, payment: PaymentStatus) -> Lifecycle {
        Lifecycle::new(status, payment)
    }

    fn advanced(status: OrderStatus, payment: PaymentStatus) -> Step {
        Step::Advanced(state(status, payment))
    }

    #[test]
    fn test_payment_completed_confirms_processing_order() {
        let step = next(
            state(OrderStatus::Processing, PaymentStatus::Pending),
            LifecycleEvent::PaymentCompleted,
        )
        .unwrap();
        assert_eq!(
            step,
            advanced(OrderStatus::Confirmed, PaymentStatus::Completed)
        );
    }

    #[test]
    fn test_payment_completed_confirms_created_order() {
        let step = next(
            state(OrderStatus::Created, PaymentStatus::Pending),
            LifecycleEvent::PaymentCompleted,
        )
        .unwrap();
        assert_eq!(
            step,
            advanced(OrderStatus::Confirmed, PaymentStatus::Completed)
        );
    }

    #[test]
    fn test_payment_completed_twice_is_a_no_op() {
        let first = next(
            state(OrderStatus::Processing, PaymentStatus::Pending),
            LifecycleEvent::PaymentCompleted,
        )
        .unwrap();
        let Step::Advanced(after_first) = first else {
            panic!("first payment must advance");
        };

        let second = next(after_first, LifecycleEvent::PaymentCompleted).unwrap();
        assert_eq!(second, Step::Unchanged);
    }

    #[test]
    fn test_payment_completed_does_not_move_later_statuses() {
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Returned,
        ] {
            let step = next(
                state(status, PaymentStatus::Pending),
                LifecycleEvent::PaymentCompleted,
            )
            .unwrap();
            assert_eq!(step, advanced(status, PaymentStatus::Completed));
        }
    }

    #[test]
    fn test_payment_retry_after_failure_completes() {
        let step = next(
            state(OrderStatus::Processing, PaymentStatus::Failed),
            LifecycleEvent::PaymentCompleted,
        )
        .unwrap();
        assert_eq!(
            step,
            advanced(OrderStatus::Confirmed, PaymentStatus::Completed)
        );
    }

    #[test]
    fn test_payment_failed_leaves_status_unchanged() {
        let step = next(
            state(OrderStatus::Processing, PaymentStatus::Pending),
            LifecycleEvent::PaymentFailed,
        )
        .unwrap();
        assert_eq!(step, advanced(OrderStatus::Processing, PaymentStatus::Failed));
    }

    #[test]
    fn test_payment_failed_never_downgrades_completed_payment() {
        let step = next(
            state(OrderStatus::Confirmed, PaymentStatus::Completed),
            LifecycleEvent::PaymentFailed,
        )
        .unwrap();
        assert_eq!(step, Step::Unchanged);

        let step = next(
            state(OrderStatus::Processing, PaymentStatus::Failed),
            LifecycleEvent::PaymentFailed,
        )
        .unwrap();
        assert_eq!(step, Step::Unchanged);
    }

    #[test]
    fn test_cancel_from_non_terminal_states() {
        for status in [
            OrderStatus::Created,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
        ] {
            let step = next(
                state(status, PaymentStatus::Completed),
                LifecycleEvent::Cancel,
            )
            .unwrap();
            assert_eq!(
                step,
                advanced(OrderStatus::Cancelled, PaymentStatus::Completed)
            );
        }
    }

    #[test]
    fn test_cancel_delivered_order_is_invalid() {
        let result = next(
            state(OrderStatus::Delivered, PaymentStatus::Completed),
            LifecycleEvent::Cancel,
        );
        assert!(matches!(
            result,
            Err(OrderError::InvalidTransition {
                status: OrderStatus::Delivered,
                event: LifecycleEvent::Cancel,
                ..
            })
        ));
    }

    #[test]
    fn test_cancel_returned_order_is_invalid() {
        let result = next(
            state(OrderStatus::Returned, PaymentStatus::Completed),
            LifecycleEvent::Cancel,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cancel_twice_is_a_no_op() {
        let step = next(
            state(OrderStatus::Cancelled, PaymentStatus::Pending),
            LifecycleEvent::Cancel,
        )
        .unwrap();
        assert_eq!(step, Step::Unchanged);
    }

    #[test]
    fn test_fulfilment_path() {
        let mut current = state(OrderStatus::Confirmed, PaymentStatus::Completed);
        for (event, expected) in [
            (LifecycleEvent::StartProcessing, OrderStatus::Processing),
            (LifecycleEvent::Ship, OrderStatus::Shipped),
            (LifecycleEvent::Deliver, OrderStatus::Delivered),
            (LifecycleEvent::Return, OrderStatus::Returned),
        ] {
            match next(current, event).unwrap() {
                Step::Advanced(new_state) => {
                    assert_eq!(new_state.status, expected);
                    current = new_state;
                }
                Step::Unchanged => panic!("{event} should advance"),
            }
        }
        assert!(current.status.is_terminal());
    }

    #[test]
    fn test_ship_requires_completed_payment() {
        for payment in [PaymentStatus::Pending, PaymentStatus::Failed] {
            let result = next(
                state(OrderStatus::Processing, payment),
                LifecycleEvent::Ship,
            );
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_out_of_order_fulfilment_events_are_invalid() {
        let processing = state(OrderStatus::Processing, PaymentStatus::Completed);
        assert!(next(processing, LifecycleEvent::Deliver).is_err());
        assert!(next(processing, LifecycleEvent::Return).is_err());
        assert!(next(processing, LifecycleEvent::StartProcessing).is_err());

        let cancelled = state(OrderStatus::Cancelled, PaymentStatus::Completed);
        assert!(next(cancelled, LifecycleEvent::Ship).is_err());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&LifecycleEvent::StartProcessing).unwrap();
        assert_eq!(json, "\"start_processing\"");
        let event: LifecycleEvent = serde_json::from_str("\"ship\"").unwrap();
        assert_eq!(event, LifecycleEvent::Ship);
    }
}
