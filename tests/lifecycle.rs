use marketplace_order_api::error::AppError;
use marketplace_order_api::models::OrderStatus;

#[test]
fn forward_path_advances_once_per_step() {
    assert!(OrderStatus::Pending.validate_advance(OrderStatus::Paid).is_ok());
    assert!(OrderStatus::Paid.validate_advance(OrderStatus::Shipped).is_ok());
    assert!(
        OrderStatus::Shipped
            .validate_advance(OrderStatus::Delivered)
            .is_ok()
    );
}

#[test]
fn skipping_forward_is_allowed_but_moving_back_is_not() {
    assert!(
        OrderStatus::Pending
            .validate_advance(OrderStatus::Delivered)
            .is_ok()
    );
    assert!(matches!(
        OrderStatus::Shipped.validate_advance(OrderStatus::Paid),
        Err(AppError::InvalidTransition(_))
    ));
    assert!(matches!(
        OrderStatus::Paid.validate_advance(OrderStatus::Paid),
        Err(AppError::InvalidTransition(_))
    ));
}

#[test]
fn terminal_states_reject_updates_with_distinct_messages() {
    let err = OrderStatus::Cancelled
        .validate_advance(OrderStatus::Paid)
        .unwrap_err();
    assert_eq!(err.to_string(), "Cannot update cancelled order");

    let err = OrderStatus::Delivered
        .validate_advance(OrderStatus::Paid)
        .unwrap_err();
    assert_eq!(err.to_string(), "Cannot update delivered order");
}

#[test]
fn status_update_never_cancels() {
    assert!(matches!(
        OrderStatus::Pending.validate_advance(OrderStatus::Cancelled),
        Err(AppError::InvalidTransition(_))
    ));
}

#[test]
fn only_pending_orders_are_cancellable() {
    assert!(OrderStatus::Pending.validate_cancel().is_ok());
    assert!(matches!(
        OrderStatus::Cancelled.validate_cancel(),
        Err(AppError::AlreadyCancelled)
    ));
    for status in [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Delivered] {
        assert!(matches!(
            status.validate_cancel(),
            Err(AppError::OnlyPendingCancellable)
        ));
    }
}

#[test]
fn status_round_trips_through_its_string_form() {
    for status in [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ] {
        assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(OrderStatus::parse("completed"), None);
}
