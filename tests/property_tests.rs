//! Property-based tests for invariants that hold across arbitrary inputs.

use loyaltyhub_api::entities::purchase_request::RequestStatus;
use loyaltyhub_api::handlers::common::PaginationMeta;
use loyaltyhub_api::services::transfer::SubmitRequestCommand;
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..1_000_000, 0u8..100).prop_map(|(dollars, cents)| {
        format!("{}.{:02}", dollars, cents)
            .parse::<Decimal>()
            .unwrap()
    })
}

proptest! {
    #[test]
    fn pagination_covers_every_item_exactly(total in 0u64..10_000, per_page in 1u64..100) {
        let meta = PaginationMeta::new(1, per_page, total);
        prop_assert!(meta.total_pages * per_page >= total);
        if total > 0 {
            prop_assert!((meta.total_pages - 1) * per_page < total);
        } else {
            prop_assert_eq!(meta.total_pages, 0);
        }
    }

    #[test]
    fn unknown_status_strings_never_parse(s in "[A-Za-z]{1,12}") {
        let lowered = s.to_lowercase();
        if !["pending", "approved", "rejected"].contains(&lowered.as_str()) {
            prop_assert!(s.parse::<RequestStatus>().is_err());
        }
    }

    #[test]
    fn non_positive_quantities_always_fail_validation(quantity in i32::MIN..1) {
        let command = SubmitRequestCommand {
            product_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            quantity,
            unit_price: Decimal::ONE,
            notes: None,
        };
        prop_assert!(command.validate().is_err());
    }

    #[test]
    fn positive_quantities_pass_validation(quantity in 1i32..1_000_000) {
        let command = SubmitRequestCommand {
            product_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            quantity,
            unit_price: Decimal::ONE,
            notes: None,
        };
        prop_assert!(command.validate().is_ok());
    }

    #[test]
    fn line_totals_keep_cent_precision(price in price_strategy(), quantity in 1i32..10_000) {
        let total = price * Decimal::from(quantity);
        prop_assert!(total.scale() <= 2, "line total {} has sub-cent precision", total);
        prop_assert!(total >= price);
    }
}

#[test]
fn status_display_round_trips() {
    for status in [
        RequestStatus::Pending,
        RequestStatus::Approved,
        RequestStatus::Rejected,
    ] {
        assert_eq!(status.to_string().parse::<RequestStatus>(), Ok(status));
    }
}
