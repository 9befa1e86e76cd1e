//! Authorization policy table.
//!
//! Every role check in the order/payment surface goes through one
//! `(role, action, ownership)` lookup instead of inline conditionals
//! scattered across handlers, so the rules are testable on their own.

use strum::Display;

use super::Role;
use crate::errors::ServiceError;

/// Actions exposed by the order and payment surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    CreateOrder,
    ViewOrder,
    UpdateVendorStatus,
    CancelOrder,
    CreatePaymentIntent,
    ConfirmPayment,
    RefundPayment,
}

/// Relationship between the principal and the resource being acted on.
///
/// For customers, `Owner` means the order belongs to them; for vendors it
/// means they hold a sub-order on it. `NotApplicable` is for actions with
/// no target resource yet (order creation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owner,
    NotOwner,
    NotApplicable,
}

/// The policy table. Admins bypass ownership for everything except
/// vendor-scoped fulfillment transitions, which only the owning vendor may
/// perform.
pub fn authorize(role: Role, action: Action, ownership: Ownership) -> bool {
    use Action::*;
    use Ownership::*;
    match (role, action) {
        (Role::Admin, UpdateVendorStatus) => false,
        (Role::Admin, _) => true,

        (Role::Customer, CreateOrder) => true,
        (Role::Customer, ViewOrder) => ownership == Owner,
        (Role::Customer, CancelOrder) => ownership == Owner,
        (Role::Customer, CreatePaymentIntent) => ownership == Owner,
        (Role::Customer, ConfirmPayment) => ownership == Owner,
        (Role::Customer, _) => false,

        (Role::Vendor, ViewOrder) => ownership == Owner,
        (Role::Vendor, UpdateVendorStatus) => ownership == Owner,
        (Role::Vendor, _) => false,
    }
}

/// `authorize` with the error the handlers propagate.
pub fn ensure(role: Role, action: Action, ownership: Ownership) -> Result<(), ServiceError> {
    if authorize(role, action, ownership) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "role {role} may not perform {action} on this resource"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    // customers
    #[case(Role::Customer, Action::CreateOrder, Ownership::NotApplicable, true)]
    #[case(Role::Customer, Action::ViewOrder, Ownership::Owner, true)]
    #[case(Role::Customer, Action::ViewOrder, Ownership::NotOwner, false)]
    #[case(Role::Customer, Action::CancelOrder, Ownership::Owner, true)]
    #[case(Role::Customer, Action::CancelOrder, Ownership::NotOwner, false)]
    #[case(Role::Customer, Action::CreatePaymentIntent, Ownership::Owner, true)]
    #[case(Role::Customer, Action::CreatePaymentIntent, Ownership::NotOwner, false)]
    #[case(Role::Customer, Action::RefundPayment, Ownership::Owner, false)]
    #[case(Role::Customer, Action::UpdateVendorStatus, Ownership::Owner, false)]
    // vendors
    #[case(Role::Vendor, Action::UpdateVendorStatus, Ownership::Owner, true)]
    #[case(Role::Vendor, Action::UpdateVendorStatus, Ownership::NotOwner, false)]
    #[case(Role::Vendor, Action::ViewOrder, Ownership::Owner, true)]
    #[case(Role::Vendor, Action::CancelOrder, Ownership::Owner, false)]
    #[case(Role::Vendor, Action::RefundPayment, Ownership::NotApplicable, false)]
    // admins
    #[case(Role::Admin, Action::ViewOrder, Ownership::NotOwner, true)]
    #[case(Role::Admin, Action::CancelOrder, Ownership::NotOwner, true)]
    #[case(Role::Admin, Action::RefundPayment, Ownership::NotApplicable, true)]
    #[case(Role::Admin, Action::UpdateVendorStatus, Ownership::NotOwner, false)]
    fn policy_table(
        #[case] role: Role,
        #[case] action: Action,
        #[case] ownership: Ownership,
        #[case] allowed: bool,
    ) {
        assert_eq!(authorize(role, action, ownership), allowed);
    }

    #[test]
    fn ensure_maps_to_forbidden() {
        let err = ensure(Role::Customer, Action::RefundPayment, Ownership::Owner).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }
}
