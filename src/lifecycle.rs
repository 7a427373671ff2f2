//! Status rules for members, bookings, advertisements and reconciliations.
//!
//! Member standing is two columns (`payment_status`, `membership_status`) plus
//! the derived `is_active` flag. Every mutation goes through
//! [`MemberStanding::apply`] so the three never disagree.

use crate::models::{
    AdStatus, BookingStatus, Member, MemberPaymentStatus, MembershipStatus, ReconciliationStatus,
};

/// Events that move a member's standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberEvent {
    /// A payment was recorded or an invoice was marked paid.
    PaymentRecorded,
    PaymentStatusSet(MemberPaymentStatus),
    MembershipStatusSet(MembershipStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberStanding {
    pub payment_status: MemberPaymentStatus,
    pub membership_status: MembershipStatus,
}

impl MemberStanding {
    pub fn of(member: &Member) -> Self {
        Self {
            payment_status: member.payment_status,
            membership_status: member.membership_status,
        }
    }

    pub fn apply(self, event: MemberEvent) -> Self {
        match event {
            MemberEvent::PaymentRecorded => Self {
                payment_status: MemberPaymentStatus::Paid,
                membership_status: MembershipStatus::Active,
            },
            MemberEvent::PaymentStatusSet(MemberPaymentStatus::Paid) => Self {
                payment_status: MemberPaymentStatus::Paid,
                membership_status: MembershipStatus::Active,
            },
            MemberEvent::PaymentStatusSet(status) => Self {
                payment_status: status,
                membership_status: MembershipStatus::Inactive,
            },
            // payment_status is left alone
            MemberEvent::MembershipStatusSet(status) => Self {
                payment_status: self.payment_status,
                membership_status: status,
            },
        }
    }

    pub fn is_active(&self) -> bool {
        self.membership_status == MembershipStatus::Active
    }
}

impl BookingStatus {
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Approved, Completed)
                | (Approved, Cancelled)
        )
    }
}

impl AdStatus {
    pub fn can_transition_to(self, next: AdStatus) -> bool {
        use AdStatus::*;
        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Draft, Active)
                | (Scheduled, Active)
                | (Scheduled, Ended)
                | (Active, Ended)
        )
    }
}

impl ReconciliationStatus {
    pub fn can_transition_to(self, next: ReconciliationStatus) -> bool {
        use ReconciliationStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Completed)
                | (Pending, Failed)
                | (InProgress, Completed)
                | (InProgress, Failed)
        )
    }
}

/// Error message for a booking transition that is not allowed from `current`.
pub fn booking_transition_error(current: BookingStatus, next: BookingStatus) -> String {
    match (current, next) {
        (_, BookingStatus::Approved) => "Only pending bookings can be approved".into(),
        (_, BookingStatus::Rejected) => "Only pending bookings can be rejected".into(),
        (_, BookingStatus::Completed) => "Only approved bookings can be completed".into(),
        (_, BookingStatus::Cancelled) => {
            "Only pending or approved bookings can be cancelled".into()
        }
        _ => format!("Cannot move booking from {current:?} to {next:?}"),
    }
}

/// `actual - expected`, rounded to cents.
pub fn reconciliation_variance(expected_total: f64, actual_total: f64) -> f64 {
    ((actual_total - expected_total) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYMENT_STATUSES: [MemberPaymentStatus; 3] = [
        MemberPaymentStatus::Paid,
        MemberPaymentStatus::Unpaid,
        MemberPaymentStatus::Overdue,
    ];

    const MEMBERSHIP_STATUSES: [MembershipStatus; 4] = [
        MembershipStatus::Active,
        MembershipStatus::Inactive,
        MembershipStatus::Suspended,
        MembershipStatus::Expired,
    ];

    fn every_standing() -> Vec<MemberStanding> {
        PAYMENT_STATUSES
            .iter()
            .flat_map(|&payment_status| {
                MEMBERSHIP_STATUSES
                    .iter()
                    .map(move |&membership_status| MemberStanding {
                        payment_status,
                        membership_status,
                    })
            })
            .collect()
    }

    #[test]
    fn test_payment_recorded_activates_from_any_state() {
        for standing in every_standing() {
            let next = standing.apply(MemberEvent::PaymentRecorded);
            assert_eq!(next.payment_status, MemberPaymentStatus::Paid);
            assert_eq!(next.membership_status, MembershipStatus::Active);
            assert!(next.is_active());
        }
    }

    #[test]
    fn test_membership_status_drives_is_active() {
        for standing in every_standing() {
            let inactive =
                standing.apply(MemberEvent::MembershipStatusSet(MembershipStatus::Inactive));
            assert!(!inactive.is_active());
            assert_eq!(inactive.payment_status, standing.payment_status);

            let active = standing.apply(MemberEvent::MembershipStatusSet(MembershipStatus::Active));
            assert!(active.is_active());
        }
    }

    #[test]
    fn test_payment_status_set() {
        let start = MemberStanding {
            payment_status: MemberPaymentStatus::Paid,
            membership_status: MembershipStatus::Active,
        };

        let overdue = start.apply(MemberEvent::PaymentStatusSet(MemberPaymentStatus::Overdue));
        assert_eq!(overdue.payment_status, MemberPaymentStatus::Overdue);
        assert_eq!(overdue.membership_status, MembershipStatus::Inactive);
        assert!(!overdue.is_active());

        let paid = overdue.apply(MemberEvent::PaymentStatusSet(MemberPaymentStatus::Paid));
        assert_eq!(paid, start);
    }

    #[test]
    fn test_invoice_paid_matches_recorded_payment() {
        let start = MemberStanding {
            payment_status: MemberPaymentStatus::Overdue,
            membership_status: MembershipStatus::Expired,
        };
        let next = start.apply(MemberEvent::PaymentRecorded);
        assert_eq!(next.payment_status, MemberPaymentStatus::Paid);
        assert!(next.is_active());
    }

    #[test]
    fn test_booking_transitions() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Approved));
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Rejected));
        assert!(!BookingStatus::Approved.can_transition_to(BookingStatus::Rejected));
        assert!(!BookingStatus::Rejected.can_transition_to(BookingStatus::Approved));
        assert!(BookingStatus::Approved.can_transition_to(BookingStatus::Completed));
        assert!(!BookingStatus::Completed.can_transition_to(BookingStatus::Cancelled));
        assert_eq!(
            booking_transition_error(BookingStatus::Approved, BookingStatus::Approved),
            "Only pending bookings can be approved"
        );
    }

    #[test]
    fn test_ad_transitions() {
        assert!(AdStatus::Draft.can_transition_to(AdStatus::Scheduled));
        assert!(AdStatus::Scheduled.can_transition_to(AdStatus::Active));
        assert!(AdStatus::Active.can_transition_to(AdStatus::Ended));
        assert!(!AdStatus::Ended.can_transition_to(AdStatus::Active));
        assert!(!AdStatus::Active.can_transition_to(AdStatus::Draft));
    }

    #[test]
    fn test_reconciliation_terminal_states() {
        use ReconciliationStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        for next in [Pending, InProgress, Completed, Failed] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_variance() {
        assert_eq!(reconciliation_variance(100.0, 95.5), -4.5);
        assert_eq!(reconciliation_variance(10.1, 10.3), 0.2);
    }
}
