use marquee_shared::PaymentStatus;

/// States a booking may move to `to` from.
pub fn allowed_sources(to: PaymentStatus) -> &'static [PaymentStatus] {
    use PaymentStatus::*;
    match to {
        Pending => &[],
        Paid => &[Pending],
        Failed => &[Pending, Paid],
        Cancelled => &[Pending, Paid, Failed],
        Refunded => &[Paid, Cancelled],
    }
}

pub fn can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    allowed_sources(to).contains(&from)
}
