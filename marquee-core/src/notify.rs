use marquee_shared::{BroadcastEvent, Masked, NotificationEvent};
use tracing::info;

/// Outbound email/SMS collaborator. Implementations must not block the caller;
/// delivery failures are theirs to log.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, event: NotificationEvent);
}

/// Real-time fan-out to clients watching a showtime. Best-effort.
pub trait BookingBroadcaster: Send + Sync {
    fn broadcast(&self, event: BroadcastEvent);
}

/// Dispatcher used when no message broker is configured: records the event in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationDispatcher for TracingNotifier {
    fn dispatch(&self, event: NotificationEvent) {
        info!(
            kind = ?event.kind,
            booking_id = %event.booking.id,
            user = %Masked(event.user_id.as_str()),
            "Notification queued"
        );
    }
}

impl BookingBroadcaster for TracingNotifier {
    fn broadcast(&self, event: BroadcastEvent) {
        info!(
            event_type = ?event.event_type,
            showtime_id = %event.showtime_id,
            booking_id = %event.data.id,
            "Broadcast queued"
        );
    }
}
