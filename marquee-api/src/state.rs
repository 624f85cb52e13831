use marquee_booking::{AvailabilityReconciler, BookingFinalizer, SeatLockManager};
use marquee_core::BookingBroadcaster;
use marquee_shared::BroadcastEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub webhook_secret: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub finalizer: Arc<BookingFinalizer>,
    pub locks: Arc<SeatLockManager>,
    pub availability: Arc<AvailabilityReconciler>,
    pub sse_tx: broadcast::Sender<BroadcastEvent>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(finalizer: Arc<BookingFinalizer>, sse_tx: broadcast::Sender<BroadcastEvent>, auth: AuthConfig) -> Self {
        Self {
            locks: finalizer.locks(),
            availability: finalizer.availability(),
            finalizer,
            sse_tx,
            auth,
        }
    }
}

/// Publishes booking changes to the SSE subscribers of this process.
#[derive(Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl ChannelBroadcaster {
    pub fn new(tx: broadcast::Sender<BroadcastEvent>) -> Self {
        Self { tx }
    }
}

impl BookingBroadcaster for ChannelBroadcaster {
    fn broadcast(&self, event: BroadcastEvent) {
        // An error only means nobody is listening right now
        if self.tx.send(event).is_err() {
            debug!("No live subscribers for booking broadcast");
        }
    }
}
