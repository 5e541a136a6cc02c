//! Background work around the lifecycle: promotion after a return and the
//! periodic reservation expiry sweep.

use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use super::LendingService;

pub type PromotionReceiver = mpsc::UnboundedReceiver<i32>;

/// Book ids waiting for a promotion attempt
#[derive(Clone)]
pub struct PromotionQueue {
    sender: mpsc::UnboundedSender<i32>,
}

impl PromotionQueue {
    pub fn channel() -> (Self, PromotionReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queue `book_id`. A closed queue is logged and otherwise ignored.
    pub fn schedule(&self, book_id: i32) {
        if self.sender.send(book_id).is_err() {
            tracing::warn!("Promotion worker is gone; book {} will not be promoted", book_id);
        }
    }
}

/// Run one promotion for `book_id`, logging instead of returning failures.
pub async fn promote_after_return(service: &LendingService, book_id: i32) {
    match service.promote_next(book_id).await {
        Ok(Some(borrow)) => {
            tracing::debug!("Promotion for book {} created borrow {}", book_id, borrow.id)
        }
        Ok(None) => tracing::debug!("Nothing to promote for book {}", book_id),
        Err(e) => tracing::warn!("Promotion for book {} failed: {}", book_id, e),
    }
}

/// Drain the promotion queue for the life of the process.
///
/// `service` holds a sender of its own, so the channel never closes while the
/// worker runs; abort the returned handle to stop it.
pub fn spawn_promotion_worker(service: LendingService, mut receiver: PromotionReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(book_id) = receiver.recv().await {
            promote_after_return(&service, book_id).await;
        }
    })
}

/// Run the expiry sweep every `period`, starting immediately
pub fn spawn_expiry_sweeper(service: LendingService, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = service.expire_sweep().await {
                tracing::warn!("Reservation expiry sweep failed: {}", e);
            }
        }
    })
}
