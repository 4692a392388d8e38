use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use chrono::Utc;
use image::RgbImage;
use tokio::sync::watch;

/// One decoded frame from the live camera stream.
#[derive(Debug)]
pub struct Frame {
    pub id: u64,
    pub captured_at_ms: i64,
    pub image: RgbImage,
}

/// Single-slot holder of the most recent frame.
///
/// Publishing replaces whatever was there; readers never see a queue, only
/// the newest frame. Cloning the store yields another handle to the same slot.
#[derive(Clone)]
pub struct FrameStore {
    slot: Arc<watch::Sender<Option<Arc<Frame>>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            slot: Arc::new(tx),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Replaces the held frame. Never fails and never blocks on readers.
    pub fn on_frame_available(&self, image: RgbImage) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame {
            id,
            captured_at_ms: Utc::now().timestamp_millis(),
            image,
        };
        self.slot.send_replace(Some(Arc::new(frame)));
        id
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.slot.borrow().clone()
    }

    /// Waits for a frame newer than `last_id` (any frame when `None`).
    pub async fn wait_for_frame_after(
        &self,
        last_id: Option<u64>,
        timeout: Duration,
    ) -> Option<Arc<Frame>> {
        let mut rx = self.slot.subscribe();
        let is_newer = |slot: &Option<Arc<Frame>>| match (slot, last_id) {
            (Some(frame), Some(last)) => frame.id > last,
            (Some(_), None) => true,
            (None, _) => false,
        };

        let found = match tokio::time::timeout(timeout, rx.wait_for(is_newer)).await {
            Ok(Ok(slot)) => slot.clone(),
            _ => None,
        };
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(2, 2, Rgb([value, value, value]))
    }

    #[test]
    fn empty_store_has_no_frame() {
        let store = FrameStore::new();
        assert!(store.latest().is_none());
    }

    #[test]
    fn newer_frame_replaces_older() {
        let store = FrameStore::new();
        let first = store.on_frame_available(solid(1));
        let second = store.on_frame_available(solid(2));

        let latest = store.latest().unwrap();
        assert!(second > first);
        assert_eq!(latest.id, second);
        assert_eq!(latest.image.get_pixel(0, 0), &Rgb([2, 2, 2]));
    }

    #[test]
    fn clones_share_the_slot() {
        let store = FrameStore::new();
        let other = store.clone();
        other.on_frame_available(solid(9));
        assert!(store.latest().is_some());
    }

    #[tokio::test]
    async fn wait_returns_existing_frame_when_no_baseline() {
        let store = FrameStore::new();
        store.on_frame_available(solid(3));
        let frame = store
            .wait_for_frame_after(None, Duration::from_millis(50))
            .await;
        assert!(frame.is_some());
    }

    #[tokio::test]
    async fn wait_times_out_without_newer_frame() {
        let store = FrameStore::new();
        let id = store.on_frame_available(solid(3));
        let frame = store
            .wait_for_frame_after(Some(id), Duration::from_millis(20))
            .await;
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn wait_sees_frame_published_later() {
        let store = FrameStore::new();
        let id = store.on_frame_available(solid(3));

        let producer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.on_frame_available(solid(4));
        });

        let frame = store
            .wait_for_frame_after(Some(id), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(frame.id > id);
    }
}
