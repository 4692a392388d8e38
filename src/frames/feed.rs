use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::decode::{decode_frame, RawFrame};
use super::store::FrameStore;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// The one raw frame waiting for decode. A push overwrites it.
type PendingSlot = Option<Arc<RawFrame>>;

/// Producer handle given to the camera pipeline.
#[derive(Clone)]
pub struct FrameSink {
    pending: Arc<watch::Sender<PendingSlot>>,
}

impl FrameSink {
    /// Hands a raw frame to the decoder, replacing any frame still waiting.
    /// Returns `false` once the feed has stopped.
    pub fn push(&self, raw: RawFrame) -> bool {
        if self.pending.is_closed() {
            return false;
        }
        self.pending.send_replace(Some(Arc::new(raw)));
        true
    }
}

/// Background decode loop that keeps a [`FrameStore`] current.
pub struct FrameFeed {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for FrameFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameFeed {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start(&mut self, store: FrameStore) -> Result<FrameSink> {
        if self.handle.is_some() {
            bail!("frame feed already running");
        }

        let (tx, rx) = watch::channel(None);
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(decode_loop(rx, store, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(FrameSink {
            pending: Arc::new(tx),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle.await.context("frame feed task failed to join")
        } else {
            Ok(())
        }
    }
}

async fn decode_loop(
    mut pending: watch::Receiver<PendingSlot>,
    store: FrameStore,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            changed = pending.changed() => {
                if changed.is_err() {
                    log_info!("frame feed closed by producer");
                    break;
                }
                // Frames pushed while the previous one decoded were overwritten;
                // only the newest is picked up here.
                let latest = pending.borrow_and_update().clone();
                let Some(raw) = latest else {
                    continue;
                };

                match tokio::task::spawn_blocking(move || decode_frame(&raw)).await {
                    Ok(Ok(image)) => {
                        store.on_frame_available(image);
                    }
                    // The store keeps its previous frame.
                    Ok(Err(err)) => log_debug!("dropping undecodable frame: {err:#}"),
                    Err(err) => log_debug!("frame decode worker join failed: {err}"),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("frame feed shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::time::Duration;

    #[tokio::test]
    async fn decoded_frames_reach_the_store() {
        let store = FrameStore::new();
        let mut feed = FrameFeed::new();
        let sink = feed.start(store.clone()).unwrap();

        assert!(sink.push(RawFrame::Rgb(RgbImage::from_pixel(2, 2, Rgb([7, 7, 7])))));
        let frame = store
            .wait_for_frame_after(None, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(frame.image.get_pixel(1, 1), &Rgb([7, 7, 7]));

        feed.stop().await.unwrap();
        assert!(!feed.is_running());
    }

    #[tokio::test]
    async fn decode_failure_keeps_previous_frame() {
        let store = FrameStore::new();
        let good = store.on_frame_available(RgbImage::from_pixel(1, 1, Rgb([1, 2, 3])));

        let mut feed = FrameFeed::new();
        let sink = feed.start(store.clone()).unwrap();
        sink.push(RawFrame::Encoded(vec![0xde, 0xad]));

        let newer = store
            .wait_for_frame_after(Some(good), Duration::from_millis(100))
            .await;
        assert!(newer.is_none());
        assert_eq!(store.latest().unwrap().id, good);

        feed.stop().await.unwrap();
    }

    #[tokio::test]
    async fn burst_keeps_only_the_newest_frame() {
        let store = FrameStore::new();
        let mut feed = FrameFeed::new();
        let sink = feed.start(store.clone()).unwrap();

        assert!(sink.push(RawFrame::Rgb(RgbImage::from_pixel(1, 1, Rgb([1, 1, 1])))));
        assert!(sink.push(RawFrame::Rgb(RgbImage::from_pixel(1, 1, Rgb([2, 2, 2])))));

        let frame = store
            .wait_for_frame_after(None, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(frame.image.get_pixel(0, 0), &Rgb([2, 2, 2]));

        // The overwritten frame is never decoded afterwards.
        let stale = store
            .wait_for_frame_after(Some(frame.id), Duration::from_millis(100))
            .await;
        assert!(stale.is_none());
        assert_eq!(store.latest().unwrap().image.get_pixel(0, 0), &Rgb([2, 2, 2]));

        feed.stop().await.unwrap();
    }

    #[tokio::test]
    async fn starting_twice_is_rejected() {
        let mut feed = FrameFeed::new();
        feed.start(FrameStore::new()).unwrap();
        assert!(feed.start(FrameStore::new()).is_err());
        feed.stop().await.unwrap();
    }

    #[tokio::test]
    async fn push_after_stop_is_dropped() {
        let mut feed = FrameFeed::new();
        let sink = feed.start(FrameStore::new()).unwrap();
        feed.stop().await.unwrap();
        assert!(!sink.push(RawFrame::Encoded(Vec::new())));
    }
}
