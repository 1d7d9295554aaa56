//! Single-shot completion handles for assets loaded outside the frame pass.
//!
//! The host (or a loader thread) keeps the [`AssetSender`] and completes it
//! when the data arrives; the component keeps the [`PendingAsset`] and polls
//! it from its `update` hook. Until the asset is ready the component stays in
//! its not-ready state and its update is a no-op.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

/// Why an asset never became available.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetError {
    /// The loader reported a failure.
    #[error("asset '{asset}' failed to load: {reason}")]
    LoadFailed { asset: String, reason: String },

    /// The sending side was dropped without completing.
    #[error("asset '{asset}' was abandoned before completion")]
    Abandoned { asset: String },
}

/// Result of polling a [`PendingAsset`].
#[derive(Debug, PartialEq)]
pub enum AssetPoll<T> {
    /// Not finished yet.
    Pending,
    /// Finished; the value is handed out exactly once.
    Ready(T),
    /// The value was already handed out by an earlier poll.
    Delivered,
    /// The load failed; every later poll repeats the error.
    Failed(AssetError),
}

enum LoadState<T> {
    Waiting(Receiver<Result<T, AssetError>>),
    Delivered,
    Failed(AssetError),
}

/// Producer half of an asset load.
pub struct AssetSender<T> {
    asset: String,
    tx: Sender<Result<T, AssetError>>,
}

impl<T> AssetSender<T> {
    /// Name the asset was created with.
    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// Deliver the loaded value.
    pub fn complete(self, value: T) {
        // A dropped receiver means nobody is waiting any more.
        let _ = self.tx.send(Ok(value));
    }

    /// Report a load failure.
    pub fn fail(self, reason: impl Into<String>) {
        let error = AssetError::LoadFailed {
            asset: self.asset.clone(),
            reason: reason.into(),
        };
        let _ = self.tx.send(Err(error));
    }
}

/// Consumer half of an asset load, polled once per frame.
pub struct PendingAsset<T> {
    asset: String,
    state: LoadState<T>,
}

impl<T> PendingAsset<T> {
    /// A handle that is already complete. Useful for preloaded data.
    pub fn ready(asset: &str, value: T) -> Self {
        let (tx, pending) = channel(asset);
        tx.complete(value);
        pending
    }

    /// Name the asset was created with.
    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// Check for completion without blocking.
    pub fn poll(&mut self) -> AssetPoll<T> {
        let outcome = match &self.state {
            LoadState::Delivered => return AssetPoll::Delivered,
            LoadState::Failed(error) => return AssetPoll::Failed(error.clone()),
            LoadState::Waiting(rx) => rx.try_recv(),
        };
        match outcome {
            Ok(Ok(value)) => {
                self.state = LoadState::Delivered;
                AssetPoll::Ready(value)
            }
            Ok(Err(error)) => {
                tracing::error!(asset = %self.asset, %error, "asset load failed");
                self.state = LoadState::Failed(error.clone());
                AssetPoll::Failed(error)
            }
            Err(TryRecvError::Empty) => AssetPoll::Pending,
            Err(TryRecvError::Disconnected) => {
                let error = AssetError::Abandoned {
                    asset: self.asset.clone(),
                };
                tracing::error!(asset = %self.asset, "asset sender dropped before completion");
                self.state = LoadState::Failed(error.clone());
                AssetPoll::Failed(error)
            }
        }
    }

    /// Whether a failure has been observed.
    pub fn failure(&self) -> Option<&AssetError> {
        match &self.state {
            LoadState::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Create a linked sender/handle pair for one asset.
pub fn channel<T>(asset: &str) -> (AssetSender<T>, PendingAsset<T>) {
    // One slot: the sender is consumed by its single send.
    let (tx, rx) = crossbeam_channel::bounded(1);
    (
        AssetSender {
            asset: asset.to_owned(),
            tx,
        },
        PendingAsset {
            asset: asset.to_owned(),
            state: LoadState::Waiting(rx),
        },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
