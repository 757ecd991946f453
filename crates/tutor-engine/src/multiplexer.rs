//! First-available merge of several token channels.
//!
//! Each round races one `recv` per active lane, waits (bounded by the idle
//! window) for the first to finish, then collects every other lane that is
//! already done in the same round. Unfinished reads are dropped, which is
//! safe because [`TokenReceiver::recv`] is cancel-safe. The lane order is
//! rotated between rounds so no lane is consistently polled first.

use std::collections::VecDeque;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tracing::{debug, trace};

use crate::channel::{ChannelItem, TokenReceiver};

/// One item of the merged sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MuxItem<K> {
    Token { key: K, token: String },
    Idle,
}

struct Lane<K> {
    key: K,
    rx: TokenReceiver,
}

pub struct Multiplexer<K> {
    lanes: Vec<Lane<K>>,
    ready: VecDeque<MuxItem<K>>,
    idle: Duration,
}

impl<K: Clone + std::fmt::Debug> Multiplexer<K> {
    pub fn new(channels: Vec<(K, TokenReceiver)>, idle: Duration) -> Self {
        Self {
            lanes: channels.into_iter().map(|(key, rx)| Lane { key, rx }).collect(),
            ready: VecDeque::new(),
            idle,
        }
    }

    /// Lanes that have not closed yet.
    pub fn active(&self) -> usize {
        self.lanes.len()
    }

    /// Next token or idle marker. `None` once every lane has closed.
    pub async fn next(&mut self) -> Option<MuxItem<K>> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(item);
            }
            if self.lanes.is_empty() {
                return None;
            }
            if !self.round().await {
                return Some(MuxItem::Idle);
            }
        }
    }

    /// Run one race. Returns `false` if the idle window passed with no lane ready.
    async fn round(&mut self) -> bool {
        let idle = self.idle;
        let completed = {
            let mut reads: FuturesUnordered<_> = self
                .lanes
                .iter_mut()
                .enumerate()
                .map(|(index, lane)| async move { (index, lane.rx.recv().await) })
                .collect();

            let first = match tokio::time::timeout(idle, reads.next()).await {
                Ok(Some(first)) => first,
                Ok(None) | Err(_) => return false,
            };
            let mut completed = vec![first];
            while let Some(Some(more)) = reads.next().now_or_never() {
                completed.push(more);
            }
            completed
        };

        let mut closed = Vec::new();
        for (index, item) in completed {
            match item {
                ChannelItem::Token(token) => self.ready.push_back(MuxItem::Token {
                    key: self.lanes[index].key.clone(),
                    token,
                }),
                ChannelItem::Closed => closed.push(index),
            }
        }
        trace!(ready = self.ready.len(), closed = closed.len(), "round complete");

        closed.sort_unstable_by(|a, b| b.cmp(a));
        for index in closed {
            let lane = self.lanes.remove(index);
            debug!(key = ?lane.key, remaining = self.lanes.len(), "lane closed");
        }
        if self.lanes.len() > 1 {
            self.lanes.rotate_left(1);
        }
        true
    }
}
