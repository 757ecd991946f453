//! Single-producer, single-consumer token channel with an explicit close.
//!
//! The sender is consumed by [`TokenSender::close`], so nothing can be
//! written after the close marker. Dropping a sender without closing it
//! (panic, cancellation) closes it as well, which keeps the
//! "exactly one `Closed`, always last" invariant unconditional.

use tokio::sync::mpsc;

/// One item observed by the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelItem {
    Token(String),
    Closed,
}

pub fn token_channel() -> (TokenSender, TokenReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TokenSender { tx }, TokenReceiver { rx, closed: false })
}

#[derive(Debug)]
pub struct TokenSender {
    tx: mpsc::UnboundedSender<ChannelItem>,
}

impl TokenSender {
    /// Push one token. Returns `false` once the consumer is gone.
    pub fn send(&self, token: impl Into<String>) -> bool {
        self.tx.send(ChannelItem::Token(token.into())).is_ok()
    }

    /// Push the close marker. The sender cannot be used afterwards.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for TokenSender {
    fn drop(&mut self) {
        let _ = self.tx.send(ChannelItem::Closed);
    }
}

#[derive(Debug)]
pub struct TokenReceiver {
    rx: mpsc::UnboundedReceiver<ChannelItem>,
    closed: bool,
}

impl TokenReceiver {
    /// Next item in FIFO order. After `Closed` has been seen, keeps returning `Closed`.
    ///
    /// Cancel-safe: dropping the future before it resolves loses nothing.
    pub async fn recv(&mut self) -> ChannelItem {
        if self.closed {
            return ChannelItem::Closed;
        }
        match self.rx.recv().await {
            Some(ChannelItem::Token(token)) => ChannelItem::Token(token),
            Some(ChannelItem::Closed) | None => {
                self.closed = true;
                ChannelItem::Closed
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Everything physically queued on the channel, including close markers.
    async fn raw_items(mut rx: TokenReceiver) -> Vec<ChannelItem> {
        let mut items = Vec::new();
        while let Some(item) = rx.rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn tokens_then_close_in_order() {
        let (tx, mut rx) = token_channel();
        assert!(tx.send("A"));
        assert!(tx.send("B"));
        assert!(tx.send("C"));
        tx.close();

        assert_eq!(rx.recv().await, ChannelItem::Token("A".into()));
        assert_eq!(rx.recv().await, ChannelItem::Token("B".into()));
        assert_eq!(rx.recv().await, ChannelItem::Token("C".into()));
        assert_eq!(rx.recv().await, ChannelItem::Closed);
        assert!(rx.is_closed());
        assert_eq!(rx.recv().await, ChannelItem::Closed);
    }

    #[tokio::test]
    async fn exactly_one_close_marker() {
        let (tx, rx) = token_channel();
        assert!(tx.send("x"));
        tx.close();
        let items = raw_items(rx).await;
        assert_eq!(items, vec![ChannelItem::Token("x".into()), ChannelItem::Closed]);
    }

    #[tokio::test]
    async fn dropped_sender_closes() {
        let (tx, rx) = token_channel();
        let task = tokio::spawn(async move {
            tx.send("partial");
            panic!("producer blew up");
        });
        assert!(task.await.is_err());
        let items = raw_items(rx).await;
        assert_eq!(items.last(), Some(&ChannelItem::Closed));
        assert_eq!(items.iter().filter(|i| **i == ChannelItem::Closed).count(), 1);
    }

    #[tokio::test]
    async fn send_fails_without_consumer() {
        let (tx, rx) = token_channel();
        drop(rx);
        assert!(!tx.send("lost"));
    }
}
