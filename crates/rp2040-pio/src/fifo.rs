//! State machine FIFO pair.
//!
//! Each state machine owns a 4-deep TX FIFO (system to machine) and a
//! 4-deep RX FIFO (machine to system). SHIFTCTRL can join the pair into a
//! single 8-deep queue in either direction; the companion side then refuses
//! all traffic. Four sticky debug latches record stall/overflow/underflow
//! events until cleared through FDEBUG.

use std::collections::VecDeque;

use crate::constants::FIFO_DEPTH;

/// FIFO join configuration from SHIFTCTRL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FifoJoin {
    /// Independent 4-deep TX and RX queues.
    #[default]
    None,
    /// TX steals the RX storage: 8-deep TX, RX unusable.
    Tx,
    /// RX steals the TX storage: 8-deep RX, TX unusable.
    Rx,
}

/// TX/RX FIFO pair with sticky debug latches.
#[derive(Debug, Clone)]
pub struct Fifo {
    tx: VecDeque<u32>,
    rx: VecDeque<u32>,
    join: FifoJoin,
    tx_stall: bool,
    tx_over: bool,
    rx_under: bool,
    rx_stall: bool,
}

impl Fifo {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tx: VecDeque::with_capacity(2 * FIFO_DEPTH),
            rx: VecDeque::with_capacity(2 * FIFO_DEPTH),
            join: FifoJoin::None,
            tx_stall: false,
            tx_over: false,
            rx_under: false,
            rx_stall: false,
        }
    }

    #[must_use]
    pub fn join(&self) -> FifoJoin {
        self.join
    }

    /// Reconfigure the join. Any change flushes both queues.
    pub fn set_join(&mut self, join: FifoJoin) {
        if join != self.join {
            self.join = join;
            self.tx.clear();
            self.rx.clear();
        }
    }

    #[must_use]
    pub fn tx_depth(&self) -> usize {
        match self.join {
            FifoJoin::Tx => 2 * FIFO_DEPTH,
            FifoJoin::Rx => 0,
            FifoJoin::None => FIFO_DEPTH,
        }
    }

    #[must_use]
    pub fn rx_depth(&self) -> usize {
        match self.join {
            FifoJoin::Rx => 2 * FIFO_DEPTH,
            FifoJoin::Tx => 0,
            FifoJoin::None => FIFO_DEPTH,
        }
    }

    #[must_use]
    pub fn tx_level(&self) -> usize {
        self.tx.len()
    }

    #[must_use]
    pub fn rx_level(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn tx_is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    #[must_use]
    pub fn tx_is_full(&self) -> bool {
        self.tx.len() >= self.tx_depth()
    }

    #[must_use]
    pub fn rx_is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    #[must_use]
    pub fn rx_is_full(&self) -> bool {
        self.rx.len() >= self.rx_depth()
    }

    /// System-side write to TXF. A write to a full (or joined-away) TX
    /// drops the word and latches `tx_over`.
    pub fn tx_push(&mut self, word: u32) {
        if self.tx_is_full() {
            self.tx_over = true;
            return;
        }
        self.tx.push_back(word);
    }

    /// Machine-side pull from TX.
    pub fn tx_pop(&mut self) -> Option<u32> {
        self.tx.pop_front()
    }

    /// Machine-side push to RX. Returns false (and latches `rx_stall`)
    /// when RX is full or joined away.
    pub fn rx_push(&mut self, word: u32) -> bool {
        if self.rx_is_full() {
            self.rx_stall = true;
            return false;
        }
        self.rx.push_back(word);
        true
    }

    /// System-side read of RXF. Reading an empty RX latches `rx_under`.
    pub fn rx_pop(&mut self) -> Option<u32> {
        let word = self.rx.pop_front();
        if word.is_none() {
            self.rx_under = true;
        }
        word
    }

    /// Snapshot of the RX queue, oldest first (diagnostics only).
    #[must_use]
    pub fn rx_contents(&self) -> Vec<u32> {
        self.rx.iter().copied().collect()
    }

    /// Snapshot of the TX queue, oldest first (diagnostics only).
    #[must_use]
    pub fn tx_contents(&self) -> Vec<u32> {
        self.tx.iter().copied().collect()
    }

    pub fn latch_tx_stall(&mut self) {
        self.tx_stall = true;
    }

    #[must_use]
    pub fn tx_stall(&self) -> bool {
        self.tx_stall
    }

    #[must_use]
    pub fn tx_over(&self) -> bool {
        self.tx_over
    }

    #[must_use]
    pub fn rx_under(&self) -> bool {
        self.rx_under
    }

    #[must_use]
    pub fn rx_stall(&self) -> bool {
        self.rx_stall
    }

    pub fn clear_tx_stall(&mut self) {
        self.tx_stall = false;
    }

    pub fn clear_tx_over(&mut self) {
        self.tx_over = false;
    }

    pub fn clear_rx_under(&mut self) {
        self.rx_under = false;
    }

    pub fn clear_rx_stall(&mut self) {
        self.rx_stall = false;
    }
}

impl Default for Fifo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_track_depth_bounds() {
        let mut fifo = Fifo::new();
        for i in 0..4 {
            assert!(!fifo.tx_is_full());
            fifo.tx_push(i);
        }
        assert!(fifo.tx_is_full());
        assert_eq!(fifo.tx_level(), 4);

        fifo.tx_push(99);
        assert_eq!(fifo.tx_level(), 4);
        assert!(fifo.tx_over());
        assert_eq!(fifo.tx_pop(), Some(0));
        assert_eq!(fifo.tx_level(), 3);
    }

    #[test]
    fn rx_underflow_latches_and_returns_none() {
        let mut fifo = Fifo::new();
        assert_eq!(fifo.rx_pop(), None);
        assert!(fifo.rx_under());
        fifo.clear_rx_under();
        assert!(!fifo.rx_under());
    }

    #[test]
    fn join_doubles_one_side_and_disables_the_other() {
        let mut fifo = Fifo::new();
        fifo.tx_push(1);
        fifo.set_join(FifoJoin::Tx);
        // join change flushes
        assert!(fifo.tx_is_empty());
        for i in 0..8 {
            fifo.tx_push(i);
        }
        assert!(fifo.tx_is_full());
        assert_eq!(fifo.tx_level(), 8);

        // companion RX is unusable
        assert!(fifo.rx_is_full());
        assert!(!fifo.rx_push(5));
        assert!(fifo.rx_stall());
    }

    #[test]
    fn rejoining_restores_four_deep_queues() {
        let mut fifo = Fifo::new();
        fifo.set_join(FifoJoin::Rx);
        for i in 0..8 {
            assert!(fifo.rx_push(i));
        }
        fifo.set_join(FifoJoin::None);
        assert!(fifo.rx_is_empty());
        assert_eq!(fifo.rx_depth(), 4);
        assert_eq!(fifo.tx_depth(), 4);
    }
}
