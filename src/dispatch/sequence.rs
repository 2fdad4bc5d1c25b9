//! # LoopScheduler: cursor and loop bookkeeping over a message sequence.
//!
//! Pure state, no I/O. The cursor wraps eagerly: the advance that moves past
//! the last message sets the cursor back to 0 and counts the loop right away.
//!
//! ```text
//! len = 3      advance  advance  advance         advance
//! cursor: 0 ──► 1 ────► 2 ────► 0 (loops+1) ──► 1 ...
//! ```

/// Result of one [`LoopScheduler::advance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Advance {
    /// Index of the next message to send.
    pub next: usize,
    /// `true` when this advance completed a loop.
    pub wrapped: bool,
}

/// Cursor over a non-empty, infinitely repeated sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopScheduler {
    len: usize,
    cursor: usize,
    loops: u64,
}

impl LoopScheduler {
    /// A fresh scheduler at cursor 0, loop 0. `len` is clamped to at least 1.
    pub fn new(len: usize) -> Self {
        Self {
            len: len.max(1),
            cursor: 0,
            loops: 0,
        }
    }

    /// Index of the message to send now.
    #[inline]
    pub fn current(&self) -> usize {
        self.cursor
    }

    /// Completed passes over the sequence.
    #[inline]
    pub fn loops(&self) -> u64 {
        self.loops
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Moves past the current message (sent or abandoned).
    pub fn advance(&mut self) -> Advance {
        self.cursor += 1;
        let wrapped = self.cursor >= self.len;
        if wrapped {
            self.cursor = 0;
            self.loops += 1;
        }
        Advance {
            next: self.cursor,
            wrapped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn after(len: usize, sends: usize) -> LoopScheduler {
        let mut s = LoopScheduler::new(len);
        for _ in 0..sends {
            s.advance();
        }
        s
    }

    #[test]
    fn five_sends_over_three() {
        let s = after(3, 5);
        assert_eq!((s.current(), s.loops()), (2, 1));
    }

    #[test]
    fn six_sends_over_three() {
        let s = after(3, 6);
        assert_eq!((s.current(), s.loops()), (0, 2));
    }

    #[test]
    fn wrap_is_reported_once_per_loop() {
        let mut s = LoopScheduler::new(2);
        let wraps: Vec<bool> = (0..4).map(|_| s.advance().wrapped).collect();
        assert_eq!(wraps, vec![false, true, false, true]);
    }

    #[test]
    fn single_message_wraps_every_time() {
        let mut s = LoopScheduler::new(1);
        assert_eq!(
            s.advance(),
            Advance {
                next: 0,
                wrapped: true
            }
        );
        assert_eq!(s.loops(), 1);
    }
}
