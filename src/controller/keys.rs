//! Operator keypresses

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

/// Buffered keypresses before the reader blocks
const KEY_BUFFER: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// `s`: save the current board
    Save,
    /// `p`: pause, or resume when paused
    Pause,
    /// `q`: detach and quit, leaving the run going
    Quit,
    /// `k`: stop, save and shut the whole system down
    Kill,
}

impl Key {
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            's' => Some(Key::Save),
            'p' => Some(Key::Pause),
            'q' => Some(Key::Quit),
            'k' => Some(Key::Kill),
            _ => None,
        }
    }
}

/// Read keys from stdin, one or more per line
///
/// The channel closes when stdin does.
pub fn stdin_keys() -> mpsc::Receiver<Key> {
    let (tx, rx) = mpsc::channel(KEY_BUFFER);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            for key in line.chars().filter_map(Key::from_char) {
                if tx.send(key).await.is_err() {
                    return;
                }
            }
        }
        debug!("stdin closed");
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_char() {
        assert_eq!(Key::from_char('s'), Some(Key::Save));
        assert_eq!(Key::from_char('P'), Some(Key::Pause));
        assert_eq!(Key::from_char('q'), Some(Key::Quit));
        assert_eq!(Key::from_char('k'), Some(Key::Kill));
        assert_eq!(Key::from_char('x'), None);
    }
}
