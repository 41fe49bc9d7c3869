//! Client-side push keys.
//!
//! A push key is 20 characters: 8 encode the millisecond timestamp, 12 are
//! random. Keys sort lexicographically in creation order. Within the same
//! millisecond the random part is incremented instead of re-drawn, so keys
//! generated by one generator stay strictly increasing.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::Rng;

/// Alphabet in ASCII order, so lexicographic order follows numeric order.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

struct PushIdState {
    last_time: u64,
    last_random: [u8; RANDOM_CHARS],
}

pub struct PushIdGenerator {
    state: Mutex<PushIdState>,
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PushIdState {
                last_time: 0,
                last_random: [0; RANDOM_CHARS],
            }),
        }
    }

    /// Generate a key for the current wall-clock time.
    pub fn next_id(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);
        self.next_id_at(now)
    }

    /// Generate a key for `now_ms` milliseconds since the Unix epoch.
    pub fn next_id_at(&self, now_ms: u64) -> String {
        let mut st = self.state.lock();
        if now_ms == st.last_time {
            increment(&mut st.last_random);
        } else {
            let mut rng = rand::thread_rng();
            for digit in st.last_random.iter_mut() {
                *digit = rng.gen_range(0..64);
            }
            st.last_time = now_ms;
        }

        let mut out = Vec::with_capacity(TIME_CHARS + RANDOM_CHARS);
        let mut time = now_ms;
        let mut time_chars = [0u8; TIME_CHARS];
        for slot in time_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(time % 64) as usize];
            time /= 64;
        }
        out.extend_from_slice(&time_chars);
        out.extend(st.last_random.iter().map(|&d| PUSH_CHARS[d as usize]));
        out.into_iter().map(char::from).collect()
    }
}

impl Default for PushIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Add one to a base-64 digit string, carrying to the left. Wraps to all
/// zeroes on overflow.
fn increment(digits: &mut [u8; RANDOM_CHARS]) {
    for digit in digits.iter_mut().rev() {
        if *digit == 63 {
            *digit = 0;
        } else {
            *digit += 1;
            return;
        }
    }
}
