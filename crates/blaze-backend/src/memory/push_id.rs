// ── Chronological child keys ──
//
// 20-character keys that sort lexicographically in creation order:
// 8 characters of millisecond timestamp followed by 12 random characters.
// Keys minted within the same millisecond increment the random suffix.

use chrono::Utc;
use uuid::Uuid;

const ALPHABET: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Default)]
pub(crate) struct PushIdGenerator {
    last_millis: i64,
    last_random: [u8; 12],
}

impl PushIdGenerator {
    pub(crate) fn next_id(&mut self) -> String {
        self.next_at(Utc::now().timestamp_millis())
    }

    fn next_at(&mut self, now: i64) -> String {
        let millis = now.max(self.last_millis);
        if millis == self.last_millis {
            // Same millisecond: bump the suffix so ordering still holds.
            for digit in self.last_random.iter_mut().rev() {
                if *digit < 63 {
                    *digit += 1;
                    break;
                }
                *digit = 0;
            }
        } else {
            let bytes = Uuid::new_v4().into_bytes();
            for (digit, byte) in self.last_random.iter_mut().zip(bytes) {
                *digit = byte % 64;
            }
        }
        self.last_millis = millis;

        let mut id = String::with_capacity(20);
        let mut time = millis;
        let mut prefix = [b'-'; 8];
        for slot in prefix.iter_mut().rev() {
            *slot = ALPHABET[usize::try_from(time % 64).unwrap_or_default()];
            time /= 64;
        }
        id.extend(prefix.iter().map(|&b| char::from(b)));
        id.extend(
            self.last_random
                .iter()
                .map(|&d| char::from(ALPHABET[usize::from(d)])),
        );
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_twenty_chars_and_ordered() {
        let mut generator = PushIdGenerator::default();
        let a = generator.next_at(1_000);
        let b = generator.next_at(1_000);
        let c = generator.next_at(2_000);
        assert_eq!(a.len(), 20);
        assert!(a < b, "{a} < {b}");
        assert!(b < c, "{b} < {c}");
    }

    #[test]
    fn clock_going_backwards_keeps_order() {
        let mut generator = PushIdGenerator::default();
        let a = generator.next_at(5_000);
        let b = generator.next_at(4_000);
        assert!(a < b);
    }
}
