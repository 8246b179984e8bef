use rand::{distributions::Uniform, prelude::Distribution};
use sha2::{Digest, Sha256};

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Stable per-device hash over client IP, User-Agent and the browser
/// nonce. Used only as an opaque comparison key.
pub fn fingerprint(ip: &str, user_agent: &str, nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", ip, user_agent, nonce));
    hex::encode(hasher.finalize())
}

/// Uppercase alphanumeric code, used for gift codes and transaction ids.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let uni_sample = Uniform::from(0..CODE_CHARSET.len());
    (0..length)
        .map(|_| CODE_CHARSET[uni_sample.sample(&mut rng)] as char)
        .collect()
}

pub fn generate_refer_code() -> String {
    generate_code(7)
}

/// Reward amounts are paid in whole paise.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Uniform reward in `[min, max]`, rounded to 2 decimals.
pub fn random_reward(min: f64, max: f64) -> f64 {
    if max <= min {
        return round2(min);
    }
    let mut rng = rand::thread_rng();
    round2(Uniform::from(min..=max).sample(&mut rng))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_distinct() {
        let a = fingerprint("1.2.3.4", "Mozilla/5.0", "nonce");
        let b = fingerprint("1.2.3.4", "Mozilla/5.0", "nonce");
        let c = fingerprint("1.2.3.5", "Mozilla/5.0", "nonce");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn codes_use_the_uppercase_alphanumeric_charset() {
        let code = generate_code(5);
        assert_eq!(code.len(), 5);
        assert!(code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        assert_eq!(generate_refer_code().len(), 7);
    }

    #[test]
    fn rewards_stay_in_range_with_two_decimals() {
        for _ in 0..200 {
            let r = random_reward(10.0, 50.0);
            assert!((10.0..=50.0).contains(&r));
            assert_eq!(r, round2(r));
        }
        assert_eq!(random_reward(10.0, 10.0), 10.0);
    }
}
