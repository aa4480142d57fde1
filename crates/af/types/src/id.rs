//! Generated identifier formats: `LEM-<hex>`, `CH-<hex>`, `hook-<hex>`,
//! and content-addressed `DEF-<hex>`.

use rand::RngCore;

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

/// Fresh lemma identifier.
pub fn lemma_id() -> String {
    format!("LEM-{}", random_hex(6))
}

/// Fresh challenge identifier.
pub fn challenge_id() -> String {
    format!("CH-{}", random_hex(5))
}

/// Fresh hook identifier.
pub fn hook_id() -> String {
    format!("hook-{}", random_hex(4))
}

/// Fresh pending-definition request identifier.
pub fn request_id() -> String {
    format!("req-{}", random_hex(5))
}

/// Content-addressed definition identifier: stable for identical content.
pub fn definition_id(name: &str, statement: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"af-def-v1:");
    hasher.update(name.as_bytes());
    hasher.update(b":");
    hasher.update(statement.as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("DEF-{}", &hex.as_str()[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats() {
        assert!(lemma_id().starts_with("LEM-"));
        assert!(challenge_id().starts_with("CH-"));
        assert!(hook_id().starts_with("hook-"));
        assert_eq!(lemma_id().len(), "LEM-".len() + 12);
    }

    #[test]
    fn definition_id_is_deterministic() {
        assert_eq!(definition_id("a", "b"), definition_id("a", "b"));
        assert_ne!(definition_id("a", "b"), definition_id("a", "c"));
    }

    #[test]
    fn fresh_ids_do_not_collide() {
        let a = lemma_id();
        let b = lemma_id();
        assert_ne!(a, b);
    }
}
