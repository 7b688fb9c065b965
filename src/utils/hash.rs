use sha2::{Digest, Sha256};

use crate::blockchain::Measurement;

// Canonical encoding: integers big-endian, floats by IEEE-754 bit pattern,
// strings and sequences length-prefixed, metadata in key order (BTreeMap).

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}

fn update_vector(hasher: &mut Sha256, values: &[f64]) {
    hasher.update((values.len() as u64).to_be_bytes());
    for v in values {
        hasher.update(v.to_bits().to_be_bytes());
    }
}

fn update_measurement(hasher: &mut Sha256, m: &Measurement) {
    hasher.update(m.recorded_at.to_be_bytes());
    update_str(hasher, &m.node_id);
    update_vector(hasher, &m.voltage_vector);
    update_vector(hasher, &m.current_vector);
    update_vector(hasher, &m.power_vector);
    hasher.update((m.metadata.len() as u64).to_be_bytes());
    for (key, value) in &m.metadata {
        update_str(hasher, key);
        update_str(hasher, value);
    }
}

/// Hasher state over every block field except the nonce.
///
/// The nonce is encoded last, so mining clones this state once per attempt
/// instead of re-encoding the measurements.
pub fn header_hasher(
    index: u64,
    timestamp: i64,
    measurements: &[Measurement],
    node_id: Option<&str>,
    previous_hash: &str,
) -> Sha256 {
    let mut hasher = Sha256::new();

    hasher.update(index.to_be_bytes());
    hasher.update(timestamp.to_be_bytes());
    hasher.update((measurements.len() as u64).to_be_bytes());
    for m in measurements {
        update_measurement(&mut hasher, m);
    }
    match node_id {
        Some(id) => {
            hasher.update([1u8]);
            update_str(&mut hasher, id);
        }
        None => hasher.update([0u8]),
    }
    update_str(&mut hasher, previous_hash);

    hasher
}

pub fn finalize_with_nonce(header: &Sha256, nonce: u64) -> String {
    let mut hasher = header.clone();
    hasher.update(nonce.to_be_bytes());

    let result = hasher.finalize();

    hex::encode(result)
}

pub fn hash(
    index: u64,
    timestamp: i64,
    measurements: &[Measurement],
    node_id: Option<&str>,
    previous_hash: &str,
    nonce: u64,
) -> String {
    finalize_with_nonce(
        &header_hasher(index, timestamp, measurements, node_id, previous_hash),
        nonce,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample() -> Measurement {
        let mut metadata = BTreeMap::new();
        metadata.insert("location".to_string(), "substation_a".to_string());
        metadata.insert("sampling_rate".to_string(), "60".to_string());
        Measurement {
            recorded_at: 1_700_000_000,
            voltage_vector: vec![230.5, 231.2, 230.8],
            current_vector: vec![10.2, 10.1, 10.3],
            power_vector: vec![2351.1, 2335.12, 2377.24],
            node_id: "station_001".to_string(),
            metadata,
        }
    }

    #[test]
    fn digest_is_deterministic_hex() {
        let m = [sample()];
        let a = hash(1, 42, &m, Some("node"), "abc", 7);
        let b = hash(1, 42, &m, Some("node"), "abc", 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn every_field_affects_digest() {
        let m = [sample()];
        let base = hash(1, 42, &m, Some("node"), "abc", 7);
        assert_ne!(base, hash(2, 42, &m, Some("node"), "abc", 7));
        assert_ne!(base, hash(1, 43, &m, Some("node"), "abc", 7));
        assert_ne!(base, hash(1, 42, &[], Some("node"), "abc", 7));
        assert_ne!(base, hash(1, 42, &m, None, "abc", 7));
        assert_ne!(base, hash(1, 42, &m, Some("node"), "abd", 7));
        assert_ne!(base, hash(1, 42, &m, Some("node"), "abc", 8));

        let mut tampered = sample();
        tampered.power_vector[0] += 0.01;
        assert_ne!(base, hash(1, 42, &[tampered], Some("node"), "abc", 7));
    }

    #[test]
    fn metadata_insertion_order_is_irrelevant() {
        let a = sample();
        let mut b = sample();
        b.metadata.clear();
        b.metadata.insert("sampling_rate".to_string(), "60".to_string());
        b.metadata.insert("location".to_string(), "substation_a".to_string());
        assert_eq!(
            hash(1, 0, &[a], None, "0", 0),
            hash(1, 0, &[b], None, "0", 0)
        );
    }

    #[test]
    fn length_prefix_prevents_field_shifting() {
        let mut a = sample();
        a.node_id = "ab".into();
        let mut b = sample();
        b.node_id = "a".into();
        let h1 = hash(1, 0, &[a], Some("c"), "0", 0);
        let h2 = hash(1, 0, &[b], Some("bc"), "0", 0);
        assert_ne!(h1, h2);
    }
}
