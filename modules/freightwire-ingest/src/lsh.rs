//! In-process fingerprint index: the SimHash scan list and the MinHash
//! banding index. Transient — rebuilt from persisted fingerprints on startup.

use std::collections::{HashMap, HashSet};

use freightwire_store::FingerprintRow;
use uuid::Uuid;

use crate::fingerprint::{hamming_distance, jaccard_estimate, MINHASH_SIZE};

pub const LSH_BANDS: usize = 16;
pub const LSH_ROWS: usize = 8;

#[derive(Default)]
pub struct FingerprintIndex {
    simhashes: Vec<(Uuid, u64)>,
    minhashes: HashMap<Uuid, Vec<u64>>,
    bands: Vec<HashMap<u64, Vec<Uuid>>>,
}

fn band_key(signature: &[u64], band: usize) -> u64 {
    // FNV-1a over the band's 8 rows, little-endian.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for value in &signature[band * LSH_ROWS..(band + 1) * LSH_ROWS] {
        for byte in value.to_le_bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    hash
}

impl FingerprintIndex {
    pub fn new() -> Self {
        Self {
            simhashes: Vec::new(),
            minhashes: HashMap::new(),
            bands: vec![HashMap::new(); LSH_BANDS],
        }
    }

    /// Rebuild from persisted fingerprints at startup.
    pub fn warm(rows: Vec<FingerprintRow>) -> Self {
        let mut index = Self::new();
        for row in rows {
            index.insert(row.id, row.title_simhash, row.content_minhash);
        }
        index
    }

    pub fn insert(&mut self, id: Uuid, simhash: u64, minhash: Vec<u64>) {
        self.simhashes.push((id, simhash));
        if minhash.len() == MINHASH_SIZE {
            for band in 0..LSH_BANDS {
                let key = band_key(&minhash, band);
                self.bands[band].entry(key).or_default().push(id);
            }
            self.minhashes.insert(id, minhash);
        }
    }

    pub fn len(&self) -> usize {
        self.simhashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.simhashes.is_empty()
    }

    /// Linear scan for the closest persisted SimHash within `max_distance`.
    pub fn nearest_title(&self, simhash: u64, max_distance: u32) -> Option<(Uuid, u32)> {
        self.simhashes
            .iter()
            .map(|(id, other)| (*id, hamming_distance(simhash, *other)))
            .filter(|(_, d)| *d <= max_distance)
            .min_by_key(|(_, d)| *d)
    }

    /// Articles sharing at least one bit-identical band with the signature.
    pub fn content_candidates(&self, signature: &[u64]) -> Vec<Uuid> {
        if signature.len() != MINHASH_SIZE {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for band in 0..LSH_BANDS {
            let key = band_key(signature, band);
            if let Some(ids) = self.bands[band].get(&key) {
                for id in ids {
                    if seen.insert(*id) {
                        out.push(*id);
                    }
                }
            }
        }
        out
    }

    /// Jaccard estimate between a candidate's stored signature and `signature`.
    pub fn jaccard_with(&self, id: Uuid, signature: &[u64]) -> Option<f64> {
        self.minhashes
            .get(&id)
            .map(|stored| jaccard_estimate(stored, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{minhash128, simhash64};

    #[test]
    fn identical_content_is_an_lsh_candidate() {
        let text = "Ocean carriers announced a new round of surcharges on transpacific lanes \
                    effective next month, citing congestion and equipment shortages.";
        let mut index = FingerprintIndex::new();
        let id = Uuid::new_v4();
        index.insert(id, simhash64("t"), minhash128(text));

        let candidates = index.content_candidates(&minhash128(text));
        assert_eq!(candidates, vec![id]);
        assert_eq!(index.jaccard_with(id, &minhash128(text)), Some(1.0));
    }

    #[test]
    fn unrelated_content_shares_no_band() {
        let mut index = FingerprintIndex::new();
        index.insert(
            Uuid::new_v4(),
            0,
            minhash128("alpha beta gamma delta epsilon zeta eta theta"),
        );
        let candidates =
            index.content_candidates(&minhash128("completely different text about railways"));
        assert!(candidates.is_empty());
    }

    #[test]
    fn nearest_title_respects_threshold() {
        let mut index = FingerprintIndex::new();
        let id = Uuid::new_v4();
        let base = simhash64("Global shipping rates surge amid port congestion");
        index.insert(id, base, vec![]);

        assert_eq!(index.nearest_title(base, 3), Some((id, 0)));
        assert_eq!(index.nearest_title(base ^ 0b111, 3).map(|(i, _)| i), Some(id));
        assert!(index.nearest_title(base ^ 0b1111, 3).is_none());
    }

    #[test]
    fn warm_rebuilds_from_rows(){
        let text = "Air cargo demand out of Asia jumped ahead of the holiday season.";
        let rows = vec![FingerprintRow {
            id: Uuid::new_v4(),
            title_simhash: simhash64("Air cargo demand jumps"),
            content_minhash: minhash128(text),
        }];
        let index = FingerprintIndex::warm(rows);
        assert_eq!(index.len(), 1);
        assert_eq!(index.content_candidates(&minhash128(text)).len(), 1);
    }
}
