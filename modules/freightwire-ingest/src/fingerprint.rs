//! Article fingerprints: canonical URL, 64-bit title SimHash, 128-value
//! content MinHash.

use freightwire_common::{FreightError, Result};
use url::Url;

pub const MINHASH_SIZE: usize = 128;
pub const SHINGLE_LEN: usize = 5;

/// Query parameters that never change article identity.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "msclkid", "mc_cid", "mc_eid", "igshid", "ref", "ref_src", "cmpid",
    "s_cid", "spm", "yclid", "twclid",
];

fn is_tracking_param(name: &str) -> bool {
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name)
}

/// Canonical form used as the unique article identifier: lowercase scheme and
/// host (the `url` crate normalizes both, and drops default ports), no
/// fragment, no tracking parameters, remaining query sorted, no trailing
/// slash on non-empty paths.
pub fn canonicalize_url(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| FreightError::Parse(format!("url {raw:?}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(FreightError::Parse(format!(
            "unsupported scheme in {raw:?}"
        )));
    }

    url.set_fragment(None);

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();
    if params.is_empty() {
        url.set_query(None);
    } else {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&params)
            .finish();
        url.set_query(Some(&query));
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Ok(url.to_string())
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}')
}

/// CJK text contributes one token per ideograph; everything else tokenizes
/// as lowercased alphanumeric runs.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        if is_cjk(c) {
            if !word.is_empty() {
                tokens.push(std::mem::take(&mut word));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() {
            word.extend(c.to_lowercase());
        } else if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

/// 64-bit SimHash over title tokens. Each token hashes via MD5 (leading 64
/// bits); bit i of the result is set iff more tokens had it set than clear.
pub fn simhash64(title: &str) -> u64 {
    let mut acc = [0i32; 64];
    for token in tokenize(title) {
        let digest = md5::compute(token.as_bytes());
        let h = u64::from_be_bytes(digest.0[..8].try_into().expect("md5 is 16 bytes"));
        for (i, slot) in acc.iter_mut().enumerate() {
            if (h >> (63 - i)) & 1 == 1 {
                *slot += 1;
            } else {
                *slot -= 1;
            }
        }
    }
    let mut out = 0u64;
    for (i, slot) in acc.iter().enumerate() {
        if *slot > 0 {
            out |= 1 << (63 - i);
        }
    }
    out
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Stable FNV-1a; `DefaultHasher` is randomized per process and would break
/// persisted signatures.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// 128-value MinHash over overlapping 5-character shingles of the body
/// (lowercased, whitespace collapsed to single spaces). Bodies shorter than
/// one shingle yield the degenerate all-MAX signature.
pub fn minhash128(body: &str) -> Vec<u64> {
    let normalized: String = body
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let chars: Vec<char> = normalized.chars().collect();

    let mut signature = vec![u64::MAX; MINHASH_SIZE];
    if chars.len() < SHINGLE_LEN {
        return signature;
    }

    for window in chars.windows(SHINGLE_LEN) {
        let shingle: String = window.iter().collect();
        let base = fnv1a(shingle.as_bytes());
        for (i, slot) in signature.iter_mut().enumerate() {
            let h = splitmix64(base ^ splitmix64(i as u64));
            if h < *slot {
                *slot = h;
            }
        }
    }
    signature
}

/// Estimated Jaccard similarity: fraction of matching signature positions.
pub fn jaccard_estimate(a: &[u64], b: &[u64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let matching = a.iter().zip(b).filter(|(x, y)| x == y).count();
    matching as f64 / a.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_is_idempotent() {
        let urls = [
            "https://TheLoadstar.com/a?utm_source=twitter",
            "http://example.com:80/news/item/?b=2&a=1#frag",
            "https://example.com/path/",
        ];
        for raw in urls {
            let once = canonicalize_url(raw).unwrap();
            let twice = canonicalize_url(&once).unwrap();
            assert_eq!(once, twice, "canonicalize({raw})");
        }
    }

    #[test]
    fn canonicalize_strips_tracking_and_sorts() {
        assert_eq!(
            canonicalize_url("https://theloadstar.com/a?utm_source=twitter").unwrap(),
            "https://theloadstar.com/a"
        );
        assert_eq!(
            canonicalize_url("https://example.com/x?b=2&a=1&fbclid=zzz").unwrap(),
            "https://example.com/x?a=1&b=2"
        );
    }

    #[test]
    fn canonicalize_lowercases_host_and_drops_default_port() {
        assert_eq!(
            canonicalize_url("HTTP://Example.COM:80/News").unwrap(),
            "http://example.com/News"
        );
    }

    #[test]
    fn canonicalize_trims_trailing_slash_on_nonempty_path() {
        assert_eq!(
            canonicalize_url("https://example.com/news/").unwrap(),
            "https://example.com/news"
        );
        assert_eq!(
            canonicalize_url("https://example.com/").unwrap(),
            "https://example.com/"
        );
    }

    #[test]
    fn canonicalize_rejects_non_http() {
        assert!(canonicalize_url("ftp://example.com/file").is_err());
        assert!(canonicalize_url("not a url").is_err());
    }

    #[test]
    fn simhash_is_deterministic() {
        let title = "Global shipping rates surge amid port congestion";
        assert_eq!(simhash64(title), simhash64(title));
    }

    #[test]
    fn simhash_near_duplicate_titles_are_close() {
        let a = simhash64("Global shipping rates surge amid port congestion");
        let b = simhash64("Global shipping rates soar amid port congestion");
        assert!(
            hamming_distance(a, b) <= 12,
            "one-word change should stay close, got {}",
            hamming_distance(a, b)
        );
    }

    #[test]
    fn simhash_unrelated_titles_are_far() {
        let a = simhash64("Global shipping rates surge amid port congestion");
        let b = simhash64("Quarterly earnings beat expectations at retailer");
        assert!(hamming_distance(a, b) > 3);
    }

    #[test]
    fn simhash_tokenizes_cjk_per_ideograph() {
        let a = simhash64("集装箱运价上涨");
        let b = simhash64("集装箱运价上升");
        assert!(hamming_distance(a, b) < hamming_distance(a, simhash64("完全不同的新闻标题")));
    }

    #[test]
    fn minhash_estimator_is_symmetric() {
        let a = minhash128("Container spot rates on the transpacific lane rose sharply this week");
        let b = minhash128("Container spot rates on the transpacific lane rose sharply this month");
        assert_eq!(jaccard_estimate(&a, &b), jaccard_estimate(&b, &a));
    }

    #[test]
    fn minhash_identical_bodies_estimate_one() {
        let text = "Ocean freight rates climbed for the fourth consecutive week as congestion spread.";
        let a = minhash128(text);
        let b = minhash128(text);
        assert_eq!(jaccard_estimate(&a, &b), 1.0);
    }

    #[test]
    fn minhash_disjoint_bodies_estimate_low() {
        let a = minhash128("alpha beta gamma delta epsilon zeta eta theta iota kappa");
        let b = minhash128("one two three four five six seven eight nine ten eleven");
        assert!(jaccard_estimate(&a, &b) < 0.3);
    }

    #[test]
    fn minhash_short_body_is_degenerate() {
        let sig = minhash128("abc");
        assert!(sig.iter().all(|v| *v == u64::MAX));
    }
}
