//! Bilingual relevance lexicon with three weight tiers.

const HIGH: &[&str] = &[
    "freight",
    "shipping",
    "logistics",
    "cargo",
    "supply chain",
    "container",
    "物流",
    "货运",
    "航运",
    "供应链",
    "集装箱",
];

const MEDIUM: &[&str] = &[
    "port",
    "carrier",
    "freight rates",
    "tariff",
    "customs",
    "air cargo",
    "trucking",
    "rail freight",
    "forwarder",
    "charter",
    "港口",
    "关税",
    "海关",
    "船公司",
    "空运",
    "铁路",
    "卡车",
];

const LOW: &[&str] = &[
    "trade",
    "export",
    "import",
    "warehouse",
    "delivery",
    "vessel",
    "terminal",
    "fleet",
    "贸易",
    "出口",
    "进口",
    "仓储",
    "运输",
    "船队",
];

fn count_occurrences(haystack: &str, needle: &str) -> u32 {
    haystack.matches(needle).count() as u32
}

/// Weighted keyword score over titles + bodies, capped at 100.
/// Tiers: high = 3, medium = 2, low = 1.
pub fn relevance_score(texts: &[&str]) -> (f64, u32) {
    let combined = texts.join("\n").to_lowercase();
    let mut score: u32 = 0;
    let mut hits: u32 = 0;

    for (keywords, weight) in [(HIGH, 3u32), (MEDIUM, 2), (LOW, 1)] {
        for keyword in keywords {
            let count = count_occurrences(&combined, keyword);
            if count > 0 {
                hits += count;
                score += count * weight;
            }
        }
    }

    (score.min(100) as f64, hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_logistics_text_scores_high() {
        let text = "Container shipping rates on the transpacific surged as port congestion \
                    spread. Freight forwarders warn cargo owners about supply chain delays. \
                    Air cargo and rail freight saw spillover demand from ocean shipping.";
        let (score, hits) = relevance_score(&[text]);
        assert!(score >= 20.0, "got {score}");
        assert!(hits > 5);
    }

    #[test]
    fn chinese_text_matches_lexicon() {
        let text = "受港口拥堵影响，集装箱运价持续上涨，物流与供应链企业承压。";
        let (score, _) = relevance_score(&[text]);
        assert!(score >= 10.0, "got {score}");
    }

    #[test]
    fn irrelevant_text_scores_zero() {
        let (score, hits) = relevance_score(&["A recipe for sourdough bread and pastries."]);
        assert_eq!(score, 0.0);
        assert_eq!(hits, 0);
    }

    #[test]
    fn score_is_capped_at_100() {
        let text = "freight shipping logistics cargo ".repeat(50);
        let (score, _) = relevance_score(&[&text]);
        assert_eq!(score, 100.0);
    }
}
